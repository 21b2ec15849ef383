pub mod memory;

use async_trait::async_trait;
use log::info;
use std::sync::Arc;

use crate::models::chat::{ ChatMessage, Conversation };

/// Sink for the conversation the chat UI renders. The stream receiver only
/// ever appends a message, rewrites the content of the last one, or retracts
/// the last one; nothing else is assumed of the store.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn append(&self, message: ChatMessage);

    /// Replace the content of the most recently appended message. No-op on an
    /// empty conversation.
    async fn replace_last(&self, content: &str);

    /// Retract the most recently appended message. No-op on an empty
    /// conversation.
    async fn remove_last(&self);

    async fn conversation(&self) -> Conversation;

    /// Drop every message and start a fresh conversation.
    async fn clear(&self);
}

pub fn initialize_conversation_store() -> Arc<dyn ConversationStore> {
    info!("Conversation history kept in memory for the lifetime of the session");
    Arc::new(memory::MemoryConversationStore::new())
}
