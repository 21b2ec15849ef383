use async_trait::async_trait;
use tokio::sync::Mutex;

use super::ConversationStore;
use crate::models::chat::{ ChatMessage, Conversation };

pub struct MemoryConversationStore {
    conversation: Mutex<Conversation>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self {
            conversation: Mutex::new(Conversation::new()),
        }
    }
}

impl Default for MemoryConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn append(&self, message: ChatMessage) {
        self.conversation.lock().await.messages.push(message);
    }

    async fn replace_last(&self, content: &str) {
        let mut conversation = self.conversation.lock().await;
        if let Some(last) = conversation.messages.last_mut() {
            last.content.clear();
            last.content.push_str(content);
        }
    }

    async fn remove_last(&self) {
        self.conversation.lock().await.messages.pop();
    }

    async fn conversation(&self) -> Conversation {
        self.conversation.lock().await.clone()
    }

    async fn clear(&self) {
        *self.conversation.lock().await = Conversation::new();
    }
}
