use futures::StreamExt;
use log::{ error, info };
use std::sync::Arc;

use crate::error::ChatError;
use crate::history::ConversationStore;
use crate::llm::ChatTransport;
use crate::models::chat::ChatMessage;

/// Drives one chat turn at a time: user message in, streamed assistant reply
/// out. Taking `&mut self` in [`send_turn`] is what enforces the one-turn-in-
/// flight rule; overlapping turns do not compile.
///
/// [`send_turn`]: ChatSession::send_turn
pub struct ChatSession {
    transport: Arc<dyn ChatTransport>,
    store: Arc<dyn ConversationStore>,
    history_limit: usize,
}

impl ChatSession {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        store: Arc<dyn ConversationStore>,
        history_limit: usize
    ) -> Self {
        Self {
            transport,
            store,
            history_limit,
        }
    }

    /// Send one user message and stream the assistant reply into the store.
    ///
    /// `publish` is invoked with the full reply accumulated so far, once per
    /// non-empty delta, in order. On success the final reply is returned and
    /// retained as the last conversation message. If the stream fails after
    /// the assistant placeholder was created, the placeholder is retracted so
    /// the conversation never keeps a half-written reply; earlier turns are
    /// untouched.
    pub async fn send_turn<F>(
        &mut self,
        user_text: &str,
        mut publish: F
    ) -> Result<String, ChatError>
        where F: FnMut(&str)
    {
        self.store.append(ChatMessage::user(user_text)).await;

        let conversation = self.store.conversation().await;
        let window = self.prompt_window(&conversation.messages);

        // Status mapping happens inside the transport; an error here means no
        // assistant message was ever inserted.
        let mut stream = self.transport.stream_chat(&window).await?;

        self.store.append(ChatMessage::assistant("")).await;

        let mut reply = String::new();
        while let Some(item) = stream.next().await {
            match item {
                Ok(snapshot) => {
                    self.store.replace_last(&snapshot).await;
                    publish(&snapshot);
                    reply = snapshot;
                }
                Err(e) => {
                    error!("assistant stream failed mid-turn: {}", e);
                    self.store.remove_last().await;
                    return Err(e);
                }
            }
        }

        info!("turn complete: {} chars streamed", reply.len());
        Ok(reply)
    }

    pub async fn reset(&mut self) {
        self.store.clear().await;
    }

    /// The most recent messages sent upstream as context for a completion.
    fn prompt_window(&self, messages: &[ChatMessage]) -> Vec<ChatMessage> {
        let start = messages.len().saturating_sub(self.history_limit);
        messages[start..].to_vec()
    }
}
