pub mod openai;
pub mod sse;

use async_trait::async_trait;
use futures::Stream;
use std::error::Error as StdError;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::ChatError;
use crate::models::chat::ChatMessage;

use self::openai::OpenAiChatClient;

/// Each item is the full assistant reply accumulated so far, emitted once per
/// non-empty delta, in arrival order.
pub type SnapshotStream = Pin<Box<dyn Stream<Item = Result<String, ChatError>> + Send>>;

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            model: None,
            temperature: 0.7,
        }
    }
}

/// Transport seam for a streaming chat completion. The transport owns the
/// HTTP request and the status-code mapping; a returned stream means the
/// upstream accepted the request and the body is being decoded.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn stream_chat(
        &self,
        messages: &[ChatMessage]
    ) -> Result<SnapshotStream, ChatError>;
}

pub fn new_client(
    config: &LlmConfig
) -> Result<Arc<dyn ChatTransport>, Box<dyn StdError + Send + Sync>> {
    let client = OpenAiChatClient::from_config(config)?;
    Ok(Arc::new(client))
}
