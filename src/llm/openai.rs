use async_trait::async_trait;
use futures::StreamExt;
use log::{ error, info };
use reqwest::{ Client as HttpClient, StatusCode };
use reqwest::header::{ HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE };
use serde::Serialize;
use std::error::Error as StdError;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::{ ChatTransport, LlmConfig, SnapshotStream };
use super::sse::DeltaAccumulator;
use crate::error::ChatError;
use crate::models::chat::{ ChatMessage, Role };

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

pub struct OpenAiChatClient {
    http: HttpClient,
    model: String,
    base_url: String,
    temperature: f32,
}

#[derive(Serialize)]
struct WireMessage {
    role: Role,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    temperature: f32,
    stream: bool,
}

/// Maps a response status to the turn error it should surface, or `None` for
/// success. Runs before any body byte is read, so a mapped status never
/// produces a snapshot.
fn classify_status(status: StatusCode) -> Option<ChatError> {
    match status.as_u16() {
        429 => Some(ChatError::RateLimited),
        402 => Some(ChatError::ServiceUnavailable),
        _ if !status.is_success() =>
            Some(ChatError::ConnectionFailed(format!("unexpected status {}", status))),
        _ => None,
    }
}

impl OpenAiChatClient {
    pub fn new(
        api_key: String,
        model: Option<String>,
        base_url: Option<String>,
        temperature: f32
    ) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|e| format!("Invalid API key format: {}", e))?
        );

        let http = HttpClient::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| Box::new(e) as Box<dyn StdError + Send + Sync>)?;

        Ok(Self {
            http,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            temperature,
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let api_key = config.api_key
            .clone()
            .ok_or_else(|| "Chat API key is required".to_string())?;

        Self::new(
            api_key,
            config.model.clone(),
            config.base_url.clone(),
            config.temperature,
        )
    }
}

#[async_trait]
impl ChatTransport for OpenAiChatClient {
    async fn stream_chat(
        &self,
        messages: &[ChatMessage]
    ) -> Result<SnapshotStream, ChatError> {
        let url = self.base_url.trim_end_matches('/').to_string();

        let req = ChatRequest {
            model: self.model.clone(),
            messages: messages
                .iter()
                .map(|m| WireMessage {
                    role: m.role,
                    content: m.content.clone(),
                })
                .collect(),
            temperature: self.temperature,
            stream: true,
        };

        let resp = self.http
            .post(&url)
            .json(&req)
            .send().await
            .map_err(|e| ChatError::ConnectionFailed(e.to_string()))?;

        if let Some(err) = classify_status(resp.status()) {
            return Err(err);
        }

        info!("streaming completion started: model={}", self.model);

        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            let mut accumulator = DeltaAccumulator::new();
            let mut bytes = resp.bytes_stream();

            while let Some(chunk) = bytes.next().await {
                match chunk {
                    Ok(buf) => {
                        match accumulator.feed(&buf) {
                            Ok(snapshots) => {
                                for snapshot in snapshots {
                                    // A failed send means the consumer went
                                    // away; drop the response and stop reading.
                                    if tx.send(Ok(snapshot)).await.is_err() {
                                        return;
                                    }
                                }
                            }
                            Err(e) => {
                                error!("stream decode failed: {}", e);
                                let _ = tx.send(Err(e)).await;
                                return;
                            }
                        }
                        if accumulator.is_finished() {
                            return;
                        }
                    }
                    Err(e) => {
                        let _ = tx
                            .send(Err(ChatError::ConnectionFailed(e.to_string())))
                            .await;
                        return;
                    }
                }
            }
            // Body ended without a [DONE] sentinel; treated as normal
            // completion.
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_429_maps_to_rate_limited() {
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS),
            Some(ChatError::RateLimited)
        ));
    }

    #[test]
    fn status_402_maps_to_service_unavailable() {
        assert!(matches!(
            classify_status(StatusCode::PAYMENT_REQUIRED),
            Some(ChatError::ServiceUnavailable)
        ));
    }

    #[test]
    fn other_failure_statuses_map_to_connection_failed() {
        for status in [
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::BAD_REQUEST,
            StatusCode::UNAUTHORIZED,
            StatusCode::BAD_GATEWAY,
        ] {
            assert!(matches!(
                classify_status(status),
                Some(ChatError::ConnectionFailed(_))
            ));
        }
    }

    #[test]
    fn success_statuses_pass_through() {
        assert!(classify_status(StatusCode::OK).is_none());
        assert!(classify_status(StatusCode::CREATED).is_none());
    }

    #[test]
    fn missing_api_key_is_rejected() {
        let config = LlmConfig::default();
        assert!(OpenAiChatClient::from_config(&config).is_err());
    }
}
