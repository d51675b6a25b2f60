use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::Client as HttpClient;
use reqwest::StatusCode;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::warn;

use crate::protocol::{ChatMessage, StreamChunk};
use crate::sse::SseDecoder;

pub type ChunkStream = BoxStream<'static, StreamChunk>;

/// The one capability the rest of the system needs from an LLM gateway.
/// The relay and its tests depend on this trait, never on a vendor client.
#[async_trait]
pub trait Provider: Send + Sync {
    async fn send(&self, messages: &[ChatMessage]) -> Result<ChunkStream, ProviderError>;
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Invalid API key")]
    Unauthorized,
    #[error("Rate limit exceeded")]
    RateLimited,
    #[error("Failed to connect to AI service")]
    Unreachable,
    #[error("{message}")]
    Api { status: u16, message: String },
    #[error("{0}")]
    Internal(String),
}

impl ProviderError {
    fn from_transport(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            ProviderError::Unreachable
        } else {
            ProviderError::Internal(err.to_string())
        }
    }

    fn from_status(status: StatusCode, body: String) -> Self {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::Unauthorized,
            StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited,
            _ => ProviderError::Api {
                status: status.as_u16(),
                message: extract_error_message(&body)
                    .unwrap_or_else(|| format!("upstream returned {}", status)),
            },
        }
    }
}

/// Pulls a human-readable summary out of a JSON error body, tolerating the
/// `{"error": "..."}` and `{"error": {"message": "..."}}` shapes gateways use.
fn extract_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body.trim()).ok()?;
    let message = value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .or_else(|| value.get("error").and_then(|v| v.as_str()))
        .or_else(|| value.get("message").and_then(|v| v.as_str()))?;
    let trimmed = message.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[derive(Serialize)]
struct GatewayRequest<'a> {
    messages: &'a [ChatMessage],
    stream: bool,
}

/// Streaming client for an SSE chat-completions gateway.
pub struct GatewayClient {
    http: HttpClient,
    base_url: String,
    api_key: String,
}

impl GatewayClient {
    pub fn new(base_url: &str, api_key: String) -> Self {
        Self {
            http: HttpClient::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }
}

#[async_trait]
impl Provider for GatewayClient {
    async fn send(&self, messages: &[ChatMessage]) -> Result<ChunkStream, ProviderError> {
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&GatewayRequest {
                messages,
                stream: true,
            })
            .send()
            .await
            .map_err(ProviderError::from_transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, body));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut stream = response.bytes_stream();
            let mut decoder = SseDecoder::new();

            while let Some(piece) = stream.next().await {
                let bytes = match piece {
                    Ok(bytes) => bytes,
                    Err(err) => {
                        warn!(error = %err, "gateway stream ended early");
                        return;
                    }
                };

                for payload in decoder.push(&String::from_utf8_lossy(&bytes)) {
                    if payload == "[DONE]" {
                        return;
                    }
                    match serde_json::from_str::<StreamChunk>(&payload) {
                        Ok(chunk) => {
                            // Receiver gone means the caller hung up; stop pulling.
                            if tx.send(chunk).is_err() {
                                return;
                            }
                        }
                        Err(err) => {
                            warn!(error = %err, "skipping undecodable stream event");
                        }
                    }
                }
            }
        });

        Ok(UnboundedReceiverStream::new(rx).boxed())
    }
}
