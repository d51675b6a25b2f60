use std::error::Error;
use std::future::Future;

use futures::StreamExt;
use reqwest::Client as HttpClient;

use crate::protocol::{ChatMessage, ChatRequest, StreamChunk};
use crate::sse::SseDecoder;

type ClientResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

/// Thin client for the relay's `POST /chat` endpoint.
#[derive(Clone)]
pub struct RelayClient {
    base_url: String,
    http: HttpClient,
}

impl RelayClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: HttpClient::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Sends the conversation window and invokes the callback once per
    /// decoded chunk, in arrival order, until the stream closes.
    pub async fn stream_chat<F, Fut>(
        &self,
        messages: Vec<ChatMessage>,
        mut on_chunk: F,
    ) -> ClientResult<()>
    where
        F: FnMut(StreamChunk) -> Fut,
        Fut: Future<Output = ()>,
    {
        let response = self
            .http
            .post(format!("{}/chat", self.base_url))
            .json(&ChatRequest { messages })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(relay_error_message(status.as_u16(), &body).into());
        }

        let mut stream = response.bytes_stream();
        let mut decoder = SseDecoder::new();

        while let Some(piece) = stream.next().await {
            let bytes = piece?;
            for payload in decoder.push(&String::from_utf8_lossy(&bytes)) {
                if let Ok(chunk) = serde_json::from_str::<StreamChunk>(&payload) {
                    on_chunk(chunk).await;
                }
            }
        }

        Ok(())
    }
}

/// The relay reports failures as `{"error": "..."}`; fall back to the raw
/// body, then to the bare status, so the user always sees something.
fn relay_error_message(status: u16, body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("error")
                .and_then(|v| v.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                format!("Request failed with status {}", status)
            } else {
                trimmed.to_string()
            }
        })
}
