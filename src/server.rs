use std::convert::Infallible;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::Json;
use futures::StreamExt;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::protocol::ChatRequest;
use crate::provider::{GatewayClient, Provider, ProviderError};

pub struct RelayConfig {
    pub listen: String,
    pub base_url: String,
    pub api_key: Option<String>,
}

pub struct RelayState {
    provider: Option<Arc<dyn Provider>>,
}

impl RelayState {
    pub fn new(provider: Option<Arc<dyn Provider>>) -> Self {
        Self { provider }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

type RelayResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

pub async fn run(config: RelayConfig) -> RelayResult<()> {
    let provider = config.api_key.map(|key| {
        Arc::new(GatewayClient::new(&config.base_url, key)) as Arc<dyn Provider>
    });
    if provider.is_none() {
        warn!("BROOK_API_KEY is not set; chat requests will be rejected");
    }

    let app = router(Arc::new(RelayState::new(provider)));
    let listener = tokio::net::TcpListener::bind(&config.listen).await?;
    info!(addr = %config.listen, "relay listening");
    axum::serve(listener, app).await?;

    Ok(())
}

pub fn router(state: Arc<RelayState>) -> axum::Router {
    axum::Router::new()
        .route("/chat", post(chat))
        .with_state(state)
}

async fn chat(
    State(state): State<Arc<RelayState>>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    // Parsed by hand so a malformed body gets the JSON error shape rather
    // than the extractor's plain-text rejection.
    let request: ChatRequest = serde_json::from_slice(&body)
        .map_err(|_| error_response(StatusCode::BAD_REQUEST, "Invalid JSON in request body"))?;

    if request.messages.is_empty() {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "Messages array is required and must not be empty",
        ));
    }

    let provider = state.provider.as_ref().ok_or_else(|| {
        error_response(StatusCode::INTERNAL_SERVER_ERROR, "API key is not configured")
    })?;

    debug!(messages = request.messages.len(), "forwarding chat request");

    let chunks = provider
        .send(&request.messages)
        .await
        .map_err(provider_error_response)?;

    let stream = chunks.map(|chunk| {
        let data = serde_json::to_string(&chunk).unwrap_or_default();
        Ok::<Event, Infallible>(Event::default().data(data))
    });

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    ))
}

fn error_response(status: StatusCode, message: &str) -> ApiError {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
}

fn provider_error_response(err: ProviderError) -> ApiError {
    let status = match &err {
        ProviderError::Unauthorized => StatusCode::UNAUTHORIZED,
        ProviderError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        ProviderError::Unreachable => StatusCode::SERVICE_UNAVAILABLE,
        ProviderError::Api { .. } | ProviderError::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };

    let message = err.to_string();
    let message = if message.is_empty() {
        "Internal server error".to_string()
    } else {
        message
    };

    (status, Json(ErrorBody { error: message }))
}
