use activity_feed_client::TransportError;
use http::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Transport(TransportError),
    #[error("api error {status}: {}", detail.as_deref().unwrap_or("no detail"))]
    Api {
        status: StatusCode,
        detail: Option<String>,
    },
    #[error("failed to decode response: {0}")]
    Decode(String),
    #[error("stream error: {0}")]
    Stream(String),
}

impl ApiError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Api { status, .. } => Some(*status),
            ApiError::Transport(err) => err.status(),
            ApiError::Decode(_) | ApiError::Stream(_) => None,
        }
    }

    /// Human-readable detail supplied by the server, if it sent one.
    pub fn detail(&self) -> Option<&str> {
        match self {
            ApiError::Api { detail, .. } => detail.as_deref(),
            _ => None,
        }
    }
}

impl From<TransportError> for ApiError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Http { status, body, .. } => ApiError::Api {
                status,
                detail: body.as_deref().and_then(extract_detail),
            },
            other => ApiError::Transport(other),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    detail: Option<Value>,
}

/// Pull the user-facing message out of an error body.
///
/// Accepts `{"detail": "text"}`, `{"detail": {"message": "text"}}` and the
/// validation-list form `{"detail": [{"msg": "a"}, {"msg": "b"}]}` (joined
/// with `"; "`). Blank messages count as absent.
pub fn extract_detail(body: &str) -> Option<String> {
    let body: ErrorBody = serde_json::from_str(body).ok()?;
    match body.detail? {
        Value::String(text) => non_blank(&text),
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .and_then(non_blank),
        Value::Array(entries) => {
            let messages: Vec<String> = entries
                .iter()
                .filter_map(|entry| entry.get("msg").and_then(Value::as_str))
                .filter_map(non_blank)
                .collect();
            if messages.is_empty() {
                None
            } else {
                Some(messages.join("; "))
            }
        }
        _ => None,
    }
}

fn non_blank(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
