use activity_feed_api::ApiError;
use thiserror::Error;
use tracing::debug;

/// Shown when a failed load carries no usable server detail.
pub const GENERIC_LOAD_ERROR: &str = "Unable to load feed.";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeedError {
    /// No signed-in session; the user has to sign in first.
    #[error("Sign in to view the feed.")]
    AuthRequired,

    /// The initial list request failed (non-2xx, network error or an
    /// undecodable body).
    #[error("{}", detail.as_deref().unwrap_or(GENERIC_LOAD_ERROR))]
    FetchFailed {
        status: Option<u16>,
        detail: Option<String>,
    },

    /// The live stream could not be kept open.
    #[error("live updates unavailable: {0}")]
    Stream(String),
}

impl FeedError {
    /// Text to put in front of the user. Server detail wins over the
    /// generic message.
    pub fn user_message(&self) -> String {
        self.to_string()
    }

    pub fn fetch_failed(err: ApiError) -> Self {
        debug!(error = %err, "initial activity load failed");
        FeedError::FetchFailed {
            status: err.status().map(|status| status.as_u16()),
            detail: err.detail().map(str::to_string),
        }
    }
}
