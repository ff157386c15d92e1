use std::collections::BTreeMap;
use std::time::Duration;

use activity_feed_client::Request;
use activity_feed_client::RetryOn;
use activity_feed_client::RetryPolicy;
use activity_feed_client::TransportError;
use http::HeaderMap;
use http::Method;
use url::Url;

use crate::error::ApiError;

/// Reconnect budget for the event stream.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u64,
    pub base_delay: Duration,
    pub retry_429: bool,
    pub retry_5xx: bool,
    pub retry_transport: bool,
}

impl RetryConfig {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: self.base_delay,
            retry_on: RetryOn {
                retry_429: self.retry_429,
                retry_5xx: self.retry_5xx,
                retry_transport: self.retry_transport,
            },
        }
    }
}

/// Where the dashboard API lives and how to talk to it.
#[derive(Debug, Clone)]
pub struct Provider {
    pub name: String,
    pub base_url: String,
    /// Static query parameters appended to every request.
    pub query_params: Option<BTreeMap<String, String>>,
    pub headers: HeaderMap,
    /// Deadline for buffered requests; never applied to the stream.
    pub request_timeout: Option<Duration>,
    pub stream_retry: RetryConfig,
    /// `None` waits on a silent stream forever.
    pub stream_idle_timeout: Option<Duration>,
}

impl Provider {
    pub fn url_for_path(&self, path: &str, query: &[(&str, String)]) -> Result<String, ApiError> {
        let base = self.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        let mut url = Url::parse(&format!("{base}/{path}")).map_err(|err| {
            ApiError::Transport(TransportError::Build(format!(
                "invalid base url {:?}: {err}",
                self.base_url
            )))
        })?;

        let has_params = self
            .query_params
            .as_ref()
            .is_some_and(|params| !params.is_empty())
            || !query.is_empty();
        if has_params {
            let mut pairs = url.query_pairs_mut();
            if let Some(params) = &self.query_params {
                for (key, value) in params {
                    pairs.append_pair(key, value);
                }
            }
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }

        Ok(url.to_string())
    }

    pub fn build_request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Request, ApiError> {
        let mut req = Request::new(method, self.url_for_path(path, query)?);
        req.headers.extend(self.headers.clone());
        Ok(req)
    }
}
