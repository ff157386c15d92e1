use activity_feed_client::HttpTransport;
use http::HeaderValue;
use http::Method;
use http::header::ACCEPT;
use http::header::CACHE_CONTROL;
use tracing::debug;
use tracing::info;

use crate::auth::AuthProvider;
use crate::auth::add_auth_headers;
use crate::common::ActivityStream;
use crate::error::ApiError;
use crate::models::ActivityItem;
use crate::models::ActivityQuery;
use crate::models::TaskCommentFeed;
use crate::provider::Provider;
use crate::sse::spawn_activity_stream;

pub const TASK_COMMENTS_PATH: &str = "api/v1/activity/task-comments";
pub const TASK_COMMENTS_STREAM_PATH: &str = "api/v1/activity/task-comments/stream";

/// Client for the task-comment activity endpoints.
#[derive(Debug, Clone)]
pub struct ActivityClient<T: HttpTransport, A: AuthProvider> {
    transport: T,
    provider: Provider,
    auth: A,
}

impl<T: HttpTransport, A: AuthProvider> ActivityClient<T, A> {
    pub fn new(transport: T, provider: Provider, auth: A) -> Self {
        Self {
            transport,
            provider,
            auth,
        }
    }

    pub fn provider(&self) -> &Provider {
        &self.provider
    }

    /// Fetch one page of task comments in server order.
    pub async fn list_task_comments(
        &self,
        query: &ActivityQuery,
    ) -> Result<Vec<ActivityItem>, ApiError> {
        let mut req =
            self.provider
                .build_request(Method::GET, TASK_COMMENTS_PATH, &query.to_pairs())?;
        req.headers
            .insert(ACCEPT, HeaderValue::from_static("application/json"));
        let req = add_auth_headers(&self.auth, req).with_timeout(self.provider.request_timeout);

        let resp = self.transport.execute(req).await?;
        let feed: TaskCommentFeed =
            serde_json::from_slice(&resp.body).map_err(|err| ApiError::Decode(err.to_string()))?;
        debug!(count = feed.items.len(), "loaded task comments");
        Ok(feed.items)
    }

    /// Open the task-comment event stream. The returned stream owns the
    /// connection.
    pub async fn stream_task_comments(
        &self,
        query: &ActivityQuery,
    ) -> Result<ActivityStream, ApiError> {
        let mut req = self.provider.build_request(
            Method::GET,
            TASK_COMMENTS_STREAM_PATH,
            &query.to_pairs(),
        )?;
        req.headers
            .insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
        req.headers
            .insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        let req = add_auth_headers(&self.auth, req);
        let url = req.url.clone();

        let resp = self.transport.stream(req).await?;
        info!(%url, status = %resp.status, "activity stream connected");
        Ok(spawn_activity_stream(
            resp,
            self.provider.stream_idle_timeout,
        ))
    }
}
