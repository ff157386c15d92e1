use std::pin::Pin;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::task::Context;
use std::task::Poll;
use std::time::Duration;

use activity_feed_api::ActivityClient;
use activity_feed_api::ActivityItem;
use activity_feed_api::ActivityQuery;
use activity_feed_api::ApiError;
use activity_feed_api::auth::AuthProvider;
use activity_feed_client::HttpTransport;
use activity_feed_client::ReqwestTransport;
use activity_feed_client::RetryPolicy;
use activity_feed_client::TransportError;
use chrono::DateTime;
use chrono::Utc;
use futures::Stream;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::sync::DropGuard;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::config::Config;
use crate::error::FeedError;

const FEED_EVENT_CHANNEL_CAPACITY: usize = 64;

/// Connection state of the live stream, reported next to the items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamStatus {
    Connecting,
    Connected,
    /// Waiting `delay` before reconnect number `attempt` (1-based).
    Reconnecting { attempt: u64, delay: Duration },
    /// The reconnect budget is spent or the failure is not retryable. No
    /// more events follow.
    Disconnected { error: FeedError },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedStreamEvent {
    Status(StreamStatus),
    Items(Vec<ActivityItem>),
}

/// Newest `created_at` seen so far; sent as `since` when the stream
/// reconnects.
#[derive(Debug, Clone, Default)]
pub struct ResumeCursor(Arc<Mutex<Option<DateTime<Utc>>>>);

impl ResumeCursor {
    pub fn get(&self) -> Option<DateTime<Utc>> {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move the cursor forward; older instants are ignored.
    pub fn advance(&self, at: DateTime<Utc>) {
        let mut guard = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.is_none_or(|current| at > current) {
            *guard = Some(at);
        }
    }

    pub fn observe(&self, items: &[ActivityItem]) {
        if let Some(newest) = items.iter().map(|item| item.created_at).max() {
            self.advance(newest);
        }
    }
}

/// Reconnecting stream of [`FeedStreamEvent`]s. Dropping it stops the
/// background task and closes the connection.
pub struct FeedStream {
    rx_event: mpsc::Receiver<FeedStreamEvent>,
    _cancel: DropGuard,
}

impl Stream for FeedStream {
    type Item = FeedStreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx_event.poll_recv(cx)
    }
}

impl std::fmt::Debug for FeedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedStream").finish_non_exhaustive()
    }
}

/// Handle returned by [`FeedLoader::subscribe_stream`]. The subscription
/// ends when this handle is dropped or cancelled.
#[derive(Debug)]
pub struct StreamSubscription {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl StreamSubscription {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the subscription to end on its own (stream gave up) or
    /// through [`StreamSubscription::cancel`].
    pub async fn join(mut self) {
        if let Err(err) = (&mut self.handle).await {
            debug!(error = %err, "stream subscription task ended abnormally");
        }
    }
}

impl Drop for StreamSubscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Loads the first page of task comments and keeps a live stream attached.
pub struct FeedLoader<T: HttpTransport, A: AuthProvider> {
    client: Arc<ActivityClient<T, A>>,
    query: ActivityQuery,
}

impl<A: AuthProvider + 'static> FeedLoader<ReqwestTransport, A> {
    pub fn from_config(config: &Config, auth: A) -> Result<Self, TransportError> {
        let transport = ReqwestTransport::with_connect_timeout(config.connect_timeout)?;
        let client = ActivityClient::new(transport, config.provider(), auth);
        Ok(Self::new(client, config.query()))
    }
}

impl<T, A> FeedLoader<T, A>
where
    T: HttpTransport + 'static,
    A: AuthProvider + 'static,
{
    pub fn new(client: ActivityClient<T, A>, query: ActivityQuery) -> Self {
        Self {
            client: Arc::new(client),
            query,
        }
    }

    pub fn query(&self) -> &ActivityQuery {
        &self.query
    }

    /// One GET of the list endpoint. Items come back in server order. No
    /// retry: a failure is final for this attempt.
    pub async fn load_initial(&self) -> Result<Vec<ActivityItem>, FeedError> {
        match self.client.list_task_comments(&self.query).await {
            Ok(items) => {
                info!(count = items.len(), "initial activity loaded");
                Ok(items)
            }
            Err(err) => Err(FeedError::fetch_failed(err)),
        }
    }

    /// Open the live stream in a background task, reconnecting with backoff
    /// under the provider's stream retry budget.
    pub fn stream_events(&self, cursor: ResumeCursor) -> FeedStream {
        let (tx_event, rx_event) = mpsc::channel(FEED_EVENT_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let client = Arc::clone(&self.client);
        let query = self.query.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = task_cancel.cancelled() => {
                    debug!("activity stream cancelled");
                }
                _ = run_stream(client, query, cursor, tx_event) => {}
            }
        });

        FeedStream {
            rx_event,
            _cancel: cancel.drop_guard(),
        }
    }

    /// Forward every streamed item to `on_item` until the returned handle is
    /// dropped or the stream gives up. Status changes are only logged.
    pub fn subscribe_stream<F>(&self, mut on_item: F) -> StreamSubscription
    where
        F: FnMut(ActivityItem) + Send + 'static,
    {
        let mut events = self.stream_events(ResumeCursor::default());
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();

        let handle = tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    event = events.next() => event,
                };
                match event {
                    Some(FeedStreamEvent::Items(items)) => items.into_iter().for_each(&mut on_item),
                    Some(FeedStreamEvent::Status(status)) => {
                        debug!(?status, "activity stream status");
                    }
                    None => break,
                }
            }
        });

        StreamSubscription { cancel, handle }
    }
}

async fn run_stream<T, A>(
    client: Arc<ActivityClient<T, A>>,
    mut query: ActivityQuery,
    cursor: ResumeCursor,
    tx_event: mpsc::Sender<FeedStreamEvent>,
) where
    T: HttpTransport,
    A: AuthProvider,
{
    let policy = client.provider().stream_retry.to_policy();
    let mut attempt: u64 = 0;
    let mut quiet_closes: u64 = 0;

    if tx_event
        .send(FeedStreamEvent::Status(StreamStatus::Connecting))
        .await
        .is_err()
    {
        return;
    }

    loop {
        query.since = cursor.get();
        let failure = match client.stream_task_comments(&query).await {
            Ok(mut stream) => {
                if tx_event
                    .send(FeedStreamEvent::Status(StreamStatus::Connected))
                    .await
                    .is_err()
                {
                    return;
                }
                let mut delivered = false;
                let failure = loop {
                    match stream.next().await {
                        Some(Ok(items)) => {
                            delivered = true;
                            cursor.observe(&items);
                            if tx_event.send(FeedStreamEvent::Items(items)).await.is_err() {
                                return;
                            }
                        }
                        Some(Err(err)) => break Some(err),
                        None => break None,
                    }
                };
                if delivered {
                    attempt = 0;
                    quiet_closes = 0;
                }
                failure
            }
            Err(err) => Some(err),
        };

        // A clean close is the server's normal idle behaviour: reconnect
        // without touching the failure budget or the published status.
        let Some(err) = failure else {
            quiet_closes += 1;
            let delay = policy.delay_for(quiet_closes);
            debug!(quiet_closes, ?delay, "activity stream closed by server; reconnecting");
            tokio::time::sleep(delay).await;
            continue;
        };

        let reason = err.to_string();
        attempt += 1;
        if !is_retryable(&policy, &err) || !policy.allows(attempt) {
            warn!(%reason, attempt, "activity stream disconnected");
            let error = FeedError::Stream(reason);
            let _ = tx_event
                .send(FeedStreamEvent::Status(StreamStatus::Disconnected { error }))
                .await;
            return;
        }

        let delay = policy.delay_for(attempt);
        warn!(%reason, attempt, ?delay, "activity stream dropped; reconnecting");
        if tx_event
            .send(FeedStreamEvent::Status(StreamStatus::Reconnecting {
                attempt,
                delay,
            }))
            .await
            .is_err()
        {
            return;
        }
        tokio::time::sleep(delay).await;
    }
}

fn is_retryable(policy: &RetryPolicy, err: &ApiError) -> bool {
    match err {
        ApiError::Api { status, .. } => policy.retry_on.matches_status(*status),
        ApiError::Transport(err) => policy.retry_on.matches(err),
        ApiError::Stream(_) => policy.retry_on.retry_transport,
        ApiError::Decode(_) => false,
    }
}
