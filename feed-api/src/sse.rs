use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::Duration;

use activity_feed_client::StreamResponse;
use activity_feed_client::TransportError;
use eventsource_stream::Event;
use eventsource_stream::Eventsource;
use futures::Stream;
use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio::time::timeout_at;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use crate::common::ActivityStream;
use crate::error::ApiError;
use crate::models::ActivityItem;

const STREAM_CHANNEL_CAPACITY: usize = 256;

/// Shapes accepted in an event's `data:` field.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ActivityPayload {
    Batch(Vec<ActivityItem>),
    Items { items: Vec<ActivityItem> },
    Comment { comment: ActivityItem },
    Single(ActivityItem),
}

impl ActivityPayload {
    fn into_items(self) -> Vec<ActivityItem> {
        match self {
            ActivityPayload::Batch(items) | ActivityPayload::Items { items } => items,
            ActivityPayload::Comment { comment } => vec![comment],
            ActivityPayload::Single(item) => vec![item],
        }
    }
}

pub(crate) fn decode_items(data: &str) -> Result<Vec<ActivityItem>, serde_json::Error> {
    serde_json::from_str::<ActivityPayload>(data).map(ActivityPayload::into_items)
}

/// Spawn the reader task for an opened event stream.
pub(crate) fn spawn_activity_stream(
    response: StreamResponse,
    idle_timeout: Option<Duration>,
) -> ActivityStream {
    let (tx_event, rx_event) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
    let cancel = CancellationToken::new();
    let cancelled = cancel.clone();

    tokio::spawn(async move {
        tokio::select! {
            _ = cancelled.cancelled() => {
                debug!("activity stream reader cancelled");
            }
            _ = process_sse(response.bytes, tx_event, idle_timeout) => {}
        }
    });

    ActivityStream {
        rx_event,
        _cancel: cancel.drop_guard(),
    }
}

pub(crate) async fn process_sse<S, B>(
    stream: S,
    tx_event: mpsc::Sender<Result<Vec<ActivityItem>, ApiError>>,
    idle_timeout: Option<Duration>,
) where
    S: Stream<Item = Result<B, TransportError>> + Unpin,
    B: AsRef<[u8]>,
{
    // Any chunk counts as activity, including comment frames the decoder drops.
    let last_chunk = Arc::new(Mutex::new(Instant::now()));
    let touched = Arc::clone(&last_chunk);
    let mut stream = stream
        .inspect(move |_| {
            *touched.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
        })
        .eventsource();

    loop {
        let next_event = match idle_timeout {
            Some(idle_timeout) => loop {
                let deadline =
                    *last_chunk.lock().unwrap_or_else(PoisonError::into_inner) + idle_timeout;
                match timeout_at(deadline, stream.next()).await {
                    Ok(next_event) => break next_event,
                    Err(_) => {
                        let last = *last_chunk.lock().unwrap_or_else(PoisonError::into_inner);
                        if last + idle_timeout > Instant::now() {
                            continue;
                        }
                        let _ = tx_event
                            .send(Err(ApiError::Stream(
                                "idle timeout waiting for activity events".to_string(),
                            )))
                            .await;
                        return;
                    }
                }
            },
            None => stream.next().await,
        };

        match next_event {
            Some(Ok(event)) => {
                if !forward_event(event, &tx_event).await {
                    debug!("activity stream receiver dropped");
                    return;
                }
            }
            Some(Err(err)) => {
                let _ = tx_event.send(Err(ApiError::Stream(err.to_string()))).await;
                return;
            }
            None => {
                debug!("activity stream closed by server");
                return;
            }
        }
    }
}

/// Returns `false` once the receiver is gone.
async fn forward_event(
    event: Event,
    tx_event: &mpsc::Sender<Result<Vec<ActivityItem>, ApiError>>,
) -> bool {
    let data = event.data.trim();
    if data.is_empty() {
        trace!(event = %event.event, "skipping empty activity event");
        return true;
    }

    let items = match decode_items(data) {
        Ok(items) => items,
        Err(err) => {
            warn!(event = %event.event, error = %err, "skipping undecodable activity event");
            return true;
        }
    };
    if items.is_empty() {
        return true;
    }

    debug!(event = %event.event, count = items.len(), "received activity event");
    tx_event.send(Ok(items)).await.is_ok()
}
