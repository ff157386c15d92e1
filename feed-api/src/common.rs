use std::pin::Pin;
use std::task::Context;
use std::task::Poll;

use futures::Stream;
use tokio::sync::mpsc;
use tokio_util::sync::DropGuard;

use crate::error::ApiError;
use crate::models::ActivityItem;

/// Live feed of activity batches decoded from the server-sent-event stream.
///
/// Each item is one event's worth of activity (a single comment or a batch).
/// The stream ends when the server closes the connection or after the first
/// error. Dropping it cancels the reader task and releases the connection.
pub struct ActivityStream {
    pub(crate) rx_event: mpsc::Receiver<Result<Vec<ActivityItem>, ApiError>>,
    pub(crate) _cancel: DropGuard,
}

impl Stream for ActivityStream {
    type Item = Result<Vec<ActivityItem>, ApiError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx_event.poll_recv(cx)
    }
}

impl std::fmt::Debug for ActivityStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityStream").finish_non_exhaustive()
    }
}
