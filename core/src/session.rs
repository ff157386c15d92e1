use std::sync::Arc;

use activity_feed_api::ActivityItem;
use activity_feed_api::auth::AuthProvider;
use activity_feed_client::HttpTransport;
use futures::StreamExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::auth::Authenticator;
use crate::error::FeedError;
use crate::loader::FeedLoader;
use crate::loader::FeedStreamEvent;
use crate::loader::ResumeCursor;
use crate::loader::StreamStatus;
use crate::view::FeedView;
use crate::view::InvalidTransition;

/// Drives one feed view from sign-in to a live, loaded list.
pub struct FeedSession<T: HttpTransport, A: AuthProvider> {
    loader: FeedLoader<T, A>,
    authenticator: Arc<dyn Authenticator>,
}

impl<T, A> FeedSession<T, A>
where
    T: HttpTransport + 'static,
    A: AuthProvider + 'static,
{
    pub fn new(loader: FeedLoader<T, A>, authenticator: Arc<dyn Authenticator>) -> Self {
        Self {
            loader,
            authenticator,
        }
    }

    /// Sign in if needed and load once, without a stream. The returned view
    /// is `Unauthenticated`, `Loaded` or `Failed`.
    pub async fn load_once(&self) -> FeedView {
        let mut view = FeedView::new();
        if self.authenticate(&mut view, &|_: &FeedView| {}).await.is_err() {
            return view;
        }
        match self.loader.load_initial().await {
            Ok(items) => checked(view.finish_loading(items)),
            Err(err) => checked(view.fail(err)),
        }
        view
    }

    /// Publish every state of the view into `tx` until the stream ends, the
    /// token is cancelled or every receiver is gone. The stream is closed on
    /// all of those paths.
    pub async fn run(
        &self,
        tx: watch::Sender<FeedView>,
        cancel: CancellationToken,
    ) -> Result<(), FeedError> {
        let mut view = FeedView::new();
        let publish = |view: &FeedView| {
            tx.send_replace(view.clone());
        };
        publish(&view);

        self.authenticate(&mut view, &publish).await?;

        let cursor = ResumeCursor::default();
        let mut events = self.loader.stream_events(cursor.clone());
        let mut pending: Vec<ActivityItem> = Vec::new();

        let load = self.loader.load_initial();
        tokio::pin!(load);
        let initial = loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = tx.closed() => return Ok(()),
                result = &mut load => break result,
                Some(event) = events.next() => match event {
                    FeedStreamEvent::Items(items) => pending.extend(items),
                    FeedStreamEvent::Status(status) => {
                        if view.stream_status() != Some(&status) {
                            view.set_stream_status(status);
                            publish(&view);
                        }
                    }
                },
            }
        };

        match initial {
            Ok(items) => {
                cursor.observe(&items);
                checked(view.finish_loading(items));
                if !pending.is_empty() {
                    debug!(count = pending.len(), "merging items streamed during load");
                }
                for item in pending.drain(..) {
                    checked(view.apply_stream_item(item).map(|_| ()));
                }
                publish(&view);
            }
            Err(err) => {
                checked(view.fail(err.clone()));
                publish(&view);
                return Err(err);
            }
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tx.closed() => break,
                event = events.next() => match event {
                    Some(FeedStreamEvent::Items(items)) => {
                        let mut changed = false;
                        for item in items {
                            match view.apply_stream_item(item) {
                                Ok(outcome) => changed |= outcome.changed(),
                                Err(err) => warn!(%err, "dropping stream item"),
                            }
                        }
                        if changed {
                            publish(&view);
                        }
                    }
                    Some(FeedStreamEvent::Status(status)) => {
                        if let StreamStatus::Disconnected { error } = &status {
                            info!(%error, "live updates stopped; keeping loaded feed");
                        }
                        if view.stream_status() != Some(&status) {
                            view.set_stream_status(status);
                            publish(&view);
                        }
                    }
                    None => break,
                },
            }
        }
        Ok(())
    }

    async fn authenticate(
        &self,
        view: &mut FeedView,
        publish: &(dyn Fn(&FeedView) + Sync),
    ) -> Result<(), FeedError> {
        checked(view.begin_sign_in());
        if !self.authenticator.is_signed_in() {
            publish(view);
            if let Err(err) = self.authenticator.initiate_sign_in().await {
                debug!(%err, "sign-in did not complete");
                checked(view.sign_in_failed());
                publish(view);
                return Err(err);
            }
        }
        checked(view.begin_loading());
        publish(view);
        Ok(())
    }
}

fn checked(result: Result<(), InvalidTransition>) {
    if let Err(err) = result {
        warn!(%err, "ignored feed view transition");
    }
}
