use activity_feed_api::ActivityItem;
use thiserror::Error;

use crate::error::FeedError;
use crate::items::FeedItems;
use crate::items::MergeOutcome;
use crate::loader::StreamStatus;

/// Where the feed view is in its lifecycle.
///
/// `Unauthenticated -> Authenticating -> Loading -> Loaded | Failed`.
/// `Loaded` absorbs stream items in place; `Failed` only leaves through
/// [`FeedView::reset`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedPhase {
    Unauthenticated,
    Authenticating,
    Loading,
    /// May be empty; an empty feed is waiting for comments, not an error.
    Loaded(FeedItems),
    Failed(FeedError),
}

impl FeedPhase {
    fn name(&self) -> &'static str {
        match self {
            FeedPhase::Unauthenticated => "unauthenticated",
            FeedPhase::Authenticating => "authenticating",
            FeedPhase::Loading => "loading",
            FeedPhase::Loaded(_) => "loaded",
            FeedPhase::Failed(_) => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot {action} while {from}")]
pub struct InvalidTransition {
    pub from: &'static str,
    pub action: &'static str,
}

/// Snapshot of everything a front end needs to draw the feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedView {
    phase: FeedPhase,
    stream: Option<StreamStatus>,
}

impl Default for FeedView {
    fn default() -> Self {
        Self::new()
    }
}

impl FeedView {
    pub fn new() -> Self {
        Self {
            phase: FeedPhase::Unauthenticated,
            stream: None,
        }
    }

    pub fn phase(&self) -> &FeedPhase {
        &self.phase
    }

    pub fn items(&self) -> Option<&FeedItems> {
        match &self.phase {
            FeedPhase::Loaded(items) => Some(items),
            _ => None,
        }
    }

    pub fn stream_status(&self) -> Option<&StreamStatus> {
        self.stream.as_ref()
    }

    pub fn begin_sign_in(&mut self) -> Result<(), InvalidTransition> {
        self.transition("begin sign-in", |phase| match phase {
            FeedPhase::Unauthenticated => Some(FeedPhase::Authenticating),
            _ => None,
        })
    }

    pub fn sign_in_failed(&mut self) -> Result<(), InvalidTransition> {
        self.transition("abandon sign-in", |phase| match phase {
            FeedPhase::Authenticating => Some(FeedPhase::Unauthenticated),
            _ => None,
        })
    }

    pub fn begin_loading(&mut self) -> Result<(), InvalidTransition> {
        self.transition("start loading", |phase| match phase {
            FeedPhase::Authenticating => Some(FeedPhase::Loading),
            _ => None,
        })
    }

    pub fn finish_loading(&mut self, items: Vec<ActivityItem>) -> Result<(), InvalidTransition> {
        if !matches!(self.phase, FeedPhase::Loading) {
            return Err(self.invalid("finish loading"));
        }
        self.phase = FeedPhase::Loaded(FeedItems::from_initial(items));
        Ok(())
    }

    pub fn fail(&mut self, error: FeedError) -> Result<(), InvalidTransition> {
        if !matches!(self.phase, FeedPhase::Loading) {
            return Err(self.invalid("fail"));
        }
        self.phase = FeedPhase::Failed(error);
        Ok(())
    }

    /// Merge a streamed item into a loaded feed.
    pub fn apply_stream_item(
        &mut self,
        item: ActivityItem,
    ) -> Result<MergeOutcome, InvalidTransition> {
        match &mut self.phase {
            FeedPhase::Loaded(items) => Ok(items.apply(item)),
            _ => Err(self.invalid("apply a stream item")),
        }
    }

    /// Record the stream's connection state. Never changes the phase.
    pub fn set_stream_status(&mut self, status: StreamStatus) {
        self.stream = Some(status);
    }

    /// Back to `Unauthenticated`, dropping items and stream state.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    fn transition(
        &mut self,
        action: &'static str,
        next: impl FnOnce(&FeedPhase) -> Option<FeedPhase>,
    ) -> Result<(), InvalidTransition> {
        match next(&self.phase) {
            Some(phase) => {
                self.phase = phase;
                Ok(())
            }
            None => Err(self.invalid(action)),
        }
    }

    fn invalid(&self, action: &'static str) -> InvalidTransition {
        InvalidTransition {
            from: self.phase.name(),
            action,
        }
    }
}
