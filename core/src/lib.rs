//! Activity feed domain: configuration, the sign-in capability, the merge
//! reducer and the loader/session that keep a feed view current.

pub mod auth;
pub mod config;
mod error;
pub mod items;
pub mod loader;
pub mod session;
pub mod view;

pub use activity_feed_api::ActivityItem;
pub use activity_feed_api::ActivityQuery;
pub use auth::Authenticator;
pub use auth::TokenAuth;
pub use config::Config;
pub use config::ConfigError;
pub use config::ConfigOverrides;
pub use error::FeedError;
pub use error::GENERIC_LOAD_ERROR;
pub use items::FeedItems;
pub use items::MergeOutcome;
pub use loader::FeedLoader;
pub use loader::FeedStream;
pub use loader::FeedStreamEvent;
pub use loader::StreamStatus;
pub use loader::StreamSubscription;
pub use session::FeedSession;
pub use view::FeedPhase;
pub use view::FeedView;
