pub mod auth;
pub(crate) mod common;
pub mod endpoint;
pub mod error;
pub mod models;
pub mod provider;
pub(crate) mod sse;

pub use crate::common::ActivityStream;
pub use crate::endpoint::activity::ActivityClient;
pub use crate::endpoint::activity::TASK_COMMENTS_PATH;
pub use crate::endpoint::activity::TASK_COMMENTS_STREAM_PATH;
pub use crate::error::ApiError;
pub use crate::models::ActivityItem;
pub use crate::models::ActivityQuery;
pub use crate::models::TaskCommentFeed;
