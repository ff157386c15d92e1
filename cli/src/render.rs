use std::io;
use std::io::Write;

use activity_feed_core::ActivityItem;
use activity_feed_core::FeedPhase;
use activity_feed_core::FeedView;
use activity_feed_core::StreamStatus;
use owo_colors::OwoColorize;

pub const SIGN_IN_PROMPT: &str = "Sign in to view the feed.";
pub const SIGN_IN_HINT: &str =
    "Run `activity-feed login --token <TOKEN>` or set ACTIVITY_FEED_TOKEN.";
pub const SIGNING_IN: &str = "Signing in…";
pub const LOADING: &str = "Loading activity…";
pub const WAITING_FOR_COMMENTS: &str = "Waiting for new comments…";

const DEFAULT_WIDTH: usize = 80;

/// Text rendering of feed views.
#[derive(Debug, Clone, Copy)]
pub struct Renderer {
    ansi: bool,
    width: usize,
}

impl Renderer {
    pub fn new(ansi: bool) -> Self {
        Self {
            ansi,
            width: DEFAULT_WIDTH,
        }
    }

    pub fn write_view<W: Write>(&self, view: &FeedView, writer: &mut W) -> io::Result<()> {
        match view.phase() {
            FeedPhase::Unauthenticated => {
                writeln!(writer, "{SIGN_IN_PROMPT}")?;
                writeln!(writer, "{}", self.dim(SIGN_IN_HINT))
            }
            FeedPhase::Authenticating => writeln!(writer, "{}", self.dim(SIGNING_IN)),
            FeedPhase::Loading => writeln!(writer, "{}", self.dim(LOADING)),
            FeedPhase::Loaded(items) if items.is_empty() => {
                writeln!(writer, "{WAITING_FOR_COMMENTS}")
            }
            FeedPhase::Loaded(items) => {
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        writeln!(writer)?;
                    }
                    self.write_card(item, writer)?;
                }
                Ok(())
            }
            FeedPhase::Failed(err) => writeln!(writer, "{}", self.error(&err.user_message())),
        }
    }

    /// One comment: task and board, author and time, then the message.
    pub fn write_card<W: Write>(&self, item: &ActivityItem, writer: &mut W) -> io::Result<()> {
        let title = item
            .task_title
            .clone()
            .unwrap_or_else(|| format!("Task {}", item.task_id));
        let board = item.board_name.as_deref().unwrap_or(&item.board_id);
        writeln!(writer, "{} · {board}", self.bold(&title))?;

        let author = match (&item.agent_name, &item.agent_role) {
            (Some(name), Some(role)) => format!("{name} ({role})"),
            (Some(name), None) => name.clone(),
            (None, _) => "Unknown author".to_string(),
        };
        let when = item.created_at.format("%Y-%m-%d %H:%M UTC");
        writeln!(writer, "{}", self.dim(&format!("{author} · {when}")))?;

        let options = textwrap::Options::new(self.width)
            .initial_indent("  ")
            .subsequent_indent("  ");
        writeln!(writer, "{}", textwrap::fill(&item.message, options))
    }

    /// One line describing a stream status change, if it is worth showing.
    pub fn stream_status_line(&self, status: &StreamStatus) -> Option<String> {
        match status {
            StreamStatus::Connecting | StreamStatus::Connected => None,
            StreamStatus::Reconnecting { attempt, delay } => Some(self.dim(&format!(
                "Live updates interrupted; reconnecting in {}ms (attempt {attempt})",
                delay.as_millis()
            ))),
            StreamStatus::Disconnected { error } => Some(self.error(&error.user_message())),
        }
    }

    fn bold(&self, text: &str) -> String {
        if self.ansi {
            text.bold().to_string()
        } else {
            text.to_string()
        }
    }

    fn dim(&self, text: &str) -> String {
        if self.ansi {
            text.dimmed().to_string()
        } else {
            text.to_string()
        }
    }

    fn error(&self, text: &str) -> String {
        if self.ansi {
            text.red().to_string()
        } else {
            text.to_string()
        }
    }
}
