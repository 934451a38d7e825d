//! Per-user hourly limits on engagement actions.
//!
//! Fixed one-hour windows keyed by `(user, action)`. A limit of 0 disables
//! the check for that action.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use glimpse_core::{StoryConfig, StoryError};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::ApiError;

const WINDOW: Duration = Duration::from_secs(3600);
const CLEANUP_THRESHOLD: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Reaction,
    Reply,
    Report,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Reaction => "reaction",
            Action::Reply => "reply",
            Action::Report => "report",
        }
    }
}

struct Window {
    started: Instant,
    count: u32,
}

pub struct ActionLimiter {
    reactions: u32,
    replies: u32,
    reports: u32,
    windows: Mutex<HashMap<(i64, Action), Window>>,
}

impl ActionLimiter {
    pub fn new(reactions: u32, replies: u32, reports: u32) -> Self {
        Self {
            reactions,
            replies,
            reports,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &StoryConfig) -> Self {
        Self::new(
            config.rate_limit_reactions,
            config.rate_limit_replies,
            config.rate_limit_reports,
        )
    }

    fn limit(&self, action: Action) -> u32 {
        match action {
            Action::Reaction => self.reactions,
            Action::Reply => self.replies,
            Action::Report => self.reports,
        }
    }

    /// Count one attempt at `action`, rejecting it once the hourly quota
    /// is spent.
    pub async fn check(&self, user_id: i64, action: Action) -> Result<(), ApiError> {
        let limit = self.limit(action);
        if limit == 0 {
            return Ok(());
        }

        let now = Instant::now();
        let mut windows = self.windows.lock().await;
        if windows.len() >= CLEANUP_THRESHOLD {
            windows.retain(|_, w| now.duration_since(w.started) < WINDOW);
        }

        let window = windows.entry((user_id, action)).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.duration_since(window.started) >= WINDOW {
            window.started = now;
            window.count = 0;
        }
        if window.count >= limit {
            debug!("User {} hit the {} limit", user_id, action.as_str());
            return Err(StoryError::RateLimited.into());
        }
        window.count += 1;
        Ok(())
    }
}
