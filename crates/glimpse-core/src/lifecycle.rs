//! Expiry sweep: archives stories past `expires_at` on an interval.

use std::time::Duration;

use chrono::{DateTime, Utc};
use glimpse_db::stories::{archive_if_expired, expired_stories};
use tracing::{debug, info, warn};

use crate::StoryEngine;
use crate::cache::{bump_global, bump_users};
use crate::error::StoryResult;

impl StoryEngine {
    /// Archive stories whose `expires_at` has passed. Returns how many this
    /// call archived. Each flip is a guarded update, so overlapping sweeps
    /// never archive the same story twice.
    pub fn sweep(&self, now: DateTime<Utc>) -> StoryResult<usize> {
        let batch = self.config.sweep_batch_size.max(1);
        let mut archived = 0;

        loop {
            let expired = self
                .db
                .with_conn(|conn| expired_stories(conn, now, batch))?;
            if expired.is_empty() {
                break;
            }

            let mut authors = Vec::with_capacity(expired.len());
            for &(story_id, author_id) in &expired {
                if self
                    .db
                    .with_conn_mut(|conn| archive_if_expired(conn, story_id, now))?
                {
                    debug!("Archived story {}", story_id);
                    authors.push(author_id);
                }
            }
            archived += authors.len();
            authors.sort_unstable();
            authors.dedup();
            bump_users(self.salts.as_ref(), &authors);

            // A short batch, or one another sweeper already drained, is the last.
            if expired.len() < batch || authors.is_empty() {
                break;
            }
        }

        if archived > 0 {
            bump_global(self.salts.as_ref());
        }
        Ok(archived)
    }
}

/// Background task that archives expired stories and prunes the feed cache.
///
/// Each pass runs on the blocking pool; a failed pass is logged and the loop
/// carries on at the next tick.
pub async fn run_sweep_loop(engine: StoryEngine, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));

    loop {
        interval.tick().await;

        let pass = engine.clone();
        let result = tokio::task::spawn_blocking(move || {
            pass.cache.run_pending_tasks();
            pass.sweep(Utc::now())
        })
        .await;

        match result {
            Ok(Ok(archived)) if archived > 0 => {
                info!("Sweep: archived {} expired stories", archived);
            }
            Ok(Ok(_)) => debug!("Sweep: nothing to archive"),
            Ok(Err(e)) => warn!("Sweep error: {}", e),
            Err(e) => warn!("Sweep task failed: {}", e),
        }
    }
}
