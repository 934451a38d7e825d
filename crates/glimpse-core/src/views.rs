//! View tracking: seen marks, viewer lists and story analytics.

use std::collections::HashMap;

use chrono::Utc;
use glimpse_types::api::{AnalyticsResponse, ItemViewCount, ViewerEntry, ViewersResponse};
use glimpse_types::models::Viewer;

use crate::cache::bump_users;
use crate::error::{StoryError, StoryResult};
use crate::StoryEngine;

const VIEWERS_LIMIT_DEFAULT: usize = 50;
const VIEWERS_LIMIT_MAX: usize = 200;

impl StoryEngine {
    /// Mark an item seen. Safe to repeat; only `viewed_at` moves.
    pub fn mark_seen(&self, viewer: Viewer, item_id: i64) -> StoryResult<()> {
        let item = self.db.get_item(item_id)?.ok_or(StoryError::NotFound)?;
        self.viewable_story(viewer, item.story_id)?;
        self.db.mark_seen(item.id, viewer.id, Utc::now())?;
        bump_users(self.salts.as_ref(), &[viewer.id]);
        Ok(())
    }

    /// Seen state for each of `item_ids`, answered with one query.
    pub fn has_seen_any(&self, item_ids: &[i64], viewer_id: i64) -> StoryResult<HashMap<i64, bool>> {
        let seen = self.db.seen_item_ids(item_ids, viewer_id)?;
        Ok(item_ids.iter().map(|id| (*id, seen.contains(id))).collect())
    }

    /// Distinct viewers of a story, most recent first, with each viewer's
    /// reaction if they left one.
    pub fn viewers_of(&self, viewer: Viewer, story_id: i64, limit: Option<i64>) -> StoryResult<ViewersResponse> {
        let story = self.managed_story(viewer, story_id)?;
        let limit = match limit {
            Some(n) if n >= 1 => (n as usize).min(VIEWERS_LIMIT_MAX),
            _ => VIEWERS_LIMIT_DEFAULT,
        };

        let item_ids = self.item_ids(story.id)?;
        let rows = self.db.story_viewers(&item_ids, limit)?;
        let user_ids: Vec<i64> = rows.iter().map(|r| r.viewer_id).collect();
        let mut reactions = self.db.reactions_by_users(story.id, &user_ids)?;
        let total_count = self.db.unique_viewer_count(&item_ids)?;

        Ok(ViewersResponse {
            viewers: rows
                .into_iter()
                .map(|row| ViewerEntry {
                    reaction: reactions.remove(&row.viewer_id),
                    user_id: row.viewer_id,
                    username: row.username,
                    viewed_at: row.last_viewed_at,
                })
                .collect(),
            total_count,
        })
    }

    pub fn analytics(&self, viewer: Viewer, story_id: i64) -> StoryResult<AnalyticsResponse> {
        let story = self.managed_story(viewer, story_id)?;
        let item_ids = self.item_ids(story.id)?;
        let stats = self.db.view_stats(&item_ids)?;

        Ok(AnalyticsResponse {
            story_id: story.id,
            total_views: stats.total_views,
            unique_viewers: stats.unique_viewers,
            views_by_item: stats
                .views_by_item
                .into_iter()
                .map(|(item_id, view_count)| ItemViewCount {
                    item_id,
                    view_count,
                })
                .collect(),
            reactions: self.db.reaction_counts(story.id)?,
            reply_count: self.db.reply_count(story.id)?,
        })
    }

    fn item_ids(&self, story_id: i64) -> StoryResult<Vec<i64>> {
        Ok(self
            .db
            .items_for_stories(&[story_id])?
            .into_iter()
            .map(|item| item.id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{engine, story, user};
    use glimpse_types::models::Privacy;

    #[test]
    fn mark_seen_is_idempotent() {
        let engine = engine();
        let author = user(&engine, "author");
        let v = Viewer::new(user(&engine, "viewer"), false);
        let sid = story(&engine, author, Privacy::Public, 2);
        let items = engine.item_ids(sid).unwrap();

        engine.mark_seen(v, items[0]).unwrap();
        let after_first = engine.has_seen_any(&items, v.id).unwrap();
        engine.mark_seen(v, items[0]).unwrap();

        assert_eq!(engine.db().view_row_count(items[0], v.id).unwrap(), 1);
        assert!(after_first[&items[0]]);
        assert!(!engine.has_seen_any(&items, v.id).unwrap()[&items[1]]);
    }

    #[test]
    fn mark_seen_requires_visibility() {
        let engine = engine();
        let author = user(&engine, "author");
        let v = Viewer::new(user(&engine, "viewer"), false);
        let sid = story(&engine, author, Privacy::Friends, 1);
        let items = engine.item_ids(sid).unwrap();

        assert!(matches!(engine.mark_seen(v, items[0]), Err(StoryError::Forbidden)));
        assert!(matches!(engine.mark_seen(v, 4242), Err(StoryError::NotFound)));
        assert_eq!(engine.db().view_row_count(items[0], v.id).unwrap(), 0);
    }

    #[test]
    fn viewers_are_deduplicated_and_author_only() {
        let engine = engine();
        let author = Viewer::new(user(&engine, "author"), false);
        let a = Viewer::new(user(&engine, "a"), false);
        let b = Viewer::new(user(&engine, "b"), false);
        let sid = story(&engine, author.id, Privacy::Public, 2);
        let items = engine.item_ids(sid).unwrap();

        for item in &items {
            engine.mark_seen(a, *item).unwrap();
        }
        engine.mark_seen(b, items[0]).unwrap();
        engine
            .db()
            .upsert_reaction(sid, None, b.id, "❤️", Utc::now())
            .unwrap();

        let viewers = engine.viewers_of(author, sid, None).unwrap();
        assert_eq!(viewers.total_count, 2);
        assert_eq!(viewers.viewers.len(), 2);
        let b_entry = viewers.viewers.iter().find(|v| v.user_id == b.id).unwrap();
        assert_eq!(b_entry.reaction.as_deref(), Some("❤️"));

        assert!(matches!(engine.viewers_of(a, sid, None), Err(StoryError::Forbidden)));

        let analytics = engine.analytics(author, sid).unwrap();
        assert_eq!(analytics.total_views, 3);
        assert_eq!(analytics.unique_viewers, 2);
        assert_eq!(analytics.views_by_item.len(), 2);
    }
}
