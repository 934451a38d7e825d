//! Story creation, detail, update, delete, archive listing and hide-lists.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, NaiveTime, Utc};
use glimpse_db::stories::{self as store, NewItem};
use glimpse_types::api::{
    API_VERSION, ArchiveResponse, ArchivedStory, ItemAnalytics, ItemPayload, StickerPayload,
    StoryDetail, StorySummaryAnalytics, UpdateStoryRequest, UpdateStoryResponse, UserSummary,
};
use glimpse_types::events::StoryEvent;
use glimpse_types::models::{MediaType, Privacy, StoryItem, Viewer};
use tracing::{info, warn};

use crate::cache::{Salts, bump_global, bump_users, cache_key};
use crate::error::{StoryError, StoryResult};
use crate::feed::author_info;
use crate::visibility::can_manage;
use crate::StoryEngine;

/// Public path a stored media object is served from.
pub fn media_url(media_id: &str) -> String {
    format!("/media/{}", media_id)
}

/// Midnight UTC of the day `now` falls in. Daily upload quotas reset here.
pub fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// A stored upload ready to be attached to a story.
#[derive(Debug, Clone)]
pub struct PublishItem<'a> {
    pub media_id: &'a str,
    pub media_type: MediaType,
    pub mime: &'a str,
    /// Client-reported playback length; only kept for videos.
    pub duration_ms: Option<u32>,
    pub privacy: Option<&'a str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Published {
    pub story_id: i64,
    pub item_id: i64,
    pub new_story: bool,
}

impl StoryEngine {
    /// Validate an upload before its bytes are stored.
    pub fn check_upload(&self, viewer: Viewer, mime: &str, size: usize) -> StoryResult<MediaType> {
        if !viewer.is_authenticated() {
            return Err(StoryError::Forbidden);
        }
        if size == 0 {
            return Err(StoryError::invalid("Empty upload"));
        }
        if size > self.config.max_upload_bytes() {
            return Err(StoryError::invalid(format!(
                "File too large (max {} MB)",
                self.config.max_upload_mb
            )));
        }
        if !self.config.is_allowed_mime(mime) {
            return Err(StoryError::invalid(format!("Unsupported media type: {}", mime)));
        }

        let limit = self.config.max_uploads_per_day;
        if limit > 0 {
            let since = start_of_day(Utc::now());
            if self.db.count_items_since(viewer.id, since)? >= limit {
                return Err(StoryError::RateLimited);
            }
        }

        Ok(MediaType::from_mime(mime))
    }

    /// Attach a stored upload to the author's open story, or start a new one
    /// when there is none or it is full.
    pub fn publish_item(&self, viewer: Viewer, upload: &PublishItem<'_>) -> StoryResult<Published> {
        if !viewer.is_authenticated() {
            return Err(StoryError::Forbidden);
        }
        let author_id = viewer.id;
        let now = Utc::now();
        let privacy = Privacy::normalize(upload.privacy);
        let duration_ms = match upload.media_type {
            MediaType::Image => Some(self.config.image_duration_ms),
            MediaType::Video => upload.duration_ms.filter(|&ms| ms > 0),
        };
        let item = NewItem {
            media_id: upload.media_id,
            media_type: upload.media_type,
            mime: upload.mime,
            duration_ms,
        };
        let max_items = self.config.max_items_per_story;
        let expires_at = now + self.config.story_duration();

        let published = self.db.with_tx(|conn| {
            let open = match store::latest_active_story(conn, author_id, now)? {
                Some(story) => {
                    let full = max_items > 0 && store::item_count(conn, story.id)? >= max_items;
                    (!full).then_some(story.id)
                }
                None => None,
            };
            let (story_id, new_story) = match open {
                Some(id) => (id, false),
                None => (store::insert_story(conn, author_id, privacy, now, expires_at)?, true),
            };
            let item_id = store::append_item(conn, story_id, author_id, &item, now)?;
            Ok(Published {
                story_id,
                item_id,
                new_story,
            })
        })?;

        bump_users(self.salts.as_ref(), &[author_id]);
        bump_global(self.salts.as_ref());

        if published.new_story {
            info!("User {} started story {}", author_id, published.story_id);
        }
        self.sink.notify(StoryEvent::StoryCreated {
            story_id: published.story_id,
            item_id: published.item_id,
            author_id,
        });

        Ok(published)
    }

    /// Full story with items. Archived or expired stories are only shown to
    /// their managers.
    pub fn story_detail(&self, viewer: Viewer, story_id: i64, compact: bool) -> StoryResult<StoryDetail> {
        let story = self.viewable_story(viewer, story_id)?;
        let manage = can_manage(&story, viewer);
        if !manage && (story.is_archived || story.is_expired(Utc::now())) {
            return Err(StoryError::NotFound);
        }

        let items = self.db.items_for_stories(&[story.id])?;
        let item_ids: Vec<i64> = items.iter().map(|i| i.id).collect();

        let mut analytics = None;
        let mut per_item: HashMap<i64, ItemAnalytics> = HashMap::new();
        if manage {
            let stats = self.db.view_stats(&item_ids)?;
            let reactions = self.db.reaction_counts(story.id)?;
            let by_item = self.db.reaction_counts_by_item(story.id)?;
            let views: HashMap<i64, i64> = stats.views_by_item.iter().copied().collect();
            for id in &item_ids {
                per_item.insert(
                    *id,
                    ItemAnalytics {
                        view_count: views.get(id).copied().unwrap_or(0),
                        reaction_count: by_item.get(id).copied().unwrap_or(0),
                    },
                );
            }
            analytics = Some(StorySummaryAnalytics {
                view_count: stats.unique_viewers,
                reaction_count: reactions.iter().map(|r| r.count).sum(),
                reactions: if compact { Vec::new() } else { reactions },
            });
        }

        let mut stickers = if compact {
            None
        } else {
            Some(self.sticker_payloads(viewer, &item_ids)?)
        };

        let name = self.author_name(story.author_id);
        Ok(StoryDetail {
            api_version: API_VERSION.to_string(),
            story_id: story.id,
            author: author_info(story.author_id, name, compact),
            items: items
                .into_iter()
                .map(|item| {
                    let analytics = per_item.remove(&item.id);
                    let item_stickers = stickers
                        .as_mut()
                        .map(|by_item| by_item.remove(&item.id).unwrap_or_default());
                    item_payload(item, analytics, item_stickers)
                })
                .collect(),
            privacy: story.privacy,
            is_archived: story.is_archived,
            can_manage: manage,
            created_at: story.created_at,
            expires_at: story.expires_at,
            analytics,
        })
    }

    /// The item a stored media object belongs to, if the viewer may see it.
    /// Same rules as [`StoryEngine::story_detail`].
    pub fn media_item(&self, viewer: Viewer, media_id: &str) -> StoryResult<StoryItem> {
        let item = self
            .db
            .get_item_by_media(media_id)?
            .ok_or(StoryError::NotFound)?;
        let story = self.db.get_story(item.story_id)?.ok_or(StoryError::NotFound)?;
        if can_manage(&story, viewer) {
            return Ok(item);
        }
        let story = self.viewable_story(viewer, story.id)?;
        if story.is_archived || story.is_expired(Utc::now()) {
            return Err(StoryError::NotFound);
        }
        Ok(item)
    }

    /// Change privacy and/or archive state. Un-archiving restarts the expiry
    /// clock.
    pub fn update_story(
        &self,
        viewer: Viewer,
        story_id: i64,
        req: &UpdateStoryRequest,
    ) -> StoryResult<UpdateStoryResponse> {
        let mut story = self.managed_story(viewer, story_id)?;

        if let Some(raw) = req.privacy.as_deref() {
            let privacy = Privacy::normalize(Some(raw));
            self.db.set_privacy(story.id, privacy)?;
            story.privacy = privacy;
        }

        if let Some(archive) = req.archive {
            let expires_at = if archive {
                story.expires_at
            } else {
                Utc::now() + self.config.story_duration()
            };
            self.db.set_archived(story.id, archive, expires_at)?;
            story.is_archived = archive;
        }

        if req.privacy.is_some() || req.archive.is_some() {
            bump_users(self.salts.as_ref(), &[story.author_id]);
            bump_global(self.salts.as_ref());
        }

        Ok(UpdateStoryResponse {
            story_id: story.id,
            privacy: story.privacy,
            is_archived: story.is_archived,
        })
    }

    /// Delete a story and everything hanging off it. Returns the media ids
    /// its items referenced so the caller can drop the stored bytes.
    pub fn delete_story(&self, viewer: Viewer, story_id: i64) -> StoryResult<Vec<String>> {
        let story = self.managed_story(viewer, story_id)?;
        let media_ids: Vec<String> = self
            .db
            .items_for_stories(&[story.id])?
            .into_iter()
            .map(|item| item.media_id)
            .collect();
        if !self.db.delete_story(story.id)? {
            return Err(StoryError::NotFound);
        }
        info!("Story {} deleted by user {}", story.id, viewer.id);
        bump_users(self.salts.as_ref(), &[story.author_id]);
        bump_global(self.salts.as_ref());
        Ok(media_ids)
    }

    /// The caller's archived stories, newest first. `page` starts at 1.
    pub fn archive(&self, viewer: Viewer, limit: Option<i64>, page: Option<i64>) -> StoryResult<ArchiveResponse> {
        if !viewer.is_authenticated() {
            return Err(StoryError::Forbidden);
        }
        let limit = self.config.clamp_feed_limit(limit);
        let page = page.unwrap_or(1).max(1);
        let offset = (page as usize - 1).saturating_mul(limit);

        let key = Salts::load(self.salts.as_ref(), viewer.id)
            .map(|salts| cache_key("archive", &(viewer.id, limit, page, salts.user)))
            .map_err(|e| warn!("Salt lookup failed, serving archive uncached: {}", e))
            .ok();
        if let Some(hit) = key.as_ref().and_then(|k| self.cache.get(k)) {
            if let Ok(cached) = serde_json::from_str::<ArchiveResponse>(&hit) {
                return Ok(cached);
            }
        }

        let mut rows = self.db.archived_stories(viewer.id, limit + 1, offset)?;
        let has_more = rows.len() > limit;
        rows.truncate(limit);

        let story_ids: Vec<i64> = rows.iter().map(|s| s.id).collect();
        let mut items_by_story: HashMap<i64, Vec<StoryItem>> = HashMap::new();
        for item in self.db.items_for_stories(&story_ids)? {
            items_by_story.entry(item.story_id).or_default().push(item);
        }

        let viewers = self.db.unique_viewers_by_story(&story_ids)?;

        let mut stories = Vec::with_capacity(rows.len());
        for story in rows {
            let items = items_by_story.remove(&story.id).unwrap_or_default();
            stories.push(ArchivedStory {
                story_id: story.id,
                cover_thumb: items.first().map(|i| media_url(&i.media_id)).unwrap_or_default(),
                created_at: story.created_at,
                last_updated: story.updated_at,
                items_count: items.len(),
                privacy: story.privacy,
                view_count: viewers.get(&story.id).copied().unwrap_or(0),
            });
        }

        let response = ArchiveResponse {
            api_version: API_VERSION.to_string(),
            stories,
            has_more,
            page,
        };
        if let Some(key) = key {
            if let Ok(json) = serde_json::to_string(&response) {
                self.cache
                    .set(&key, json, Duration::from_secs(self.config.feed_cache_ttl_secs));
            }
        }
        Ok(response)
    }

    // -- Hide list --

    pub fn hidden_viewers(&self, viewer: Viewer, story_id: i64) -> StoryResult<Vec<UserSummary>> {
        let story = self.managed_story(viewer, story_id)?;
        self.user_summaries(&story.hidden_viewer_ids)
    }

    pub fn hide_from(&self, viewer: Viewer, story_id: i64, user_id: i64) -> StoryResult<bool> {
        let story = self.managed_story(viewer, story_id)?;
        if user_id <= 0 || user_id == story.author_id {
            return Err(StoryError::invalid("Cannot hide a story from this user"));
        }
        let added = self.db.add_hidden_viewer(story.id, user_id)?;
        bump_users(self.salts.as_ref(), &[user_id]);
        bump_global(self.salts.as_ref());
        Ok(added)
    }

    pub fn unhide_from(&self, viewer: Viewer, story_id: i64, user_id: i64) -> StoryResult<bool> {
        let story = self.managed_story(viewer, story_id)?;
        if user_id <= 0 {
            return Err(StoryError::invalid("Invalid user id"));
        }
        let removed = self.db.remove_hidden_viewer(story.id, user_id)?;
        bump_users(self.salts.as_ref(), &[user_id]);
        bump_global(self.salts.as_ref());
        Ok(removed)
    }

    pub(crate) fn author_name(&self, user_id: i64) -> String {
        match self.db.get_user_by_id(user_id) {
            Ok(Some(user)) => user.username,
            Ok(None) => format!("user{}", user_id),
            Err(e) => {
                warn!("Author lookup failed for {}: {}", user_id, e);
                format!("user{}", user_id)
            }
        }
    }

    pub(crate) fn user_summaries(&self, ids: &[i64]) -> StoryResult<Vec<UserSummary>> {
        let names = self.db.usernames(ids)?;
        Ok(ids
            .iter()
            .map(|&id| UserSummary {
                id,
                username: names.get(&id).cloned().unwrap_or_default(),
            })
            .collect())
    }
}

fn item_payload(
    item: StoryItem,
    analytics: Option<ItemAnalytics>,
    stickers: Option<Vec<StickerPayload>>,
) -> ItemPayload {
    ItemPayload {
        item_id: item.id,
        story_id: item.story_id,
        src: media_url(&item.media_id),
        media_type: item.media_type,
        duration_ms: item.duration_ms,
        created_at: item.created_at,
        analytics,
        stickers,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{engine, story, user};
    use glimpse_db::salts::{GLOBAL_SALT_KEY, user_salt_key};

    fn upload<'a>(media_id: &'a str) -> PublishItem<'a> {
        PublishItem {
            media_id,
            media_type: MediaType::Image,
            mime: "image/jpeg",
            duration_ms: Some(123),
            privacy: Some("public"),
        }
    }

    #[test]
    fn check_upload_validates_size_and_type() {
        let engine = engine();
        let me = Viewer::new(user(&engine, "me"), false);
        assert_eq!(engine.check_upload(me, "video/mp4", 10).unwrap(), MediaType::Video);
        assert!(matches!(
            engine.check_upload(me, "image/gif", 10),
            Err(StoryError::InvalidRequest(_))
        ));
        assert!(matches!(
            engine.check_upload(me, "image/png", 0),
            Err(StoryError::InvalidRequest(_))
        ));
        assert!(matches!(
            engine.check_upload(me, "image/png", 51 * 1024 * 1024),
            Err(StoryError::InvalidRequest(_))
        ));
        assert!(matches!(
            engine.check_upload(Viewer::anonymous(), "image/png", 10),
            Err(StoryError::Forbidden)
        ));
    }

    #[test]
    fn uploads_fill_a_story_then_start_another() {
        let db = std::sync::Arc::new(glimpse_db::Database::open_in_memory().unwrap());
        let config = crate::StoryConfig {
            max_items_per_story: 2,
            ..Default::default()
        };
        let engine = StoryEngine::new(db, config);
        let me = Viewer::new(user(&engine, "me"), false);

        let first = engine.publish_item(me, &upload("a")).unwrap();
        let second = engine.publish_item(me, &upload("b")).unwrap();
        let third = engine.publish_item(me, &upload("c")).unwrap();

        assert!(first.new_story);
        assert_eq!(second.story_id, first.story_id);
        assert!(!second.new_story);
        assert_ne!(third.story_id, first.story_id);
        assert!(third.new_story);

        let item = engine.db().get_item(first.item_id).unwrap().unwrap();
        assert_eq!(item.duration_ms, Some(5000));
        assert_eq!(engine.db().salt(GLOBAL_SALT_KEY).unwrap(), 3);
        assert_eq!(engine.db().salt(&user_salt_key(me.id)).unwrap(), 3);
    }

    #[test]
    fn daily_limit_rejects_with_rate_limited() {
        let db = std::sync::Arc::new(glimpse_db::Database::open_in_memory().unwrap());
        let config = crate::StoryConfig {
            max_uploads_per_day: 1,
            ..Default::default()
        };
        let engine = StoryEngine::new(db, config);
        let me = Viewer::new(user(&engine, "me"), false);
        engine.publish_item(me, &upload("a")).unwrap();
        assert!(matches!(
            engine.check_upload(me, "image/png", 10),
            Err(StoryError::RateLimited)
        ));
    }

    #[test]
    fn daily_limit_resets_at_midnight() {
        let db = std::sync::Arc::new(glimpse_db::Database::open_in_memory().unwrap());
        let config = crate::StoryConfig {
            max_uploads_per_day: 1,
            ..Default::default()
        };
        let engine = StoryEngine::new(db, config);
        let me = Viewer::new(user(&engine, "me"), false);

        let before_midnight = start_of_day(Utc::now()) - chrono::Duration::minutes(1);
        crate::testing::story_at(&engine, me.id, Privacy::Public, 1, before_midnight);
        assert!(engine.check_upload(me, "image/png", 10).is_ok());
    }

    #[test]
    fn start_of_day_truncates_to_midnight() {
        let ts = DateTime::parse_from_rfc3339("2026-03-04T17:25:09Z")
            .unwrap()
            .with_timezone(&Utc);
        let midnight = start_of_day(ts);
        assert_eq!(midnight.to_rfc3339(), "2026-03-04T00:00:00+00:00");
        assert_eq!(start_of_day(midnight), midnight);
    }

    #[test]
    fn detail_respects_visibility_and_management() {
        let engine = engine();
        let author = Viewer::new(user(&engine, "author"), false);
        let stranger = Viewer::new(user(&engine, "stranger"), false);
        let sid = story(&engine, author.id, Privacy::Friends, 2);

        assert!(matches!(
            engine.story_detail(stranger, sid, false),
            Err(StoryError::Forbidden)
        ));
        assert!(matches!(
            engine.story_detail(author, 9999, false),
            Err(StoryError::NotFound)
        ));

        let detail = engine.story_detail(author, sid, false).unwrap();
        assert!(detail.can_manage);
        assert_eq!(detail.items.len(), 2);
        assert!(detail.analytics.is_some());
        assert!(detail.items[0].src.starts_with("/media/"));
    }

    #[test]
    fn media_follows_story_visibility() {
        let engine = engine();
        let author = Viewer::new(user(&engine, "author"), false);
        let friend = Viewer::new(user(&engine, "friend"), false);
        let stranger = Viewer::new(user(&engine, "stranger"), false);
        engine.db().add_friendship(author.id, friend.id).unwrap();
        let sid = story(&engine, author.id, Privacy::Friends, 1);
        let media_id = format!("m-{}-0", sid);

        assert_eq!(engine.media_item(friend, &media_id).unwrap().story_id, sid);
        assert!(matches!(
            engine.media_item(stranger, &media_id),
            Err(StoryError::Forbidden)
        ));

        engine.db().set_archived(sid, true, Utc::now()).unwrap();
        assert!(matches!(
            engine.media_item(friend, &media_id),
            Err(StoryError::NotFound)
        ));
        assert!(engine.media_item(author, &media_id).is_ok());
        assert!(matches!(
            engine.media_item(author, "missing"),
            Err(StoryError::NotFound)
        ));
    }

    #[test]
    fn only_managers_update_and_unarchive_extends_expiry() {
        let engine = engine();
        let author = Viewer::new(user(&engine, "author"), false);
        let other = Viewer::new(user(&engine, "other"), false);
        let sid = story(&engine, author.id, Privacy::Public, 1);

        let req = UpdateStoryRequest {
            privacy: Some("close_friends".into()),
            archive: Some(true),
        };
        assert!(matches!(
            engine.update_story(other, sid, &req),
            Err(StoryError::Forbidden)
        ));
        let resp = engine.update_story(author, sid, &req).unwrap();
        assert_eq!(resp.privacy, Privacy::CloseFriends);
        assert!(resp.is_archived);

        let archive = engine.archive(author, None, None).unwrap();
        assert_eq!(archive.stories.len(), 1);
        assert!(!archive.has_more);

        let before = engine.db().get_story(sid).unwrap().unwrap().expires_at;
        let req = UpdateStoryRequest {
            privacy: None,
            archive: Some(false),
        };
        engine.update_story(author, sid, &req).unwrap();
        let after = engine.db().get_story(sid).unwrap().unwrap();
        assert!(!after.is_archived);
        assert!(after.expires_at >= before);

        let moderator = Viewer::new(other.id, true);
        let media = engine.delete_story(moderator, sid).unwrap();
        assert_eq!(media, vec![format!("m-{}-0", sid)]);
        assert!(engine.db().get_story(sid).unwrap().is_none());
    }

    #[test]
    fn hide_list_rejects_author_and_invalid_ids() {
        let engine = engine();
        let author = Viewer::new(user(&engine, "author"), false);
        let target = user(&engine, "target");
        let sid = story(&engine, author.id, Privacy::Public, 1);

        assert!(engine.hide_from(author, sid, author.id).is_err());
        assert!(engine.hide_from(author, sid, 0).is_err());
        assert!(engine.hide_from(author, sid, target).unwrap());
        assert!(!engine.hide_from(author, sid, target).unwrap());

        let hidden = engine.hidden_viewers(author, sid).unwrap();
        assert_eq!(hidden.len(), 1);
        assert_eq!(hidden[0].username, "target");

        assert!(matches!(
            engine.story_detail(Viewer::new(target, false), sid, false),
            Err(StoryError::Forbidden)
        ));
        assert!(engine.unhide_from(author, sid, target).unwrap());
        assert!(engine.story_detail(Viewer::new(target, false), sid, false).is_ok());
    }
}
