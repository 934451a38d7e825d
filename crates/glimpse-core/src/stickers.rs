//! Sticker overlays on story items, and poll voting.
//!
//! Sticker data is stored as the client sent it once the per-kind checks
//! pass. Poll tallies live in their own table and are joined in on read.

use std::collections::HashMap;

use chrono::Utc;
use glimpse_db::stickers::NewSticker;
use glimpse_types::api::{AddStickerRequest, StickerPayload, StickerPosition};
use glimpse_types::models::{StickerKind, Viewer};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{StoryError, StoryResult};
use crate::visibility::can_manage;
use crate::StoryEngine;

const MAX_STICKER_DATA_BYTES: usize = 4096;
const DEFAULT_POSITION: f64 = 50.0;
const POLL_OPTIONS: std::ops::RangeInclusive<usize> = 2..=4;

impl StoryEngine {
    /// Attach a sticker to one item of a story the viewer manages.
    pub fn add_sticker(
        &self,
        viewer: Viewer,
        story_id: i64,
        item_id: i64,
        req: &AddStickerRequest,
    ) -> StoryResult<i64> {
        let story = self.managed_story(viewer, story_id)?;
        let item = self
            .db
            .get_item(item_id)?
            .filter(|item| item.story_id == story.id)
            .ok_or_else(|| StoryError::invalid("Item does not belong to this story"))?;
        let kind = StickerKind::parse(req.kind.trim())
            .ok_or_else(|| StoryError::invalid(format!("Unknown sticker type: {}", req.kind)))?;

        let data = self.checked_sticker_data(kind, &req.data)?;
        let encoded = serde_json::to_string(&data).map_err(|e| StoryError::Store(e.into()))?;
        if encoded.len() > MAX_STICKER_DATA_BYTES {
            return Err(StoryError::invalid("Sticker data too large"));
        }

        let sticker_id = self.db.insert_sticker(
            &NewSticker {
                story_id: story.id,
                item_id: item.id,
                kind,
                data: &encoded,
                position_x: clamp_position(req.position_x),
                position_y: clamp_position(req.position_y),
            },
            Utc::now(),
        )?;
        debug!(
            "User {} added {} sticker {} to item {}",
            viewer.id,
            kind.as_str(),
            sticker_id,
            item.id
        );
        Ok(sticker_id)
    }

    pub fn delete_sticker(&self, viewer: Viewer, sticker_id: i64) -> StoryResult<()> {
        let sticker = self.db.get_sticker(sticker_id)?.ok_or(StoryError::NotFound)?;
        self.managed_story(viewer, sticker.story_id)?;
        if !self.db.delete_sticker(sticker.id)? {
            return Err(StoryError::NotFound);
        }
        Ok(())
    }

    /// Record the viewer's pick on a poll. Voting again replaces it.
    pub fn vote_poll(&self, viewer: Viewer, sticker_id: i64, option_index: i64) -> StoryResult<()> {
        let sticker = self.db.get_sticker(sticker_id)?.ok_or(StoryError::NotFound)?;
        let story = self.viewable_story(viewer, sticker.story_id)?;
        if !can_manage(&story, viewer) && (story.is_archived || story.is_expired(Utc::now())) {
            return Err(StoryError::NotFound);
        }
        if sticker.kind != StickerKind::Poll {
            return Err(StoryError::invalid("Sticker is not a poll"));
        }

        let data: Value = serde_json::from_str(&sticker.data).map_err(|e| StoryError::Store(e.into()))?;
        let options = poll_option_count(&data) as i64;
        if !(0..options).contains(&option_index) {
            return Err(StoryError::invalid("Invalid poll option"));
        }

        self.db
            .upsert_poll_vote(sticker.id, viewer.id, option_index, Utc::now())?;
        Ok(())
    }

    /// Stickers on `item_ids`, keyed by item, with poll tallies and the
    /// viewer's own votes filled in.
    pub(crate) fn sticker_payloads(
        &self,
        viewer: Viewer,
        item_ids: &[i64],
    ) -> StoryResult<HashMap<i64, Vec<StickerPayload>>> {
        let rows = self.db.stickers_for_items(item_ids)?;
        let poll_ids: Vec<i64> = rows
            .iter()
            .filter(|row| row.kind == StickerKind::Poll)
            .map(|row| row.id)
            .collect();
        let tallies = self.db.poll_vote_counts(&poll_ids)?;
        let mine = if viewer.is_authenticated() {
            self.db.user_poll_votes(&poll_ids, viewer.id)?
        } else {
            HashMap::new()
        };

        let mut by_item: HashMap<i64, Vec<StickerPayload>> = HashMap::new();
        for row in rows {
            let data: Value = match serde_json::from_str(&row.data) {
                Ok(data) => data,
                Err(e) => {
                    warn!("Skipping sticker {} with unreadable data: {}", row.id, e);
                    continue;
                }
            };
            let (votes, user_vote) = if row.kind == StickerKind::Poll {
                let counts = tallies.get(&row.id);
                let votes = (0..poll_option_count(&data) as i64)
                    .map(|option| {
                        counts
                            .and_then(|c| c.get(&option))
                            .copied()
                            .unwrap_or(0)
                    })
                    .collect();
                (Some(votes), mine.get(&row.id).copied())
            } else {
                (None, None)
            };
            by_item.entry(row.item_id).or_default().push(StickerPayload {
                id: row.id,
                kind: row.kind,
                data,
                position: StickerPosition {
                    x: row.position_x,
                    y: row.position_y,
                },
                created_at: row.created_at,
                votes,
                user_vote,
            });
        }
        Ok(by_item)
    }

    /// Per-kind shape checks. Mentions are resolved so both `user_id` and
    /// `username` are stored.
    fn checked_sticker_data(&self, kind: StickerKind, data: &Value) -> StoryResult<Value> {
        let Some(fields) = data.as_object() else {
            return Err(StoryError::invalid("Sticker data must be an object"));
        };

        match kind {
            StickerKind::Mention => {
                let by_id = fields.get("user_id").and_then(Value::as_i64).filter(|&id| id > 0);
                let user = match (by_id, non_empty_str(fields.get("username"))) {
                    (Some(id), _) => self.db.get_user_by_id(id)?,
                    (None, Some(name)) => self.db.get_user_by_username(name)?,
                    (None, None) => None,
                };
                let user = user.ok_or_else(|| StoryError::invalid("Mentioned user not found"))?;
                let mut fields = fields.clone();
                fields.insert("user_id".into(), Value::from(user.id));
                fields.insert("username".into(), Value::from(user.username));
                Ok(Value::Object(fields))
            }
            StickerKind::Link => {
                let url = non_empty_str(fields.get("url"))
                    .ok_or_else(|| StoryError::invalid("Link sticker needs a url"))?;
                if !(url.starts_with("https://") || url.starts_with("http://")) {
                    return Err(StoryError::invalid("Link must be http or https"));
                }
                Ok(data.clone())
            }
            StickerKind::Location => {
                non_empty_str(fields.get("name"))
                    .ok_or_else(|| StoryError::invalid("Location sticker needs a name"))?;
                Ok(data.clone())
            }
            StickerKind::Poll => {
                non_empty_str(fields.get("question"))
                    .ok_or_else(|| StoryError::invalid("Poll needs a question"))?;
                let options = fields
                    .get("options")
                    .and_then(Value::as_array)
                    .ok_or_else(|| StoryError::invalid("Poll needs options"))?;
                if !POLL_OPTIONS.contains(&options.len()) {
                    return Err(StoryError::invalid("Poll needs 2 to 4 options"));
                }
                let readable = options
                    .iter()
                    .all(|opt| non_empty_str(Some(opt)).or_else(|| non_empty_str(opt.get("text"))).is_some());
                if !readable {
                    return Err(StoryError::invalid("Poll options need text"));
                }
                Ok(data.clone())
            }
        }
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn poll_option_count(data: &Value) -> usize {
    data.get("options").and_then(Value::as_array).map_or(0, Vec::len)
}

fn clamp_position(value: Option<f64>) -> f64 {
    value
        .filter(|v| v.is_finite())
        .unwrap_or(DEFAULT_POSITION)
        .clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{engine, story, user};
    use glimpse_types::models::Privacy;
    use serde_json::json;

    fn sticker(kind: &str, data: Value) -> AddStickerRequest {
        AddStickerRequest {
            kind: kind.into(),
            data,
            position_x: None,
            position_y: None,
        }
    }

    fn poll() -> AddStickerRequest {
        sticker("poll", json!({ "question": "Tea or coffee?", "options": ["tea", "coffee"] }))
    }

    fn first_item(engine: &StoryEngine, story_id: i64) -> i64 {
        engine.db().items_for_stories(&[story_id]).unwrap()[0].id
    }

    #[test]
    fn stickers_show_in_full_detail_only() {
        let engine = engine();
        let author = Viewer::new(user(&engine, "author"), false);
        let fan = Viewer::new(user(&engine, "fan"), false);
        let sid = story(&engine, author.id, Privacy::Public, 1);
        let item = first_item(&engine, sid);

        let mut req = poll();
        req.position_x = Some(150.0);
        let id = engine.add_sticker(author, sid, item, &req).unwrap();

        let detail = engine.story_detail(fan, sid, false).unwrap();
        let stickers = detail.items[0].stickers.as_ref().unwrap();
        assert_eq!(stickers.len(), 1);
        assert_eq!(stickers[0].id, id);
        assert_eq!(stickers[0].kind, StickerKind::Poll);
        assert_eq!(stickers[0].position, StickerPosition { x: 100.0, y: 50.0 });
        assert_eq!(stickers[0].votes, Some(vec![0, 0]));
        assert_eq!(stickers[0].user_vote, None);

        let compact = engine.story_detail(fan, sid, true).unwrap();
        assert!(compact.items[0].stickers.is_none());
    }

    #[test]
    fn only_managers_add_and_delete() {
        let engine = engine();
        let author = Viewer::new(user(&engine, "author"), false);
        let stranger = Viewer::new(user(&engine, "stranger"), false);
        let sid = story(&engine, author.id, Privacy::Public, 1);
        let item = first_item(&engine, sid);

        assert!(matches!(
            engine.add_sticker(stranger, sid, item, &poll()),
            Err(StoryError::Forbidden)
        ));
        let id = engine.add_sticker(author, sid, item, &poll()).unwrap();
        assert!(matches!(
            engine.delete_sticker(stranger, id),
            Err(StoryError::Forbidden)
        ));

        let moderator = Viewer::new(user(&engine, "mod"), true);
        engine.delete_sticker(moderator, id).unwrap();
        assert!(matches!(
            engine.delete_sticker(author, id),
            Err(StoryError::NotFound)
        ));
    }

    #[test]
    fn sticker_data_is_checked_per_kind() {
        let engine = engine();
        let author = Viewer::new(user(&engine, "author"), false);
        let sid = story(&engine, author.id, Privacy::Public, 1);
        let other = story(&engine, author.id, Privacy::Public, 1);
        let item = first_item(&engine, sid);

        let rejected = [
            sticker("gif", json!({})),
            sticker("poll", json!(["not", "an", "object"])),
            sticker("poll", json!({ "question": "Only one?", "options": ["yes"] })),
            sticker("poll", json!({ "question": "", "options": ["a", "b"] })),
            sticker("link", json!({ "url": "ftp://example.com" })),
            sticker("location", json!({ "name": "  " })),
            sticker("mention", json!({ "username": "nobody" })),
        ];
        for req in &rejected {
            assert!(
                matches!(
                    engine.add_sticker(author, sid, item, req),
                    Err(StoryError::InvalidRequest(_))
                ),
                "accepted {:?}",
                req
            );
        }

        // Item from another story.
        assert!(matches!(
            engine.add_sticker(author, other, item, &poll()),
            Err(StoryError::InvalidRequest(_))
        ));

        let friend = user(&engine, "friend");
        let id = engine
            .add_sticker(author, sid, item, &sticker("mention", json!({ "username": "friend" })))
            .unwrap();
        let row = engine.db().get_sticker(id).unwrap().unwrap();
        let data: Value = serde_json::from_str(&row.data).unwrap();
        assert_eq!(data["user_id"].as_i64(), Some(friend));

        engine
            .add_sticker(
                author,
                sid,
                item,
                &sticker("link", json!({ "url": "https://example.com", "title": "Example" })),
            )
            .unwrap();
    }

    #[test]
    fn one_vote_per_viewer() {
        let engine = engine();
        let author = Viewer::new(user(&engine, "author"), false);
        let a = Viewer::new(user(&engine, "a"), false);
        let b = Viewer::new(user(&engine, "b"), false);
        let sid = story(&engine, author.id, Privacy::Public, 1);
        let item = first_item(&engine, sid);
        let id = engine.add_sticker(author, sid, item, &poll()).unwrap();

        engine.vote_poll(a, id, 1).unwrap();
        engine.vote_poll(a, id, 0).unwrap();
        engine.vote_poll(b, id, 0).unwrap();

        let detail = engine.story_detail(a, sid, false).unwrap();
        let payload = &detail.items[0].stickers.as_ref().unwrap()[0];
        assert_eq!(payload.votes, Some(vec![2, 0]));
        assert_eq!(payload.user_vote, Some(0));

        assert!(matches!(
            engine.vote_poll(a, id, 2),
            Err(StoryError::InvalidRequest(_))
        ));
        assert!(matches!(
            engine.vote_poll(a, id, -1),
            Err(StoryError::InvalidRequest(_))
        ));
        assert!(matches!(engine.vote_poll(a, 9999, 0), Err(StoryError::NotFound)));

        let link = engine
            .add_sticker(author, sid, item, &sticker("link", json!({ "url": "https://x.dev" })))
            .unwrap();
        assert!(matches!(
            engine.vote_poll(a, link, 0),
            Err(StoryError::InvalidRequest(_))
        ));
    }

    #[test]
    fn voting_follows_story_visibility() {
        let engine = engine();
        let author = Viewer::new(user(&engine, "author"), false);
        let stranger = Viewer::new(user(&engine, "stranger"), false);
        let sid = story(&engine, author.id, Privacy::Friends, 1);
        let item = first_item(&engine, sid);
        let id = engine.add_sticker(author, sid, item, &poll()).unwrap();

        assert!(matches!(
            engine.vote_poll(stranger, id, 0),
            Err(StoryError::Forbidden)
        ));
    }
}
