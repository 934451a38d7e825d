//! Item stickers and poll votes.

use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use glimpse_types::models::StickerKind;
use rusqlite::Row;
use tracing::warn;

use crate::models::{StickerRow, from_millis, to_millis};
use crate::{Database, OptionalExt, placeholders};

const STICKER_COLUMNS: &str =
    "id, story_id, item_id, kind, data, position_x, position_y, created_at";

/// Fields of a sticker about to be stored.
#[derive(Debug, Clone, Copy)]
pub struct NewSticker<'a> {
    pub story_id: i64,
    pub item_id: i64,
    pub kind: StickerKind,
    pub data: &'a str,
    pub position_x: f64,
    pub position_y: f64,
}

impl Database {
    pub fn insert_sticker(&self, sticker: &NewSticker<'_>, now: DateTime<Utc>) -> Result<i64> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO story_stickers
                    (story_id, item_id, kind, data, position_x, position_y, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    sticker.story_id,
                    sticker.item_id,
                    sticker.kind.as_str(),
                    sticker.data,
                    sticker.position_x,
                    sticker.position_y,
                    to_millis(now),
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_sticker(&self, sticker_id: i64) -> Result<Option<StickerRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM story_stickers WHERE id = ?1", STICKER_COLUMNS);
            conn.query_row(&sql, [sticker_id], sticker_from_row).optional()
        })
    }

    /// Stickers on any of `item_ids`, per item in creation order.
    pub fn stickers_for_items(&self, item_ids: &[i64]) -> Result<Vec<StickerRow>> {
        if item_ids.is_empty() {
            return Ok(vec![]);
        }
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM story_stickers WHERE item_id IN ({})
                 ORDER BY item_id ASC, created_at ASC, id ASC",
                STICKER_COLUMNS,
                placeholders(1, item_ids.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(item_ids.iter()), sticker_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn delete_sticker(&self, sticker_id: i64) -> Result<bool> {
        self.with_tx(|conn| {
            conn.execute(
                "DELETE FROM sticker_poll_votes WHERE sticker_id = ?1",
                [sticker_id],
            )?;
            let deleted = conn.execute("DELETE FROM story_stickers WHERE id = ?1", [sticker_id])?;
            Ok(deleted > 0)
        })
    }

    /// One vote per (sticker, user); voting again moves the vote.
    pub fn upsert_poll_vote(
        &self,
        sticker_id: i64,
        user_id: i64,
        option_index: i64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO sticker_poll_votes (sticker_id, user_id, option_index, voted_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(sticker_id, user_id)
                 DO UPDATE SET option_index = excluded.option_index, voted_at = excluded.voted_at",
                rusqlite::params![sticker_id, user_id, option_index, to_millis(now)],
            )?;
            Ok(())
        })
    }

    /// sticker id -> (option index -> votes), in one query.
    pub fn poll_vote_counts(&self, sticker_ids: &[i64]) -> Result<HashMap<i64, HashMap<i64, i64>>> {
        if sticker_ids.is_empty() {
            return Ok(HashMap::new());
        }
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT sticker_id, option_index, COUNT(*) FROM sticker_poll_votes
                 WHERE sticker_id IN ({})
                 GROUP BY sticker_id, option_index",
                placeholders(1, sticker_ids.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut counts: HashMap<i64, HashMap<i64, i64>> = HashMap::new();
            let rows = stmt.query_map(rusqlite::params_from_iter(sticker_ids.iter()), |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?, row.get::<_, i64>(2)?))
            })?;
            for row in rows {
                let (sticker_id, option, count) = row?;
                counts.entry(sticker_id).or_default().insert(option, count);
            }
            Ok(counts)
        })
    }

    /// sticker id -> option the user picked.
    pub fn user_poll_votes(&self, sticker_ids: &[i64], user_id: i64) -> Result<HashMap<i64, i64>> {
        if sticker_ids.is_empty() {
            return Ok(HashMap::new());
        }
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT sticker_id, option_index FROM sticker_poll_votes
                 WHERE user_id = ?1 AND sticker_id IN ({})",
                placeholders(2, sticker_ids.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let params = std::iter::once(&user_id).chain(sticker_ids.iter());
            let votes = stmt
                .query_map(rusqlite::params_from_iter(params), |row| {
                    Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
                })?
                .collect::<std::result::Result<HashMap<_, _>, _>>()?;
            Ok(votes)
        })
    }
}

fn sticker_from_row(row: &Row<'_>) -> rusqlite::Result<StickerRow> {
    let id: i64 = row.get(0)?;
    let kind: String = row.get(3)?;
    Ok(StickerRow {
        id,
        story_id: row.get(1)?,
        item_id: row.get(2)?,
        kind: StickerKind::parse(&kind).unwrap_or_else(|| {
            warn!("Corrupt sticker kind '{}' on sticker {}", kind, id);
            StickerKind::Link
        }),
        data: row.get(4)?,
        position_x: row.get(5)?,
        position_y: row.get(6)?,
        created_at: from_millis(row.get(7)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stories::NewItem;
    use chrono::Duration;
    use glimpse_types::models::{MediaType, Privacy};

    /// A story with one item, returning (story_id, item_id).
    fn story_with_item(db: &Database) -> (i64, i64) {
        let now = Utc::now();
        let story_id = db
            .insert_story(1, Privacy::Public, now, now + Duration::hours(24))
            .unwrap();
        let item = NewItem {
            media_id: "m1",
            media_type: MediaType::Image,
            mime: "image/png",
            duration_ms: None,
        };
        let item_id = db.append_item(story_id, 1, &item, now).unwrap();
        (story_id, item_id)
    }

    fn poll<'a>(story_id: i64, item_id: i64) -> NewSticker<'a> {
        NewSticker {
            story_id,
            item_id,
            kind: StickerKind::Poll,
            data: r#"{"question":"Tea?","options":["yes","no"]}"#,
            position_x: 10.0,
            position_y: 90.0,
        }
    }

    #[test]
    fn stickers_round_trip_per_item() {
        let db = Database::open_in_memory().unwrap();
        let (story_id, item_id) = story_with_item(&db);
        let id = db.insert_sticker(&poll(story_id, item_id), Utc::now()).unwrap();

        let row = db.get_sticker(id).unwrap().unwrap();
        assert_eq!(row.kind, StickerKind::Poll);
        assert_eq!(row.position_x, 10.0);
        assert!(row.data.contains("Tea?"));

        let rows = db.stickers_for_items(&[item_id, 999]).unwrap();
        assert_eq!(rows.len(), 1);
        assert!(db.stickers_for_items(&[]).unwrap().is_empty());
    }

    #[test]
    fn revoting_moves_the_vote() {
        let db = Database::open_in_memory().unwrap();
        let (story_id, item_id) = story_with_item(&db);
        let id = db.insert_sticker(&poll(story_id, item_id), Utc::now()).unwrap();

        db.upsert_poll_vote(id, 5, 0, Utc::now()).unwrap();
        db.upsert_poll_vote(id, 6, 0, Utc::now()).unwrap();
        db.upsert_poll_vote(id, 5, 1, Utc::now()).unwrap();

        let counts = db.poll_vote_counts(&[id]).unwrap();
        assert_eq!(counts[&id].get(&0), Some(&1));
        assert_eq!(counts[&id].get(&1), Some(&1));
        assert_eq!(db.user_poll_votes(&[id], 5).unwrap().get(&id), Some(&1));
        assert!(db.user_poll_votes(&[id], 7).unwrap().is_empty());
    }

    #[test]
    fn deleting_a_sticker_drops_its_votes() {
        let db = Database::open_in_memory().unwrap();
        let (story_id, item_id) = story_with_item(&db);
        let id = db.insert_sticker(&poll(story_id, item_id), Utc::now()).unwrap();
        db.upsert_poll_vote(id, 5, 0, Utc::now()).unwrap();

        assert!(db.delete_sticker(id).unwrap());
        assert!(!db.delete_sticker(id).unwrap());
        assert!(db.get_sticker(id).unwrap().is_none());
        assert!(db.poll_vote_counts(&[id]).unwrap().is_empty());
    }

    #[test]
    fn deleting_the_story_drops_its_stickers() {
        let db = Database::open_in_memory().unwrap();
        let (story_id, item_id) = story_with_item(&db);
        let id = db.insert_sticker(&poll(story_id, item_id), Utc::now()).unwrap();
        db.upsert_poll_vote(id, 5, 0, Utc::now()).unwrap();

        assert!(db.delete_story(story_id).unwrap());
        assert!(db.get_sticker(id).unwrap().is_none());
        assert!(db.poll_vote_counts(&[id]).unwrap().is_empty());
    }
}
