use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use glimpse_types::models::{MediaType, Privacy, Story, StoryItem, StoryStatus};
use rusqlite::{Connection, Row};
use tracing::warn;

use crate::models::{from_millis, to_millis};
use crate::{Database, OptionalExt, placeholders};

const STORY_COLUMNS: &str =
    "s.id, s.author_id, s.privacy, s.status, s.created_at, s.updated_at, s.expires_at, s.is_archived";

const ITEM_COLUMNS: &str =
    "id, story_id, author_id, media_id, media_type, mime, duration_ms, created_at";

/// Selection for active (published, non-archived, unexpired) stories.
#[derive(Debug, Clone)]
pub struct StoryFilter {
    /// Restrict to these authors. `None` means any author.
    pub author_ids: Option<Vec<i64>>,
    pub exclude_author: Option<i64>,
    pub public_only: bool,
    pub now: DateTime<Utc>,
    pub limit: usize,
}

/// Fields for a new item appended to a story.
#[derive(Debug, Clone)]
pub struct NewItem<'a> {
    pub media_id: &'a str,
    pub media_type: MediaType,
    pub mime: &'a str,
    pub duration_ms: Option<u32>,
}

impl Database {
    pub fn insert_story(
        &self,
        author_id: i64,
        privacy: Privacy,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<i64> {
        self.with_conn_mut(|conn| insert_story(conn, author_id, privacy, now, expires_at))
    }

    pub fn get_story(&self, story_id: i64) -> Result<Option<Story>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM stories s WHERE s.id = ?1", STORY_COLUMNS);
            let story = conn.query_row(&sql, [story_id], story_from_row).optional()?;
            match story {
                Some(mut story) => {
                    story.hidden_viewer_ids = hidden_viewer_ids(conn, story.id)?;
                    Ok(Some(story))
                }
                None => Ok(None),
            }
        })
    }

    /// The author's newest story that can still take uploads.
    pub fn latest_active_story(&self, author_id: i64, now: DateTime<Utc>) -> Result<Option<Story>> {
        self.with_conn(|conn| latest_active_story(conn, author_id, now))
    }

    /// Append an item and touch the story's `updated_at`, atomically.
    pub fn append_item(
        &self,
        story_id: i64,
        author_id: i64,
        item: &NewItem<'_>,
        now: DateTime<Utc>,
    ) -> Result<i64> {
        self.with_tx(|conn| append_item(conn, story_id, author_id, item, now))
    }

    pub fn item_count(&self, story_id: i64) -> Result<usize> {
        self.with_conn(|conn| item_count(conn, story_id))
    }

    /// Items uploaded by `author_id` at or after `since`.
    pub fn count_items_since(&self, author_id: i64, since: DateTime<Utc>) -> Result<usize> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM story_items WHERE author_id = ?1 AND created_at >= ?2",
                rusqlite::params![author_id, to_millis(since)],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
    }

    pub fn active_stories(&self, filter: &StoryFilter) -> Result<Vec<Story>> {
        self.with_conn(|conn| active_stories(conn, filter))
    }

    /// Batch-fetch items for a set of stories, oldest first within each story.
    pub fn items_for_stories(&self, story_ids: &[i64]) -> Result<Vec<StoryItem>> {
        if story_ids.is_empty() {
            return Ok(vec![]);
        }
        self.with_conn(|conn| items_for_stories(conn, story_ids))
    }

    pub fn get_item(&self, item_id: i64) -> Result<Option<StoryItem>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM story_items WHERE id = ?1", ITEM_COLUMNS);
            conn.query_row(&sql, [item_id], item_from_row).optional()
        })
    }

    pub fn get_item_by_media(&self, media_id: &str) -> Result<Option<StoryItem>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM story_items WHERE media_id = ?1", ITEM_COLUMNS);
            conn.query_row(&sql, [media_id], item_from_row).optional()
        })
    }

    pub fn set_privacy(&self, story_id: i64, privacy: Privacy) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE stories SET privacy = ?1 WHERE id = ?2",
                rusqlite::params![privacy.as_str(), story_id],
            )?;
            Ok(changed > 0)
        })
    }

    /// Explicit archive / un-archive. Un-archiving is the only path that
    /// extends `expires_at`.
    pub fn set_archived(
        &self,
        story_id: i64,
        archived: bool,
        expires_at: DateTime<Utc>,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE stories SET is_archived = ?1, expires_at = ?2 WHERE id = ?3",
                rusqlite::params![archived, to_millis(expires_at), story_id],
            )?;
            Ok(changed > 0)
        })
    }

    /// The caller's archived stories, newest first.
    pub fn archived_stories(&self, author_id: i64, limit: usize, offset: usize) -> Result<Vec<Story>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM stories s
                 WHERE s.author_id = ?1 AND s.is_archived = 1
                 ORDER BY s.created_at DESC, s.id DESC
                 LIMIT ?2 OFFSET ?3",
                STORY_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let stories = stmt
                .query_map(
                    rusqlite::params![author_id, limit as i64, offset as i64],
                    story_from_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(stories)
        })
    }

    // -- Hide list --

    pub fn hidden_viewer_ids(&self, story_id: i64) -> Result<Vec<i64>> {
        self.with_conn(|conn| hidden_viewer_ids(conn, story_id))
    }

    pub fn add_hidden_viewer(&self, story_id: i64, user_id: i64) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "INSERT OR IGNORE INTO story_hidden_viewers (story_id, user_id) VALUES (?1, ?2)",
                rusqlite::params![story_id, user_id],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn remove_hidden_viewer(&self, story_id: i64, user_id: i64) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "DELETE FROM story_hidden_viewers WHERE story_id = ?1 AND user_id = ?2",
                rusqlite::params![story_id, user_id],
            )?;
            Ok(changed > 0)
        })
    }

    /// Remove a story and everything hanging off it in one transaction.
    pub fn delete_story(&self, story_id: i64) -> Result<bool> {
        self.with_tx(|conn| {
            conn.execute(
                "DELETE FROM story_views
                 WHERE item_id IN (SELECT id FROM story_items WHERE story_id = ?1)",
                [story_id],
            )?;
            conn.execute(
                "DELETE FROM sticker_poll_votes
                 WHERE sticker_id IN (SELECT id FROM story_stickers WHERE story_id = ?1)",
                [story_id],
            )?;
            conn.execute("DELETE FROM story_stickers WHERE story_id = ?1", [story_id])?;
            conn.execute("DELETE FROM story_items WHERE story_id = ?1", [story_id])?;
            conn.execute("DELETE FROM story_reactions WHERE story_id = ?1", [story_id])?;
            conn.execute("DELETE FROM story_replies WHERE story_id = ?1", [story_id])?;
            conn.execute("DELETE FROM story_hidden_viewers WHERE story_id = ?1", [story_id])?;
            let deleted = conn.execute("DELETE FROM stories WHERE id = ?1", [story_id])?;
            Ok(deleted > 0)
        })
    }
}

pub fn insert_story(
    conn: &Connection,
    author_id: i64,
    privacy: Privacy,
    now: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO stories (author_id, privacy, status, created_at, updated_at, expires_at, is_archived)
         VALUES (?1, ?2, 'published', ?3, ?3, ?4, 0)",
        rusqlite::params![author_id, privacy.as_str(), to_millis(now), to_millis(expires_at)],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn latest_active_story(
    conn: &Connection,
    author_id: i64,
    now: DateTime<Utc>,
) -> Result<Option<Story>> {
    let sql = format!(
        "SELECT {} FROM stories s
         WHERE s.author_id = ?1 AND s.status = 'published' AND s.is_archived = 0 AND s.expires_at > ?2
         ORDER BY s.created_at DESC, s.id DESC
         LIMIT 1",
        STORY_COLUMNS
    );
    conn.query_row(&sql, rusqlite::params![author_id, to_millis(now)], story_from_row)
        .optional()
}

pub fn append_item(
    conn: &Connection,
    story_id: i64,
    author_id: i64,
    item: &NewItem<'_>,
    now: DateTime<Utc>,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO story_items (story_id, author_id, media_id, media_type, mime, duration_ms, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![
            story_id,
            author_id,
            item.media_id,
            item.media_type.as_str(),
            item.mime,
            item.duration_ms,
            to_millis(now),
        ],
    )?;
    let item_id = conn.last_insert_rowid();
    conn.execute(
        "UPDATE stories SET updated_at = ?1 WHERE id = ?2",
        rusqlite::params![to_millis(now), story_id],
    )?;
    Ok(item_id)
}

pub fn item_count(conn: &Connection, story_id: i64) -> Result<usize> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM story_items WHERE story_id = ?1",
        [story_id],
        |row| row.get(0),
    )?;
    Ok(count as usize)
}

pub fn active_stories(conn: &Connection, filter: &StoryFilter) -> Result<Vec<Story>> {
    let mut clauses = vec![
        "s.status = 'published'".to_string(),
        "s.is_archived = 0".to_string(),
        "s.expires_at > ?1".to_string(),
    ];
    let mut params: Vec<i64> = vec![to_millis(filter.now)];

    if filter.public_only {
        clauses.push("s.privacy = 'public'".to_string());
    }
    if let Some(excluded) = filter.exclude_author {
        params.push(excluded);
        clauses.push(format!("s.author_id != ?{}", params.len()));
    }
    if let Some(author_ids) = &filter.author_ids {
        if author_ids.is_empty() {
            return Ok(vec![]);
        }
        clauses.push(format!(
            "s.author_id IN ({})",
            placeholders(params.len() + 1, author_ids.len())
        ));
        params.extend(author_ids.iter().copied());
    }
    params.push(filter.limit as i64);

    let sql = format!(
        "SELECT {} FROM stories s WHERE {} ORDER BY s.updated_at DESC, s.id DESC LIMIT ?{}",
        STORY_COLUMNS,
        clauses.join(" AND "),
        params.len()
    );

    let mut stmt = conn.prepare(&sql)?;
    let mut stories = stmt
        .query_map(rusqlite::params_from_iter(params.iter()), story_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    attach_hidden_viewers(conn, &mut stories)?;
    Ok(stories)
}

pub fn items_for_stories(conn: &Connection, story_ids: &[i64]) -> Result<Vec<StoryItem>> {
    if story_ids.is_empty() {
        return Ok(vec![]);
    }
    let sql = format!(
        "SELECT {} FROM story_items WHERE story_id IN ({}) ORDER BY created_at ASC, id ASC",
        ITEM_COLUMNS,
        placeholders(1, story_ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let items = stmt
        .query_map(rusqlite::params_from_iter(story_ids.iter()), item_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(items)
}

pub fn hidden_viewer_ids(conn: &Connection, story_id: i64) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare(
        "SELECT user_id FROM story_hidden_viewers WHERE story_id = ?1 ORDER BY user_id",
    )?;
    let ids = stmt
        .query_map([story_id], |row| row.get::<_, i64>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(ids)
}

/// Fill `hidden_viewer_ids` for many stories with one query.
fn attach_hidden_viewers(conn: &Connection, stories: &mut [Story]) -> Result<()> {
    if stories.is_empty() {
        return Ok(());
    }
    let ids: Vec<i64> = stories.iter().map(|s| s.id).collect();
    let sql = format!(
        "SELECT story_id, user_id FROM story_hidden_viewers WHERE story_id IN ({}) ORDER BY user_id",
        placeholders(1, ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut by_story: HashMap<i64, Vec<i64>> = HashMap::new();
    let rows = stmt.query_map(rusqlite::params_from_iter(ids.iter()), |row| {
        Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
    })?;
    for row in rows {
        let (story_id, user_id) = row?;
        by_story.entry(story_id).or_default().push(user_id);
    }
    for story in stories.iter_mut() {
        story.hidden_viewer_ids = by_story.remove(&story.id).unwrap_or_default();
    }
    Ok(())
}

// -- State transitions used by the lifecycle sweep and moderation --

/// `(story_id, author_id)` of unarchived stories whose expiry has passed,
/// oldest expiry first.
pub fn expired_stories(
    conn: &Connection,
    now: DateTime<Utc>,
    limit: usize,
) -> Result<Vec<(i64, i64)>> {
    let mut stmt = conn.prepare(
        "SELECT id, author_id FROM stories
         WHERE is_archived = 0 AND expires_at <= ?1
         ORDER BY expires_at ASC, id ASC
         LIMIT ?2",
    )?;
    let rows = stmt
        .query_map(rusqlite::params![to_millis(now), limit as i64], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Archive a story only if it is still unarchived and expired. Returns
/// whether this call performed the transition.
pub fn archive_if_expired(conn: &Connection, story_id: i64, now: DateTime<Utc>) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE stories SET is_archived = 1
         WHERE id = ?1 AND is_archived = 0 AND expires_at <= ?2",
        rusqlite::params![story_id, to_millis(now)],
    )?;
    Ok(changed > 0)
}

/// Pull a published story for review. Returns false if it was not published.
pub fn mark_pending_review(
    conn: &Connection,
    story_id: i64,
    now: DateTime<Utc>,
    report_count: i64,
) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE stories
         SET status = 'pending_review', auto_hidden_at = ?1, report_count_at_hide = ?2
         WHERE id = ?3 AND status = 'published'",
        rusqlite::params![to_millis(now), report_count, story_id],
    )?;
    Ok(changed > 0)
}

pub fn story_status(conn: &Connection, story_id: i64) -> Result<Option<StoryStatus>> {
    let status: Option<String> = conn
        .query_row("SELECT status FROM stories WHERE id = ?1", [story_id], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(status.map(|s| StoryStatus::parse(&s).unwrap_or(StoryStatus::PendingReview)))
}

fn story_from_row(row: &Row<'_>) -> rusqlite::Result<Story> {
    let id: i64 = row.get(0)?;
    let privacy: String = row.get(2)?;
    let status: String = row.get(3)?;
    Ok(Story {
        id,
        author_id: row.get(1)?,
        privacy: Privacy::parse(&privacy).unwrap_or_else(|| {
            warn!("Corrupt privacy '{}' on story {}", privacy, id);
            Privacy::Friends
        }),
        status: StoryStatus::parse(&status).unwrap_or_else(|| {
            warn!("Corrupt status '{}' on story {}", status, id);
            StoryStatus::PendingReview
        }),
        created_at: from_millis(row.get(4)?),
        updated_at: from_millis(row.get(5)?),
        expires_at: from_millis(row.get(6)?),
        is_archived: row.get(7)?,
        hidden_viewer_ids: Vec::new(),
    })
}

fn item_from_row(row: &Row<'_>) -> rusqlite::Result<StoryItem> {
    let id: i64 = row.get(0)?;
    let media_type: String = row.get(4)?;
    Ok(StoryItem {
        id,
        story_id: row.get(1)?,
        author_id: row.get(2)?,
        media_id: row.get(3)?,
        media_type: MediaType::parse(&media_type).unwrap_or_else(|| {
            warn!("Corrupt media_type '{}' on item {}", media_type, id);
            MediaType::Image
        }),
        mime: row.get(5)?,
        duration_ms: row.get(6)?,
        created_at: from_millis(row.get(7)?),
    })
}
