//! Reactions, replies and reports.

use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use glimpse_types::api::{ReactionCount, ReportStats};
use glimpse_types::models::{ReportReason, ReportStatus};
use rusqlite::{Connection, Row};
use tracing::warn;

use crate::models::{PendingReportGroup, ReactionRow, ReplyRow, ReportRow, from_millis, to_millis};
use crate::{Database, OptionalExt, placeholders};

/// Story-level reactions are keyed with item id 0.
fn item_key(item_id: Option<i64>) -> i64 {
    item_id.unwrap_or(0)
}

impl Database {
    // -- Reactions --

    /// One reaction per (user, story, item); a new one replaces the old.
    pub fn upsert_reaction(
        &self,
        story_id: i64,
        item_id: Option<i64>,
        user_id: i64,
        reaction: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO story_reactions (story_id, item_id, user_id, reaction, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(user_id, story_id, item_id)
                 DO UPDATE SET reaction = excluded.reaction, created_at = excluded.created_at",
                rusqlite::params![story_id, item_key(item_id), user_id, reaction, to_millis(now)],
            )?;
            Ok(())
        })
    }

    pub fn remove_reaction(&self, story_id: i64, item_id: Option<i64>, user_id: i64) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "DELETE FROM story_reactions WHERE story_id = ?1 AND item_id = ?2 AND user_id = ?3",
                rusqlite::params![story_id, item_key(item_id), user_id],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn reactions_for(&self, story_id: i64, item_id: Option<i64>) -> Result<Vec<ReactionRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT r.user_id, COALESCE(u.username, ''), r.item_id, r.reaction, r.created_at
                 FROM story_reactions r
                 LEFT JOIN users u ON u.id = r.user_id
                 WHERE r.story_id = ?1 AND r.item_id = ?2
                 ORDER BY r.created_at DESC, r.id DESC",
            )?;
            let rows = stmt
                .query_map(rusqlite::params![story_id, item_key(item_id)], |row| {
                    let item: i64 = row.get(2)?;
                    Ok(ReactionRow {
                        user_id: row.get(0)?,
                        username: row.get(1)?,
                        item_id: (item > 0).then_some(item),
                        reaction: row.get(3)?,
                        created_at: from_millis(row.get(4)?),
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Counts per reaction value across the whole story, most used first.
    pub fn reaction_counts(&self, story_id: i64) -> Result<Vec<ReactionCount>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT reaction, COUNT(*) AS n FROM story_reactions
                 WHERE story_id = ?1 GROUP BY reaction ORDER BY n DESC, reaction ASC",
            )?;
            let rows = stmt
                .query_map([story_id], |row| {
                    Ok(ReactionCount {
                        reaction: row.get(0)?,
                        count: row.get(1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn reaction_counts_by_item(&self, story_id: i64) -> Result<HashMap<i64, i64>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT item_id, COUNT(*) FROM story_reactions
                 WHERE story_id = ?1 AND item_id > 0 GROUP BY item_id",
            )?;
            let rows = stmt
                .query_map([story_id], |row| {
                    Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
                })?
                .collect::<std::result::Result<HashMap<_, _>, _>>()?;
            Ok(rows)
        })
    }

    pub fn user_reaction(
        &self,
        story_id: i64,
        item_id: Option<i64>,
        user_id: i64,
    ) -> Result<Option<String>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT reaction FROM story_reactions WHERE story_id = ?1 AND item_id = ?2 AND user_id = ?3",
                rusqlite::params![story_id, item_key(item_id), user_id],
                |row| row.get(0),
            )
            .optional()
        })
    }

    /// Latest reaction per user for the given users, anywhere on the story.
    pub fn reactions_by_users(&self, story_id: i64, user_ids: &[i64]) -> Result<HashMap<i64, String>> {
        if user_ids.is_empty() {
            return Ok(HashMap::new());
        }
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT user_id, reaction FROM story_reactions
                 WHERE story_id = ?1 AND user_id IN ({})
                 ORDER BY created_at ASC, id ASC",
                placeholders(2, user_ids.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let params = std::iter::once(&story_id).chain(user_ids.iter());
            let mut map = HashMap::new();
            let rows = stmt.query_map(rusqlite::params_from_iter(params), |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?;
            for row in rows {
                let (user_id, reaction) = row?;
                map.insert(user_id, reaction);
            }
            Ok(map)
        })
    }

    // -- Replies --

    pub fn insert_reply(
        &self,
        story_id: i64,
        item_id: Option<i64>,
        user_id: i64,
        message: &str,
        is_dm: bool,
        now: DateTime<Utc>,
    ) -> Result<i64> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO story_replies (story_id, item_id, user_id, message, is_dm, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![story_id, item_id, user_id, message, is_dm, to_millis(now)],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_reply(&self, reply_id: i64) -> Result<Option<ReplyRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT r.id, r.story_id, r.item_id, r.user_id, COALESCE(u.username, ''), r.message, r.is_dm, r.created_at
                 FROM story_replies r LEFT JOIN users u ON u.id = r.user_id
                 WHERE r.id = ?1",
                [reply_id],
                reply_from_row,
            )
            .optional()
        })
    }

    pub fn delete_reply(&self, reply_id: i64) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute("DELETE FROM story_replies WHERE id = ?1", [reply_id])?;
            Ok(changed > 0)
        })
    }

    pub fn replies_for(
        &self,
        story_id: i64,
        item_id: Option<i64>,
        limit: usize,
    ) -> Result<Vec<ReplyRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT r.id, r.story_id, r.item_id, r.user_id, COALESCE(u.username, ''), r.message, r.is_dm, r.created_at
                 FROM story_replies r LEFT JOIN users u ON u.id = r.user_id
                 WHERE r.story_id = ?1 AND (?2 IS NULL OR r.item_id = ?2)
                 ORDER BY r.created_at DESC, r.id DESC
                 LIMIT ?3",
            )?;
            let rows = stmt
                .query_map(rusqlite::params![story_id, item_id, limit as i64], reply_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn reply_count(&self, story_id: i64) -> Result<i64> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM story_replies WHERE story_id = ?1",
                [story_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    // -- Reports --

    pub fn reports_for_story(&self, story_id: i64) -> Result<Vec<ReportRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, story_id, reporter_id, reason, description, status, action_taken, created_at
                 FROM story_reports WHERE story_id = ?1 ORDER BY created_at DESC, id DESC",
            )?;
            let rows = stmt
                .query_map([story_id], report_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// One row per story with pending reports, most reported first.
    pub fn pending_report_groups(&self, limit: usize, offset: usize) -> Result<Vec<PendingReportGroup>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT r.id, r.story_id, r.reporter_id, r.reason, r.description, r.status, r.action_taken,
                        r.created_at, COALESCE(s.author_id, 0), g.n
                 FROM story_reports r
                 JOIN (
                     SELECT story_id, COUNT(*) AS n, MAX(id) AS latest_id
                     FROM story_reports WHERE status = 'pending' GROUP BY story_id
                 ) g ON g.latest_id = r.id
                 LEFT JOIN stories s ON s.id = r.story_id
                 ORDER BY g.n DESC, r.created_at DESC
                 LIMIT ?1 OFFSET ?2",
            )?;
            let rows = stmt
                .query_map(rusqlite::params![limit as i64, offset as i64], |row| {
                    Ok(PendingReportGroup {
                        report: report_from_row(row)?,
                        story_author_id: row.get(8)?,
                        report_count: row.get(9)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn report_stats(&self) -> Result<ReportStats> {
        self.with_conn(|conn| {
            let stats = conn.query_row(
                "SELECT
                    COUNT(*),
                    COALESCE(SUM(CASE WHEN status = 'pending' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN status = 'reviewed' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN status = 'dismissed' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN status = 'actioned' THEN 1 ELSE 0 END), 0),
                    COUNT(DISTINCT story_id)
                 FROM story_reports",
                [],
                |row| {
                    Ok(ReportStats {
                        total_reports: row.get(0)?,
                        pending_count: row.get(1)?,
                        reviewed_count: row.get(2)?,
                        dismissed_count: row.get(3)?,
                        actioned_count: row.get(4)?,
                        unique_stories_reported: row.get(5)?,
                    })
                },
            )?;
            Ok(stats)
        })
    }

    pub fn update_report_status(
        &self,
        report_id: i64,
        status: ReportStatus,
        reviewer_id: i64,
        action_taken: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE story_reports
                 SET status = ?1, reviewed_by = ?2, reviewed_at = ?3, action_taken = ?4
                 WHERE id = ?5",
                rusqlite::params![status.as_str(), reviewer_id, to_millis(now), action_taken, report_id],
            )?;
            Ok(changed > 0)
        })
    }
}

/// Insert a report, or refresh the reporter's existing one for this story.
/// A refreshed report keeps its status. Returns the row's status afterwards.
pub fn upsert_report(
    conn: &Connection,
    story_id: i64,
    reporter_id: i64,
    reason: ReportReason,
    description: &str,
    now: DateTime<Utc>,
) -> Result<ReportStatus> {
    let status: String = conn.query_row(
        "INSERT INTO story_reports (story_id, reporter_id, reason, description, status, created_at)
         VALUES (?1, ?2, ?3, ?4, 'pending', ?5)
         ON CONFLICT(story_id, reporter_id)
         DO UPDATE SET reason = excluded.reason, description = excluded.description,
                       created_at = excluded.created_at
         RETURNING status",
        rusqlite::params![story_id, reporter_id, reason.as_str(), description, to_millis(now)],
        |row| row.get(0),
    )?;
    Ok(ReportStatus::parse(&status).unwrap_or(ReportStatus::Pending))
}

pub fn pending_report_count(conn: &Connection, story_id: i64) -> Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM story_reports WHERE story_id = ?1 AND status = 'pending'",
        [story_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Move every pending report on a story to `actioned`. Returns rows changed.
pub fn action_pending_reports(
    conn: &Connection,
    story_id: i64,
    action_taken: &str,
    now: DateTime<Utc>,
) -> Result<usize> {
    let changed = conn.execute(
        "UPDATE story_reports
         SET status = 'actioned', reviewed_by = 0, reviewed_at = ?1, action_taken = ?2
         WHERE story_id = ?3 AND status = 'pending'",
        rusqlite::params![to_millis(now), action_taken, story_id],
    )?;
    Ok(changed)
}

fn reply_from_row(row: &Row<'_>) -> rusqlite::Result<ReplyRow> {
    Ok(ReplyRow {
        id: row.get(0)?,
        story_id: row.get(1)?,
        item_id: row.get(2)?,
        user_id: row.get(3)?,
        username: row.get(4)?,
        message: row.get(5)?,
        is_dm: row.get(6)?,
        created_at: from_millis(row.get(7)?),
    })
}

fn report_from_row(row: &Row<'_>) -> rusqlite::Result<ReportRow> {
    let id: i64 = row.get(0)?;
    let status: String = row.get(5)?;
    Ok(ReportRow {
        id,
        story_id: row.get(1)?,
        reporter_id: row.get(2)?,
        reason: row.get(3)?,
        description: row.get(4)?,
        status: ReportStatus::parse(&status).unwrap_or_else(|| {
            warn!("Corrupt status '{}' on report {}", status, id);
            ReportStatus::Pending
        }),
        action_taken: row.get(6)?,
        created_at: from_millis(row.get(7)?),
    })
}
