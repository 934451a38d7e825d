use std::collections::{HashMap, HashSet};

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::models::{ViewStats, ViewerRow, from_millis, to_millis};
use crate::{Database, placeholders};

impl Database {
    /// Record that `viewer_id` saw `item_id`. Repeat calls only move
    /// `viewed_at` forward; the (item, viewer) key is never duplicated.
    pub fn mark_seen(&self, item_id: i64, viewer_id: i64, now: DateTime<Utc>) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO story_views (item_id, viewer_id, viewed_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(item_id, viewer_id) DO UPDATE SET viewed_at = excluded.viewed_at",
                rusqlite::params![item_id, viewer_id, to_millis(now)],
            )?;
            Ok(())
        })
    }

    /// The subset of `item_ids` that `viewer_id` has seen, in one query.
    pub fn seen_item_ids(&self, item_ids: &[i64], viewer_id: i64) -> Result<HashSet<i64>> {
        if item_ids.is_empty() {
            return Ok(HashSet::new());
        }
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT item_id FROM story_views WHERE viewer_id = ?1 AND item_id IN ({})",
                placeholders(2, item_ids.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let params = std::iter::once(&viewer_id).chain(item_ids.iter());
            let seen = stmt
                .query_map(rusqlite::params_from_iter(params), |row| row.get::<_, i64>(0))?
                .collect::<std::result::Result<HashSet<_>, _>>()?;
            Ok(seen)
        })
    }

    /// Viewers across all given items, one row per viewer, most recent first.
    pub fn story_viewers(&self, item_ids: &[i64], limit: usize) -> Result<Vec<ViewerRow>> {
        if item_ids.is_empty() {
            return Ok(vec![]);
        }
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT v.viewer_id, COALESCE(u.username, ''), MAX(v.viewed_at) AS last_viewed_at
                 FROM story_views v
                 LEFT JOIN users u ON u.id = v.viewer_id
                 WHERE v.item_id IN ({})
                 GROUP BY v.viewer_id
                 ORDER BY last_viewed_at DESC, v.viewer_id ASC
                 LIMIT ?{}",
                placeholders(1, item_ids.len()),
                item_ids.len() + 1
            );
            let mut stmt = conn.prepare(&sql)?;
            let limit = limit as i64;
            let params = item_ids.iter().chain(std::iter::once(&limit));
            let rows = stmt
                .query_map(rusqlite::params_from_iter(params), |row| {
                    Ok(ViewerRow {
                        viewer_id: row.get(0)?,
                        username: row.get(1)?,
                        last_viewed_at: from_millis(row.get(2)?),
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn unique_viewer_count(&self, item_ids: &[i64]) -> Result<i64> {
        if item_ids.is_empty() {
            return Ok(0);
        }
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT COUNT(DISTINCT viewer_id) FROM story_views WHERE item_id IN ({})",
                placeholders(1, item_ids.len())
            );
            let count = conn.query_row(
                &sql,
                rusqlite::params_from_iter(item_ids.iter()),
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    /// Distinct viewers per story across its items, in one grouped query.
    /// Stories nobody has viewed are absent from the map.
    pub fn unique_viewers_by_story(&self, story_ids: &[i64]) -> Result<HashMap<i64, i64>> {
        if story_ids.is_empty() {
            return Ok(HashMap::new());
        }
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT i.story_id, COUNT(DISTINCT v.viewer_id)
                 FROM story_views v
                 JOIN story_items i ON i.id = v.item_id
                 WHERE i.story_id IN ({})
                 GROUP BY i.story_id",
                placeholders(1, story_ids.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let counts = stmt
                .query_map(rusqlite::params_from_iter(story_ids.iter()), |row| {
                    Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
                })?
                .collect::<std::result::Result<HashMap<_, _>, _>>()?;
            Ok(counts)
        })
    }

    pub fn view_stats(&self, item_ids: &[i64]) -> Result<ViewStats> {
        if item_ids.is_empty() {
            return Ok(ViewStats::default());
        }
        self.with_conn(|conn| {
            let in_list = placeholders(1, item_ids.len());
            let (total_views, unique_viewers) = conn.query_row(
                &format!(
                    "SELECT COUNT(*), COUNT(DISTINCT viewer_id) FROM story_views WHERE item_id IN ({})",
                    in_list
                ),
                rusqlite::params_from_iter(item_ids.iter()),
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
            )?;

            let mut stmt = conn.prepare(&format!(
                "SELECT item_id, COUNT(DISTINCT viewer_id) FROM story_views
                 WHERE item_id IN ({}) GROUP BY item_id ORDER BY item_id",
                in_list
            ))?;
            let views_by_item = stmt
                .query_map(rusqlite::params_from_iter(item_ids.iter()), |row| {
                    Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(ViewStats {
                total_views,
                unique_viewers,
                views_by_item,
            })
        })
    }

    pub fn view_row_count(&self, item_id: i64, viewer_id: i64) -> Result<i64> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM story_views WHERE item_id = ?1 AND viewer_id = ?2",
                rusqlite::params![item_id, viewer_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }
}
