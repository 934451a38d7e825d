//! Database row types. Story and item rows map straight onto the shared
//! domain models in glimpse-types; the rest stay local to the DB layer.

use chrono::{DateTime, Utc};
use glimpse_types::models::{ReportStatus, StickerKind};

/// Timestamps are stored as integer milliseconds since the Unix epoch.
pub fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

pub fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub password: String,
    pub is_moderator: bool,
    pub created_at: DateTime<Utc>,
}

/// One viewer of a story, collapsed across all of its items.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewerRow {
    pub viewer_id: i64,
    pub username: String,
    pub last_viewed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewStats {
    pub total_views: i64,
    pub unique_viewers: i64,
    /// (item_id, distinct viewers)
    pub views_by_item: Vec<(i64, i64)>,
}

#[derive(Debug, Clone)]
pub struct ReactionRow {
    pub user_id: i64,
    pub username: String,
    pub item_id: Option<i64>,
    pub reaction: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ReplyRow {
    pub id: i64,
    pub story_id: i64,
    pub item_id: Option<i64>,
    pub user_id: i64,
    pub username: String,
    pub message: String,
    pub is_dm: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ReportRow {
    pub id: i64,
    pub story_id: i64,
    pub reporter_id: i64,
    pub reason: String,
    pub description: String,
    pub status: ReportStatus,
    pub action_taken: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A story with pending reports, as listed for moderators.
#[derive(Debug, Clone)]
pub struct PendingReportGroup {
    pub report: ReportRow,
    pub story_author_id: i64,
    pub report_count: i64,
}

/// A sticker as stored. `data` is the raw JSON text the client sent.
#[derive(Debug, Clone, PartialEq)]
pub struct StickerRow {
    pub id: i64,
    pub story_id: i64,
    pub item_id: i64,
    pub kind: StickerKind,
    pub data: String,
    pub position_x: f64,
    pub position_y: f64,
    pub created_at: DateTime<Utc>,
}
