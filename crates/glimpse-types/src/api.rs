use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{MediaType, Privacy, ReportStatus, StickerKind};

pub const API_VERSION: &str = "1.1";

/// Leading integer of a raw query value: `"12abc"` reads as 12 and `"abc"`
/// as 0. Numeric query fields go through this so junk is clamped downstream
/// instead of failing extraction.
pub fn lenient_int(raw: Option<&str>) -> Option<i64> {
    let raw = raw?.trim();
    let (sign, digits) = match raw.as_bytes().first() {
        Some(b'-') => (-1, &raw[1..]),
        Some(b'+') => (1, &raw[1..]),
        _ => (1, raw),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    let value = match &digits[..end] {
        "" => 0,
        n => n.parse::<i64>().unwrap_or(i64::MAX),
    };
    Some(sign * value)
}

// -- JWT Claims --

/// JWT claims shared by the REST middleware and token issuance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub username: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub user_id: i64,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_id: i64,
    pub username: String,
    pub token: String,
}

// -- Feed --

/// Raw feed query. Every field is normalized to a safe default rather than
/// rejected.
#[derive(Debug, Default, Deserialize)]
pub struct FeedQuery {
    pub scope: Option<String>,
    pub order: Option<String>,
    pub limit: Option<String>,
    pub exclude_me: Option<String>,
    pub compact: Option<String>,
}

impl FeedQuery {
    pub fn limit(&self) -> Option<i64> {
        lenient_int(self.limit.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorInfo {
    pub id: i64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_url: Option<String>,
}

/// All of one author's active stories, merged for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorBucket {
    pub story_id: i64,
    pub story_ids: Vec<i64>,
    pub author: AuthorInfo,
    pub cover_thumb: String,
    pub last_updated: DateTime<Utc>,
    pub has_unseen: bool,
    pub unseen_count: usize,
    pub items_count: usize,
    pub privacy: Privacy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedResponse {
    pub api_version: String,
    pub stories: Vec<AuthorBucket>,
    /// Set when some author groups could not be loaded and were omitted.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub partial: bool,
}

// -- Stories --

#[derive(Debug, Default, Deserialize)]
pub struct CreateStoryQuery {
    pub privacy: Option<String>,
    pub duration_ms: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateStoryResponse {
    pub ok: bool,
    pub story_id: i64,
    pub item_id: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateStoryRequest {
    pub privacy: Option<String>,
    pub archive: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateStoryResponse {
    pub story_id: i64,
    pub privacy: Privacy,
    pub is_archived: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemAnalytics {
    pub view_count: i64,
    pub reaction_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemPayload {
    pub item_id: i64,
    pub story_id: i64,
    #[serde(rename = "type")]
    pub media_type: MediaType,
    pub src: String,
    pub duration_ms: Option<u32>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analytics: Option<ItemAnalytics>,
    /// Omitted in compact responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stickers: Option<Vec<StickerPayload>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorySummaryAnalytics {
    pub view_count: i64,
    pub reaction_count: i64,
    /// Empty in compact responses.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reactions: Vec<ReactionCount>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StoryQuery {
    pub compact: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryDetail {
    pub api_version: String,
    pub story_id: i64,
    pub author: AuthorInfo,
    pub items: Vec<ItemPayload>,
    pub privacy: Privacy,
    pub is_archived: bool,
    pub can_manage: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analytics: Option<StorySummaryAnalytics>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ArchiveQuery {
    pub limit: Option<String>,
    pub page: Option<String>,
}

impl ArchiveQuery {
    pub fn limit(&self) -> Option<i64> {
        lenient_int(self.limit.as_deref())
    }

    pub fn page(&self) -> Option<i64> {
        lenient_int(self.page.as_deref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchivedStory {
    pub story_id: i64,
    pub cover_thumb: String,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub items_count: usize,
    pub privacy: Privacy,
    pub view_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveResponse {
    pub api_version: String,
    pub stories: Vec<ArchivedStory>,
    pub has_more: bool,
    pub page: i64,
}

// -- Hide list / close friends --

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: i64,
    pub username: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UsersResponse {
    pub users: Vec<UserSummary>,
    pub count: usize,
}

// -- Viewers & analytics --

#[derive(Debug, Default, Deserialize)]
pub struct ViewersQuery {
    pub limit: Option<String>,
}

impl ViewersQuery {
    pub fn limit(&self) -> Option<i64> {
        lenient_int(self.limit.as_deref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewerEntry {
    pub user_id: i64,
    pub username: String,
    pub viewed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reaction: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ViewersResponse {
    pub viewers: Vec<ViewerEntry>,
    pub total_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemViewCount {
    pub item_id: i64,
    pub view_count: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnalyticsResponse {
    pub story_id: i64,
    pub total_views: i64,
    pub unique_viewers: i64,
    pub views_by_item: Vec<ItemViewCount>,
    pub reactions: Vec<ReactionCount>,
    pub reply_count: i64,
}

// -- Stickers --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddStickerRequest {
    #[serde(rename = "type")]
    pub kind: String,
    /// Client-owned payload, stored as given once it passes the per-kind
    /// checks.
    pub data: serde_json::Value,
    pub position_x: Option<f64>,
    pub position_y: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AddStickerResponse {
    pub success: bool,
    pub sticker_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PollVoteRequest {
    pub option_index: i64,
}

/// Percent offsets within the item, 0 to 100 on each axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StickerPosition {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StickerPayload {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: StickerKind,
    pub data: serde_json::Value,
    pub position: StickerPosition,
    pub created_at: DateTime<Utc>,
    /// Vote count per option, polls only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub votes: Option<Vec<i64>>,
    /// The caller's option, if they voted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_vote: Option<i64>,
}

// -- Reactions --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReactionRequest {
    pub reaction: String,
    pub item_id: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ItemFilter {
    pub item_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionCount {
    pub reaction: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactionEntry {
    pub user_id: i64,
    pub username: String,
    pub reaction: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReactionsResponse {
    pub reactions: Vec<ReactionEntry>,
    pub counts: Vec<ReactionCount>,
    pub total: i64,
    pub user_reaction: Option<String>,
}

// -- Replies --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReplyRequest {
    pub message: String,
    pub item_id: Option<i64>,
    #[serde(default = "default_is_dm")]
    pub is_dm: bool,
}

fn default_is_dm() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyEntry {
    pub id: i64,
    pub user_id: i64,
    pub username: String,
    pub item_id: Option<i64>,
    pub message: String,
    pub is_dm: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RepliesResponse {
    pub replies: Vec<ReplyEntry>,
    pub count: usize,
}

// -- Reports --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReportRequest {
    pub reason: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReportResponse {
    pub success: bool,
    pub auto_hidden: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReportsQuery {
    pub limit: Option<String>,
    pub offset: Option<String>,
}

impl ReportsQuery {
    pub fn limit(&self) -> Option<i64> {
        lenient_int(self.limit.as_deref())
    }

    pub fn offset(&self) -> Option<i64> {
        lenient_int(self.offset.as_deref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportEntry {
    pub id: i64,
    pub story_id: i64,
    pub story_author_id: i64,
    pub reporter_id: i64,
    pub reason: String,
    pub description: String,
    pub status: ReportStatus,
    pub report_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportStats {
    pub total_reports: i64,
    pub pending_count: i64,
    pub reviewed_count: i64,
    pub dismissed_count: i64,
    pub actioned_count: i64,
    pub unique_stories_reported: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReportsResponse {
    pub stats: ReportStats,
    pub reports: Vec<ReportEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateReportRequest {
    pub status: Option<String>,
    pub action_taken: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OkResponse {
    pub ok: bool,
}
