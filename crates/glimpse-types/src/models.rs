use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who may see a story. Ordered from least to most restrictive.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Privacy {
    Public,
    #[default]
    Friends,
    CloseFriends,
}

impl Privacy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Friends => "friends",
            Self::CloseFriends => "close_friends",
        }
    }

    /// Strict parse. `connections` is the legacy spelling of `friends`.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "public" => Some(Self::Public),
            "friends" | "connections" => Some(Self::Friends),
            "close_friends" => Some(Self::CloseFriends),
            _ => None,
        }
    }

    /// Lenient parse: anything unknown or empty falls back to `friends`.
    pub fn normalize(value: Option<&str>) -> Self {
        value.and_then(Self::parse).unwrap_or(Self::Friends)
    }

    pub fn more_restrictive(self, other: Self) -> Self {
        self.max(other)
    }
}

impl fmt::Display for Privacy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Moderation state of a story. Only `Published` stories are served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoryStatus {
    Published,
    PendingReview,
}

impl StoryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Published => "published",
            Self::PendingReview => "pending_review",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "published" => Some(Self::Published),
            "pending_review" => Some(Self::PendingReview),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Image,
    Video,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "image" => Some(Self::Image),
            "video" => Some(Self::Video),
            _ => None,
        }
    }

    pub fn from_mime(mime: &str) -> Self {
        if mime.starts_with("video/") {
            Self::Video
        } else {
            Self::Image
        }
    }
}

/// Which authors are eligible for a feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Friends,
    Following,
    All,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Friends => "friends",
            Self::Following => "following",
            Self::All => "all",
        }
    }

    pub fn normalize(value: Option<&str>) -> Self {
        match value {
            Some("following") => Self::Following,
            Some("all") => Self::All,
            _ => Self::Friends,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedOrder {
    UnseenFirst,
    RecentActivity,
}

impl FeedOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnseenFirst => "unseen_first",
            Self::RecentActivity => "recent_activity",
        }
    }

    pub fn normalize(value: Option<&str>) -> Self {
        match value {
            Some("recent_activity") => Self::RecentActivity,
            _ => Self::UnseenFirst,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Pending,
    Reviewed,
    Dismissed,
    Actioned,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Reviewed => "reviewed",
            Self::Dismissed => "dismissed",
            Self::Actioned => "actioned",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "reviewed" => Some(Self::Reviewed),
            "dismissed" => Some(Self::Dismissed),
            "actioned" => Some(Self::Actioned),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportReason {
    Spam,
    Inappropriate,
    Harassment,
    Violence,
    HateSpeech,
    FalseInfo,
    Other,
}

impl ReportReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Spam => "spam",
            Self::Inappropriate => "inappropriate",
            Self::Harassment => "harassment",
            Self::Violence => "violence",
            Self::HateSpeech => "hate_speech",
            Self::FalseInfo => "false_info",
            Self::Other => "other",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "spam" => Some(Self::Spam),
            "inappropriate" => Some(Self::Inappropriate),
            "harassment" => Some(Self::Harassment),
            "violence" => Some(Self::Violence),
            "hate_speech" => Some(Self::HateSpeech),
            "false_info" => Some(Self::FalseInfo),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

/// Overlay attached to a story item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StickerKind {
    Mention,
    Link,
    Location,
    Poll,
}

impl StickerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mention => "mention",
            Self::Link => "link",
            Self::Location => "location",
            Self::Poll => "poll",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "mention" => Some(Self::Mention),
            "link" => Some(Self::Link),
            "location" => Some(Self::Location),
            "poll" => Some(Self::Poll),
            _ => None,
        }
    }
}

/// One upload session by one author.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Story {
    pub id: i64,
    pub author_id: i64,
    pub privacy: Privacy,
    pub status: StoryStatus,
    pub created_at: DateTime<Utc>,
    /// Bumped whenever an item is appended.
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_archived: bool,
    pub hidden_viewer_ids: Vec<i64>,
}

impl Story {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// One media unit inside a story.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryItem {
    pub id: i64,
    pub story_id: i64,
    pub author_id: i64,
    pub media_id: String,
    pub media_type: MediaType,
    pub mime: String,
    pub duration_ms: Option<u32>,
    pub created_at: DateTime<Utc>,
}

/// A caller as seen by the visibility rules. Ids <= 0 are anonymous.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewer {
    pub id: i64,
    pub is_moderator: bool,
}

impl Viewer {
    pub fn new(id: i64, is_moderator: bool) -> Self {
        Self { id, is_moderator }
    }

    pub fn anonymous() -> Self {
        Self {
            id: 0,
            is_moderator: false,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.id > 0
    }
}

impl Default for Viewer {
    fn default() -> Self {
        Self::anonymous()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn privacy_rank_picks_most_restrictive() {
        assert_eq!(Privacy::Public.more_restrictive(Privacy::Friends), Privacy::Friends);
        assert_eq!(Privacy::CloseFriends.more_restrictive(Privacy::Public), Privacy::CloseFriends);
        assert_eq!(Privacy::Friends.more_restrictive(Privacy::Friends), Privacy::Friends);
    }

    #[test]
    fn unknown_values_fall_back_to_defaults() {
        assert_eq!(Privacy::normalize(Some("everyone")), Privacy::Friends);
        assert_eq!(Privacy::normalize(Some("connections")), Privacy::Friends);
        assert_eq!(Privacy::normalize(None), Privacy::Friends);
        assert_eq!(Scope::normalize(Some("galaxy")), Scope::Friends);
        assert_eq!(FeedOrder::normalize(Some("random")), FeedOrder::UnseenFirst);
        assert_eq!(FeedOrder::normalize(Some("recent_activity")), FeedOrder::RecentActivity);
    }

    #[test]
    fn media_type_from_mime() {
        assert_eq!(MediaType::from_mime("video/mp4"), MediaType::Video);
        assert_eq!(MediaType::from_mime("image/webp"), MediaType::Image);
    }

    #[test]
    fn privacy_serializes_snake_case() {
        let json = serde_json::to_string(&Privacy::CloseFriends).unwrap();
        assert_eq!(json, "\"close_friends\"");
    }
}
