use serde::{Deserialize, Serialize};

/// Domain events emitted by story operations. Delivery is up to whichever
/// notification sink is installed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum StoryEvent {
    /// A new item was posted, possibly opening a new story
    StoryCreated {
        story_id: i64,
        item_id: i64,
        author_id: i64,
    },

    /// Someone reacted to a story (or to one item of it)
    ReactionAdded {
        story_id: i64,
        item_id: Option<i64>,
        author_id: i64,
        actor_id: i64,
        reaction: String,
    },

    /// Someone replied to a story
    ReplyAdded {
        story_id: i64,
        item_id: Option<i64>,
        reply_id: i64,
        author_id: i64,
        actor_id: i64,
        is_dm: bool,
    },

    /// A story crossed the report threshold and was pulled for review
    StoryAutoHidden { story_id: i64, report_count: i64 },
}

impl StoryEvent {
    /// The user this event is addressed to, if any.
    pub fn recipient(&self) -> Option<i64> {
        match self {
            Self::ReactionAdded { author_id, .. } | Self::ReplyAdded { author_id, .. } => {
                Some(*author_id)
            }
            _ => None,
        }
    }
}
