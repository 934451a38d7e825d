//! Reactions and replies on stories.

use chrono::Utc;
use glimpse_types::api::{
    ReactionCount, ReactionEntry, ReactionsResponse, RepliesResponse, ReplyEntry, ReplyRequest,
};
use glimpse_types::events::StoryEvent;
use glimpse_types::models::{Story, Viewer};

use crate::error::{StoryError, StoryResult};
use crate::StoryEngine;

pub const ALLOWED_REACTIONS: &[&str] = &[
    "❤️", "😂", "😮", "😢", "👏", "🔥", "💩", "🤦🏽‍♂️", "👿", "🤯", "😘", "😡", "🥰", "😳", "🥶",
    "like",
];

pub const MAX_REPLY_CHARS: usize = 1000;
const REPLIES_LIMIT: usize = 100;

impl StoryEngine {
    /// Reactions on a story (or one item of it). Managers only.
    pub fn reactions(&self, viewer: Viewer, story_id: i64, item_id: Option<i64>) -> StoryResult<ReactionsResponse> {
        let story = self.managed_story(viewer, story_id)?;
        let reactions: Vec<ReactionEntry> = self
            .db
            .reactions_for(story.id, item_id)?
            .into_iter()
            .map(|row| ReactionEntry {
                user_id: row.user_id,
                username: row.username,
                reaction: row.reaction,
                created_at: row.created_at,
            })
            .collect();

        let counts = tally(&reactions);
        let total = counts.iter().map(|c| c.count).sum();

        Ok(ReactionsResponse {
            reactions,
            counts,
            total,
            user_reaction: self.db.user_reaction(story.id, item_id, viewer.id)?,
        })
    }

    /// Add or replace the viewer's reaction.
    pub fn react(
        &self,
        viewer: Viewer,
        story_id: i64,
        item_id: Option<i64>,
        reaction: &str,
    ) -> StoryResult<()> {
        let story = self.viewable_story(viewer, story_id)?;
        if story.author_id == viewer.id {
            return Err(StoryError::invalid("Cannot react to your own story"));
        }
        if !ALLOWED_REACTIONS.contains(&reaction) {
            return Err(StoryError::invalid("Reaction not allowed"));
        }
        self.check_item(&story, item_id)?;

        self.db
            .upsert_reaction(story.id, item_id, viewer.id, reaction, Utc::now())?;
        self.sink.notify(StoryEvent::ReactionAdded {
            story_id: story.id,
            item_id,
            author_id: story.author_id,
            actor_id: viewer.id,
            reaction: reaction.to_string(),
        });
        Ok(())
    }

    pub fn unreact(&self, viewer: Viewer, story_id: i64, item_id: Option<i64>) -> StoryResult<bool> {
        if !viewer.is_authenticated() {
            return Err(StoryError::Forbidden);
        }
        Ok(self.db.remove_reaction(story_id, item_id, viewer.id)?)
    }

    /// Replies on a story, newest first. Managers only.
    pub fn replies(&self, viewer: Viewer, story_id: i64, item_id: Option<i64>) -> StoryResult<RepliesResponse> {
        let story = self.managed_story(viewer, story_id)?;
        let replies: Vec<ReplyEntry> = self
            .db
            .replies_for(story.id, item_id, REPLIES_LIMIT)?
            .into_iter()
            .map(|row| ReplyEntry {
                id: row.id,
                user_id: row.user_id,
                username: row.username,
                item_id: row.item_id,
                message: row.message,
                is_dm: row.is_dm,
                created_at: row.created_at,
            })
            .collect();
        Ok(RepliesResponse {
            count: replies.len(),
            replies,
        })
    }

    pub fn reply(&self, viewer: Viewer, story_id: i64, req: &ReplyRequest) -> StoryResult<i64> {
        let story = self.viewable_story(viewer, story_id)?;
        if story.author_id == viewer.id {
            return Err(StoryError::invalid("Cannot reply to your own story"));
        }
        let message = req.message.trim();
        if message.is_empty() {
            return Err(StoryError::invalid("Message is required"));
        }
        if message.chars().count() > MAX_REPLY_CHARS {
            return Err(StoryError::invalid(format!(
                "Message too long (max {} characters)",
                MAX_REPLY_CHARS
            )));
        }
        self.check_item(&story, req.item_id)?;

        let reply_id = self.db.insert_reply(
            story.id,
            req.item_id,
            viewer.id,
            message,
            req.is_dm,
            Utc::now(),
        )?;

        if req.is_dm {
            self.sink.notify(StoryEvent::ReplyAdded {
                story_id: story.id,
                item_id: req.item_id,
                reply_id,
                author_id: story.author_id,
                actor_id: viewer.id,
                is_dm: true,
            });
        }
        Ok(reply_id)
    }

    /// The reply's author or a moderator may delete it.
    pub fn delete_reply(&self, viewer: Viewer, reply_id: i64) -> StoryResult<()> {
        let reply = self.db.get_reply(reply_id)?.ok_or(StoryError::NotFound)?;
        if !viewer.is_authenticated() || (reply.user_id != viewer.id && !viewer.is_moderator) {
            return Err(StoryError::Forbidden);
        }
        self.db.delete_reply(reply.id)?;
        Ok(())
    }

    fn check_item(&self, story: &Story, item_id: Option<i64>) -> StoryResult<()> {
        let Some(item_id) = item_id else {
            return Ok(());
        };
        match self.db.get_item(item_id)? {
            Some(item) if item.story_id == story.id => Ok(()),
            _ => Err(StoryError::invalid("Item does not belong to this story")),
        }
    }
}

fn tally(reactions: &[ReactionEntry]) -> Vec<ReactionCount> {
    let mut counts: Vec<ReactionCount> = Vec::new();
    for entry in reactions {
        match counts.iter_mut().find(|c| c.reaction == entry.reaction) {
            Some(c) => c.count += 1,
            None => counts.push(ReactionCount {
                reaction: entry.reaction.clone(),
                count: 1,
            }),
        }
    }
    counts.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.reaction.cmp(&b.reaction)));
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::BroadcastSink;
    use crate::testing::{engine, story, user};
    use glimpse_types::models::Privacy;
    use std::sync::Arc;

    #[test]
    fn reactions_are_validated_and_replaced() {
        let sink = BroadcastSink::default();
        let mut rx = sink.subscribe();
        let engine = engine().with_sink(Arc::new(sink));
        let author = Viewer::new(user(&engine, "author"), false);
        let fan = Viewer::new(user(&engine, "fan"), false);
        let sid = story(&engine, author.id, Privacy::Public, 1);

        assert!(engine.react(author, sid, None, "🔥").is_err());
        assert!(engine.react(fan, sid, None, "banana").is_err());
        assert!(engine.react(fan, sid, Some(9999), "🔥").is_err());

        engine.react(fan, sid, None, "🔥").unwrap();
        engine.react(fan, sid, None, "like").unwrap();

        let listed = engine.reactions(author, sid, None).unwrap();
        assert_eq!(listed.total, 1);
        assert_eq!(listed.reactions[0].reaction, "like");
        assert!(engine.reactions(fan, sid, None).is_err());

        let event = rx.try_recv().unwrap();
        assert_eq!(event.recipient(), Some(author.id));

        assert!(engine.unreact(fan, sid, None).unwrap());
        assert_eq!(engine.reactions(author, sid, None).unwrap().total, 0);
    }

    #[test]
    fn replies_validate_message_and_ownership() {
        let engine = engine();
        let author = Viewer::new(user(&engine, "author"), false);
        let fan = Viewer::new(user(&engine, "fan"), false);
        let other = Viewer::new(user(&engine, "other"), false);
        let sid = story(&engine, author.id, Privacy::Public, 1);

        let req = |message: &str| ReplyRequest {
            message: message.to_string(),
            item_id: None,
            is_dm: true,
        };
        assert!(engine.reply(fan, sid, &req("   ")).is_err());
        assert!(engine.reply(fan, sid, &req(&"x".repeat(1001))).is_err());
        assert!(engine.reply(author, sid, &req("hi me")).is_err());

        let id = engine.reply(fan, sid, &req(&"x".repeat(1000))).unwrap();
        assert_eq!(engine.replies(author, sid, None).unwrap().count, 1);

        assert!(matches!(engine.delete_reply(other, id), Err(StoryError::Forbidden)));
        engine.delete_reply(fan, id).unwrap();
        assert!(matches!(engine.delete_reply(fan, id), Err(StoryError::NotFound)));
    }
}
