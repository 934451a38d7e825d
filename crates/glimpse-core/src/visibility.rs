//! Who may see which story.
//!
//! [`ViewerContext`] preloads the viewer's graph relations once per request
//! so [`can_view`] stays a pure function over in-memory data.

use std::collections::HashSet;

use glimpse_types::models::{Privacy, Story, Viewer};

use crate::error::StoryResult;
use crate::graph::SocialGraph;

#[derive(Debug, Clone, Default)]
pub struct ViewerContext {
    pub viewer: Viewer,
    pub friends: HashSet<i64>,
    pub following: HashSet<i64>,
    /// Authors whose close-friends list contains the viewer.
    pub close_friend_of: HashSet<i64>,
}

impl ViewerContext {
    pub fn load(graph: &dyn SocialGraph, viewer: Viewer) -> StoryResult<Self> {
        if !viewer.is_authenticated() {
            return Ok(Self::anonymous());
        }
        Ok(Self {
            viewer,
            friends: graph.friend_ids(viewer.id)?,
            following: graph.following_ids(viewer.id)?,
            close_friend_of: graph.close_friend_of(viewer.id)?,
        })
    }

    pub fn anonymous() -> Self {
        Self {
            viewer: Viewer::anonymous(),
            ..Default::default()
        }
    }
}

/// First matching rule wins; anonymous viewers never see anything.
pub fn can_view(story: &Story, ctx: &ViewerContext) -> bool {
    let viewer = ctx.viewer;
    if !viewer.is_authenticated() {
        return false;
    }
    if viewer.id == story.author_id || viewer.is_moderator {
        return true;
    }
    // Hide-list overrides every privacy level, public included.
    if story.hidden_viewer_ids.contains(&viewer.id) {
        return false;
    }
    match story.privacy {
        Privacy::Public => true,
        Privacy::CloseFriends => ctx.close_friend_of.contains(&story.author_id),
        Privacy::Friends => {
            ctx.friends.contains(&story.author_id) || ctx.following.contains(&story.author_id)
        }
    }
}

/// Author or moderator.
pub fn can_manage(story: &Story, viewer: Viewer) -> bool {
    viewer.is_authenticated() && (viewer.id == story.author_id || viewer.is_moderator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use glimpse_types::models::StoryStatus;

    fn story(author_id: i64, privacy: Privacy) -> Story {
        let now = Utc::now();
        Story {
            id: 1,
            author_id,
            privacy,
            status: StoryStatus::Published,
            created_at: now,
            updated_at: now,
            expires_at: now + Duration::hours(24),
            is_archived: false,
            hidden_viewer_ids: vec![],
        }
    }

    fn ctx(viewer_id: i64) -> ViewerContext {
        ViewerContext {
            viewer: Viewer::new(viewer_id, false),
            ..Default::default()
        }
    }

    #[test]
    fn public_visible_to_any_authenticated_viewer() {
        let s = story(1, Privacy::Public);
        for viewer in [2, 3, 99] {
            assert!(can_view(&s, &ctx(viewer)));
        }
        assert!(!can_view(&s, &ViewerContext::anonymous()));
        assert!(!can_view(&s, &ctx(-4)));
    }

    #[test]
    fn hide_list_beats_public() {
        let mut s = story(1, Privacy::Public);
        s.hidden_viewer_ids = vec![2];
        assert!(!can_view(&s, &ctx(2)));
        assert!(can_view(&s, &ctx(3)));
    }

    #[test]
    fn author_and_moderator_bypass_hide_list() {
        let mut s = story(1, Privacy::CloseFriends);
        s.hidden_viewer_ids = vec![1, 5];
        assert!(can_view(&s, &ctx(1)));

        let moderator = ViewerContext {
            viewer: Viewer::new(5, true),
            ..Default::default()
        };
        assert!(can_view(&s, &moderator));
    }

    #[test]
    fn close_friends_requires_edge_not_friendship() {
        let s = story(1, Privacy::CloseFriends);

        let mut friend = ctx(2);
        friend.friends.insert(1);
        friend.following.insert(1);
        assert!(!can_view(&s, &friend));

        let mut close = ctx(3);
        close.close_friend_of.insert(1);
        assert!(can_view(&s, &close));
    }

    #[test]
    fn friends_privacy_accepts_friend_or_follower() {
        let s = story(1, Privacy::Friends);

        let mut friend = ctx(2);
        friend.friends.insert(1);
        assert!(can_view(&s, &friend));

        let mut follower = ctx(3);
        follower.following.insert(1);
        assert!(can_view(&s, &follower));

        assert!(!can_view(&s, &ctx(4)));
    }

    #[test]
    fn context_loads_from_store() {
        let db = glimpse_db::Database::open_in_memory().unwrap();
        db.add_friendship(1, 2).unwrap();
        db.add_follow(2, 3).unwrap();
        db.add_close_friend(4, 2).unwrap();

        let ctx = ViewerContext::load(&db, Viewer::new(2, false)).unwrap();
        assert!(ctx.friends.contains(&1));
        assert!(ctx.following.contains(&3));
        assert!(ctx.close_friend_of.contains(&4));

        let anon = ViewerContext::load(&db, Viewer::anonymous()).unwrap();
        assert!(anon.friends.is_empty());
    }
}
