//! Graph and close-friends mutations. Each one bumps the salts of both
//! users so their cached feeds recompute.

use glimpse_types::api::UserSummary;
use glimpse_types::models::Viewer;

use crate::cache::bump_users;
use crate::error::{StoryError, StoryResult};
use crate::StoryEngine;

impl StoryEngine {
    pub fn add_friend(&self, viewer: Viewer, friend_id: i64) -> StoryResult<()> {
        self.check_other_user(viewer, friend_id)?;
        self.db.add_friendship(viewer.id, friend_id)?;
        bump_users(self.salts.as_ref(), &[viewer.id, friend_id]);
        Ok(())
    }

    pub fn remove_friend(&self, viewer: Viewer, friend_id: i64) -> StoryResult<bool> {
        self.check_other_user(viewer, friend_id)?;
        let removed = self.db.remove_friendship(viewer.id, friend_id)?;
        bump_users(self.salts.as_ref(), &[viewer.id, friend_id]);
        Ok(removed)
    }

    pub fn follow(&self, viewer: Viewer, leader_id: i64) -> StoryResult<()> {
        self.check_other_user(viewer, leader_id)?;
        self.db.add_follow(viewer.id, leader_id)?;
        bump_users(self.salts.as_ref(), &[viewer.id, leader_id]);
        Ok(())
    }

    pub fn unfollow(&self, viewer: Viewer, leader_id: i64) -> StoryResult<bool> {
        self.check_other_user(viewer, leader_id)?;
        let removed = self.db.remove_follow(viewer.id, leader_id)?;
        bump_users(self.salts.as_ref(), &[viewer.id, leader_id]);
        Ok(removed)
    }

    // -- Close friends --

    pub fn close_friends(&self, viewer: Viewer) -> StoryResult<Vec<UserSummary>> {
        if !viewer.is_authenticated() {
            return Err(StoryError::Forbidden);
        }
        let ids = self.db.close_friend_ids(viewer.id)?;
        self.user_summaries(&ids)
    }

    /// Re-adding an existing close friend just refreshes the edge.
    pub fn add_close_friend(&self, viewer: Viewer, friend_id: i64) -> StoryResult<()> {
        self.check_other_user(viewer, friend_id)?;
        self.db.add_close_friend(viewer.id, friend_id)?;
        bump_users(self.salts.as_ref(), &[viewer.id, friend_id]);
        Ok(())
    }

    pub fn remove_close_friend(&self, viewer: Viewer, friend_id: i64) -> StoryResult<bool> {
        self.check_other_user(viewer, friend_id)?;
        let removed = self.db.remove_close_friend(viewer.id, friend_id)?;
        bump_users(self.salts.as_ref(), &[viewer.id, friend_id]);
        Ok(removed)
    }

    fn check_other_user(&self, viewer: Viewer, other_id: i64) -> StoryResult<()> {
        if !viewer.is_authenticated() {
            return Err(StoryError::Forbidden);
        }
        if other_id <= 0 || other_id == viewer.id {
            return Err(StoryError::invalid("Invalid user id"));
        }
        if self.db.get_user_by_id(other_id)?.is_none() {
            return Err(StoryError::NotFound);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{engine, user};
    use glimpse_db::salts::user_salt_key;

    #[test]
    fn self_add_is_rejected() {
        let engine = engine();
        let me = Viewer::new(user(&engine, "me"), false);
        assert!(matches!(
            engine.add_close_friend(me, me.id),
            Err(StoryError::InvalidRequest(_))
        ));
        assert!(matches!(engine.add_friend(me, 999), Err(StoryError::NotFound)));
    }

    #[test]
    fn close_friend_edges_are_directed_and_bump_both_salts() {
        let engine = engine();
        let me = Viewer::new(user(&engine, "me"), false);
        let pal = user(&engine, "pal");

        engine.add_close_friend(me, pal).unwrap();
        engine.add_close_friend(me, pal).unwrap();
        let list = engine.close_friends(me).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].username, "pal");
        assert!(engine.close_friends(Viewer::new(pal, false)).unwrap().is_empty());
        assert_eq!(engine.db().salt(&user_salt_key(pal)).unwrap(), 2);

        assert!(engine.remove_close_friend(me, pal).unwrap());
        assert!(!engine.remove_close_friend(me, pal).unwrap());
    }

    #[test]
    fn friendship_is_symmetric() {
        let engine = engine();
        let me = Viewer::new(user(&engine, "me"), false);
        let pal = user(&engine, "pal");
        engine.add_friend(me, pal).unwrap();
        assert!(engine.db().friend_ids(pal).unwrap().contains(&me.id));

        engine.follow(me, pal).unwrap();
        assert!(engine.db().following_ids(me.id).unwrap().contains(&pal));
        assert!(!engine.db().following_ids(pal).unwrap().contains(&me.id));
        assert!(engine.unfollow(me, pal).unwrap());
        assert!(engine.remove_friend(me, pal).unwrap());
    }
}
