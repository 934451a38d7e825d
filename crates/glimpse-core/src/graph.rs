//! Social graph collaborator. The engine only reads id sets through this
//! trait; the SQLite implementation below backs it in production.

use std::collections::HashSet;

use anyhow::Result;
use glimpse_db::Database;

pub trait SocialGraph: Send + Sync {
    /// Symmetric friendships of `user_id`.
    fn friend_ids(&self, user_id: i64) -> Result<HashSet<i64>>;

    /// Authors `user_id` follows.
    fn following_ids(&self, user_id: i64) -> Result<HashSet<i64>>;

    /// Authors whose close-friends list contains `user_id`.
    fn close_friend_of(&self, user_id: i64) -> Result<HashSet<i64>>;
}

impl SocialGraph for Database {
    fn friend_ids(&self, user_id: i64) -> Result<HashSet<i64>> {
        Database::friend_ids(self, user_id)
    }

    fn following_ids(&self, user_id: i64) -> Result<HashSet<i64>> {
        Database::following_ids(self, user_id)
    }

    fn close_friend_of(&self, user_id: i64) -> Result<HashSet<i64>> {
        self.close_friend_owners(user_id)
    }
}
