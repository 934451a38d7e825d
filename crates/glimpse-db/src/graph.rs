//! Social graph (friends, follows) and per-user close-friends lists.

use std::collections::HashSet;

use anyhow::Result;
use chrono::Utc;
use rusqlite::Connection;

use crate::Database;
use crate::models::to_millis;

impl Database {
    // -- Friendships (symmetric) --

    pub fn add_friendship(&self, a: i64, b: i64) -> Result<()> {
        let now = to_millis(Utc::now());
        self.with_tx(|conn| {
            for (user, friend) in [(a, b), (b, a)] {
                conn.execute(
                    "INSERT OR IGNORE INTO friendships (user_id, friend_id, created_at) VALUES (?1, ?2, ?3)",
                    rusqlite::params![user, friend, now],
                )?;
            }
            Ok(())
        })
    }

    pub fn remove_friendship(&self, a: i64, b: i64) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "DELETE FROM friendships
                 WHERE (user_id = ?1 AND friend_id = ?2) OR (user_id = ?2 AND friend_id = ?1)",
                rusqlite::params![a, b],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn friend_ids(&self, user_id: i64) -> Result<HashSet<i64>> {
        self.with_conn(|conn| {
            id_set(
                conn,
                "SELECT friend_id FROM friendships WHERE user_id = ?1",
                user_id,
            )
        })
    }

    // -- Follows (one-way) --

    pub fn add_follow(&self, follower_id: i64, leader_id: i64) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO follows (follower_id, leader_id, created_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![follower_id, leader_id, to_millis(Utc::now())],
            )?;
            Ok(())
        })
    }

    pub fn remove_follow(&self, follower_id: i64, leader_id: i64) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "DELETE FROM follows WHERE follower_id = ?1 AND leader_id = ?2",
                rusqlite::params![follower_id, leader_id],
            )?;
            Ok(changed > 0)
        })
    }

    /// Users that `user_id` follows.
    pub fn following_ids(&self, user_id: i64) -> Result<HashSet<i64>> {
        self.with_conn(|conn| {
            id_set(
                conn,
                "SELECT leader_id FROM follows WHERE follower_id = ?1",
                user_id,
            )
        })
    }

    // -- Close friends (directed, owner-managed) --

    /// Idempotent: re-adding refreshes `added_at`.
    pub fn add_close_friend(&self, user_id: i64, friend_id: i64) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO close_friends (user_id, friend_id, added_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![user_id, friend_id, to_millis(Utc::now())],
            )?;
            Ok(())
        })
    }

    pub fn remove_close_friend(&self, user_id: i64, friend_id: i64) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "DELETE FROM close_friends WHERE user_id = ?1 AND friend_id = ?2",
                rusqlite::params![user_id, friend_id],
            )?;
            Ok(changed > 0)
        })
    }

    /// Owner's list, most recently added first.
    pub fn close_friend_ids(&self, user_id: i64) -> Result<Vec<i64>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT friend_id FROM close_friends WHERE user_id = ?1 ORDER BY added_at DESC, friend_id",
            )?;
            let ids = stmt
                .query_map([user_id], |row| row.get::<_, i64>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(ids)
        })
    }

    pub fn is_close_friend(&self, user_id: i64, friend_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM close_friends WHERE user_id = ?1 AND friend_id = ?2",
                rusqlite::params![user_id, friend_id],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }

    /// Owners whose close-friends list contains `friend_id`.
    pub fn close_friend_owners(&self, friend_id: i64) -> Result<HashSet<i64>> {
        self.with_conn(|conn| {
            id_set(
                conn,
                "SELECT user_id FROM close_friends WHERE friend_id = ?1",
                friend_id,
            )
        })
    }
}

fn id_set(conn: &Connection, sql: &str, key: i64) -> Result<HashSet<i64>> {
    let mut stmt = conn.prepare(sql)?;
    let ids = stmt
        .query_map([key], |row| row.get::<_, i64>(0))?
        .collect::<std::result::Result<HashSet<_>, _>>()?;
    Ok(ids)
}
