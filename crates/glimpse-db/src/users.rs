use std::collections::HashMap;

use anyhow::Result;
use chrono::Utc;
use rusqlite::Connection;

use crate::models::{UserRow, from_millis, to_millis};
use crate::{Database, OptionalExt, placeholders};

impl Database {
    pub fn create_user(&self, username: &str, password_hash: &str) -> Result<i64> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (username, password, created_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![username, password_hash, to_millis(Utc::now())],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username = ?1", &username))
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id = ?1", &id))
    }

    pub fn set_moderator(&self, user_id: i64, is_moderator: bool) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE users SET is_moderator = ?1 WHERE id = ?2",
                rusqlite::params![is_moderator, user_id],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn is_moderator(&self, user_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let flag: Option<bool> = conn
                .query_row(
                    "SELECT is_moderator FROM users WHERE id = ?1",
                    [user_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(flag.unwrap_or(false))
        })
    }

    /// Batch-resolve usernames. Unknown ids are simply absent from the map.
    pub fn usernames(&self, ids: &[i64]) -> Result<HashMap<i64, String>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        self.with_conn(|conn| usernames(conn, ids))
    }
}

pub fn usernames(conn: &Connection, ids: &[i64]) -> Result<HashMap<i64, String>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let sql = format!(
        "SELECT id, username FROM users WHERE id IN ({})",
        placeholders(1, ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(ids.iter()), |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<std::result::Result<HashMap<_, _>, _>>()?;
    Ok(rows)
}

fn query_user(
    conn: &Connection,
    predicate: &str,
    value: &dyn rusqlite::ToSql,
) -> Result<Option<UserRow>> {
    let sql = format!(
        "SELECT id, username, password, is_moderator, created_at FROM users WHERE {}",
        predicate
    );
    let mut stmt = conn.prepare(&sql)?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                password: row.get(2)?,
                is_moderator: row.get(3)?,
                created_at: from_millis(row.get(4)?),
            })
        })
        .optional()?;

    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_username_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        db.create_user("alice", "h").unwrap();
        assert!(db.create_user("alice", "h2").is_err());
    }

    #[test]
    fn moderator_flag_round_trips() {
        let db = Database::open_in_memory().unwrap();
        let id = db.create_user("mod", "h").unwrap();
        assert!(!db.is_moderator(id).unwrap());
        assert!(db.set_moderator(id, true).unwrap());
        assert!(db.is_moderator(id).unwrap());
        assert!(!db.is_moderator(9999).unwrap());
    }

    #[test]
    fn usernames_skips_unknown_ids() {
        let db = Database::open_in_memory().unwrap();
        let a = db.create_user("alice", "h").unwrap();
        let names = db.usernames(&[a, 42]).unwrap();
        assert_eq!(names.len(), 1);
        assert_eq!(names[&a], "alice");
    }
}
