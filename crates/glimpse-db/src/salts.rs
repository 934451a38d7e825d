use anyhow::Result;

use crate::{Database, OptionalExt};

pub const GLOBAL_SALT_KEY: &str = "global";

pub fn user_salt_key(user_id: i64) -> String {
    format!("user:{}", user_id)
}

impl Database {
    /// Current salt for `key`; 0 if it was never bumped.
    pub fn salt(&self, key: &str) -> Result<i64> {
        self.with_conn(|conn| {
            let salt: Option<i64> = conn
                .query_row(
                    "SELECT salt FROM feed_salts WHERE salt_key = ?1",
                    [key],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(salt.unwrap_or(0))
        })
    }

    /// Atomically increment the salt for `key` and return the new value.
    pub fn bump_salt(&self, key: &str) -> Result<i64> {
        self.with_conn_mut(|conn| {
            let salt = conn.query_row(
                "INSERT INTO feed_salts (salt_key, salt) VALUES (?1, 1)
                 ON CONFLICT(salt_key) DO UPDATE SET salt = salt + 1
                 RETURNING salt",
                [key],
                |row| row.get(0),
            )?;
            Ok(salt)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn salts_are_monotonic_per_key() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.salt(GLOBAL_SALT_KEY).unwrap(), 0);
        assert_eq!(db.bump_salt(GLOBAL_SALT_KEY).unwrap(), 1);
        assert_eq!(db.bump_salt(GLOBAL_SALT_KEY).unwrap(), 2);
        assert_eq!(db.salt(&user_salt_key(3)).unwrap(), 0);
        assert_eq!(db.bump_salt(&user_salt_key(3)).unwrap(), 1);
        assert_eq!(db.salt(GLOBAL_SALT_KEY).unwrap(), 2);
    }
}
