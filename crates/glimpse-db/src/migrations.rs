use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                username        TEXT NOT NULL UNIQUE,
                password        TEXT NOT NULL,
                is_moderator    INTEGER NOT NULL DEFAULT 0,
                created_at      INTEGER NOT NULL
            );

            CREATE TABLE friendships (
                user_id     INTEGER NOT NULL,
                friend_id   INTEGER NOT NULL,
                created_at  INTEGER NOT NULL,
                PRIMARY KEY (user_id, friend_id)
            );

            CREATE TABLE follows (
                follower_id INTEGER NOT NULL,
                leader_id   INTEGER NOT NULL,
                created_at  INTEGER NOT NULL,
                PRIMARY KEY (follower_id, leader_id)
            );

            CREATE INDEX idx_follows_leader ON follows(leader_id);

            CREATE TABLE close_friends (
                user_id     INTEGER NOT NULL,
                friend_id   INTEGER NOT NULL,
                added_at    INTEGER NOT NULL,
                PRIMARY KEY (user_id, friend_id)
            );

            CREATE INDEX idx_close_friends_friend ON close_friends(friend_id);

            CREATE TABLE stories (
                id                      INTEGER PRIMARY KEY AUTOINCREMENT,
                author_id               INTEGER NOT NULL,
                privacy                 TEXT NOT NULL DEFAULT 'friends',
                status                  TEXT NOT NULL DEFAULT 'published',
                created_at              INTEGER NOT NULL,
                updated_at              INTEGER NOT NULL,
                expires_at              INTEGER NOT NULL,
                is_archived             INTEGER NOT NULL DEFAULT 0,
                auto_hidden_at          INTEGER,
                report_count_at_hide    INTEGER
            );

            CREATE INDEX idx_stories_feed
                ON stories(is_archived, status, expires_at, updated_at);
            CREATE INDEX idx_stories_author
                ON stories(author_id, created_at);

            CREATE TABLE story_hidden_viewers (
                story_id    INTEGER NOT NULL REFERENCES stories(id) ON DELETE CASCADE,
                user_id     INTEGER NOT NULL,
                PRIMARY KEY (story_id, user_id)
            );

            CREATE TABLE story_items (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                story_id    INTEGER NOT NULL REFERENCES stories(id) ON DELETE CASCADE,
                author_id   INTEGER NOT NULL,
                media_id    TEXT NOT NULL,
                media_type  TEXT NOT NULL,
                mime        TEXT NOT NULL,
                duration_ms INTEGER,
                created_at  INTEGER NOT NULL
            );

            CREATE INDEX idx_items_story ON story_items(story_id, created_at);
            CREATE INDEX idx_items_author ON story_items(author_id, created_at);
            CREATE UNIQUE INDEX idx_items_media ON story_items(media_id);

            CREATE TABLE story_views (
                item_id     INTEGER NOT NULL,
                viewer_id   INTEGER NOT NULL,
                viewed_at   INTEGER NOT NULL,
                PRIMARY KEY (item_id, viewer_id)
            );

            CREATE INDEX idx_views_viewer ON story_views(viewer_id);

            -- item_id 0 marks a story-level reaction so the unique key dedups it
            CREATE TABLE story_reactions (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                story_id    INTEGER NOT NULL,
                item_id     INTEGER NOT NULL DEFAULT 0,
                user_id     INTEGER NOT NULL,
                reaction    TEXT NOT NULL,
                created_at  INTEGER NOT NULL,
                UNIQUE (user_id, story_id, item_id)
            );

            CREATE INDEX idx_reactions_story ON story_reactions(story_id);

            CREATE TABLE story_replies (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                story_id    INTEGER NOT NULL,
                item_id     INTEGER,
                user_id     INTEGER NOT NULL,
                message     TEXT NOT NULL,
                is_dm       INTEGER NOT NULL DEFAULT 1,
                created_at  INTEGER NOT NULL
            );

            CREATE INDEX idx_replies_story ON story_replies(story_id, created_at);

            CREATE TABLE story_reports (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                story_id        INTEGER NOT NULL,
                reporter_id     INTEGER NOT NULL,
                reason          TEXT NOT NULL,
                description     TEXT NOT NULL DEFAULT '',
                status          TEXT NOT NULL DEFAULT 'pending',
                reviewed_by     INTEGER,
                reviewed_at     INTEGER,
                action_taken    TEXT,
                created_at      INTEGER NOT NULL,
                UNIQUE (story_id, reporter_id)
            );

            CREATE INDEX idx_reports_status ON story_reports(status, story_id);

            CREATE TABLE feed_salts (
                salt_key    TEXT PRIMARY KEY,
                salt        INTEGER NOT NULL
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    if version < 2 {
        info!("Running migration v2 (stickers)");
        conn.execute_batch(
            "
            CREATE TABLE story_stickers (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                story_id    INTEGER NOT NULL REFERENCES stories(id) ON DELETE CASCADE,
                item_id     INTEGER NOT NULL REFERENCES story_items(id) ON DELETE CASCADE,
                kind        TEXT NOT NULL,
                data        TEXT NOT NULL,
                position_x  REAL NOT NULL DEFAULT 50,
                position_y  REAL NOT NULL DEFAULT 50,
                created_at  INTEGER NOT NULL
            );

            CREATE INDEX idx_stickers_item ON story_stickers(item_id);

            CREATE TABLE sticker_poll_votes (
                sticker_id   INTEGER NOT NULL REFERENCES story_stickers(id) ON DELETE CASCADE,
                user_id      INTEGER NOT NULL,
                option_index INTEGER NOT NULL,
                voted_at     INTEGER NOT NULL,
                PRIMARY KEY (sticker_id, user_id)
            );

            INSERT INTO schema_version (version) VALUES (2);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
