//! v001 -- Initial schema creation.
//!
//! One table per collection. Every table has the same shape: the record id
//! and the JSON document body (without its id).

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id   TEXT PRIMARY KEY NOT NULL,   -- UUIDv7
    body TEXT NOT NULL                -- JSON document
);

CREATE TABLE IF NOT EXISTS videos (
    id   TEXT PRIMARY KEY NOT NULL,
    body TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS history (
    id   TEXT PRIMARY KEY NOT NULL,
    body TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS notifications (
    id   TEXT PRIMARY KEY NOT NULL,
    body TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS friends (
    id   TEXT PRIMARY KEY NOT NULL,
    body TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS comments (
    id   TEXT PRIMARY KEY NOT NULL,
    body TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS shares (
    id   TEXT PRIMARY KEY NOT NULL,
    body TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS playlists (
    id   TEXT PRIMARY KEY NOT NULL,
    body TEXT NOT NULL
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
