//! v002 -- Natural-key uniqueness and lookup indexes.
//!
//! The unique indexes are the only place duplicate users, videos, shares
//! and playlist memberships are prevented.

use rusqlite::Connection;

const UP_SQL: &str = r#"
CREATE UNIQUE INDEX IF NOT EXISTS idx_users_email
    ON users(json_extract(body, '$.email'));

CREATE UNIQUE INDEX IF NOT EXISTS idx_videos_video_id
    ON videos(json_extract(body, '$.video_id'));

CREATE UNIQUE INDEX IF NOT EXISTS idx_shares_unique
    ON shares(
        json_extract(body, '$.video_id'),
        json_extract(body, '$.comment_id'),
        json_extract(body, '$.owner_id'),
        json_extract(body, '$.recipient_id')
    );

CREATE UNIQUE INDEX IF NOT EXISTS idx_playlists_membership
    ON playlists(json_extract(body, '$.user_id'), json_extract(body, '$.video_id'))
    WHERE json_extract(body, '$.type') = 'video';

CREATE INDEX IF NOT EXISTS idx_history_user
    ON history(json_extract(body, '$.user_id'));
CREATE INDEX IF NOT EXISTS idx_notifications_user
    ON notifications(json_extract(body, '$.user_id'));
CREATE INDEX IF NOT EXISTS idx_friends_user
    ON friends(json_extract(body, '$.user_id'));
CREATE INDEX IF NOT EXISTS idx_friends_other
    ON friends(json_extract(body, '$.other_id'));
CREATE INDEX IF NOT EXISTS idx_comments_video
    ON comments(json_extract(body, '$.video_id'));
CREATE INDEX IF NOT EXISTS idx_playlists_user
    ON playlists(json_extract(body, '$.user_id'));
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
