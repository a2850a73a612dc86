//! Documents persisted in the store, one struct per collection.
//!
//! Relationships are foreign-id fields; nothing is embedded.  Timestamps are
//! stored as integer microseconds so they sort numerically.

use chrono::{DateTime, Utc};
use clipthread_shared::constants::DEFAULT_ORIGIN;
use clipthread_shared::{FriendStatus, NotificationKind, RecordId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::record::Record;

/// Encode a timestamp the way documents store it, for field patches.
pub(crate) fn timestamp_value(at: DateTime<Utc>) -> Value {
    Value::from(at.timestamp_micros())
}

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// Stored user record, including the password hash.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: RecordId,
    /// Unique across all users.
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub picture: String,
    /// QR-code login token.  Legacy records may lack it until first read.
    #[serde(default)]
    pub login_token: Option<String>,
    pub origin: String,
}

impl Record for User {
    const COLLECTION: &'static str = "users";

    fn id(&self) -> RecordId {
        self.id
    }
}

/// An account as its owner sees it: the password hash is never loaded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Profile {
    pub id: RecordId,
    pub email: String,
    pub name: String,
    pub picture: String,
    #[serde(default)]
    pub login_token: Option<String>,
    pub origin: String,
}

/// What other users see of an account in friend lists, comment threads and
/// notification senders.  Carries no credential, not even the login token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublicProfile {
    pub id: RecordId,
    pub email: String,
    pub name: String,
    pub picture: String,
    pub origin: String,
}

/// Optional sign-up attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub name: String,
    pub picture: String,
    pub origin: String,
}

impl Default for NewUser {
    fn default() -> Self {
        Self {
            name: String::new(),
            picture: String::new(),
            origin: DEFAULT_ORIGIN.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Video
// ---------------------------------------------------------------------------

/// Cached metadata for an external video, keyed by its external id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Video {
    pub id: RecordId,
    pub video_id: String,
    pub title: String,
    pub thumbnail: String,
}

impl Record for Video {
    const COLLECTION: &'static str = "videos";

    fn id(&self) -> RecordId {
        self.id
    }
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    pub id: RecordId,
    pub user_id: RecordId,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
    #[serde(with = "chrono::serde::ts_microseconds")]
    pub date: DateTime<Utc>,
}

impl Record for HistoryEntry {
    const COLLECTION: &'static str = "history";

    fn id(&self) -> RecordId {
        self.id
    }
}

// ---------------------------------------------------------------------------
// Notification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub id: RecordId,
    /// Recipient.
    pub user_id: RecordId,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    /// Free-form payload; `sender_id` and `share_id` entries are resolved
    /// when a listing is populated.
    #[serde(default)]
    pub data: Value,
    #[serde(with = "chrono::serde::ts_microseconds")]
    pub date: DateTime<Utc>,
    pub unread: bool,
}

impl Record for Notification {
    const COLLECTION: &'static str = "notifications";

    fn id(&self) -> RecordId {
        self.id
    }
}

// ---------------------------------------------------------------------------
// Friendship
// ---------------------------------------------------------------------------

/// Undirected relationship; `user_id` is the side that created it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Friendship {
    pub id: RecordId,
    pub user_id: RecordId,
    pub other_id: RecordId,
    pub status: FriendStatus,
    #[serde(with = "chrono::serde::ts_microseconds")]
    pub date: DateTime<Utc>,
}

impl Record for Friendship {
    const COLLECTION: &'static str = "friends";

    fn id(&self) -> RecordId {
        self.id
    }
}

// ---------------------------------------------------------------------------
// Comment
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Comment {
    pub id: RecordId,
    /// Author.
    pub user_id: RecordId,
    pub video_id: String,
    pub text: String,
    /// Comment this one replies to, on the same video.
    pub parent_id: Option<RecordId>,
    #[serde(with = "chrono::serde::ts_microseconds")]
    pub date: DateTime<Utc>,
}

impl Record for Comment {
    const COLLECTION: &'static str = "comments";

    fn id(&self) -> RecordId {
        self.id
    }
}

// ---------------------------------------------------------------------------
// Share
// ---------------------------------------------------------------------------

/// A comment shared by `owner_id` with `recipient_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Share {
    pub id: RecordId,
    pub video_id: String,
    pub comment_id: RecordId,
    pub owner_id: RecordId,
    pub recipient_id: RecordId,
    #[serde(with = "chrono::serde::ts_microseconds")]
    pub date: DateTime<Utc>,
}

impl Record for Share {
    const COLLECTION: &'static str = "shares";

    fn id(&self) -> RecordId {
        self.id
    }
}

// ---------------------------------------------------------------------------
// Playlist
// ---------------------------------------------------------------------------

/// Row of the playlists collection: either a folder or a saved video.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlaylistItem {
    pub id: RecordId,
    pub user_id: RecordId,
    #[serde(flatten)]
    pub entry: PlaylistEntry,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PlaylistEntry {
    Folder { name: String },
    Video { video_id: String, folder_id: RecordId },
}

impl Record for PlaylistItem {
    const COLLECTION: &'static str = "playlists";

    fn id(&self) -> RecordId {
        self.id
    }
}
