use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SharedError;

/// Identifier of any stored record.
///
/// Backed by a UUIDv7, so ids are globally unique and sort in creation
/// order, both as bytes and in their hyphenated text form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub Uuid);

impl RecordId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn parse(s: &str) -> Result<Self, SharedError> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| SharedError::InvalidId(s.to_string()))
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for RecordId {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<RecordId> for serde_json::Value {
    fn from(id: RecordId) -> Self {
        serde_json::Value::String(id.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationKind {
    #[serde(rename = "friend request")]
    FriendRequest,
    #[serde(rename = "friend accept")]
    FriendAccept,
    #[serde(rename = "friend removal")]
    FriendRemoval,
    #[serde(rename = "shared content")]
    SharedContent,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FriendRequest => "friend request",
            Self::FriendAccept => "friend accept",
            Self::FriendRemoval => "friend removal",
            Self::SharedContent => "shared content",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<NotificationKind> for serde_json::Value {
    fn from(kind: NotificationKind) -> Self {
        serde_json::Value::String(kind.as_str().to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FriendStatus {
    Requested,
    Accepted,
}

impl FriendStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::Accepted => "accepted",
        }
    }
}

impl From<FriendStatus> for serde_json::Value {
    fn from(status: FriendStatus) -> Self {
        serde_json::Value::String(status.as_str().to_string())
    }
}
