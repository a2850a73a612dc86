//! Share ledger: comments shared by one user with another.
//!
//! A share is unique per (video, comment, owner, recipient); the unique index
//! on that tuple makes a repeated share a no-op, so the recipient is
//! notified once.

use std::sync::Arc;

use clipthread_shared::{Clock, NotificationKind, RecordId};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::collaborators::{notify_best_effort, NotificationSink};
use crate::database::Database;
use crate::error::Result;
use crate::models::Share;
use crate::record::{Collection, Filter, Sort};

/// Share listing filter.  Every `None` field is unconstrained.
#[derive(Debug, Clone, Default)]
pub struct ShareQuery {
    pub video_id: Option<String>,
    pub recipients: Option<Vec<RecordId>>,
    pub owner_id: Option<RecordId>,
    pub comments: Option<Vec<RecordId>>,
    pub limit: Option<u32>,
}

impl ShareQuery {
    fn to_filter(&self) -> Filter {
        let mut filter = Filter::new();
        if let Some(video_id) = &self.video_id {
            filter = filter.eq("video_id", video_id.as_str());
        }
        if let Some(recipients) = &self.recipients {
            filter = filter.is_in("recipient_id", recipients.iter().copied());
        }
        if let Some(owner_id) = self.owner_id {
            filter = filter.eq("owner_id", owner_id);
        }
        if let Some(comments) = &self.comments {
            filter = filter.is_in("comment_id", comments.iter().copied());
        }
        filter
    }
}

pub struct Shares {
    collection: Collection<Share>,
    notifications: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
}

impl Shares {
    pub fn new(
        db: Database,
        notifications: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            collection: Collection::new(db),
            notifications,
            clock,
        }
    }

    /// Share `comment_id` on `video_id` from `owner` with `recipient`.
    ///
    /// Returns `None` if this exact share already exists.  The recipient is
    /// sent a "shared content" notification whose preview is `preview` plus
    /// the video and comment ids.
    pub async fn add(
        &self,
        video_id: &str,
        comment_id: RecordId,
        mut preview: Map<String, Value>,
        owner: RecordId,
        recipient: RecordId,
    ) -> Result<Option<RecordId>> {
        let share = Share {
            id: RecordId::new(),
            video_id: video_id.to_string(),
            comment_id,
            owner_id: owner,
            recipient_id: recipient,
            date: self.clock.now(),
        };

        let Some(share_id) = self.collection.insert(&share).await? else {
            debug!(video_id, comment_id = %comment_id, "already shared");
            return Ok(None);
        };
        debug!(share_id = %share_id, owner = %owner, recipient = %recipient, "comment shared");

        preview.insert("video_id".to_string(), Value::from(video_id));
        preview.insert("comment_id".to_string(), Value::from(comment_id));
        notify_best_effort(
            self.notifications.as_ref(),
            recipient,
            NotificationKind::SharedContent,
            json!({
                "sender_id": owner,
                "share_id": share_id,
                "preview": preview,
            }),
        )
        .await;

        Ok(Some(share_id))
    }

    /// Shares matching `query`, oldest first.
    pub async fn list(&self, query: &ShareQuery) -> Result<Vec<Share>> {
        self.collection
            .list(query.to_filter(), Some(Sort::asc("date")), query.limit)
            .await
    }

    pub async fn get_many(&self, ids: &[RecordId]) -> Result<Vec<Share>> {
        self.collection.get_many(ids).await
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use clipthread_shared::{Pbkdf2Hasher, StepClock};

    use super::*;
    use crate::notifications::{NotificationQuery, Notifications};
    use crate::users::Users;

    fn ledger() -> (Shares, Arc<Notifications>) {
        let db = Database::open_in_memory().unwrap();
        let clock: Arc<dyn Clock> = Arc::new(StepClock::new(Utc::now(), Duration::seconds(1)));
        let users = Arc::new(Users::new(db.clone(), Arc::new(Pbkdf2Hasher::new(1_000))));
        let notifications = Arc::new(Notifications::new(db.clone(), users, clock.clone()));
        (Shares::new(db, notifications.clone(), clock), notifications)
    }

    #[tokio::test]
    async fn test_share_once_notify_once() {
        let (shares, notifications) = ledger();
        let (owner, recipient, comment) = (RecordId::new(), RecordId::new(), RecordId::new());
        let mut preview = Map::new();
        preview.insert("text".to_string(), Value::from("hello"));

        let first = shares
            .add("v1", comment, preview.clone(), owner, recipient)
            .await
            .unwrap();
        assert!(first.is_some());
        let again = shares
            .add("v1", comment, preview, owner, recipient)
            .await
            .unwrap();
        assert!(again.is_none());

        let listed = shares.list(&ShareQuery::default()).await.unwrap();
        assert_eq!(listed.len(), 1);

        let inbox = notifications
            .list(recipient, &NotificationQuery::default())
            .await
            .unwrap();
        assert_eq!(inbox.len(), 1);
        let data = &inbox[0].notification.data;
        assert_eq!(data["sender_id"], Value::from(owner));
        assert_eq!(data["share_id"], Value::from(first.unwrap()));
        assert_eq!(data["preview"]["text"], "hello");
        assert_eq!(data["preview"]["video_id"], "v1");
        assert_eq!(data["preview"]["comment_id"], Value::from(comment));
    }

    #[tokio::test]
    async fn test_list_filters() {
        let (shares, _) = ledger();
        let (alice, bob, carol) = (RecordId::new(), RecordId::new(), RecordId::new());
        let (c1, c2) = (RecordId::new(), RecordId::new());

        shares.add("v1", c1, Map::new(), alice, bob).await.unwrap();
        shares.add("v1", c1, Map::new(), alice, carol).await.unwrap();
        shares.add("v2", c2, Map::new(), bob, carol).await.unwrap();

        let to_carol = shares
            .list(&ShareQuery {
                recipients: Some(vec![carol]),
                ..ShareQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(to_carol.len(), 2);

        let from_alice_on_v1 = shares
            .list(&ShareQuery {
                video_id: Some("v1".to_string()),
                owner_id: Some(alice),
                ..ShareQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(from_alice_on_v1.len(), 2);
        assert_eq!(from_alice_on_v1[0].recipient_id, bob);

        let of_c2 = shares
            .list(&ShareQuery {
                comments: Some(vec![c2]),
                ..ShareQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(of_c2.len(), 1);

        let none = shares
            .list(&ShareQuery {
                comments: Some(Vec::new()),
                ..ShareQuery::default()
            })
            .await
            .unwrap();
        assert!(none.is_empty());
    }
}
