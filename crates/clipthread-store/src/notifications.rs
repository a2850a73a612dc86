//! Per-user notification feed.
//!
//! Notifications are unread when created and only become read through
//! [`Notifications::dismiss`] by their recipient.  Listings can be populated:
//! `sender_id` references are resolved in one batch through the injected
//! [`ProfileLookup`], `share_id` references in one batch over the share
//! ledger.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use clipthread_shared::{Clock, NotificationKind, RecordId};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::collaborators::{NotificationSink, ProfileLookup};
use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{Notification, PublicProfile, Share, User};
use crate::record::{Collection, Filter, Record, Sort};

/// Which read state a listing returns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReadFilter {
    #[default]
    Unread,
    Read,
    All,
}

#[derive(Debug, Clone, Default)]
pub struct NotificationQuery {
    /// Empty means every kind.
    pub kinds: Vec<NotificationKind>,
    pub read: ReadFilter,
    pub populate: bool,
    pub limit: Option<u32>,
}

/// A notification with its payload references resolved.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationView {
    #[serde(flatten)]
    pub notification: Notification,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender: Option<PublicProfile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub share: Option<Share>,
}

pub struct Notifications {
    collection: Collection<Notification>,
    profiles: Arc<dyn ProfileLookup>,
    // Read directly: `Shares` delivers through this component, so it cannot
    // also be injected here.
    shares: Collection<Share>,
    clock: Arc<dyn Clock>,
}

impl Notifications {
    pub fn new(db: Database, profiles: Arc<dyn ProfileLookup>, clock: Arc<dyn Clock>) -> Self {
        Self {
            collection: Collection::new(db.clone()),
            profiles,
            shares: Collection::new(db),
            clock,
        }
    }

    pub async fn add(
        &self,
        recipient: RecordId,
        kind: NotificationKind,
        data: Value,
    ) -> Result<Option<RecordId>> {
        let notification = Notification {
            id: RecordId::new(),
            user_id: recipient,
            kind,
            data,
            date: self.clock.now(),
            unread: true,
        };
        let id = self.collection.add(None, &notification).await?;
        debug!(recipient = %recipient, %kind, "notification queued");
        Ok(id)
    }

    /// Mark a notification read.  Does nothing unless `recipient` owns it.
    pub async fn dismiss(&self, recipient: RecordId, id: RecordId) -> Result<()> {
        let updated = self
            .collection
            .set_fields(
                Filter::by_id(id).eq("user_id", recipient),
                vec![("unread", Value::Bool(false))],
            )
            .await?;
        debug!(recipient = %recipient, notification_id = %id, updated, "dismiss");
        Ok(())
    }

    /// Notifications for `recipient`, newest first.
    pub async fn list(
        &self,
        recipient: RecordId,
        query: &NotificationQuery,
    ) -> Result<Vec<NotificationView>> {
        let mut filter = Filter::new().eq("user_id", recipient);
        if !query.kinds.is_empty() {
            filter = filter.is_in("type", query.kinds.iter().copied());
        }
        filter = match query.read {
            ReadFilter::Unread => filter.eq("unread", true),
            ReadFilter::Read => filter.eq("unread", false),
            ReadFilter::All => filter,
        };

        let found = self
            .collection
            .list(filter, Some(Sort::desc("date")), query.limit)
            .await?;

        if query.populate {
            self.populate(found).await
        } else {
            Ok(found
                .into_iter()
                .map(|notification| NotificationView {
                    notification,
                    sender: None,
                    share: None,
                })
                .collect())
        }
    }

    /// Number of unread notifications for `recipient`.
    pub async fn count(&self, recipient: RecordId) -> Result<u64> {
        self.collection
            .count(Filter::new().eq("user_id", recipient).eq("unread", true))
            .await
    }

    async fn populate(&self, found: Vec<Notification>) -> Result<Vec<NotificationView>> {
        let mut references = Vec::with_capacity(found.len());
        for notification in &found {
            references.push((
                payload_id(&notification.data, "sender_id")?,
                payload_id(&notification.data, "share_id")?,
            ));
        }

        let sender_ids: Vec<RecordId> = references.iter().filter_map(|(s, _)| *s).collect();
        let share_ids: Vec<RecordId> = references.iter().filter_map(|(_, s)| *s).collect();

        let senders: HashMap<RecordId, PublicProfile> = self
            .profiles
            .profiles(&sender_ids)
            .await?
            .into_iter()
            .map(|profile| (profile.id, profile))
            .collect();
        let shares: HashMap<RecordId, Share> = self
            .shares
            .get_many(&share_ids)
            .await?
            .into_iter()
            .map(|share| (share.id, share))
            .collect();

        found
            .into_iter()
            .zip(references)
            .map(|(notification, (sender_id, share_id))| {
                let sender = sender_id
                    .map(|id| resolve(&senders, User::COLLECTION, id))
                    .transpose()?;
                let share = share_id
                    .map(|id| resolve(&shares, Share::COLLECTION, id))
                    .transpose()?;
                Ok(NotificationView {
                    notification,
                    sender,
                    share,
                })
            })
            .collect()
    }
}

#[async_trait]
impl NotificationSink for Notifications {
    async fn notify(
        &self,
        recipient: RecordId,
        kind: NotificationKind,
        data: Value,
    ) -> Result<Option<RecordId>> {
        self.add(recipient, kind, data).await
    }
}

/// Read an id stored under `key` in a payload.
fn payload_id(data: &Value, key: &str) -> Result<Option<RecordId>> {
    match data.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(raw)) => Ok(Some(RecordId::parse(raw)?)),
        Some(other) => Err(StoreError::InvalidKeyType(other.to_string())),
    }
}

fn resolve<T: Clone>(
    found: &HashMap<RecordId, T>,
    collection: &'static str,
    id: RecordId,
) -> Result<T> {
    found
        .get(&id)
        .cloned()
        .ok_or(StoreError::DanglingReference { collection, id })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use clipthread_shared::{Pbkdf2Hasher, StepClock};
    use serde_json::json;

    use super::*;
    use crate::models::NewUser;
    use crate::users::Users;

    fn center() -> (Notifications, Arc<Users>) {
        let db = Database::open_in_memory().unwrap();
        let users = Arc::new(Users::new(db.clone(), Arc::new(Pbkdf2Hasher::new(1_000))));
        let notifications = Notifications::new(
            db,
            users.clone(),
            Arc::new(StepClock::new(Utc::now(), Duration::seconds(1))),
        );
        (notifications, users)
    }

    fn notifications() -> Notifications {
        center().0
    }

    #[tokio::test]
    async fn test_unread_by_default_and_counted() {
        let center = notifications();
        let alice = RecordId::new();

        center
            .add(alice, NotificationKind::FriendRequest, json!({}))
            .await
            .unwrap();
        center
            .add(alice, NotificationKind::SharedContent, json!({}))
            .await
            .unwrap();
        center
            .add(RecordId::new(), NotificationKind::FriendRequest, json!({}))
            .await
            .unwrap();

        assert_eq!(center.count(alice).await.unwrap(), 2);

        let listed = center.list(alice, &NotificationQuery::default()).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].notification.kind, NotificationKind::SharedContent);
        assert!(listed.iter().all(|v| v.notification.unread));
    }

    #[tokio::test]
    async fn test_dismiss_is_scoped_to_recipient() {
        let center = notifications();
        let alice = RecordId::new();
        let mallory = RecordId::new();

        let id = center
            .add(alice, NotificationKind::FriendAccept, json!({}))
            .await
            .unwrap()
            .unwrap();

        center.dismiss(mallory, id).await.unwrap();
        assert_eq!(center.count(alice).await.unwrap(), 1);

        center.dismiss(alice, id).await.unwrap();
        assert_eq!(center.count(alice).await.unwrap(), 0);

        let read = center
            .list(
                alice,
                &NotificationQuery {
                    read: ReadFilter::Read,
                    ..NotificationQuery::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(read.len(), 1);
        assert!(!read[0].notification.unread);
    }

    #[tokio::test]
    async fn test_kind_filter_and_all_states() {
        let center = notifications();
        let alice = RecordId::new();

        let request = center
            .add(alice, NotificationKind::FriendRequest, json!({}))
            .await
            .unwrap()
            .unwrap();
        center
            .add(alice, NotificationKind::FriendRemoval, json!({}))
            .await
            .unwrap();
        center
            .add(alice, NotificationKind::SharedContent, json!({}))
            .await
            .unwrap();
        center.dismiss(alice, request).await.unwrap();

        let friendship_kinds = NotificationQuery {
            kinds: vec![NotificationKind::FriendRequest, NotificationKind::FriendRemoval],
            read: ReadFilter::All,
            ..NotificationQuery::default()
        };
        let listed = center.list(alice, &friendship_kinds).await.unwrap();
        assert_eq!(listed.len(), 2);

        let limited = center
            .list(
                alice,
                &NotificationQuery {
                    read: ReadFilter::All,
                    limit: Some(1),
                    ..NotificationQuery::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].notification.kind, NotificationKind::SharedContent);
    }

    #[tokio::test]
    async fn test_populate_surfaces_dangling_sender() {
        let center = notifications();
        let alice = RecordId::new();
        center
            .add(
                alice,
                NotificationKind::FriendRequest,
                json!({"sender_id": RecordId::new()}),
            )
            .await
            .unwrap();

        let err = center
            .list(
                alice,
                &NotificationQuery {
                    populate: true,
                    ..NotificationQuery::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::DanglingReference {
                collection: "users",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_populate_rejects_foreign_key_type() {
        let center = notifications();
        let alice = RecordId::new();
        center
            .add(alice, NotificationKind::FriendRequest, json!({"sender_id": 17}))
            .await
            .unwrap();

        let err = center
            .list(
                alice,
                &NotificationQuery {
                    populate: true,
                    ..NotificationQuery::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidKeyType(_)));
    }

    /// Records which ids were looked up and resolves none of them.
    #[derive(Default)]
    struct RecordingLookup {
        requested: std::sync::Mutex<Vec<RecordId>>,
    }

    #[async_trait]
    impl ProfileLookup for RecordingLookup {
        async fn profiles(&self, ids: &[RecordId]) -> Result<Vec<PublicProfile>> {
            self.requested.lock().unwrap().extend_from_slice(ids);
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_senders_resolve_through_lookup() {
        let lookup = Arc::new(RecordingLookup::default());
        let center = Notifications::new(
            Database::open_in_memory().unwrap(),
            lookup.clone(),
            Arc::new(StepClock::new(Utc::now(), Duration::seconds(1))),
        );
        let (alice, sender) = (RecordId::new(), RecordId::new());
        center
            .add(alice, NotificationKind::FriendRequest, json!({"sender_id": sender}))
            .await
            .unwrap();

        let populate = NotificationQuery {
            populate: true,
            ..NotificationQuery::default()
        };
        let err = center.list(alice, &populate).await.unwrap_err();
        assert!(matches!(err, StoreError::DanglingReference { id, .. } if id == sender));
        assert_eq!(*lookup.requested.lock().unwrap(), vec![sender]);
    }

    #[tokio::test]
    async fn test_populated_sender_is_public() {
        let (center, users) = center();
        let alice = RecordId::new();
        let sender = users
            .add(
                "bob@example.org",
                "pw",
                NewUser {
                    name: "Bob".to_string(),
                    ..NewUser::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        center
            .add(alice, NotificationKind::FriendRequest, json!({"sender_id": sender}))
            .await
            .unwrap();

        let listed = center
            .list(
                alice,
                &NotificationQuery {
                    populate: true,
                    ..NotificationQuery::default()
                },
            )
            .await
            .unwrap();
        let value = serde_json::to_value(&listed[0]).unwrap();
        assert_eq!(value["sender"]["name"], "Bob");
        assert!(value["sender"].get("login_token").is_none());
        assert!(value["sender"].get("password_hash").is_none());
    }
}
