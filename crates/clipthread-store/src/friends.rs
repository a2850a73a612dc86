//! Friend graph.
//!
//! A relationship goes `requested -> accepted`, or is created `accepted`
//! directly.  Relationships are undirected: lookups match the pair in either
//! order, and listings return the other party.

use std::collections::HashMap;
use std::sync::Arc;

use clipthread_shared::{Clock, FriendStatus, NotificationKind, RecordId};
use serde_json::json;
use tracing::{debug, info};

use crate::collaborators::{notify_best_effort, NotificationSink, ProfileLookup};
use crate::database::Database;
use crate::error::Result;
use crate::models::{timestamp_value, Friendship, PublicProfile};
use crate::record::{Collection, Filter, Sort};

pub struct Friends {
    collection: Collection<Friendship>,
    notifications: Arc<dyn NotificationSink>,
    profiles: Arc<dyn ProfileLookup>,
    clock: Arc<dyn Clock>,
}

impl Friends {
    pub fn new(
        db: Database,
        notifications: Arc<dyn NotificationSink>,
        profiles: Arc<dyn ProfileLookup>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            collection: Collection::new(db),
            notifications,
            profiles,
            clock,
        }
    }

    /// Create a relationship from `user` to `other`.
    ///
    /// Returns `None` for a self-relationship or when the pair is already
    /// friends.  With `as_request` the relationship starts as `requested`
    /// and `other` receives a friend request notification.
    pub async fn add(
        &self,
        user: RecordId,
        other: RecordId,
        as_request: bool,
    ) -> Result<Option<RecordId>> {
        if user == other {
            return Ok(None);
        }
        if self.find_accepted(user, other).await?.is_some() {
            debug!(user = %user, other = %other, "already friends");
            return Ok(None);
        }

        let status = if as_request {
            FriendStatus::Requested
        } else {
            FriendStatus::Accepted
        };
        let friendship = Friendship {
            id: RecordId::new(),
            user_id: user,
            other_id: other,
            status,
            date: self.clock.now(),
        };
        let Some(friend_id) = self.collection.insert(&friendship).await? else {
            return Ok(None);
        };
        info!(friend_id = %friend_id, user = %user, other = %other, status = status.as_str(), "friendship created");

        if as_request {
            notify_best_effort(
                self.notifications.as_ref(),
                other,
                NotificationKind::FriendRequest,
                json!({ "sender_id": user, "friend_id": friend_id }),
            )
            .await;
        }
        Ok(Some(friend_id))
    }

    /// Accept a pending request.  Returns `false` when the relationship is
    /// missing or no longer pending; the requester is only notified when
    /// this call made the change.
    pub async fn accept(&self, id: RecordId) -> Result<bool> {
        let Some(friendship) = self.collection.get(id).await? else {
            return Ok(false);
        };

        let updated = self
            .collection
            .set_fields(
                Filter::by_id(id).eq("status", FriendStatus::Requested),
                vec![
                    ("status", FriendStatus::Accepted.into()),
                    ("date", timestamp_value(self.clock.now())),
                ],
            )
            .await?;
        if updated == 0 {
            debug!(friend_id = %id, "nothing to accept");
            return Ok(false);
        }
        info!(friend_id = %id, "friendship accepted");

        notify_best_effort(
            self.notifications.as_ref(),
            friendship.user_id,
            NotificationKind::FriendAccept,
            json!({ "sender_id": friendship.other_id, "friend_id": id }),
        )
        .await;
        Ok(true)
    }

    /// End the friendship between `user` and `other`.  Returns whether one
    /// existed.
    pub async fn remove(&self, user: RecordId, other: RecordId) -> Result<bool> {
        let Some(friendship) = self.find_accepted(user, other).await? else {
            return Ok(false);
        };
        if !self.collection.delete(friendship.id).await? {
            return Ok(false);
        }
        info!(friend_id = %friendship.id, user = %user, other = %other, "friendship removed");

        notify_best_effort(
            self.notifications.as_ref(),
            other,
            NotificationKind::FriendRemoval,
            json!({ "sender_id": user, "friend_id": friendship.id }),
        )
        .await;
        Ok(true)
    }

    /// Ids of `user`'s friends, most recent relationship first.
    pub async fn list(&self, user: RecordId, limit: Option<u32>) -> Result<Vec<RecordId>> {
        let filter = Filter::new()
            .eq("status", FriendStatus::Accepted)
            .any_of([
                Filter::new().eq("user_id", user),
                Filter::new().eq("other_id", user),
            ]);
        let found = self
            .collection
            .list(filter, Some(Sort::desc("date")), limit)
            .await?;

        Ok(found
            .into_iter()
            .map(|f| if f.user_id == user { f.other_id } else { f.user_id })
            .collect())
    }

    /// Like [`Friends::list`] but resolved to profiles, keeping the order.
    /// Friends whose account no longer exists are left out.
    pub async fn list_profiles(
        &self,
        user: RecordId,
        limit: Option<u32>,
    ) -> Result<Vec<PublicProfile>> {
        let ids = self.list(user, limit).await?;
        let order: HashMap<RecordId, usize> =
            ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();

        let mut profiles = self.profiles.profiles(&ids).await?;
        profiles.sort_by_key(|profile| order.get(&profile.id).copied().unwrap_or(usize::MAX));
        Ok(profiles)
    }

    /// The accepted relationship between the pair, in either direction.
    pub async fn find_accepted(
        &self,
        user: RecordId,
        other: RecordId,
    ) -> Result<Option<Friendship>> {
        let filter = Filter::new()
            .eq("status", FriendStatus::Accepted)
            .any_of([
                Filter::new().eq("user_id", user).eq("other_id", other),
                Filter::new().eq("user_id", other).eq("other_id", user),
            ]);
        self.collection.find(filter).await
    }

    pub async fn exists(&self, user: RecordId, other: RecordId) -> Result<bool> {
        Ok(self.find_accepted(user, other).await?.is_some())
    }
}
