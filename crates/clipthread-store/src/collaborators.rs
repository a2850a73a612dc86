//! Interfaces components use to reach each other.
//!
//! Components receive these as `Arc<dyn ...>` at construction instead of
//! reaching for each other directly, so a test can swap in a failing or
//! recording implementation.

use async_trait::async_trait;
use clipthread_shared::{NotificationKind, RecordId};
use serde_json::Value;

use crate::error::Result;
use crate::models::PublicProfile;

/// Delivers a notification to `recipient`.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(
        &self,
        recipient: RecordId,
        kind: NotificationKind,
        data: Value,
    ) -> Result<Option<RecordId>>;
}

/// Batch resolution of user ids into profiles.
///
/// Unknown ids are skipped; the result order is unspecified.
#[async_trait]
pub trait ProfileLookup: Send + Sync {
    async fn profiles(&self, ids: &[RecordId]) -> Result<Vec<PublicProfile>>;
}

/// Deliver a notification without letting a delivery failure undo the
/// caller's write.  Returns the notification id when one was stored.
pub(crate) async fn notify_best_effort(
    sink: &dyn NotificationSink,
    recipient: RecordId,
    kind: NotificationKind,
    data: Value,
) -> Option<RecordId> {
    match sink.notify(recipient, kind, data).await {
        Ok(id) => id,
        Err(e) => {
            tracing::warn!(recipient = %recipient, %kind, error = %e, "notification not delivered");
            None
        }
    }
}
