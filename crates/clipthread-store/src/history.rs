//! Append-only per-user event log.

use std::sync::Arc;

use clipthread_shared::{Clock, RecordId};
use serde_json::Value;

use crate::database::Database;
use crate::error::Result;
use crate::models::HistoryEntry;
use crate::record::{Collection, Filter, Sort};

pub struct History {
    collection: Collection<HistoryEntry>,
    clock: Arc<dyn Clock>,
}

impl History {
    pub fn new(db: Database, clock: Arc<dyn Clock>) -> Self {
        Self {
            collection: Collection::new(db),
            clock,
        }
    }

    pub async fn add(&self, user_id: RecordId, kind: &str, data: Value) -> Result<Option<RecordId>> {
        let entry = HistoryEntry {
            id: RecordId::new(),
            user_id,
            kind: kind.to_string(),
            data,
            date: self.clock.now(),
        };
        self.collection.add(None, &entry).await
    }

    /// Entries for `user_id`, newest first.
    pub async fn list(
        &self,
        user_id: RecordId,
        kind: Option<&str>,
        limit: Option<u32>,
    ) -> Result<Vec<HistoryEntry>> {
        let mut filter = Filter::new().eq("user_id", user_id);
        if let Some(kind) = kind {
            filter = filter.eq("type", kind);
        }
        self.collection
            .list(filter, Some(Sort::desc("date")), limit)
            .await
    }
}
