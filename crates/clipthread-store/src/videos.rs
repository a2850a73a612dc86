//! Video catalog, keyed by the external video id.

use std::collections::HashMap;

use clipthread_shared::RecordId;
use tracing::debug;

use crate::database::Database;
use crate::error::Result;
use crate::models::Video;
use crate::record::{Collection, Filter, Sort, ID_FIELD};

pub struct Videos {
    collection: Collection<Video>,
}

impl Videos {
    pub fn new(db: Database) -> Self {
        Self {
            collection: Collection::new(db),
        }
    }

    /// Insert or overwrite the metadata for `video_id`.
    ///
    /// Returns the new record id only when the video was not known before.
    pub async fn add(
        &self,
        video_id: &str,
        title: &str,
        thumbnail: &str,
    ) -> Result<Option<RecordId>> {
        let video = Video {
            id: RecordId::new(),
            video_id: video_id.to_string(),
            title: title.to_string(),
            thumbnail: thumbnail.to_string(),
        };
        let id = self
            .collection
            .add(Some(Filter::new().eq("video_id", video_id)), &video)
            .await?;
        debug!(video_id, inserted = id.is_some(), "video metadata stored");
        Ok(id)
    }

    pub async fn get(&self, video_id: &str) -> Result<Option<Video>> {
        self.collection
            .find(Filter::new().eq("video_id", video_id))
            .await
    }

    /// Every known video among `video_ids`, one per external id, in
    /// creation order.
    pub async fn get_many(&self, video_ids: &[String]) -> Result<Vec<Video>> {
        if video_ids.is_empty() {
            return Ok(Vec::new());
        }

        let found = self
            .collection
            .list(
                Filter::new().is_in("video_id", video_ids.iter().map(String::as_str)),
                Some(Sort::asc(ID_FIELD)),
                None,
            )
            .await?;

        // Rows written before the unique index existed may repeat an
        // external id; the most recent row wins.
        let mut by_external: HashMap<String, Video> = HashMap::with_capacity(found.len());
        for video in found {
            by_external.insert(video.video_id.clone(), video);
        }

        let mut videos: Vec<Video> = by_external.into_values().collect();
        videos.sort_by_key(|video| video.id);
        Ok(videos)
    }
}
