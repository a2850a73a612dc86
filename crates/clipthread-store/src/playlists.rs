//! Playlist folders and saved videos.
//!
//! Folders and memberships share the `playlists` collection and are told
//! apart by their `type`.  A user saves a given video at most once; saving
//! it again moves it to the new folder.

use clipthread_shared::RecordId;
use serde_json::Value;
use tracing::debug;

use crate::database::Database;
use crate::error::Result;
use crate::models::{PlaylistEntry, PlaylistItem};
use crate::record::{Collection, Filter, Sort, ID_FIELD};

const FOLDER: &str = "folder";
const VIDEO: &str = "video";

pub struct Playlists {
    collection: Collection<PlaylistItem>,
}

impl Playlists {
    pub fn new(db: Database) -> Self {
        Self {
            collection: Collection::new(db),
        }
    }

    /// Create a folder.  Creating an identical folder again returns `None`.
    pub async fn add_folder(&self, user_id: RecordId, name: &str) -> Result<Option<RecordId>> {
        let folder = PlaylistItem {
            id: RecordId::new(),
            user_id,
            entry: PlaylistEntry::Folder {
                name: name.to_string(),
            },
        };
        self.collection.add(None, &folder).await
    }

    /// Returns `false` when `user_id` has no such folder.
    pub async fn rename_folder(
        &self,
        user_id: RecordId,
        folder_id: RecordId,
        name: &str,
    ) -> Result<bool> {
        let updated = self
            .collection
            .set_fields(
                folder_filter(user_id, folder_id),
                vec![("name", Value::String(name.to_string()))],
            )
            .await?;
        Ok(updated > 0)
    }

    /// Save `video_id` into `folder_id`, replacing any earlier membership of
    /// that video for this user.  Returns the id of a newly created row.
    pub async fn add(
        &self,
        user_id: RecordId,
        folder_id: RecordId,
        video_id: &str,
    ) -> Result<Option<RecordId>> {
        let item = PlaylistItem {
            id: RecordId::new(),
            user_id,
            entry: PlaylistEntry::Video {
                video_id: video_id.to_string(),
                folder_id,
            },
        };
        let key = Filter::new()
            .eq("user_id", user_id)
            .eq("type", VIDEO)
            .eq("video_id", video_id);
        self.collection.add(Some(key), &item).await
    }

    /// Remove `video_id` from the user's playlists.  Returns rows deleted.
    pub async fn delete(&self, user_id: RecordId, video_id: &str) -> Result<usize> {
        self.collection
            .delete_where(
                Filter::new()
                    .eq("user_id", user_id)
                    .eq("type", VIDEO)
                    .eq("video_id", video_id),
            )
            .await
    }

    /// Delete a folder together with every video saved in it.
    pub async fn delete_folder(&self, user_id: RecordId, folder_id: RecordId) -> Result<usize> {
        let deleted = self
            .collection
            .delete_where(Filter::new().eq("user_id", user_id).any_of([
                Filter::new().eq(ID_FIELD, folder_id).eq("type", FOLDER),
                Filter::new().eq("type", VIDEO).eq("folder_id", folder_id),
            ]))
            .await?;
        debug!(user_id = %user_id, folder_id = %folder_id, deleted, "folder deleted");
        Ok(deleted)
    }

    /// The user's folders in creation order.
    pub async fn list_folders(&self, user_id: RecordId) -> Result<Vec<PlaylistItem>> {
        self.collection
            .list(
                Filter::new().eq("user_id", user_id).eq("type", FOLDER),
                Some(Sort::asc(ID_FIELD)),
                None,
            )
            .await
    }

    /// Saved videos of a user, optionally narrowed to a folder or a video.
    pub async fn list(
        &self,
        user_id: RecordId,
        folder_id: Option<RecordId>,
        video_id: Option<&str>,
        limit: Option<u32>,
    ) -> Result<Vec<PlaylistItem>> {
        let mut filter = Filter::new().eq("user_id", user_id).eq("type", VIDEO);
        if let Some(folder_id) = folder_id {
            filter = filter.eq("folder_id", folder_id);
        }
        if let Some(video_id) = video_id {
            filter = filter.eq("video_id", video_id);
        }
        self.collection
            .list(filter, Some(Sort::asc(ID_FIELD)), limit)
            .await
    }

    /// Folder holding `video_id` for this user, if it is saved.
    pub async fn get_for_video(
        &self,
        user_id: RecordId,
        video_id: &str,
    ) -> Result<Option<PlaylistItem>> {
        let membership = self
            .collection
            .find(
                Filter::new()
                    .eq("user_id", user_id)
                    .eq("type", VIDEO)
                    .eq("video_id", video_id),
            )
            .await?;

        match membership.map(|item| item.entry) {
            Some(PlaylistEntry::Video { folder_id, .. }) => {
                self.collection.find(folder_filter(user_id, folder_id)).await
            }
            _ => Ok(None),
        }
    }

    /// Number of videos saved in `folder_id`.
    pub async fn count(&self, folder_id: RecordId) -> Result<u64> {
        self.collection
            .count(Filter::new().eq("folder_id", folder_id))
            .await
    }
}

fn folder_filter(user_id: RecordId, folder_id: RecordId) -> Filter {
    Filter::by_id(folder_id)
        .eq("user_id", user_id)
        .eq("type", FOLDER)
}
