//! Application context: every component, wired once.
//!
//! The transport layer builds one [`Context`] at startup and hands clones of
//! it to request handlers.  Tests build their own isolated context on an
//! in-memory database with [`Context::builder`].

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clipthread_shared::{Clock, CredentialHasher, Pbkdf2Hasher, SystemClock};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::collaborators::{NotificationSink, ProfileLookup};
use crate::comments::Comments;
use crate::config::StoreConfig;
use crate::database::Database;
use crate::error::Result;
use crate::friends::Friends;
use crate::history::History;
use crate::models::{
    Comment, Friendship, HistoryEntry, Notification, PlaylistItem, Share, User, Video,
};
use crate::notifications::Notifications;
use crate::playlists::Playlists;
use crate::record::Collection;
use crate::shares::Shares;
use crate::users::Users;
use crate::videos::Videos;

/// Media subdirectories whose files are generated from database content.
const MEDIA_SUBDIRS: [&str; 2] = ["pictures", "qrcodes"];

#[derive(Clone)]
pub struct Context {
    pub users: Arc<Users>,
    pub videos: Arc<Videos>,
    pub history: Arc<History>,
    pub notifications: Arc<Notifications>,
    pub friends: Arc<Friends>,
    pub comments: Arc<Comments>,
    pub shares: Arc<Shares>,
    pub playlists: Arc<Playlists>,
    db: Database,
    media_dir: Option<PathBuf>,
}

/// Document count of every collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CollectionStats {
    pub users: u64,
    pub videos: u64,
    pub history: u64,
    pub notifications: u64,
    pub friends: u64,
    pub comments: u64,
    pub shares: u64,
    pub playlists: u64,
}

impl CollectionStats {
    pub fn total(&self) -> u64 {
        self.users
            + self.videos
            + self.history
            + self.notifications
            + self.friends
            + self.comments
            + self.shares
            + self.playlists
    }
}

impl Context {
    /// Open the configured database and wire every component.
    pub fn open(config: &StoreConfig) -> Result<Self> {
        let db = match &config.database_path {
            Some(path) => Database::open_at(path)?,
            None => Database::new()?,
        };
        info!(path = ?db.path(), "database opened");

        let mut builder = Self::builder(db)
            .hasher(Arc::new(Pbkdf2Hasher::new(config.password_iterations)));
        if let Some(media_dir) = &config.media_dir {
            builder = builder.media_dir(media_dir.clone());
        }
        Ok(builder.build())
    }

    pub fn builder(db: Database) -> ContextBuilder {
        ContextBuilder {
            db,
            clock: None,
            hasher: None,
            media_dir: None,
            notification_sink: None,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn media_dir(&self) -> Option<&Path> {
        self.media_dir.as_deref()
    }

    /// Delete every document in every collection, then the generated media.
    ///
    /// The collection clears run concurrently and are not atomic as a whole;
    /// only call this when nothing else is using the store.
    pub async fn clear_all(&self) -> Result<()> {
        warn!("clearing every collection");

        let users = Collection::<User>::new(self.db.clone());
        let videos = Collection::<Video>::new(self.db.clone());
        let history = Collection::<HistoryEntry>::new(self.db.clone());
        let notifications = Collection::<Notification>::new(self.db.clone());
        let friends = Collection::<Friendship>::new(self.db.clone());
        let comments = Collection::<Comment>::new(self.db.clone());
        let shares = Collection::<Share>::new(self.db.clone());
        let playlists = Collection::<PlaylistItem>::new(self.db.clone());

        futures::try_join!(
            users.clear(),
            videos.clear(),
            history.clear(),
            notifications.clear(),
            friends.clear(),
            comments.clear(),
            shares.clear(),
            playlists.clear()
        )?;

        if let Some(media_dir) = &self.media_dir {
            for subdir in MEDIA_SUBDIRS {
                purge_files(&media_dir.join(subdir)).await?;
            }
        }
        Ok(())
    }

    pub async fn stats(&self) -> Result<CollectionStats> {
        let users = Collection::<User>::new(self.db.clone());
        let videos = Collection::<Video>::new(self.db.clone());
        let history = Collection::<HistoryEntry>::new(self.db.clone());
        let notifications = Collection::<Notification>::new(self.db.clone());
        let friends = Collection::<Friendship>::new(self.db.clone());
        let comments = Collection::<Comment>::new(self.db.clone());
        let shares = Collection::<Share>::new(self.db.clone());
        let playlists = Collection::<PlaylistItem>::new(self.db.clone());

        let (users, videos, history, notifications, friends, comments, shares, playlists) =
            futures::try_join!(
                users.count_all(),
                videos.count_all(),
                history.count_all(),
                notifications.count_all(),
                friends.count_all(),
                comments.count_all(),
                shares.count_all(),
                playlists.count_all()
            )?;

        Ok(CollectionStats {
            users,
            videos,
            history,
            notifications,
            friends,
            comments,
            shares,
            playlists,
        })
    }
}

/// Remove the regular files directly inside `dir`.  A missing directory is
/// already clean.
async fn purge_files(dir: &Path) -> Result<()> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    let mut removed = 0usize;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            tokio::fs::remove_file(entry.path()).await?;
            removed += 1;
        }
    }
    debug!(dir = %dir.display(), removed, "media purged");
    Ok(())
}

/// Overrides for the collaborators a [`Context`] is wired with.
pub struct ContextBuilder {
    db: Database,
    clock: Option<Arc<dyn Clock>>,
    hasher: Option<Arc<dyn CredentialHasher>>,
    media_dir: Option<PathBuf>,
    notification_sink: Option<Arc<dyn NotificationSink>>,
}

impl ContextBuilder {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn hasher(mut self, hasher: Arc<dyn CredentialHasher>) -> Self {
        self.hasher = Some(hasher);
        self
    }

    pub fn media_dir(mut self, media_dir: PathBuf) -> Self {
        self.media_dir = Some(media_dir);
        self
    }

    /// Deliver the notifications raised by friends and shares somewhere
    /// other than the notification center.
    pub fn notification_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.notification_sink = Some(sink);
        self
    }

    pub fn build(self) -> Context {
        let db = self.db;
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);
        let hasher = self
            .hasher
            .unwrap_or_else(|| Arc::new(Pbkdf2Hasher::default()) as Arc<dyn CredentialHasher>);

        let users = Arc::new(Users::new(db.clone(), hasher));
        let profiles: Arc<dyn ProfileLookup> = users.clone();
        let notifications = Arc::new(Notifications::new(
            db.clone(),
            profiles.clone(),
            clock.clone(),
        ));
        let sink: Arc<dyn NotificationSink> = match self.notification_sink {
            Some(sink) => sink,
            None => notifications.clone(),
        };

        let shares = Arc::new(Shares::new(db.clone(), sink.clone(), clock.clone()));
        let friends = Arc::new(Friends::new(
            db.clone(),
            sink,
            profiles.clone(),
            clock.clone(),
        ));
        let comments = Arc::new(Comments::new(
            db.clone(),
            shares.clone(),
            profiles,
            clock.clone(),
        ));

        Context {
            users,
            videos: Arc::new(Videos::new(db.clone())),
            history: Arc::new(History::new(db.clone(), clock)),
            notifications,
            friends,
            comments,
            shares,
            playlists: Arc::new(Playlists::new(db.clone())),
            db,
            media_dir: self.media_dir,
        }
    }
}
