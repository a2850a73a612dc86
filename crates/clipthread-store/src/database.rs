//! Database connection management.
//!
//! The [`Database`] struct owns a [`rusqlite::Connection`] and guarantees that
//! migrations are run before any other operation. Every call is dispatched to
//! tokio's blocking pool so the async callers never block on SQLite.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use clipthread_shared::constants::APP_NAME;
use directories::ProjectDirs;
use rusqlite::Connection;

use crate::error::{Result, StoreError};
use crate::migrations;

/// Shared handle around a single [`rusqlite::Connection`].
///
/// Cloning is cheap; all clones talk to the same connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl Database {
    /// Open (or create) the default application database.
    ///
    /// The database file is placed in the platform-appropriate data directory:
    /// - Linux:   `~/.local/share/clipthread/clipthread.db`
    /// - macOS:   `~/Library/Application Support/org.clipthread.clipthread/clipthread.db`
    /// - Windows: `{FOLDERID_RoamingAppData}\clipthread\clipthread\data\clipthread.db`
    pub fn new() -> Result<Self> {
        let project_dirs =
            ProjectDirs::from("org", APP_NAME, APP_NAME).ok_or(StoreError::NoDataDir)?;

        let data_dir = project_dirs.data_dir();
        std::fs::create_dir_all(data_dir)?;

        let db_path = data_dir.join(format!("{APP_NAME}.db"));
        Self::open_at(&db_path)
    }

    /// Open (or create) a database at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self> {
        tracing::info!(path = %path.display(), "opening database");

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Self::from_connection(conn, Some(path.to_path_buf()))
    }

    /// Open a private in-memory database. Each call yields an isolated store.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, None)
    }

    fn from_connection(conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        migrations::run_migrations(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        })
    }

    /// Run `f` against the connection on the blocking pool.
    ///
    /// Calls are serialized: logic inside one closure observes no
    /// interleaved writes from other calls.
    pub async fn call<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| StoreError::Poisoned)?;
            f(&mut guard)
        })
        .await?
    }

    /// Filesystem path of the open database, `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}
