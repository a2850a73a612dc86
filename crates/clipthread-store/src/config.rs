//! Store configuration loaded from environment variables.
//!
//! Every setting has a default so the store opens with no configuration at
//! all on a developer machine.

use std::path::PathBuf;

use clipthread_shared::constants::DEFAULT_PASSWORD_ITERATIONS;

/// Store configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// SQLite database file.
    /// Env: `CLIPTHREAD_DB_PATH`
    /// Default: `None` (platform data directory, see [`Database::new`](crate::Database::new)).
    pub database_path: Option<PathBuf>,

    /// Directory holding uploaded pictures and generated QR codes, purged by
    /// [`Context::clear_all`](crate::Context::clear_all).
    /// Env: `CLIPTHREAD_MEDIA_DIR`
    /// Default: `None` (nothing to purge).
    pub media_dir: Option<PathBuf>,

    /// PBKDF2 rounds for new password hashes.
    /// Env: `CLIPTHREAD_PASSWORD_ITERATIONS`
    /// Default: `100000`
    pub password_iterations: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            media_dir: None,
            password_iterations: DEFAULT_PASSWORD_ITERATIONS,
        }
    }
}

impl StoreConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(path) = var("CLIPTHREAD_DB_PATH").filter(|p| !p.is_empty()) {
            config.database_path = Some(PathBuf::from(path));
        }

        if let Some(path) = var("CLIPTHREAD_MEDIA_DIR").filter(|p| !p.is_empty()) {
            config.media_dir = Some(PathBuf::from(path));
        }

        if let Some(val) = var("CLIPTHREAD_PASSWORD_ITERATIONS") {
            match val.parse::<u32>() {
                Ok(n) if n > 0 => config.password_iterations = n,
                _ => {
                    tracing::warn!(
                        value = %val,
                        "Invalid CLIPTHREAD_PASSWORD_ITERATIONS, using default"
                    );
                }
            }
        }

        config
    }
}
