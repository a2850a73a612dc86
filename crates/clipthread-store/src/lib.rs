//! # clipthread-store
//!
//! Data and relationship layer of the clipthread video-sharing application,
//! backed by SQLite.
//!
//! Every entity lives in a JSON document collection ([`Collection`]).  The
//! components built on top (users, videos, history, notifications, friends,
//! comments, shares, playlists) hold their collaborators explicitly and are
//! wired together once in a [`Context`].  All operations are async; absence
//! and rejected duplicates surface as `None`/`false`, and only genuine
//! failures are [`StoreError`]s.

pub mod collaborators;
pub mod comments;
pub mod config;
pub mod context;
pub mod database;
pub mod friends;
pub mod history;
pub mod migrations;
pub mod models;
pub mod notifications;
pub mod playlists;
pub mod record;
pub mod shares;
pub mod users;
pub mod videos;

mod error;

pub use collaborators::{NotificationSink, ProfileLookup};
pub use comments::{build_forest, CommentNode, CommentQuery, Comments};
pub use config::StoreConfig;
pub use context::{CollectionStats, Context, ContextBuilder};
pub use database::Database;
pub use error::{Result, StoreError};
pub use friends::Friends;
pub use history::History;
pub use models::*;
pub use notifications::{NotificationQuery, NotificationView, Notifications, ReadFilter};
pub use playlists::Playlists;
pub use record::{Collection, Filter, Record, Sort};
pub use shares::{ShareQuery, Shares};
pub use users::Users;
pub use videos::Videos;
