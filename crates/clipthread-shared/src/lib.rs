//! # clipthread-shared
//!
//! Types shared by every clipthread crate: record identifiers, the
//! enumerations stored inside documents, and the small service interfaces
//! (clock, credential hashing) the store consumes from the outside world.

pub mod clock;
pub mod constants;
pub mod credentials;
pub mod error;
pub mod types;

pub use clock::{Clock, StepClock, SystemClock};
pub use credentials::{generate_login_token, CredentialHasher, Pbkdf2Hasher};
pub use error::{CredentialError, SharedError};
pub use types::{FriendStatus, NotificationKind, RecordId};
