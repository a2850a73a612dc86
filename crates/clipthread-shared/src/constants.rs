/// Application name
pub const APP_NAME: &str = "clipthread";

/// Default PBKDF2 iteration count for password hashes
pub const DEFAULT_PASSWORD_ITERATIONS: u32 = 100_000;

/// PBKDF2 salt size in bytes
pub const PASSWORD_SALT_SIZE: usize = 16;

/// PBKDF2-HMAC-SHA256 output size in bytes
pub const PASSWORD_HASH_SIZE: usize = 32;

/// Scheme tag written at the front of every stored password hash
pub const PASSWORD_SCHEME: &str = "pbkdf2_sha256";

/// Origin recorded for accounts created through the normal sign-up flow
pub const DEFAULT_ORIGIN: &str = "genuine";
