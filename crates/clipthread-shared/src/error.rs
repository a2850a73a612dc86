use thiserror::Error;

#[derive(Error, Debug)]
pub enum SharedError {
    #[error("Invalid record id: {0}")]
    InvalidId(String),
}

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("Random number generator failure: {0}")]
    Rng(String),

    #[error("Password iteration count must be non-zero")]
    ZeroIterations,
}
