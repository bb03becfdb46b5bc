use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum LockError {
    #[error("No active lock with id `{lock_id}`")]
    UnknownLock { lock_id: String },

    #[error("Feature `{feature_id}` is not held by lock `{lock_id}`")]
    LockMismatch { feature_id: String, lock_id: String },

    #[error("Invalid lock expiry: {0}")]
    InvalidExpiry(String),
}
