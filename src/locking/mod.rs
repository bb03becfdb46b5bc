//! Exclusive feature locks with lazy expiry.

pub mod clock;
pub mod errors;
pub mod lock_manager;

pub use clock::{LockClock, ManualClock, SystemClock};
pub use errors::LockError;
pub use lock_manager::{
    FeatureLockManager, LockId, LockInfo, LockResult, LockSettings, DEFAULT_LOCK_EXPIRY,
    MAX_LOCK_EXPIRY,
};
