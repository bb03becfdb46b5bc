//! Feature Lock Manager
//!
//! Tracks exclusive locks over individual feature records. Each `acquire`
//! grants a fresh lock id covering the features that were free; features held
//! by another unexpired lock are reported back as not locked instead of being
//! waited for.
//!
//! # Concurrency
//!
//! The lock table lives behind a single mutex. Every operation (sweep, check
//! and commit) runs inside one critical section, so two racing `acquire`
//! calls on the same feature have exactly one winner and a failing `lock_all`
//! request never exposes a partially locked set. No operation blocks on
//! another holder or on a timer.
//!
//! # Expiry
//!
//! Expiry is lazy: mutating operations sweep expired entries before doing
//! their own checks, and read-only queries treat expired-but-unswept entries
//! as absent.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration as StdDuration;

use super::clock::{LockClock, SystemClock};
use super::errors::LockError;

/// Expiry applied when a request does not name one
pub const DEFAULT_LOCK_EXPIRY: StdDuration = StdDuration::from_secs(5 * 60);
/// Upper bound for requested expiries
pub const MAX_LOCK_EXPIRY: StdDuration = StdDuration::from_secs(24 * 60 * 60);

/// Opaque lock identifier, unique per grant
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LockId(String);

impl LockId {
    pub fn new(id: impl Into<String>) -> Self {
        LockId(id.into())
    }

    fn generate() -> Self {
        LockId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of an `acquire` call
///
/// `locked` and `not_locked` are disjoint and together cover the (de-duplicated)
/// request in request order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LockResult {
    pub lock_id: LockId,
    pub locked: Vec<String>,
    pub not_locked: Vec<String>,
    pub expires_at: DateTime<Utc>,
}

impl LockResult {
    /// Every requested feature was locked
    pub fn is_complete(&self) -> bool {
        self.not_locked.is_empty()
    }
}

/// Snapshot of one active lock
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LockInfo {
    pub lock_id: LockId,
    pub features: Vec<String>,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockSettings {
    pub default_expiry: StdDuration,
    pub max_expiry: StdDuration,
}

impl Default for LockSettings {
    fn default() -> Self {
        LockSettings {
            default_expiry: DEFAULT_LOCK_EXPIRY,
            max_expiry: MAX_LOCK_EXPIRY,
        }
    }
}

#[derive(Debug, Clone)]
struct LockEntry {
    lock_id: LockId,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct LockRecord {
    features: BTreeSet<String>,
    acquired_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl LockRecord {
    fn info(&self, lock_id: &LockId) -> LockInfo {
        LockInfo {
            lock_id: lock_id.clone(),
            features: self.features.iter().cloned().collect(),
            acquired_at: self.acquired_at,
            expires_at: self.expires_at,
        }
    }
}

/// Feature id -> holding lock, plus the per-lock view used for release
#[derive(Debug, Default)]
struct LockTable {
    by_feature: HashMap<String, LockEntry>,
    by_lock: HashMap<LockId, LockRecord>,
}

impl LockTable {
    fn holder(&self, feature_id: &str, now: DateTime<Utc>) -> Option<&LockId> {
        self.by_feature
            .get(feature_id)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| &entry.lock_id)
    }

    fn sweep(&mut self, now: DateTime<Utc>) -> Vec<String> {
        let mut expired: Vec<String> = self
            .by_feature
            .iter()
            .filter(|(_, entry)| entry.expires_at <= now)
            .map(|(feature_id, _)| feature_id.clone())
            .collect();
        for feature_id in &expired {
            if let Some(entry) = self.by_feature.remove(feature_id) {
                self.detach(&entry.lock_id, feature_id);
            }
        }
        self.by_lock.retain(|_, record| record.expires_at > now);
        expired.sort();
        expired
    }

    /// Drop `feature_id` from its lock record, removing the record once empty
    fn detach(&mut self, lock_id: &LockId, feature_id: &str) {
        if let Some(record) = self.by_lock.get_mut(lock_id) {
            record.features.remove(feature_id);
            if record.features.is_empty() {
                self.by_lock.remove(lock_id);
            }
        }
    }
}

pub struct FeatureLockManager {
    table: Mutex<LockTable>,
    clock: Arc<dyn LockClock>,
    settings: LockSettings,
}

impl fmt::Debug for FeatureLockManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureLockManager")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Default for FeatureLockManager {
    fn default() -> Self {
        Self::new(LockSettings::default())
    }
}

impl FeatureLockManager {
    pub fn new(settings: LockSettings) -> Self {
        Self::with_clock(settings, Arc::new(SystemClock))
    }

    pub fn with_clock(settings: LockSettings, clock: Arc<dyn LockClock>) -> Self {
        FeatureLockManager {
            table: Mutex::new(LockTable::default()),
            clock,
            settings,
        }
    }

    pub fn settings(&self) -> LockSettings {
        self.settings
    }

    /// Lock the requested features under a fresh lock id
    ///
    /// With `lock_all` the request is all-or-nothing: if any requested feature
    /// is held by an unexpired lock, nothing is locked, every requested id is
    /// reported as not locked and the returned lock id is not registered.
    /// Without `lock_all` whatever is free gets locked.
    ///
    /// `expiry` defaults to the configured default (5 minutes) and is clamped
    /// to the configured maximum.
    pub fn acquire<S: AsRef<str>>(
        &self,
        feature_ids: &[S],
        lock_all: bool,
        expiry: Option<StdDuration>,
    ) -> Result<LockResult, LockError> {
        let expiry = self.effective_expiry(expiry)?;
        let requested = dedup_in_order(feature_ids);
        let lock_id = LockId::generate();

        let now = self.clock.now();
        let expires_at = now + expiry;
        let mut table = self.table();
        table.sweep(now);

        let (available, held): (Vec<String>, Vec<String>) = requested
            .into_iter()
            .partition(|feature_id| table.holder(feature_id, now).is_none());

        if lock_all && !held.is_empty() {
            log::warn!(
                "Lock-all request denied: {} of {} feature(s) already locked",
                held.len(),
                available.len() + held.len()
            );
            let mut not_locked = available;
            not_locked.extend(held);
            return Ok(LockResult {
                lock_id,
                locked: Vec::new(),
                not_locked: restore_order(feature_ids, not_locked),
                expires_at,
            });
        }

        for feature_id in &available {
            table.by_feature.insert(
                feature_id.clone(),
                LockEntry {
                    lock_id: lock_id.clone(),
                    expires_at,
                },
            );
        }
        if !available.is_empty() {
            table.by_lock.insert(
                lock_id.clone(),
                LockRecord {
                    features: available.iter().cloned().collect(),
                    acquired_at: now,
                    expires_at,
                },
            );
        }
        drop(table);

        log::info!(
            "Lock {} granted on {} feature(s), {} not locked, expires {}",
            lock_id,
            available.len(),
            held.len(),
            expires_at
        );
        Ok(LockResult {
            lock_id,
            locked: available,
            not_locked: held,
            expires_at,
        })
    }

    /// Release every feature held by `lock_id`, returning the released ids
    pub fn release(&self, lock_id: &LockId) -> Result<Vec<String>, LockError> {
        let now = self.clock.now();
        let mut table = self.table();
        table.sweep(now);

        let record = table
            .by_lock
            .remove(lock_id)
            .ok_or_else(|| LockError::UnknownLock {
                lock_id: lock_id.to_string(),
            })?;
        for feature_id in &record.features {
            table.by_feature.remove(feature_id);
        }
        drop(table);

        log::info!(
            "Lock {} released ({} feature(s))",
            lock_id,
            record.features.len()
        );
        Ok(record.features.into_iter().collect())
    }

    /// Release a single feature, only if it is held by `lock_id`
    pub fn release_feature(&self, feature_id: &str, lock_id: &LockId) -> Result<(), LockError> {
        let now = self.clock.now();
        let mut table = self.table();
        table.sweep(now);

        if table.holder(feature_id, now) != Some(lock_id) {
            return Err(LockError::LockMismatch {
                feature_id: feature_id.to_string(),
                lock_id: lock_id.to_string(),
            });
        }
        table.by_feature.remove(feature_id);
        table.detach(lock_id, feature_id);
        drop(table);

        log::info!("Feature '{}' released from lock {}", feature_id, lock_id);
        Ok(())
    }

    /// Remove every entry whose expiry is at or before `now`
    ///
    /// Returns the ids of the features whose locks expired.
    pub fn expire_sweep(&self, now: DateTime<Utc>) -> Vec<String> {
        let expired = self.table().sweep(now);
        if !expired.is_empty() {
            log::info!("Expired locks on {} feature(s)", expired.len());
        }
        expired
    }

    /// Reset the expiry of a live lock to `now + expiry`
    pub fn renew(&self, lock_id: &LockId, expiry: Option<StdDuration>) -> Result<LockInfo, LockError> {
        let expiry = self.effective_expiry(expiry)?;
        let now = self.clock.now();
        let expires_at = now + expiry;
        let mut table = self.table();
        table.sweep(now);

        let table = &mut *table;
        let record = table
            .by_lock
            .get_mut(lock_id)
            .ok_or_else(|| LockError::UnknownLock {
                lock_id: lock_id.to_string(),
            })?;
        record.expires_at = expires_at;
        for feature_id in &record.features {
            if let Some(entry) = table.by_feature.get_mut(feature_id) {
                entry.expires_at = expires_at;
            }
        }

        log::debug!("Lock {} renewed until {}", lock_id, expires_at);
        Ok(record.info(lock_id))
    }

    /// Whether `feature_id` is held by an unexpired lock
    pub fn is_locked(&self, feature_id: &str) -> bool {
        let now = self.clock.now();
        self.table().holder(feature_id, now).is_some()
    }

    /// Whether a transaction presenting `lock_id` may modify `feature_id`:
    /// the feature is unlocked or held by that very lock
    pub fn is_modifiable(&self, feature_id: &str, lock_id: Option<&LockId>) -> bool {
        let now = self.clock.now();
        match self.table().holder(feature_id, now) {
            None => true,
            Some(holder) => Some(holder) == lock_id,
        }
    }

    pub fn lock_info(&self, lock_id: &LockId) -> Option<LockInfo> {
        let now = self.clock.now();
        self.table()
            .by_lock
            .get(lock_id)
            .filter(|record| record.expires_at > now)
            .map(|record| record.info(lock_id))
    }

    /// All unexpired locks, ordered by lock id
    pub fn active_locks(&self) -> Vec<LockInfo> {
        let now = self.clock.now();
        let table = self.table();
        let mut locks: Vec<LockInfo> = table
            .by_lock
            .iter()
            .filter(|(_, record)| record.expires_at > now)
            .map(|(lock_id, record)| record.info(lock_id))
            .collect();
        locks.sort_by(|a, b| a.lock_id.cmp(&b.lock_id));
        locks
    }

    fn effective_expiry(&self, requested: Option<StdDuration>) -> Result<Duration, LockError> {
        let requested = requested.unwrap_or(self.settings.default_expiry);
        if requested.is_zero() {
            return Err(LockError::InvalidExpiry(
                "expiry must be greater than zero".to_string(),
            ));
        }
        let clamped = requested.min(self.settings.max_expiry);
        if clamped < requested {
            log::debug!(
                "Requested lock expiry {:?} clamped to {:?}",
                requested,
                clamped
            );
        }
        Duration::from_std(clamped).map_err(|e| LockError::InvalidExpiry(e.to_string()))
    }

    fn table(&self) -> MutexGuard<'_, LockTable> {
        self.table.lock().unwrap_or_else(|poisoned| {
            log::warn!("Lock table mutex was poisoned; recovering");
            poisoned.into_inner()
        })
    }
}

fn dedup_in_order<S: AsRef<str>>(feature_ids: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    feature_ids
        .iter()
        .map(|id| id.as_ref())
        .filter(|id| seen.insert(*id))
        .map(str::to_string)
        .collect()
}

/// Reorder `subset` to follow the order of the original request
fn restore_order<S: AsRef<str>>(request: &[S], subset: Vec<String>) -> Vec<String> {
    let wanted: HashSet<String> = subset.into_iter().collect();
    let ordered = dedup_in_order(request);
    ordered.into_iter().filter(|id| wanted.contains(id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locking::clock::ManualClock;

    fn manager() -> (FeatureLockManager, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let manager = FeatureLockManager::with_clock(LockSettings::default(), clock.clone());
        (manager, clock)
    }

    #[test]
    fn test_default_expiry_is_five_minutes() {
        let (locks, clock) = manager();
        let result = locks.acquire(&["F1"], false, None).unwrap();
        assert_eq!(result.expires_at, clock.now() + Duration::minutes(5));
    }

    #[test]
    fn test_expiry_is_clamped_to_maximum() {
        let (locks, clock) = manager();
        let result = locks
            .acquire(&["F1"], false, Some(StdDuration::from_secs(7 * 24 * 3600)))
            .unwrap();
        assert_eq!(result.expires_at, clock.now() + Duration::hours(24));
    }

    #[test]
    fn test_zero_expiry_is_rejected() {
        let (locks, _) = manager();
        assert!(matches!(
            locks.acquire(&["F1"], false, Some(StdDuration::ZERO)),
            Err(LockError::InvalidExpiry(_))
        ));
        assert!(!locks.is_locked("F1"));
    }

    #[test]
    fn test_duplicate_ids_are_locked_once() {
        let (locks, _) = manager();
        let result = locks.acquire(&["F1", "F2", "F1"], false, None).unwrap();
        assert_eq!(result.locked, vec!["F1", "F2"]);
        assert!(result.not_locked.is_empty());
    }

    #[test]
    fn test_lock_all_denied_keeps_request_order() {
        let (locks, _) = manager();
        locks.acquire(&["F2"], false, None).unwrap();
        let result = locks.acquire(&["F3", "F2", "F1"], true, None).unwrap();
        assert!(result.locked.is_empty());
        assert_eq!(result.not_locked, vec!["F3", "F2", "F1"]);
        assert!(locks.lock_info(&result.lock_id).is_none());
    }

    #[test]
    fn test_release_feature_requires_matching_lock() {
        let (locks, _) = manager();
        let first = locks.acquire(&["F1", "F2"], false, None).unwrap();
        let other = LockId::new("someone-else");

        assert_eq!(
            locks.release_feature("F1", &other),
            Err(LockError::LockMismatch {
                feature_id: "F1".to_string(),
                lock_id: "someone-else".to_string()
            })
        );
        assert!(locks.release_feature("F9", &first.lock_id).is_err());

        locks.release_feature("F1", &first.lock_id).unwrap();
        assert!(!locks.is_locked("F1"));
        assert!(locks.is_locked("F2"));
        assert_eq!(
            locks.lock_info(&first.lock_id).unwrap().features,
            vec!["F2"]
        );

        locks.release_feature("F2", &first.lock_id).unwrap();
        assert_eq!(
            locks.release(&first.lock_id),
            Err(LockError::UnknownLock {
                lock_id: first.lock_id.to_string()
            })
        );
    }

    #[test]
    fn test_expired_entries_are_absent_before_sweep() {
        let (locks, clock) = manager();
        let result = locks
            .acquire(&["F1"], false, Some(StdDuration::from_secs(60)))
            .unwrap();
        clock.advance(Duration::seconds(60));

        assert!(!locks.is_locked("F1"));
        assert!(locks.is_modifiable("F1", None));
        assert!(locks.lock_info(&result.lock_id).is_none());
        assert!(locks.active_locks().is_empty());
    }

    #[test]
    fn test_expire_sweep_reports_expired_features() {
        let (locks, clock) = manager();
        locks
            .acquire(&["F2", "F1"], false, Some(StdDuration::from_secs(30)))
            .unwrap();
        locks
            .acquire(&["F3"], false, Some(StdDuration::from_secs(300)))
            .unwrap();

        assert!(locks.expire_sweep(clock.now()).is_empty());
        let expired = locks.expire_sweep(clock.now() + Duration::seconds(31));
        assert_eq!(expired, vec!["F1", "F2"]);
        assert_eq!(locks.active_locks().len(), 1);
    }

    #[test]
    fn test_renew_extends_expiry() {
        let (locks, clock) = manager();
        let result = locks
            .acquire(&["F1"], false, Some(StdDuration::from_secs(60)))
            .unwrap();
        clock.advance(Duration::seconds(50));
        let renewed = locks
            .renew(&result.lock_id, Some(StdDuration::from_secs(60)))
            .unwrap();
        assert_eq!(renewed.expires_at, clock.now() + Duration::seconds(60));

        clock.advance(Duration::seconds(30));
        assert!(locks.is_locked("F1"));
        assert!(locks.renew(&LockId::new("missing"), None).is_err());
    }

    #[test]
    fn test_is_modifiable_by_holder_only() {
        let (locks, _) = manager();
        let result = locks.acquire(&["F1"], false, None).unwrap();
        assert!(locks.is_modifiable("F1", Some(&result.lock_id)));
        assert!(!locks.is_modifiable("F1", None));
        assert!(!locks.is_modifiable("F1", Some(&LockId::new("other"))));
        assert!(locks.is_modifiable("F2", None));
    }

    #[test]
    fn test_lock_ids_are_unique_per_grant() {
        let (locks, _) = manager();
        let a = locks.acquire(&["F1"], false, None).unwrap();
        let b = locks.acquire(&["F2"], false, None).unwrap();
        let empty = locks.acquire::<&str>(&[], false, None).unwrap();
        assert_ne!(a.lock_id, b.lock_id);
        assert_ne!(b.lock_id, empty.lock_id);
        assert!(empty.locked.is_empty() && empty.not_locked.is_empty());
    }
}
