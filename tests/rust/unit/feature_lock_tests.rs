//! Feature locking behaviour through the public API
//!
//! Expiry is driven by a `ManualClock`; races use real threads.

#[cfg(test)]
mod feature_lock_tests {
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::Duration;

    use featurestore::locking::{
        FeatureLockManager, LockClock, LockError, LockId, LockSettings, ManualClock,
    };

    fn manager_with_clock() -> (Arc<FeatureLockManager>, Arc<ManualClock>) {
        let _ = env_logger::builder().is_test(true).try_init();
        let clock = Arc::new(ManualClock::default());
        let manager = FeatureLockManager::with_clock(LockSettings::default(), clock.clone());
        (Arc::new(manager), clock)
    }

    #[test]
    fn test_partial_lock_reports_held_feature() {
        let (locks, _) = manager_with_clock();

        let first = locks
            .acquire(&["F1", "F2", "F3"], false, Some(Duration::from_secs(300)))
            .unwrap();
        assert_eq!(first.locked, vec!["F1", "F2", "F3"]);
        assert!(first.is_complete());

        let second = locks
            .acquire(&["F2"], false, Some(Duration::from_secs(60)))
            .unwrap();
        assert!(second.locked.is_empty());
        assert_eq!(second.not_locked, vec!["F2"]);
        assert_ne!(first.lock_id, second.lock_id);
    }

    #[test]
    fn test_lock_all_is_all_or_nothing() {
        let (locks, _) = manager_with_clock();
        let holder = locks.acquire(&["F3"], false, None).unwrap();

        let result = locks.acquire(&["F1", "F2", "F3"], true, None).unwrap();
        assert!(result.locked.is_empty());
        assert_eq!(result.not_locked, vec!["F1", "F2", "F3"]);
        assert!(!locks.is_locked("F1"));
        assert!(!locks.is_locked("F2"));

        // The denied request's lock id was never registered
        assert_eq!(
            locks.release(&result.lock_id),
            Err(LockError::UnknownLock {
                lock_id: result.lock_id.to_string()
            })
        );
        assert_eq!(locks.release(&holder.lock_id).unwrap(), vec!["F3"]);

        let retry = locks.acquire(&["F1", "F2", "F3"], true, None).unwrap();
        assert_eq!(retry.locked, vec!["F1", "F2", "F3"]);
    }

    #[test]
    fn test_expired_lock_is_lockable_again() {
        let (locks, clock) = manager_with_clock();
        let first = locks
            .acquire(&["F1"], false, Some(Duration::from_secs(60)))
            .unwrap();

        clock.advance(chrono::Duration::seconds(59));
        let early = locks.acquire(&["F1"], false, None).unwrap();
        assert_eq!(early.not_locked, vec!["F1"]);

        clock.advance(chrono::Duration::seconds(2));
        let late = locks.acquire(&["F1"], false, None).unwrap();
        assert_eq!(late.locked, vec!["F1"]);
        assert!(matches!(
            locks.release(&first.lock_id),
            Err(LockError::UnknownLock { .. })
        ));
    }

    #[test]
    fn test_explicit_sweep_frees_expired_features() {
        let (locks, clock) = manager_with_clock();
        locks
            .acquire(&["F1", "F2"], false, Some(Duration::from_secs(10)))
            .unwrap();

        let expired = locks.expire_sweep(clock.now() + chrono::Duration::seconds(10));
        assert_eq!(expired, vec!["F1", "F2"]);
        assert!(locks.active_locks().is_empty());
    }

    #[test]
    fn test_release_removes_only_own_entries() {
        let (locks, _) = manager_with_clock();
        let a = locks.acquire(&["F1", "F2"], false, None).unwrap();
        let b = locks.acquire(&["F3"], false, None).unwrap();

        assert_eq!(locks.release(&a.lock_id).unwrap(), vec!["F1", "F2"]);
        assert!(!locks.is_locked("F1"));
        assert!(!locks.is_locked("F2"));
        assert!(locks.is_locked("F3"));
        assert_eq!(locks.lock_info(&b.lock_id).unwrap().features, vec!["F3"]);

        assert!(matches!(
            locks.release(&LockId::new("no-such-lock")),
            Err(LockError::UnknownLock { .. })
        ));
    }

    #[test]
    fn test_release_feature_mismatch() {
        let (locks, _) = manager_with_clock();
        let a = locks.acquire(&["F1"], false, None).unwrap();
        let b = locks.acquire(&["F2"], false, None).unwrap();

        assert!(matches!(
            locks.release_feature("F1", &b.lock_id),
            Err(LockError::LockMismatch { .. })
        ));
        assert!(locks.is_locked("F1"));
        locks.release_feature("F1", &a.lock_id).unwrap();
        assert!(!locks.is_locked("F1"));
    }

    #[test]
    fn test_lock_result_serializes_for_response_encoders() {
        let (locks, _) = manager_with_clock();
        locks.acquire(&["F2"], false, None).unwrap();
        let result = locks.acquire(&["F1", "F2"], false, None).unwrap();

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["lock_id"], result.lock_id.as_str());
        assert_eq!(json["locked"], serde_json::json!(["F1"]));
        assert_eq!(json["not_locked"], serde_json::json!(["F2"]));
    }

    /// Racing acquires on one feature have exactly one winner
    #[test]
    fn test_concurrent_acquire_single_winner() {
        let (locks, _) = manager_with_clock();
        let threads = 16;
        let barrier = Arc::new(Barrier::new(threads));

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    locks.acquire(&["F1"], false, None).unwrap().locked.len()
                })
            })
            .collect();

        let winners: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(winners, 1);
    }

    /// Overlapping lock-all requests never leave a mixed ownership state
    #[test]
    fn test_concurrent_lock_all_never_partial() {
        let (locks, _) = manager_with_clock();
        let threads = 8;
        let barrier = Arc::new(Barrier::new(threads));

        let handles: Vec<_> = (0..threads)
            .map(|i| {
                let locks = Arc::clone(&locks);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    // Every request overlaps its neighbour on one feature
                    let ids = [format!("F{}", i), format!("F{}", (i + 1) % threads)];
                    barrier.wait();
                    locks.acquire(&ids, true, None).unwrap()
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for result in &results {
            assert!(result.locked.is_empty() || result.locked.len() == 2);
            assert_eq!(result.locked.len() + result.not_locked.len(), 2);
        }

        let mut granted: Vec<String> = results
            .iter()
            .flat_map(|r| r.locked.iter().cloned())
            .collect();
        let total = granted.len();
        granted.sort();
        granted.dedup();
        assert_eq!(granted.len(), total, "a feature was granted twice");
        assert!(total >= 2);
    }
}
