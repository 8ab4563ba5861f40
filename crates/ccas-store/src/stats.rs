use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Process-wide object manager counters.
///
/// Every counter is a monotonically increasing atomic, safe to bump from any
/// number of writer threads without a lock. Formatters only touch the
/// hashing counters; the object manager maintains the rest. Telemetry reads
/// them through [`ObjectManagerStats::snapshot`].
#[derive(Debug, Default)]
pub struct ObjectManagerStats {
    hashed_bytes: AtomicU64,
    hashed_objects: AtomicU64,
    written_bytes: AtomicU64,
    written_objects: AtomicU64,
    present_objects: AtomicU64,
    read_bytes: AtomicU64,
    read_objects: AtomicU64,
    invalid_objects: AtomicU64,
}

impl ObjectManagerStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// One formatting pass over `bytes` of plaintext.
    pub fn record_hashed(&self, bytes: u64) {
        self.hashed_bytes.fetch_add(bytes, Ordering::Relaxed);
        self.hashed_objects.fetch_add(1, Ordering::Relaxed);
    }

    /// One new object persisted as `bytes` stored bytes.
    pub fn record_written(&self, bytes: u64) {
        self.written_bytes.fetch_add(bytes, Ordering::Relaxed);
        self.written_objects.fetch_add(1, Ordering::Relaxed);
    }

    /// A write skipped because the ID already existed.
    pub fn record_present(&self) {
        self.present_objects.fetch_add(1, Ordering::Relaxed);
    }

    /// One object read back as `bytes` of plaintext.
    pub fn record_read(&self, bytes: u64) {
        self.read_bytes.fetch_add(bytes, Ordering::Relaxed);
        self.read_objects.fetch_add(1, Ordering::Relaxed);
    }

    /// An object that failed integrity or content verification.
    pub fn record_invalid(&self) {
        self.invalid_objects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hashed_bytes(&self) -> u64 {
        self.hashed_bytes.load(Ordering::Relaxed)
    }

    /// Point-in-time copy of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            hashed_bytes: self.hashed_bytes.load(Ordering::Relaxed),
            hashed_objects: self.hashed_objects.load(Ordering::Relaxed),
            written_bytes: self.written_bytes.load(Ordering::Relaxed),
            written_objects: self.written_objects.load(Ordering::Relaxed),
            present_objects: self.present_objects.load(Ordering::Relaxed),
            read_bytes: self.read_bytes.load(Ordering::Relaxed),
            read_objects: self.read_objects.load(Ordering::Relaxed),
            invalid_objects: self.invalid_objects.load(Ordering::Relaxed),
        }
    }
}

/// Serializable copy of [`ObjectManagerStats`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub hashed_bytes: u64,
    pub hashed_objects: u64,
    pub written_bytes: u64,
    pub written_objects: u64,
    pub present_objects: u64,
    pub read_bytes: u64,
    pub read_objects: u64,
    pub invalid_objects: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn starts_at_zero() {
        assert_eq!(ObjectManagerStats::new().snapshot(), StatsSnapshot::default());
    }

    #[test]
    fn counters_accumulate() {
        let stats = ObjectManagerStats::new();
        stats.record_hashed(11);
        stats.record_hashed(5);
        stats.record_written(100);
        stats.record_present();
        stats.record_read(7);
        stats.record_invalid();

        let snap = stats.snapshot();
        assert_eq!(snap.hashed_bytes, 16);
        assert_eq!(snap.hashed_objects, 2);
        assert_eq!(snap.written_bytes, 100);
        assert_eq!(snap.written_objects, 1);
        assert_eq!(snap.present_objects, 1);
        assert_eq!(snap.read_bytes, 7);
        assert_eq!(snap.read_objects, 1);
        assert_eq!(snap.invalid_objects, 1);
    }

    #[test]
    fn concurrent_updates_are_not_lost() {
        let stats = Arc::new(ObjectManagerStats::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let stats = Arc::clone(&stats);
                thread::spawn(move || {
                    for _ in 0..10_000 {
                        stats.record_hashed(3);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().expect("thread should not panic");
        }
        assert_eq!(stats.hashed_bytes(), 8 * 10_000 * 3);
        assert_eq!(stats.snapshot().hashed_objects, 80_000);
    }

    #[test]
    fn snapshot_serializes() {
        let stats = ObjectManagerStats::new();
        stats.record_hashed(42);
        let json = serde_json::to_value(stats.snapshot()).unwrap();
        assert_eq!(json["hashed_bytes"], 42);
    }
}
