use crate::error::{PulseError, Result};
use crate::metrics::StorageMetrics;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

/// An immutable, versioned view of one partition. Version 0 means nothing was committed yet.
#[derive(Debug)]
pub struct Snapshot<T> {
    pub version: u64,
    pub data: Arc<T>,
}

impl<T> Clone for Snapshot<T> {
    fn clone(&self) -> Self {
        Self {
            version: self.version,
            data: Arc::clone(&self.data),
        }
    }
}

/// Copy-on-write table of versioned partitions.
///
/// Readers always get a complete committed snapshot. Writers commit a whole new value for a
/// partition, and only if the partition is still at the version they read.
pub struct SnapshotTable<K, T> {
    name: String,
    partitions: RwLock<BTreeMap<K, Snapshot<T>>>,
    max_retries: u32,
}

impl<K, T> SnapshotTable<K, T>
where
    K: Ord + Clone + Debug,
    T: Default,
{
    pub fn new(name: impl Into<String>, max_retries: u32) -> Self {
        Self {
            name: name.into(),
            partitions: RwLock::new(BTreeMap::new()),
            max_retries: max_retries.max(1),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current snapshot of a partition; an empty version-0 value if it was never written.
    pub fn read(&self, key: &K) -> Snapshot<T> {
        let partitions = self.partitions.read().unwrap_or_else(|e| e.into_inner());
        partitions.get(key).cloned().unwrap_or_else(|| Snapshot {
            version: 0,
            data: Arc::new(T::default()),
        })
    }

    pub fn version(&self, key: &K) -> u64 {
        let partitions = self.partitions.read().unwrap_or_else(|e| e.into_inner());
        partitions.get(key).map(|s| s.version).unwrap_or(0)
    }

    /// All committed partitions, in key order.
    pub fn snapshot_all(&self) -> BTreeMap<K, Snapshot<T>> {
        self.partitions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Commit `data` as the next version of `key`, provided the partition is still at `expected`.
    pub fn commit(&self, key: &K, expected: u64, data: T) -> Result<u64> {
        let mut partitions = self.partitions.write().unwrap_or_else(|e| e.into_inner());
        let found = partitions.get(key).map(|s| s.version).unwrap_or(0);
        if found != expected {
            StorageMetrics::record_conflict(&self.name);
            return Err(PulseError::StaleSnapshotConflict {
                table: format!("{}/{:?}", self.name, key),
                expected,
                found,
            });
        }

        let version = found + 1;
        partitions.insert(
            key.clone(),
            Snapshot {
                version,
                data: Arc::new(data),
            },
        );
        StorageMetrics::record_commit(&self.name);
        debug!(table = %self.name, partition = ?key, version, "Committed snapshot");
        Ok(version)
    }

    /// Read-compute-commit with optimistic retries.
    ///
    /// `compute` sees the current snapshot and returns the replacement value (or `None` to leave
    /// the partition untouched) plus a result for the caller. On a version conflict it is run
    /// again against the newer snapshot.
    pub fn update<R, F>(&self, key: &K, mut compute: F) -> Result<Updated<R>>
    where
        F: FnMut(&Snapshot<T>) -> Result<(Option<T>, R)>,
    {
        for attempt in 1..=self.max_retries {
            let current = self.read(key);
            let (next, outcome) = compute(&current)?;

            let Some(next) = next else {
                return Ok(Updated {
                    version: current.version,
                    committed: false,
                    outcome,
                });
            };

            match self.commit(key, current.version, next) {
                Ok(version) => {
                    return Ok(Updated {
                        version,
                        committed: true,
                        outcome,
                    })
                }
                Err(PulseError::StaleSnapshotConflict { found, .. }) => {
                    warn!(
                        table = %self.name,
                        partition = ?key,
                        attempt,
                        read_version = current.version,
                        found,
                        "Snapshot moved underneath writer, retrying"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        Err(PulseError::CommitRetriesExhausted {
            table: format!("{}/{:?}", self.name, key),
            attempts: self.max_retries,
        })
    }

    /// Install an archived snapshot. Ignored if the partition is already at or past `version`.
    pub fn restore(&self, key: K, version: u64, data: T) -> bool {
        let mut partitions = self.partitions.write().unwrap_or_else(|e| e.into_inner());
        let current = partitions.get(&key).map(|s| s.version).unwrap_or(0);
        if version <= current {
            return false;
        }
        partitions.insert(
            key,
            Snapshot {
                version,
                data: Arc::new(data),
            },
        );
        true
    }
}

/// Result of [`SnapshotTable::update`].
#[derive(Debug, Clone)]
pub struct Updated<R> {
    /// Version now current for the partition
    pub version: u64,
    /// Whether this call produced that version
    pub committed: bool,
    pub outcome: R,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_read_of_unwritten_partition_is_version_zero() {
        let table: SnapshotTable<&str, Vec<u32>> = SnapshotTable::new("t", 3);
        let snap = table.read(&"a");
        assert_eq!(snap.version, 0);
        assert!(snap.data.is_empty());
    }

    #[test]
    fn test_commit_rejects_stale_version() {
        let table: SnapshotTable<&str, Vec<u32>> = SnapshotTable::new("t", 3);
        assert_eq!(table.commit(&"a", 0, vec![1]).unwrap(), 1);
        let err = table.commit(&"a", 0, vec![2]).unwrap_err();
        assert!(matches!(
            err,
            PulseError::StaleSnapshotConflict {
                expected: 0,
                found: 1,
                ..
            }
        ));
        assert_eq!(*table.read(&"a").data, vec![1]);
    }

    #[test]
    fn test_readers_keep_their_snapshot_after_commit() {
        let table: SnapshotTable<&str, Vec<u32>> = SnapshotTable::new("t", 3);
        table.commit(&"a", 0, vec![1]).unwrap();
        let before = table.read(&"a");
        table.commit(&"a", 1, vec![1, 2]).unwrap();
        assert_eq!(*before.data, vec![1]);
        assert_eq!(*table.read(&"a").data, vec![1, 2]);
    }

    #[test]
    fn test_partitions_version_independently() {
        let table: SnapshotTable<&str, Vec<u32>> = SnapshotTable::new("t", 3);
        table.commit(&"a", 0, vec![1]).unwrap();
        table.commit(&"a", 1, vec![2]).unwrap();
        assert_eq!(table.commit(&"b", 0, vec![3]).unwrap(), 1);
        assert_eq!(table.version(&"a"), 2);
    }

    #[test]
    fn test_update_retries_against_newer_version() {
        let table: SnapshotTable<&str, Vec<u32>> = SnapshotTable::new("t", 3);
        let calls = Cell::new(0);
        let updated = table
            .update(&"a", |snap| {
                calls.set(calls.get() + 1);
                if calls.get() == 1 {
                    // Simulate a concurrent writer landing between read and commit
                    table.commit(&"a", 0, vec![7]).unwrap();
                }
                let mut next = (*snap.data).clone();
                next.push(1);
                Ok((Some(next), ()))
            })
            .unwrap();
        assert_eq!(calls.get(), 2);
        assert_eq!(updated.version, 2);
        assert_eq!(*table.read(&"a").data, vec![7, 1]);
    }

    #[test]
    fn test_update_gives_up_after_max_retries() {
        let table: SnapshotTable<&str, Vec<u32>> = SnapshotTable::new("t", 2);
        let err = table
            .update(&"a", |snap| {
                table.commit(&"a", snap.version, vec![0]).unwrap();
                Ok((Some(vec![1]), ()))
            })
            .unwrap_err();
        assert!(matches!(err, PulseError::CommitRetriesExhausted { attempts: 2, .. }));
    }

    #[test]
    fn test_update_without_change_keeps_version() {
        let table: SnapshotTable<&str, Vec<u32>> = SnapshotTable::new("t", 2);
        table.commit(&"a", 0, vec![1]).unwrap();
        let updated = table.update(&"a", |_| Ok((None, "same"))).unwrap();
        assert!(!updated.committed);
        assert_eq!(updated.version, 1);
        assert_eq!(updated.outcome, "same");
    }

    #[test]
    fn test_restore_only_moves_forward() {
        let table: SnapshotTable<&str, Vec<u32>> = SnapshotTable::new("t", 2);
        assert!(table.restore("a", 4, vec![4]));
        assert!(!table.restore("a", 3, vec![3]));
        assert_eq!(table.version(&"a"), 4);
        assert_eq!(table.commit(&"a", 4, vec![5]).unwrap(), 5);
    }
}
