//! Address-keyed store for allocation registry entries.
//!
//! The registry keeps one value per tracked address; this crate owns that
//! mapping and nothing else. Keys are raw addresses used purely as lookup
//! keys -- the table never dereferences them. All operations are fallible at
//! the interface even where the std collections below cannot actually fail,
//! so the caller's bounded-retry discipline has a single error type to work
//! against.
//!
//! The table provides no locking of its own; the registry serializes access
//! behind its global lock.

use std::collections::HashMap;
use std::fmt;

#[cfg(feature = "inject-failures")]
use std::sync::atomic::{AtomicU32, Ordering};

/// Error type for table operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableError {
    /// The key is not present.
    MissingKey(usize),
    /// A zero key was supplied; addresses are never null.
    NullKey,
    /// Transient storage failure (only produced under failure injection).
    Transient,
}

impl fmt::Display for TableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingKey(key) => write!(f, "no entry for address {key:#x}"),
            Self::NullKey => write!(f, "null address is not a valid key"),
            Self::Transient => write!(f, "transient table failure"),
        }
    }
}

impl std::error::Error for TableError {}

/// Deterministic failure injector: the next `n` fallible operations fail.
#[cfg(feature = "inject-failures")]
static INJECT_FAILURES: AtomicU32 = AtomicU32::new(0);

/// Arrange for the next `n` fallible table operations (any table) to fail
/// with [`TableError::Transient`].
#[cfg(feature = "inject-failures")]
pub fn inject_failures(n: u32) {
    INJECT_FAILURES.store(n, Ordering::SeqCst);
}

#[cfg(feature = "inject-failures")]
fn take_injected_failure() -> bool {
    INJECT_FAILURES
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[cfg(not(feature = "inject-failures"))]
#[inline]
fn take_injected_failure() -> bool {
    false
}

/// Address-keyed map from tracked address to entry value.
pub struct AddrTable<V> {
    entries: HashMap<usize, V>,
}

impl<V> AddrTable<V> {
    /// Create a table sized for roughly `capacity_hint` entries.
    ///
    /// The hint is advisory; the table grows as needed.
    pub fn create(capacity_hint: usize) -> Result<Self, TableError> {
        if take_injected_failure() {
            return Err(TableError::Transient);
        }
        Ok(Self {
            entries: HashMap::with_capacity(capacity_hint),
        })
    }

    /// Insert or overwrite the value for `key`.
    ///
    /// A zero key is rejected; the registry never tracks a null address.
    pub fn set(&mut self, key: usize, value: V) -> Result<(), TableError> {
        if key == 0 {
            return Err(TableError::NullKey);
        }
        if take_injected_failure() {
            return Err(TableError::Transient);
        }
        self.entries.insert(key, value);
        Ok(())
    }

    /// Look up the value for `key`.
    #[must_use]
    pub fn get(&self, key: usize) -> Option<&V> {
        self.entries.get(&key)
    }

    /// Look up the value for `key`, mutably.
    pub fn get_mut(&mut self, key: usize) -> Option<&mut V> {
        self.entries.get_mut(&key)
    }

    /// Remove the value for `key`. Fails if `key` is not present.
    pub fn delete(&mut self, key: usize) -> Result<V, TableError> {
        self.entries.remove(&key).ok_or(TableError::MissingKey(key))
    }

    /// Point-in-time copy of every value currently in the table.
    ///
    /// The order of the returned values is unspecified. The copy is owned by
    /// the caller; dropping it is the release step.
    pub fn snapshot(&self) -> Result<Vec<V>, TableError>
    where
        V: Clone,
    {
        if take_injected_failure() {
            return Err(TableError::Transient);
        }
        Ok(self.entries.values().cloned().collect())
    }

    /// Number of entries currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the table holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_delete_cycle() {
        let mut table = AddrTable::create(8).expect("create should succeed");
        table.set(0x1000, 64usize).expect("set should succeed");
        assert_eq!(table.get(0x1000), Some(&64));
        assert_eq!(table.len(), 1);

        let removed = table.delete(0x1000).expect("delete should succeed");
        assert_eq!(removed, 64);
        assert!(table.is_empty());
    }

    #[test]
    fn null_key_rejected() {
        let mut table = AddrTable::create(8).expect("create should succeed");
        assert_eq!(table.set(0, 1usize), Err(TableError::NullKey));
    }

    #[test]
    fn delete_missing_key_reports_address() {
        let mut table = AddrTable::<usize>::create(8).expect("create should succeed");
        assert_eq!(table.delete(0xBEEF), Err(TableError::MissingKey(0xBEEF)));
    }

    #[test]
    fn set_overwrites_existing_value() {
        let mut table = AddrTable::create(8).expect("create should succeed");
        table.set(0x2000, 16usize).expect("first set");
        table.set(0x2000, 32usize).expect("second set");
        assert_eq!(table.get(0x2000), Some(&32));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn snapshot_is_point_in_time() {
        let mut table = AddrTable::create(8).expect("create should succeed");
        table.set(0x1000, 1usize).expect("set");
        table.set(0x2000, 2usize).expect("set");

        let snap = table.snapshot().expect("snapshot should succeed");
        table.delete(0x1000).expect("delete");

        let mut values = snap;
        values.sort_unstable();
        assert_eq!(values, vec![1, 2]);
        assert_eq!(table.len(), 1);
    }
}
