//! Entry store protocol.
//!
//! All methods here assume the global lock is held; the store itself is a
//! plain single-threaded structure over the address-keyed table. Transient
//! table failures are retried a bounded number of times before the operation
//! gives up.

use alloctrack_core::diag::TrackError;
use alloctrack_core::{AllocationEntry, CallSite};
use alloctrack_table::{AddrTable, TableError};

use crate::config::TrackMode;

/// Attempts at constructing or snapshotting the backing table.
pub(crate) const STORE_ATTEMPTS: usize = 4;
/// Initial capacity hint handed to the table.
pub(crate) const CAPACITY_HINT: usize = 64;

/// How an `update` call resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UpdateOutcome {
    /// No prior address: behaved as a plain insert.
    Inserted,
    /// Same address: size and resize provenance refreshed in place.
    InPlace,
    /// New address: fresh entry inserted, old entry removed.
    Relocated,
    /// The old address was not tracked; a fresh entry now stands in.
    UntrackedReplaced,
}

pub(crate) struct EntryStore {
    table: AddrTable<AllocationEntry>,
    mode: TrackMode,
}

impl EntryStore {
    /// Construct the store, retrying transient table-creation failures.
    pub(crate) fn create(mode: TrackMode) -> Result<Self, TrackError> {
        for _ in 0..STORE_ATTEMPTS {
            if let Ok(table) = AddrTable::create(CAPACITY_HINT) {
                return Ok(Self { table, mode });
            }
        }
        Err(TrackError::StoreFailure)
    }

    /// Add a new entry. The address must be nonzero.
    pub(crate) fn insert(&mut self, entry: AllocationEntry) -> Result<(), TrackError> {
        if entry.address == 0 {
            return Err(TrackError::NullAddress);
        }
        let mut last = TableError::Transient;
        for _ in 0..STORE_ATTEMPTS {
            match self.table.set(entry.address, entry) {
                Ok(()) => return Ok(()),
                Err(TableError::NullKey) => return Err(TrackError::NullAddress),
                Err(err) => last = err,
            }
        }
        log::warn!("entry store rejected insert for {:#x}: {last}", entry.address);
        Err(TrackError::StoreFailure)
    }

    pub(crate) fn lookup(&self, address: usize) -> Option<&AllocationEntry> {
        self.table.get(address)
    }

    /// Retarget or refresh the entry for a resized block.
    ///
    /// A zero `old_address` degrades to `insert`; a zero `new_address` keeps
    /// the old one. When the block moved, the new entry is inserted first so
    /// it is authoritative even if removing the old entry fails.
    pub(crate) fn update(
        &mut self,
        old_address: usize,
        new_address: usize,
        new_size: usize,
        resized_at: CallSite,
    ) -> Result<UpdateOutcome, TrackError> {
        if old_address == 0 {
            self.insert(AllocationEntry::new(new_address, new_size, resized_at))?;
            return Ok(UpdateOutcome::Inserted);
        }
        let new_address = if new_address == 0 {
            old_address
        } else {
            new_address
        };

        let Some(old_entry) = self.table.get(old_address).copied() else {
            // The block was resized without ever being tracked. Track the
            // result so at least the new extent is known.
            self.insert(AllocationEntry::new(new_address, new_size, resized_at))?;
            return Ok(UpdateOutcome::UntrackedReplaced);
        };

        if new_address == old_address {
            let entry = self
                .table
                .get_mut(old_address)
                .expect("entry was just looked up");
            entry.size = new_size;
            entry.last_resized_at = Some(resized_at);
            return Ok(UpdateOutcome::InPlace);
        }

        self.insert(old_entry.relocated(new_address, new_size, resized_at))?;
        if let Err(err) = self.table.delete(old_address) {
            // The new entry already stands; losing the stale one is only
            // worth a report.
            log::warn!("could not remove superseded entry {old_address:#x}: {err}");
        }
        Ok(UpdateOutcome::Relocated)
    }

    /// Pre-release check for diagnostic mode: the address must be tracked
    /// and not already released.
    pub(crate) fn check_releasable(&self, address: usize) -> Result<(), TrackError> {
        match self.table.get(address) {
            None => Err(TrackError::Untracked { address }),
            Some(entry) if entry.is_released => Err(TrackError::DoubleRelease { address }),
            Some(_) => Ok(()),
        }
    }

    /// Record a release: delete the entry in lean mode, flag it released in
    /// diagnostic mode. A double release leaves the entry untouched so the
    /// first release's provenance is preserved.
    pub(crate) fn remove_or_flag(
        &mut self,
        address: usize,
        released_at: CallSite,
    ) -> Result<(), TrackError> {
        if !self.mode.retains_released_entries() {
            return match self.table.delete(address) {
                Ok(_) => Ok(()),
                Err(TableError::MissingKey(_)) => Err(TrackError::Untracked { address }),
                Err(_) => Err(TrackError::StoreFailure),
            };
        }

        match self.table.get_mut(address) {
            None => Err(TrackError::Untracked { address }),
            Some(entry) if entry.is_released => Err(TrackError::DoubleRelease { address }),
            Some(entry) => {
                entry.is_released = true;
                entry.released_at = Some(released_at);
                Ok(())
            }
        }
    }

    /// Point-in-time copy of all entries, with bounded retries.
    pub(crate) fn snapshot(&self) -> Result<Vec<AllocationEntry>, TrackError> {
        for _ in 0..STORE_ATTEMPTS {
            if let Ok(entries) = self.table.snapshot() {
                return Ok(entries);
            }
        }
        Err(TrackError::StoreFailure)
    }

    pub(crate) fn len(&self) -> usize {
        self.table.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site(line: u32) -> CallSite {
        CallSite {
            file: "store.rs",
            line,
        }
    }

    fn store(mode: TrackMode) -> EntryStore {
        EntryStore::create(mode).expect("store should construct")
    }

    #[test]
    fn insert_and_lookup() {
        let mut s = store(TrackMode::Diagnostic);
        s.insert(AllocationEntry::new(0x1000, 64, site(1)))
            .expect("insert should succeed");
        let entry = s.lookup(0x1000).expect("entry should exist");
        assert_eq!(entry.size, 64);
        assert!(!entry.is_released);
    }

    #[test]
    fn update_in_place_keeps_allocation_site() {
        let mut s = store(TrackMode::Diagnostic);
        s.insert(AllocationEntry::new(0x1000, 64, site(1)))
            .expect("insert");
        let outcome = s
            .update(0x1000, 0x1000, 128, site(2))
            .expect("update should succeed");
        assert_eq!(outcome, UpdateOutcome::InPlace);

        let entry = s.lookup(0x1000).expect("entry should exist");
        assert_eq!(entry.size, 128);
        assert_eq!(entry.allocated_at, site(1));
        assert_eq!(entry.last_resized_at, Some(site(2)));
    }

    #[test]
    fn update_relocation_moves_the_entry() {
        let mut s = store(TrackMode::Diagnostic);
        s.insert(AllocationEntry::new(0x1000, 64, site(1)))
            .expect("insert");
        let outcome = s
            .update(0x1000, 0x2000, 256, site(3))
            .expect("update should succeed");
        assert_eq!(outcome, UpdateOutcome::Relocated);

        assert!(s.lookup(0x1000).is_none());
        let entry = s.lookup(0x2000).expect("relocated entry should exist");
        assert_eq!(entry.size, 256);
        assert_eq!(entry.allocated_at, site(1), "allocation site carried over");
    }

    #[test]
    fn update_of_untracked_address_tracks_the_result() {
        let mut s = store(TrackMode::Diagnostic);
        let outcome = s
            .update(0x5000, 0x6000, 32, site(4))
            .expect("update should succeed");
        assert_eq!(outcome, UpdateOutcome::UntrackedReplaced);
        assert!(s.lookup(0x6000).is_some());
    }

    #[test]
    fn diagnostic_release_flags_and_detects_double_release() {
        let mut s = store(TrackMode::Diagnostic);
        s.insert(AllocationEntry::new(0x1000, 64, site(1)))
            .expect("insert");

        s.remove_or_flag(0x1000, site(9)).expect("first release");
        let entry = s.lookup(0x1000).expect("entry is retained");
        assert!(entry.is_released);
        assert_eq!(entry.released_at, Some(site(9)));

        let second = s.remove_or_flag(0x1000, site(11));
        assert_eq!(
            second,
            Err(TrackError::DoubleRelease { address: 0x1000 })
        );
        // First-release provenance is preserved.
        assert_eq!(
            s.lookup(0x1000).expect("entry still there").released_at,
            Some(site(9))
        );
    }

    #[test]
    fn lean_release_deletes_the_entry() {
        let mut s = store(TrackMode::Lean);
        s.insert(AllocationEntry::new(0x1000, 64, site(1)))
            .expect("insert");
        s.remove_or_flag(0x1000, site(2)).expect("release");
        assert!(s.lookup(0x1000).is_none());
        assert_eq!(
            s.remove_or_flag(0x1000, site(3)),
            Err(TrackError::Untracked { address: 0x1000 })
        );
    }
}
