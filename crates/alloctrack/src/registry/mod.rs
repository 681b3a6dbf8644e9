//! The allocation registry.
//!
//! A [`Registry`] bundles the entry store, the global lock that serializes
//! every operation on it, the configured tracking mode, and operation
//! counters. Callers take a [`RegistryGuard`] with [`Registry::lock`] and run
//! facade operations on the guard; the lock is held for the guard's lifetime,
//! so guard methods must never be nested or re-entered on the same thread.
//!
//! The process-wide singleton with its exit-time audit lives in the crate's
//! `global` module; standalone registries (as constructed in tests) audit on
//! demand via [`Registry::audit`].

mod store;

use std::cell::UnsafeCell;
use std::fmt::Write as _;

use alloctrack_core::arith::checked_array_size;
use alloctrack_core::diag::{self, TrackError};
use alloctrack_core::{report, AllocationEntry, CallSite};

use crate::config::{track_mode, TrackMode};
use crate::lock::GlobalLock;
use crate::metrics::{MetricsSnapshot, TrackMetrics};
use crate::platform;

use store::{EntryStore, UpdateOutcome};

/// An instrumented allocation registry.
pub struct Registry {
    mode: TrackMode,
    lock: GlobalLock,
    state: UnsafeCell<Option<EntryStore>>,
    metrics: TrackMetrics,
}

// SAFETY: `state` is only ever dereferenced while `lock` is held, either by a
// live `RegistryGuard` or inside `audit`, so access is serialized.
unsafe impl Send for Registry {}
unsafe impl Sync for Registry {}

impl Registry {
    /// A registry in the mode selected by `ALLOCTRACK_MODE`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_mode(track_mode())
    }

    /// A registry in an explicit mode, ignoring the environment.
    #[must_use]
    pub const fn with_mode(mode: TrackMode) -> Self {
        Self {
            mode,
            lock: GlobalLock::new(),
            state: UnsafeCell::new(None),
            metrics: TrackMetrics::new(),
        }
    }

    #[must_use]
    pub fn mode(&self) -> TrackMode {
        self.mode
    }

    /// Acquire the global lock and return the operation facade.
    pub fn lock(&self) -> RegistryGuard<'_> {
        self.lock.acquire();
        RegistryGuard { registry: self }
    }

    /// Point-in-time copy of the operation counters.
    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Final audit: report every never-released entry, force-release the
    /// memory behind it, drop the store, and tear down the lock.
    ///
    /// In diagnostic mode each leak is logged with its allocation provenance
    /// and collected into the summary; in lean mode leaked memory is released
    /// silently. The registry is unusable afterwards.
    pub fn audit(&self) -> AuditSummary {
        self.lock.acquire();
        // SAFETY: the lock is held; see the Sync impl.
        let state = unsafe { &mut *self.state.get() };
        let mut summary = AuditSummary::default();

        if let Some(entry_store) = state.as_ref() {
            match entry_store.snapshot() {
                Ok(entries) => {
                    for entry in entries {
                        if entry.is_released {
                            continue;
                        }
                        if self.mode.retains_released_entries() {
                            log::warn!("{}", report::leak_line(&entry));
                            TrackMetrics::bump(&self.metrics.leaked_at_audit);
                            summary.leaks.push(entry);
                        }
                        // SAFETY: a live entry is a block this registry
                        // allocated and never released, so ownership is ours
                        // to return.
                        unsafe { platform::free(entry.address as *mut u8) };
                        summary.force_released += 1;
                    }
                }
                Err(error) => log::error!("exit audit could not snapshot entries: {error}"),
            }
        }

        *state = None;
        self.lock.release();
        self.lock.teardown();
        summary
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of [`Registry::audit`].
#[derive(Debug, Default)]
pub struct AuditSummary {
    /// Never-released entries, with provenance (diagnostic mode only).
    pub leaks: Vec<AllocationEntry>,
    /// How many live blocks the audit returned to the platform.
    pub force_released: usize,
}

/// Holds the global lock and exposes the facade operations.
///
/// Every pointer-returning method returns null on failure and records the
/// failing operation on the thread-local diagnostics channel.
pub struct RegistryGuard<'a> {
    registry: &'a Registry,
}

impl Drop for RegistryGuard<'_> {
    fn drop(&mut self) {
        self.registry.lock.release();
    }
}

impl RegistryGuard<'_> {
    /// Allocate `size` bytes and track them.
    #[track_caller]
    pub fn alloc(&mut self, size: usize) -> *mut u8 {
        self.alloc_impl("alloc", size, CallSite::caller())
    }

    /// Allocate `count * size` zeroed bytes and track them.
    #[track_caller]
    pub fn zalloc(&mut self, count: usize, size: usize) -> *mut u8 {
        self.zalloc_impl("zalloc", count, size, CallSite::caller())
    }

    /// Resize a tracked block. `size == 0` releases the block and returns
    /// null; a null `ptr` behaves as a fresh allocation.
    #[track_caller]
    pub fn resize(&mut self, ptr: *mut u8, size: usize) -> *mut u8 {
        self.resize_impl("resize", ptr, size, CallSite::caller())
    }

    /// Release a tracked block. Null is a no-op.
    #[track_caller]
    pub fn release(&mut self, ptr: *mut u8) {
        self.release_impl("release", ptr, CallSite::caller());
    }

    /// Resize a tracked block and zero-fill any grown tail.
    ///
    /// Only the bytes in `[old_size, count * size)` are zeroed; the retained
    /// prefix is untouched. A null `ptr` behaves as `zalloc_array`. An
    /// untracked `ptr` is reported, its stray tracking (if any) is dropped,
    /// and a fresh zeroed allocation is returned instead.
    #[track_caller]
    pub fn zero_resize(&mut self, ptr: *mut u8, count: usize, size: usize) -> *mut u8 {
        self.zero_resize_impl("zero_resize", ptr, count, size, CallSite::caller())
    }

    /// Allocate `count * size` bytes with overflow-checked arithmetic.
    #[track_caller]
    pub fn alloc_array(&mut self, count: usize, size: usize) -> *mut u8 {
        let site = CallSite::caller();
        let op = "alloc_array";
        match checked_array_size(count, size) {
            Ok(total) => self.alloc_impl(op, total, site),
            Err(error) => self.fail_null(op, error),
        }
    }

    /// Allocate `count * size` zeroed bytes with overflow-checked arithmetic.
    #[track_caller]
    pub fn zalloc_array(&mut self, count: usize, size: usize) -> *mut u8 {
        self.zalloc_impl("zalloc_array", count, size, CallSite::caller())
    }

    /// Resize to `count * size` bytes with overflow-checked arithmetic.
    /// A zero `count` or `size` releases the block and returns null.
    #[track_caller]
    pub fn resize_array(&mut self, ptr: *mut u8, count: usize, size: usize) -> *mut u8 {
        self.resize_array_impl("resize_array", ptr, count, size, CallSite::caller())
    }

    /// Resize to `count * size` bytes, zero-filling any grown tail.
    #[track_caller]
    pub fn zero_resize_array(&mut self, ptr: *mut u8, count: usize, size: usize) -> *mut u8 {
        self.zero_resize_impl("zero_resize_array", ptr, count, size, CallSite::caller())
    }

    /// The tracked size of the block at `ptr`, or 0 if it is not tracked.
    pub fn size_of(&mut self, ptr: *const u8) -> usize {
        let op = "size_of";
        let address = ptr as usize;
        if address == 0 {
            diag::set_failure(op, TrackError::NullAddress);
            TrackMetrics::bump(&self.registry.metrics.failed_operations);
            return 0;
        }
        match self.store().lookup(address) {
            Some(entry) => entry.size,
            None => {
                diag::set_failure(op, TrackError::Untracked { address });
                TrackMetrics::bump(&self.registry.metrics.failed_operations);
                0
            }
        }
    }

    /// Render every tracked entry, with call sites in diagnostic mode.
    pub fn dump(&mut self) -> String {
        let detailed = self.registry.mode.retains_released_entries();
        let mut out = String::new();
        match self.store().snapshot() {
            Ok(mut entries) => {
                entries.sort_by_key(|entry| entry.address);
                let _ = report::write_entries(&mut out, &entries, detailed);
            }
            Err(error) => {
                diag::set_failure("dump", error);
                let _ = writeln!(out, "tracked entries unavailable: {error}");
            }
        }
        out
    }

    /// Number of entries currently in the store. In diagnostic mode this
    /// includes released entries retained for double-release detection.
    pub fn tracked_entries(&mut self) -> usize {
        self.store().len()
    }

    // ---- internals -----------------------------------------------------

    /// Lazily construct the entry store. Failure to construct it means no
    /// allocation can ever be tracked, which is fatal.
    fn store(&mut self) -> &mut EntryStore {
        // SAFETY: the guard holds the global lock for its lifetime, so this
        // is the only live reference into the registry state.
        let state = unsafe { &mut *self.registry.state.get() };
        if state.is_none() {
            match EntryStore::create(self.registry.mode) {
                Ok(entry_store) => *state = Some(entry_store),
                Err(error) => {
                    eprintln!("alloctrack: cannot initialize the allocation registry: {error}");
                    std::process::abort();
                }
            }
        }
        state.as_mut().expect("store was just initialized")
    }

    pub(crate) fn metrics(&self) -> &TrackMetrics {
        &self.registry.metrics
    }

    /// Size of the live entry at `address`, if one exists. Released entries
    /// retained in diagnostic mode do not count.
    pub(crate) fn store_lookup_size(&mut self, address: usize) -> Option<usize> {
        self.store()
            .lookup(address)
            .filter(|entry| !entry.is_released)
            .map(|entry| entry.size)
    }

    pub(crate) fn fail_null(&mut self, op: &'static str, error: TrackError) -> *mut u8 {
        diag::set_failure(op, error);
        TrackMetrics::bump(&self.registry.metrics.failed_operations);
        log::debug!("{op} failed: {error}");
        std::ptr::null_mut()
    }

    pub(crate) fn register(&mut self, op: &'static str, address: usize, size: usize, site: CallSite) {
        let entry = AllocationEntry::new(address, size, site);
        if let Err(error) = self.store().insert(entry) {
            diag::set_failure(op, error);
            log::warn!("allocation {address:#x} ({size} bytes) is untracked: {error}");
        }
    }

    pub(crate) fn alloc_impl(&mut self, op: &'static str, size: usize, site: CallSite) -> *mut u8 {
        if size == 0 {
            return self.fail_null(op, TrackError::ZeroSize);
        }
        let ptr = platform::malloc(size);
        if ptr.is_null() {
            return self.fail_null(op, TrackError::PlatformFailure);
        }
        self.register(op, ptr as usize, size, site);
        TrackMetrics::bump(&self.registry.metrics.allocations);
        ptr
    }

    pub(crate) fn zalloc_impl(
        &mut self,
        op: &'static str,
        count: usize,
        size: usize,
        site: CallSite,
    ) -> *mut u8 {
        let total = match checked_array_size(count, size) {
            Ok(total) => total,
            Err(error) => return self.fail_null(op, error),
        };
        let ptr = platform::calloc(count, size);
        if ptr.is_null() {
            return self.fail_null(op, TrackError::PlatformFailure);
        }
        self.register(op, ptr as usize, total, site);
        TrackMetrics::bump(&self.registry.metrics.allocations);
        ptr
    }

    pub(crate) fn resize_impl(
        &mut self,
        op: &'static str,
        ptr: *mut u8,
        size: usize,
        site: CallSite,
    ) -> *mut u8 {
        if size == 0 {
            // Resize-to-zero is release-in-disguise; call it out because
            // callers rarely mean it.
            log::warn!("{op} to size 0 releases the block");
            self.release_impl(op, ptr, site);
            return std::ptr::null_mut();
        }
        // SAFETY: `ptr` is either null or a block obtained from the platform
        // allocator through this facade.
        let new_ptr = unsafe { platform::realloc(ptr, size) };
        if new_ptr.is_null() {
            return self.fail_null(op, TrackError::PlatformFailure);
        }
        match self.store().update(ptr as usize, new_ptr as usize, size, site) {
            Ok(UpdateOutcome::UntrackedReplaced) => {
                let address = ptr as usize;
                diag::set_failure(op, TrackError::Untracked { address });
                TrackMetrics::bump(&self.registry.metrics.foreign_reports);
                log::warn!("{op} of untracked address {address:#x}; now tracking the result");
            }
            Ok(_) => {}
            Err(error) => {
                diag::set_failure(op, error);
                log::warn!("{op} result {:#x} is untracked: {error}", new_ptr as usize);
            }
        }
        // Resizing from null is a fresh allocation, not a resize.
        if ptr.is_null() {
            TrackMetrics::bump(&self.registry.metrics.allocations);
        } else {
            TrackMetrics::bump(&self.registry.metrics.resizes);
        }
        new_ptr
    }

    pub(crate) fn resize_array_impl(
        &mut self,
        op: &'static str,
        ptr: *mut u8,
        count: usize,
        size: usize,
        site: CallSite,
    ) -> *mut u8 {
        if count == 0 || size == 0 {
            log::warn!("{op} to a zero extent releases the block");
            self.release_impl(op, ptr, site);
            return std::ptr::null_mut();
        }
        match checked_array_size(count, size) {
            Ok(total) => self.resize_impl(op, ptr, total, site),
            Err(error) => self.fail_null(op, error),
        }
    }

    pub(crate) fn release_impl(&mut self, op: &'static str, ptr: *mut u8, site: CallSite) {
        if ptr.is_null() {
            return;
        }
        let address = ptr as usize;
        let metrics = &self.registry.metrics;

        if self.registry.mode.retains_released_entries() {
            // Diagnostic mode refuses to touch memory it cannot vouch for:
            // the check runs before the platform free.
            match self.store().check_releasable(address) {
                Ok(()) => {}
                Err(error @ TrackError::DoubleRelease { .. }) => {
                    diag::set_failure(op, error);
                    TrackMetrics::bump(&metrics.double_release_reports);
                    log::warn!("{op}: {error}");
                    return;
                }
                Err(error) => {
                    diag::set_failure(op, error);
                    TrackMetrics::bump(&metrics.foreign_reports);
                    log::warn!("{op}: {error}");
                    return;
                }
            }
            // SAFETY: the entry is tracked and live, so the block is ours to
            // return to the platform.
            unsafe { platform::free(ptr) };
            if let Err(error) = self.store().remove_or_flag(address, site) {
                // check_releasable just passed; only a store fault gets here.
                log::warn!("{op}: released {address:#x} but could not record it: {error}");
            }
        } else {
            // Lean mode frees unconditionally and tidies bookkeeping after.
            // SAFETY: callers own the pointers they hand to release.
            unsafe { platform::free(ptr) };
            if let Err(error) = self.store().remove_or_flag(address, site) {
                diag::set_failure(op, error);
                TrackMetrics::bump(&metrics.foreign_reports);
                log::warn!("{op}: {error}");
            }
        }
        TrackMetrics::bump(&metrics.releases);
    }

    pub(crate) fn zero_resize_impl(
        &mut self,
        op: &'static str,
        ptr: *mut u8,
        count: usize,
        size: usize,
        site: CallSite,
    ) -> *mut u8 {
        if ptr.is_null() {
            return self.zalloc_impl(op, count, size, site);
        }

        let address = ptr as usize;
        let old_size = self.store_lookup_size(address).unwrap_or(0);
        if old_size == 0 {
            // Foreign pointer. Report it, drop any stray tracking, and hand
            // back a fresh zeroed allocation; the foreign block itself is
            // not ours to touch.
            diag::set_failure(op, TrackError::Untracked { address });
            TrackMetrics::bump(&self.registry.metrics.foreign_reports);
            log::warn!("{op} of untracked address {address:#x}");
            let _ = self.store().remove_or_flag(address, site);
            if count == 0 || size == 0 {
                return std::ptr::null_mut();
            }
            let saved = diag::last_failure();
            let fresh = self.zalloc_impl(op, count, size, site);
            if !fresh.is_null() {
                diag::restore_failure(saved);
            }
            return fresh;
        }

        let new_ptr = self.resize_array_impl(op, ptr, count, size, site);
        if new_ptr.is_null() {
            return new_ptr;
        }
        let new_size = match checked_array_size(count, size) {
            Ok(total) => total,
            // resize_array_impl already vetted the product.
            Err(_) => return new_ptr,
        };
        if new_size > old_size {
            // SAFETY: `new_ptr` points to a block of at least `new_size`
            // bytes, so the grown tail `[old_size, new_size)` is in bounds.
            unsafe { new_ptr.add(old_size).write_bytes(0, new_size - old_size) };
        }
        new_ptr
    }
}
