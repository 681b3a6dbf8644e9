//! Aligned allocation family.
//!
//! The platform `aligned_alloc` contract applies throughout: the alignment is
//! a power of two at least as large as a pointer, and the size is a nonzero
//! multiple of the alignment. Aligned resizes never happen in place; the
//! facade allocates a new aligned block, copies the retained prefix, and
//! releases the old block.

use alloctrack_core::arith::{checked_array_size, validate_aligned_request};
use alloctrack_core::diag::{self, TrackError};
use alloctrack_core::CallSite;

use crate::metrics::TrackMetrics;
use crate::platform;
use crate::registry::RegistryGuard;

impl RegistryGuard<'_> {
    /// Allocate `size` bytes at the given alignment and track them.
    #[track_caller]
    pub fn aligned_alloc(&mut self, alignment: usize, size: usize) -> *mut u8 {
        self.aligned_alloc_impl("aligned_alloc", alignment, size, CallSite::caller())
    }

    /// Allocate `size` zeroed bytes at the given alignment.
    #[track_caller]
    pub fn aligned_zalloc(&mut self, alignment: usize, size: usize) -> *mut u8 {
        let site = CallSite::caller();
        let ptr = self.aligned_alloc_impl("aligned_zalloc", alignment, size, site);
        if !ptr.is_null() {
            // SAFETY: `size` bytes were just allocated at `ptr`.
            unsafe { ptr.write_bytes(0, size) };
        }
        ptr
    }

    /// Allocate `count * size` bytes at the given alignment, with
    /// overflow-checked arithmetic.
    #[track_caller]
    pub fn aligned_alloc_array(&mut self, alignment: usize, count: usize, size: usize) -> *mut u8 {
        let site = CallSite::caller();
        let op = "aligned_alloc_array";
        match checked_array_size(count, size) {
            Ok(total) => self.aligned_alloc_impl(op, alignment, total, site),
            Err(error) => self.fail_null(op, error),
        }
    }

    /// Move a tracked block to a fresh block of `size` bytes at the given
    /// alignment, preserving `min(old_size, size)` bytes of content.
    ///
    /// A null `ptr` behaves as `aligned_alloc`; `size == 0` releases the
    /// block and returns null. An untracked `ptr` is reported and replaced
    /// with a fresh allocation; its content cannot be carried over.
    #[track_caller]
    pub fn aligned_resize(&mut self, ptr: *mut u8, alignment: usize, size: usize) -> *mut u8 {
        self.aligned_resize_impl("aligned_resize", ptr, alignment, size, false, CallSite::caller())
    }

    /// `aligned_resize` with overflow-checked `count * size` arithmetic.
    #[track_caller]
    pub fn aligned_resize_array(
        &mut self,
        ptr: *mut u8,
        alignment: usize,
        count: usize,
        size: usize,
    ) -> *mut u8 {
        let site = CallSite::caller();
        let op = "aligned_resize_array";
        match checked_array_size(count, size) {
            Ok(total) => self.aligned_resize_impl(op, ptr, alignment, total, false, site),
            Err(error) => self.fail_null(op, error),
        }
    }

    /// `aligned_resize` that additionally zero-fills the grown tail.
    #[track_caller]
    pub fn aligned_zero_resize(&mut self, ptr: *mut u8, alignment: usize, size: usize) -> *mut u8 {
        self.aligned_resize_impl(
            "aligned_zero_resize",
            ptr,
            alignment,
            size,
            true,
            CallSite::caller(),
        )
    }

    /// `aligned_zero_resize` with overflow-checked `count * size` arithmetic.
    #[track_caller]
    pub fn aligned_zero_resize_array(
        &mut self,
        ptr: *mut u8,
        alignment: usize,
        count: usize,
        size: usize,
    ) -> *mut u8 {
        let site = CallSite::caller();
        let op = "aligned_zero_resize_array";
        match checked_array_size(count, size) {
            Ok(total) => self.aligned_resize_impl(op, ptr, alignment, total, true, site),
            Err(error) => self.fail_null(op, error),
        }
    }

    fn aligned_alloc_impl(
        &mut self,
        op: &'static str,
        alignment: usize,
        size: usize,
        site: CallSite,
    ) -> *mut u8 {
        if let Err(error) = validate_aligned_request(alignment, size) {
            return self.fail_null(op, error);
        }
        let ptr = platform::aligned_alloc(alignment, size);
        if ptr.is_null() {
            return self.fail_null(op, TrackError::PlatformFailure);
        }
        self.register_aligned(op, ptr, size, site);
        ptr
    }

    fn register_aligned(&mut self, op: &'static str, ptr: *mut u8, size: usize, site: CallSite) {
        self.register(op, ptr as usize, size, site);
        TrackMetrics::bump(&self.metrics().allocations);
    }

    fn aligned_resize_impl(
        &mut self,
        op: &'static str,
        ptr: *mut u8,
        alignment: usize,
        size: usize,
        zero_tail: bool,
        site: CallSite,
    ) -> *mut u8 {
        if ptr.is_null() {
            let fresh = self.aligned_alloc_impl(op, alignment, size, site);
            if !fresh.is_null() && zero_tail {
                // SAFETY: `size` bytes were just allocated at `fresh`.
                unsafe { fresh.write_bytes(0, size) };
            }
            return fresh;
        }
        if size == 0 {
            log::warn!("{op} to size 0 releases the block");
            self.release_impl(op, ptr, site);
            return std::ptr::null_mut();
        }
        if let Err(error) = validate_aligned_request(alignment, size) {
            return self.fail_null(op, error);
        }

        let address = ptr as usize;
        let Some(old_size) = self.store_lookup_size(address) else {
            // Foreign pointer: nothing to copy from, nothing we may free.
            diag::set_failure(op, TrackError::Untracked { address });
            TrackMetrics::bump(&self.metrics().foreign_reports);
            log::warn!("{op} of untracked address {address:#x}");
            let saved = diag::last_failure();
            let fresh = self.aligned_alloc_impl(op, alignment, size, site);
            if !fresh.is_null() {
                if zero_tail {
                    // SAFETY: `size` bytes were just allocated at `fresh`.
                    unsafe { fresh.write_bytes(0, size) };
                }
                diag::restore_failure(saved);
            }
            return fresh;
        };

        let new_ptr = platform::aligned_alloc(alignment, size);
        if new_ptr.is_null() {
            return self.fail_null(op, TrackError::PlatformFailure);
        }
        let retained = old_size.min(size);
        // SAFETY: `ptr` is a tracked live block of `old_size` bytes and
        // `new_ptr` a fresh block of `size` bytes; `retained` fits in both
        // and the blocks are distinct.
        unsafe { new_ptr.copy_from_nonoverlapping(ptr, retained) };
        if zero_tail && size > retained {
            // SAFETY: the tail `[retained, size)` is in bounds of `new_ptr`.
            unsafe { new_ptr.add(retained).write_bytes(0, size - retained) };
        }
        self.release_impl(op, ptr, site);
        self.register_aligned(op, new_ptr, size, site);
        TrackMetrics::bump(&self.metrics().resizes);
        new_ptr
    }
}
