//! The process-wide registry singleton and the crate-level operation set.
//!
//! The singleton is constructed on first use in the mode selected by
//! `ALLOCTRACK_MODE`; construction also registers the exit-time leak audit,
//! exactly once, via `libc::atexit`. Each crate-level function acquires the
//! global lock for the duration of one operation, so they must never be
//! called while a [`RegistryGuard`](crate::RegistryGuard) is live on the
//! same thread.

use std::sync::OnceLock;

use crate::registry::Registry;

static REGISTRY: OnceLock<Registry> = OnceLock::new();

extern "C" fn exit_audit() {
    if let Some(registry) = REGISTRY.get() {
        let summary = registry.audit();
        if !summary.leaks.is_empty() {
            log::warn!(
                "exit audit force-released {} leaked allocation(s)",
                summary.leaks.len()
            );
        }
    }
}

/// The process-wide registry. Constructed on first use; the exit audit is
/// registered at the same time.
pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(|| {
        // SAFETY: `exit_audit` is a plain function registered to run during
        // normal process exit.
        if unsafe { libc::atexit(exit_audit) } != 0 {
            log::warn!("could not register the exit-time leak audit");
        }
        Registry::new()
    })
}

/// Allocate `size` bytes and track them. See [`RegistryGuard::alloc`](crate::RegistryGuard::alloc).
#[track_caller]
pub fn alloc(size: usize) -> *mut u8 {
    registry().lock().alloc(size)
}

/// Allocate `count * size` zeroed bytes and track them.
#[track_caller]
pub fn zalloc(count: usize, size: usize) -> *mut u8 {
    registry().lock().zalloc(count, size)
}

/// Resize a tracked block; `size == 0` releases it and returns null.
#[track_caller]
pub fn resize(ptr: *mut u8, size: usize) -> *mut u8 {
    registry().lock().resize(ptr, size)
}

/// Release a tracked block. Null is a no-op.
#[track_caller]
pub fn release(ptr: *mut u8) {
    registry().lock().release(ptr);
}

/// Resize to `count * size` bytes, zero-filling any grown tail.
#[track_caller]
pub fn zero_resize(ptr: *mut u8, count: usize, size: usize) -> *mut u8 {
    registry().lock().zero_resize(ptr, count, size)
}

/// The tracked size of the block at `ptr`, or 0 if it is not tracked.
pub fn size_of(ptr: *const u8) -> usize {
    registry().lock().size_of(ptr)
}

/// Allocate `count * size` bytes with overflow-checked arithmetic.
#[track_caller]
pub fn alloc_array(count: usize, size: usize) -> *mut u8 {
    registry().lock().alloc_array(count, size)
}

/// Allocate `count * size` zeroed bytes with overflow-checked arithmetic.
#[track_caller]
pub fn zalloc_array(count: usize, size: usize) -> *mut u8 {
    registry().lock().zalloc_array(count, size)
}

/// Resize to `count * size` bytes; a zero extent releases the block.
#[track_caller]
pub fn resize_array(ptr: *mut u8, count: usize, size: usize) -> *mut u8 {
    registry().lock().resize_array(ptr, count, size)
}

/// `resize_array` that zero-fills any grown tail.
#[track_caller]
pub fn zero_resize_array(ptr: *mut u8, count: usize, size: usize) -> *mut u8 {
    registry().lock().zero_resize_array(ptr, count, size)
}

/// Allocate `size` bytes at the given alignment.
#[track_caller]
pub fn aligned_alloc(alignment: usize, size: usize) -> *mut u8 {
    registry().lock().aligned_alloc(alignment, size)
}

/// Allocate `size` zeroed bytes at the given alignment.
#[track_caller]
pub fn aligned_zalloc(alignment: usize, size: usize) -> *mut u8 {
    registry().lock().aligned_zalloc(alignment, size)
}

/// Allocate `count * size` bytes at the given alignment.
#[track_caller]
pub fn aligned_alloc_array(alignment: usize, count: usize, size: usize) -> *mut u8 {
    registry().lock().aligned_alloc_array(alignment, count, size)
}

/// Move a tracked block to a fresh aligned block, preserving content.
#[track_caller]
pub fn aligned_resize(ptr: *mut u8, alignment: usize, size: usize) -> *mut u8 {
    registry().lock().aligned_resize(ptr, alignment, size)
}

/// `aligned_resize` with overflow-checked `count * size` arithmetic.
#[track_caller]
pub fn aligned_resize_array(ptr: *mut u8, alignment: usize, count: usize, size: usize) -> *mut u8 {
    registry()
        .lock()
        .aligned_resize_array(ptr, alignment, count, size)
}

/// `aligned_resize` that zero-fills the grown tail.
#[track_caller]
pub fn aligned_zero_resize(ptr: *mut u8, alignment: usize, size: usize) -> *mut u8 {
    registry().lock().aligned_zero_resize(ptr, alignment, size)
}

/// `aligned_zero_resize` with overflow-checked `count * size` arithmetic.
#[track_caller]
pub fn aligned_zero_resize_array(
    ptr: *mut u8,
    alignment: usize,
    count: usize,
    size: usize,
) -> *mut u8 {
    registry()
        .lock()
        .aligned_zero_resize_array(ptr, alignment, count, size)
}

/// Allocate and track a ragged N-d array; see [`RegistryGuard::alloc_nd`](crate::RegistryGuard::alloc_nd).
#[track_caller]
pub fn alloc_nd(elem_size: usize, dims: &[usize]) -> *mut u8 {
    registry().lock().alloc_nd(elem_size, dims)
}

/// `alloc_nd` with a zeroed payload.
#[track_caller]
pub fn zalloc_nd(elem_size: usize, dims: &[usize]) -> *mut u8 {
    registry().lock().zalloc_nd(elem_size, dims)
}

/// Release an N-d array allocated by [`alloc_nd`] or [`zalloc_nd`].
#[track_caller]
pub fn release_nd(ptr: *mut u8) {
    registry().lock().release_nd(ptr);
}

/// Duplicate at most `max_bytes` of `source` into a tracked NUL-terminated
/// block.
#[track_caller]
pub fn strndup(source: &[u8], max_bytes: usize) -> *mut u8 {
    registry().lock().strndup(source, max_bytes)
}

/// Render every tracked entry of the process-wide registry.
pub fn dump() -> String {
    registry().lock().dump()
}
