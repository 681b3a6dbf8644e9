//! Thin wrappers over the platform allocator.
//!
//! Everything here forwards to the C allocator via `libc`; the registry
//! never mutates its own state without one of these calls succeeding first.
//! The allocator is assumed thread-safe on its own -- the registry lock
//! protects registry consistency, not these calls.

use std::ffi::c_void;

/// Request `size` uninitialized bytes. Null on failure.
///
/// The caller has already rejected `size == 0`.
#[must_use]
pub fn malloc(size: usize) -> *mut u8 {
    // SAFETY: plain FFI allocation; a null result is handled by the caller.
    unsafe { libc::malloc(size).cast() }
}

/// Request `count * size` zero-initialized bytes. Null on failure.
#[must_use]
pub fn calloc(count: usize, size: usize) -> *mut u8 {
    // SAFETY: plain FFI allocation; calloc performs its own overflow check,
    // but callers validate through SizeArithmetic first anyway.
    unsafe { libc::calloc(count, size).cast() }
}

/// Request `size` bytes aligned to `alignment`. Null on failure.
///
/// The caller has already validated the alignment/size pair.
#[must_use]
pub fn aligned_alloc(alignment: usize, size: usize) -> *mut u8 {
    // SAFETY: plain FFI allocation with caller-validated parameters.
    unsafe { libc::aligned_alloc(alignment, size).cast() }
}

/// Resize the block at `ptr` to `size` bytes. Null on failure, in which case
/// the original block is untouched.
///
/// # Safety
///
/// `ptr` must be null or a live pointer obtained from this module, and must
/// not be used again if the resize succeeds at a new address.
#[must_use]
pub unsafe fn realloc(ptr: *mut u8, size: usize) -> *mut u8 {
    unsafe { libc::realloc(ptr.cast::<c_void>(), size).cast() }
}

/// Release the block at `ptr`.
///
/// # Safety
///
/// `ptr` must be a live pointer obtained from this module and must not be
/// used afterwards.
pub unsafe fn free(ptr: *mut u8) {
    unsafe { libc::free(ptr.cast::<c_void>()) }
}
