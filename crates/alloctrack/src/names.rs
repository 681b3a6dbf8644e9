//! The four conventional allocator names, mapped onto the tracked facade.
//!
//! Opt-in (`posix-names` feature) for callers porting code written against
//! the usual `malloc`/`calloc`/`realloc`/`free` vocabulary. Semantics are
//! exactly those of the corresponding tracked operations, including the
//! diagnostics channel on failure.

use crate::global;

/// Tracked `malloc`. See [`alloc`](crate::alloc).
#[track_caller]
pub fn malloc(size: usize) -> *mut u8 {
    global::alloc(size)
}

/// Tracked `calloc`. See [`zalloc`](crate::zalloc).
#[track_caller]
pub fn calloc(count: usize, size: usize) -> *mut u8 {
    global::zalloc(count, size)
}

/// Tracked `realloc`, including the size-0-releases compatibility behavior.
/// See [`resize`](crate::resize).
#[track_caller]
pub fn realloc(ptr: *mut u8, size: usize) -> *mut u8 {
    global::resize(ptr, size)
}

/// Tracked `free`. See [`release`](crate::release).
#[track_caller]
pub fn free(ptr: *mut u8) {
    global::release(ptr);
}
