//! Plain overflow-checked allocation helpers with no registry involvement.
//!
//! These carry the same checked `count * size` arithmetic as the tracked
//! array operations but talk straight to the platform allocator. They are
//! the whole surface of a `--no-default-features` build and remain available
//! alongside the registry otherwise.

use alloctrack_core::arith::checked_array_size;
use alloctrack_core::diag::{self, TrackError};

use crate::platform;

/// `count * size` bytes from the platform allocator, overflow-checked.
pub fn malloc_array(count: usize, size: usize) -> *mut u8 {
    let total = match checked_array_size(count, size) {
        Ok(total) => total,
        Err(error) => {
            diag::set_failure("malloc_array", error);
            return std::ptr::null_mut();
        }
    };
    let ptr = platform::malloc(total);
    if ptr.is_null() {
        diag::set_failure("malloc_array", TrackError::PlatformFailure);
    }
    ptr
}

/// `count * size` zeroed bytes from the platform allocator, overflow-checked.
pub fn calloc_array(count: usize, size: usize) -> *mut u8 {
    if let Err(error) = checked_array_size(count, size) {
        diag::set_failure("calloc_array", error);
        return std::ptr::null_mut();
    }
    let ptr = platform::calloc(count, size);
    if ptr.is_null() {
        diag::set_failure("calloc_array", TrackError::PlatformFailure);
    }
    ptr
}

/// Overflow-checked `realloc` to `count * size` bytes.
///
/// A zero extent frees the block and returns null, matching the tracked
/// resize family.
///
/// # Safety
/// `ptr` must be null or a block obtained from this module or the platform
/// allocator, not yet freed.
pub unsafe fn realloc_array(ptr: *mut u8, count: usize, size: usize) -> *mut u8 {
    if count == 0 || size == 0 {
        platform::free(ptr);
        return std::ptr::null_mut();
    }
    let total = match checked_array_size(count, size) {
        Ok(total) => total,
        Err(error) => {
            diag::set_failure("realloc_array", error);
            return std::ptr::null_mut();
        }
    };
    let new_ptr = platform::realloc(ptr, total);
    if new_ptr.is_null() {
        diag::set_failure("realloc_array", TrackError::PlatformFailure);
    }
    new_ptr
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloctrack_core::diag::{clear_failure, last_failure};

    #[test]
    fn overflow_is_rejected_before_the_platform_call() {
        clear_failure();
        assert!(malloc_array(usize::MAX, 2).is_null());
        assert!(matches!(
            last_failure().map(|f| f.error),
            Some(TrackError::Overflow { .. })
        ));
    }

    #[test]
    fn calloc_array_zeroes() {
        let ptr = calloc_array(8, 4);
        assert!(!ptr.is_null());
        for offset in 0..32 {
            // SAFETY: 32 bytes were just allocated at `ptr`.
            assert_eq!(unsafe { *ptr.add(offset) }, 0);
        }
        // SAFETY: allocated above, freed once.
        unsafe { platform::free(ptr) };
    }

    #[test]
    fn realloc_array_zero_extent_frees() {
        let ptr = malloc_array(4, 4);
        assert!(!ptr.is_null());
        // SAFETY: `ptr` was just allocated.
        let out = unsafe { realloc_array(ptr, 0, 4) };
        assert!(out.is_null());
    }
}
