//! Overflow-checked size arithmetic.
//!
//! Every allocating entry point validates its size computation here before
//! the platform allocator is ever asked for memory. Failures never partially
//! compute a result.

use crate::diag::TrackError;

/// Validated `count * size` for array allocations.
///
/// Rejects a zero count, a zero size, and any product that does not fit in
/// `usize`.
pub fn checked_array_size(count: usize, size: usize) -> Result<usize, TrackError> {
    if count == 0 {
        return Err(TrackError::ZeroCount);
    }
    if size == 0 {
        return Err(TrackError::ZeroSize);
    }
    count
        .checked_mul(size)
        .ok_or(TrackError::Overflow { count, size })
}

/// Validate an alignment/size pair for the aligned allocation family.
///
/// The alignment must be a power of two at least as large as a native
/// pointer, and the size must be a nonzero multiple of the alignment.
pub fn validate_aligned_request(alignment: usize, size: usize) -> Result<(), TrackError> {
    if !alignment.is_power_of_two() {
        return Err(TrackError::AlignmentNotPowerOfTwo { alignment });
    }
    if alignment < std::mem::size_of::<*const ()>() {
        return Err(TrackError::AlignmentTooSmall { alignment });
    }
    if size == 0 {
        return Err(TrackError::ZeroSize);
    }
    if size % alignment != 0 {
        return Err(TrackError::SizeNotAligned { size, alignment });
    }
    Ok(())
}

/// Round `value` up to the nearest multiple of `alignment`.
///
/// Returns `None` on overflow. An alignment of 0 or 1 leaves the value
/// unchanged. Non-power-of-two alignments take the division path.
#[must_use]
pub fn align_up(value: usize, alignment: usize) -> Option<usize> {
    if alignment <= 1 {
        return Some(value);
    }
    let bumped = value.checked_add(alignment - 1)?;
    if alignment.is_power_of_two() {
        Some(bumped & !(alignment - 1))
    } else {
        Some(bumped / alignment * alignment)
    }
}
