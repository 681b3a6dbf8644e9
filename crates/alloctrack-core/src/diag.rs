//! Thread-local diagnostics channel.
//!
//! Every failing operation records its name and a [`TrackError`] here before
//! returning its failure value, so a caller that only sees a null pointer can
//! still ask what went wrong. The channel is thread-local in the spirit of
//! `errno`: failures on one thread never clobber another thread's view.

use std::cell::Cell;
use thiserror::Error;

/// Everything that can go wrong inside the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TrackError {
    /// A zero size was passed where a nonzero size is required.
    #[error("size must be nonzero")]
    ZeroSize,
    /// A zero element count was passed where a nonzero count is required.
    #[error("count must be nonzero")]
    ZeroCount,
    /// `count * size` does not fit in `usize`.
    #[error("allocation size overflow: {count} * {size}")]
    Overflow { count: usize, size: usize },
    /// The alignment is not a power of two.
    #[error("alignment {alignment} is not a power of two")]
    AlignmentNotPowerOfTwo { alignment: usize },
    /// The alignment is smaller than a native pointer.
    #[error("alignment {alignment} is smaller than a pointer")]
    AlignmentTooSmall { alignment: usize },
    /// The requested size is not a nonzero multiple of the alignment.
    #[error("size {size} is not a nonzero multiple of alignment {alignment}")]
    SizeNotAligned { size: usize, alignment: usize },
    /// No dimensions were supplied for an N-d array.
    #[error("no dimensions given")]
    NoDimensions,
    /// A dimension of an N-d array is zero.
    #[error("dimension {index} is zero")]
    ZeroDimension { index: usize },
    /// A null address was passed where a tracked address is required.
    #[error("null address")]
    NullAddress,
    /// The platform allocator returned null.
    #[error("platform allocator returned null")]
    PlatformFailure,
    /// The address has no registry entry (foreign memory).
    #[error("address {address:#x} is not tracked")]
    Untracked { address: usize },
    /// The address was already released (diagnostic mode only).
    #[error("address {address:#x} was already released")]
    DoubleRelease { address: usize },
    /// The backing store rejected an insert, delete, or snapshot.
    #[error("registry store rejected the operation")]
    StoreFailure,
    /// String duplication failed.
    #[error("string duplication failed")]
    DuplicationFailure,
}

/// A recorded failure: the facade operation that failed and why.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Failure {
    /// Name of the facade operation, e.g. `"alloc"` or `"resize_array"`.
    pub operation: &'static str,
    /// What went wrong.
    pub error: TrackError,
}

thread_local! {
    static LAST_FAILURE: Cell<Option<Failure>> = const { Cell::new(None) };
}

/// Record a failure for the current thread.
pub fn set_failure(operation: &'static str, error: TrackError) {
    LAST_FAILURE.set(Some(Failure { operation, error }));
}

/// The most recent failure on this thread, if any.
#[must_use]
pub fn last_failure() -> Option<Failure> {
    LAST_FAILURE.get()
}

/// Clear the failure channel for the current thread.
pub fn clear_failure() {
    LAST_FAILURE.set(None);
}

/// Restore a previously saved channel state.
///
/// Used by operations that internally run failing sub-operations whose
/// failure is not user-visible: save before, restore after, so the caller
/// never observes the transient state.
pub fn restore_failure(saved: Option<Failure>) {
    LAST_FAILURE.set(saved);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_round_trip() {
        clear_failure();
        assert_eq!(last_failure(), None);

        set_failure("alloc", TrackError::ZeroSize);
        let failure = last_failure().expect("failure should be recorded");
        assert_eq!(failure.operation, "alloc");
        assert_eq!(failure.error, TrackError::ZeroSize);

        clear_failure();
        assert_eq!(last_failure(), None);
    }

    #[test]
    fn restore_hides_transient_failure() {
        clear_failure();
        set_failure("resize", TrackError::PlatformFailure);
        let saved = last_failure();

        set_failure("size_of", TrackError::Untracked { address: 0x10 });
        restore_failure(saved);

        let failure = last_failure().expect("saved failure should be restored");
        assert_eq!(failure.operation, "resize");
    }

    #[test]
    fn failures_are_thread_local() {
        clear_failure();
        set_failure("alloc", TrackError::PlatformFailure);

        std::thread::spawn(|| {
            assert_eq!(last_failure(), None);
        })
        .join()
        .expect("thread should not panic");

        assert!(last_failure().is_some());
    }
}
