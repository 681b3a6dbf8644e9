//! Tracked bounded string duplication.

use alloctrack_core::diag::{self, TrackError};
use alloctrack_core::CallSite;

use crate::registry::RegistryGuard;

impl RegistryGuard<'_> {
    /// Duplicate at most `max_bytes` of `source` into a tracked,
    /// NUL-terminated block.
    ///
    /// Copying stops at the first NUL in `source` or after `max_bytes`
    /// bytes, whichever comes first; the duplicate always carries a trailing
    /// NUL and is registered with its full byte size. Returns null on
    /// allocation failure.
    #[track_caller]
    pub fn strndup(&mut self, source: &[u8], max_bytes: usize) -> *mut u8 {
        let op = "strndup";
        let site = CallSite::caller();
        let len = source
            .iter()
            .position(|&byte| byte == 0)
            .unwrap_or(source.len())
            .min(max_bytes);

        let dup = self.alloc_impl(op, len + 1, site);
        if dup.is_null() {
            diag::set_failure(op, TrackError::DuplicationFailure);
            return dup;
        }
        // SAFETY: `len + 1` bytes were just allocated at `dup` and `source`
        // holds at least `len` readable bytes.
        unsafe {
            dup.copy_from_nonoverlapping(source.as_ptr(), len);
            dup.add(len).write(0);
        }
        dup
    }
}
