//! Call-site provenance.
//!
//! Every facade operation records where it was invoked from. The caller's
//! file and line are captured through `#[track_caller]`, which is the safe
//! equivalent of threading `__FILE__`/`__LINE__` arguments through every
//! wrapper.

use std::fmt;
use std::panic::Location;

/// The file and line a tracked operation was invoked from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallSite {
    /// Source file of the caller.
    pub file: &'static str,
    /// Line number of the caller.
    pub line: u32,
}

impl CallSite {
    /// Capture the call site of the nearest `#[track_caller]` caller.
    #[must_use]
    #[track_caller]
    pub fn caller() -> Self {
        let loc = Location::caller();
        Self {
            file: loc.file(),
            line: loc.line(),
        }
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caller_reports_this_file() {
        let site = CallSite::caller();
        assert!(site.file.ends_with("site.rs"), "file = {}", site.file);
        assert!(site.line > 0);
    }

    #[test]
    fn track_caller_propagates_through_wrappers() {
        #[track_caller]
        fn wrapper() -> CallSite {
            CallSite::caller()
        }
        let here = CallSite::caller();
        let via_wrapper = wrapper();
        assert_eq!(via_wrapper.file, here.file);
        assert_eq!(via_wrapper.line, here.line + 1);
    }
}
