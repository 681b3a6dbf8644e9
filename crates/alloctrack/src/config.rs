//! Runtime mode configuration.
//!
//! The tracking mode is set via the `ALLOCTRACK_MODE` environment variable:
//! - `diagnostic` (default): entries are retained after release with their
//!   release call site, double releases are rejected and reported, and the
//!   exit audit prints one line per leak. This is the reference semantics.
//! - `lean`: entries are deleted on release and the exit audit force-releases
//!   survivors silently. A deliberately weaker, performance-oriented
//!   fallback -- double releases go undetected here.

use std::sync::OnceLock;

/// Operating mode of the allocation registry.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackMode {
    /// Full provenance, double-release detection, leak reporting.
    #[default]
    Diagnostic,
    /// Best-effort tracking: delete on release, silent audit.
    Lean,
}

impl TrackMode {
    /// Parse from string (case-insensitive).
    #[must_use]
    pub fn from_str_loose(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "lean" | "release" | "fast" => Self::Lean,
            _ => Self::Diagnostic,
        }
    }

    /// True if entries survive release for double-release detection.
    #[must_use]
    pub const fn retains_released_entries(self) -> bool {
        matches!(self, Self::Diagnostic)
    }
}

static GLOBAL_MODE: OnceLock<TrackMode> = OnceLock::new();

/// The configured mode (reads the env var on first call, caches thereafter).
#[must_use]
pub fn track_mode() -> TrackMode {
    *GLOBAL_MODE.get_or_init(|| {
        std::env::var("ALLOCTRACK_MODE")
            .map(|v| TrackMode::from_str_loose(&v))
            .unwrap_or_default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_modes() {
        assert_eq!(TrackMode::from_str_loose("lean"), TrackMode::Lean);
        assert_eq!(TrackMode::from_str_loose("LEAN"), TrackMode::Lean);
        assert_eq!(TrackMode::from_str_loose("fast"), TrackMode::Lean);
        assert_eq!(
            TrackMode::from_str_loose("diagnostic"),
            TrackMode::Diagnostic
        );
        assert_eq!(
            TrackMode::from_str_loose("anything-else"),
            TrackMode::Diagnostic
        );
    }

    #[test]
    fn diagnostic_retains_entries() {
        assert!(TrackMode::Diagnostic.retains_released_entries());
        assert!(!TrackMode::Lean.retains_released_entries());
    }
}
