//! # alloctrack
//!
//! An instrumented allocation registry: a drop-in facade over the platform
//! allocator that records every live allocation's address, size, and call
//! site, detects double releases and foreign pointers, and audits leaks at
//! process exit.
//!
//! The registry is opt-in: calling code invokes the named operations below
//! (or methods on a [`RegistryGuard`]); nothing is intercepted behind the
//! caller's back. All registry state is serialized behind one global lock --
//! an accepted scalability trade-off, so keep critical sections short and
//! never nest the lock-acquiring forms.
//!
//! ```no_run
//! let p = alloctrack::alloc(64);
//! assert_eq!(alloctrack::size_of(p), 64);
//! alloctrack::release(p);
//! ```
//!
//! Failures return null (or 0 for size queries) and record the failing
//! operation and error on the thread-local diagnostics channel; see
//! [`last_failure`].

pub mod config;
#[cfg(feature = "tracking")]
pub mod lock;
pub mod platform;
pub mod untracked;

#[cfg(feature = "tracking")]
mod aligned;
#[cfg(feature = "tracking")]
mod global;
#[cfg(feature = "tracking")]
mod metrics;
#[cfg(feature = "tracking")]
mod nd;
#[cfg(feature = "tracking")]
pub mod registry;
#[cfg(feature = "tracking")]
mod strdup;

#[cfg(feature = "posix-names")]
pub mod names;

pub use alloctrack_core::diag::{last_failure, Failure, TrackError};
pub use alloctrack_core::{AllocationEntry, CallSite, NdLayout};
pub use config::TrackMode;

#[cfg(feature = "tracking")]
pub use global::{
    aligned_alloc, aligned_alloc_array, aligned_resize, aligned_resize_array, aligned_zalloc,
    aligned_zero_resize, aligned_zero_resize_array, alloc, alloc_array, alloc_nd, dump, registry,
    release, release_nd, resize, resize_array, size_of, strndup, zalloc, zalloc_array, zalloc_nd,
    zero_resize, zero_resize_array,
};
#[cfg(feature = "tracking")]
pub use metrics::MetricsSnapshot;
#[cfg(feature = "tracking")]
pub use registry::{AuditSummary, Registry, RegistryGuard};
