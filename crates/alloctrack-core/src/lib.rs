//! # alloctrack-core
//!
//! Safe bookkeeping for the alloctrack allocation registry: overflow-checked
//! size arithmetic, the allocation entry data model with call-site
//! provenance, the thread-local diagnostics channel, the ragged N-d array
//! layout calculator, and report formatting.
//!
//! Nothing in this crate touches the platform allocator or any lock; those
//! live in the `alloctrack` crate. No `unsafe` code is permitted here.

pub mod arith;
pub mod diag;
pub mod entry;
pub mod ndlayout;
pub mod report;
pub mod site;

pub use diag::{Failure, TrackError};
pub use entry::AllocationEntry;
pub use ndlayout::NdLayout;
pub use site::CallSite;
