//! The allocation entry data model.

use crate::site::CallSite;

/// One live (or, in diagnostic mode, historically live) allocation.
///
/// The address is the registry key and is never 0. In lean mode an entry is
/// deleted the moment its allocation is released; in diagnostic mode it is
/// retained and flagged so later releases of the same address can be called
/// out as double releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationEntry {
    /// Address of the tracked block; unique among live entries.
    pub address: usize,
    /// Byte count currently attributed to this allocation.
    pub size: usize,
    /// Where the block was allocated.
    pub allocated_at: CallSite,
    /// Where the block was last resized, if ever.
    pub last_resized_at: Option<CallSite>,
    /// Where the block was released (diagnostic mode only).
    pub released_at: Option<CallSite>,
    /// Whether the block has been released (diagnostic mode only).
    pub is_released: bool,
}

impl AllocationEntry {
    /// A fresh entry for a newly allocated block.
    #[must_use]
    pub fn new(address: usize, size: usize, allocated_at: CallSite) -> Self {
        Self {
            address,
            size,
            allocated_at,
            last_resized_at: None,
            released_at: None,
            is_released: false,
        }
    }

    /// The successor entry after a relocating resize: new address and size,
    /// resize provenance updated, allocation and release provenance carried
    /// forward from `self`.
    #[must_use]
    pub fn relocated(&self, new_address: usize, new_size: usize, resized_at: CallSite) -> Self {
        Self {
            address: new_address,
            size: new_size,
            allocated_at: self.allocated_at,
            last_resized_at: Some(resized_at),
            released_at: self.released_at,
            is_released: self.is_released,
        }
    }
}
