//! Ragged N-dimensional array family.
//!
//! An N-d array lives in one tracked block laid out by
//! [`NdLayout`]: the pointer tables for every non-leaf level come first,
//! level by level, then (after alignment padding) the payload elements. The
//! returned pointer is the block base, which doubles as the outermost pointer
//! table, so a 2-d `alloc_nd` result can be walked as `*mut *mut T`. The
//! registry tracks the block as a single opaque allocation.

use alloctrack_core::{CallSite, NdLayout, TrackError};

use crate::metrics::TrackMetrics;
use crate::platform;
use crate::registry::RegistryGuard;

const PTR_SIZE: usize = std::mem::size_of::<*const ()>();

/// Wire the per-level pointer tables of a freshly allocated N-d block.
///
/// # Safety
/// `block` must point to at least `layout.total_bytes` writable bytes laid
/// out for this exact `layout`.
unsafe fn init_pointer_tables(block: *mut u8, layout: &NdLayout) {
    let counts = layout.level_counts();
    if counts.is_empty() {
        return;
    }
    let mut level_offsets = Vec::with_capacity(counts.len());
    let mut offset = 0usize;
    for &count in &counts {
        level_offsets.push(offset);
        offset += count * PTR_SIZE;
    }
    let payload = block.add(layout.ptr_table_bytes);

    for (level, &count) in counts.iter().enumerate() {
        let table = block.add(level_offsets[level]).cast::<*mut u8>();
        if level + 1 < counts.len() {
            // Each node points at its row of pointers in the next level.
            let next = block.add(level_offsets[level + 1]).cast::<*mut u8>();
            let stride = layout.dims[level + 1];
            for node in 0..count {
                table.add(node).write(next.add(node * stride).cast::<u8>());
            }
        } else {
            // Innermost pointer level: each node points at its payload row.
            let row_bytes = layout.dims[layout.dims.len() - 1] * layout.elem_size;
            for node in 0..count {
                table.add(node).write(payload.add(node * row_bytes));
            }
        }
    }
}

impl RegistryGuard<'_> {
    /// Allocate and track a ragged N-d array of `elem_size`-byte elements.
    ///
    /// The payload is uninitialized; the pointer tables are wired. Returns
    /// null (with the diagnostics channel set) on invalid dimensions,
    /// overflow, or platform failure.
    #[track_caller]
    pub fn alloc_nd(&mut self, elem_size: usize, dims: &[usize]) -> *mut u8 {
        self.alloc_nd_impl("alloc_nd", elem_size, dims, false, CallSite::caller())
    }

    /// `alloc_nd` with a zeroed payload.
    #[track_caller]
    pub fn zalloc_nd(&mut self, elem_size: usize, dims: &[usize]) -> *mut u8 {
        self.alloc_nd_impl("zalloc_nd", elem_size, dims, true, CallSite::caller())
    }

    /// Release an N-d array. The whole structure is one block, so this is a
    /// plain release of the base pointer.
    #[track_caller]
    pub fn release_nd(&mut self, ptr: *mut u8) {
        self.release_impl("release_nd", ptr, CallSite::caller());
    }

    fn alloc_nd_impl(
        &mut self,
        op: &'static str,
        elem_size: usize,
        dims: &[usize],
        zeroed: bool,
        site: CallSite,
    ) -> *mut u8 {
        let layout = match NdLayout::compute(dims, elem_size) {
            Ok(layout) => layout,
            Err(error) => return self.fail_null(op, error),
        };
        let block = if zeroed {
            platform::calloc(layout.total_bytes, 1)
        } else {
            platform::malloc(layout.total_bytes)
        };
        if block.is_null() {
            return self.fail_null(op, TrackError::PlatformFailure);
        }
        // SAFETY: `block` spans `layout.total_bytes` bytes for this layout.
        unsafe { init_pointer_tables(block, &layout) };
        self.register(op, block as usize, layout.total_bytes, site);
        TrackMetrics::bump(&self.metrics().allocations);
        block
    }
}

#[cfg(test)]
mod tests {
    use alloctrack_core::diag::{clear_failure, last_failure};
    use alloctrack_core::TrackError;

    use crate::config::TrackMode;
    use crate::registry::Registry;

    #[test]
    fn two_d_array_rows_are_walkable() {
        let registry = Registry::with_mode(TrackMode::Diagnostic);
        let mut guard = registry.lock();
        let block = guard.alloc_nd(std::mem::size_of::<u32>(), &[3, 4]);
        assert!(!block.is_null());

        let rows = block.cast::<*mut u32>();
        for row in 0..3 {
            for col in 0..4 {
                // SAFETY: the pointer table was wired for a 3x4 u32 array.
                unsafe { (*rows.add(row)).add(col).write((row * 4 + col) as u32) };
            }
        }
        for row in 0..3 {
            for col in 0..4 {
                // SAFETY: written just above.
                let value = unsafe { *(*rows.add(row)).add(col) };
                assert_eq!(value, (row * 4 + col) as u32);
            }
        }

        guard.release_nd(block);
        drop(guard);
        registry.audit();
    }

    #[test]
    fn three_d_array_chains_pointer_levels() {
        let registry = Registry::with_mode(TrackMode::Diagnostic);
        let mut guard = registry.lock();
        let block = guard.alloc_nd(1, &[2, 3, 4]);
        assert!(!block.is_null());

        let outer = block.cast::<*mut *mut u8>();
        for i in 0..2 {
            for j in 0..3 {
                for k in 0..4 {
                    // SAFETY: the tables were wired for a 2x3x4 byte array.
                    unsafe {
                        let mid = *outer.add(i);
                        let row = *mid.add(j);
                        row.add(k).write((i * 12 + j * 4 + k) as u8);
                    }
                }
            }
        }
        // The payload is contiguous behind the tables, so the last write
        // landed at the very end of the block.
        let layout = alloctrack_core::NdLayout::compute(&[2, 3, 4], 1)
            .expect("layout should compute");
        // SAFETY: in bounds of the tracked block.
        let last = unsafe { *block.add(layout.total_bytes - 1) };
        assert_eq!(last, 23);

        guard.release_nd(block);
        drop(guard);
        registry.audit();
    }

    #[test]
    fn zalloc_nd_zeroes_the_payload() {
        let registry = Registry::with_mode(TrackMode::Diagnostic);
        let mut guard = registry.lock();
        let block = guard.zalloc_nd(std::mem::size_of::<u64>(), &[2, 2]);
        assert!(!block.is_null());

        let rows = block.cast::<*mut u64>();
        for row in 0..2 {
            for col in 0..2 {
                // SAFETY: the table was wired for a 2x2 u64 array.
                assert_eq!(unsafe { *(*rows.add(row)).add(col) }, 0);
            }
        }
        guard.release_nd(block);
        drop(guard);
        registry.audit();
    }

    #[test]
    fn invalid_dimensions_are_rejected() {
        clear_failure();
        let registry = Registry::with_mode(TrackMode::Diagnostic);
        let mut guard = registry.lock();

        assert!(guard.alloc_nd(4, &[]).is_null());
        assert_eq!(
            last_failure().map(|f| f.error),
            Some(TrackError::NoDimensions)
        );

        assert!(guard.alloc_nd(4, &[2, 0]).is_null());
        assert_eq!(
            last_failure().map(|f| f.error),
            Some(TrackError::ZeroDimension { index: 1 })
        );

        assert!(guard.alloc_nd(2, &[usize::MAX, 2]).is_null());
        assert!(matches!(
            last_failure().map(|f| f.error),
            Some(TrackError::Overflow { .. })
        ));
        drop(guard);
        registry.audit();
    }
}
