//! Layout calculation for ragged N-dimensional arrays.
//!
//! An N-d array is allocated as one block: a pointer-table region (every
//! non-leaf level's pointers, level by level) followed by the payload
//! elements. The pointer region is padded so the payload starts aligned for
//! the element size. This module only does the arithmetic; wiring the
//! pointer tables into an actual block happens in the facade crate.

use crate::arith::align_up;
use crate::diag::TrackError;

const PTR_SIZE: usize = std::mem::size_of::<*const ()>();

/// Computed layout for a ragged N-d array allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NdLayout {
    /// Extent of each dimension, outermost first.
    pub dims: Vec<usize>,
    /// Size of one payload element in bytes.
    pub elem_size: usize,
    /// Bytes occupied by the pointer tables, including alignment padding.
    /// Zero for a 1-dimensional array.
    pub ptr_table_bytes: usize,
    /// Total number of payload elements.
    pub total_elements: usize,
    /// Total byte size of the block.
    pub total_bytes: usize,
}

impl NdLayout {
    /// Compute the layout for `dims` dimensions of `elem_size`-byte elements.
    ///
    /// Every intermediate product is overflow-checked; a zero element size,
    /// empty dimension list, or zero dimension is rejected outright.
    pub fn compute(dims: &[usize], elem_size: usize) -> Result<Self, TrackError> {
        if elem_size == 0 {
            return Err(TrackError::ZeroSize);
        }
        if dims.is_empty() {
            return Err(TrackError::NoDimensions);
        }
        for (index, &dim) in dims.iter().enumerate() {
            if dim == 0 {
                return Err(TrackError::ZeroDimension { index });
            }
        }

        if dims.len() == 1 {
            let total_bytes = dims[0]
                .checked_mul(elem_size)
                .ok_or(TrackError::Overflow {
                    count: dims[0],
                    size: elem_size,
                })?;
            return Ok(Self {
                dims: dims.to_vec(),
                elem_size,
                ptr_table_bytes: 0,
                total_elements: dims[0],
                total_bytes,
            });
        }

        // Payload element total and the pointer count of every non-leaf level.
        let mut total_elements = 1usize;
        let mut total_ptrs = 0usize;
        for (index, &dim) in dims.iter().enumerate() {
            total_elements = total_elements
                .checked_mul(dim)
                .ok_or(TrackError::Overflow {
                    count: total_elements,
                    size: dim,
                })?;
            if index < dims.len() - 1 {
                total_ptrs = total_ptrs
                    .checked_add(total_elements)
                    .ok_or(TrackError::Overflow {
                        count: total_ptrs,
                        size: total_elements,
                    })?;
            }
        }

        let mut ptr_table_bytes =
            total_ptrs
                .checked_mul(PTR_SIZE)
                .ok_or(TrackError::Overflow {
                    count: total_ptrs,
                    size: PTR_SIZE,
                })?;
        // Pad so the payload starts aligned for elements wider than a pointer.
        if elem_size > PTR_SIZE {
            ptr_table_bytes =
                align_up(ptr_table_bytes, elem_size).ok_or(TrackError::Overflow {
                    count: ptr_table_bytes,
                    size: elem_size,
                })?;
        }

        let payload_bytes = total_elements
            .checked_mul(elem_size)
            .ok_or(TrackError::Overflow {
                count: total_elements,
                size: elem_size,
            })?;
        let total_bytes = ptr_table_bytes
            .checked_add(payload_bytes)
            .ok_or(TrackError::Overflow {
                count: ptr_table_bytes,
                size: payload_bytes,
            })?;

        Ok(Self {
            dims: dims.to_vec(),
            elem_size,
            ptr_table_bytes,
            total_elements,
            total_bytes,
        })
    }

    /// Number of pointer nodes at each non-leaf level, outermost first.
    ///
    /// Level `i` holds `dims[0] * ... * dims[i]` pointers; the returned list
    /// is empty for a 1-dimensional array.
    #[must_use]
    pub fn level_counts(&self) -> Vec<usize> {
        let mut counts = Vec::with_capacity(self.dims.len().saturating_sub(1));
        let mut running = 1usize;
        for &dim in &self.dims[..self.dims.len() - 1] {
            // compute() already proved these products fit.
            running *= dim;
            counts.push(running);
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_dimension_has_no_pointer_table() {
        let layout = NdLayout::compute(&[10], 4).expect("layout should compute");
        assert_eq!(layout.ptr_table_bytes, 0);
        assert_eq!(layout.total_elements, 10);
        assert_eq!(layout.total_bytes, 40);
        assert!(layout.level_counts().is_empty());
    }

    #[test]
    fn two_dimensions_count_outer_pointers() {
        let layout = NdLayout::compute(&[2, 3], PTR_SIZE).expect("layout should compute");
        assert_eq!(layout.total_elements, 6);
        assert_eq!(layout.ptr_table_bytes, 2 * PTR_SIZE);
        assert_eq!(layout.total_bytes, 2 * PTR_SIZE + 6 * PTR_SIZE);
        assert_eq!(layout.level_counts(), vec![2]);
    }

    #[test]
    fn three_dimensions_accumulate_levels() {
        let layout = NdLayout::compute(&[2, 3, 4], 1).expect("layout should compute");
        // Levels: 2 outer pointers + 6 middle pointers; 24 payload bytes.
        assert_eq!(layout.total_elements, 24);
        assert_eq!(layout.ptr_table_bytes, 8 * PTR_SIZE);
        assert_eq!(layout.total_bytes, 8 * PTR_SIZE + 24);
        assert_eq!(layout.level_counts(), vec![2, 6]);
    }

    #[test]
    fn wide_elements_pad_the_pointer_table() {
        let elem = PTR_SIZE * 2;
        let layout = NdLayout::compute(&[3, 2], elem).expect("layout should compute");
        // 3 pointers round up from 3*PTR_SIZE to a multiple of elem.
        assert_eq!(layout.ptr_table_bytes % elem, 0);
        assert!(layout.ptr_table_bytes >= 3 * PTR_SIZE);
        assert_eq!(
            layout.total_bytes,
            layout.ptr_table_bytes + 6 * elem
        );
    }

    #[test]
    fn invalid_parameters_rejected() {
        assert_eq!(NdLayout::compute(&[2, 3], 0), Err(TrackError::ZeroSize));
        assert_eq!(NdLayout::compute(&[], 4), Err(TrackError::NoDimensions));
        assert_eq!(
            NdLayout::compute(&[2, 0, 4], 4),
            Err(TrackError::ZeroDimension { index: 1 })
        );
        assert!(matches!(
            NdLayout::compute(&[usize::MAX, 2], 1),
            Err(TrackError::Overflow { .. })
        ));
    }
}
