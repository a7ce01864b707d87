//! Packing of A and B blocks into register-group panels.
//!
//! An LHS panel holds the rows of a `rows x depth` block in groups of `mr`; each
//! group stores `mr` consecutive rows for depth step 0, then for depth step 1,
//! and so on. RHS panels do the same with groups of `nr` columns of a
//! `depth x cols` block. The last group is zero padded to full width, so a
//! kernel can always run its full register tile.
//!
//! With a [`PanelMode`] groups are laid out `stride` depth steps apart and the
//! block starts `offset` steps into each group, which lets several depth slabs
//! share one buffer. Element `(p, i)` of group `g` lands at
//! `g * r * stride + (offset + p) * r + i`.

use core::ptr::copy_nonoverlapping;

use tilr_base::{round_up, MatRef, StridedMatrix};

use crate::scalar::GemmScalar;

/// Placement of a packed block inside a larger panel buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PanelMode {
    /// Depth steps between the starts of consecutive groups.
    pub stride: usize,
    /// Depth step of the first packed element inside each group.
    pub offset: usize,
}

impl PanelMode {
    pub fn new(stride: usize, offset: usize) -> Self {
        Self { stride, offset }
    }

    /// The plain layout: groups back to back, no leading gap.
    pub fn dense(depth: usize) -> Self {
        Self { stride: depth, offset: 0 }
    }
}

/// Elements of a dense LHS panel for a `rows x depth` block.
pub fn packed_lhs_len(rows: usize, depth: usize, mr: usize) -> usize {
    round_up(rows, mr) * depth
}

/// Elements of a dense RHS panel for a `depth x cols` block.
pub fn packed_rhs_len(depth: usize, cols: usize, nr: usize) -> usize {
    round_up(cols, nr) * depth
}

fn panel_len(len: usize, depth: usize, r: usize, mode: PanelMode) -> usize {
    if len == 0 || depth == 0 {
        return 0;
    }
    (len.div_ceil(r) - 1) * r * mode.stride + (mode.offset + depth) * r
}

// One group: `lanes` source vectors (rows of A, columns of B), `lane_stride`
// apart, each walked `depth` steps of `depth_stride`. Lanes `lanes..r` are zeroed.
#[inline(always)]
unsafe fn pack_group<T: GemmScalar>(
    dst: *mut T,
    src: *const T,
    lanes: usize,
    depth: usize,
    lane_stride: usize,
    depth_stride: usize,
    r: usize,
) {
    if lane_stride == 1 {
        for p in 0..depth {
            copy_nonoverlapping(src.add(p * depth_stride), dst.add(p * r), lanes);
        }
    } else if depth_stride == 1 {
        for i in 0..lanes {
            let s = src.add(i * lane_stride);
            for p in 0..depth {
                *dst.add(p * r + i) = *s.add(p);
            }
        }
    } else {
        for p in 0..depth {
            let s = src.add(p * depth_stride);
            let d = dst.add(p * r);
            for i in 0..lanes {
                *d.add(i) = *s.add(i * lane_stride);
            }
        }
    }
    if lanes < r {
        for p in 0..depth {
            let d = dst.add(p * r);
            for i in lanes..r {
                *d.add(i) = T::ZERO;
            }
        }
    }
}

/// Packs the `rows x depth` block at `a` in groups of `mr` rows.
///
/// # Safety
/// `a` must be readable over the block and `dst` writable over the packed
/// extent for `(stride, offset)`; see the module docs.
pub(crate) unsafe fn pack_lhs_raw<T: GemmScalar>(
    dst: *mut T,
    a: StridedMatrix<T>,
    rows: usize,
    depth: usize,
    mr: usize,
    stride: usize,
    offset: usize,
) {
    debug_assert!(offset + depth <= stride || rows <= mr);
    let mut i = 0;
    let mut g = 0;
    while i < rows {
        let lanes = mr.min(rows - i);
        pack_group(dst.add(g * mr * stride + offset * mr), a.at(i, 0), lanes, depth, a.rs(), a.cs(), mr);
        i += mr;
        g += 1;
    }
}

/// Packs the `depth x cols` block at `b` in groups of `nr` columns.
///
/// # Safety
/// Same as [`pack_lhs_raw`].
pub(crate) unsafe fn pack_rhs_raw<T: GemmScalar>(
    dst: *mut T,
    b: StridedMatrix<T>,
    depth: usize,
    cols: usize,
    nr: usize,
    stride: usize,
    offset: usize,
) {
    debug_assert!(offset + depth <= stride || cols <= nr);
    let mut j = 0;
    let mut g = 0;
    while j < cols {
        let lanes = nr.min(cols - j);
        pack_group(dst.add(g * nr * stride + offset * nr), b.at(0, j), lanes, depth, b.cs(), b.rs(), nr);
        j += nr;
        g += 1;
    }
}

/// Packs all of `a` (`rows x depth`) into `dst` in groups of `mr` rows.
///
/// Panics if `dst` is too short for the layout chosen by `mode`
/// (dense when `None`).
pub fn pack_lhs<T: GemmScalar>(dst: &mut [T], a: MatRef<'_, T>, mr: usize, mode: Option<PanelMode>) {
    assert!(mr > 0, "mr must be positive");
    let (rows, depth) = (a.rows(), a.cols());
    let mode = mode.unwrap_or(PanelMode::dense(depth));
    assert!(mode.offset + depth <= mode.stride, "panel mode {mode:?} cannot hold depth {depth}");
    let need = panel_len(rows, depth, mr, mode);
    assert!(dst.len() >= need, "lhs panel needs {need} elements, got {}", dst.len());
    unsafe { pack_lhs_raw(dst.as_mut_ptr(), a.as_strided(), rows, depth, mr, mode.stride, mode.offset) }
}

/// Packs all of `b` (`depth x cols`) into `dst` in groups of `nr` columns.
///
/// Panics if `dst` is too short for the layout chosen by `mode`
/// (dense when `None`).
pub fn pack_rhs<T: GemmScalar>(dst: &mut [T], b: MatRef<'_, T>, nr: usize, mode: Option<PanelMode>) {
    assert!(nr > 0, "nr must be positive");
    let (depth, cols) = (b.rows(), b.cols());
    let mode = mode.unwrap_or(PanelMode::dense(depth));
    assert!(mode.offset + depth <= mode.stride, "panel mode {mode:?} cannot hold depth {depth}");
    let need = panel_len(cols, depth, nr, mode);
    assert!(dst.len() >= need, "rhs panel needs {need} elements, got {}", dst.len());
    unsafe { pack_rhs_raw(dst.as_mut_ptr(), b.as_strided(), depth, cols, nr, mode.stride, mode.offset) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tilr_base::StorageOrder;

    fn matrix(rows: usize, cols: usize, order: StorageOrder) -> Vec<f64> {
        let (rs, cs) = order.strides(rows, cols);
        let mut data = vec![0.0; rows * cols];
        for i in 0..rows {
            for j in 0..cols {
                data[i * rs + j * cs] = (100 * i + j) as f64;
            }
        }
        data
    }

    #[test]
    fn lhs_elements_land_at_their_offsets() {
        let (rows, depth, mr) = (11, 5, 4);
        let data = matrix(rows, depth, StorageOrder::ColMajor);
        let a = MatRef::from_slice(&data, rows, depth, StorageOrder::ColMajor);
        let mut ap = vec![f64::NAN; packed_lhs_len(rows, depth, mr)];
        pack_lhs(&mut ap, a, mr, None);
        for g in 0..3 {
            for p in 0..depth {
                for i in 0..mr {
                    let row = g * mr + i;
                    let expected = if row < rows { (100 * row + p) as f64 } else { 0.0 };
                    assert_eq!(ap[g * mr * depth + p * mr + i], expected, "g={g} p={p} i={i}");
                }
            }
        }
    }

    #[test]
    fn row_and_column_major_give_the_same_panels() {
        for &(rows, cols, r) in &[(7, 9, 4), (16, 3, 8), (1, 1, 6), (13, 13, 6)] {
            let cm = matrix(rows, cols, StorageOrder::ColMajor);
            let rm = matrix(rows, cols, StorageOrder::RowMajor);
            let a_cm = MatRef::from_slice(&cm, rows, cols, StorageOrder::ColMajor);
            let a_rm = MatRef::from_slice(&rm, rows, cols, StorageOrder::RowMajor);

            let mut p_cm = vec![f64::NAN; packed_lhs_len(rows, cols, r)];
            let mut p_rm = vec![f64::NAN; packed_lhs_len(rows, cols, r)];
            pack_lhs(&mut p_cm, a_cm, r, None);
            pack_lhs(&mut p_rm, a_rm, r, None);
            assert_eq!(p_cm, p_rm);

            let mut p_cm = vec![f64::NAN; packed_rhs_len(rows, cols, r)];
            let mut p_rm = vec![f64::NAN; packed_rhs_len(rows, cols, r)];
            pack_rhs(&mut p_cm, a_cm, r, None);
            pack_rhs(&mut p_rm, a_rm, r, None);
            assert_eq!(p_cm, p_rm);
        }
    }

    #[test]
    fn general_strides_pack_like_dense() {
        // every other element of a padded buffer
        let (rows, cols) = (5, 6);
        let dense = matrix(rows, cols, StorageOrder::ColMajor);
        let mut sparse = vec![-1.0; 2 * (rows - 1) + 2 * rows * 2 * (cols - 1) + 1];
        for i in 0..rows {
            for j in 0..cols {
                sparse[2 * i + 4 * rows * j] = dense[i + rows * j];
            }
        }
        let a = MatRef::from_slice(&dense, rows, cols, StorageOrder::ColMajor);
        let s = MatRef::from_slice_with_strides(&sparse, rows, cols, 2, 4 * rows);
        let mut p_dense = vec![0.0; packed_rhs_len(rows, cols, 4)];
        let mut p_sparse = vec![0.0; packed_rhs_len(rows, cols, 4)];
        pack_rhs(&mut p_dense, a, 4, None);
        pack_rhs(&mut p_sparse, s, 4, None);
        assert_eq!(p_dense, p_sparse);
    }

    #[test]
    fn rhs_tail_group_is_zero_padded() {
        let (depth, cols, nr) = (3, 7, 6);
        let data = matrix(depth, cols, StorageOrder::RowMajor);
        let b = MatRef::from_slice(&data, depth, cols, StorageOrder::RowMajor);
        let mut bp = vec![f64::NAN; packed_rhs_len(depth, cols, nr)];
        pack_rhs(&mut bp, b, nr, None);
        let tail = &bp[nr * depth..];
        for p in 0..depth {
            assert_eq!(tail[p * nr], (100 * p + 6) as f64);
            assert!(tail[p * nr + 1..(p + 1) * nr].iter().all(|&x| x == 0.0));
        }
    }

    #[test]
    fn panel_mode_places_slabs_side_by_side() {
        // two depth slabs of 3 and 2 steps packed into one 5-step panel
        let (rows, depth, mr) = (6, 5, 4);
        let data = matrix(rows, depth, StorageOrder::ColMajor);
        let mut whole = vec![0.0; packed_lhs_len(rows, depth, mr)];
        pack_lhs(&mut whole, MatRef::from_slice(&data, rows, depth, StorageOrder::ColMajor), mr, None);

        let mut split = vec![f64::NAN; packed_lhs_len(rows, depth, mr)];
        let first = MatRef::from_slice_with_strides(&data, rows, 3, 1, rows);
        let second = MatRef::from_slice_with_strides(&data[3 * rows..], rows, 2, 1, rows);
        pack_lhs(&mut split, first, mr, Some(PanelMode::new(depth, 0)));
        pack_lhs(&mut split, second, mr, Some(PanelMode::new(depth, 3)));
        assert_eq!(whole, split);
    }

    #[test]
    #[should_panic(expected = "lhs panel needs")]
    fn undersized_panel_panics() {
        let data = [1.0f32; 12];
        let a = MatRef::from_slice(&data, 3, 4, StorageOrder::ColMajor);
        let mut ap = vec![0.0f32; 12];
        pack_lhs(&mut ap, a, 4, None);
    }
}
