//! Non-owning matrix views.
//!
//! [`StridedMatrix`] and [`StridedMatrixMut`] are the raw pointer + strides pair
//! the unchecked core works on. [`MatRef`] and [`MatMut`] wrap them with a shape
//! and a borrow, and check extents when built from slices.

use core::marker::PhantomData;

use crate::matrix_size_strided;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageOrder {
    RowMajor,
    ColMajor,
}

impl StorageOrder {
    /// `(rs, cs)` of a densely stored `rows x cols` matrix; the leading
    /// dimension is at least 1.
    pub fn strides(self, rows: usize, cols: usize) -> (usize, usize) {
        match self {
            StorageOrder::RowMajor => (cols.max(1), 1),
            StorageOrder::ColMajor => (1, rows.max(1)),
        }
    }
}

#[derive(Debug)]
pub struct StridedMatrix<T> {
    pub(crate) src: *const T,
    pub(crate) rs: usize,
    pub(crate) cs: usize,
}

impl<T> Clone for StridedMatrix<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for StridedMatrix<T> {}

unsafe impl<T: Sync> Send for StridedMatrix<T> {}
unsafe impl<T: Sync> Sync for StridedMatrix<T> {}

impl<T> StridedMatrix<T> {
    pub fn new(src: *const T, rs: usize, cs: usize) -> Self {
        Self { src, rs, cs }
    }

    pub fn src(&self) -> *const T {
        self.src
    }

    pub fn rs(&self) -> usize {
        self.rs
    }

    pub fn cs(&self) -> usize {
        self.cs
    }

    /// # Safety
    /// `(i, j)` must lie inside the viewed allocation.
    #[inline(always)]
    pub unsafe fn at(&self, i: usize, j: usize) -> *const T {
        self.src.add(i * self.rs + j * self.cs)
    }

    /// View starting at element `(i, j)`.
    ///
    /// # Safety
    /// `(i, j)` must lie inside (or one past) the viewed allocation.
    #[inline(always)]
    pub unsafe fn offset(&self, i: usize, j: usize) -> Self {
        Self { src: self.at(i, j), rs: self.rs, cs: self.cs }
    }

    #[inline(always)]
    pub fn transpose(self) -> Self {
        Self { src: self.src, rs: self.cs, cs: self.rs }
    }
}

#[derive(Debug)]
pub struct StridedMatrixMut<T> {
    pub(crate) src: *mut T,
    pub(crate) rs: usize,
    pub(crate) cs: usize,
}

impl<T> Clone for StridedMatrixMut<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for StridedMatrixMut<T> {}

unsafe impl<T: Send> Send for StridedMatrixMut<T> {}
unsafe impl<T: Send> Sync for StridedMatrixMut<T> {}

impl<T> StridedMatrixMut<T> {
    pub fn new(src: *mut T, rs: usize, cs: usize) -> Self {
        Self { src, rs, cs }
    }

    pub fn src(&self) -> *mut T {
        self.src
    }

    pub fn rs(&self) -> usize {
        self.rs
    }

    pub fn cs(&self) -> usize {
        self.cs
    }

    /// # Safety
    /// `(i, j)` must lie inside the viewed allocation.
    #[inline(always)]
    pub unsafe fn at(&self, i: usize, j: usize) -> *mut T {
        self.src.add(i * self.rs + j * self.cs)
    }

    /// # Safety
    /// `(i, j)` must lie inside (or one past) the viewed allocation.
    #[inline(always)]
    pub unsafe fn offset(&self, i: usize, j: usize) -> Self {
        Self { src: self.at(i, j), rs: self.rs, cs: self.cs }
    }

    #[inline(always)]
    pub fn transpose(self) -> Self {
        Self { src: self.src, rs: self.cs, cs: self.rs }
    }

    pub fn as_const(&self) -> StridedMatrix<T> {
        StridedMatrix { src: self.src, rs: self.rs, cs: self.cs }
    }
}

// Distinct (i, j) reach distinct elements when both strides are nonzero and one
// of them steps over the whole extent of the other dimension.
fn strides_are_disjoint(rows: usize, cols: usize, rs: usize, cs: usize) -> bool {
    if rows == 0 || cols == 0 {
        return true;
    }
    match (rows > 1, cols > 1) {
        (false, false) => true,
        (true, false) => rs > 0,
        (false, true) => cs > 0,
        (true, true) if rs == 0 || cs == 0 => false,
        (true, true) => {
            let row_span = matrix_size_strided(1, cols, rs, cs);
            let col_span = matrix_size_strided(rows, 1, rs, cs);
            row_span.map_or(false, |span| rs >= span) || col_span.map_or(false, |span| cs >= span)
        }
    }
}

// Panics with the view's shape when the strided extent overflows or exceeds `len`.
fn check_extent(len: usize, rows: usize, cols: usize, rs: usize, cs: usize) {
    match matrix_size_strided(rows, cols, rs, cs) {
        Some(need) => assert!(
            need <= len,
            "{rows}x{cols} view with strides ({rs}, {cs}) needs {need} elements, slice has {len}"
        ),
        None => panic!("{rows}x{cols} view with strides ({rs}, {cs}) overflows the address space"),
    }
}

/// Shared `rows x cols` view.
#[derive(Debug)]
pub struct MatRef<'a, T> {
    mat: StridedMatrix<T>,
    rows: usize,
    cols: usize,
    _marker: PhantomData<&'a [T]>,
}

impl<T> Clone for MatRef<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for MatRef<'_, T> {}

impl<'a, T> MatRef<'a, T> {
    pub fn from_slice(data: &'a [T], rows: usize, cols: usize, order: StorageOrder) -> Self {
        let (rs, cs) = order.strides(rows, cols);
        Self::from_slice_with_strides(data, rows, cols, rs, cs)
    }

    /// Panics when the strided extent does not fit in `data`.
    pub fn from_slice_with_strides(data: &'a [T], rows: usize, cols: usize, rs: usize, cs: usize) -> Self {
        check_extent(data.len(), rows, cols, rs, cs);
        Self { mat: StridedMatrix::new(data.as_ptr(), rs, cs), rows, cols, _marker: PhantomData }
    }

    /// # Safety
    /// Every `ptr + i * rs + j * cs` for `i < rows`, `j < cols` must be readable for `'a`.
    pub unsafe fn from_raw_parts(ptr: *const T, rows: usize, cols: usize, rs: usize, cs: usize) -> Self {
        Self { mat: StridedMatrix::new(ptr, rs, cs), rows, cols, _marker: PhantomData }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn rs(&self) -> usize {
        self.mat.rs
    }

    pub fn cs(&self) -> usize {
        self.mat.cs
    }

    pub fn as_strided(&self) -> StridedMatrix<T> {
        self.mat
    }

    /// Unit-stride direction, if any.
    pub fn storage_order(&self) -> Option<StorageOrder> {
        if self.mat.rs == 1 {
            Some(StorageOrder::ColMajor)
        } else if self.mat.cs == 1 {
            Some(StorageOrder::RowMajor)
        } else {
            None
        }
    }

    pub fn transpose(self) -> Self {
        Self { mat: self.mat.transpose(), rows: self.cols, cols: self.rows, _marker: PhantomData }
    }

    pub fn get(&self, i: usize, j: usize) -> &'a T {
        assert!(i < self.rows && j < self.cols);
        unsafe { &*self.mat.at(i, j) }
    }
}

/// Exclusive `rows x cols` view.
#[derive(Debug)]
pub struct MatMut<'a, T> {
    mat: StridedMatrixMut<T>,
    rows: usize,
    cols: usize,
    _marker: PhantomData<&'a mut [T]>,
}

impl<'a, T> MatMut<'a, T> {
    pub fn from_slice(data: &'a mut [T], rows: usize, cols: usize, order: StorageOrder) -> Self {
        let (rs, cs) = order.strides(rows, cols);
        Self::from_slice_with_strides(data, rows, cols, rs, cs)
    }

    /// Panics when the strided extent does not fit in `data` or when two
    /// positions would share an element.
    pub fn from_slice_with_strides(data: &'a mut [T], rows: usize, cols: usize, rs: usize, cs: usize) -> Self {
        check_extent(data.len(), rows, cols, rs, cs);
        assert!(strides_are_disjoint(rows, cols, rs, cs), "strides ({rs}, {cs}) alias elements of a {rows}x{cols} output");
        Self { mat: StridedMatrixMut::new(data.as_mut_ptr(), rs, cs), rows, cols, _marker: PhantomData }
    }

    /// # Safety
    /// Every `ptr + i * rs + j * cs` for `i < rows`, `j < cols` must be writable for `'a`,
    /// distinct positions must not alias, and nothing else may access them meanwhile.
    pub unsafe fn from_raw_parts(ptr: *mut T, rows: usize, cols: usize, rs: usize, cs: usize) -> Self {
        Self { mat: StridedMatrixMut::new(ptr, rs, cs), rows, cols, _marker: PhantomData }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn rs(&self) -> usize {
        self.mat.rs
    }

    pub fn cs(&self) -> usize {
        self.mat.cs
    }

    pub fn as_strided_mut(&mut self) -> StridedMatrixMut<T> {
        self.mat
    }

    pub fn rb(&self) -> MatRef<'_, T> {
        MatRef { mat: self.mat.as_const(), rows: self.rows, cols: self.cols, _marker: PhantomData }
    }

    pub fn transpose(self) -> Self {
        Self { mat: self.mat.transpose(), rows: self.cols, cols: self.rows, _marker: PhantomData }
    }

    pub fn get_mut(&mut self, i: usize, j: usize) -> &mut T {
        assert!(i < self.rows && j < self.cols);
        unsafe { &mut *self.mat.at(i, j) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_orders_address_the_same_element() {
        // 2x3 matrix [[1, 2, 3], [4, 5, 6]]
        let row_major = [1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0];
        let col_major = [1.0f32, 4.0, 2.0, 5.0, 3.0, 6.0];
        let r = MatRef::from_slice(&row_major, 2, 3, StorageOrder::RowMajor);
        let c = MatRef::from_slice(&col_major, 2, 3, StorageOrder::ColMajor);
        for i in 0..2 {
            for j in 0..3 {
                assert_eq!(r.get(i, j), c.get(i, j));
            }
        }
        assert_eq!(r.storage_order(), Some(StorageOrder::RowMajor));
        assert_eq!(c.storage_order(), Some(StorageOrder::ColMajor));
        let rt = r.transpose();
        assert_eq!((rt.rows(), rt.cols()), (3, 2));
        assert_eq!(*rt.get(2, 1), 6.0);
    }

    #[test]
    #[should_panic]
    fn short_slice_panics() {
        let data = [0.0f64; 5];
        MatRef::from_slice(&data, 2, 3, StorageOrder::RowMajor);
    }

    #[test]
    #[should_panic]
    fn aliasing_output_panics() {
        let mut data = [0.0f64; 16];
        MatMut::from_slice_with_strides(&mut data, 3, 3, 1, 1);
    }

    #[test]
    #[should_panic(expected = "alias")]
    fn zero_column_stride_panics() {
        let mut data = [0.0f64; 3];
        MatMut::from_slice_with_strides(&mut data, 3, 4, 1, 0);
    }

    #[test]
    #[should_panic(expected = "alias")]
    fn zero_row_stride_panics() {
        let mut data = [0.0f64; 4];
        MatMut::from_slice_with_strides(&mut data, 3, 4, 0, 1);
    }

    #[test]
    #[should_panic(expected = "overflows")]
    fn wrapping_extent_panics() {
        let data = [1.0f64, 2.0];
        MatRef::from_slice_with_strides(&data, 2, 2, usize::MAX, 2);
    }

    #[test]
    #[should_panic(expected = "overflows")]
    fn wrapping_output_extent_panics() {
        let mut data = [0.0f32; 8];
        MatMut::from_slice_with_strides(&mut data, 2, 3, 1, usize::MAX / 2 + 1);
    }

    #[test]
    fn padded_strides_are_accepted() {
        let mut data = vec![0i32; 4 * 7];
        let mut m = MatMut::from_slice_with_strides(&mut data, 3, 4, 7, 1);
        *m.get_mut(2, 3) = 9;
        assert_eq!(*m.rb().get(2, 3), 9);
        assert_eq!(data[2 * 7 + 3], 9);
    }

    #[test]
    fn empty_views_need_no_storage() {
        let data: [f32; 0] = [];
        let v = MatRef::from_slice(&data, 0, 5, StorageOrder::ColMajor);
        assert_eq!((v.rows(), v.cols()), (0, 5));
    }

    #[test]
    fn disjoint_stride_rule() {
        assert!(strides_are_disjoint(3, 4, 1, 3));
        assert!(strides_are_disjoint(3, 4, 4, 1));
        assert!(strides_are_disjoint(1, 4, 0, 2));
        assert!(!strides_are_disjoint(3, 4, 1, 2));
        assert!(!strides_are_disjoint(3, 1, 0, 5));
        assert!(!strides_are_disjoint(3, 4, 1, 0));
        assert!(!strides_are_disjoint(3, 4, 0, 1));
        assert!(!strides_are_disjoint(3, 4, usize::MAX, usize::MAX));
        assert!(strides_are_disjoint(3, 4, usize::MAX / 2, 1));
    }
}
