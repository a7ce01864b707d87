//! Test tooling shared by the tilr crates: seeded inputs, a naive reference
//! gemm and the dimension grids the kernels are checked on.

use rand::distributions::uniform::SampleUniform;
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::SeedableRng;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ABLayout {
    NN,
    NT,
    TN,
    TT,
}

pub const ALL_LAYOUTS: [ABLayout; 4] = [ABLayout::NN, ABLayout::NT, ABLayout::TN, ABLayout::TT];

/// `(a_rs, a_cs, b_rs, b_cs, c_rs, c_cs)` of dense operands; `N` is column major,
/// `T` row major. C is always column major.
pub fn layout_to_strides(layout: &ABLayout, m: usize, n: usize, k: usize) -> (usize, usize, usize, usize, usize, usize) {
    match layout {
        ABLayout::NN => (1, m, 1, k, 1, m),
        ABLayout::NT => (1, m, n, 1, 1, m),
        ABLayout::TN => (k, 1, 1, k, 1, m),
        ABLayout::TT => (k, 1, n, 1, 1, m),
    }
}

pub trait Bound: Copy + std::fmt::Debug + PartialEq + SampleUniform + 'static {
    /// Unit roundoff of the type.
    const EPS: f64;
    fn min_value() -> Self;
    fn max_value() -> Self;
    fn to_f64(self) -> f64;
    fn from_f64(x: f64) -> Self;
}

impl Bound for f32 {
    const EPS: f64 = f32::EPSILON as f64;
    fn min_value() -> Self {
        -2.0
    }
    fn max_value() -> Self {
        2.0
    }
    fn to_f64(self) -> f64 {
        self as f64
    }
    fn from_f64(x: f64) -> Self {
        x as f32
    }
}

impl Bound for f64 {
    const EPS: f64 = f64::EPSILON;
    fn min_value() -> Self {
        -10.0
    }
    fn max_value() -> Self {
        10.0
    }
    fn to_f64(self) -> f64 {
        self
    }
    fn from_f64(x: f64) -> Self {
        x
    }
}

pub fn seeded_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

pub fn random_matrix_uniform<T: Bound>(rng: &mut StdRng, arr: &mut [T]) {
    let un_dist = Uniform::new(T::min_value(), T::max_value());
    arr.iter_mut().for_each(|p| *p = un_dist.sample(rng));
}

pub fn random_vec<T: Bound>(rng: &mut StdRng, len: usize) -> Vec<T> {
    let un_dist = Uniform::new(T::min_value(), T::max_value());
    (0..len).map(|_| un_dist.sample(rng)).collect()
}

/// `C += alpha * A * B` by the triple loop, summed in f64.
///
/// # Safety
/// Operands must be valid for the given shapes and strides.
#[allow(clippy::too_many_arguments)]
pub unsafe fn gemm_fallback<T: Bound>(
    m: usize,
    n: usize,
    k: usize,
    alpha: T,
    a: *const T,
    a_rs: usize,
    a_cs: usize,
    b: *const T,
    b_rs: usize,
    b_cs: usize,
    c: *mut T,
    c_rs: usize,
    c_cs: usize,
) {
    let alpha = alpha.to_f64();
    for i in 0..m {
        for j in 0..n {
            let mut dx = 0.0;
            for p in 0..k {
                dx += (*a.add(a_rs * i + a_cs * p)).to_f64() * (*b.add(b_rs * p + b_cs * j)).to_f64();
            }
            let cij = c.add(c_rs * i + c_cs * j);
            *cij = T::from_f64((*cij).to_f64() + alpha * dx);
        }
    }
}

/// Largest elementwise distance; a NaN on one side only counts as infinite.
pub fn max_abs_diff<T: Bound>(x: &[T], y: &[T]) -> f64 {
    assert_eq!(x.len(), y.len());
    x.iter().zip(y).fold(0.0, |acc, (&a, &b)| {
        let (a, b) = (a.to_f64(), b.to_f64());
        let d = match (a.is_nan(), b.is_nan()) {
            (true, true) => 0.0,
            (false, false) => (a - b).abs(),
            _ => f64::INFINITY,
        };
        acc.max(d)
    })
}

pub fn max_abs<T: Bound>(x: &[T]) -> f64 {
    x.iter().fold(0.0, |acc, &a| acc.max(a.to_f64().abs()))
}

/// Acceptable distance between a blocked gemm and [`gemm_fallback`], given the
/// depth, `|alpha| * max|A| * max|B|` and `max|C|` before the update.
pub fn gemm_tolerance<T: Bound>(k: usize, scale: f64, max_c: f64) -> f64 {
    8.0 * T::EPS * ((k + 1) as f64 * scale + max_c) + f64::MIN_POSITIVE
}

/// `{1, r-1, r, r+1, 2r-1, 2r, 2r+1}` without zeros and duplicates.
pub fn generate_tail_dims(r: usize) -> Vec<usize> {
    let mut dims: Vec<usize> =
        vec![1, r.saturating_sub(1), r, r + 1, (2 * r).saturating_sub(1), 2 * r, 2 * r + 1].into_iter().filter(|&d| d > 0).collect();
    dims.sort_unstable();
    dims.dedup();
    dims
}

pub fn generate_m_dims(mc: usize, mr: usize) -> Vec<usize> {
    let mut dims = generate_tail_dims(mr);
    dims.push(mc + 29);
    dims.push(2 * mc + mr - 1);
    dims
}

pub fn generate_n_dims(nc: usize, nr: usize) -> Vec<usize> {
    let mut dims = generate_tail_dims(nr);
    dims.push(nc + 17);
    dims
}

// k has no register tile; the grid exercises the k unrolling and the slab boundary
pub fn generate_k_dims(kc: usize) -> Vec<usize> {
    let mut dims = generate_tail_dims(8);
    dims.push(kc);
    dims.push(kc + 3);
    dims
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_dims() {
        assert_eq!(generate_tail_dims(4), vec![1, 3, 4, 5, 7, 8, 9]);
        assert_eq!(generate_tail_dims(1), vec![1, 2, 3]);
    }

    #[test]
    fn same_seed_same_matrix() {
        let x: Vec<f32> = random_vec(&mut seeded_rng(7), 64);
        let y: Vec<f32> = random_vec(&mut seeded_rng(7), 64);
        assert_eq!(x, y);
        assert!(x.iter().all(|v| (-2.0..2.0).contains(v)));
    }

    #[test]
    fn fallback_small_product() {
        // [[1, 2, 3], [4, 5, 6]] * [[7, 8], [9, 10], [11, 12]], all column major
        let a = [1.0f64, 4.0, 2.0, 5.0, 3.0, 6.0];
        let b = [7.0f64, 9.0, 11.0, 8.0, 10.0, 12.0];
        let mut c = [0.0f64; 4];
        unsafe { gemm_fallback(2, 2, 3, 1.0, a.as_ptr(), 1, 2, b.as_ptr(), 1, 3, c.as_mut_ptr(), 1, 2) };
        assert_eq!(c, [58.0, 139.0, 64.0, 154.0]);
    }

    #[test]
    fn diff_treats_matching_nans_as_equal() {
        assert_eq!(max_abs_diff(&[f32::NAN, 1.0], &[f32::NAN, 1.5]), 0.5);
        assert_eq!(max_abs_diff(&[f32::NAN], &[0.0]), f64::INFINITY);
    }
}
