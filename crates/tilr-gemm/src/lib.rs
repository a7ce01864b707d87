//! Packed, cache-blocked matrix multiplication for `f32` and `f64`.
//!
//! Computes `C += alpha * A * B` for arbitrary strided operands. Blocks of A
//! and B are packed into contiguous, zero-padded panels and multiplied by a
//! register-tiled micro-kernel chosen at runtime from the features of the cpu.
//! Large products are split into independent slices of C and run on a shared
//! rayon pool.
//!
//! ```
//! use tilr_gemm::{gemm, MatMut, MatRef, StorageOrder};
//!
//! let a = [1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0];
//! let b = [7.0f32, 8.0, 9.0, 10.0, 11.0, 12.0];
//! let mut c = [0.0f32; 4];
//! gemm(
//!     1.0,
//!     MatRef::from_slice(&a, 2, 3, StorageOrder::RowMajor),
//!     MatRef::from_slice(&b, 3, 2, StorageOrder::RowMajor),
//!     MatMut::from_slice(&mut c, 2, 2, StorageOrder::RowMajor),
//! )
//! .unwrap();
//! assert_eq!(c, [58.0, 64.0, 139.0, 154.0]);
//! ```
//!
//! Runtime configuration is read once from the environment: `TILR_NUM_THREADS`,
//! `TILR_KERNEL` and `TILR_L1_CACHE` / `TILR_L2_CACHE` / `TILR_L3_CACHE`.

pub(crate) mod driver;
pub mod kernel;
pub mod pack;
mod scalar;

pub use kernel::{KernelKind, MicroKernel, RefKernel};
#[cfg(target_arch = "aarch64")]
pub use kernel::NeonKernel;
#[cfg(target_arch = "x86_64")]
pub use kernel::{AvxFmaKernel, SseKernel};
pub use pack::{pack_lhs, pack_rhs, packed_lhs_len, packed_rhs_len, PanelMode};
pub use scalar::GemmScalar;
pub use tilr_base::{
    Blocking, CacheSizes, GemmError, MatMut, MatRef, Parallelism, Result, StorageOrder, StridedMatrix, StridedMatrixMut,
};

use driver::gemm_entry;

/// Which micro-kernel runs a call.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum KernelChoice {
    /// The best kernel of this cpu, see [`KernelKind::detect`].
    #[default]
    Detect,
    /// This kernel or [`GemmError::KernelUnavailable`].
    Force(KernelKind),
}

/// Where block sizes come from.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum BlockingChoice {
    /// Derived from the detected cache sizes.
    #[default]
    Auto,
    /// Derived from the given cache sizes.
    Cache(CacheSizes),
    /// Used as given, after rounding to the register tile.
    Fixed(Blocking),
}

/// Per-call overrides of the runtime defaults.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct GemmOptions {
    pub kernel: KernelChoice,
    pub blocking: BlockingChoice,
    pub parallelism: Parallelism,
}

/// `c += alpha * a * b` with default options.
///
/// Panics if the shapes do not agree.
pub fn gemm<T: GemmScalar>(alpha: T, a: MatRef<'_, T>, b: MatRef<'_, T>, c: MatMut<'_, T>) -> Result<()> {
    gemm_with(alpha, a, b, c, &GemmOptions::default())
}

/// `c += alpha * a * b`.
///
/// Panics if the shapes do not agree. Fails when scratch memory or the worker
/// pool cannot be obtained, or when `opts` forces a kernel this cpu lacks.
pub fn gemm_with<T: GemmScalar>(
    alpha: T,
    a: MatRef<'_, T>,
    b: MatRef<'_, T>,
    mut c: MatMut<'_, T>,
    opts: &GemmOptions,
) -> Result<()> {
    assert_eq!(a.cols(), b.rows(), "inner dimensions differ: a is {}x{}, b is {}x{}", a.rows(), a.cols(), b.rows(), b.cols());
    assert_eq!((c.rows(), c.cols()), (a.rows(), b.cols()), "c does not match a * b");
    let (m, n, k) = (a.rows(), b.cols(), a.cols());
    unsafe { gemm_entry(m, n, k, alpha, a.as_strided(), b.as_strided(), c.as_strided_mut(), opts) }
}

macro_rules! def_raw_gemm {
    ($name:ident, $t:ty) => {
        /// `C += alpha * A * B` on raw column/row strided operands, in elements.
        ///
        /// # Safety
        /// `a` must be readable as `m x k` with strides `(a_rs, a_cs)`, `b` as
        /// `k x n`, and `c` writable as `m x n` with every element distinct.
        /// `c` must not overlap `a` or `b`.
        #[allow(clippy::too_many_arguments)]
        pub unsafe fn $name(
            m: usize,
            n: usize,
            k: usize,
            alpha: $t,
            a: *const $t,
            a_rs: usize,
            a_cs: usize,
            b: *const $t,
            b_rs: usize,
            b_cs: usize,
            c: *mut $t,
            c_rs: usize,
            c_cs: usize,
        ) -> Result<()> {
            let a = StridedMatrix::new(a, a_rs, a_cs);
            let b = StridedMatrix::new(b, b_rs, b_cs);
            let c = StridedMatrixMut::new(c, c_rs, c_cs);
            gemm_entry(m, n, k, alpha, a, b, c, &GemmOptions::default())
        }
    };
}

def_raw_gemm!(tilr_sgemm, f32);
def_raw_gemm!(tilr_dgemm, f64);
