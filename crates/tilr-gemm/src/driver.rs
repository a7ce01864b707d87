//! The blocked product `C += alpha * A * B`.
//!
//! Loop order, outermost first: `nc` column blocks of C, `kc` depth slabs
//! (B slab packed once), `mc` row blocks (A block packed once), then the
//! macro-kernel over `mr x nr` tiles. Large problems are first cut into
//! independent row or column slices of C that run this loop in parallel.

use core::mem::size_of;
use core::ops::Range;

use tilr_base::{
    cache_sizes, fork_join, scratch_bytes, split_scratch, thread_pool, Blocking, GemmError, Result, SliceAxis, SlicePlan,
    StridedMatrix, StridedMatrixMut, PACK_POOL,
};

use crate::kernel::{KernelKind, MicroKernel};
use crate::pack::{pack_lhs_raw, pack_rhs_raw, packed_lhs_len, packed_rhs_len};
use crate::scalar::GemmScalar;
use crate::{BlockingChoice, GemmOptions, KernelChoice};

/// Checks the trivial cases, normalizes the output orientation and hands the
/// call to the selected kernel.
///
/// # Safety
/// `a` is readable as `m x k`, `b` as `k x n`, `c` writable as `m x n` with
/// distinct elements, and `c` does not overlap `a` or `b`.
#[allow(clippy::too_many_arguments)]
pub(crate) unsafe fn gemm_entry<T: GemmScalar>(
    m: usize,
    n: usize,
    k: usize,
    alpha: T,
    a: StridedMatrix<T>,
    b: StridedMatrix<T>,
    c: StridedMatrixMut<T>,
    opts: &GemmOptions,
) -> Result<()> {
    if m == 0 || n == 0 || k == 0 || alpha == T::ZERO {
        return Ok(());
    }
    let kind = match opts.kernel {
        KernelChoice::Detect => KernelKind::detect(),
        KernelChoice::Force(kind) if kind.is_available() => kind,
        KernelChoice::Force(kind) => return Err(GemmError::KernelUnavailable(kind.name())),
    };
    // kernels prefer unit row stride in C: C^T += alpha * B^T * A^T
    if c.cs() == 1 && c.rs() != 1 {
        return T::gemm_dispatch(kind, n, m, k, alpha, b.transpose(), a.transpose(), c.transpose(), opts);
    }
    T::gemm_dispatch(kind, m, n, k, alpha, a, b, c, opts)
}

/// Chooses block sizes and threads for kernel `K`, then runs the product.
///
/// # Safety
/// As [`gemm_entry`], with all dimensions positive and `K` supported by the cpu.
#[allow(clippy::too_many_arguments)]
pub(crate) unsafe fn run_with<T: GemmScalar, K: MicroKernel<T>>(
    m: usize,
    n: usize,
    k: usize,
    alpha: T,
    a: StridedMatrix<T>,
    b: StridedMatrix<T>,
    c: StridedMatrixMut<T>,
    opts: &GemmOptions,
) -> Result<()> {
    let threads = opts.parallelism.threads_for(m, n, k);
    let blocking = match opts.blocking {
        BlockingChoice::Auto => Blocking::for_problem(m, n, k, size_of::<T>(), K::MR, K::NR, &cache_sizes(), threads),
        BlockingChoice::Cache(cache) => Blocking::for_problem(m, n, k, size_of::<T>(), K::MR, K::NR, &cache, threads),
        // fields are public, so a hand-built value may still hold zeros
        BlockingChoice::Fixed(blk) => Blocking::new(blk.mc, blk.kc, blk.nc)?,
    };
    if threads > 1 {
        let plan = SlicePlan::new(m, n, K::MR, K::NR, threads);
        if plan.is_split() {
            return gemm_parallel::<T, K>(m, n, k, alpha, a, b, c, blocking, plan);
        }
    }
    gemm_serial::<T, K>(m, n, k, alpha, a, b, c, blocking)
}

/// Runs the blocked loop on the calling thread with scratch from [`PACK_POOL`].
#[allow(clippy::too_many_arguments)]
pub(crate) unsafe fn gemm_serial<T: GemmScalar, K: MicroKernel<T>>(
    m: usize,
    n: usize,
    k: usize,
    alpha: T,
    a: StridedMatrix<T>,
    b: StridedMatrix<T>,
    c: StridedMatrixMut<T>,
    blocking: Blocking,
) -> Result<()> {
    let blk = blocking.fit(m, n, k, K::MR, K::NR);
    let ap_len = packed_lhs_len(blk.mc, blk.kc, K::MR);
    let bp_len = packed_rhs_len(blk.kc, blk.nc, K::NR);
    let bytes = scratch_bytes::<T>(ap_len, bp_len)?;
    PACK_POOL.with_scratch(bytes, |mem| {
        let (ap, bp) = split_scratch::<T>(mem, ap_len, bp_len);
        gemm_goto::<T, K>(m, n, k, alpha, a, b, c, blk, ap, bp);
    })
}

#[allow(clippy::too_many_arguments)]
unsafe fn gemm_goto<T: GemmScalar, K: MicroKernel<T>>(
    m: usize,
    n: usize,
    k: usize,
    alpha: T,
    a: StridedMatrix<T>,
    b: StridedMatrix<T>,
    c: StridedMatrixMut<T>,
    blk: Blocking,
    ap: &mut [T],
    bp: &mut [T],
) {
    for jc in (0..n).step_by(blk.nc) {
        let nc = blk.nc.min(n - jc);
        for pc in (0..k).step_by(blk.kc) {
            let kc = blk.kc.min(k - pc);
            debug_assert!(packed_rhs_len(kc, nc, K::NR) <= bp.len());
            pack_rhs_raw(bp.as_mut_ptr(), b.offset(pc, jc), kc, nc, K::NR, kc, 0);
            for ic in (0..m).step_by(blk.mc) {
                let mc = blk.mc.min(m - ic);
                debug_assert!(packed_lhs_len(mc, kc, K::MR) <= ap.len());
                pack_lhs_raw(ap.as_mut_ptr(), a.offset(ic, pc), mc, kc, K::MR, kc, 0);
                macro_kernel::<T, K>(mc, nc, kc, alpha, ap.as_ptr(), bp.as_ptr(), c.offset(ic, jc));
            }
        }
    }
}

// One packed mc x kc block of A against one packed kc x nc slab of B.
#[inline]
unsafe fn macro_kernel<T: GemmScalar, K: MicroKernel<T>>(
    mc: usize,
    nc: usize,
    kc: usize,
    alpha: T,
    ap: *const T,
    bp: *const T,
    c: StridedMatrixMut<T>,
) {
    for jr in (0..nc).step_by(K::NR) {
        let nr = K::NR.min(nc - jr);
        let bp_j = bp.add(jr * kc);
        for ir in (0..mc).step_by(K::MR) {
            let mr = K::MR.min(mc - ir);
            K::run(kc, alpha, ap.add(ir * kc), bp_j, c.at(ir, jr), c.rs(), c.cs(), mr, nr);
        }
    }
}

#[allow(clippy::too_many_arguments)]
unsafe fn gemm_parallel<T: GemmScalar, K: MicroKernel<T>>(
    m: usize,
    n: usize,
    k: usize,
    alpha: T,
    a: StridedMatrix<T>,
    b: StridedMatrix<T>,
    c: StridedMatrixMut<T>,
    blocking: Blocking,
    plan: SlicePlan,
) -> Result<()> {
    let pool = thread_pool()?;
    #[cfg(debug_assertions)]
    let claims = tilr_base::TileClaims::new(m, n);
    let slice = |r: Range<usize>| -> Result<()> {
        let (rows, cols) = match plan.axis {
            SliceAxis::Rows => (r, 0..n),
            SliceAxis::Cols => (0..m, r),
        };
        #[cfg(debug_assertions)]
        let _claim = match claims.claim(rows.clone(), cols.clone()) {
            tilr_base::RangeLockResult::Ok(guard) => guard,
            _ => panic!("output slice {rows:?} x {cols:?} overlaps a live slice"),
        };
        log::trace!("slice rows={rows:?} cols={cols:?}");
        gemm_serial::<T, K>(
            rows.len(),
            cols.len(),
            k,
            alpha,
            a.offset(rows.start, 0),
            b.offset(0, cols.start),
            c.offset(rows.start, cols.start),
            blocking,
        )
    };
    pool.install(|| fork_join(0..plan.len, plan.grain, plan.unit, &slice))
}
