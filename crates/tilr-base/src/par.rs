//! Fork-join scheduling of independent output slices.
//!
//! A parallel gemm cuts the rows or the columns of `C` into slices made of whole
//! register tiles and runs the sequential driver on each slice. The cutting is a
//! recursive halving on top of [`rayon::join`]: one half runs inline, the other
//! is offered to the pool, and a thread waiting on a stolen half keeps executing
//! queued work.

use std::ops::Range;

use once_cell::sync::OnceCell;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::blocking::round_up;
use crate::error::{GemmError, Result};
use crate::tilr_num_threads;

static TILR_POOL: OnceCell<ThreadPool> = OnceCell::new();

/// Worker pool shared by every parallel gemm call, sized by `TILR_NUM_THREADS`.
pub fn thread_pool() -> Result<&'static ThreadPool> {
    TILR_POOL.get_or_try_init(|| {
        let num_threads = tilr_num_threads();
        log::debug!("building worker pool with {num_threads} threads");
        ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("tilr-worker-{i}"))
            .build()
            .map_err(|e| GemmError::ThreadPool(e.to_string()))
    })
}

/// Problems below this many flops stay on the calling thread under [`Parallelism::Auto`].
pub const PAR_FLOP_THRESHOLD: usize = 2 * 96 * 96 * 96;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Parallelism {
    /// Everything runs on the calling thread.
    None,
    /// Use the worker pool once the problem is large enough.
    #[default]
    Auto,
    /// Cut the output for this many threads whatever the problem size.
    Rayon(usize),
}

impl Parallelism {
    pub fn threads_for(self, m: usize, n: usize, k: usize) -> usize {
        match self {
            Parallelism::None => 1,
            Parallelism::Auto => {
                let flops = m.saturating_mul(n).saturating_mul(k).saturating_mul(2);
                if flops < PAR_FLOP_THRESHOLD {
                    1
                } else {
                    tilr_num_threads()
                }
            }
            Parallelism::Rayon(n_threads) => n_threads.max(1),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SliceAxis {
    Rows,
    Cols,
}

/// How the output of an `m x n` product is cut for `threads` threads.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SlicePlan {
    pub axis: SliceAxis,
    /// Extent of the cut dimension.
    pub len: usize,
    /// Slice boundaries fall on multiples of this (mr or nr).
    pub unit: usize,
    /// Largest slice length, a multiple of `unit`.
    pub grain: usize,
}

impl SlicePlan {
    pub fn new(m: usize, n: usize, mr: usize, nr: usize, threads: usize) -> Self {
        // the dimension with more register tiles
        let (axis, len, unit) =
            if m.div_ceil(mr) >= n.div_ceil(nr) { (SliceAxis::Rows, m, mr) } else { (SliceAxis::Cols, n, nr) };
        let grain = round_up(len.div_ceil(threads.max(1)), unit).max(unit);
        let plan = Self { axis, len, unit, grain };
        log::trace!("slice plan for m={m} n={n} threads={threads}: {plan:?}");
        plan
    }

    /// Whether the plan yields more than one slice.
    pub fn is_split(&self) -> bool {
        self.len > self.grain
    }
}

/// Runs `f` over pieces of `range` no longer than `grain`.
///
/// Pieces are disjoint, cover `range` and start at multiples of `unit` from
/// `range.start`. The first error of either half is returned after both halves
/// finish.
pub fn fork_join<E, F>(range: Range<usize>, grain: usize, unit: usize, f: &F) -> std::result::Result<(), E>
where
    E: Send,
    F: Fn(Range<usize>) -> std::result::Result<(), E> + Sync,
{
    let unit = unit.max(1);
    let len = range.end - range.start;
    if len <= grain.max(unit) {
        return f(range);
    }
    let units = len.div_ceil(unit);
    let mid = range.start + (units / 2) * unit;
    let (left, right) =
        rayon::join(|| fork_join(range.start..mid, grain, unit, f), || fork_join(mid..range.end, grain, unit, f));
    left.and(right)
}
