//! Cache blocking.
//!
//! The driver walks `C` in `mc x nc` blocks and the shared dimension in `kc`
//! slabs. Sizes are derived from the cache budgets:
//!
//! * a `kc x mr` micro-panel of A and a `kc x nr` micro-panel of B stay in L1,
//! * the packed `mc x kc` block of A stays in (half of) L2,
//! * the packed `kc x nc` block of B stays in this thread's share of (half of) L3.
//!
//! Block sizes only affect speed, never the result beyond rounding.

use crate::error::{GemmError, Result};
use crate::CacheSizes;

/// kc is kept a multiple of this so the kernel k-loop has no short remainder
/// on full slabs.
pub const K_PEEL: usize = 8;

#[inline(always)]
pub fn round_up(x: usize, unit: usize) -> usize {
    x.div_ceil(unit) * unit
}

#[inline(always)]
pub fn round_down(x: usize, unit: usize) -> usize {
    x / unit * unit
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Blocking {
    pub mc: usize,
    pub kc: usize,
    pub nc: usize,
}

impl Blocking {
    /// Explicit block sizes; every size must be positive.
    pub fn new(mc: usize, kc: usize, nc: usize) -> Result<Self> {
        if mc == 0 || kc == 0 || nc == 0 {
            return Err(GemmError::InvalidBlocking { mc, kc, nc });
        }
        Ok(Self { mc, kc, nc })
    }

    /// Block sizes for an `m x n x k` problem whose elements are `elem_size` bytes wide,
    /// run by a kernel with an `mr x nr` register tile on `num_threads` threads.
    #[allow(clippy::too_many_arguments)]
    pub fn for_problem(
        m: usize,
        n: usize,
        k: usize,
        elem_size: usize,
        mr: usize,
        nr: usize,
        cache: &CacheSizes,
        num_threads: usize,
    ) -> Self {
        debug_assert!(mr > 0 && nr > 0 && elem_size > 0);
        let (m, n, k) = (m.max(1), n.max(1), k.max(1));
        let threads = num_threads.max(1);

        // kc: one A micro-panel, one B micro-panel and the accumulator tile in L1
        let k_sub = mr * nr * elem_size;
        let k_div = (mr + nr) * elem_size;
        let kc_max = round_down(cache.l1.saturating_sub(k_sub) / k_div, K_PEEL).max(K_PEEL);
        let kc = if k <= kc_max { k } else { balance(k, kc_max, K_PEEL) };

        // mc: packed A block in half of L2, leaving room for B micro-panels and C lines
        let mc_max = round_down(cache.l2 / 2 / (kc * elem_size), mr).max(mr);
        let mc = balance(m, mc_max, mr);

        // nc: packed B block in this thread's share of half of L3
        let nc_max = round_down(cache.l3 / 2 / threads / (kc * elem_size), nr).max(nr);
        let nc = balance(n, nc_max, nr);

        let blocking = Self { mc, kc, nc };
        log::trace!("blocking for m={m} n={n} k={k} mr={mr} nr={nr} threads={threads}: {blocking:?}");
        blocking
    }

    /// Normalizes sizes for a given problem and register tile:
    /// `mc` becomes a multiple of `mr`, `nc` a multiple of `nr`, and no size
    /// exceeds its (rounded) dimension.
    pub fn fit(self, m: usize, n: usize, k: usize, mr: usize, nr: usize) -> Self {
        let mc = round_up(self.mc.max(1), mr).min(round_up(m.max(1), mr));
        let nc = round_up(self.nc.max(1), nr).min(round_up(n.max(1), nr));
        let kc = self.kc.max(1).min(k.max(1));
        Self { mc, kc, nc }
    }
}

// Largest block not above `max` (a multiple of `unit`) that splits `len` into
// near-equal pieces, so the last block is not a sliver.
fn balance(len: usize, max: usize, unit: usize) -> usize {
    let full = round_up(len, unit);
    if full <= max {
        return full;
    }
    let blocks = len.div_ceil(max);
    round_up(len.div_ceil(blocks), unit).min(max)
}
