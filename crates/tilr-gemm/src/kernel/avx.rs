use core::arch::x86_64::*;

use paste::paste;
use seq_macro::seq;

use super::{add_tile, tiles, MicroKernel};

// -1 lanes followed by 0 lanes; a window starting at `VS - lanes` keeps the first `lanes`
static MASK_32: [i32; 16] = [-1, -1, -1, -1, -1, -1, -1, -1, 0, 0, 0, 0, 0, 0, 0, 0];
static MASK_64: [i64; 8] = [-1, -1, -1, -1, 0, 0, 0, 0];

#[target_feature(enable = "avx")]
#[inline]
unsafe fn mask_ps(lanes: usize) -> __m256i {
    _mm256_loadu_si256(MASK_32.as_ptr().add(8 - lanes) as *const __m256i)
}

#[target_feature(enable = "avx")]
#[inline]
unsafe fn mask_pd(lanes: usize) -> __m256i {
    _mm256_loadu_si256(MASK_64.as_ptr().add(4 - lanes) as *const __m256i)
}

// Two vectors per column of the tile, `$nr` columns. Full tiles over unit row
// stride use plain loads and stores, short tiles over unit row stride use masked
// ones, anything else goes through a stack tile.
macro_rules! def_ukernel_avx {
    ($t:ident, $sfx:ident, $vs:literal, $nr:literal, $tile:ident) => {
        paste! {
            #[target_feature(enable = "avx,fma")]
            pub(crate) unsafe fn [<ukernel_avx_ $t>](
                k: usize,
                alpha: $t,
                ap: *const $t,
                bp: *const $t,
                c: *mut $t,
                c_rs: usize,
                c_cs: usize,
                m: usize,
                n: usize,
            ) {
                const MR: usize = 2 * $vs;
                debug_assert_eq!((MR, $nr), tiles::$tile);
                let mut acc = [[[<_mm256_setzero_ $sfx>](); 2]; $nr];
                let mut a = ap;
                let mut b = bp;
                for _ in 0..k {
                    let a0 = [<_mm256_loadu_ $sfx>](a);
                    let a1 = [<_mm256_loadu_ $sfx>](a.add($vs));
                    seq!(j in 0..$nr {
                        let bj = [<_mm256_set1_ $sfx>](*b.add(j));
                        acc[j][0] = [<_mm256_fmadd_ $sfx>](a0, bj, acc[j][0]);
                        acc[j][1] = [<_mm256_fmadd_ $sfx>](a1, bj, acc[j][1]);
                    });
                    a = a.add(MR);
                    b = b.add($nr);
                }

                let va = [<_mm256_set1_ $sfx>](alpha);
                if c_rs == 1 && m == MR {
                    seq!(j in 0..$nr {
                        if j < n {
                            let cj = c.add(j * c_cs);
                            [<_mm256_storeu_ $sfx>](cj, [<_mm256_fmadd_ $sfx>](acc[j][0], va, [<_mm256_loadu_ $sfx>](cj)));
                            [<_mm256_storeu_ $sfx>](cj.add($vs), [<_mm256_fmadd_ $sfx>](acc[j][1], va, [<_mm256_loadu_ $sfx>](cj.add($vs))));
                        }
                    });
                } else if c_rs == 1 {
                    let mask0 = [<mask_ $sfx>](m.min($vs));
                    let mask1 = [<mask_ $sfx>](m.saturating_sub($vs));
                    for (j, acc_j) in acc.iter().enumerate().take(n) {
                        let c0 = c.add(j * c_cs);
                        // masked lanes are never touched, even past the end of C
                        let c1 = c0.wrapping_add($vs);
                        let x0 = [<_mm256_fmadd_ $sfx>](acc_j[0], va, [<_mm256_maskload_ $sfx>](c0, mask0));
                        [<_mm256_maskstore_ $sfx>](c0, mask0, x0);
                        let x1 = [<_mm256_fmadd_ $sfx>](acc_j[1], va, [<_mm256_maskload_ $sfx>](c1, mask1));
                        [<_mm256_maskstore_ $sfx>](c1, mask1, x1);
                    }
                } else {
                    let mut tile = [0.0 as $t; MR * $nr];
                    let t = tile.as_mut_ptr();
                    seq!(j in 0..$nr {
                        [<_mm256_storeu_ $sfx>](t.add(j * MR), [<_mm256_mul_ $sfx>](acc[j][0], va));
                        [<_mm256_storeu_ $sfx>](t.add(j * MR + $vs), [<_mm256_mul_ $sfx>](acc[j][1], va));
                    });
                    add_tile(c, c_rs, c_cs, &tile, m, n, MR);
                }
            }
        }
    };
}

def_ukernel_avx!(f32, ps, 8, 6, AVX_F32);
def_ukernel_avx!(f64, pd, 4, 6, AVX_F64);

/// 256-bit kernel: 16x6 for `f32`, 8x6 for `f64`.
pub struct AvxFmaKernel;

impl MicroKernel<f32> for AvxFmaKernel {
    const MR: usize = tiles::AVX_F32.0;
    const NR: usize = tiles::AVX_F32.1;

    #[inline(always)]
    unsafe fn run(k: usize, alpha: f32, ap: *const f32, bp: *const f32, c: *mut f32, c_rs: usize, c_cs: usize, m: usize, n: usize) {
        ukernel_avx_f32(k, alpha, ap, bp, c, c_rs, c_cs, m, n)
    }
}

impl MicroKernel<f64> for AvxFmaKernel {
    const MR: usize = tiles::AVX_F64.0;
    const NR: usize = tiles::AVX_F64.1;

    #[inline(always)]
    unsafe fn run(k: usize, alpha: f64, ap: *const f64, bp: *const f64, c: *mut f64, c_rs: usize, c_cs: usize, m: usize, n: usize) {
        ukernel_avx_f64(k, alpha, ap, bp, c, c_rs, c_cs, m, n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_keep_leading_lanes() {
        if !tilr_base::has_avx_fma() {
            return;
        }
        unsafe {
            for lanes in 0..=8 {
                let mut out = [0i32; 8];
                _mm256_storeu_si256(out.as_mut_ptr() as *mut __m256i, mask_ps(lanes));
                for (i, &x) in out.iter().enumerate() {
                    assert_eq!(x, if i < lanes { -1 } else { 0 });
                }
            }
            for lanes in 0..=4 {
                let mut out = [0i64; 4];
                _mm256_storeu_si256(out.as_mut_ptr() as *mut __m256i, mask_pd(lanes));
                for (i, &x) in out.iter().enumerate() {
                    assert_eq!(x, if i < lanes { -1 } else { 0 });
                }
            }
        }
    }

    #[test]
    fn short_tile_at_end_of_buffer() {
        if !tilr_base::has_avx_fma() {
            return;
        }
        // C is exactly 3x2, masked lanes would run past the allocation
        let ap: Vec<f32> = (0..16).map(|x| x as f32).collect();
        let bp = [1.0f32, 2.0, 0.0, 0.0, 0.0, 0.0];
        let mut c = vec![1.0f32; 6];
        unsafe { ukernel_avx_f32(1, 1.0, ap.as_ptr(), bp.as_ptr(), c.as_mut_ptr(), 1, 3, 3, 2) };
        assert_eq!(c, vec![1.0, 2.0, 3.0, 1.0, 3.0, 5.0]);
    }
}
