use core::arch::aarch64::*;

use paste::paste;
use seq_macro::seq;

use super::{add_tile, tiles, MicroKernel};

// `$t`-typed NEON vectors: `$vs` lanes, two per tile column, `$nr` columns.
macro_rules! def_ukernel_neon {
    ($t:ident, $sfx:ident, $vs:literal, $nr:literal, $tile:ident) => {
        paste! {
            #[target_feature(enable = "neon")]
            pub(crate) unsafe fn [<ukernel_neon_ $t>](
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
                let mut acc = [[[<vdupq_n_ $sfx>](0.0); 2]; $nr];
                let mut a = ap;
                let mut b = bp;
                for _ in 0..k {
                    let a0 = [<vld1q_ $sfx>](a);
                    let a1 = [<vld1q_ $sfx>](a.add($vs));
                    seq!(j in 0..$nr {
                        let bj = [<vdupq_n_ $sfx>](*b.add(j));
                        acc[j][0] = [<vfmaq_ $sfx>](acc[j][0], a0, bj);
                        acc[j][1] = [<vfmaq_ $sfx>](acc[j][1], a1, bj);
                    });
                    a = a.add(MR);
                    b = b.add($nr);
                }

                let va = [<vdupq_n_ $sfx>](alpha);
                if c_rs == 1 && m == MR {
                    seq!(j in 0..$nr {
                        if j < n {
                            let cj = c.add(j * c_cs);
                            [<vst1q_ $sfx>](cj, [<vfmaq_ $sfx>]([<vld1q_ $sfx>](cj), acc[j][0], va));
                            [<vst1q_ $sfx>](cj.add($vs), [<vfmaq_ $sfx>]([<vld1q_ $sfx>](cj.add($vs)), acc[j][1], va));
                        }
                    });
                } else {
                    let mut tile = [0.0 as $t; MR * $nr];
                    let t = tile.as_mut_ptr();
                    seq!(j in 0..$nr {
                        [<vst1q_ $sfx>](t.add(j * MR), [<vmulq_ $sfx>](acc[j][0], va));
                        [<vst1q_ $sfx>](t.add(j * MR + $vs), [<vmulq_ $sfx>](acc[j][1], va));
                    });
                    add_tile(c, c_rs, c_cs, &tile, m, n, MR);
                }
            }
        }
    };
}

def_ukernel_neon!(f32, f32, 4, 8, NEON_F32);
def_ukernel_neon!(f64, f64, 2, 8, NEON_F64);

/// 128-bit NEON kernel: 8x8 for `f32`, 4x8 for `f64`.
pub struct NeonKernel;

impl MicroKernel<f32> for NeonKernel {
    const MR: usize = tiles::NEON_F32.0;
    const NR: usize = tiles::NEON_F32.1;

    #[inline(always)]
    unsafe fn run(k: usize, alpha: f32, ap: *const f32, bp: *const f32, c: *mut f32, c_rs: usize, c_cs: usize, m: usize, n: usize) {
        ukernel_neon_f32(k, alpha, ap, bp, c, c_rs, c_cs, m, n)
    }
}

impl MicroKernel<f64> for NeonKernel {
    const MR: usize = tiles::NEON_F64.0;
    const NR: usize = tiles::NEON_F64.1;

    #[inline(always)]
    unsafe fn run(k: usize, alpha: f64, ap: *const f64, bp: *const f64, c: *mut f64, c_rs: usize, c_cs: usize, m: usize, n: usize) {
        ukernel_neon_f64(k, alpha, ap, bp, c, c_rs, c_cs, m, n)
    }
}
