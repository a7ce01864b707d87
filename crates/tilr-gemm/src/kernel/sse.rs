use core::arch::x86_64::*;

use paste::paste;
use seq_macro::seq;

use super::{add_tile, tiles, MicroKernel};

macro_rules! def_ukernel_sse {
    ($t:ident, $sfx:ident, $vs:literal, $nr:literal, $tile:ident) => {
        paste! {
            #[target_feature(enable = "sse,sse2")]
            pub(crate) unsafe fn [<ukernel_sse_ $t>](
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
                let mut acc = [[[<_mm_setzero_ $sfx>](); 2]; $nr];
                let mut a = ap;
                let mut b = bp;
                for _ in 0..k {
                    let a0 = [<_mm_loadu_ $sfx>](a);
                    let a1 = [<_mm_loadu_ $sfx>](a.add($vs));
                    seq!(j in 0..$nr {
                        let bj = [<_mm_set1_ $sfx>](*b.add(j));
                        acc[j][0] = [<_mm_add_ $sfx>](acc[j][0], [<_mm_mul_ $sfx>](a0, bj));
                        acc[j][1] = [<_mm_add_ $sfx>](acc[j][1], [<_mm_mul_ $sfx>](a1, bj));
                    });
                    a = a.add(MR);
                    b = b.add($nr);
                }

                let va = [<_mm_set1_ $sfx>](alpha);
                if c_rs == 1 && m == MR {
                    seq!(j in 0..$nr {
                        if j < n {
                            let cj = c.add(j * c_cs);
                            let x0 = [<_mm_add_ $sfx>]([<_mm_loadu_ $sfx>](cj), [<_mm_mul_ $sfx>](acc[j][0], va));
                            let x1 = [<_mm_add_ $sfx>]([<_mm_loadu_ $sfx>](cj.add($vs)), [<_mm_mul_ $sfx>](acc[j][1], va));
                            [<_mm_storeu_ $sfx>](cj, x0);
                            [<_mm_storeu_ $sfx>](cj.add($vs), x1);
                        }
                    });
                } else {
                    let mut tile = [0.0 as $t; MR * $nr];
                    let t = tile.as_mut_ptr();
                    seq!(j in 0..$nr {
                        [<_mm_storeu_ $sfx>](t.add(j * MR), [<_mm_mul_ $sfx>](acc[j][0], va));
                        [<_mm_storeu_ $sfx>](t.add(j * MR + $vs), [<_mm_mul_ $sfx>](acc[j][1], va));
                    });
                    add_tile(c, c_rs, c_cs, &tile, m, n, MR);
                }
            }
        }
    };
}

def_ukernel_sse!(f32, ps, 4, 4, SSE_F32);
def_ukernel_sse!(f64, pd, 2, 4, SSE_F64);

/// 128-bit kernel for any x86_64 cpu: 8x4 for `f32`, 4x4 for `f64`.
pub struct SseKernel;

impl MicroKernel<f32> for SseKernel {
    const MR: usize = tiles::SSE_F32.0;
    const NR: usize = tiles::SSE_F32.1;

    #[inline(always)]
    unsafe fn run(k: usize, alpha: f32, ap: *const f32, bp: *const f32, c: *mut f32, c_rs: usize, c_cs: usize, m: usize, n: usize) {
        ukernel_sse_f32(k, alpha, ap, bp, c, c_rs, c_cs, m, n)
    }
}

impl MicroKernel<f64> for SseKernel {
    const MR: usize = tiles::SSE_F64.0;
    const NR: usize = tiles::SSE_F64.1;

    #[inline(always)]
    unsafe fn run(k: usize, alpha: f64, ap: *const f64, bp: *const f64, c: *mut f64, c_rs: usize, c_cs: usize, m: usize, n: usize) {
        ukernel_sse_f64(k, alpha, ap, bp, c, c_rs, c_cs, m, n)
    }
}
