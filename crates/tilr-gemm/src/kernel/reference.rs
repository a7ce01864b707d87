use super::{tiles, MicroKernel};
use crate::scalar::GemmScalar;

const REF_MR: usize = tiles::REF.0;
const REF_NR: usize = tiles::REF.1;

/// Scalar kernel, available everywhere; the other kernels are checked against it.
pub struct RefKernel;

impl<T: GemmScalar> MicroKernel<T> for RefKernel {
    const MR: usize = REF_MR;
    const NR: usize = REF_NR;

    unsafe fn run(k: usize, alpha: T, ap: *const T, bp: *const T, c: *mut T, c_rs: usize, c_cs: usize, m: usize, n: usize) {
        let mut acc = [[T::ZERO; REF_MR]; REF_NR];
        let mut a = ap;
        let mut b = bp;
        for _ in 0..k {
            for (j, acc_j) in acc.iter_mut().enumerate() {
                let bj = *b.add(j);
                for (i, acc_ij) in acc_j.iter_mut().enumerate() {
                    *acc_ij = *acc_ij + *a.add(i) * bj;
                }
            }
            a = a.add(REF_MR);
            b = b.add(REF_NR);
        }
        for (j, acc_j) in acc.iter().enumerate().take(n) {
            for (i, &acc_ij) in acc_j.iter().enumerate().take(m) {
                let cij = c.add(i * c_rs + j * c_cs);
                *cij = *cij + alpha * acc_ij;
            }
        }
    }
}
