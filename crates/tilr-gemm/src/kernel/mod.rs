//! Micro-kernels.
//!
//! A micro-kernel multiplies one packed `mr x kc` panel of A by one packed
//! `kc x nr` panel of B and adds `alpha` times the product to an `m x n`
//! (`m <= mr`, `n <= nr`) corner of C. Panels are zero padded, so kernels always
//! run the full register tile and only narrow the final update of C.

use once_cell::sync::Lazy;

use crate::scalar::GemmScalar;

mod reference;
pub use reference::RefKernel;

#[cfg(target_arch = "x86_64")]
mod avx;
#[cfg(target_arch = "x86_64")]
mod sse;
#[cfg(target_arch = "x86_64")]
pub use avx::AvxFmaKernel;
#[cfg(target_arch = "x86_64")]
pub use sse::SseKernel;

#[cfg(target_arch = "aarch64")]
mod neon;
#[cfg(target_arch = "aarch64")]
pub use neon::NeonKernel;

/// `(mr, nr)` of every kernel, per element type.
pub(crate) mod tiles {
    pub const REF: (usize, usize) = (8, 4);
    pub const SSE_F32: (usize, usize) = (8, 4);
    pub const SSE_F64: (usize, usize) = (4, 4);
    pub const AVX_F32: (usize, usize) = (16, 6);
    pub const AVX_F64: (usize, usize) = (8, 6);
    pub const NEON_F32: (usize, usize) = (8, 8);
    pub const NEON_F64: (usize, usize) = (4, 8);
}

/// `(k, alpha, ap, bp, c, c_rs, c_cs, m, n)`, see [`MicroKernel::run`].
pub type KernelFn<T> = unsafe fn(usize, T, *const T, *const T, *mut T, usize, usize, usize, usize);

pub trait MicroKernel<T: GemmScalar> {
    const MR: usize;
    const NR: usize;

    /// `C[0..m, 0..n] += alpha * Ap * Bp` over depth `k`.
    ///
    /// # Safety
    /// `ap` holds `k` groups of `MR` elements and `bp` holds `k` groups of `NR`
    /// elements. `c` is valid for an `m x n` view with strides `(c_rs, c_cs)`,
    /// `m <= MR`, `n <= NR`, and the running cpu supports the kernel.
    #[allow(clippy::too_many_arguments)]
    unsafe fn run(k: usize, alpha: T, ap: *const T, bp: *const T, c: *mut T, c_rs: usize, c_cs: usize, m: usize, n: usize);
}

/// Adds a column-major `m x n` tile with leading dimension `ld` (already
/// scaled by alpha) into C.
#[inline(always)]
pub(crate) unsafe fn add_tile<T: GemmScalar>(c: *mut T, c_rs: usize, c_cs: usize, tile: &[T], m: usize, n: usize, ld: usize) {
    for j in 0..n {
        for i in 0..m {
            let cij = c.add(i * c_rs + j * c_cs);
            *cij = *cij + tile[i + j * ld];
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum KernelKind {
    /// Portable scalar kernel.
    Reference,
    /// 128-bit SSE2, x86_64.
    Sse,
    /// 256-bit AVX with FMA, x86_64.
    AvxFma,
    /// 128-bit NEON, aarch64.
    Neon,
}

static DETECTED_KERNEL: Lazy<KernelKind> = Lazy::new(|| {
    if let Some(name) = tilr_base::requested_kernel() {
        match KernelKind::from_name(name) {
            Some(kind) if kind.is_available() => {
                log::debug!("using kernel {} from TILR_KERNEL", kind.name());
                return kind;
            }
            Some(kind) => log::warn!("TILR_KERNEL={} is not supported on this cpu, detecting instead", kind.name()),
            None => log::warn!("unknown TILR_KERNEL={name}, detecting instead"),
        }
    }
    let kind = [KernelKind::AvxFma, KernelKind::Neon, KernelKind::Sse]
        .into_iter()
        .find(|kind| kind.is_available())
        .unwrap_or(KernelKind::Reference);
    log::debug!("selected kernel {}", kind.name());
    kind
});

impl KernelKind {
    pub const ALL: [KernelKind; 4] = [KernelKind::Reference, KernelKind::Sse, KernelKind::AvxFma, KernelKind::Neon];

    pub fn name(self) -> &'static str {
        match self {
            KernelKind::Reference => "reference",
            KernelKind::Sse => "sse",
            KernelKind::AvxFma => "avx_fma",
            KernelKind::Neon => "neon",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        KernelKind::ALL.into_iter().find(|kind| kind.name().eq_ignore_ascii_case(name))
    }

    /// Whether this kernel is compiled for the target and supported by the cpu.
    pub fn is_available(self) -> bool {
        match self {
            KernelKind::Reference => true,
            KernelKind::Sse => cfg!(target_arch = "x86_64") && tilr_base::has_sse(),
            KernelKind::AvxFma => cfg!(target_arch = "x86_64") && tilr_base::has_avx_fma(),
            KernelKind::Neon => cfg!(target_arch = "aarch64") && tilr_base::has_neon(),
        }
    }

    /// Best kernel for this cpu, or the one named by `TILR_KERNEL` when available.
    pub fn detect() -> Self {
        *DETECTED_KERNEL
    }

    pub fn available() -> Vec<KernelKind> {
        KernelKind::ALL.into_iter().filter(|kind| kind.is_available()).collect()
    }

    pub fn mr<T: GemmScalar>(self) -> usize {
        T::tile(self).0
    }

    pub fn nr<T: GemmScalar>(self) -> usize {
        T::tile(self).1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tilr_dev::{random_vec, seeded_rng, Bound};

    #[test]
    fn names_round_trip() {
        for kind in KernelKind::ALL {
            assert_eq!(KernelKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(KernelKind::from_name("AVX_FMA"), Some(KernelKind::AvxFma));
        assert_eq!(KernelKind::from_name("avx512"), None);
    }

    #[test]
    fn detected_kernel_is_available() {
        assert!(KernelKind::detect().is_available());
        assert!(KernelKind::available().contains(&KernelKind::Reference));
        for kind in KernelKind::available() {
            assert!(f32::micro_kernel(kind).is_some());
            assert!(f64::micro_kernel(kind).is_some());
        }
    }

    // C[i, j] += alpha * sum_p ap[p * mr + i] * bp[p * nr + j] on a padded
    // buffer; everything outside the m x n corner must stay untouched.
    fn check_kernel<T: GemmScalar + Bound>(kind: KernelKind) {
        let Some(kernel) = T::micro_kernel(kind) else { return };
        let (mr, nr) = T::tile(kind);
        let mut rng = seeded_rng(11);
        let alpha = T::from_f64(1.5);
        let sentinel = T::from_f64(-7.0);
        for &k in &[1, 2, 7, 8, 9, 33] {
            let ap: Vec<T> = random_vec(&mut rng, k * mr);
            let bp: Vec<T> = random_vec(&mut rng, k * nr);
            for m in 1..=mr {
                for n in 1..=nr {
                    // column major, row major and a padded general stride
                    for &(c_rs, c_cs) in &[(1, mr + 3), (nr + 2, 1), (2, 2 * mr + 1)] {
                        let len = (mr - 1) * c_rs + (nr - 1) * c_cs + 1;
                        let mut c = vec![sentinel; len];
                        let mut expected = c.clone();
                        for j in 0..n {
                            for i in 0..m {
                                let mut acc = 0.0;
                                for p in 0..k {
                                    acc += ap[p * mr + i].to_f64() * bp[p * nr + j].to_f64();
                                }
                                let idx = i * c_rs + j * c_cs;
                                expected[idx] = T::from_f64(expected[idx].to_f64() + alpha.to_f64() * acc);
                            }
                        }
                        unsafe { kernel(k, alpha, ap.as_ptr(), bp.as_ptr(), c.as_mut_ptr(), c_rs, c_cs, m, n) };
                        let tol = 16.0 * T::EPS * (k as f64 * 1.5 * 100.0 + 7.0);
                        for idx in 0..len {
                            let diff = (c[idx].to_f64() - expected[idx].to_f64()).abs();
                            assert!(
                                diff <= tol,
                                "{} k={k} m={m} n={n} strides=({c_rs}, {c_cs}) idx={idx}: {:?} vs {:?}",
                                kind.name(),
                                c[idx],
                                expected[idx]
                            );
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn kernels_match_naive_on_every_tail() {
        for kind in KernelKind::available() {
            check_kernel::<f32>(kind);
            check_kernel::<f64>(kind);
        }
    }

    #[test]
    fn padded_lanes_do_not_leak_nan() {
        // NaN in B columns beyond n must not reach C
        for kind in KernelKind::available() {
            let kernel = f32::micro_kernel(kind).unwrap();
            let (mr, nr) = f32::tile(kind);
            let ap = vec![1.0f32; mr];
            let mut bp = vec![f32::NAN; nr];
            bp[0] = 2.0;
            let mut c = vec![0.0f32; mr * nr];
            unsafe { kernel(1, 1.0, ap.as_ptr(), bp.as_ptr(), c.as_mut_ptr(), 1, mr, mr, 1) };
            assert!(c[..mr].iter().all(|&x| x == 2.0), "{}", kind.name());
            assert!(c[mr..].iter().all(|&x| x == 0.0), "{}", kind.name());
        }
    }
}
