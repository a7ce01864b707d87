use core::fmt::Debug;
use core::ops::{Add, Mul};

use tilr_base::{GemmError, Result, StridedMatrix, StridedMatrixMut};

use crate::driver::run_with;
use crate::kernel::{tiles, KernelFn, KernelKind, MicroKernel, RefKernel};
use crate::GemmOptions;

#[cfg(target_arch = "aarch64")]
use crate::kernel::NeonKernel;
#[cfg(target_arch = "x86_64")]
use crate::kernel::{AvxFmaKernel, SseKernel};

mod private {
    pub trait Sealed {}
    impl Sealed for f32 {}
    impl Sealed for f64 {}
}

/// Element types the gemm is implemented for: `f32` and `f64`.
pub trait GemmScalar:
    private::Sealed + Copy + Send + Sync + Debug + PartialEq + Add<Output = Self> + Mul<Output = Self> + 'static
{
    const ZERO: Self;
    const ONE: Self;

    /// `(mr, nr)` register tile of `kind` for this type.
    fn tile(kind: KernelKind) -> (usize, usize);

    /// Entry point of `kind`'s micro-kernel for this type, if compiled for this target.
    fn micro_kernel(kind: KernelKind) -> Option<KernelFn<Self>>;

    /// Runs the blocked product with the kernel type behind `kind`.
    ///
    /// # Safety
    /// Shapes, strides and pointers must describe valid, non-aliasing operands,
    /// and `kind` must be available on this cpu.
    #[doc(hidden)]
    #[allow(clippy::too_many_arguments)]
    unsafe fn gemm_dispatch(
        kind: KernelKind,
        m: usize,
        n: usize,
        k: usize,
        alpha: Self,
        a: StridedMatrix<Self>,
        b: StridedMatrix<Self>,
        c: StridedMatrixMut<Self>,
        opts: &GemmOptions,
    ) -> Result<()>;
}

macro_rules! impl_gemm_scalar {
    ($t:ident, $sse:ident, $avx:ident, $neon:ident) => {
        impl GemmScalar for $t {
            const ZERO: Self = 0.0;
            const ONE: Self = 1.0;

            fn tile(kind: KernelKind) -> (usize, usize) {
                match kind {
                    KernelKind::Reference => tiles::REF,
                    KernelKind::Sse => tiles::$sse,
                    KernelKind::AvxFma => tiles::$avx,
                    KernelKind::Neon => tiles::$neon,
                }
            }

            fn micro_kernel(kind: KernelKind) -> Option<KernelFn<Self>> {
                match kind {
                    KernelKind::Reference => Some(<RefKernel as MicroKernel<$t>>::run as KernelFn<Self>),
                    #[cfg(target_arch = "x86_64")]
                    KernelKind::Sse => Some(<SseKernel as MicroKernel<$t>>::run as KernelFn<Self>),
                    #[cfg(target_arch = "x86_64")]
                    KernelKind::AvxFma => Some(<AvxFmaKernel as MicroKernel<$t>>::run as KernelFn<Self>),
                    #[cfg(target_arch = "aarch64")]
                    KernelKind::Neon => Some(<NeonKernel as MicroKernel<$t>>::run as KernelFn<Self>),
                    #[allow(unreachable_patterns)]
                    _ => None,
                }
            }

            unsafe fn gemm_dispatch(
                kind: KernelKind,
                m: usize,
                n: usize,
                k: usize,
                alpha: Self,
                a: StridedMatrix<Self>,
                b: StridedMatrix<Self>,
                c: StridedMatrixMut<Self>,
                opts: &GemmOptions,
            ) -> Result<()> {
                match kind {
                    KernelKind::Reference => run_with::<$t, RefKernel>(m, n, k, alpha, a, b, c, opts),
                    #[cfg(target_arch = "x86_64")]
                    KernelKind::Sse => run_with::<$t, SseKernel>(m, n, k, alpha, a, b, c, opts),
                    #[cfg(target_arch = "x86_64")]
                    KernelKind::AvxFma => run_with::<$t, AvxFmaKernel>(m, n, k, alpha, a, b, c, opts),
                    #[cfg(target_arch = "aarch64")]
                    KernelKind::Neon => run_with::<$t, NeonKernel>(m, n, k, alpha, a, b, c, opts),
                    #[allow(unreachable_patterns)]
                    _ => Err(GemmError::KernelUnavailable(kind.name())),
                }
            }
        }
    };
}

impl_gemm_scalar!(f32, SSE_F32, AVX_F32, NEON_F32);
impl_gemm_scalar!(f64, SSE_F64, AVX_F64, NEON_F64);
