use thiserror::Error;

/// Recoverable failures of a gemm call.
///
/// Shape and stride mistakes are not represented here: they are programmer
/// errors and trip assertions instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GemmError {
    #[error("failed to reserve {bytes} bytes of packing scratch")]
    Alloc { bytes: usize },

    #[error("failed to build worker pool: {0}")]
    ThreadPool(String),

    #[error("kernel `{0}` is not supported on this cpu")]
    KernelUnavailable(&'static str),

    #[error("block sizes must be positive, got mc={mc}, kc={kc}, nc={nc}")]
    InvalidBlocking { mc: usize, kc: usize, nc: usize },
}

pub type Result<T> = std::result::Result<T, GemmError>;
