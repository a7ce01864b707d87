//! # This crate is only for internal use in the tilr project
//! Nothing is expected to be used outside this module
//! No semver guarantees

use once_cell::sync::Lazy;

pub mod blocking;
pub mod error;
pub mod matrix;
pub mod par;
pub mod pool;
pub mod range_lock;

pub use blocking::{round_down, round_up, Blocking, K_PEEL};
pub use error::{GemmError, Result};
pub use matrix::{MatMut, MatRef, StorageOrder, StridedMatrix, StridedMatrixMut};
pub use par::{fork_join, thread_pool, Parallelism, SliceAxis, SlicePlan, PAR_FLOP_THRESHOLD};
pub use pool::{reserve_scratch, scratch_bytes, split_scratch, PackPool, PACK_POOL, PANEL_ALIGN};
pub use range_lock::{RangeLockResult, TileClaims, TileGuard};

#[cfg(target_arch = "x86_64")]
#[derive(Copy, Clone, Debug)]
pub struct CpuFeatures {
    pub sse: bool,
    pub sse2: bool,
    pub avx: bool,
    pub avx2: bool,
    pub fma: bool,
}

#[cfg(target_arch = "aarch64")]
#[derive(Copy, Clone, Debug)]
pub struct CpuFeatures {
    pub neon: bool,
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
#[derive(Copy, Clone, Debug)]
pub struct CpuFeatures {
    pub dummy: bool,
}

/// Data cache capacities in bytes, as seen by one core.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CacheSizes {
    pub l1: usize,
    pub l2: usize,
    pub l3: usize,
}

impl CacheSizes {
    /// Used whenever the hardware does not report a level.
    pub const FALLBACK: CacheSizes = CacheSizes { l1: 32 * 1024, l2: 512 * 1024, l3: 8 * 1024 * 1024 };

    pub fn new(l1: usize, l2: usize, l3: usize) -> Self {
        Self { l1, l2, l3 }
    }

    /// Replaces each level with `TILR_L{1,2,3}_CACHE` when that variable holds a valid size.
    pub fn with_env_overrides(self) -> Self {
        Self {
            l1: env_bytes("TILR_L1_CACHE").unwrap_or(self.l1),
            l2: env_bytes("TILR_L2_CACHE").unwrap_or(self.l2),
            l3: env_bytes("TILR_L3_CACHE").unwrap_or(self.l3),
        }
    }
}

impl Default for CacheSizes {
    fn default() -> Self {
        Self::FALLBACK
    }
}

fn env_bytes(name: &str) -> Option<usize> {
    let value = std::env::var(name).ok()?;
    parse_bytes(&value)
}

/// Parses a byte count such as `32768`, `48K`, `48KiB` or `2MB`.
/// Zero and malformed values give `None`.
pub fn parse_bytes(s: &str) -> Option<usize> {
    let s = s.trim().to_ascii_lowercase();
    let (digits, scale) = if let Some(d) = s.strip_suffix("kib").or_else(|| s.strip_suffix("kb")).or_else(|| s.strip_suffix('k')) {
        (d, 1024)
    } else if let Some(d) = s.strip_suffix("mib").or_else(|| s.strip_suffix("mb")).or_else(|| s.strip_suffix('m')) {
        (d, 1024 * 1024)
    } else {
        (s.as_str(), 1)
    };
    let n = digits.trim().parse::<usize>().ok()?.checked_mul(scale)?;
    if n == 0 {
        return None;
    }
    Some(n)
}

#[derive(Copy, Clone, Debug)]
pub struct HWConfig {
    pub cpu_ft: CpuFeatures,
    pub cache: CacheSizes,
}

#[cfg(target_arch = "x86_64")]
fn detect_cache_sizes(cpuid: &raw_cpuid::CpuId<raw_cpuid::CpuIdReaderNative>) -> CacheSizes {
    use raw_cpuid::CacheType;
    let mut sizes = CacheSizes::FALLBACK;
    if let Some(params) = cpuid.get_cache_parameters() {
        for cache in params {
            let size =
                cache.associativity() * cache.physical_line_partitions() * cache.coherency_line_size() * cache.sets();
            if size == 0 {
                continue;
            }
            match (cache.level(), cache.cache_type()) {
                (1, CacheType::Data) => sizes.l1 = size,
                (2, CacheType::Unified) => sizes.l2 = size,
                (3, CacheType::Unified) => sizes.l3 = size,
                _ => {}
            }
        }
        return sizes;
    }
    // amd reports through the extended leaves instead
    if let Some(l1) = cpuid.get_l1_cache_and_tlb_info() {
        let l1_size = l1.dcache_size() as usize * 1024;
        if l1_size > 0 {
            sizes.l1 = l1_size;
        }
    }
    if let Some(l23) = cpuid.get_l2_l3_cache_and_tlb_info() {
        let l2_size = l23.l2cache_size() as usize * 1024;
        let l3_size = l23.l3cache_size() as usize * 512 * 1024;
        if l2_size > 0 {
            sizes.l2 = l2_size;
        }
        if l3_size > 0 {
            sizes.l3 = l3_size;
        }
    }
    sizes
}

#[inline]
fn detect_hw_config() -> HWConfig {
    #[cfg(target_arch = "x86_64")]
    {
        let cpuid = raw_cpuid::CpuId::new();
        let (sse, sse2, avx, fma) = match cpuid.get_feature_info() {
            Some(info) => (info.has_sse(), info.has_sse2(), info.has_avx(), info.has_fma()),
            None => (false, false, false, false),
        };
        let avx2 = cpuid.get_extended_feature_info().map_or(false, |info| info.has_avx2());
        // cpuid bits alone say nothing about os support for the ymm state
        let avx = avx && std::is_x86_feature_detected!("avx");
        let fma = fma && std::is_x86_feature_detected!("fma");
        let cache = detect_cache_sizes(&cpuid).with_env_overrides();
        return HWConfig { cpu_ft: CpuFeatures { sse, sse2, avx, avx2, fma }, cache };
    }
    #[cfg(target_arch = "aarch64")]
    {
        use std::arch::is_aarch64_feature_detected;
        let neon = is_aarch64_feature_detected!("neon");
        return HWConfig { cpu_ft: CpuFeatures { neon }, cache: CacheSizes::FALLBACK.with_env_overrides() };
    }
    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    {
        return HWConfig { cpu_ft: CpuFeatures { dummy: false }, cache: CacheSizes::FALLBACK.with_env_overrides() };
    }
}

#[cfg(feature = "debug_cpu_features")]
fn apply_debug_cpu_features(cpu_ft: &mut CpuFeatures) {
    #[cfg(target_arch = "x86_64")]
    {
        let sse_turn_off = std::env::var("TILR_SSE_OFF").is_ok();
        let sse2_turn_off = std::env::var("TILR_SSE2_OFF").is_ok();
        let avx_turn_off = std::env::var("TILR_AVX_OFF").is_ok();
        let avx2_turn_off = std::env::var("TILR_AVX2_OFF").is_ok();
        let fma_turn_off = std::env::var("TILR_FMA_OFF").is_ok();

        cpu_ft.sse = cpu_ft.sse && !sse_turn_off;
        cpu_ft.sse2 = cpu_ft.sse2 && !sse2_turn_off;
        cpu_ft.avx = cpu_ft.avx && !avx_turn_off;
        cpu_ft.avx2 = cpu_ft.avx2 && !avx2_turn_off;
        cpu_ft.fma = cpu_ft.fma && !fma_turn_off;
    }
    #[cfg(target_arch = "aarch64")]
    {
        let neon_turn_off = std::env::var("TILR_NEON_OFF").is_ok();
        cpu_ft.neon = cpu_ft.neon && !neon_turn_off;
    }
    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    {
        let _ = cpu_ft;
    }
}

pub static RUNTIME_HW_CONFIG: Lazy<HWConfig> = Lazy::new(|| {
    #[allow(unused_mut)]
    let mut hw_config = detect_hw_config();
    #[cfg(feature = "debug_cpu_features")]
    apply_debug_cpu_features(&mut hw_config.cpu_ft);
    log::debug!("detected hardware: {:?}", hw_config);
    hw_config
});

pub static TILR_NUM_THREADS: Lazy<usize> = Lazy::new(|| {
    let n_core = std::thread::available_parallelism().map_or(1, |n| n.get());
    // TILR_NUM_THREADS or the number of logical cores
    std::env::var("TILR_NUM_THREADS")
        .ok()
        .and_then(|x| x.trim().parse::<usize>().ok())
        .filter(|&n| n > 0)
        .unwrap_or(n_core)
});

static TILR_KERNEL: Lazy<Option<String>> =
    Lazy::new(|| std::env::var("TILR_KERNEL").ok().map(|s| s.trim().to_ascii_lowercase()).filter(|s| !s.is_empty()));

// once this is read, this cannot be changed for the time being.
#[inline(always)]
pub fn tilr_num_threads() -> usize {
    *TILR_NUM_THREADS
}

/// Kernel name requested through `TILR_KERNEL`, lowercased.
pub fn requested_kernel() -> Option<&'static str> {
    TILR_KERNEL.as_deref()
}

#[cfg(target_arch = "x86_64")]
pub(crate) mod cpu_features {
    use super::RUNTIME_HW_CONFIG;

    pub fn has_sse() -> bool {
        RUNTIME_HW_CONFIG.cpu_ft.sse && RUNTIME_HW_CONFIG.cpu_ft.sse2
    }

    pub fn has_avx_fma() -> bool {
        RUNTIME_HW_CONFIG.cpu_ft.avx && RUNTIME_HW_CONFIG.cpu_ft.fma
    }

    pub fn has_neon() -> bool {
        false
    }
}

#[cfg(target_arch = "aarch64")]
pub(crate) mod cpu_features {
    use super::RUNTIME_HW_CONFIG;

    pub fn has_sse() -> bool {
        false
    }

    pub fn has_avx_fma() -> bool {
        false
    }

    pub fn has_neon() -> bool {
        RUNTIME_HW_CONFIG.cpu_ft.neon
    }
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
pub(crate) mod cpu_features {
    pub fn has_sse() -> bool {
        false
    }

    pub fn has_avx_fma() -> bool {
        false
    }

    pub fn has_neon() -> bool {
        false
    }
}

pub use cpu_features::*;

pub fn cache_sizes() -> CacheSizes {
    RUNTIME_HW_CONFIG.cache
}

/// Smallest buffer length addressable by a `m x n` view with strides `(rs, cs)`,
/// or `None` when that length does not fit in `usize`.
pub fn matrix_size_strided(m: usize, n: usize, rs: usize, cs: usize) -> Option<usize> {
    if m == 0 || n == 0 {
        return Some(0);
    }
    (m - 1).checked_mul(rs)?.checked_add((n - 1).checked_mul(cs)?)?.checked_add(1)
}
