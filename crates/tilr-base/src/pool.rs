use core::mem::{align_of, size_of};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard};

use crate::error::{GemmError, Result};

/// Alignment of every packed panel, enough for 512-bit loads.
pub const PANEL_ALIGN: usize = 64;

/// Packing scratch shared by all gemm calls of the process.
///
/// Buffers are never freed; a call borrows the first idle buffer that is large
/// enough and hands newly reserved ones back when it is done.
pub struct PackPool {
    buffer: RwLock<Vec<Mutex<Vec<u8>>>>,
}

pub static PACK_POOL: PackPool = PackPool::new();

fn acquire<'a>(pool_guard: &'a RwLockReadGuard<'a, Vec<Mutex<Vec<u8>>>>, size: usize) -> Option<MutexGuard<'a, Vec<u8>>> {
    // first idle buffer with enough room
    for slot in pool_guard.iter() {
        if let Ok(buf) = slot.try_lock() {
            if buf.len() >= size {
                return Some(buf);
            }
        }
    }
    None
}

impl PackPool {
    pub const fn new() -> Self {
        Self { buffer: RwLock::new(Vec::new()) }
    }

    /// Runs `f` on a scratch slice of exactly `bytes` bytes. Contents are unspecified.
    pub fn with_scratch<R>(&self, bytes: usize, f: impl FnOnce(&mut [u8]) -> R) -> Result<R> {
        {
            let pool_guard = self.buffer.read().unwrap_or_else(PoisonError::into_inner);
            let idle = acquire(&pool_guard, bytes);
            if let Some(mut buf) = idle {
                return Ok(f(&mut buf[..bytes]));
            }
        }
        let mut buf = reserve_scratch(bytes)?;
        let r = f(&mut buf[..]);
        self.extend(buf);
        Ok(r)
    }

    pub fn extend(&self, buf: Vec<u8>) {
        let mut pool_guard = self.buffer.write().unwrap_or_else(PoisonError::into_inner);
        pool_guard.push(Mutex::new(buf));
    }

    /// Number of buffers owned by the pool.
    pub fn len(&self) -> usize {
        self.buffer.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PackPool {
    fn default() -> Self {
        Self::new()
    }
}

/// Reserves a zeroed byte buffer, reporting failure instead of aborting.
pub fn reserve_scratch(bytes: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(bytes).map_err(|_| GemmError::Alloc { bytes })?;
    buf.resize(bytes, 0);
    Ok(buf)
}

/// Bytes needed to carve an `ap_len` and a `bp_len` element panel of `T`,
/// both aligned to [`PANEL_ALIGN`].
pub fn scratch_bytes<T>(ap_len: usize, bp_len: usize) -> Result<usize> {
    ap_len
        .checked_add(bp_len)
        .and_then(|len| len.checked_mul(size_of::<T>()))
        .and_then(|bytes| bytes.checked_add(2 * PANEL_ALIGN))
        .ok_or(GemmError::Alloc { bytes: usize::MAX })
}

/// Splits `mem` into two aligned, disjoint panels of `ap_len` and `bp_len` elements.
///
/// # Safety
/// Every bit pattern must be a valid `T` (plain floating point or integer types).
pub unsafe fn split_scratch<T>(mem: &mut [u8], ap_len: usize, bp_len: usize) -> (&mut [T], &mut [T]) {
    assert_eq!(PANEL_ALIGN % align_of::<T>(), 0);
    let ap_bytes = ap_len * size_of::<T>();
    let bp_bytes = bp_len * size_of::<T>();
    assert!(mem.len() >= ap_bytes + bp_bytes + 2 * PANEL_ALIGN);
    let offset = mem.as_ptr().align_offset(PANEL_ALIGN);
    let (a, rest) = mem[offset..].split_at_mut(ap_bytes);
    let offset = rest.as_ptr().align_offset(PANEL_ALIGN);
    let b = &mut rest[offset..offset + bp_bytes];
    (
        core::slice::from_raw_parts_mut(a.as_mut_ptr() as *mut T, ap_len),
        core::slice::from_raw_parts_mut(b.as_mut_ptr() as *mut T, bp_len),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversized_reservation_is_an_error() {
        assert_eq!(reserve_scratch(usize::MAX), Err(GemmError::Alloc { bytes: usize::MAX }));
        assert!(scratch_bytes::<f64>(usize::MAX / 2, usize::MAX / 2).is_err());
    }

    #[test]
    fn pool_reuses_buffers() {
        let pool = PackPool::new();
        let first = pool.with_scratch(4096, |buf| buf.as_ptr() as usize).unwrap();
        assert_eq!(pool.len(), 1);
        let second = pool.with_scratch(1024, |buf| {
            assert_eq!(buf.len(), 1024);
            buf.as_ptr() as usize
        });
        assert_eq!(second.unwrap(), first);
        assert_eq!(pool.len(), 1);
        // a larger request cannot use the pooled buffer
        pool.with_scratch(8192, |buf| assert_eq!(buf.len(), 8192)).unwrap();
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn split_panels_are_aligned_and_disjoint() {
        let bytes = scratch_bytes::<f32>(100, 37).unwrap();
        let mut mem = reserve_scratch(bytes).unwrap();
        let (ap, bp) = unsafe { split_scratch::<f32>(&mut mem, 100, 37) };
        assert_eq!(ap.len(), 100);
        assert_eq!(bp.len(), 37);
        assert_eq!(ap.as_ptr() as usize % PANEL_ALIGN, 0);
        assert_eq!(bp.as_ptr() as usize % PANEL_ALIGN, 0);
        let a_end = ap.as_ptr() as usize + 100 * 4;
        assert!(a_end <= bp.as_ptr() as usize);
        ap.fill(1.0);
        bp.fill(2.0);
        assert!(ap.iter().all(|&x| x == 1.0));
    }
}
