use std::ops::Range;
use std::sync::{Mutex, PoisonError};

/// # RangeLockResult
/// The result of a tile claim attempt
#[derive(Debug)]
pub enum RangeLockResult<Guard> {
    Ok(Guard),
    RangeConflict,
    BadRange,
}

impl<Guard> RangeLockResult<Guard> {
    pub fn unwrap(self) -> Guard {
        match self {
            RangeLockResult::Ok(guard) => guard,
            RangeLockResult::RangeConflict => panic!("RangeConflict Error"),
            RangeLockResult::BadRange => panic!("BadRange"),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, RangeLockResult::Ok(_))
    }
}

type Tile = (Range<usize>, Range<usize>);

fn overlaps(a: &Range<usize>, b: &Range<usize>) -> bool {
    a.start < b.end && b.start < a.end
}

/// # TileClaims
/// Bookkeeping of which rectangles of a `rows x cols` output are being written.
///
/// The parallel driver claims each slice before computing it; a claim that
/// intersects a live one is reported as a conflict. Nothing is guarded, the
/// tracker only observes.
pub struct TileClaims {
    rows: usize,
    cols: usize,
    live: Mutex<Vec<(usize, Tile)>>,
    next_id: Mutex<usize>,
}

pub struct TileGuard<'a> {
    claims: &'a TileClaims,
    id: usize,
}

impl Drop for TileGuard<'_> {
    fn drop(&mut self) {
        self.claims.release(self.id);
    }
}

impl TileClaims {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols, live: Mutex::new(Vec::new()), next_id: Mutex::new(0) }
    }

    pub fn claim(&self, rows: Range<usize>, cols: Range<usize>) -> RangeLockResult<TileGuard<'_>> {
        if rows.start >= rows.end || cols.start >= cols.end || rows.end > self.rows || cols.end > self.cols {
            return RangeLockResult::BadRange;
        }
        let mut live = self.live.lock().unwrap_or_else(PoisonError::into_inner);
        if live.iter().any(|(_, (r, c))| overlaps(r, &rows) && overlaps(c, &cols)) {
            return RangeLockResult::RangeConflict;
        }
        let id = {
            let mut next_id = self.next_id.lock().unwrap_or_else(PoisonError::into_inner);
            *next_id += 1;
            *next_id
        };
        live.push((id, (rows, cols)));
        RangeLockResult::Ok(TileGuard { claims: self, id })
    }

    /// Number of claims currently held.
    pub fn live(&self) -> usize {
        self.live.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn release(&self, id: usize) {
        let mut live = self.live.lock().unwrap_or_else(PoisonError::into_inner);
        live.retain(|(x, _)| *x != id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disjoint_tiles_coexist() {
        let claims = TileClaims::new(10, 10);
        let a = claims.claim(0..5, 0..10).unwrap();
        let b = claims.claim(5..10, 0..10).unwrap();
        assert_eq!(claims.live(), 2);
        drop(a);
        drop(b);
        assert_eq!(claims.live(), 0);
    }

    #[test]
    fn overlapping_tiles_conflict() {
        let claims = TileClaims::new(10, 10);
        let _a = claims.claim(0..6, 0..4).unwrap();
        assert!(matches!(claims.claim(5..10, 3..8), RangeLockResult::RangeConflict));
        // touching edges do not overlap
        assert!(claims.claim(6..10, 0..4).is_ok());
    }

    #[test]
    fn released_tiles_can_be_claimed_again() {
        let claims = TileClaims::new(4, 4);
        {
            let _g = claims.claim(0..4, 0..4).unwrap();
            assert!(!claims.claim(1..2, 1..2).is_ok());
        }
        assert!(claims.claim(1..2, 1..2).is_ok());
    }

    #[test]
    fn out_of_bounds_or_empty_is_bad_range() {
        let claims = TileClaims::new(4, 4);
        assert!(matches!(claims.claim(0..5, 0..1), RangeLockResult::BadRange));
        assert!(matches!(claims.claim(2..2, 0..1), RangeLockResult::BadRange));
    }
}
