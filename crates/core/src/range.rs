//! Rectangular cell ranges.
//!
//! Ranges are stored normalized (`start <= end` on both axes). Programmatic
//! construction goes through [`Range::new`], which rejects out-of-bounds
//! endpoints; [`Range::from_points`] normalizes user gestures (drag in any
//! direction).

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::addr::{CellAddress, MAX_COLS, MAX_ROWS};

/// Error for malformed programmatic ranges.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeError {
    #[error("cell ({row}, {col}) is outside the sheet limits")]
    OutOfBounds { row: usize, col: usize },
}

/// A normalized rectangular range of cells (inclusive endpoints).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub start_row: usize,
    pub start_col: usize,
    pub end_row: usize,
    pub end_col: usize,
}

impl Range {
    /// Build a range from already-ordered endpoints, validating bounds.
    pub fn new(
        start_row: usize,
        start_col: usize,
        end_row: usize,
        end_col: usize,
    ) -> Result<Self, RangeError> {
        let range = Self::from_points(
            CellAddress::new(start_row, start_col),
            CellAddress::new(end_row, end_col),
        );
        if range.end_row >= MAX_ROWS || range.end_col >= MAX_COLS {
            return Err(RangeError::OutOfBounds {
                row: range.end_row,
                col: range.end_col,
            });
        }
        Ok(range)
    }

    /// Build a range from two corner cells, normalizing to min/max.
    pub fn from_points(a: CellAddress, b: CellAddress) -> Self {
        Self {
            start_row: a.row.min(b.row),
            start_col: a.col.min(b.col),
            end_row: a.row.max(b.row),
            end_col: a.col.max(b.col),
        }
    }

    /// A single-cell range.
    pub fn single(addr: CellAddress) -> Self {
        Self::from_points(addr, addr)
    }

    pub fn start(&self) -> CellAddress {
        CellAddress::new(self.start_row, self.start_col)
    }

    pub fn end(&self) -> CellAddress {
        CellAddress::new(self.end_row, self.end_col)
    }

    pub fn rows(&self) -> usize {
        self.end_row - self.start_row + 1
    }

    pub fn cols(&self) -> usize {
        self.end_col - self.start_col + 1
    }

    pub fn cell_count(&self) -> usize {
        self.rows() * self.cols()
    }

    pub fn is_single_cell(&self) -> bool {
        self.start_row == self.end_row && self.start_col == self.end_col
    }

    pub fn contains(&self, addr: CellAddress) -> bool {
        addr.row >= self.start_row
            && addr.row <= self.end_row
            && addr.col >= self.start_col
            && addr.col <= self.end_col
    }

    pub fn intersects(&self, other: &Range) -> bool {
        self.start_row <= other.end_row
            && self.end_row >= other.start_row
            && self.start_col <= other.end_col
            && self.end_col >= other.start_col
    }

    /// Smallest range covering both.
    pub fn union(&self, other: &Range) -> Range {
        Range {
            start_row: self.start_row.min(other.start_row),
            start_col: self.start_col.min(other.start_col),
            end_row: self.end_row.max(other.end_row),
            end_col: self.end_col.max(other.end_col),
        }
    }

    /// Bounding box of a non-empty set of ranges.
    pub fn bounding(ranges: &[Range]) -> Option<Range> {
        let mut iter = ranges.iter();
        let first = *iter.next()?;
        Some(iter.fold(first, |acc, r| acc.union(r)))
    }

    /// Iterate every address in the range in row-major order.
    pub fn iter_row_major(&self) -> impl Iterator<Item = CellAddress> + '_ {
        (self.start_row..=self.end_row).flat_map(move |row| {
            (self.start_col..=self.end_col).map(move |col| CellAddress::new(row, col))
        })
    }
}
