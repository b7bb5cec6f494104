//! Sparse cell storage.
//!
//! The store is the single owner of all [`Cell`] instances. Other
//! components receive clones or read-only views; writes always go through
//! [`SparseCellStore::set`] so deep-clone isolation holds for anything a
//! caller kept around.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use gridkit_core::{CellAddress, Range};

use crate::cell::{Cell, CellValue};

/// Sparse mapping from cell coordinates to cells.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SparseCellStore {
    cells: HashMap<(usize, usize), Cell>,
}

impl SparseCellStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Read-only view of a cell.
    pub fn get(&self, addr: CellAddress) -> Option<&Cell> {
        self.cells.get(&(addr.row, addr.col))
    }

    /// Deep clone of a cell for callers that need to keep it.
    pub fn get_cloned(&self, addr: CellAddress) -> Option<Cell> {
        self.get(addr).cloned()
    }

    /// The value at an address; Empty when the cell is absent.
    pub fn value(&self, addr: CellAddress) -> CellValue {
        self.get(addr).map(|c| c.value.clone()).unwrap_or_default()
    }

    /// Store a cell. The store takes ownership of the passed cell; out of
    /// bounds addresses are ignored.
    pub fn set(&mut self, addr: CellAddress, cell: Cell) {
        if !addr.in_bounds() {
            return;
        }
        self.cells.insert((addr.row, addr.col), cell);
    }

    /// Coerce input text and store it, preserving any existing formatting.
    pub fn set_input(&mut self, addr: CellAddress, input: &str) {
        if !addr.in_bounds() {
            return;
        }
        let value = CellValue::from_input(input);
        match self.cells.get_mut(&(addr.row, addr.col)) {
            Some(cell) => cell.value = value,
            None => {
                if !value.is_blank() {
                    self.cells.insert((addr.row, addr.col), Cell::new(value));
                }
            }
        }
    }

    /// Remove a cell entirely, returning it.
    pub fn delete(&mut self, addr: CellAddress) -> Option<Cell> {
        self.cells.remove(&(addr.row, addr.col))
    }

    /// Enumerate occupied cells within a range in row-major order.
    pub fn cells_in_range(&self, range: Range) -> Vec<(CellAddress, &Cell)> {
        let mut out: Vec<(CellAddress, &Cell)> = self
            .cells
            .iter()
            .filter(|((row, col), _)| range.contains(CellAddress::new(*row, *col)))
            .map(|((row, col), cell)| (CellAddress::new(*row, *col), cell))
            .collect();
        out.sort_by_key(|(addr, _)| (addr.row, addr.col));
        out
    }

    /// Iterate all occupied cells (unordered).
    pub fn iter(&self) -> impl Iterator<Item = (CellAddress, &Cell)> {
        self.cells
            .iter()
            .map(|((row, col), cell)| (CellAddress::new(*row, *col), cell))
    }

    /// Delete every cell within a range, returning how many were removed.
    pub fn clear_range(&mut self, range: Range) -> usize {
        let targets: Vec<(usize, usize)> = self
            .cells
            .keys()
            .filter(|(row, col)| range.contains(CellAddress::new(*row, *col)))
            .copied()
            .collect();
        let count = targets.len();
        for key in targets {
            self.cells.remove(&key);
        }
        count
    }
}
