//! Fill handle: directional drag fill and auto-fill.
//!
//! A fill extends the source region in the drag direction. Multi-cell
//! numeric sources continue their linear progression; `Item1`-style
//! sources extend the trailing number; everything else tiles the source
//! pattern. Formulas re-anchor per target cell, and rich-text values are
//! deep-cloned so targets never share runs with the source.

use gridkit_core::{CellAddress, Range};
use gridkit_engine::cell::{Cell, CellValue};
use gridkit_engine::store::SparseCellStore;

use crate::refs::shift_references;

/// Detected pattern for one fill lane (a single row or column of the
/// source, read in the fill direction).
#[derive(Debug, Clone, PartialEq)]
enum LanePattern {
    /// Numeric progression with a constant step; continue it.
    Linear { last: f64, step: f64 },
    /// Common prefix with a trailing number; continue the number.
    AlphaNum {
        prefix: String,
        last: i64,
        step: i64,
        width: Option<usize>,
    },
    /// Repeat the source cells as a cycle.
    Tile,
}

/// Split a trailing integer off a text token: `Item12` -> (`Item`, 12).
/// Zero-padded numbers report their digit width so `Row001` keeps its
/// padding.
fn extract_trailing_number(text: &str) -> Option<(String, i64, Option<usize>)> {
    let digits_start = text
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, _)| i)?;
    let digits = &text[digits_start..];
    if digits.is_empty() || digits_start == 0 && text.parse::<f64>().is_ok() {
        return None; // purely numeric text is not an alphanumeric pattern
    }
    let num: i64 = digits.parse().ok()?;
    let width = if digits.starts_with('0') && digits.len() > 1 {
        Some(digits.len())
    } else {
        None
    };
    Some((text[..digits_start].to_string(), num, width))
}

fn detect_pattern(lane: &[&Cell]) -> LanePattern {
    if lane.len() < 2 {
        return LanePattern::Tile;
    }

    // All numbers with a constant step
    let numbers: Option<Vec<f64>> = lane
        .iter()
        .map(|c| match c.value {
            CellValue::Number(n) => Some(n),
            _ => None,
        })
        .collect();
    if let Some(nums) = numbers {
        let step = nums[1] - nums[0];
        if nums.windows(2).all(|w| (w[1] - w[0] - step).abs() <= f64::EPSILON * 8.0) {
            return LanePattern::Linear {
                last: *nums.last().unwrap(),
                step,
            };
        }
        return LanePattern::Tile;
    }

    // All text with a shared prefix and constant trailing-number step
    let parsed: Option<Vec<(String, i64, Option<usize>)>> = lane
        .iter()
        .map(|c| match &c.value {
            CellValue::Text(s) => extract_trailing_number(s),
            _ => None,
        })
        .collect();
    if let Some(parts) = parsed {
        let prefix = &parts[0].0;
        let step = parts[1].1 - parts[0].1;
        let consistent = parts.iter().all(|(p, _, _)| p == prefix)
            && parts.windows(2).all(|w| w[1].1 - w[0].1 == step);
        if consistent {
            let (_, last, width) = parts.last().unwrap().clone();
            return LanePattern::AlphaNum {
                prefix: prefix.clone(),
                last,
                step,
                width,
            };
        }
    }

    LanePattern::Tile
}

/// Produce the k-th generated cell (0-based) past the end of a lane.
fn generate(lane: &[(CellAddress, &Cell)], pattern: &LanePattern, k: usize, target: CellAddress) -> Cell {
    match pattern {
        LanePattern::Linear { last, step } => {
            Cell::new(CellValue::Number(last + step * (k as f64 + 1.0)))
        }
        LanePattern::AlphaNum {
            prefix,
            last,
            step,
            width,
        } => {
            let n = last + step * (k as i64 + 1);
            let text = match width {
                Some(w) => format!("{}{:0width$}", prefix, n, width = *w),
                None => format!("{}{}", prefix, n),
            };
            Cell::new(CellValue::Text(text))
        }
        LanePattern::Tile => {
            let (src_addr, src_cell) = lane[k % lane.len()];
            let mut cell = src_cell.clone();
            cell.merge = None;
            if let CellValue::Formula { source, .. } = &src_cell.value {
                cell.value = CellValue::Formula {
                    source: shift_references(
                        source,
                        target.row as i64 - src_addr.row as i64,
                        target.col as i64 - src_addr.col as i64,
                    ),
                    cached: None,
                };
                cell.dirty = true;
            }
            cell
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FillDirection {
    Up,
    Down,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy)]
struct DragState {
    source: Range,
    current: CellAddress,
}

/// Drag-driven fill over a cell store.
#[derive(Debug, Default)]
pub struct FillHandle {
    drag: Option<DragState>,
}

impl FillHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    pub fn start_drag(&mut self, source: Range) {
        self.drag = Some(DragState {
            source,
            current: source.end(),
        });
    }

    pub fn update_drag(&mut self, at: CellAddress) {
        if let Some(drag) = self.drag.as_mut() {
            drag.current = at;
        }
    }

    /// Finish the drag and write the fill. Returns the written addresses
    /// (empty when the drag never left the source).
    pub fn end_drag(&mut self, store: &mut SparseCellStore) -> Vec<CellAddress> {
        let Some(drag) = self.drag.take() else {
            return Vec::new();
        };
        let source = drag.source;
        let at = drag.current;

        let (direction, extent) = if at.row > source.end_row {
            (FillDirection::Down, at.row - source.end_row)
        } else if at.row < source.start_row {
            (FillDirection::Up, source.start_row - at.row)
        } else if at.col > source.end_col {
            (FillDirection::Right, at.col - source.end_col)
        } else if at.col < source.start_col {
            (FillDirection::Left, source.start_col - at.col)
        } else {
            return Vec::new();
        };

        fill(store, source, direction, extent)
    }

    /// Fill down based on the neighbor column's data extent: the column
    /// immediately left of the source (or right, when the left neighbor's
    /// first row is empty) is scanned from the source's first row; the
    /// fill stops where that column does.
    pub fn auto_fill(&self, store: &mut SparseCellStore, source: Range) -> Vec<CellAddress> {
        let probe_col = [
            source.start_col.checked_sub(1),
            Some(source.end_col + 1),
        ]
        .into_iter()
        .flatten()
        .find(|&col| {
            store
                .get(CellAddress::new(source.start_row, col))
                .map(|c| !c.is_blank())
                .unwrap_or(false)
        });
        let Some(probe_col) = probe_col else {
            return Vec::new();
        };

        let mut last_row = source.start_row;
        loop {
            let next = CellAddress::new(last_row + 1, probe_col);
            if store.get(next).map(|c| !c.is_blank()).unwrap_or(false) {
                last_row += 1;
            } else {
                break;
            }
        }
        if last_row <= source.end_row {
            return Vec::new();
        }

        fill(store, source, FillDirection::Down, last_row - source.end_row)
    }
}

/// Perform the fill: one lane per source column (vertical) or row
/// (horizontal), each extended `extent` cells in the given direction.
fn fill(
    store: &mut SparseCellStore,
    source: Range,
    direction: FillDirection,
    extent: usize,
) -> Vec<CellAddress> {
    // Plan all writes before touching the store
    let mut writes: Vec<(CellAddress, Cell)> = Vec::new();

    let vertical = matches!(direction, FillDirection::Up | FillDirection::Down);
    let lanes: Vec<usize> = if vertical {
        (source.start_col..=source.end_col).collect()
    } else {
        (source.start_row..=source.end_row).collect()
    };

    for lane_key in lanes {
        // Source cells in the fill direction
        let addrs: Vec<CellAddress> = match direction {
            FillDirection::Down => (source.start_row..=source.end_row)
                .map(|r| CellAddress::new(r, lane_key))
                .collect(),
            FillDirection::Up => (source.start_row..=source.end_row)
                .rev()
                .map(|r| CellAddress::new(r, lane_key))
                .collect(),
            FillDirection::Right => (source.start_col..=source.end_col)
                .map(|c| CellAddress::new(lane_key, c))
                .collect(),
            FillDirection::Left => (source.start_col..=source.end_col)
                .rev()
                .map(|c| CellAddress::new(lane_key, c))
                .collect(),
        };

        let cells: Vec<Cell> = addrs
            .iter()
            .map(|a| store.get_cloned(*a).unwrap_or_default())
            .collect();
        let lane: Vec<(CellAddress, &Cell)> =
            addrs.iter().copied().zip(cells.iter()).collect();
        let pattern = detect_pattern(&cells.iter().collect::<Vec<_>>());

        for k in 0..extent {
            let target = match direction {
                FillDirection::Down => CellAddress::new(source.end_row + 1 + k, lane_key),
                FillDirection::Up => {
                    let Some(row) = source.start_row.checked_sub(1 + k) else {
                        break;
                    };
                    CellAddress::new(row, lane_key)
                }
                FillDirection::Right => CellAddress::new(lane_key, source.end_col + 1 + k),
                FillDirection::Left => {
                    let Some(col) = source.start_col.checked_sub(1 + k) else {
                        break;
                    };
                    CellAddress::new(lane_key, col)
                }
            };
            if !target.in_bounds() {
                break;
            }
            writes.push((target, generate(&lane, &pattern, k, target)));
        }
    }

    let mut written = Vec::with_capacity(writes.len());
    for (addr, cell) in writes {
        store.set(addr, cell);
        written.push(addr);
    }
    log::debug!("filled {} cells {:?} from source block", written.len(), direction);
    written
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridkit_engine::rich_text::{CharacterFormat, FormatRun, FormattedText};

    fn addr(row: usize, col: usize) -> CellAddress {
        CellAddress::new(row, col)
    }

    fn store_with(entries: &[(usize, usize, &str)]) -> SparseCellStore {
        let mut store = SparseCellStore::new();
        for (row, col, input) in entries {
            store.set(addr(*row, *col), Cell::from_input(input));
        }
        store
    }

    fn drag_fill(store: &mut SparseCellStore, source: Range, to: CellAddress) -> Vec<CellAddress> {
        let mut handle = FillHandle::new();
        handle.start_drag(source);
        handle.update_drag(to);
        handle.end_drag(store)
    }

    #[test]
    fn test_single_cell_copies_down() {
        let mut store = store_with(&[(0, 0, "7")]);
        let written = drag_fill(&mut store, Range::single(addr(0, 0)), addr(3, 0));
        assert_eq!(written.len(), 3);
        for row in 1..=3 {
            assert_eq!(store.value(addr(row, 0)), CellValue::Number(7.0));
        }
    }

    #[test]
    fn test_linear_progression_continues() {
        let mut store = store_with(&[(0, 0, "2"), (1, 0, "4")]);
        drag_fill(&mut store, Range::new(0, 0, 1, 0).unwrap(), addr(4, 0));
        assert_eq!(store.value(addr(2, 0)), CellValue::Number(6.0));
        assert_eq!(store.value(addr(3, 0)), CellValue::Number(8.0));
        assert_eq!(store.value(addr(4, 0)), CellValue::Number(10.0));
    }

    #[test]
    fn test_linear_progression_fill_up() {
        let mut store = store_with(&[(5, 0, "10"), (6, 0, "8")]);
        drag_fill(&mut store, Range::new(5, 0, 6, 0).unwrap(), addr(3, 0));
        // Reading upward the series is 8, 10, so above continues 12, 14
        assert_eq!(store.value(addr(4, 0)), CellValue::Number(12.0));
        assert_eq!(store.value(addr(3, 0)), CellValue::Number(14.0));
    }

    #[test]
    fn test_nonlinear_numbers_tile() {
        let mut store = store_with(&[(0, 0, "1"), (1, 0, "2"), (2, 0, "4")]);
        drag_fill(&mut store, Range::new(0, 0, 2, 0).unwrap(), addr(5, 0));
        assert_eq!(store.value(addr(3, 0)), CellValue::Number(1.0));
        assert_eq!(store.value(addr(4, 0)), CellValue::Number(2.0));
        assert_eq!(store.value(addr(5, 0)), CellValue::Number(4.0));
    }

    #[test]
    fn test_alphanumeric_series() {
        let mut store = store_with(&[(0, 0, "Item1"), (1, 0, "Item2")]);
        drag_fill(&mut store, Range::new(0, 0, 1, 0).unwrap(), addr(3, 0));
        assert_eq!(store.value(addr(2, 0)), CellValue::Text("Item3".into()));
        assert_eq!(store.value(addr(3, 0)), CellValue::Text("Item4".into()));
    }

    #[test]
    fn test_alphanumeric_zero_padding() {
        let mut store = store_with(&[(0, 0, "Row008"), (1, 0, "Row009")]);
        drag_fill(&mut store, Range::new(0, 0, 1, 0).unwrap(), addr(2, 0));
        assert_eq!(store.value(addr(2, 0)), CellValue::Text("Row010".into()));
    }

    #[test]
    fn test_fill_right_tiles_pattern() {
        let mut store = store_with(&[(0, 0, "a"), (0, 1, "b")]);
        drag_fill(&mut store, Range::new(0, 0, 0, 1).unwrap(), addr(0, 4));
        assert_eq!(store.value(addr(0, 2)), CellValue::Text("a".into()));
        assert_eq!(store.value(addr(0, 3)), CellValue::Text("b".into()));
        assert_eq!(store.value(addr(0, 4)), CellValue::Text("a".into()));
    }

    #[test]
    fn test_formula_reanchors_per_target() {
        let mut store = store_with(&[(0, 0, "=B1*2")]);
        drag_fill(&mut store, Range::single(addr(0, 0)), addr(2, 0));
        match store.value(addr(1, 0)) {
            CellValue::Formula { source, .. } => assert_eq!(source, "=B2*2"),
            other => panic!("unexpected {:?}", other),
        }
        match store.value(addr(2, 0)) {
            CellValue::Formula { source, .. } => assert_eq!(source, "=B3*2"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(store.get(addr(1, 0)).unwrap().dirty);
    }

    #[test]
    fn test_formatted_text_fill_preserves_runs() {
        // Seed scenario: "Good morning" with bold "morning", filled down
        let bold = CharacterFormat {
            bold: Some(true),
            ..Default::default()
        };
        let source_value = FormattedText {
            text: "Good morning".into(),
            runs: vec![FormatRun::new(5, 12, bold.clone())],
        };
        let mut store = SparseCellStore::new();
        store.set(addr(0, 0), Cell::new(CellValue::Rich(source_value.clone())));

        drag_fill(&mut store, Range::single(addr(0, 0)), addr(3, 0));

        for row in 1..=3 {
            match store.value(addr(row, 0)) {
                CellValue::Rich(ft) => {
                    assert_eq!(ft.text, "Good morning");
                    assert_eq!(ft.runs, source_value.runs);
                }
                other => panic!("row {}: unexpected {:?}", row, other),
            }
        }

        // Mutating a target's runs leaves the source untouched
        let mut target = store.get_cloned(addr(1, 0)).unwrap();
        if let CellValue::Rich(ft) = &mut target.value {
            ft.runs.clear();
        }
        store.set(addr(1, 0), target);
        match store.value(addr(0, 0)) {
            CellValue::Rich(ft) => assert_eq!(ft.runs.len(), 1),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_drag_inside_source_is_noop() {
        let mut store = store_with(&[(0, 0, "x"), (1, 0, "y")]);
        let written = drag_fill(&mut store, Range::new(0, 0, 1, 0).unwrap(), addr(1, 0));
        assert!(written.is_empty());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_auto_fill_follows_left_neighbor() {
        // Data in column A down to row 4; seed in B1; auto-fill B
        let mut store = store_with(&[
            (0, 0, "a"),
            (1, 0, "b"),
            (2, 0, "c"),
            (3, 0, "d"),
            (4, 0, "e"),
            (0, 1, "1"),
        ]);
        let handle = FillHandle::new();
        let written = handle.auto_fill(&mut store, Range::single(addr(0, 1)));
        assert_eq!(written.len(), 4);
        for row in 1..=4 {
            assert_eq!(store.value(addr(row, 1)), CellValue::Number(1.0));
        }
    }

    #[test]
    fn test_auto_fill_falls_back_to_right_neighbor() {
        let mut store = store_with(&[(0, 1, "r1"), (1, 1, "r2"), (2, 1, "r3"), (0, 0, "seed")]);
        let handle = FillHandle::new();
        let written = handle.auto_fill(&mut store, Range::single(addr(0, 0)));
        assert_eq!(written.len(), 2);
        assert_eq!(store.value(addr(2, 0)), CellValue::Text("seed".into()));
    }

    #[test]
    fn test_auto_fill_without_neighbor_data_is_noop() {
        let mut store = store_with(&[(0, 5, "lonely")]);
        let handle = FillHandle::new();
        assert!(handle.auto_fill(&mut store, Range::single(addr(0, 5))).is_empty());
    }

    #[test]
    fn test_extract_trailing_number() {
        assert_eq!(
            extract_trailing_number("Item12"),
            Some(("Item".into(), 12, None))
        );
        assert_eq!(
            extract_trailing_number("Row001"),
            Some(("Row".into(), 1, Some(3)))
        );
        assert_eq!(extract_trailing_number("plain"), None);
        assert_eq!(extract_trailing_number("42"), None);
        assert_eq!(
            extract_trailing_number("a-5"),
            Some(("a-".into(), 5, None))
        );
    }
}
