//! Clipboard operations: copy, cut, and Excel-grade paste special.
//!
//! The engine snapshots deep clones of source cells at copy time, so later
//! edits to the store never leak into the clipboard. A Copy survives any
//! number of pastes; a Cut is consumed by its first successful paste, which
//! clears the source cells and the clipboard atomically.

use std::time::Instant;

use thiserror::Error;

use gridkit_core::{CellAddress, Range, RangeError, MAX_COLS, MAX_ROWS};
use gridkit_engine::cell::{Alignment, Cell, CellValue};
use gridkit_engine::store::SparseCellStore;

use crate::refs::shift_references;

// =============================================================================
// Data model
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipboardKind {
    Copy,
    Cut,
}

/// One captured cell, positioned relative to the bounding box.
#[derive(Debug, Clone)]
pub struct ClipCell {
    pub row_offset: usize,
    pub col_offset: usize,
    pub origin: CellAddress,
    pub cell: Cell,
}

/// A clipboard snapshot.
#[derive(Debug, Clone)]
pub struct ClipboardData {
    pub kind: ClipboardKind,
    pub source_ranges: Vec<Range>,
    pub bounding: Range,
    pub cells: Vec<ClipCell>,
    pub rows: usize,
    pub cols: usize,
    /// TAB-separated columns, LF-separated rows, no trailing newline.
    /// Formula cells emit their evaluated result.
    pub plain_text: String,
    /// `<table>` markup with inline styles; all text HTML-escaped.
    pub html: String,
    pub is_multi_range: bool,
    /// Nonce for matching system-clipboard round-trips back to this entry.
    pub id: u128,
    pub created_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasteType {
    All,
    Values,
    Formulas,
    Formats,
    ValuesAndFormats,
    /// Reserved; pasting with it fails without mutating.
    Link,
    Transpose,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasteOperation {
    None,
    Add,
    Subtract,
    Multiply,
    Divide,
}

#[derive(Debug, Clone, Copy)]
pub struct PasteOptions {
    pub paste_type: PasteType,
    pub operation: PasteOperation,
    pub skip_blanks: bool,
    pub transpose: bool,
}

impl Default for PasteOptions {
    fn default() -> Self {
        Self {
            paste_type: PasteType::All,
            operation: PasteOperation::None,
            skip_blanks: false,
            transpose: false,
        }
    }
}

impl PasteOptions {
    pub fn values() -> Self {
        Self {
            paste_type: PasteType::Values,
            ..Default::default()
        }
    }

    fn transposed(&self) -> bool {
        self.transpose || self.paste_type == PasteType::Transpose
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PasteError {
    #[error("nothing to paste")]
    NoClipboardData,
    #[error("cut contents were already pasted")]
    CutAlreadyConsumed,
    #[error("link paste is reserved and not available")]
    Unsupported,
    #[error(transparent)]
    Range(#[from] RangeError),
}

/// What a successful paste touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasteOutcome {
    pub target: Range,
    pub written: Vec<CellAddress>,
}

// =============================================================================
// Engine
// =============================================================================

type ChangeHook = Box<dyn FnMut(Option<&ClipboardData>)>;
type PasteHook = Box<dyn FnMut(&Range, &[CellAddress])>;
type CutHook = Box<dyn FnMut(&Range)>;

/// Copy/cut/paste against a [`SparseCellStore`].
#[derive(Default)]
pub struct ClipboardEngine {
    data: Option<ClipboardData>,
    cut_consumed: bool,
    on_change: Option<ChangeHook>,
    on_paste: Option<PasteHook>,
    on_cut_complete: Option<CutHook>,
}

impl std::fmt::Debug for ClipboardEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClipboardEngine")
            .field("data", &self.data)
            .field("cut_consumed", &self.cut_consumed)
            .finish()
    }
}

impl ClipboardEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clipboard(&self) -> Option<&ClipboardData> {
        self.data.as_ref()
    }

    pub fn on_clipboard_change(&mut self, hook: impl FnMut(Option<&ClipboardData>) + 'static) {
        self.on_change = Some(Box::new(hook));
    }

    pub fn on_paste(&mut self, hook: impl FnMut(&Range, &[CellAddress]) + 'static) {
        self.on_paste = Some(Box::new(hook));
    }

    pub fn on_cut_complete(&mut self, hook: impl FnMut(&Range) + 'static) {
        self.on_cut_complete = Some(Box::new(hook));
    }

    // -------------------------------------------------------------------------
    // Copy / cut
    // -------------------------------------------------------------------------

    pub fn copy(&mut self, store: &SparseCellStore, ranges: &[Range]) -> Result<(), RangeError> {
        self.capture(store, ranges, ClipboardKind::Copy)
    }

    /// Indistinguishable from copy until paste: source cells stay in place
    /// until the first successful paste moves them.
    pub fn cut(&mut self, store: &SparseCellStore, ranges: &[Range]) -> Result<(), RangeError> {
        self.capture(store, ranges, ClipboardKind::Cut)
    }

    fn capture(
        &mut self,
        store: &SparseCellStore,
        ranges: &[Range],
        kind: ClipboardKind,
    ) -> Result<(), RangeError> {
        for r in ranges {
            // Ranges are normalized by construction; re-check bounds for
            // values built via from_points
            if r.end_row >= MAX_ROWS || r.end_col >= MAX_COLS {
                return Err(RangeError::OutOfBounds {
                    row: r.end_row,
                    col: r.end_col,
                });
            }
        }
        let Some(bounding) = Range::bounding(ranges) else {
            return Ok(()); // nothing selected, nothing captured
        };

        // Every position in the union, deduplicated by address, row-major.
        // Empty positions are captured too: pasting them clears targets
        // unless skip-blanks is on.
        let mut seen = rustc_hash::FxHashSet::default();
        let mut cells = Vec::new();
        for addr in bounding.iter_row_major() {
            if !ranges.iter().any(|r| r.contains(addr)) || !seen.insert(addr) {
                continue;
            }
            let cell = store.get_cloned(addr).unwrap_or_default();
            cells.push(ClipCell {
                row_offset: addr.row - bounding.start_row,
                col_offset: addr.col - bounding.start_col,
                origin: addr,
                cell,
            });
        }

        let plain_text = render_plain_text(&cells, bounding.rows(), bounding.cols());
        let html = render_html(&cells, bounding.rows(), bounding.cols());

        let data = ClipboardData {
            kind,
            source_ranges: ranges.to_vec(),
            bounding,
            rows: bounding.rows(),
            cols: bounding.cols(),
            cells,
            plain_text,
            html,
            is_multi_range: ranges.len() > 1,
            id: rand::random(),
            created_at: Instant::now(),
        };
        log::debug!(
            "{:?} captured {}x{} cells from {} range(s)",
            kind,
            data.rows,
            data.cols,
            data.source_ranges.len()
        );
        self.cut_consumed = false;
        self.data = Some(data);
        if let Some(hook) = self.on_change.as_mut() {
            hook(self.data.as_ref());
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Paste
    // -------------------------------------------------------------------------

    /// Paste the clipboard with its top-left at `target`.
    pub fn paste(
        &mut self,
        store: &mut SparseCellStore,
        target: CellAddress,
        opts: &PasteOptions,
    ) -> Result<PasteOutcome, PasteError> {
        let data = match &self.data {
            Some(d) => d,
            None if self.cut_consumed => return Err(PasteError::CutAlreadyConsumed),
            None => return Err(PasteError::NoClipboardData),
        };
        if opts.paste_type == PasteType::Link {
            return Err(PasteError::Unsupported);
        }

        let transposed = opts.transposed();
        let delta_row = target.row as i64 - data.bounding.start_row as i64;
        let delta_col = target.col as i64 - data.bounding.start_col as i64;
        let is_cut = data.kind == ClipboardKind::Cut;
        let source_ranges = data.source_ranges.clone();
        let bounding = data.bounding;
        let dims = if transposed {
            (data.cols, data.rows)
        } else {
            (data.rows, data.cols)
        };

        // Plan every write against the pre-paste store, then apply
        let mut writes: Vec<(CellAddress, Cell)> = Vec::with_capacity(data.cells.len());
        for clip in &data.cells {
            if opts.skip_blanks && clip.cell.is_blank() {
                continue;
            }
            let (r_off, c_off) = if transposed {
                (clip.col_offset, clip.row_offset)
            } else {
                (clip.row_offset, clip.col_offset)
            };
            let addr = CellAddress::new(target.row + r_off, target.col + c_off);
            if !addr.in_bounds() {
                continue;
            }
            let existing = store.get(addr);
            let new_cell = build_paste_cell(clip, existing, opts, delta_row, delta_col);
            writes.push((addr, new_cell));
        }

        self.apply_writes(store, target, dims, is_cut, source_ranges, bounding, writes)
    }

    /// Tile the clipboard pattern across a whole target range.
    pub fn paste_to_range(
        &mut self,
        store: &mut SparseCellStore,
        target: Range,
        opts: &PasteOptions,
    ) -> Result<PasteOutcome, PasteError> {
        let data = match &self.data {
            Some(d) => d,
            None if self.cut_consumed => return Err(PasteError::CutAlreadyConsumed),
            None => return Err(PasteError::NoClipboardData),
        };
        if opts.paste_type == PasteType::Link {
            return Err(PasteError::Unsupported);
        }

        let transposed = opts.transposed();
        let (rows, cols) = (data.rows, data.cols);
        let delta_row = target.start_row as i64 - data.bounding.start_row as i64;
        let delta_col = target.start_col as i64 - data.bounding.start_col as i64;
        let is_cut = data.kind == ClipboardKind::Cut;
        let source_ranges = data.source_ranges.clone();
        let bounding = data.bounding;

        let mut index = rustc_hash::FxHashMap::default();
        for clip in &data.cells {
            index.insert((clip.row_offset, clip.col_offset), clip);
        }

        let mut writes: Vec<(CellAddress, Cell)> = Vec::new();
        for addr in target.iter_row_major() {
            let dr = addr.row - target.start_row;
            let dc = addr.col - target.start_col;
            let offset = if transposed {
                (dc % rows, dr % cols)
            } else {
                (dr % rows, dc % cols)
            };
            let Some(clip) = index.get(&offset).copied() else {
                continue;
            };
            if opts.skip_blanks && clip.cell.is_blank() {
                continue;
            }
            let existing = store.get(addr);
            let new_cell = build_paste_cell(clip, existing, opts, delta_row, delta_col);
            writes.push((addr, new_cell));
        }

        let anchor = target.start();
        let dims = (target.rows(), target.cols());
        self.apply_writes(store, anchor, dims, is_cut, source_ranges, bounding, writes)
    }

    /// Apply the planned writes; on a cut, clear the sources and destroy
    /// the clipboard in the same step.
    #[allow(clippy::too_many_arguments)]
    fn apply_writes(
        &mut self,
        store: &mut SparseCellStore,
        target: CellAddress,
        (rows, cols): (usize, usize),
        is_cut: bool,
        source_ranges: Vec<Range>,
        bounding: Range,
        writes: Vec<(CellAddress, Cell)>,
    ) -> Result<PasteOutcome, PasteError> {
        if is_cut {
            for r in &source_ranges {
                store.clear_range(*r);
            }
        }

        let mut written = Vec::with_capacity(writes.len());
        for (addr, cell) in writes {
            store.set(addr, cell);
            written.push(addr);
        }

        let end = CellAddress::new(
            target.row + rows.saturating_sub(1),
            target.col + cols.saturating_sub(1),
        );
        let outcome = PasteOutcome {
            target: Range::from_points(target, end),
            written,
        };

        if is_cut {
            self.data = None;
            self.cut_consumed = true;
            if let Some(hook) = self.on_cut_complete.as_mut() {
                hook(&bounding);
            }
            if let Some(hook) = self.on_change.as_mut() {
                hook(None);
            }
        }
        if let Some(hook) = self.on_paste.as_mut() {
            hook(&outcome.target, &outcome.written);
        }
        log::debug!("pasted {} cells at {}", outcome.written.len(), target);
        Ok(outcome)
    }

    // -------------------------------------------------------------------------
    // External paste
    // -------------------------------------------------------------------------

    /// Paste host-clipboard text: rows split on `\r?\n`, columns on TAB.
    /// Tokens coerce to empty / boolean / number / text, preserving
    /// leading-zero strings as text.
    pub fn paste_external(
        &mut self,
        store: &mut SparseCellStore,
        text: &str,
        target: CellAddress,
    ) -> PasteOutcome {
        let mut written = Vec::new();
        let mut max_row = target.row;
        let mut max_col = target.col;

        for (row_offset, line) in text.split('\n').enumerate() {
            let line = line.strip_suffix('\r').unwrap_or(line);
            for (col_offset, token) in line.split('\t').enumerate() {
                let addr = CellAddress::new(target.row + row_offset, target.col + col_offset);
                if !addr.in_bounds() {
                    continue;
                }
                let value = parse_external_value(token);
                let mut cell = store.get_cloned(addr).unwrap_or_default();
                cell.value = value;
                store.set(addr, cell);
                written.push(addr);
                max_row = max_row.max(addr.row);
                max_col = max_col.max(addr.col);
            }
        }

        let outcome = PasteOutcome {
            target: Range::from_points(target, CellAddress::new(max_row, max_col)),
            written,
        };
        if let Some(hook) = self.on_paste.as_mut() {
            hook(&outcome.target, &outcome.written);
        }
        outcome
    }
}

// =============================================================================
// Per-cell paste logic
// =============================================================================

fn build_paste_cell(
    clip: &ClipCell,
    existing: Option<&Cell>,
    opts: &PasteOptions,
    delta_row: i64,
    delta_col: i64,
) -> Cell {
    let source = &clip.cell;
    match opts.paste_type {
        PasteType::All | PasteType::Transpose => {
            let mut cell = source.clone();
            if let CellValue::Formula { source: text, .. } = &source.value {
                cell.value = CellValue::Formula {
                    source: shift_references(text, delta_row, delta_col),
                    cached: None,
                };
                cell.dirty = true;
            } else {
                cell.value = combine_values(
                    existing.map(|c| &c.value).unwrap_or(&CellValue::Empty),
                    &source.value,
                    opts.operation,
                );
            }
            cell
        }
        PasteType::Values => {
            let mut cell = existing.cloned().unwrap_or_default();
            cell.value = combine_values(
                existing.map(|c| &c.value).unwrap_or(&CellValue::Empty),
                &source.value.evaluated(),
                opts.operation,
            );
            cell.dirty = false;
            cell
        }
        PasteType::Formulas => {
            let mut cell = existing.cloned().unwrap_or_default();
            match &source.value {
                CellValue::Formula { source: text, .. } => {
                    cell.value = CellValue::Formula {
                        source: shift_references(text, delta_row, delta_col),
                        cached: None,
                    };
                    cell.dirty = true;
                }
                other => cell.value = other.clone(),
            }
            cell
        }
        PasteType::Formats => {
            let mut cell = existing.cloned().unwrap_or_default();
            cell.format = source.format.clone();
            cell.borders = source.borders.clone();
            cell
        }
        PasteType::ValuesAndFormats => {
            let mut cell = existing.cloned().unwrap_or_default();
            cell.value = source.value.evaluated();
            cell.format = source.format.clone();
            cell.borders = source.borders.clone();
            cell.dirty = false;
            cell
        }
        PasteType::Link => unreachable!("rejected before planning"),
    }
}

/// Combine target and incoming values under a paste operation. Both sides
/// coerce to numbers (non-numeric becomes 0); dividing by zero writes the
/// conventional `#DIV/0!`.
fn combine_values(existing: &CellValue, incoming: &CellValue, op: PasteOperation) -> CellValue {
    if op == PasteOperation::None {
        return incoming.clone();
    }
    let a = existing.as_number();
    let b = incoming.as_number();
    match op {
        PasteOperation::Add => CellValue::Number(a + b),
        PasteOperation::Subtract => CellValue::Number(a - b),
        PasteOperation::Multiply => CellValue::Number(a * b),
        PasteOperation::Divide => {
            if b == 0.0 {
                CellValue::Error("#DIV/0!".to_string())
            } else {
                CellValue::Number(a / b)
            }
        }
        PasteOperation::None => unreachable!(),
    }
}

// =============================================================================
// Serialization
// =============================================================================

fn cell_at(cells: &[ClipCell], row: usize, col: usize) -> Option<&ClipCell> {
    cells
        .iter()
        .find(|c| c.row_offset == row && c.col_offset == col)
}

fn render_plain_text(cells: &[ClipCell], rows: usize, cols: usize) -> String {
    let mut out = String::new();
    for row in 0..rows {
        if row > 0 {
            out.push('\n');
        }
        for col in 0..cols {
            if col > 0 {
                out.push('\t');
            }
            if let Some(clip) = cell_at(cells, row, col) {
                out.push_str(&clip.cell.value.display());
            }
        }
    }
    out
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

fn cell_style(cell: &Cell) -> String {
    let Some(format) = &cell.format else {
        return String::new();
    };
    let mut style = String::new();
    if format.bold {
        style.push_str("font-weight:bold;");
    }
    if format.italic {
        style.push_str("font-style:italic;");
    }
    if format.underline {
        style.push_str("text-decoration:underline;");
    }
    if let Some(family) = &format.font_family {
        style.push_str(&format!("font-family:{};", family));
    }
    if let Some(size) = format.font_size {
        style.push_str(&format!("font-size:{}pt;", size));
    }
    if let Some(color) = &format.font_color {
        style.push_str(&format!("color:{};", color));
    }
    if let Some(bg) = &format.background_color {
        style.push_str(&format!("background-color:{};", bg));
    }
    match format.alignment {
        Alignment::Left => {}
        Alignment::Center => style.push_str("text-align:center;"),
        Alignment::Right => style.push_str("text-align:right;"),
    }
    style
}

fn render_html(cells: &[ClipCell], rows: usize, cols: usize) -> String {
    let mut out = String::from("<table>");
    for row in 0..rows {
        out.push_str("<tr>");
        for col in 0..cols {
            match cell_at(cells, row, col) {
                Some(clip) => {
                    let style = cell_style(&clip.cell);
                    if style.is_empty() {
                        out.push_str("<td>");
                    } else {
                        out.push_str(&format!("<td style=\"{}\">", style));
                    }
                    out.push_str(&escape_html(&clip.cell.value.display()));
                    out.push_str("</td>");
                }
                None => out.push_str("<td></td>"),
            }
        }
        out.push_str("</tr>");
    }
    out.push_str("</table>");
    out
}

// =============================================================================
// External value coercion
// =============================================================================

/// Coerce one external clipboard token. Empty becomes Empty, TRUE/FALSE
/// booleans, parseable numbers Number - except leading-zero digit strings
/// like `007`, which stay text.
pub fn parse_external_value(token: &str) -> CellValue {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return CellValue::Empty;
    }

    let upper = trimmed.to_ascii_uppercase();
    if upper == "TRUE" {
        return CellValue::Boolean(true);
    }
    if upper == "FALSE" {
        return CellValue::Boolean(false);
    }

    // Leading-zero guard: "007" is an identifier, not the number 7
    if trimmed.len() > 1 && trimmed.starts_with('0') {
        if trimmed
            .chars()
            .nth(1)
            .map(|c| c.is_ascii_digit())
            .unwrap_or(false)
        {
            return CellValue::Text(trimmed.to_string());
        }
    }

    if let Ok(n) = trimmed.parse::<f64>() {
        return CellValue::Number(n);
    }

    CellValue::Text(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridkit_engine::cell::CellFormat;

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

    fn single(addr_: CellAddress) -> Vec<Range> {
        vec![Range::single(addr_)]
    }

    #[test]
    fn test_paste_without_copy_errors() {
        let mut engine = ClipboardEngine::new();
        let mut store = SparseCellStore::new();
        let err = engine
            .paste(&mut store, addr(0, 0), &PasteOptions::default())
            .unwrap_err();
        assert_eq!(err, PasteError::NoClipboardData);
    }

    #[test]
    fn test_copy_then_paste_all() {
        let mut engine = ClipboardEngine::new();
        let mut store = store_with(&[(0, 0, "42"), (0, 1, "hello")]);
        engine
            .copy(&store, &[Range::new(0, 0, 0, 1).unwrap()])
            .unwrap();

        engine
            .paste(&mut store, addr(5, 5), &PasteOptions::default())
            .unwrap();
        assert_eq!(store.value(addr(5, 5)), CellValue::Number(42.0));
        assert_eq!(store.value(addr(5, 6)), CellValue::Text("hello".into()));
        // Copy survives further pastes
        engine
            .paste(&mut store, addr(8, 0), &PasteOptions::default())
            .unwrap();
        assert_eq!(store.value(addr(8, 0)), CellValue::Number(42.0));
    }

    #[test]
    fn test_formula_reanchors_on_paste() {
        // Seed scenario: (0,0) = "=SUM(A1:B2)", copy, paste at (3,3)
        let mut engine = ClipboardEngine::new();
        let mut store = store_with(&[(0, 0, "=SUM(A1:B2)")]);
        engine.copy(&store, &single(addr(0, 0))).unwrap();
        engine
            .paste(&mut store, addr(3, 3), &PasteOptions::default())
            .unwrap();

        match store.value(addr(3, 3)) {
            CellValue::Formula { source, .. } => assert_eq!(source, "=SUM(D4:E5)"),
            other => panic!("expected formula, got {:?}", other),
        }
        assert!(store.get(addr(3, 3)).unwrap().dirty);
        // Source untouched
        match store.value(addr(0, 0)) {
            CellValue::Formula { source, .. } => assert_eq!(source, "=SUM(A1:B2)"),
            other => panic!("expected formula, got {:?}", other),
        }
    }

    #[test]
    fn test_paste_values_with_divide() {
        // Seed scenario: source (10,0)=3, target (5,5)=10, divide
        let mut engine = ClipboardEngine::new();
        let mut store = store_with(&[(10, 0, "3"), (5, 5, "10")]);
        engine.copy(&store, &single(addr(10, 0))).unwrap();

        let opts = PasteOptions {
            paste_type: PasteType::Values,
            operation: PasteOperation::Divide,
            ..Default::default()
        };
        engine.paste(&mut store, addr(5, 5), &opts).unwrap();
        match store.value(addr(5, 5)) {
            CellValue::Number(n) => assert!((n - 10.0 / 3.0).abs() < 1e-12),
            other => panic!("expected number, got {:?}", other),
        }

        // Divide by zero writes the conventional error text
        let mut store = store_with(&[(10, 0, "0"), (5, 5, "10")]);
        engine.copy(&store, &single(addr(10, 0))).unwrap();
        engine.paste(&mut store, addr(5, 5), &opts).unwrap();
        assert_eq!(
            store.value(addr(5, 5)),
            CellValue::Error("#DIV/0!".into())
        );
        assert_eq!(store.value(addr(5, 5)).display(), "#DIV/0!");
    }

    #[test]
    fn test_paste_values_clears_formula() {
        let mut engine = ClipboardEngine::new();
        let mut store = SparseCellStore::new();
        store.set(
            addr(0, 0),
            Cell::new(CellValue::Formula {
                source: "=1+2".into(),
                cached: Some(Box::new(CellValue::Number(3.0))),
            }),
        );
        engine.copy(&store, &single(addr(0, 0))).unwrap();
        engine
            .paste(&mut store, addr(2, 0), &PasteOptions::values())
            .unwrap();
        assert_eq!(store.value(addr(2, 0)), CellValue::Number(3.0));
    }

    #[test]
    fn test_paste_formats_only() {
        let mut engine = ClipboardEngine::new();
        let mut store = store_with(&[(1, 1, "target")]);
        let mut styled = Cell::from_input("styled");
        styled.format = Some(CellFormat {
            bold: true,
            ..Default::default()
        });
        store.set(addr(0, 0), styled);

        engine.copy(&store, &single(addr(0, 0))).unwrap();
        let opts = PasteOptions {
            paste_type: PasteType::Formats,
            ..Default::default()
        };
        engine.paste(&mut store, addr(1, 1), &opts).unwrap();

        let cell = store.get(addr(1, 1)).unwrap();
        assert_eq!(cell.value, CellValue::Text("target".into()));
        assert!(cell.format.as_ref().unwrap().bold);
    }

    #[test]
    fn test_skip_blanks_preserves_target() {
        let mut engine = ClipboardEngine::new();
        let mut store = store_with(&[(0, 0, "x"), (5, 0, "keep"), (5, 1, "also")]);
        // Copy a 1x2 block whose second cell is empty
        engine
            .copy(&store, &[Range::new(0, 0, 0, 1).unwrap()])
            .unwrap();

        let opts = PasteOptions {
            skip_blanks: true,
            ..Default::default()
        };
        engine.paste(&mut store, addr(5, 0), &opts).unwrap();
        assert_eq!(store.value(addr(5, 0)), CellValue::Text("x".into()));
        assert_eq!(store.value(addr(5, 1)), CellValue::Text("also".into()));

        // Without skip-blanks the empty source clears the target
        engine.paste(&mut store, addr(5, 0), &PasteOptions::default()).unwrap();
        assert!(store.value(addr(5, 1)).is_blank());
    }

    #[test]
    fn test_transpose_swaps_offsets() {
        let mut engine = ClipboardEngine::new();
        let mut store = store_with(&[(0, 0, "a"), (0, 1, "b"), (1, 0, "c"), (1, 1, "d")]);
        engine
            .copy(&store, &[Range::new(0, 0, 1, 1).unwrap()])
            .unwrap();

        let opts = PasteOptions {
            paste_type: PasteType::Transpose,
            ..Default::default()
        };
        engine.paste(&mut store, addr(4, 0), &opts).unwrap();
        assert_eq!(store.value(addr(4, 0)), CellValue::Text("a".into()));
        assert_eq!(store.value(addr(4, 1)), CellValue::Text("c".into()));
        assert_eq!(store.value(addr(5, 0)), CellValue::Text("b".into()));
        assert_eq!(store.value(addr(5, 1)), CellValue::Text("d".into()));
    }

    #[test]
    fn test_cut_moves_on_first_paste_and_errors_on_second() {
        let mut engine = ClipboardEngine::new();
        let mut store = store_with(&[(0, 0, "move me")]);
        engine.cut(&store, &single(addr(0, 0))).unwrap();

        // Until paste, the source is intact
        assert_eq!(store.value(addr(0, 0)), CellValue::Text("move me".into()));

        engine
            .paste(&mut store, addr(3, 3), &PasteOptions::default())
            .unwrap();
        assert!(store.get(addr(0, 0)).is_none());
        assert_eq!(store.value(addr(3, 3)), CellValue::Text("move me".into()));

        // Second paste: error, nothing mutated
        let before = store.clone();
        let err = engine
            .paste(&mut store, addr(7, 7), &PasteOptions::default())
            .unwrap_err();
        assert_eq!(err, PasteError::CutAlreadyConsumed);
        assert_eq!(store.len(), before.len());
        assert!(store.get(addr(7, 7)).is_none());
    }

    #[test]
    fn test_cut_events_fire() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let cut_bounds: Rc<RefCell<Option<Range>>> = Rc::default();
        let cleared: Rc<RefCell<bool>> = Rc::default();

        let mut engine = ClipboardEngine::new();
        let sink = Rc::clone(&cut_bounds);
        engine.on_cut_complete(move |r| *sink.borrow_mut() = Some(*r));
        let sink = Rc::clone(&cleared);
        engine.on_clipboard_change(move |d| {
            if d.is_none() {
                *sink.borrow_mut() = true;
            }
        });

        let mut store = store_with(&[(0, 0, "x")]);
        engine.cut(&store, &single(addr(0, 0))).unwrap();
        engine
            .paste(&mut store, addr(1, 1), &PasteOptions::default())
            .unwrap();

        assert_eq!(*cut_bounds.borrow(), Some(Range::single(addr(0, 0))));
        assert!(*cleared.borrow());
    }

    #[test]
    fn test_deep_clone_isolation() {
        let mut engine = ClipboardEngine::new();
        let mut store = store_with(&[(0, 0, "original")]);
        engine.copy(&store, &single(addr(0, 0))).unwrap();

        // Mutating the store after copy does not affect the clipboard
        store.set_input(addr(0, 0), "mutated");
        engine
            .paste(&mut store, addr(1, 0), &PasteOptions::default())
            .unwrap();
        assert_eq!(store.value(addr(1, 0)), CellValue::Text("original".into()));
    }

    #[test]
    fn test_plain_text_serialization() {
        let mut engine = ClipboardEngine::new();
        let mut store = store_with(&[(0, 0, "1"), (0, 1, "2"), (1, 0, "3")]);
        store.set(
            addr(1, 1),
            Cell::new(CellValue::Formula {
                source: "=1+3".into(),
                cached: Some(Box::new(CellValue::Number(4.0))),
            }),
        );
        engine
            .copy(&store, &[Range::new(0, 0, 1, 1).unwrap()])
            .unwrap();

        // Formula cell emits its evaluated result; no trailing newline
        assert_eq!(engine.clipboard().unwrap().plain_text, "1\t2\n3\t4");
    }

    #[test]
    fn test_html_serialization_escapes_and_styles() {
        let mut engine = ClipboardEngine::new();
        let mut store = SparseCellStore::new();
        let mut cell = Cell::from_input("<b>&\"x\"");
        cell.format = Some(CellFormat {
            bold: true,
            background_color: Some("#ffff00".into()),
            ..Default::default()
        });
        store.set(addr(0, 0), cell);
        engine.copy(&store, &single(addr(0, 0))).unwrap();

        let html = &engine.clipboard().unwrap().html;
        assert!(html.starts_with("<table><tr><td"));
        assert!(html.contains("font-weight:bold;"));
        assert!(html.contains("background-color:#ffff00;"));
        assert!(html.contains("&lt;b&gt;&amp;&quot;x&quot;"));
        assert!(!html.contains("<b>"));
    }

    #[test]
    fn test_multi_range_dedup_and_bounding() {
        let mut engine = ClipboardEngine::new();
        let store = store_with(&[(0, 0, "a"), (0, 2, "b")]);
        // Overlapping ranges: A1:A1 twice plus C1
        engine
            .copy(
                &store,
                &[
                    Range::single(addr(0, 0)),
                    Range::single(addr(0, 0)),
                    Range::single(addr(0, 2)),
                ],
            )
            .unwrap();
        let data = engine.clipboard().unwrap();
        assert!(data.is_multi_range);
        assert_eq!(data.bounding, Range::new(0, 0, 0, 2).unwrap());
        // Deduplicated: A1 once, C1 once (B1 is not in any range)
        assert_eq!(data.cells.len(), 2);
        // The gap renders as an empty column
        assert_eq!(data.plain_text, "a\t\tb");
    }

    #[test]
    fn test_pattern_fill_tiles() {
        let mut engine = ClipboardEngine::new();
        let mut store = store_with(&[(0, 0, "x"), (0, 1, "y")]);
        engine
            .copy(&store, &[Range::new(0, 0, 0, 1).unwrap()])
            .unwrap();

        engine
            .paste_to_range(
                &mut store,
                Range::new(2, 0, 2, 4).unwrap(),
                &PasteOptions::default(),
            )
            .unwrap();
        let row: Vec<String> = (0..5).map(|c| store.value(addr(2, c)).display()).collect();
        assert_eq!(row, vec!["x", "y", "x", "y", "x"]);
    }

    #[test]
    fn test_pattern_fill_reanchors_formulas() {
        let mut engine = ClipboardEngine::new();
        let mut store = store_with(&[(0, 0, "=B1")]);
        engine.copy(&store, &single(addr(0, 0))).unwrap();
        engine
            .paste_to_range(
                &mut store,
                Range::new(1, 0, 2, 0).unwrap(),
                &PasteOptions::default(),
            )
            .unwrap();
        // Rigid translation by the range anchor delta
        match store.value(addr(1, 0)) {
            CellValue::Formula { source, .. } => assert_eq!(source, "=B2"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_link_paste_reserved() {
        let mut engine = ClipboardEngine::new();
        let mut store = store_with(&[(0, 0, "x")]);
        engine.copy(&store, &single(addr(0, 0))).unwrap();
        let opts = PasteOptions {
            paste_type: PasteType::Link,
            ..Default::default()
        };
        let err = engine.paste(&mut store, addr(1, 1), &opts).unwrap_err();
        assert_eq!(err, PasteError::Unsupported);
        assert!(store.get(addr(1, 1)).is_none());
    }

    #[test]
    fn test_external_paste_coercion() {
        let mut engine = ClipboardEngine::new();
        let mut store = SparseCellStore::new();
        engine.paste_external(&mut store, "1.5\tTRUE\t007\n\thello", addr(0, 0));

        assert_eq!(store.value(addr(0, 0)), CellValue::Number(1.5));
        assert_eq!(store.value(addr(0, 1)), CellValue::Boolean(true));
        assert_eq!(store.value(addr(0, 2)), CellValue::Text("007".into()));
        assert_eq!(store.value(addr(1, 0)), CellValue::Empty);
        assert_eq!(store.value(addr(1, 1)), CellValue::Text("hello".into()));
    }

    #[test]
    fn test_external_paste_crlf() {
        let mut engine = ClipboardEngine::new();
        let mut store = SparseCellStore::new();
        engine.paste_external(&mut store, "a\r\nb", addr(0, 0));
        assert_eq!(store.value(addr(0, 0)), CellValue::Text("a".into()));
        assert_eq!(store.value(addr(1, 0)), CellValue::Text("b".into()));
    }

    #[test]
    fn test_paste_add_operation() {
        let mut engine = ClipboardEngine::new();
        let mut store = store_with(&[(0, 0, "5"), (3, 0, "10")]);
        engine.copy(&store, &single(addr(0, 0))).unwrap();
        let opts = PasteOptions {
            operation: PasteOperation::Add,
            ..Default::default()
        };
        engine.paste(&mut store, addr(3, 0), &opts).unwrap();
        assert_eq!(store.value(addr(3, 0)), CellValue::Number(15.0));
    }

    #[test]
    fn test_reanchor_roundtrip_through_paste() {
        // adjust(adjust(f, +d), -d) == f while references stay in range
        let f = "=SUM(C3:D9)*$E$1";
        let shifted = shift_references(f, 4, 2);
        assert_eq!(shift_references(&shifted, -4, -2), f);
    }
}
