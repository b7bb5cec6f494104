//! Formula reference extraction and re-anchoring.
//!
//! Works on raw formula text so it stays useful mid-edit, when the formula
//! may not parse. String literals are skipped; `$` anchors are honored.

use regex::Regex;
use rustc_hash::FxHashSet;
use std::sync::OnceLock;

use gridkit_core::addr::{col_to_letters, letters_to_col, parse_a1, CellAddress, MAX_COLS, MAX_ROWS};

/// A reference found in formula text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRef {
    /// Top-left cell (normalized for ranges).
    pub start: CellAddress,
    /// Bottom-right cell; None for a single-cell reference.
    pub end: Option<CellAddress>,
    /// Byte range of the reference text within the formula.
    pub span: std::ops::Range<usize>,
}

impl ParsedRef {
    pub fn contains(&self, addr: CellAddress) -> bool {
        let end = self.end.unwrap_or(self.start);
        addr.row >= self.start.row
            && addr.row <= end.row
            && addr.col >= self.start.col
            && addr.col <= end.col
    }
}

fn ref_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\$?)([A-Za-z]{1,3})(\$?)([0-9]+)").unwrap())
}

/// Byte ranges of string literals in the formula (double-quoted, with
/// doubled-quote escapes).
fn string_spans(text: &str) -> Vec<std::ops::Range<usize>> {
    let mut spans = Vec::new();
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'"' {
            let start = i;
            i += 1;
            while i < bytes.len() {
                if bytes[i] == b'"' {
                    if bytes.get(i + 1) == Some(&b'"') {
                        i += 2; // escaped quote
                        continue;
                    }
                    i += 1;
                    break;
                }
                i += 1;
            }
            spans.push(start..i);
        } else {
            i += 1;
        }
    }
    spans
}

/// True when byte position `pos` falls inside a string literal, counting
/// unterminated literals as extending to the end of the text.
pub fn in_string_literal(text: &str, pos: usize) -> bool {
    let mut in_string = false;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if i >= pos {
            break;
        }
        if c == '"' {
            if in_string {
                if chars.peek().map(|(_, n)| *n) == Some('"') {
                    chars.next(); // escaped quote
                } else {
                    in_string = false;
                }
            } else {
                in_string = true;
            }
        }
    }
    in_string
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'.' || b == b'$' || b == b'!'
}

/// A regex match is a real cell reference only when it stands alone:
/// not glued to an identifier (rules out `LOG10`, sheet names) and not
/// followed by `(`.
fn standalone_match(text: &str, start: usize, end: usize) -> bool {
    let bytes = text.as_bytes();
    if start > 0 && is_ident_byte(bytes[start - 1]) {
        return false;
    }
    if let Some(&next) = bytes.get(end) {
        if is_ident_byte(next) || next == b'(' {
            return false;
        }
    }
    true
}

/// Extract every A1-style reference (cells and `ref:ref` ranges) from a
/// formula, in text order. Returns an empty list for non-formulas.
/// References whose decoded coordinates exceed the engine limits are
/// dropped silently.
pub fn extract_references(formula: &str) -> Vec<ParsedRef> {
    if !formula.starts_with('=') {
        return Vec::new();
    }

    let strings = string_spans(formula);
    let in_string = |pos: usize| strings.iter().any(|s| pos >= s.start && pos < s.end);

    // Collect candidate single-cell matches first
    let mut cells: Vec<(std::ops::Range<usize>, CellAddress)> = Vec::new();
    for m in ref_regex().find_iter(formula) {
        if in_string(m.start()) || !standalone_match(formula, m.start(), m.end()) {
            continue;
        }
        if let Some(addr) = parse_a1(m.as_str()) {
            if addr.in_bounds() {
                cells.push((m.range(), addr));
            }
        }
    }

    // Join `a:b` pairs into ranges
    let bytes = formula.as_bytes();
    let mut refs = Vec::with_capacity(cells.len());
    let mut i = 0;
    while i < cells.len() {
        let (span, addr) = cells[i].clone();
        let joined = cells.get(i + 1).and_then(|(next_span, next_addr)| {
            let gap = &bytes[span.end..next_span.start];
            if gap == b":" {
                Some((next_span.clone(), *next_addr))
            } else {
                None
            }
        });
        match joined {
            Some((next_span, next_addr)) => {
                let start = CellAddress::new(addr.row.min(next_addr.row), addr.col.min(next_addr.col));
                let end = CellAddress::new(addr.row.max(next_addr.row), addr.col.max(next_addr.col));
                let end = if start == end { None } else { Some(end) };
                refs.push(ParsedRef {
                    start,
                    end,
                    span: span.start..next_span.end,
                });
                i += 2;
            }
            None => {
                refs.push(ParsedRef {
                    start: addr,
                    end: None,
                    span,
                });
                i += 1;
            }
        }
    }
    refs
}

/// Deduplicated cell addresses referenced by a formula (range endpoints,
/// not expansions), in first-appearance order.
pub fn referenced_cells(formula: &str) -> Vec<CellAddress> {
    let mut seen = FxHashSet::default();
    let mut out = Vec::new();
    for r in extract_references(formula) {
        for addr in std::iter::once(r.start).chain(r.end) {
            if seen.insert(addr) {
                out.push(addr);
            }
        }
    }
    out
}

/// Shift every relative reference in a formula by `(row_delta, col_delta)`.
///
/// Anchored components (`$`) pass through unchanged. Unanchored components
/// clamp at the sheet origin (column 0, row 1) and at the engine limits.
/// Range endpoints are treated independently. String literals and
/// identifiers that merely look like references (`LOG10(`) are untouched.
pub fn shift_references(formula: &str, row_delta: i64, col_delta: i64) -> String {
    if !formula.starts_with('=') || (row_delta == 0 && col_delta == 0) {
        return formula.to_string();
    }

    let strings = string_spans(formula);
    let in_string = |pos: usize| strings.iter().any(|s| pos >= s.start && pos < s.end);

    let mut out = String::with_capacity(formula.len() + 4);
    let mut last = 0;
    for m in ref_regex().find_iter(formula) {
        out.push_str(&formula[last..m.start()]);
        last = m.start();

        if in_string(m.start()) || !standalone_match(formula, m.start(), m.end()) {
            continue;
        }

        let caps = ref_regex().captures(m.as_str()).unwrap();
        let col_abs = &caps[1] == "$";
        let row_abs = &caps[3] == "$";
        let Some(col) = letters_to_col(&caps[2]) else {
            continue;
        };
        let Ok(row_num) = caps[4].parse::<i64>() else {
            continue;
        };
        if row_num < 1 || row_num > MAX_ROWS as i64 || col >= MAX_COLS {
            continue; // not a plausible reference, leave as-is
        }

        let new_col = if col_abs {
            col as i64
        } else {
            (col as i64 + col_delta).clamp(0, MAX_COLS as i64 - 1)
        };
        let new_row = if row_abs {
            row_num
        } else {
            (row_num + row_delta).clamp(1, MAX_ROWS as i64)
        };

        out.push_str(&format!(
            "{}{}{}{}",
            if col_abs { "$" } else { "" },
            col_to_letters(new_col as usize),
            if row_abs { "$" } else { "" },
            new_row
        ));
        last = m.end();
    }
    out.push_str(&formula[last..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(row: usize, col: usize) -> CellAddress {
        CellAddress::new(row, col)
    }

    #[test]
    fn test_extract_single_and_range() {
        let refs = extract_references("=A1+SUM(B2:C4)");
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].start, addr(0, 0));
        assert_eq!(refs[0].end, None);
        assert_eq!(refs[1].start, addr(1, 1));
        assert_eq!(refs[1].end, Some(addr(3, 2)));
    }

    #[test]
    fn test_extract_normalizes_reversed_range() {
        let refs = extract_references("=C4:B2");
        assert_eq!(refs[0].start, addr(1, 1));
        assert_eq!(refs[0].end, Some(addr(3, 2)));
    }

    #[test]
    fn test_extract_collapses_degenerate_range() {
        let refs = extract_references("=A1:A1");
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].end, None);
    }

    #[test]
    fn test_extract_skips_strings_and_function_names() {
        let refs = extract_references("=LOG10(5)&\"A1\"&B2");
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].start, addr(1, 1));
    }

    #[test]
    fn test_extract_anchored_forms() {
        let refs = extract_references("=$A$1+B$2+$C3");
        assert_eq!(refs.len(), 3);
        assert_eq!(refs[0].start, addr(0, 0));
        assert_eq!(refs[1].start, addr(1, 1));
        assert_eq!(refs[2].start, addr(2, 2));
    }

    #[test]
    fn test_non_formula_yields_nothing() {
        assert!(extract_references("A1+B2").is_empty());
    }

    #[test]
    fn test_referenced_cells_dedup() {
        let cells = referenced_cells("=A1+A1+B2:C3");
        assert_eq!(cells, vec![addr(0, 0), addr(1, 1), addr(2, 2)]);
    }

    #[test]
    fn test_shift_all_four_anchor_forms() {
        let formula = "=A1 + $A$1 + A$1 + $A1";
        assert_eq!(shift_references(formula, 1, 0), "=A2 + $A$1 + A$1 + $A2");
        assert_eq!(shift_references(formula, 0, 1), "=B1 + $A$1 + B$1 + $A1");
    }

    #[test]
    fn test_shift_range_endpoints_independently() {
        assert_eq!(shift_references("=SUM(A1:B2)", 3, 3), "=SUM(D4:E5)");
    }

    #[test]
    fn test_shift_clamps_at_origin() {
        assert_eq!(shift_references("=B2", -5, -5), "=A1");
        assert_eq!(shift_references("=$B$2", -5, -5), "=$B$2");
    }

    #[test]
    fn test_shift_ignores_strings_and_function_names() {
        assert_eq!(
            shift_references("=LOG10(A1)&\"B2\"", 1, 0),
            "=LOG10(A2)&\"B2\""
        );
    }

    #[test]
    fn test_shift_roundtrip() {
        let cases = ["=A5+B7", "=SUM(C3:D9)*$E$1", "=A$2+$B3"];
        for f in cases {
            let shifted = shift_references(f, 2, 3);
            assert_eq!(shift_references(&shifted, -2, -3), f, "roundtrip of {f}");
        }
    }

    #[test]
    fn test_in_string_literal() {
        let f = "=\"ab\"&A1";
        assert!(in_string_literal(f, 2));
        assert!(!in_string_literal(f, 7));
    }
}
