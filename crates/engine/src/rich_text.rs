//! Character-level rich text: a plain string paired with format runs.
//!
//! A [`FormattedText`] is a value, not an object: every operation returns a
//! new value and never mutates its input. Run invariants hold after every
//! operation: runs are sorted by start, non-overlapping, in-bounds over the
//! text, and adjacent runs with identical format are coalesced.
//!
//! Positions are byte offsets into the text and are clamped to the nearest
//! char boundary at or before the requested offset.

use serde::{Deserialize, Serialize};

// =============================================================================
// CharacterFormat
// =============================================================================

/// Per-character formatting options.
///
/// Every field is optional; an absent field means "inherit the cell-level
/// format". Merging is field-wise: present fields win.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CharacterFormat {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bold: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub italic: Option<bool>,
    /// 0 = none, 1 = single, 2 = double
    #[serde(skip_serializing_if = "Option::is_none")]
    pub underline: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strikethrough: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_family: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
}

impl CharacterFormat {
    /// True when no field is set.
    pub fn is_empty(&self) -> bool {
        self.bold.is_none()
            && self.italic.is_none()
            && self.underline.is_none()
            && self.strikethrough.is_none()
            && self.font_family.is_none()
            && self.font_size.is_none()
            && self.font_color.is_none()
            && self.background_color.is_none()
    }

    /// Field-wise override: fields present in `over` win, everything else
    /// comes from `self`.
    pub fn overridden_by(&self, over: &CharacterFormat) -> CharacterFormat {
        CharacterFormat {
            bold: over.bold.or(self.bold),
            italic: over.italic.or(self.italic),
            underline: over.underline.or(self.underline),
            strikethrough: over.strikethrough.or(self.strikethrough),
            font_family: over.font_family.clone().or_else(|| self.font_family.clone()),
            font_size: over.font_size.or(self.font_size),
            font_color: over.font_color.clone().or_else(|| self.font_color.clone()),
            background_color: over
                .background_color
                .clone()
                .or_else(|| self.background_color.clone()),
        }
    }
}

// =============================================================================
// FormatRun / FormattedText
// =============================================================================

/// A half-open character range `[start, end)` with a format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormatRun {
    pub start: usize,
    pub end: usize,
    pub format: CharacterFormat,
}

impl FormatRun {
    pub fn new(start: usize, end: usize, format: CharacterFormat) -> Self {
        Self { start, end, format }
    }
}

/// A plain string paired with character-range format runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormattedText {
    pub text: String,
    pub runs: Vec<FormatRun>,
}

/// Clamp `pos` into `[0, text.len()]` on a char boundary.
fn clamp_boundary(text: &str, pos: usize) -> usize {
    let mut p = pos.min(text.len());
    while p > 0 && !text.is_char_boundary(p) {
        p -= 1;
    }
    p
}

impl FormattedText {
    /// Wrap a plain string with no runs.
    pub fn plain(s: impl Into<String>) -> Self {
        Self {
            text: s.into(),
            runs: Vec::new(),
        }
    }

    pub fn to_plain(&self) -> String {
        self.text.clone()
    }

    /// True when any run carries formatting.
    pub fn has_formatting(&self) -> bool {
        !self.runs.is_empty()
    }

    /// Insert `s` at `pos`.
    ///
    /// Runs entirely before the insertion point are untouched; runs at or
    /// after it shift right; a run spanning the point grows so the inserted
    /// text inherits the surrounding format.
    pub fn insert(&self, pos: usize, s: &str) -> FormattedText {
        if s.is_empty() {
            return self.clone();
        }
        let pos = clamp_boundary(&self.text, pos);
        let len = s.len();

        let mut text = String::with_capacity(self.text.len() + len);
        text.push_str(&self.text[..pos]);
        text.push_str(s);
        text.push_str(&self.text[pos..]);

        let runs = self
            .runs
            .iter()
            .map(|r| {
                if r.end <= pos {
                    r.clone()
                } else if r.start >= pos {
                    FormatRun::new(r.start + len, r.end + len, r.format.clone())
                } else {
                    // Spans the insertion point: extend
                    FormatRun::new(r.start, r.end + len, r.format.clone())
                }
            })
            .collect();

        let out = FormattedText { text, runs }.coalesced();
        debug_assert!(out.invariants_hold());
        out
    }

    /// Delete the half-open byte range `[start, end)`.
    pub fn delete(&self, start: usize, end: usize) -> FormattedText {
        let start = clamp_boundary(&self.text, start);
        let end = clamp_boundary(&self.text, end).max(start);
        if start == end {
            return self.clone();
        }
        let removed = end - start;

        let mut text = String::with_capacity(self.text.len() - removed);
        text.push_str(&self.text[..start]);
        text.push_str(&self.text[end..]);

        // Positions before the interval stay put, positions inside collapse
        // to `start`, positions after shift left.
        let clip = |p: usize| {
            if p <= start {
                p
            } else if p >= end {
                p - removed
            } else {
                start
            }
        };
        let runs = self
            .runs
            .iter()
            .filter_map(|r| {
                let s = clip(r.start);
                let e = clip(r.end);
                if s < e {
                    Some(FormatRun::new(s, e, r.format.clone()))
                } else {
                    None
                }
            })
            .collect();

        let out = FormattedText { text, runs }.coalesced();
        debug_assert!(out.invariants_hold());
        out
    }

    /// Merge `fmt` over every run in `[start, end)`, splitting runs at the
    /// boundaries. Uncovered gaps inside the interval get a fresh run with
    /// `fmt`. Empty ranges are a no-op.
    pub fn apply_format(&self, start: usize, end: usize, fmt: &CharacterFormat) -> FormattedText {
        let start = clamp_boundary(&self.text, start);
        let end = clamp_boundary(&self.text, end).max(start);
        if start == end || fmt.is_empty() {
            return self.clone();
        }

        let mut runs: Vec<FormatRun> = Vec::with_capacity(self.runs.len() + 2);
        // Track the covered portions of [start, end) so gaps can be filled
        let mut covered: Vec<(usize, usize)> = Vec::new();

        for r in &self.runs {
            // Portion before the interval
            if r.start < start {
                runs.push(FormatRun::new(r.start, r.end.min(start), r.format.clone()));
            }
            // Portion inside the interval
            let s = r.start.max(start);
            let e = r.end.min(end);
            if s < e {
                runs.push(FormatRun::new(s, e, r.format.overridden_by(fmt)));
                covered.push((s, e));
            }
            // Portion after the interval
            if r.end > end {
                runs.push(FormatRun::new(r.start.max(end), r.end, r.format.clone()));
            }
        }

        // Fill uncovered gaps inside [start, end) with the bare format
        covered.sort_unstable();
        let mut cursor = start;
        for (s, e) in covered {
            if s > cursor {
                runs.push(FormatRun::new(cursor, s, fmt.clone()));
            }
            cursor = cursor.max(e);
        }
        if cursor < end {
            runs.push(FormatRun::new(cursor, end, fmt.clone()));
        }

        runs.sort_by_key(|r| r.start);
        let out = FormattedText {
            text: self.text.clone(),
            runs,
        }
        .coalesced();
        debug_assert!(out.invariants_hold());
        out
    }

    /// Format of the run containing `pos`, preferring the left-adjacent run
    /// on a boundary. None when no run covers the position.
    pub fn format_at(&self, pos: usize) -> Option<&CharacterFormat> {
        let pos = pos.min(self.text.len());
        self.runs
            .iter()
            .find(|r| r.start < pos && pos <= r.end)
            .or_else(|| self.runs.iter().find(|r| r.start == pos && pos < r.end))
            .map(|r| &r.format)
    }

    /// Drop empty runs, sort, and merge adjacent runs with identical format.
    fn coalesced(mut self) -> FormattedText {
        self.runs.retain(|r| r.start < r.end && !r.format.is_empty());
        self.runs.sort_by_key(|r| r.start);
        let mut merged: Vec<FormatRun> = Vec::with_capacity(self.runs.len());
        for run in self.runs.drain(..) {
            match merged.last_mut() {
                Some(last) if last.end == run.start && last.format == run.format => {
                    last.end = run.end;
                }
                _ => merged.push(run),
            }
        }
        self.runs = merged;
        self
    }

    /// Verify the run invariants: sorted, non-overlapping, in-bounds,
    /// non-empty, coalesced.
    pub fn invariants_hold(&self) -> bool {
        let mut prev_end = 0usize;
        let mut prev_format: Option<&CharacterFormat> = None;
        for r in &self.runs {
            if r.start >= r.end || r.end > self.text.len() {
                return false;
            }
            if r.start < prev_end {
                return false;
            }
            if r.start == prev_end {
                if let Some(pf) = prev_format {
                    if *pf == r.format {
                        return false; // should have been coalesced
                    }
                }
            }
            prev_end = r.end;
            prev_format = Some(&r.format);
        }
        true
    }
}

/// Lift a plain string into a FormattedText with no runs.
pub fn ensure_formatted_text(s: &str) -> FormattedText {
    FormattedText::plain(s)
}
