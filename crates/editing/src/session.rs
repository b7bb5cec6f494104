//! The edit-session state machine.
//!
//! One `EditSession` is the single source of truth while a cell is being
//! edited: mode, text buffer, caret, selection, pending character format,
//! IME composition, and the references parsed out of a formula. Views pull
//! immutable snapshots; a commit sink receives the finished value. Nothing
//! in here touches the cell store.
//!
//! Failure semantics: user input never errors. Invalid positions clamp,
//! mode-incorrect requests are silent no-ops.

use std::ops::Range;
use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use gridkit_core::{CellAddress, Direction};
use gridkit_engine::cell::CellValue;
use gridkit_engine::rich_text::{CharacterFormat, FormattedText};

use crate::formula_context::{self, RecentFunctions, Suggestion};
use crate::intent::{
    is_printable_ascii, ClipboardAction, CommitResult, CommitValue, DeleteAction, EditAction,
    IntentOutcome, SpreadsheetIntent, TabEnterKey,
};
use crate::mode::EditMode;
use crate::point::{is_trigger_char, PointModeCoordinator, POINT_COLORS};
use crate::refs;

/// F2 mode cycling is bounded to one transition per this interval (5 Hz).
const F2_CYCLE_INTERVAL: Duration = Duration::from_millis(200);

/// Deletion direction for [`EditSession::delete_text`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteDirection {
    Backward,
    Forward,
}

/// Notification pushed to subscribers. Snapshots are pulled separately.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The snapshot may have changed.
    Changed,
    /// The mode changed (including to Navigate on commit/cancel).
    ModeChanged(EditMode),
}

/// A formula reference with its assigned palette slot, for view-layer
/// colorization. Colors are stable while the user types: the same
/// reference keeps its slot for the life of the session.
#[derive(Debug, Clone, PartialEq)]
pub struct ColoredRef {
    pub start: CellAddress,
    pub end: Option<CellAddress>,
    /// Byte range of the reference text in the buffer.
    pub span: Range<usize>,
    pub color_index: usize,
}

impl ColoredRef {
    pub fn color(&self) -> u32 {
        POINT_COLORS[self.color_index % POINT_COLORS.len()]
    }
}

/// Immutable view of the active session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditSnapshot {
    pub mode: EditMode,
    pub cell: CellAddress,
    pub text: String,
    pub formatted: Option<FormattedText>,
    /// Byte offset, always within `0..=text.len()`.
    pub cursor: usize,
    /// Normalized `(start, end)`, absent when collapsed.
    pub selection: Option<(usize, usize)>,
    pub pending_format: Option<CharacterFormat>,
    pub is_composing: bool,
    pub is_formula: bool,
    pub is_dirty: bool,
    pub referenced_cells: Vec<CellAddress>,
}

type RefKey = (CellAddress, Option<CellAddress>);

/// State owned for the lifetime of one edit.
#[derive(Debug)]
struct ActiveEdit {
    mode: EditMode,
    cell: CellAddress,
    original: CellValue,
    original_text: String,
    text: String,
    formatted: Option<FormattedText>,
    cursor: usize,
    anchor: Option<usize>,
    pending_format: Option<CharacterFormat>,
    composition: Option<(usize, usize)>,
    referenced: Vec<CellAddress>,
    colored_refs: Vec<ColoredRef>,
    ref_color_map: FxHashMap<RefKey, usize>,
    next_ref_color: usize,
    /// Byte position where the live Point-mode reference starts, while one
    /// is being adjusted.
    point_anchor: Option<usize>,
}

impl ActiveEdit {
    fn is_formula(&self) -> bool {
        self.text.starts_with('=')
    }

    fn selection(&self) -> Option<(usize, usize)> {
        let anchor = self.anchor?;
        if anchor == self.cursor {
            return None;
        }
        Some((anchor.min(self.cursor), anchor.max(self.cursor)))
    }
}

/// The editing core. Create one per grid; sessions come and go inside it.
pub struct EditSession {
    state: Option<ActiveEdit>,
    point: PointModeCoordinator,
    recent_functions: RecentFunctions,
    listeners: Vec<(u64, Box<dyn FnMut(&SessionEvent)>)>,
    next_listener_id: u64,
    last_f2_cycle: Option<Instant>,
}

impl Default for EditSession {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EditSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditSession")
            .field("mode", &self.mode())
            .field("state", &self.state)
            .finish()
    }
}

fn prev_char_boundary(text: &str, pos: usize) -> usize {
    let mut p = pos.min(text.len());
    while p > 0 {
        p -= 1;
        if text.is_char_boundary(p) {
            break;
        }
    }
    p
}

fn next_char_boundary(text: &str, pos: usize) -> usize {
    let mut p = pos.min(text.len());
    if p >= text.len() {
        return text.len();
    }
    p += 1;
    while p < text.len() && !text.is_char_boundary(p) {
        p += 1;
    }
    p
}

fn clamp_boundary(text: &str, pos: usize) -> usize {
    let mut p = pos.min(text.len());
    while p > 0 && !text.is_char_boundary(p) {
        p -= 1;
    }
    p
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn prev_word_boundary(text: &str, pos: usize) -> usize {
    let mut p = clamp_boundary(text, pos);
    // Skip trailing non-word characters, then the word itself
    while p > 0 {
        let prev = prev_char_boundary(text, p);
        let c = text[prev..].chars().next().unwrap();
        if is_word_char(c) {
            break;
        }
        p = prev;
    }
    while p > 0 {
        let prev = prev_char_boundary(text, p);
        let c = text[prev..].chars().next().unwrap();
        if !is_word_char(c) {
            break;
        }
        p = prev;
    }
    p
}

fn next_word_boundary(text: &str, pos: usize) -> usize {
    let mut p = clamp_boundary(text, pos);
    let len = text.len();
    while p < len {
        let c = text[p..].chars().next().unwrap();
        if is_word_char(c) {
            break;
        }
        p = next_char_boundary(text, p);
    }
    while p < len {
        let c = text[p..].chars().next().unwrap();
        if !is_word_char(c) {
            break;
        }
        p = next_char_boundary(text, p);
    }
    p
}

impl EditSession {
    pub fn new() -> Self {
        Self {
            state: None,
            point: PointModeCoordinator::new(),
            recent_functions: RecentFunctions::new(),
            listeners: Vec::new(),
            next_listener_id: 0,
            last_f2_cycle: None,
        }
    }

    // =========================================================================
    // Subscription and snapshots
    // =========================================================================

    /// Register a listener; returns an id for [`EditSession::unsubscribe`].
    /// Listeners fire at most once per mutating call and always observe the
    /// post-state through [`EditSession::snapshot`].
    pub fn subscribe(&mut self, listener: impl FnMut(&SessionEvent) + 'static) -> u64 {
        let id = self.next_listener_id;
        self.next_listener_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&mut self, id: u64) {
        self.listeners.retain(|(lid, _)| *lid != id);
    }

    fn emit(&mut self, event: SessionEvent) {
        let mut listeners = std::mem::take(&mut self.listeners);
        for (_, f) in listeners.iter_mut() {
            f(&event);
        }
        listeners.append(&mut self.listeners);
        self.listeners = listeners;
    }

    /// Immutable view of the current state; None when no session is active.
    pub fn snapshot(&self) -> Option<EditSnapshot> {
        let s = self.state.as_ref()?;
        Some(EditSnapshot {
            mode: s.mode,
            cell: s.cell,
            text: s.text.clone(),
            formatted: s.formatted.clone(),
            cursor: s.cursor,
            selection: s.selection(),
            pending_format: s.pending_format.clone(),
            is_composing: s.composition.is_some(),
            is_formula: s.is_formula(),
            is_dirty: s.text != s.original_text,
            referenced_cells: s.referenced.clone(),
        })
    }

    pub fn mode(&self) -> EditMode {
        self.state.as_ref().map(|s| s.mode).unwrap_or(EditMode::Navigate)
    }

    pub fn is_editing(&self) -> bool {
        self.state.is_some()
    }

    /// The value being edited over, while a session is active.
    pub fn original_value(&self) -> Option<&CellValue> {
        self.state.as_ref().map(|s| &s.original)
    }

    /// Parsed references with stable palette slots, for colorization.
    pub fn colored_refs(&self) -> &[ColoredRef] {
        self.state.as_ref().map(|s| s.colored_refs.as_slice()).unwrap_or(&[])
    }

    /// Autocomplete candidates for the current buffer and caret.
    pub fn suggestions(&self) -> Vec<Suggestion> {
        let Some(s) = self.state.as_ref() else {
            return Vec::new();
        };
        if !s.is_formula() {
            return Vec::new();
        }
        let ctx = formula_context::analyze(&s.text, s.cursor);
        formula_context::suggest(&ctx, &self.recent_functions)
    }

    /// Signature help for the innermost function call at the caret.
    pub fn argument_hint(&self) -> Option<formula_context::ArgumentHint> {
        let s = self.state.as_ref()?;
        if !s.is_formula() {
            return None;
        }
        let ctx = formula_context::analyze(&s.text, s.cursor);
        formula_context::argument_hint(&ctx)
    }

    // =========================================================================
    // Session lifecycle
    // =========================================================================

    /// Start editing a cell with its original content (F2 path). Caret
    /// lands at the end of the text.
    pub fn start_edit(&mut self, cell: CellAddress, original: CellValue) {
        let text = original.edit_text();
        let formatted = match &original {
            CellValue::Rich(ft) => Some(ft.clone()),
            _ => None,
        };
        let cursor = text.len();
        self.install(ActiveEdit {
            mode: EditMode::Edit,
            cell,
            original_text: text.clone(),
            original,
            text,
            formatted,
            cursor,
            anchor: None,
            pending_format: None,
            composition: None,
            referenced: Vec::new(),
            colored_refs: Vec::new(),
            ref_color_map: FxHashMap::default(),
            next_ref_color: 0,
            point_anchor: None,
        });
        self.emit(SessionEvent::ModeChanged(EditMode::Edit));
    }

    /// Start editing by typing a printable character from Navigate
    /// (overwrite path): the session opens in Enter mode with the typed
    /// character replacing the content. Non-printable input is ignored.
    pub fn begin_typing(&mut self, cell: CellAddress, original: CellValue, c: char) {
        if !is_printable_ascii(c) {
            return;
        }
        let original_text = original.edit_text();
        self.install(ActiveEdit {
            mode: EditMode::Enter,
            cell,
            original_text,
            original,
            text: String::new(),
            formatted: None,
            cursor: 0,
            anchor: None,
            pending_format: None,
            composition: None,
            referenced: Vec::new(),
            colored_refs: Vec::new(),
            ref_color_map: FxHashMap::default(),
            next_ref_color: 0,
            point_anchor: None,
        });
        self.insert_text_inner(&c.to_string());
        self.emit(SessionEvent::ModeChanged(self.mode()));
    }

    fn install(&mut self, state: ActiveEdit) {
        self.point.reset();
        self.state = Some(state);
        self.refresh_formula_state();
    }

    /// Commit the edit. Returns the cell and value for the commit sink:
    /// rich when any character formatting exists, otherwise plain text with
    /// Excel-style normalization (leading `+` becomes `=`, unmatched open
    /// parentheses auto-close). The session ends and subscribers see
    /// `ModeChanged(Navigate)`.
    pub fn commit(&mut self) -> Option<CommitResult> {
        let s = self.state.take()?;
        self.point.reset();

        let value = match &s.formatted {
            Some(ft) if ft.has_formatting() => CommitValue::Rich(ft.clone()),
            _ => CommitValue::Plain(normalize_commit_text(&s.text)),
        };
        if let CommitValue::Plain(text) = &value {
            if text.starts_with('=') {
                self.remember_functions(text);
            }
        }
        log::debug!("commit {} -> {:?}", s.cell, value.as_text());

        self.emit(SessionEvent::ModeChanged(EditMode::Navigate));
        Some(CommitResult {
            cell: s.cell,
            value,
        })
    }

    /// Abandon the edit. The original value is untouched (the session never
    /// wrote anything); subscribers see `ModeChanged(Navigate)`.
    pub fn cancel(&mut self) {
        if self.state.take().is_none() {
            return;
        }
        self.point.reset();
        log::debug!("edit cancelled");
        self.emit(SessionEvent::ModeChanged(EditMode::Navigate));
    }

    fn remember_functions(&mut self, formula: &str) {
        for (range, kind) in formula_context::highlight_spans(formula) {
            if kind == formula_context::TokenKind::Function {
                self.recent_functions.touch(&formula[range]);
            }
        }
    }

    // =========================================================================
    // Intent dispatch
    // =========================================================================

    /// Route an intent through the mode dispatch table. Each call either
    /// runs to completion or is a no-op.
    pub fn handle_intent(&mut self, intent: &SpreadsheetIntent) -> IntentOutcome {
        log::trace!("intent {:?} in {:?}", intent, self.mode());
        match self.mode() {
            EditMode::Navigate => self.dispatch_navigate(intent),
            EditMode::Edit => self.dispatch_edit(intent),
            EditMode::Enter => self.dispatch_enter(intent),
            EditMode::Point => self.dispatch_point(intent),
        }
    }

    fn dispatch_navigate(&mut self, intent: &SpreadsheetIntent) -> IntentOutcome {
        match intent {
            SpreadsheetIntent::Navigate {
                direction, extend, ..
            } => {
                // Grid movement belongs to the host
                let mut out = IntentOutcome::navigate(*direction, *extend);
                out.handled = false;
                out
            }
            SpreadsheetIntent::Edit {
                action: EditAction::Start,
                row: Some(row),
                col: Some(col),
                initial_value,
            } => {
                let original = initial_value
                    .as_deref()
                    .map(CellValue::from_input)
                    .unwrap_or_default();
                self.start_edit(CellAddress::new(*row, *col), original);
                IntentOutcome::handled()
            }
            SpreadsheetIntent::TabEnter { key, reverse } => {
                let mut out = IntentOutcome::navigate(commit_direction(*key, *reverse), false);
                out.handled = false;
                out
            }
            _ => IntentOutcome::unhandled(),
        }
    }

    fn dispatch_edit(&mut self, intent: &SpreadsheetIntent) -> IntentOutcome {
        match intent {
            SpreadsheetIntent::Navigate {
                direction,
                jump,
                extend,
            } if direction.is_horizontal() => {
                self.move_caret(*direction, *jump, *extend);
                IntentOutcome::handled()
            }
            // Vertical arrows are not consumed in Edit mode
            SpreadsheetIntent::Navigate { .. } => IntentOutcome::unhandled(),
            other => self.dispatch_editing_common(other),
        }
    }

    fn dispatch_enter(&mut self, intent: &SpreadsheetIntent) -> IntentOutcome {
        match intent {
            // Any arrow commits, then navigation is delegated to the grid
            SpreadsheetIntent::Navigate { direction, .. } => {
                let commit = self.commit();
                IntentOutcome {
                    handled: true,
                    commit,
                    should_navigate: true,
                    direction: Some(*direction),
                    extend_selection: false,
                }
            }
            other => self.dispatch_editing_common(other),
        }
    }

    fn dispatch_point(&mut self, intent: &SpreadsheetIntent) -> IntentOutcome {
        match intent {
            SpreadsheetIntent::Navigate {
                direction, extend, ..
            } => {
                if let Some(reference) = self.point.move_selection(*direction, *extend) {
                    self.splice_point_reference(&reference);
                }
                IntentOutcome::handled()
            }
            other => self.dispatch_editing_common(other),
        }
    }

    /// Intents handled identically in Edit, Enter and Point modes.
    fn dispatch_editing_common(&mut self, intent: &SpreadsheetIntent) -> IntentOutcome {
        match intent {
            SpreadsheetIntent::Char(c) => {
                self.insert_text(&c.to_string());
                IntentOutcome::handled()
            }
            SpreadsheetIntent::TabEnter { key, reverse } => {
                let commit = self.commit();
                IntentOutcome {
                    handled: true,
                    commit,
                    should_navigate: true,
                    direction: Some(commit_direction(*key, *reverse)),
                    extend_selection: false,
                }
            }
            SpreadsheetIntent::Escape
            | SpreadsheetIntent::Edit {
                action: EditAction::Cancel,
                ..
            } => {
                self.cancel();
                IntentOutcome::handled()
            }
            SpreadsheetIntent::Edit {
                action: EditAction::Confirm,
                ..
            } => {
                let commit = self.commit();
                IntentOutcome {
                    handled: true,
                    commit,
                    ..Default::default()
                }
            }
            SpreadsheetIntent::Edit {
                action: EditAction::Start,
                ..
            } => {
                self.cycle_edit_mode();
                IntentOutcome::handled()
            }
            SpreadsheetIntent::Delete {
                action: DeleteAction::Contents,
            } => {
                self.delete_text(DeleteDirection::Forward, 1);
                IntentOutcome::handled()
            }
            SpreadsheetIntent::StartPoint => {
                if self.state.as_ref().map(|s| s.is_formula()).unwrap_or(false) {
                    self.enter_point_mode();
                    IntentOutcome::handled()
                } else {
                    IntentOutcome::unhandled()
                }
            }
            SpreadsheetIntent::Clipboard {
                action: ClipboardAction::Copy | ClipboardAction::Cut | ClipboardAction::Paste,
            } => IntentOutcome::unhandled(),
            _ => IntentOutcome::unhandled(),
        }
    }

    // =========================================================================
    // Mode transitions
    // =========================================================================

    /// F2: cycle Edit -> (Point when a formula, else Enter) -> Enter ->
    /// Edit -> ... Rate-limited to one cycle per 200 ms.
    pub fn cycle_edit_mode(&mut self) {
        self.cycle_edit_mode_at(Instant::now());
    }

    /// Clock-parameterized variant for deterministic tests.
    pub fn cycle_edit_mode_at(&mut self, now: Instant) {
        if self.state.is_none() {
            return;
        }
        if let Some(last) = self.last_f2_cycle {
            if now.duration_since(last) < F2_CYCLE_INTERVAL {
                return;
            }
        }
        self.last_f2_cycle = Some(now);

        let (is_formula, mode) = {
            let s = self.state.as_ref().unwrap();
            (s.is_formula(), s.mode)
        };
        let next = match mode {
            EditMode::Edit => {
                if is_formula {
                    EditMode::Point
                } else {
                    EditMode::Enter
                }
            }
            EditMode::Point => EditMode::Enter,
            EditMode::Enter => EditMode::Edit,
            EditMode::Navigate => return,
        };
        self.set_mode(next);
        self.emit(SessionEvent::ModeChanged(next));
    }

    /// Silent transition; callers decide what single event to emit.
    fn set_mode(&mut self, next: EditMode) {
        let Some(s) = self.state.as_mut() else {
            return;
        };
        if s.mode == next {
            return;
        }
        if next == EditMode::Point {
            let cell = s.cell;
            let cursor = s.cursor;
            s.mode = EditMode::Point;
            s.point_anchor = None;
            self.point.activate(cell, cursor);
        } else {
            if s.mode == EditMode::Point {
                s.point_anchor = None;
                self.point.deactivate();
            }
            s.mode = next;
        }
    }

    fn enter_point_mode(&mut self) {
        self.set_mode(EditMode::Point);
        self.emit(SessionEvent::ModeChanged(EditMode::Point));
    }

    // =========================================================================
    // Text operations
    // =========================================================================

    /// Insert text at the caret, replacing any selection. Consumes the
    /// pending format; lifts the buffer to rich text when character
    /// formatting is involved. In Point mode, trigger characters finalize
    /// the live reference and re-arm capture; anything else drops back to
    /// Edit mode first.
    pub fn insert_text(&mut self, text: &str) {
        if self.state.is_none() || text.is_empty() {
            return;
        }
        self.insert_text_inner(text);
        self.emit(SessionEvent::Changed);
    }

    fn insert_text_inner(&mut self, text: &str) {
        if self.state.is_none() || text.is_empty() {
            return;
        }

        let mode = self.mode();
        if mode == EditMode::Point {
            let single_trigger = {
                let mut chars = text.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => is_trigger_char(c),
                    _ => false,
                }
            };
            if single_trigger {
                self.finalize_point_reference();
            } else {
                self.leave_point_for_edit();
            }
        }

        self.replace_selection_with(text);

        // Trigger input in a formula arms (or re-arms) reference capture
        let (arm, cell, cursor) = {
            let s = self.state.as_ref().unwrap();
            let last = text.chars().next_back().unwrap();
            let arm = PointModeCoordinator::should_enter_point_mode(last, &s.text, s.cursor);
            (arm, s.cell, s.cursor)
        };
        if arm {
            match self.mode() {
                EditMode::Point => {
                    // Already pointing: re-arm at the new caret
                    self.point.activate(cell, cursor);
                }
                EditMode::Edit | EditMode::Enter => {
                    self.set_mode(EditMode::Point);
                }
                EditMode::Navigate => {}
            }
        }

        self.refresh_formula_state();
    }

    /// The buffer edit itself: selection replacement plus pending-format
    /// application.
    fn replace_selection_with(&mut self, text: &str) {
        let s = self.state.as_mut().unwrap();

        let (start, end) = match s.selection() {
            Some((a, b)) => (a, b),
            None => {
                let p = clamp_boundary(&s.text, s.cursor);
                (p, p)
            }
        };

        let pending = s.pending_format.take().filter(|f| !f.is_empty());
        let needs_rich = pending.is_some() || s.formatted.is_some();

        if needs_rich {
            let ft = s
                .formatted
                .take()
                .unwrap_or_else(|| FormattedText::plain(s.text.clone()));
            let mut ft = ft.delete(start, end).insert(start, text);
            if let Some(fmt) = &pending {
                ft = ft.apply_format(start, start + text.len(), fmt);
            }
            s.text = ft.text.clone();
            s.formatted = Some(ft);
        } else {
            s.text.replace_range(start..end, text);
        }

        s.cursor = start + text.len();
        s.anchor = None;
        debug_assert!(s.cursor <= s.text.len());
    }

    /// Delete by character, or the selection when one exists.
    pub fn delete_text(&mut self, direction: DeleteDirection, count: usize) {
        let Some(s) = self.state.as_mut() else {
            return;
        };
        if count == 0 {
            return;
        }

        let (start, end) = match s.selection() {
            Some(range) => range,
            None => {
                let mut start = clamp_boundary(&s.text, s.cursor);
                let mut end = start;
                match direction {
                    DeleteDirection::Backward => {
                        for _ in 0..count {
                            start = prev_char_boundary(&s.text, start);
                        }
                    }
                    DeleteDirection::Forward => {
                        for _ in 0..count {
                            end = next_char_boundary(&s.text, end);
                        }
                    }
                }
                (start, end)
            }
        };
        if start == end {
            return;
        }

        if let Some(ft) = s.formatted.take() {
            let ft = ft.delete(start, end);
            s.text = ft.text.clone();
            s.formatted = Some(ft);
        } else {
            s.text.replace_range(start..end, "");
        }
        s.cursor = start;
        s.anchor = None;
        s.point_anchor = None;

        // Deleting the '=' drops formula state; leave Point if armed
        if self.mode() == EditMode::Point
            && !self.state.as_ref().map(|s| s.is_formula()).unwrap_or(false)
        {
            self.leave_point_for_edit();
        }

        self.refresh_formula_state();
        self.emit(SessionEvent::Changed);
    }

    /// Apply character formatting. With a selection, formats the selected
    /// range. Without one, toggles the pending one-shot format: pressing
    /// Bold, typing, pressing Bold again behaves like Excel's toolbar.
    pub fn apply_character_format(&mut self, fmt: &CharacterFormat) {
        let Some(s) = self.state.as_mut() else {
            return;
        };
        if fmt.is_empty() {
            return;
        }

        if let Some((start, end)) = s.selection() {
            let ft = s
                .formatted
                .take()
                .unwrap_or_else(|| FormattedText::plain(s.text.clone()));
            s.formatted = Some(ft.apply_format(start, end, fmt));
        } else {
            // Effective format at the caret: pending overrides the run left
            // of the caret
            let base = s
                .formatted
                .as_ref()
                .and_then(|ft| ft.format_at(s.cursor))
                .cloned()
                .unwrap_or_default();
            let effective = match &s.pending_format {
                Some(p) => base.overridden_by(p),
                None => base,
            };

            let mut pending = s.pending_format.take().unwrap_or_default();
            toggle_field(&mut pending.bold, &effective.bold, &fmt.bold);
            toggle_field(&mut pending.italic, &effective.italic, &fmt.italic);
            toggle_field(&mut pending.underline, &effective.underline, &fmt.underline);
            toggle_field(
                &mut pending.strikethrough,
                &effective.strikethrough,
                &fmt.strikethrough,
            );
            toggle_field(
                &mut pending.font_family,
                &effective.font_family,
                &fmt.font_family,
            );
            toggle_field(&mut pending.font_size, &effective.font_size, &fmt.font_size);
            toggle_field(
                &mut pending.font_color,
                &effective.font_color,
                &fmt.font_color,
            );
            toggle_field(
                &mut pending.background_color,
                &effective.background_color,
                &fmt.background_color,
            );
            s.pending_format = if pending.is_empty() {
                None
            } else {
                Some(pending)
            };
        }
        self.emit(SessionEvent::Changed);
    }

    /// Move the caret to an absolute byte position, clamped.
    pub fn set_cursor(&mut self, pos: usize, extend: bool) {
        let Some(s) = self.state.as_mut() else {
            return;
        };
        let pos = clamp_boundary(&s.text, pos);
        if extend {
            if s.anchor.is_none() {
                s.anchor = Some(s.cursor);
            }
        } else {
            s.anchor = None;
        }
        s.cursor = pos;
        s.point_anchor = None;
        self.emit(SessionEvent::Changed);
    }

    /// Arrow-key caret movement (Edit mode): by char, by word under `jump`,
    /// extending the selection under `extend`.
    pub fn move_caret(&mut self, direction: Direction, jump: bool, extend: bool) {
        let Some(s) = self.state.as_mut() else {
            return;
        };
        if !direction.is_horizontal() {
            return;
        }

        // Collapsing a selection without extending jumps to its edge
        if !extend {
            if let Some((start, end)) = s.selection() {
                s.anchor = None;
                s.cursor = match direction {
                    Direction::Left => start,
                    _ => end,
                };
                self.emit(SessionEvent::Changed);
                return;
            }
        }

        if extend && s.anchor.is_none() {
            s.anchor = Some(s.cursor);
        }
        if !extend {
            s.anchor = None;
        }

        s.cursor = match (direction, jump) {
            (Direction::Left, false) => prev_char_boundary(&s.text, s.cursor),
            (Direction::Left, true) => prev_word_boundary(&s.text, s.cursor),
            (Direction::Right, false) => next_char_boundary(&s.text, s.cursor),
            (Direction::Right, true) => next_word_boundary(&s.text, s.cursor),
            _ => s.cursor,
        };
        s.point_anchor = None;
        debug_assert!(s.cursor <= s.text.len());
        self.emit(SessionEvent::Changed);
    }

    // =========================================================================
    // IME composition
    // =========================================================================

    /// Begin an IME composition at the caret (replacing any selection).
    /// The pending format is left queued for the composed text.
    pub fn begin_composition(&mut self) {
        let Some(s) = self.state.as_mut() else {
            return;
        };
        if let Some((start, end)) = s.selection() {
            if let Some(ft) = s.formatted.take() {
                let ft = ft.delete(start, end);
                s.text = ft.text.clone();
                s.formatted = Some(ft);
            } else {
                s.text.replace_range(start..end, "");
            }
            s.cursor = start;
            s.anchor = None;
        }
        s.composition = Some((s.cursor, s.cursor));
        self.emit(SessionEvent::Changed);
    }

    /// Replace the composition range with updated preedit text.
    pub fn update_composition(&mut self, preedit: &str) {
        let Some(s) = self.state.as_mut() else {
            return;
        };
        let Some((start, end)) = s.composition else {
            return;
        };
        if let Some(ft) = s.formatted.take() {
            let ft = ft.delete(start, end).insert(start, preedit);
            s.text = ft.text.clone();
            s.formatted = Some(ft);
        } else {
            s.text.replace_range(start..end, preedit);
        }
        s.composition = Some((start, start + preedit.len()));
        s.cursor = start + preedit.len();
        self.refresh_formula_state();
        self.emit(SessionEvent::Changed);
    }

    /// Finish composition, committing the final text through the normal
    /// insertion path (pending format applies).
    pub fn end_composition(&mut self, final_text: &str) {
        let Some(s) = self.state.as_mut() else {
            return;
        };
        let Some((start, end)) = s.composition.take() else {
            return;
        };
        // Remove the preedit, then insert as ordinary typing
        s.anchor = None;
        if let Some(ft) = s.formatted.take() {
            let ft = ft.delete(start, end);
            s.text = ft.text.clone();
            s.formatted = Some(ft);
        } else {
            s.text.replace_range(start..end, "");
        }
        s.cursor = start;
        self.insert_text(final_text);
    }

    // =========================================================================
    // Point-mode reference insertion
    // =========================================================================

    /// A grid click while in Point mode inserts (or replaces) the live
    /// reference. A no-op in any other mode.
    pub fn insert_cell_reference(&mut self, row: usize, col: usize) {
        if self.mode() != EditMode::Point {
            return;
        }
        if let Some(reference) = self.point.handle_cell_click(row, col) {
            self.splice_point_reference(&reference);
        }
    }

    /// Drag-range capture while pointing.
    pub fn point_drag(&mut self, start: (usize, usize), end: (usize, usize)) {
        if self.mode() != EditMode::Point {
            return;
        }
        self.point.begin_drag(start.0, start.1);
        self.point.update_drag(end.0, end.1);
        if let Some(reference) = self.point.end_drag() {
            self.splice_point_reference(&reference);
        }
    }

    /// Splice a reference string at the live-reference span (replacing the
    /// previous arrow/click target while it is still being adjusted).
    fn splice_point_reference(&mut self, reference: &str) {
        let s = self.state.as_mut().unwrap();
        let start = s.point_anchor.unwrap_or_else(|| clamp_boundary(&s.text, s.cursor));
        let end = s.cursor.max(start);

        if let Some(ft) = s.formatted.take() {
            let ft = ft.delete(start, end).insert(start, reference);
            s.text = ft.text.clone();
            s.formatted = Some(ft);
        } else {
            s.text.replace_range(start..end, reference);
        }
        s.point_anchor = Some(start);
        s.cursor = start + reference.len();
        s.anchor = None;

        self.refresh_formula_state();
        self.emit(SessionEvent::Changed);
    }

    fn finalize_point_reference(&mut self) {
        if let Some(s) = self.state.as_mut() {
            s.point_anchor = None;
        }
        self.point.finalize_reference();
    }

    fn leave_point_for_edit(&mut self) {
        self.point.finalize_reference();
        self.set_mode(EditMode::Edit);
    }

    // =========================================================================
    // Autocomplete acceptance
    // =========================================================================

    /// Replace the identifier at the caret with `NAME(` and remember the
    /// acceptance for recency-boosted suggestions.
    pub fn accept_suggestion(&mut self, name: &str) {
        let Some(s) = self.state.as_mut() else {
            return;
        };
        if !s.is_formula() {
            return;
        }
        let ctx = formula_context::analyze(&s.text, s.cursor);
        let replacement = format!("{}(", name.to_ascii_uppercase());
        let start = ctx.token_start.min(s.text.len());
        let end = s.cursor.max(start);

        if let Some(ft) = s.formatted.take() {
            let ft = ft.delete(start, end).insert(start, &replacement);
            s.text = ft.text.clone();
            s.formatted = Some(ft);
        } else {
            s.text.replace_range(start..end, &replacement);
        }
        s.cursor = start + replacement.len();
        s.anchor = None;
        self.recent_functions.touch(name);
        self.refresh_formula_state();
        self.emit(SessionEvent::Changed);
    }

    // =========================================================================
    // Formula reference state
    // =========================================================================

    /// Re-parse references after any text change. Colors are assigned
    /// through a persistent per-session map so they do not jump while
    /// typing; slots for vanished references are garbage-collected.
    fn refresh_formula_state(&mut self) {
        let Some(s) = self.state.as_mut() else {
            return;
        };
        if !s.is_formula() {
            s.referenced.clear();
            s.colored_refs.clear();
            s.ref_color_map.clear();
            s.next_ref_color = 0;
            return;
        }

        s.referenced = refs::referenced_cells(&s.text);
        let parsed = refs::extract_references(&s.text);

        let present: rustc_hash::FxHashSet<RefKey> =
            parsed.iter().map(|r| (r.start, r.end)).collect();
        s.ref_color_map.retain(|k, _| present.contains(k));

        let palette = POINT_COLORS.len();
        let mut colored = Vec::with_capacity(parsed.len());
        for r in parsed {
            let key = (r.start, r.end);
            let color_index = match s.ref_color_map.get(&key) {
                Some(c) => *c,
                None => {
                    let c = s.next_ref_color;
                    s.next_ref_color = (s.next_ref_color + 1) % palette;
                    s.ref_color_map.insert(key, c);
                    c
                }
            };
            colored.push(ColoredRef {
                start: r.start,
                end: r.end,
                span: r.span,
                color_index,
            });
        }
        s.colored_refs = colored;
    }
}

/// One field of the pending-format toggle: requesting the effective value
/// removes the queued override, anything else queues it.
fn toggle_field<T: PartialEq + Clone>(
    pending: &mut Option<T>,
    effective: &Option<T>,
    requested: &Option<T>,
) {
    if let Some(req) = requested {
        if effective.as_ref() == Some(req) {
            *pending = None;
        } else {
            *pending = Some(req.clone());
        }
    }
}

fn commit_direction(key: TabEnterKey, reverse: bool) -> Direction {
    match (key, reverse) {
        (TabEnterKey::Enter, false) => Direction::Down,
        (TabEnterKey::Enter, true) => Direction::Up,
        (TabEnterKey::Tab, false) => Direction::Right,
        (TabEnterKey::Tab, true) => Direction::Left,
    }
}

/// Excel-style commit normalization: leading `+` becomes `=`, and a
/// formula's unmatched open parentheses are closed.
fn normalize_commit_text(text: &str) -> String {
    let mut out = if let Some(rest) = text.strip_prefix('+') {
        if rest.starts_with(|c: char| c.is_ascii_alphabetic() || c == '(' || c == '$') {
            format!("={}", rest)
        } else {
            text.to_string()
        }
    } else {
        text.to_string()
    };

    if out.starts_with('=') {
        let opens = out.chars().filter(|&c| c == '(').count();
        let closes = out.chars().filter(|&c| c == ')').count();
        for _ in closes..opens {
            out.push(')');
        }
    }
    out
}
