//! Point mode: grid navigation and clicks emit cell references into the
//! edited formula instead of moving focus.
//!
//! The coordinator owns the transient reference-capture state; the edit
//! session asks it for A1 strings and splices them into the buffer. Colors
//! rotate through a fixed ten-color palette keyed by how many references
//! the session has inserted, matching the familiar Excel cycling.

use std::time::{Duration, Instant};

use gridkit_core::addr::{range_ref, CellAddress};

use crate::refs::in_string_literal;

/// Rotating palette for reference highlighting (0xRRGGBB).
pub const POINT_COLORS: [u32; 10] = [
    0x4472C4, // blue
    0xED7D31, // orange
    0x9B59B6, // purple
    0x70AD47, // green
    0x00B0F0, // cyan
    0xFFC000, // yellow
    0xFF6B9D, // pink
    0x00B294, // teal
    0xE74856, // red
    0x8E562E, // brown
];

/// Characters that arm reference capture after a formula operator.
pub const POINT_TRIGGERS: &[char] = &[
    '=', '+', '-', '*', '/', '(', ',', ':', '^', '&', '<', '>', ';',
];

/// Duplicate clicks on the same cell within this window are suppressed.
const CLICK_SUPPRESS_WINDOW: Duration = Duration::from_millis(300);

/// Transient state for formula-reference capture.
#[derive(Debug)]
pub struct PointModeCoordinator {
    active: bool,
    point_cell: Option<CellAddress>,
    point_range_end: Option<CellAddress>,
    is_dragging: bool,
    /// Anchor the first arrow key moves from (the cell being edited).
    origin: CellAddress,
    reference_count: usize,
    insertion_cursor: usize,
    last_click: Option<(CellAddress, Instant)>,
}

impl Default for PointModeCoordinator {
    fn default() -> Self {
        Self {
            active: false,
            point_cell: None,
            point_range_end: None,
            is_dragging: false,
            origin: CellAddress::new(0, 0),
            reference_count: 0,
            insertion_cursor: 0,
            last_click: None,
        }
    }
}

impl PointModeCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter Point mode with clean capture state. `origin` is the cell
    /// being edited; `insertion_cursor` is where the reference text will
    /// land in the buffer.
    pub fn activate(&mut self, origin: CellAddress, insertion_cursor: usize) {
        self.active = true;
        self.point_cell = None;
        self.point_range_end = None;
        self.is_dragging = false;
        self.origin = origin;
        self.insertion_cursor = insertion_cursor;
        log::debug!("point mode armed at {} (ref #{})", origin, self.reference_count);
    }

    pub fn deactivate(&mut self) {
        self.active = false;
        self.point_cell = None;
        self.point_range_end = None;
        self.is_dragging = false;
        self.last_click = None;
    }

    /// Full reset, clearing the reference counter as well. Called when the
    /// edit session ends.
    pub fn reset(&mut self) {
        self.deactivate();
        self.reference_count = 0;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn insertion_cursor(&self) -> usize {
        self.insertion_cursor
    }

    pub fn reference_count(&self) -> usize {
        self.reference_count
    }

    /// Color for the reference currently being captured.
    pub fn current_color(&self) -> u32 {
        POINT_COLORS[self.reference_count % POINT_COLORS.len()]
    }

    /// The cell/range currently pointed at, normalized.
    pub fn current_target(&self) -> Option<(CellAddress, CellAddress)> {
        let start = self.point_cell?;
        let end = self.point_range_end.unwrap_or(start);
        Some((
            CellAddress::new(start.row.min(end.row), start.col.min(end.col)),
            CellAddress::new(start.row.max(end.row), start.col.max(end.col)),
        ))
    }

    /// The current reference finished (an operator was typed or the ref was
    /// committed); advance the color rotation.
    pub fn finalize_reference(&mut self) {
        if self.point_cell.is_some() || self.is_dragging {
            self.reference_count += 1;
        }
        self.point_cell = None;
        self.point_range_end = None;
        self.is_dragging = false;
    }

    // -------------------------------------------------------------------------
    // Clicks and drags
    // -------------------------------------------------------------------------

    /// A grid click while pointing. Returns the A1 string to splice in, or
    /// None when suppressed as a duplicate.
    pub fn handle_cell_click(&mut self, row: usize, col: usize) -> Option<String> {
        self.handle_cell_click_at(row, col, Instant::now())
    }

    /// Clock-parameterized variant for deterministic tests.
    pub fn handle_cell_click_at(
        &mut self,
        row: usize,
        col: usize,
        now: Instant,
    ) -> Option<String> {
        if !self.active {
            return None;
        }
        let addr = CellAddress::new(row, col);
        if let Some((last_addr, at)) = self.last_click {
            if last_addr == addr && now.duration_since(at) < CLICK_SUPPRESS_WINDOW {
                return None;
            }
        }
        self.last_click = Some((addr, now));
        self.point_cell = Some(addr);
        self.point_range_end = None;
        Some(addr.to_a1())
    }

    pub fn begin_drag(&mut self, row: usize, col: usize) {
        if !self.active {
            return;
        }
        self.is_dragging = true;
        self.point_cell = Some(CellAddress::new(row, col));
        self.point_range_end = None;
    }

    pub fn update_drag(&mut self, row: usize, col: usize) {
        if !self.is_dragging {
            return;
        }
        self.point_range_end = Some(CellAddress::new(row, col));
    }

    /// Finish a drag, returning the normalized range string (`A1:B5`, or a
    /// single cell when collapsed).
    pub fn end_drag(&mut self) -> Option<String> {
        if !self.is_dragging {
            return None;
        }
        self.is_dragging = false;
        let start = self.point_cell?;
        let end = self.point_range_end.unwrap_or(start);
        Some(range_ref(start, end))
    }

    // -------------------------------------------------------------------------
    // Arrow-driven pointing
    // -------------------------------------------------------------------------

    /// Move the point selection with an arrow key. With `extend`, the range
    /// end moves and the anchor stays. Returns the reference string for the
    /// new target.
    pub fn move_selection(
        &mut self,
        direction: gridkit_core::Direction,
        extend: bool,
    ) -> Option<String> {
        if !self.active {
            return None;
        }
        let (dr, dc) = direction.delta();
        if extend {
            let anchor = self.point_cell?;
            let from = self.point_range_end.unwrap_or(anchor);
            let end = from.offset_clamped(dr, dc);
            self.point_range_end = Some(end);
            Some(range_ref(anchor, end))
        } else {
            let from = self.point_cell.unwrap_or(self.origin);
            let next = from.offset_clamped(dr, dc);
            self.point_cell = Some(next);
            self.point_range_end = None;
            Some(next.to_a1())
        }
    }

    // -------------------------------------------------------------------------
    // Entry test
    // -------------------------------------------------------------------------

    /// Should typing `c` at `cursor` arm Point mode? True iff the buffer is
    /// a formula, the cursor is outside any string literal, and `c` is a
    /// trigger character.
    pub fn should_enter_point_mode(c: char, text: &str, cursor: usize) -> bool {
        text.starts_with('=') && !in_string_literal(text, cursor) && is_trigger_char(c)
    }
}

/// Is this one of the thirteen operator characters that arm pointing?
pub fn is_trigger_char(c: char) -> bool {
    POINT_TRIGGERS.contains(&c)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridkit_core::Direction;

    fn armed() -> PointModeCoordinator {
        let mut p = PointModeCoordinator::new();
        p.activate(CellAddress::new(2, 2), 4);
        p
    }

    #[test]
    fn test_click_returns_a1() {
        let mut p = armed();
        assert_eq!(p.handle_cell_click(2, 2).as_deref(), Some("C3"));
        assert_eq!(p.current_target().unwrap().0, CellAddress::new(2, 2));
    }

    #[test]
    fn test_duplicate_click_suppressed_within_window() {
        let mut p = armed();
        let t0 = Instant::now();
        assert!(p.handle_cell_click_at(1, 1, t0).is_some());
        assert!(p.handle_cell_click_at(1, 1, t0 + Duration::from_millis(100)).is_none());
        // Past the window the same cell registers again
        assert!(p.handle_cell_click_at(1, 1, t0 + Duration::from_millis(400)).is_some());
        // A different cell is never suppressed
        assert!(p.handle_cell_click_at(0, 0, t0 + Duration::from_millis(450)).is_some());
    }

    #[test]
    fn test_click_while_inactive_is_noop() {
        let mut p = PointModeCoordinator::new();
        assert!(p.handle_cell_click(0, 0).is_none());
    }

    #[test]
    fn test_drag_returns_normalized_range() {
        let mut p = armed();
        p.begin_drag(4, 1);
        p.update_drag(0, 0);
        assert_eq!(p.end_drag().as_deref(), Some("A1:B5"));
    }

    #[test]
    fn test_drag_collapsed_to_single_cell() {
        let mut p = armed();
        p.begin_drag(3, 3);
        assert_eq!(p.end_drag().as_deref(), Some("D4"));
    }

    #[test]
    fn test_move_starts_from_origin() {
        let mut p = armed(); // origin C3
        assert_eq!(p.move_selection(Direction::Up, false).as_deref(), Some("C2"));
        assert_eq!(p.move_selection(Direction::Left, false).as_deref(), Some("B2"));
    }

    #[test]
    fn test_move_extend_grows_range() {
        let mut p = armed();
        p.handle_cell_click(0, 0);
        assert_eq!(
            p.move_selection(Direction::Down, true).as_deref(),
            Some("A1:A2")
        );
        assert_eq!(
            p.move_selection(Direction::Right, true).as_deref(),
            Some("A1:B2")
        );
    }

    #[test]
    fn test_move_clamps_at_sheet_edge() {
        let mut p = PointModeCoordinator::new();
        p.activate(CellAddress::new(0, 0), 1);
        assert_eq!(p.move_selection(Direction::Up, false).as_deref(), Some("A1"));
    }

    #[test]
    fn test_color_cycles_with_reference_count() {
        let mut p = armed();
        assert_eq!(p.current_color(), POINT_COLORS[0]);
        p.handle_cell_click(0, 0);
        p.finalize_reference();
        assert_eq!(p.current_color(), POINT_COLORS[1]);
        for _ in 0..POINT_COLORS.len() - 1 {
            p.handle_cell_click(1, 1);
            p.last_click = None; // bypass suppression in the loop
            p.finalize_reference();
        }
        assert_eq!(p.current_color(), POINT_COLORS[0]);
    }

    #[test]
    fn test_finalize_without_target_keeps_color() {
        let mut p = armed();
        p.finalize_reference();
        assert_eq!(p.reference_count(), 0);
    }

    #[test]
    fn test_should_enter_point_mode() {
        assert!(PointModeCoordinator::should_enter_point_mode('+', "=A1+", 4));
        assert!(PointModeCoordinator::should_enter_point_mode('(', "=SUM(", 5));
        assert!(!PointModeCoordinator::should_enter_point_mode('+', "A1+", 3));
        assert!(!PointModeCoordinator::should_enter_point_mode('x', "=A1x", 4));
        // Inside a string literal the trigger does not arm pointing
        assert!(!PointModeCoordinator::should_enter_point_mode('+', "=\"a+", 4));
    }
}
