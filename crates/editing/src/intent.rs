//! The wire contract between an intent source and the editing core.
//!
//! Intents are device-independent descriptors of user actions. The core
//! consumes what it understands and reports everything else unhandled so
//! the host can route it elsewhere.

use serde::{Deserialize, Serialize};

use gridkit_core::{CellAddress, Direction};
use gridkit_engine::rich_text::FormattedText;

/// Tab / Enter commit-and-move keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TabEnterKey {
    Tab,
    Enter,
}

/// Edit lifecycle actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EditAction {
    Start,
    Confirm,
    Cancel,
}

/// Grid delete actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeleteAction {
    Contents,
    Cells,
}

/// Clipboard actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClipboardAction {
    Copy,
    Cut,
    Paste,
}

/// A device-independent user action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SpreadsheetIntent {
    Navigate {
        direction: Direction,
        /// Jump-by-word in text, jump-to-extent on the grid.
        jump: bool,
        /// Extend the selection instead of moving it.
        extend: bool,
    },
    TabEnter {
        key: TabEnterKey,
        reverse: bool,
    },
    Edit {
        action: EditAction,
        row: Option<usize>,
        col: Option<usize>,
        initial_value: Option<String>,
    },
    Escape,
    Delete {
        action: DeleteAction,
    },
    Clipboard {
        action: ClipboardAction,
    },
    /// Printable character input.
    Char(char),
    /// Explicit Point-mode request.
    StartPoint,
    /// Anything the core does not consume; passed back to the host.
    Passthrough(String),
}

/// The committed value: rich when any character formatting exists,
/// otherwise plain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CommitValue {
    Plain(String),
    Rich(FormattedText),
}

impl CommitValue {
    pub fn as_text(&self) -> &str {
        match self {
            CommitValue::Plain(s) => s,
            CommitValue::Rich(ft) => &ft.text,
        }
    }
}

/// Delivered to the commit sink once per successful commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitResult {
    pub cell: CellAddress,
    pub value: CommitValue,
}

/// What the core did with an intent and what the host should do next.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntentOutcome {
    /// The core consumed the intent.
    pub handled: bool,
    /// A commit happened as part of handling.
    pub commit: Option<CommitResult>,
    /// The host should move the grid cursor after this intent.
    pub should_navigate: bool,
    pub direction: Option<Direction>,
    pub extend_selection: bool,
}

impl IntentOutcome {
    pub fn unhandled() -> Self {
        Self::default()
    }

    pub fn handled() -> Self {
        Self {
            handled: true,
            ..Default::default()
        }
    }

    pub(crate) fn navigate(direction: Direction, extend: bool) -> Self {
        Self {
            handled: true,
            should_navigate: true,
            direction: Some(direction),
            extend_selection: extend,
            ..Default::default()
        }
    }
}

/// True for the printable ASCII range (32..=126) that starts Enter mode
/// from Navigate.
pub fn is_printable_ascii(c: char) -> bool {
    (' '..='~').contains(&c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_printable_ascii_bounds() {
        assert!(is_printable_ascii(' '));
        assert!(is_printable_ascii('~'));
        assert!(is_printable_ascii('7'));
        assert!(!is_printable_ascii('\n'));
        assert!(!is_printable_ascii('\u{1b}'));
        assert!(!is_printable_ascii('é'));
    }
}
