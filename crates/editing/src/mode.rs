//! Editing modes determine how intents are dispatched.

use serde::{Deserialize, Serialize};

/// The four edit-session modes, Excel-faithful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EditMode {
    /// Not editing; intents move the grid cursor.
    #[default]
    Navigate,
    /// In-cell editing; arrow keys move the text caret.
    Edit,
    /// Overwrite mode entered by typing from Navigate; arrow keys commit
    /// and navigate.
    Enter,
    /// Formula-reference capture; arrow keys emit reference insertions.
    Point,
}

impl EditMode {
    /// True while a session is active (any mode but Navigate).
    pub fn is_editing(&self) -> bool {
        !matches!(self, EditMode::Navigate)
    }

    pub fn is_point(&self) -> bool {
        matches!(self, EditMode::Point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_editing() {
        assert!(!EditMode::Navigate.is_editing());
        assert!(EditMode::Edit.is_editing());
        assert!(EditMode::Enter.is_editing());
        assert!(EditMode::Point.is_editing());
    }
}
