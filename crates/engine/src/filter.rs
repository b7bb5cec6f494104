//! Column filters and reversible filter commands.
//!
//! Predicates are immutable once built and shared by reference (`Arc`).
//! Commands capture whatever state they need at construction so `revert`
//! works regardless of what happened to the filter set in between.

use std::collections::HashMap;
use std::mem;
use std::sync::Arc;

use ordered_float::OrderedFloat;

use crate::cell::CellValue;

// =============================================================================
// Predicates
// =============================================================================

/// A single-column filter predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterPredicate {
    TextEquals(String),
    TextContains(String),
    NumberEquals(OrderedFloat<f64>),
    GreaterThan(OrderedFloat<f64>),
    LessThan(OrderedFloat<f64>),
    Between {
        low: OrderedFloat<f64>,
        high: OrderedFloat<f64>,
    },
    Blank,
    NonBlank,
}

impl FilterPredicate {
    /// Evaluate the predicate against a cell value. Formula cells are
    /// judged by their cached result when one exists.
    pub fn matches(&self, value: &CellValue) -> bool {
        if let CellValue::Formula {
            cached: Some(result),
            ..
        } = value
        {
            return self.matches(result);
        }
        match self {
            FilterPredicate::TextEquals(needle) => {
                value.display().eq_ignore_ascii_case(needle)
            }
            FilterPredicate::TextContains(needle) => value
                .display()
                .to_ascii_lowercase()
                .contains(&needle.to_ascii_lowercase()),
            FilterPredicate::NumberEquals(n) => {
                matches!(value, CellValue::Number(v) if OrderedFloat(*v) == *n)
            }
            FilterPredicate::GreaterThan(n) => {
                matches!(value, CellValue::Number(v) if OrderedFloat(*v) > *n)
            }
            FilterPredicate::LessThan(n) => {
                matches!(value, CellValue::Number(v) if OrderedFloat(*v) < *n)
            }
            FilterPredicate::Between { low, high } => {
                matches!(value, CellValue::Number(v)
                    if OrderedFloat(*v) >= *low && OrderedFloat(*v) <= *high)
            }
            FilterPredicate::Blank => value.is_blank(),
            FilterPredicate::NonBlank => !value.is_blank(),
        }
    }

    fn heap_bytes(&self) -> usize {
        match self {
            FilterPredicate::TextEquals(s) | FilterPredicate::TextContains(s) => s.capacity(),
            _ => 0,
        }
    }
}

// =============================================================================
// FilterSet
// =============================================================================

/// Active predicates keyed by column.
#[derive(Debug, Clone, Default)]
pub struct FilterSet {
    predicates: HashMap<usize, Arc<FilterPredicate>>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, column: usize) -> Option<&Arc<FilterPredicate>> {
        self.predicates.get(&column)
    }

    pub fn set(&mut self, column: usize, predicate: Arc<FilterPredicate>) {
        self.predicates.insert(column, predicate);
    }

    /// Remove the predicate for a column, returning it.
    pub fn clear(&mut self, column: usize) -> Option<Arc<FilterPredicate>> {
        self.predicates.remove(&column)
    }

    pub fn clear_all(&mut self) {
        self.predicates.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &Arc<FilterPredicate>)> {
        self.predicates.iter().map(|(col, p)| (*col, p))
    }

    /// A row passes when every filtered column's value matches.
    pub fn row_matches<'a>(&self, mut value_at: impl FnMut(usize) -> &'a CellValue) -> bool {
        self.predicates
            .iter()
            .all(|(col, pred)| pred.matches(value_at(*col)))
    }

    fn snapshot(&self) -> HashMap<usize, Arc<FilterPredicate>> {
        self.predicates.clone()
    }

    fn restore(&mut self, saved: HashMap<usize, Arc<FilterPredicate>>) {
        self.predicates = saved;
    }
}

// =============================================================================
// Commands
// =============================================================================

/// A reversible mutation of a [`FilterSet`].
pub trait FilterCommand {
    fn apply(&mut self, filters: &mut FilterSet);
    fn revert(&mut self, filters: &mut FilterSet);
    /// Rough heap footprint of the captured state, for history budgeting.
    fn estimate_memory(&self) -> usize;
    fn id(&self) -> &str;
}

/// Sets (or clears, when `next` is None) one column's predicate.
/// The previous predicate is captured at construction.
pub struct ApplyFilterCommand {
    column: usize,
    next: Option<Arc<FilterPredicate>>,
    previous: Option<Arc<FilterPredicate>>,
    id: String,
}

impl ApplyFilterCommand {
    pub fn new(
        filters: &FilterSet,
        column: usize,
        next: Option<Arc<FilterPredicate>>,
    ) -> Self {
        Self {
            column,
            previous: filters.get(column).cloned(),
            next,
            id: format!("filter:apply:{}", column),
        }
    }
}

impl FilterCommand for ApplyFilterCommand {
    fn apply(&mut self, filters: &mut FilterSet) {
        match &self.next {
            Some(pred) => filters.set(self.column, Arc::clone(pred)),
            None => {
                filters.clear(self.column);
            }
        }
    }

    fn revert(&mut self, filters: &mut FilterSet) {
        match &self.previous {
            Some(pred) => filters.set(self.column, Arc::clone(pred)),
            None => {
                filters.clear(self.column);
            }
        }
    }

    fn estimate_memory(&self) -> usize {
        let pred_bytes = |p: &Option<Arc<FilterPredicate>>| {
            p.as_ref()
                .map(|p| mem::size_of::<FilterPredicate>() + p.heap_bytes())
                .unwrap_or(0)
        };
        mem::size_of::<Self>() + self.id.capacity() + pred_bytes(&self.next) + pred_bytes(&self.previous)
    }

    fn id(&self) -> &str {
        &self.id
    }
}

/// Clears every predicate. The whole map is captured at construction and
/// restored entry-for-entry on revert.
pub struct ClearAllFiltersCommand {
    saved: HashMap<usize, Arc<FilterPredicate>>,
}

impl ClearAllFiltersCommand {
    pub fn new(filters: &FilterSet) -> Self {
        Self {
            saved: filters.snapshot(),
        }
    }
}

impl FilterCommand for ClearAllFiltersCommand {
    fn apply(&mut self, filters: &mut FilterSet) {
        filters.clear_all();
    }

    fn revert(&mut self, filters: &mut FilterSet) {
        filters.restore(self.saved.clone());
    }

    fn estimate_memory(&self) -> usize {
        mem::size_of::<Self>()
            + self
                .saved
                .values()
                .map(|p| mem::size_of::<FilterPredicate>() + p.heap_bytes())
                .sum::<usize>()
    }

    fn id(&self) -> &str {
        "filter:clear-all"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(n: f64) -> CellValue {
        CellValue::Number(n)
    }

    #[test]
    fn test_predicate_matching() {
        assert!(FilterPredicate::TextEquals("Apple".into()).matches(&CellValue::Text("apple".into())));
        assert!(FilterPredicate::TextContains("pp".into()).matches(&CellValue::Text("Apple".into())));
        assert!(FilterPredicate::GreaterThan(OrderedFloat(5.0)).matches(&num(6.0)));
        assert!(!FilterPredicate::GreaterThan(OrderedFloat(5.0)).matches(&num(5.0)));
        assert!(FilterPredicate::Between {
            low: OrderedFloat(1.0),
            high: OrderedFloat(3.0)
        }
        .matches(&num(2.0)));
        assert!(FilterPredicate::Blank.matches(&CellValue::Empty));
        assert!(FilterPredicate::NonBlank.matches(&num(0.0)));
    }

    #[test]
    fn test_predicate_uses_formula_cache() {
        let formula = CellValue::Formula {
            source: "=1+5".into(),
            cached: Some(Box::new(num(6.0))),
        };
        assert!(FilterPredicate::GreaterThan(OrderedFloat(5.0)).matches(&formula));
    }

    #[test]
    fn test_apply_command_revert_restores_previous() {
        let mut filters = FilterSet::new();
        let first = Arc::new(FilterPredicate::NonBlank);
        filters.set(2, Arc::clone(&first));

        let next = Arc::new(FilterPredicate::GreaterThan(OrderedFloat(10.0)));
        let mut cmd = ApplyFilterCommand::new(&filters, 2, Some(Arc::clone(&next)));

        cmd.apply(&mut filters);
        assert_eq!(filters.get(2), Some(&next));

        cmd.revert(&mut filters);
        assert_eq!(filters.get(2), Some(&first));
    }

    #[test]
    fn test_apply_command_revert_clears_when_none_existed() {
        let mut filters = FilterSet::new();
        let mut cmd = ApplyFilterCommand::new(
            &filters,
            0,
            Some(Arc::new(FilterPredicate::Blank)),
        );

        cmd.apply(&mut filters);
        assert!(filters.get(0).is_some());

        cmd.revert(&mut filters);
        assert!(filters.get(0).is_none());
    }

    #[test]
    fn test_clear_all_command_restores_every_entry() {
        let mut filters = FilterSet::new();
        filters.set(0, Arc::new(FilterPredicate::NonBlank));
        filters.set(3, Arc::new(FilterPredicate::TextEquals("x".into())));

        let mut cmd = ClearAllFiltersCommand::new(&filters);
        cmd.apply(&mut filters);
        assert!(filters.is_empty());

        cmd.revert(&mut filters);
        assert_eq!(filters.len(), 2);
        assert!(filters.get(0).is_some());
        assert!(filters.get(3).is_some());
    }

    #[test]
    fn test_predicates_shared_by_reference() {
        let mut filters = FilterSet::new();
        let pred = Arc::new(FilterPredicate::NonBlank);
        filters.set(1, Arc::clone(&pred));
        assert!(Arc::ptr_eq(filters.get(1).unwrap(), &pred));
    }

    #[test]
    fn test_estimate_memory_nonzero() {
        let filters = FilterSet::new();
        let cmd = ApplyFilterCommand::new(
            &filters,
            0,
            Some(Arc::new(FilterPredicate::TextContains("needle".into()))),
        );
        assert!(cmd.estimate_memory() >= mem::size_of::<ApplyFilterCommand>());
    }

    #[test]
    fn test_row_matches_all_columns() {
        let mut filters = FilterSet::new();
        filters.set(0, Arc::new(FilterPredicate::NonBlank));
        filters.set(1, Arc::new(FilterPredicate::GreaterThan(OrderedFloat(2.0))));

        let col0 = CellValue::Text("name".into());
        let col1 = num(5.0);
        assert!(filters.row_matches(|col| if col == 0 { &col0 } else { &col1 }));

        let too_small = num(1.0);
        assert!(!filters.row_matches(|col| if col == 0 { &col0 } else { &too_small }));
    }
}
