// src/view/mod.rs
//
// The ordered book-id projection callers actually browse (spec section
// 4.4): a `Vec<Id>` kept in sync with marks, a bounded sort history, and
// a free-text restriction, refreshed from the cache's own known-book-id
// universe rather than owning any persistence of its own.

use crate::fields::SortKey;
use crate::link_table::Id;
use std::collections::HashSet;

/// What the view needs from the rest of the cache to sort and search,
/// without depending on `Cache` directly (breaks the circular module
/// dependency `Cache` -> `View` -> `Cache` would otherwise create).
pub trait FieldSource {
    fn sort_key(&self, field: &str, book_id: Id) -> SortKey;
    fn matches_search(&self, book_id: Id, term: &str) -> bool;
}

#[derive(Debug, Clone)]
pub struct SortSpec {
    pub field: String,
    pub ascending: bool,
}

pub struct View {
    book_ids: Vec<Id>,
    marked_ids: HashSet<Id>,
    sort_history: Vec<SortSpec>,
    restriction: Option<String>,
    maximum_resort_levels: usize,
}

impl View {
    pub fn new(maximum_resort_levels: usize) -> Self {
        View {
            book_ids: Vec::new(),
            marked_ids: HashSet::new(),
            sort_history: Vec::new(),
            restriction: None,
            maximum_resort_levels,
        }
    }

    pub fn book_ids(&self) -> &[Id] {
        &self.book_ids
    }

    pub fn len(&self) -> usize {
        self.book_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.book_ids.is_empty()
    }

    /// Rebuild the id sequence from the cache's full known-book universe,
    /// then reapply whatever restriction and sort history are active.
    pub fn refresh(&mut self, known_book_ids: &HashSet<Id>, source: &dyn FieldSource) {
        self.book_ids = known_book_ids.iter().copied().collect();
        self.book_ids.sort_unstable();
        self.apply_restriction(source);
        self.resort(source);
    }

    /// Push a new primary sort field to the front of the sort history
    /// (older levels become tie-breakers), capped at
    /// `maximum_resort_levels`, then re-sort in place.
    pub fn multisort(&mut self, field: impl Into<String>, ascending: bool, source: &dyn FieldSource) {
        let field = field.into();
        self.sort_history.retain(|s| s.field != field);
        self.sort_history.insert(0, SortSpec { field, ascending });
        self.sort_history.truncate(self.maximum_resort_levels);
        self.resort(source);
    }

    /// Appends `sort` and `timestamp` as final tie-breakers when neither
    /// is already part of the active sort history, so two books equal on
    /// every explicit level still land in a stable, meaningful order
    /// instead of falling back to raw book-id comparison.
    fn resort(&mut self, source: &dyn FieldSource) {
        let mut levels = self.sort_history.clone();
        for default_field in ["sort", "timestamp"] {
            if !levels.iter().any(|s| s.field == default_field) {
                levels.push(SortSpec { field: default_field.to_string(), ascending: true });
            }
        }
        self.book_ids.sort_by(|&a, &b| {
            for spec in &levels {
                let ka = source.sort_key(&spec.field, a);
                let kb = source.sort_key(&spec.field, b);
                let ord = if spec.ascending { ka.cmp(&kb) } else { kb.cmp(&ka) };
                if ord != std::cmp::Ordering::Equal {
                    return ord;
                }
            }
            a.cmp(&b)
        });
    }

    /// Set (or clear, with `None`) the active free-text restriction and
    /// re-filter from the full known universe.
    pub fn search(&mut self, term: Option<String>, known_book_ids: &HashSet<Id>, source: &dyn FieldSource) {
        self.restriction = term;
        self.refresh(known_book_ids, source);
    }

    fn apply_restriction(&mut self, source: &dyn FieldSource) {
        if let Some(term) = &self.restriction {
            self.book_ids.retain(|&id| source.matches_search(id, term));
        }
    }

    pub fn restriction(&self) -> Option<&str> {
        self.restriction.as_deref()
    }

    pub fn mark(&mut self, book_id: Id) {
        self.marked_ids.insert(book_id);
    }

    pub fn unmark(&mut self, book_id: Id) {
        self.marked_ids.remove(&book_id);
    }

    pub fn clear_marks(&mut self) {
        self.marked_ids.clear();
    }

    pub fn is_marked(&self, book_id: Id) -> bool {
        self.marked_ids.contains(&book_id)
    }

    pub fn marked_ids(&self) -> &HashSet<Id> {
        &self.marked_ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct FakeSource(HashMap<Id, i64>);

    impl FieldSource for FakeSource {
        fn sort_key(&self, field: &str, book_id: Id) -> SortKey {
            if field == "rank" {
                SortKey::Int(*self.0.get(&book_id).unwrap_or(&0))
            } else {
                SortKey::Empty
            }
        }
        fn matches_search(&self, book_id: Id, term: &str) -> bool {
            term == "even" && book_id % 2 == 0
        }
    }

    #[test]
    fn refresh_then_sort_orders_by_field() {
        let source = FakeSource(HashMap::from([(1, 30), (2, 10), (3, 20)]));
        let mut view = View::new(5);
        view.refresh(&HashSet::from([1, 2, 3]), &source);
        view.multisort("rank", true, &source);
        assert_eq!(view.book_ids(), &[2, 3, 1]);
    }

    #[test]
    fn search_filters_against_full_universe() {
        let source = FakeSource(HashMap::new());
        let mut view = View::new(5);
        view.search(Some("even".into()), &HashSet::from([1, 2, 3, 4]), &source);
        assert_eq!(view.book_ids(), &[2, 4]);
    }

    #[test]
    fn sort_history_caps_at_configured_depth() {
        let source = FakeSource(HashMap::new());
        let mut view = View::new(2);
        for field in ["a", "b", "c"] {
            view.multisort(field, true, &source);
        }
        assert_eq!(view.sort_history.len(), 2);
        assert_eq!(view.sort_history[0].field, "c");
    }

    #[test]
    fn marks_are_independent_of_ordering() {
        let mut view = View::new(5);
        view.mark(7);
        assert!(view.is_marked(7));
        view.unmark(7);
        assert!(!view.is_marked(7));
    }
}
