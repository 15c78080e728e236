// src/link_table/update.rs
//
// The three-stage update pipeline (spec section 4): preflight normalises
// caller input into the table's container shape, precheck validates the
// normalised result against invariants preflight can't express alone
// (type exclusivity), and internal_update applies the result, computes
// the diff against the previous state, and hands the diff to the store.
// Grounded on the calibre many_to_many_table / priority_many_to_many_table
// update_preflight / update_precheck / internal_update_cache methods, and
// on one_one_tables.py's rename/remove_items for the maintenance passes
// below.

use super::containers::{normalize_cell, DstContainer, UpdateValue};
use super::LinkTable;
use crate::diff::UpdateDiff;
use crate::error::{CacheError, Result};
use crate::link_table::Id;
use crate::store::Store;
use crate::value::Value;
use log::{debug, trace, warn};
use std::collections::{HashMap, HashSet};

impl LinkTable {
    /// Run the full preflight -> precheck -> internal_update pipeline for
    /// a batch of per-source changes, persist the resulting diff, and
    /// apply it to the in-memory maps. `id_map_update` carries auxiliary
    /// entities referenced from `changes` before they exist in `id_map`
    /// (spec section 4.2); `allow_case_change` gates whether an
    /// `id_map_update` entry that only differs from an existing value by
    /// case is allowed to overwrite it.
    pub fn update(
        &mut self,
        store: &dyn Store,
        changes: HashMap<Id, UpdateValue>,
        id_map_update: HashMap<Id, Value>,
        allow_case_change: bool,
    ) -> Result<UpdateDiff> {
        let normalized = self.preflight(changes)?;
        self.precheck(&normalized, &id_map_update)?;
        let diff = self.internal_update(normalized, id_map_update, allow_case_change);
        if !diff.is_empty() {
            store.write_diff(self.dst_table, &diff)?;
        }
        Ok(diff)
    }

    /// Fold each caller-supplied value into the existing container for its
    /// source, per the container-kind rules in `normalize_cell`.
    fn preflight(&self, changes: HashMap<Id, UpdateValue>) -> Result<HashMap<Id, DstContainer>> {
        let kind = self.variant.book_col_shape();
        let mut out = HashMap::with_capacity(changes.len());
        for (src, input) in changes {
            let existing = self.book_col_map.get(&src);
            let cell = normalize_cell(kind, existing, input)?;
            out.insert(src, cell);
        }
        Ok(out)
    }

    /// Validate invariants `normalize_cell` can't enforce on its own:
    /// every source must already be known to the cache, every destination
    /// must exist in `id_map` (or be about to, via `id_map_update`), and
    /// for typed variants a destination id may sit under at most one type
    /// per source within a single call (a move across *separate* calls is
    /// legal - `normalize_cell`'s typed branch already enacted it before
    /// this ever sees a conflict).
    fn precheck(&self, normalized: &HashMap<Id, DstContainer>, id_map_update: &HashMap<Id, Value>) -> Result<()> {
        for (src, cell) in normalized {
            if !self.seen_book_ids.contains(src) {
                return Err(CacheError::InvalidCacheUpdate(format!("{}: unknown source id {src}", self.name)));
            }
            for dst in cell.flatten() {
                if !self.id_map.contains_key(&dst) && !id_map_update.contains_key(&dst) {
                    return Err(CacheError::InvalidCacheUpdate(format!(
                        "{}: destination id {dst} absent from id_map and id_map_update for source {src}",
                        self.name
                    )));
                }
            }
        }

        if !self.variant.is_typed() {
            return Ok(());
        }
        for (src, cell) in normalized {
            let Some(typed) = cell.typed_view() else { continue };
            let mut seen = HashSet::new();
            for ids in typed.values().map(DstContainer::flatten) {
                for id in ids {
                    if !seen.insert(id) {
                        return Err(CacheError::InvalidCacheUpdate(format!(
                            "{}: id {id} linked under more than one type for source {src}",
                            self.name
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Merge `id_map_update` into `id_map`, apply the normalised cells,
    /// update both sides of the reciprocal maps, and return what changed.
    fn internal_update(
        &mut self,
        normalized: HashMap<Id, DstContainer>,
        id_map_update: HashMap<Id, Value>,
        allow_case_change: bool,
    ) -> UpdateDiff {
        let mut diff = UpdateDiff::default();
        for (id, value) in id_map_update {
            match self.id_map.get(&id) {
                Some(existing) if *existing == value => {}
                Some(existing) if existing.case_fold().is_some() && existing.case_fold() == value.case_fold() && !allow_case_change => {
                    trace!("{}: id_map_update for {id} is a case-only change, allow_case_change=false, skipped", self.name);
                }
                _ => {
                    self.id_map.insert(id, value.clone());
                    diff.id_map_update.insert(id, value);
                }
            }
        }
        for (src, new_cell) in normalized {
            let old_cell = self.book_col_map.get(&src).cloned().unwrap_or_default();
            if old_cell == new_cell {
                continue;
            }
            let old_pairs: HashSet<(Option<String>, Id)> = iter_cells(&old_cell).into_iter().collect();
            let new_pairs: HashSet<(Option<String>, Id)> = iter_cells(&new_cell).into_iter().collect();

            for (_, removed) in old_pairs.difference(&new_pairs) {
                super::remove_one(&mut self.col_book_map, *removed, src);
            }
            for (ty, added) in new_pairs.difference(&old_pairs) {
                super::insert_one(&mut self.col_book_map, self.variant.col_book_shape(), *added, src, ty.as_deref());
            }

            if new_cell.is_empty() {
                self.book_col_map.remove(&src);
                diff.deleted.push(src);
            } else {
                self.book_col_map.insert(src, new_cell.clone());
                diff.updated.insert(src, new_cell);
            }
        }
        trace!("{}: internal_update touched {} sources", self.name, diff.updated.len() + diff.deleted.len());
        diff
    }

    /// Drop `book_ids` from this table entirely: clears their row in
    /// `book_col_map` and removes them from every destination's reciprocal
    /// container. Returns the destinations that became unreferenced as a
    /// result (clean candidates - spec: `col_book_map[d] subset-of book_ids`
    /// and `d` still in `id_map`) after delegating their purge to the
    /// store's maintainer.
    pub fn remove_books(&mut self, store: &dyn Store, book_ids: &[Id]) -> Result<Vec<Id>> {
        let mut diff = UpdateDiff::default();
        let mut touched_dsts: HashSet<Id> = HashSet::new();
        for &src in book_ids {
            let Some(cell) = self.book_col_map.remove(&src) else { continue };
            for dst in cell.flatten() {
                super::remove_one(&mut self.col_book_map, dst, src);
                touched_dsts.insert(dst);
            }
            diff.deleted.push(src);
        }
        self.seen_book_ids.retain(|id| !book_ids.contains(id));
        if !diff.is_empty() {
            store.write_diff(self.dst_table, &diff)?;
        }

        let clean: Vec<Id> = touched_dsts
            .into_iter()
            .filter(|d| !self.col_book_map.contains_key(d) && self.id_map.contains_key(d))
            .collect();
        if !clean.is_empty() {
            store.clean(self.dst_table, &clean)?;
        }
        debug!(
            "{}: remove_books dropped {} sources, {} clean candidates",
            self.name,
            diff.deleted.len(),
            clean.len()
        );
        Ok(clean)
    }

    /// Drop `item_ids` (destinations) entirely: removed from the id_map
    /// and from `col_book_map` unconditionally. Dissociation on the
    /// `book_col_map` side is scoped to `restrict_to_book_ids` when given,
    /// otherwise spans every source. Returns the sources whose value set
    /// changed.
    pub fn remove_items(&mut self, store: &dyn Store, item_ids: &[Id], restrict_to_book_ids: Option<&[Id]>) -> Result<Vec<Id>> {
        let doomed: HashSet<Id> = item_ids.iter().copied().collect();
        for id in &doomed {
            self.id_map.remove(id);
            self.col_book_map.remove(id);
        }
        let scope: Option<HashSet<Id>> = restrict_to_book_ids.map(|ids| ids.iter().copied().collect());
        let mut touched = Vec::new();
        for (&src, cell) in self.book_col_map.iter_mut() {
            if let Some(scope) = &scope {
                if !scope.contains(&src) {
                    continue;
                }
            }
            let before = cell.clone();
            let after = cell.without_ids(&doomed);
            if after != before {
                *cell = after;
                touched.push(src);
            }
        }
        self.book_col_map.retain(|_, cell| !cell.is_empty());
        store.bulk_delete_in_table(self.dst_table, item_ids)?;
        debug!("{}: remove_items dropped {} destinations, touched {} sources", self.name, item_ids.len(), touched.len());
        Ok(touched)
    }

    /// Rename destination `id`'s identity value. If the case-folded new
    /// value already names another destination, the two merge into the
    /// pre-existing id instead of creating a duplicate (spec: rename
    /// collisions always merge). Returns the surviving id if a merge
    /// occurred.
    pub fn rename_item(&mut self, store: &dyn Store, id: Id, new_value: Value) -> Result<Option<Id>> {
        let folded = new_value
            .case_fold()
            .ok_or_else(|| CacheError::InvalidUpdate("rename_item requires a text value".into()))?;

        let collision = self
            .id_map
            .iter()
            .find(|(&other, value)| other != id && value.case_fold().as_deref() == Some(folded.as_str()))
            .map(|(&other, _)| other);

        match collision {
            Some(survivor) => {
                self.merge_destinations(id, survivor);
                store.merge_link_rows(self.dst_table, id, survivor)?;
                debug!("{}: rename of {id} collided with {survivor}, merged", self.name);
                Ok(Some(survivor))
            }
            None => {
                self.id_map.insert(id, new_value.clone());
                store.update_column_in_table(self.dst_table, id, &new_value)?;
                Ok(None)
            }
        }
    }

    /// Fold every destination whose identity value case-folds to the same
    /// string into one survivor (the lowest id). Used as a standalone
    /// maintenance pass, independent of any single rename.
    pub fn fix_case_duplicates(&mut self, store: &dyn Store) -> Result<Vec<(Id, Id)>> {
        let mut by_fold: HashMap<String, Vec<Id>> = HashMap::new();
        for (&id, value) in &self.id_map {
            if let Some(folded) = value.case_fold() {
                by_fold.entry(folded).or_default().push(id);
            }
        }
        let mut merges = Vec::new();
        for (_, mut ids) in by_fold {
            if ids.len() < 2 {
                continue;
            }
            ids.sort_unstable();
            let survivor = ids[0];
            for &dup in &ids[1..] {
                self.merge_destinations(dup, survivor);
                store.merge_link_rows(self.dst_table, dup, survivor)?;
                merges.push((dup, survivor));
            }
        }
        if !merges.is_empty() {
            debug!("{}: fix_case_duplicates merged {} pairs", self.name, merges.len());
        }
        Ok(merges)
    }

    /// Repoint every reference to `from` onto `to` and drop `from`.
    fn merge_destinations(&mut self, from: Id, to: Id) {
        if from == to {
            return;
        }
        self.id_map.remove(&from);
        let removed_cell = self.col_book_map.remove(&from).unwrap_or_default();
        for (ty, src) in iter_cells(&removed_cell) {
            if let Some(cell) = self.book_col_map.get_mut(&src) {
                *cell = replace_id_in_cell(cell, from, to);
            }
            super::insert_one(&mut self.col_book_map, self.variant.col_book_shape(), to, src, ty.as_deref());
        }
    }

    /// Consistency-repair pass: drop `book_col_map` rows for sources
    /// outside the known book-id universe, and destination references
    /// that no longer have an id_map entry, then rebuild `col_book_map`
    /// from the cleaned `book_col_map` so the reciprocal invariant holds
    /// again. Grounded on calibre's fix_link_table, minus the typed-branch
    /// bug the design notes warn against reproducing.
    pub fn fix_link_table(&mut self) -> usize {
        let mut fixed = 0;
        let known_books = self.seen_book_ids.clone();
        let known_ids: HashSet<Id> = self.id_map.keys().copied().collect();

        self.book_col_map.retain(|src, _| known_books.contains(src) || { fixed += 1; false });

        for cell in self.book_col_map.values_mut() {
            let before = cell.clone();
            let unknown: HashSet<Id> = cell.flatten().into_iter().filter(|id| !known_ids.contains(id)).collect();
            *cell = cell.without_ids(&unknown);
            if *cell != before {
                fixed += 1;
            }
        }
        self.book_col_map.retain(|_, cell| !cell.is_empty());

        self.col_book_map.clear();
        let rows: Vec<(Id, Option<String>, Id)> = self
            .book_col_map
            .iter()
            .flat_map(|(&src, cell)| iter_cells(cell).into_iter().map(move |(ty, dst)| (src, ty, dst)))
            .collect();
        for (src, ty, dst) in rows {
            super::insert_one(&mut self.col_book_map, self.variant.col_book_shape(), dst, src, ty.as_deref());
        }
        if fixed > 0 {
            warn!("{}: fix_link_table repaired {fixed} rows", self.name);
        }
        fixed
    }
}

/// Flatten a container to (link_type, id) leaf pairs, carrying the type
/// partition through for typed containers so callers that need to
/// reinsert on the reciprocal side don't have to rediscover it.
fn iter_cells(cell: &DstContainer) -> Vec<(Option<String>, Id)> {
    match cell {
        DstContainer::Empty => Vec::new(),
        DstContainer::Single(id) => vec![(None, *id)],
        DstContainer::Set(s) => s.iter().map(|id| (None, *id)).collect(),
        DstContainer::List(l) => l.iter().map(|id| (None, *id)).collect(),
        DstContainer::Typed(m) => m
            .iter()
            .flat_map(|(ty, c)| iter_cells(c).into_iter().map(move |(_, id)| (Some(ty.clone()), id)))
            .collect(),
    }
}

fn replace_id_in_cell(cell: &DstContainer, from: Id, to: Id) -> DstContainer {
    match cell {
        DstContainer::Empty => DstContainer::Empty,
        DstContainer::Single(id) => DstContainer::Single(if *id == from { to } else { *id }),
        DstContainer::Set(s) => {
            DstContainer::Set(s.iter().map(|id| if *id == from { to } else { *id }).collect())
        }
        DstContainer::List(l) => {
            let mut out = Vec::with_capacity(l.len());
            for id in l {
                let mapped = if *id == from { to } else { *id };
                if !out.contains(&mapped) {
                    out.push(mapped);
                }
            }
            DstContainer::List(out)
        }
        DstContainer::Typed(m) => {
            DstContainer::Typed(m.iter().map(|(ty, c)| (ty.clone(), replace_id_in_cell(c, from, to))).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link_table::Variant;
    use crate::store::mock::MockStore;

    fn tags_table() -> (LinkTable, MockStore) {
        let mut store = MockStore::new();
        store.seed_id_map("tags", vec![(21, Value::from("sci-fi"))]);
        let known = HashSet::from([7]);
        let mut table = LinkTable::new("tags", Variant::ManyToMany, "titles", "tags");
        table.read(&store, &known).unwrap();
        (table, store)
    }

    #[test]
    fn update_adds_and_reciprocates() {
        let (mut table, store) = tags_table();
        let mut changes = HashMap::new();
        changes.insert(7, UpdateValue::One(21));
        let diff = table.update(&store, changes, HashMap::new(), false).unwrap();
        assert!(diff.updated.contains_key(&7));
        assert_eq!(table.ids_for_book(7), vec![21]);
        assert_eq!(table.books_for(21), vec![7]);
    }

    #[test]
    fn update_to_clear_deletes_source() {
        let (mut table, store) = tags_table();
        let mut changes = HashMap::new();
        changes.insert(7, UpdateValue::One(21));
        table.update(&store, changes, HashMap::new(), false).unwrap();

        let mut clear = HashMap::new();
        clear.insert(7, UpdateValue::Clear);
        let diff = table.update(&store, clear, HashMap::new(), false).unwrap();
        assert_eq!(diff.deleted, vec![7]);
        assert!(table.ids_for_book(7).is_empty());
        assert!(table.books_for(21).is_empty());
    }

    #[test]
    fn update_creates_new_destination_via_id_map_update() {
        let (mut table, store) = tags_table();
        let mut changes = HashMap::new();
        changes.insert(7, UpdateValue::One(99));
        let mut id_map_update = HashMap::new();
        id_map_update.insert(99, Value::from("space opera"));

        let diff = table.update(&store, changes, id_map_update, false).unwrap();
        assert_eq!(diff.id_map_update.get(&99), Some(&Value::from("space opera")));
        assert_eq!(table.ids_for_book(7), vec![99]);
        assert_eq!(table.value(99).unwrap(), &Value::from("space opera"));
    }

    #[test]
    fn update_rejects_unknown_source_id() {
        let (mut table, store) = tags_table();
        let mut changes = HashMap::new();
        changes.insert(999, UpdateValue::One(21));
        assert!(table.update(&store, changes, HashMap::new(), false).is_err());
    }

    #[test]
    fn update_rejects_destination_absent_from_id_map() {
        let (mut table, store) = tags_table();
        let mut changes = HashMap::new();
        changes.insert(7, UpdateValue::One(404));
        assert!(table.update(&store, changes, HashMap::new(), false).is_err());
    }

    #[test]
    fn update_moves_id_across_types_without_error() {
        let mut store = MockStore::new();
        store.seed_id_map("identifiers", vec![(42, Value::from("0-000-00000-0"))]);
        store.seed_many_to_many_typed("identifiers", vec![(7, 42, "editor".to_string())]);
        let known = HashSet::from([7]);
        let mut table = LinkTable::new("identifiers", Variant::ManyToManyTyped, "titles", "identifiers");
        table.read(&store, &known).unwrap();

        let mut typed = std::collections::BTreeMap::new();
        typed.insert("author".to_string(), UpdateValue::One(42));
        let mut changes = HashMap::new();
        changes.insert(7, UpdateValue::Typed(typed));

        let diff = table.update(&store, changes, HashMap::new(), false).unwrap();
        assert!(diff.updated.contains_key(&7));

        let cell = table.book_data(7, None);
        let typed_view = cell.typed_view().unwrap();
        assert!(!typed_view.contains_key("editor"));
        assert_eq!(typed_view.get("author").unwrap().flatten(), std::collections::BTreeSet::from([42]));
    }

    #[test]
    fn rename_with_case_fold_collision_merges() {
        let mut store = MockStore::new();
        store.seed_id_map("tags", vec![(21, Value::from("Sci-Fi")), (22, Value::from("sci-fi"))]);
        store.seed_many_to_many("tags", vec![(7, 22)]);
        let known = HashSet::from([7]);
        let mut table = LinkTable::new("tags", Variant::ManyToMany, "titles", "tags");
        table.read(&store, &known).unwrap();

        let survivor = table.rename_item(&store, 22, Value::from("SCI-FI")).unwrap();
        assert_eq!(survivor, Some(21));
        assert_eq!(table.ids_for_book(7), vec![21]);
        assert!(table.value(22).is_err());
    }

    #[test]
    fn fix_link_table_drops_unknown_book_ids() {
        let mut store = MockStore::new();
        store.seed_id_map("tags", vec![(21, Value::from("sci-fi"))]);
        store.seed_many_to_many("tags", vec![(7, 21), (99, 21)]);
        let known = HashSet::from([7]);
        let mut table = LinkTable::new("tags", Variant::ManyToMany, "titles", "tags");
        table.read(&store, &known).unwrap();
        assert_eq!(table.book_col_map.len(), 2);
        let fixed = table.fix_link_table();
        assert!(fixed > 0);
        assert!(table.ids_for_book(99).is_empty());
        assert_eq!(table.books_for(21), vec![7]);
    }

    #[test]
    fn precheck_rejects_type_exclusivity_violation() {
        let mut store = MockStore::new();
        store.seed_id_map("identifiers", vec![(1, Value::from("0-000-00000-0"))]);
        let known = HashSet::from([7]);
        let mut table = LinkTable::new("identifiers", Variant::ManyToManyTyped, "titles", "identifiers");
        table.read(&store, &known).unwrap();

        let mut typed = std::collections::BTreeMap::new();
        typed.insert("isbn".to_string(), UpdateValue::One(1));
        typed.insert("asin".to_string(), UpdateValue::One(1));
        let mut changes = HashMap::new();
        changes.insert(7, UpdateValue::Typed(typed));
        let err = table.update(&store, changes, HashMap::new(), false);
        assert!(err.is_err());
    }

    #[test]
    fn remove_books_returns_clean_candidate_that_lost_its_only_reference() {
        let (mut table, store) = tags_table();
        let mut changes = HashMap::new();
        changes.insert(7, UpdateValue::One(21));
        table.update(&store, changes, HashMap::new(), false).unwrap();

        let clean = table.remove_books(&store, &[7]).unwrap();
        assert_eq!(clean, vec![21]);
        assert!(table.ids_for_book(7).is_empty());
    }

    #[test]
    fn remove_items_restricted_to_book_ids_leaves_other_sources_untouched() {
        let mut store = MockStore::new();
        store.seed_id_map("tags", vec![(21, Value::from("sci-fi"))]);
        store.seed_many_to_many("tags", vec![(7, 21), (8, 21)]);
        let known = HashSet::from([7, 8]);
        let mut table = LinkTable::new("tags", Variant::ManyToMany, "titles", "tags");
        table.read(&store, &known).unwrap();

        let touched = table.remove_items(&store, &[21], Some(&[7])).unwrap();
        assert_eq!(touched, vec![7]);
        assert!(table.ids_for_book(7).is_empty());
        // 8 was outside restrict_to_book_ids, so its link row is untouched -
        // even though 21's id_map entry is gone, the reciprocal row for 8
        // is not scrubbed by this call.
        assert_eq!(table.ids_for_book(8), vec![21]);
    }
}
