// src/fields/composite.rs
//
// Fields with no link table of their own: values derived from other
// fields at read time. None of these expose an `update`/`remove_items`
// API - composite values are read-only by construction (spec: "composite
// fields cannot be directly updated"), so `CacheError::ReadOnlyField` is
// only ever raised by the dispatch layer in `cache.rs` if a caller looks
// one of these up by name and tries to write it anyway.

use super::RelationalField;
use crate::link_table::Id;
use crate::prefs::SizeDisplayMode;
use crate::value::Value;
use std::collections::HashMap;

/// Derives "Surname, Given Names" from an author's stored display name,
/// unless an explicit override sort value has been recorded for that
/// author id. Grounded on calibre's stored-vs-derived author_sort split.
pub struct AuthorSortField<'a> {
    authors: &'a RelationalField,
    overrides: &'a HashMap<Id, String>,
}

impl<'a> AuthorSortField<'a> {
    pub fn new(authors: &'a RelationalField, overrides: &'a HashMap<Id, String>) -> Self {
        AuthorSortField { authors, overrides }
    }

    pub fn for_book(&self, book_id: Id) -> String {
        self.authors
            .table()
            .ids_for_book(book_id)
            .into_iter()
            .map(|id| self.sort_name(id))
            .collect::<Vec<_>>()
            .join(" & ")
    }

    fn sort_name(&self, author_id: Id) -> String {
        if let Some(stored) = self.overrides.get(&author_id) {
            return stored.clone();
        }
        match self.authors.table().value(author_id) {
            Ok(Value::Text(name)) => derive_author_sort(name),
            _ => String::new(),
        }
    }
}

fn derive_author_sort(name: &str) -> String {
    match name.trim().rsplit_once(' ') {
        Some((rest, surname)) if !rest.is_empty() => format!("{surname}, {rest}"),
        _ => name.trim().to_string(),
    }
}

/// Aggregates the formats field's per-file sizes into one book-level
/// figure, per `Preferences::book_size_display_mode`.
pub struct BookSizeField<'a> {
    files: &'a RelationalField,
    mode: SizeDisplayMode,
}

impl<'a> BookSizeField<'a> {
    pub fn new(files: &'a RelationalField, mode: SizeDisplayMode) -> Self {
        BookSizeField { files, mode }
    }

    pub fn for_book(&self, book_id: Id) -> Option<u64> {
        let sizes: Vec<u64> = self
            .files
            .table()
            .ids_for_book(book_id)
            .into_iter()
            .filter_map(|id| match self.files.table().value(id) {
                Ok(Value::File(f)) => Some(f.size),
                _ => None,
            })
            .collect();
        if sizes.is_empty() {
            return None;
        }
        Some(match self.mode {
            SizeDisplayMode::Sum => sizes.iter().sum(),
            SizeDisplayMode::Max => sizes.into_iter().max().unwrap(),
            SizeDisplayMode::Min => sizes.into_iter().min().unwrap(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::{Datatype, FieldMetadata};
    use crate::link_table::Variant;
    use crate::store::mock::MockStore;
    use crate::value::FileRecord;
    use std::collections::HashSet;

    #[test]
    fn author_sort_falls_back_to_derived_form() {
        let mut store = MockStore::new();
        store.seed_id_map("authors", vec![(1, Value::from("Ursula K. Le Guin"))]);
        store.seed_many_to_many_priority("authors", vec![(7, 1, 0)]);
        let meta = FieldMetadata { name: "authors", datatype: Datatype::Text, is_multiple: true, is_editable: true };
        let mut authors = RelationalField::new(meta, Variant::ManyToManyPriority, "titles", "authors");
        authors.read(&store, &HashSet::new()).unwrap();

        let overrides = HashMap::new();
        let sort = AuthorSortField::new(&authors, &overrides);
        assert_eq!(sort.for_book(7), "Le Guin, Ursula K.");
    }

    #[test]
    fn book_size_sums_by_default() {
        let mut store = MockStore::new();
        store.seed_blobs(
            "files",
            vec![
                (7, "EPUB".into(), "EPUB_1".into(), Value::File(FileRecord { filename: "a.epub".into(), size: 100, location: "a".into() })),
                (7, "MOBI".into(), "MOBI_1".into(), Value::File(FileRecord { filename: "a.mobi".into(), size: 50, location: "b".into() })),
            ],
        );
        let meta = FieldMetadata { name: "files", datatype: Datatype::Text, is_multiple: true, is_editable: false };
        let mut files = RelationalField::new(meta, Variant::OneToManyPriorityTyped, "titles", "files");
        files.read(&store, &HashSet::from([7])).unwrap();

        let size = BookSizeField::new(&files, SizeDisplayMode::Sum);
        assert_eq!(size.for_book(7), Some(150));
    }
}
