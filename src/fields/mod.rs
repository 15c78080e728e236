// src/fields/mod.rs
//
// The field adapter layer (spec section 4.3): a uniform per-entity-kind
// API over the underlying link tables, so callers never touch a
// `LinkTable` directly. Grounded on base_calibre/fields.py's Field
// hierarchy, collapsed the same way link tables were - one generic
// `RelationalField` parameterised by entity kind, instead of one Rust
// type per field.

pub mod attrs;
pub mod composite;
pub mod ondevice;
pub mod simple;
pub mod sort_key;

pub use sort_key::SortKey;

use crate::error::{CacheError, Result};
use crate::link_table::{DstContainer, Id, LinkTable, UpdateValue, Variant};
use crate::store::Store;
use crate::value::Value;
use std::collections::{BTreeMap, HashMap};

/// What shape of value a field hands back for one book.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    None,
    Single(Value),
    Multi(Vec<Value>),
    Typed(BTreeMap<String, Vec<Value>>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Datatype {
    Text,
    Int,
    Float,
    Bool,
    Date,
    Rating,
    Series,
    Composite,
}

#[derive(Debug, Clone)]
pub struct FieldMetadata {
    pub name: &'static str,
    pub datatype: Datatype,
    pub is_multiple: bool,
    pub is_editable: bool,
}

/// Shared behaviour every field adapter exposes to the view and to
/// external callers, regardless of what sits underneath it.
pub trait Field {
    fn metadata(&self) -> &FieldMetadata;
    fn for_book(&self, book_id: Id) -> FieldValue;
    fn sort_key(&self, book_id: Id) -> SortKey;
}

/// The common case: a field backed directly by one `LinkTable`. Covers
/// authors, tags, series, languages, identifiers, publishers, genres,
/// subjects, comments, notes, synopses and formats - every named kind
/// except the handful with bespoke read-only logic in `composite`.
pub struct RelationalField {
    metadata: FieldMetadata,
    table: LinkTable,
}

impl RelationalField {
    pub fn new(metadata: FieldMetadata, variant: Variant, src_table: &'static str, dst_table: &'static str) -> Self {
        RelationalField {
            table: LinkTable::new(metadata.name, variant, src_table, dst_table),
            metadata,
        }
    }

    pub fn read(&mut self, store: &dyn Store, known_book_ids: &std::collections::HashSet<Id>) -> Result<()> {
        self.table.read(store, known_book_ids)
    }

    pub fn update(
        &mut self,
        store: &dyn Store,
        changes: HashMap<Id, UpdateValue>,
        id_map_update: HashMap<Id, Value>,
        allow_case_change: bool,
    ) -> Result<()> {
        if !self.metadata.is_editable {
            return Err(CacheError::ReadOnlyField);
        }
        self.table.update(store, changes, id_map_update, allow_case_change)?;
        Ok(())
    }

    /// Returns the clean-candidate destination ids the link table turned
    /// up (spec's `maintainer.clean` hook acts on these; callers decide
    /// whether to actually invoke it).
    pub fn remove_books(&mut self, store: &dyn Store, book_ids: &[Id]) -> Result<Vec<Id>> {
        self.table.remove_books(store, book_ids)
    }

    pub fn remove_items(&mut self, store: &dyn Store, item_ids: &[Id], restrict_to_book_ids: Option<&[Id]>) -> Result<Vec<Id>> {
        self.table.remove_items(store, item_ids, restrict_to_book_ids)
    }

    pub fn rename_item(&mut self, store: &dyn Store, id: Id, new_value: Value) -> Result<Option<Id>> {
        self.table.rename_item(store, id, new_value)
    }

    pub fn table(&self) -> &LinkTable {
        &self.table
    }

    /// For the formats field: destination ids under `book_id` that are
    /// backups of another format file rather than the file itself.
    pub fn backups_for_book(&self, book_id: Id) -> Vec<Id> {
        self.table.ids_for_book(book_id).into_iter().filter(|&id| self.table.is_backup(id)).collect()
    }

    /// Every destination (id, value) pair in this field, split into two
    /// buckets by an optional caller-supplied predicate. Used by the tags
    /// field to carve periodical/news tags into their own browsing
    /// category rather than lumping them in with ordinary tags; returns
    /// `(matching, rest)`. With `is_news: None` everything lands in `rest`.
    pub fn get_categories(&self, is_news: Option<&dyn Fn(&Value) -> bool>) -> (Vec<(Id, Value)>, Vec<(Id, Value)>) {
        let mut news = Vec::new();
        let mut rest = Vec::new();
        for (&id, value) in self.table.id_map() {
            match is_news {
                Some(pred) if pred(value) => news.push((id, value.clone())),
                _ => rest.push((id, value.clone())),
            }
        }
        (news, rest)
    }

    /// Resolve destination id(s) by value, folding case for text values.
    /// String-to-id resolution lives here, at the field layer, rather
    /// than in `LinkTable` - callers speak in values ("tag named
    /// 'sci-fi'"), the link table only ever speaks in ids.
    pub fn resolve(&self, value: &Value) -> Option<Id> {
        let folded = value.case_fold();
        self.table.id_map().iter().find_map(|(&id, v)| match (&folded, v.case_fold()) {
            (Some(want), Some(have)) if *want == have => Some(id),
            _ if v == value => Some(id),
            _ => None,
        })
    }
}

impl Field for RelationalField {
    fn metadata(&self) -> &FieldMetadata {
        &self.metadata
    }

    fn for_book(&self, book_id: Id) -> FieldValue {
        container_to_value(&self.table, self.table.book_data(book_id, None))
    }

    fn sort_key(&self, book_id: Id) -> SortKey {
        match self.for_book(book_id) {
            FieldValue::None => SortKey::Empty,
            FieldValue::Single(v) => SortKey::from_value(&v),
            FieldValue::Multi(vs) => SortKey::Multi(vs.iter().map(SortKey::from_value).collect()),
            FieldValue::Typed(m) => {
                SortKey::Multi(m.into_values().flatten().map(|v| SortKey::from_value(&v)).collect())
            }
        }
    }
}

fn container_to_value(table: &LinkTable, cell: DstContainer) -> FieldValue {
    match cell {
        DstContainer::Empty => FieldValue::None,
        DstContainer::Single(id) => table.value(id).map(|v| FieldValue::Single(v.clone())).unwrap_or(FieldValue::None),
        DstContainer::Set(s) => {
            FieldValue::Multi(s.into_iter().filter_map(|id| table.value(id).ok().cloned()).collect())
        }
        DstContainer::List(l) => {
            FieldValue::Multi(l.into_iter().filter_map(|id| table.value(id).ok().cloned()).collect())
        }
        DstContainer::Typed(m) => FieldValue::Typed(
            m.into_iter()
                .map(|(ty, c)| {
                    let FieldValue::Multi(vs) = container_to_value(table, c) else { unreachable!() };
                    (ty, vs)
                })
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::mock::MockStore;
    use std::collections::HashSet;

    #[test]
    fn resolve_is_case_insensitive() {
        let mut store = MockStore::new();
        store.seed_id_map("tags", vec![(1, Value::from("Sci-Fi"))]);
        let meta = FieldMetadata { name: "tags", datatype: Datatype::Text, is_multiple: true, is_editable: true };
        let mut field = RelationalField::new(meta, Variant::ManyToMany, "titles", "tags");
        field.read(&store, &HashSet::new()).unwrap();
        assert_eq!(field.resolve(&Value::from("sci-fi")), Some(1));
    }

    #[test]
    fn get_categories_splits_news_tags_out() {
        let mut store = MockStore::new();
        store.seed_id_map(
            "tags",
            vec![(1, Value::from("News: The Daily")), (2, Value::from("sci-fi"))],
        );
        let meta = FieldMetadata { name: "tags", datatype: Datatype::Text, is_multiple: true, is_editable: true };
        let mut field = RelationalField::new(meta, Variant::ManyToMany, "titles", "tags");
        field.read(&store, &HashSet::new()).unwrap();

        let is_news = |v: &Value| v.as_text().is_some_and(|t| t.starts_with("News:"));
        let (news, rest) = field.get_categories(Some(&is_news));
        assert_eq!(news, vec![(1, Value::from("News: The Daily"))]);
        assert_eq!(rest, vec![(2, Value::from("sci-fi"))]);
    }
}
