// src/cache.rs
//
// The top-level handle applications hold: every named field kind plus
// the view, behind one `SafeLock` (spec section 5 - single-writer,
// many-reader over the whole cache, not per-table locks; a reader never
// blocks another reader, and a writer excludes everyone else for the
// duration of its call).

use crate::error::Result;
use crate::fields::composite::{AuthorSortField, BookSizeField};
use crate::fields::simple::ScalarField;
use crate::fields::{Datatype, Field, FieldMetadata, FieldValue};
use crate::link_table::{Id, UpdateValue, Variant};
use crate::lock::SafeLock;
use crate::prefs::Preferences;
use crate::store::Store;
use crate::value::Value;
use crate::view::{FieldSource, View};
use crate::RelationalField;
use log::info;
use std::collections::{HashMap, HashSet};

struct FieldSpec {
    name: &'static str,
    variant: Variant,
    dst_table: &'static str,
    datatype: Datatype,
    is_multiple: bool,
}

const FIELD_SPECS: &[FieldSpec] = &[
    FieldSpec { name: "authors", variant: Variant::ManyToManyPriority, dst_table: "authors", datatype: Datatype::Text, is_multiple: true },
    FieldSpec { name: "tags", variant: Variant::ManyToMany, dst_table: "tags", datatype: Datatype::Text, is_multiple: true },
    FieldSpec { name: "series", variant: Variant::ManyToOne, dst_table: "series", datatype: Datatype::Series, is_multiple: false },
    FieldSpec { name: "languages", variant: Variant::ManyToManyPriority, dst_table: "languages", datatype: Datatype::Text, is_multiple: true },
    FieldSpec { name: "identifiers", variant: Variant::ManyToManyTyped, dst_table: "identifiers", datatype: Datatype::Text, is_multiple: true },
    FieldSpec { name: "publisher", variant: Variant::ManyToOne, dst_table: "publishers", datatype: Datatype::Text, is_multiple: false },
    FieldSpec { name: "cover", variant: Variant::OneToOne, dst_table: "covers", datatype: Datatype::Text, is_multiple: false },
    FieldSpec { name: "formats", variant: Variant::OneToManyPriorityTyped, dst_table: "files", datatype: Datatype::Text, is_multiple: true },
    FieldSpec { name: "rating", variant: Variant::ManyToOne, dst_table: "ratings", datatype: Datatype::Rating, is_multiple: false },
    FieldSpec { name: "comments", variant: Variant::OneToOne, dst_table: "comments", datatype: Datatype::Text, is_multiple: false },
    FieldSpec { name: "subjects", variant: Variant::ManyToMany, dst_table: "subjects", datatype: Datatype::Text, is_multiple: true },
    FieldSpec { name: "genres", variant: Variant::ManyToMany, dst_table: "genres", datatype: Datatype::Text, is_multiple: true },
    FieldSpec { name: "notes", variant: Variant::OneToMany, dst_table: "notes", datatype: Datatype::Text, is_multiple: true },
    FieldSpec { name: "synopsis", variant: Variant::OneToOne, dst_table: "synopses", datatype: Datatype::Text, is_multiple: false },
];

struct CacheState {
    fields: HashMap<&'static str, RelationalField>,
    titles: ScalarField,
    /// Per-book stored author-sort override; `AuthorSortField` falls back to
    /// a derived "Surname, First" form when a book has no entry here.
    author_sort_overrides: ScalarField,
    view: View,
    known_book_ids: HashSet<Id>,
}

pub struct Cache {
    prefs: Preferences,
    state: SafeLock<CacheState>,
}

impl Cache {
    pub fn new(prefs: Preferences) -> Self {
        let fields = FIELD_SPECS
            .iter()
            .map(|spec| {
                let metadata = FieldMetadata {
                    name: spec.name,
                    datatype: spec.datatype,
                    is_multiple: spec.is_multiple,
                    is_editable: true,
                };
                (spec.name, RelationalField::new(metadata, spec.variant, "titles", spec.dst_table))
            })
            .collect();
        let titles = ScalarField::new(
            FieldMetadata { name: "title", datatype: Datatype::Text, is_multiple: false, is_editable: true },
            "titles",
            prefs.bools_are_tristate,
        );
        let author_sort_overrides = ScalarField::new(
            FieldMetadata { name: "author_sort", datatype: Datatype::Text, is_multiple: false, is_editable: true },
            "author_sort",
            prefs.bools_are_tristate,
        );
        let view = View::new(prefs.maximum_resort_levels);
        Cache {
            prefs,
            state: SafeLock::new(
                "cache",
                CacheState { fields, titles, author_sort_overrides, view, known_book_ids: HashSet::new() },
            ),
        }
    }

    pub fn preferences(&self) -> &Preferences {
        &self.prefs
    }

    /// Populate every field from the store and refresh the view. The
    /// canonical set of known book ids comes once from the titles table -
    /// every field read shares that same universe rather than inferring
    /// it from its own (possibly sparse) link rows.
    pub fn read(&self, store: &dyn Store) -> Result<()> {
        let mut guard = self.state.safe_write_lock();
        let state = &mut *guard;

        state.titles.read(store)?;
        state.author_sort_overrides.read(store)?;
        let title_rows = store.read_id_map("titles")?;
        state.known_book_ids = title_rows.iter().map(|(id, _)| *id).collect();

        for field in state.fields.values_mut() {
            field.read(store, &state.known_book_ids)?;
        }

        let source = FieldSourceView { fields: &state.fields, titles: &state.titles };
        state.view.refresh(&state.known_book_ids, &source);
        info!("cache: read {} books", state.known_book_ids.len());
        Ok(())
    }

    pub fn field_value(&self, name: &str, book_id: Id) -> FieldValue {
        let guard = self.state.safe_read_lock();
        if name == "title" {
            return guard.titles.for_book(book_id);
        }
        guard.fields.get(name).map(|f| f.for_book(book_id)).unwrap_or(FieldValue::None)
    }

    pub fn update_field(
        &self,
        store: &dyn Store,
        name: &str,
        changes: HashMap<Id, UpdateValue>,
        id_map_update: HashMap<Id, Value>,
        allow_case_change: bool,
    ) -> Result<()> {
        let mut guard = self.state.safe_write_lock();
        let state = &mut *guard;
        let field = state
            .fields
            .get_mut(name)
            .ok_or_else(|| crate::error::CacheError::InvalidLinkTable("titles".into(), name.into()))?;
        field.update(store, changes, id_map_update, allow_case_change)?;
        let source = FieldSourceView { fields: &state.fields, titles: &state.titles };
        state.view.refresh(&state.known_book_ids, &source);
        Ok(())
    }

    /// Removes `book_ids` from every field and returns the clean-candidate
    /// destination ids turned up along the way (spec's `maintainer.clean`
    /// hook - callers decide whether to act on them).
    pub fn remove_books(&self, store: &dyn Store, book_ids: &[Id]) -> Result<Vec<Id>> {
        let mut guard = self.state.safe_write_lock();
        let state = &mut *guard;
        let mut clean = Vec::new();
        for field in state.fields.values_mut() {
            clean.extend(field.remove_books(store, book_ids)?);
        }
        for id in book_ids {
            state.known_book_ids.remove(id);
        }
        let source = FieldSourceView { fields: &state.fields, titles: &state.titles };
        state.view.refresh(&state.known_book_ids, &source);
        Ok(clean)
    }

    /// Returns the sources whose value set changed under `field_name`.
    pub fn remove_items(
        &self,
        store: &dyn Store,
        field_name: &str,
        item_ids: &[Id],
        restrict_to_book_ids: Option<&[Id]>,
    ) -> Result<Vec<Id>> {
        let mut guard = self.state.safe_write_lock();
        let state = &mut *guard;
        let field = state
            .fields
            .get_mut(field_name)
            .ok_or_else(|| crate::error::CacheError::InvalidLinkTable("titles".into(), field_name.into()))?;
        let touched = field.remove_items(store, item_ids, restrict_to_book_ids)?;
        let source = FieldSourceView { fields: &state.fields, titles: &state.titles };
        state.view.refresh(&state.known_book_ids, &source);
        Ok(touched)
    }

    pub fn rename_item(&self, store: &dyn Store, field_name: &str, id: Id, new_value: Value) -> Result<Option<Id>> {
        let mut guard = self.state.safe_write_lock();
        let state = &mut *guard;
        let field = state
            .fields
            .get_mut(field_name)
            .ok_or_else(|| crate::error::CacheError::InvalidLinkTable("titles".into(), field_name.into()))?;
        field.rename_item(store, id, new_value)
    }

    pub fn multisort(&self, field: impl Into<String>, ascending: bool) {
        let mut guard = self.state.safe_write_lock();
        let state = &mut *guard;
        let source = FieldSourceView { fields: &state.fields, titles: &state.titles };
        state.view.multisort(field, ascending, &source);
    }

    pub fn search(&self, term: Option<String>) {
        let mut guard = self.state.safe_write_lock();
        let state = &mut *guard;
        let known = state.known_book_ids.clone();
        let source = FieldSourceView { fields: &state.fields, titles: &state.titles };
        state.view.search(term, &known, &source);
    }

    pub fn view_book_ids(&self) -> Vec<Id> {
        self.state.safe_read_lock().view.book_ids().to_vec()
    }

    pub fn mark(&self, book_id: Id) {
        self.state.safe_write_lock().view.mark(book_id);
    }

    pub fn unmark(&self, book_id: Id) {
        self.state.safe_write_lock().view.unmark(book_id);
    }

    pub fn is_marked(&self, book_id: Id) -> bool {
        self.state.safe_read_lock().view.is_marked(book_id)
    }

    /// "Surname, First" author-sort string for `book_id`, falling back to a
    /// derived form for any author with no stored override.
    pub fn author_sort(&self, book_id: Id) -> String {
        let guard = self.state.safe_read_lock();
        let Some(authors) = guard.fields.get("authors") else { return String::new() };
        let overrides = guard.author_sort_overrides.as_text_map();
        AuthorSortField::new(authors, &overrides).for_book(book_id)
    }

    /// Aggregate on-disk size across `book_id`'s format files, per
    /// `Preferences::book_size_display_mode`. `None` if the book has no
    /// formats.
    pub fn book_size(&self, book_id: Id) -> Option<u64> {
        let guard = self.state.safe_read_lock();
        let files = guard.fields.get("formats")?;
        BookSizeField::new(files, self.prefs.book_size_display_mode).for_book(book_id)
    }
}

struct FieldSourceView<'a> {
    fields: &'a HashMap<&'static str, RelationalField>,
    titles: &'a ScalarField,
}

impl<'a> FieldSource for FieldSourceView<'a> {
    fn sort_key(&self, field: &str, book_id: Id) -> crate::fields::SortKey {
        if field == "title" {
            return self.titles.sort_key(book_id);
        }
        self.fields.get(field).map(|f| f.sort_key(book_id)).unwrap_or(crate::fields::SortKey::Empty)
    }

    fn matches_search(&self, book_id: Id, term: &str) -> bool {
        let needle = term.to_lowercase();
        if let FieldValue::Single(Value::Text(t)) = self.titles.for_book(book_id) {
            if t.to_lowercase().contains(&needle) {
                return true;
            }
        }
        self.fields.values().any(|f| field_value_contains(&f.for_book(book_id), &needle))
    }
}

fn field_value_contains(value: &FieldValue, needle: &str) -> bool {
    match value {
        FieldValue::Single(Value::Text(t)) => t.to_lowercase().contains(needle),
        FieldValue::Multi(vs) => vs.iter().any(|v| matches!(v, Value::Text(t) if t.to_lowercase().contains(needle))),
        FieldValue::Typed(m) => m
            .values()
            .flatten()
            .any(|v| matches!(v, Value::Text(t) if t.to_lowercase().contains(needle))),
        _ => false,
    }
}
