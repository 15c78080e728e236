// src/fields/simple.rs
//
// Plain per-book scalar fields that never go through a link table at
// all - dates, booleans, free-standing identity columns living directly
// on the book row (pubdate, timestamp, last_modified and the like).
// `Store::read_id_map` doubles as "read this table's rows" regardless of
// whether the table is a destination id_map or a book-keyed column set.

use super::{Datatype, Field, FieldMetadata, FieldValue, SortKey};
use crate::error::Result;
use crate::link_table::Id;
use crate::store::Store;
use crate::value::Value;
use std::collections::HashMap;

pub struct ScalarField {
    metadata: FieldMetadata,
    table_name: &'static str,
    values: HashMap<Id, Value>,
    tristate: bool,
}

impl ScalarField {
    pub fn new(metadata: FieldMetadata, table_name: &'static str, tristate: bool) -> Self {
        ScalarField { metadata, table_name, values: HashMap::new(), tristate }
    }

    pub fn read(&mut self, store: &dyn Store) -> Result<()> {
        self.values = store.read_id_map(self.table_name)?.into_iter().collect();
        Ok(())
    }

    pub fn set(&mut self, store: &dyn Store, book_id: Id, value: Value) -> Result<()> {
        store.update_column_in_table(self.table_name, book_id, &value)?;
        self.values.insert(book_id, value);
        Ok(())
    }

    pub fn clear(&mut self, store: &dyn Store, book_id: Id) -> Result<()> {
        self.values.remove(&book_id);
        store.bulk_delete_in_table(self.table_name, &[book_id])
    }

    /// This field's text-valued entries, for callers (like `AuthorSortField`)
    /// that need a plain override map rather than the `Field` trait's
    /// per-book lookup.
    pub fn as_text_map(&self) -> HashMap<Id, String> {
        self.values
            .iter()
            .filter_map(|(&id, v)| v.as_text().map(|s| (id, s.to_string())))
            .collect()
    }
}

impl Field for ScalarField {
    fn metadata(&self) -> &FieldMetadata {
        &self.metadata
    }

    fn for_book(&self, book_id: Id) -> FieldValue {
        match self.values.get(&book_id) {
            Some(v) => FieldValue::Single(v.clone()),
            None => FieldValue::None,
        }
    }

    fn sort_key(&self, book_id: Id) -> SortKey {
        match self.metadata.datatype {
            Datatype::Bool => {
                let value = match self.values.get(&book_id) {
                    Some(Value::Int(1)) => Some(true),
                    Some(Value::Int(_)) => Some(false),
                    _ => None,
                };
                SortKey::from_bool(value, self.tristate)
            }
            _ => match self.for_book(book_id) {
                FieldValue::Single(v) => SortKey::from_value(&v),
                _ => SortKey::Empty,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_book_sorts_as_empty() {
        let meta = FieldMetadata { name: "pubdate", datatype: Datatype::Date, is_multiple: false, is_editable: true };
        let field = ScalarField::new(meta, "pubdate", true);
        assert_eq!(field.sort_key(1), SortKey::Empty);
    }
}
