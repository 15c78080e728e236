// src/fields/attrs.rs
//
// Attribute values carried on a link row itself rather than on either
// endpoint - the series index being the canonical example: it belongs
// to neither the book nor the series, only to the fact that this book
// occupies this position within that series.

use crate::error::Result;
use crate::link_table::Id;
use crate::store::Store;
use crate::value::Value;
use std::collections::HashMap;

pub struct LinkAttrField {
    dst_table: &'static str,
    attr: &'static str,
    values: HashMap<(Id, Id), Value>,
}

impl LinkAttrField {
    pub fn new(dst_table: &'static str, attr: &'static str) -> Self {
        LinkAttrField { dst_table, attr, values: HashMap::new() }
    }

    pub fn read(&mut self, store: &dyn Store) -> Result<()> {
        self.values.clear();
        for (src, dst, value) in store.read_link_attr(self.dst_table, self.attr)? {
            self.values.insert((src, dst), value);
        }
        Ok(())
    }

    pub fn get(&self, book_id: Id, dst_id: Id) -> Option<&Value> {
        self.values.get(&(book_id, dst_id))
    }

    pub fn set(&mut self, book_id: Id, dst_id: Id, value: Value) {
        self.values.insert((book_id, dst_id), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::mock::MockStore;

    #[test]
    fn read_populates_per_link_values() {
        let mut store = MockStore::new();
        store.seed_link_attr("series", "series_index", vec![(7, 3, Value::Int(2))]);
        let mut attr = LinkAttrField::new("series", "series_index");
        attr.read(&store).unwrap();
        assert_eq!(attr.get(7, 3), Some(&Value::Int(2)));
        assert_eq!(attr.get(7, 4), None);
    }
}
