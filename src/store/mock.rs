// src/store/mock.rs
//
// An in-memory `Store` for fast unit and property tests. Rows are seeded
// directly rather than through SQL, so tests stay focused on cache
// behaviour instead of schema plumbing.

use super::Store;
use crate::diff::UpdateDiff;
use crate::error::Result;
use crate::link_table::Id;
use crate::value::Value;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
struct Tables {
    id_maps: HashMap<&'static str, Vec<(Id, Value)>>,
    one_to_one: HashMap<&'static str, Vec<(Id, Id)>>,
    many_to_one: HashMap<&'static str, Vec<(Id, Id)>>,
    one_to_many: HashMap<&'static str, Vec<(Id, Id)>>,
    many_to_many: HashMap<&'static str, Vec<(Id, Id)>>,
    many_to_many_priority: HashMap<&'static str, Vec<(Id, Id, i64)>>,
    many_to_many_typed: HashMap<&'static str, Vec<(Id, Id, String)>>,
    many_to_many_priority_typed: HashMap<&'static str, Vec<(Id, Id, String, i64)>>,
    blobs: HashMap<&'static str, Vec<(Id, String, String, Value)>>,
    link_attrs: HashMap<(String, String), Vec<(Id, Id, Value)>>,
}

/// An in-memory store. Writes (`write_diff` and friends) are recorded but
/// not folded back into the seeded rows - tests that need to observe a
/// write's effect inspect `last_diff`/`deleted`/`merges` directly.
pub struct MockStore {
    tables: Mutex<Tables>,
    pub last_diff: Mutex<Option<(String, UpdateDiff)>>,
    pub deleted: Mutex<Vec<(String, Vec<Id>)>>,
    pub merges: Mutex<Vec<(String, Id, Id)>>,
    pub cleaned: Mutex<Vec<(String, Vec<Id>)>>,
}

impl MockStore {
    pub fn new() -> Self {
        MockStore {
            tables: Mutex::new(Tables::default()),
            last_diff: Mutex::new(None),
            deleted: Mutex::new(Vec::new()),
            merges: Mutex::new(Vec::new()),
            cleaned: Mutex::new(Vec::new()),
        }
    }

    pub fn seed_id_map(&mut self, table: &'static str, rows: Vec<(Id, Value)>) {
        self.tables.get_mut().unwrap().id_maps.insert(table, rows);
    }

    pub fn seed_one_to_one(&mut self, table: &'static str, rows: Vec<(Id, Id)>) {
        self.tables.get_mut().unwrap().one_to_one.insert(table, rows);
    }

    pub fn seed_many_to_one(&mut self, table: &'static str, rows: Vec<(Id, Id)>) {
        self.tables.get_mut().unwrap().many_to_one.insert(table, rows);
    }

    pub fn seed_one_to_many(&mut self, table: &'static str, rows: Vec<(Id, Id)>) {
        self.tables.get_mut().unwrap().one_to_many.insert(table, rows);
    }

    pub fn seed_many_to_many(&mut self, table: &'static str, rows: Vec<(Id, Id)>) {
        self.tables.get_mut().unwrap().many_to_many.insert(table, rows);
    }

    pub fn seed_many_to_many_priority(&mut self, table: &'static str, rows: Vec<(Id, Id, i64)>) {
        self.tables.get_mut().unwrap().many_to_many_priority.insert(table, rows);
    }

    pub fn seed_many_to_many_typed(&mut self, table: &'static str, rows: Vec<(Id, Id, String)>) {
        self.tables.get_mut().unwrap().many_to_many_typed.insert(table, rows);
    }

    pub fn seed_many_to_many_priority_typed(&mut self, table: &'static str, rows: Vec<(Id, Id, String, i64)>) {
        self.tables.get_mut().unwrap().many_to_many_priority_typed.insert(table, rows);
    }

    pub fn seed_blobs(&mut self, table: &'static str, rows: Vec<(Id, String, String, Value)>) {
        self.tables.get_mut().unwrap().blobs.insert(table, rows);
    }

    pub fn seed_link_attr(&mut self, table: &str, attr: &str, rows: Vec<(Id, Id, Value)>) {
        self.tables
            .get_mut()
            .unwrap()
            .link_attrs
            .insert((table.to_string(), attr.to_string()), rows);
    }
}

impl Default for MockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Store for MockStore {
    fn read_id_map(&self, dst_table: &str) -> Result<Vec<(Id, Value)>> {
        Ok(self.tables.lock().unwrap().id_maps.get(dst_table).cloned().unwrap_or_default())
    }

    fn read_one_to_one(&self, dst_table: &str) -> Result<Vec<(Id, Id)>> {
        Ok(self.tables.lock().unwrap().one_to_one.get(dst_table).cloned().unwrap_or_default())
    }

    fn read_many_to_one(&self, dst_table: &str) -> Result<Vec<(Id, Id)>> {
        Ok(self.tables.lock().unwrap().many_to_one.get(dst_table).cloned().unwrap_or_default())
    }

    fn read_one_to_many(&self, dst_table: &str) -> Result<Vec<(Id, Id)>> {
        Ok(self.tables.lock().unwrap().one_to_many.get(dst_table).cloned().unwrap_or_default())
    }

    fn read_many_to_many(&self, dst_table: &str) -> Result<Vec<(Id, Id)>> {
        Ok(self.tables.lock().unwrap().many_to_many.get(dst_table).cloned().unwrap_or_default())
    }

    fn read_many_to_many_priority(&self, dst_table: &str) -> Result<Vec<(Id, Id, i64)>> {
        Ok(self.tables.lock().unwrap().many_to_many_priority.get(dst_table).cloned().unwrap_or_default())
    }

    fn read_many_to_many_typed(&self, dst_table: &str) -> Result<Vec<(Id, Id, String)>> {
        Ok(self.tables.lock().unwrap().many_to_many_typed.get(dst_table).cloned().unwrap_or_default())
    }

    fn read_many_to_many_priority_typed(&self, dst_table: &str) -> Result<Vec<(Id, Id, String, i64)>> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .many_to_many_priority_typed
            .get(dst_table)
            .cloned()
            .unwrap_or_default())
    }

    fn read_blobs(&self, dst_table: &str) -> Result<Vec<(Id, String, String, Value)>> {
        Ok(self.tables.lock().unwrap().blobs.get(dst_table).cloned().unwrap_or_default())
    }

    fn read_link_attr(&self, dst_table: &str, attr: &str) -> Result<Vec<(Id, Id, Value)>> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .link_attrs
            .get(&(dst_table.to_string(), attr.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    fn write_diff(&self, dst_table: &str, diff: &UpdateDiff) -> Result<()> {
        *self.last_diff.lock().unwrap() = Some((dst_table.to_string(), diff.clone()));
        Ok(())
    }

    fn bulk_delete_in_table(&self, dst_table: &str, ids: &[Id]) -> Result<()> {
        self.deleted.lock().unwrap().push((dst_table.to_string(), ids.to_vec()));
        Ok(())
    }

    fn merge_link_rows(&self, dst_table: &str, old_id: Id, new_id: Id) -> Result<()> {
        self.merges.lock().unwrap().push((dst_table.to_string(), old_id, new_id));
        Ok(())
    }

    fn update_column_in_table(&self, _dst_table: &str, _id: Id, _value: &Value) -> Result<()> {
        Ok(())
    }

    fn clean(&self, dst_table: &str, ids: &[Id]) -> Result<()> {
        self.cleaned.lock().unwrap().push((dst_table.to_string(), ids.to_vec()));
        Ok(())
    }
}
