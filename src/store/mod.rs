// src/store/mod.rs
//
// The persistent-store boundary (spec section 6, "external interfaces").
// Everything on the other side of `Store` - query planning, schema
// migration, blob I/O - is out of scope; the cache only needs enough of
// the store to fill its maps on `read` and to hand off a computed
// `UpdateDiff` on write.

pub mod mock;
pub mod sqlite;

use crate::diff::UpdateDiff;
use crate::error::Result;
use crate::link_table::Id;
use crate::value::Value;

/// Row shapes read back per link-table variant. One method per variant
/// rather than a single generic row type keeps each variant's column list
/// explicit, matching how the per-table read methods look in the cache the
/// rest of this crate is modelled on.
pub trait Store: Send + Sync {
    /// All (id, value) pairs for one entity kind's identity table
    /// (e.g. every tag id and its text).
    fn read_id_map(&self, dst_table: &str) -> Result<Vec<(Id, Value)>>;

    /// (src, dst) rows for a one-to-one relation (e.g. titles -> uuid).
    fn read_one_to_one(&self, dst_table: &str) -> Result<Vec<(Id, Id)>>;

    /// (src, dst) rows for a many-to-one relation (e.g. titles -> publisher).
    fn read_many_to_one(&self, dst_table: &str) -> Result<Vec<(Id, Id)>>;

    /// (src, dst) rows for an unordered one-to-many relation (e.g. titles -> comments).
    fn read_one_to_many(&self, dst_table: &str) -> Result<Vec<(Id, Id)>>;

    /// (src, dst) rows for an unordered many-to-many relation (e.g. titles <-> tags).
    fn read_many_to_many(&self, dst_table: &str) -> Result<Vec<(Id, Id)>>;

    /// (src, dst, priority) rows for a priority-ordered many-to-many
    /// relation (e.g. titles <-> authors).
    fn read_many_to_many_priority(&self, dst_table: &str) -> Result<Vec<(Id, Id, i64)>>;

    /// (src, dst, link_type) rows for a type-partitioned many-to-many
    /// relation (e.g. titles <-> identifiers).
    fn read_many_to_many_typed(&self, dst_table: &str) -> Result<Vec<(Id, Id, String)>>;

    /// (src, dst, link_type, priority) rows for a type-partitioned,
    /// priority-ordered many-to-many relation.
    fn read_many_to_many_priority_typed(&self, dst_table: &str) -> Result<Vec<(Id, Id, String, i64)>>;

    /// (src, link_type, discriminator, value) rows for the formats field:
    /// each row is a distinct file, keyed by a store-local discriminator
    /// rather than a synthetic destination id (the cache mints those on read).
    fn read_blobs(&self, dst_table: &str) -> Result<Vec<(Id, String, String, Value)>>;

    /// A link-attribute column living alongside a many-to-many join row
    /// (e.g. a series' `series_index` float for one book).
    fn read_link_attr(&self, dst_table: &str, attr: &str) -> Result<Vec<(Id, Id, Value)>>;

    /// Persist one link table's computed diff. The cache treats a write
    /// failure here as fatal to the whole in-memory cache, not just this
    /// table - see `CacheError::DatabaseIntegrityError`.
    fn write_diff(&self, dst_table: &str, diff: &UpdateDiff) -> Result<()>;

    /// Remove every link row naming `ids` from `dst_table`'s id_map and
    /// from both sides of the relation. Used by `remove_items`.
    fn bulk_delete_in_table(&self, dst_table: &str, ids: &[Id]) -> Result<()>;

    /// Case-fold rename collision merge: repoint every link row from
    /// `old_id` to `new_id`, then drop `old_id` from the id_map.
    fn merge_link_rows(&self, dst_table: &str, old_id: Id, new_id: Id) -> Result<()>;

    /// Update a destination's identity value in place (a plain rename,
    /// no merge).
    fn update_column_in_table(&self, dst_table: &str, id: Id, value: &Value) -> Result<()>;

    /// Deferred garbage-collection hook (spec: `maintainer.clean(table,
    /// item_ids)`). Called with the clean-candidate ids `remove_books`
    /// and `rename_item`/`fix_case_duplicates`' merges turn up, once
    /// they're already unreferenced in the cache's own maps.
    fn clean(&self, dst_table: &str, ids: &[Id]) -> Result<()>;
}
