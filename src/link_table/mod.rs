// src/link_table/mod.rs
//
// The cached pair of reciprocal maps (plus the destination id -> value map)
// for one relation between a source entity kind (normally "titles") and a
// destination entity kind (authors, tags, series, ...). One concrete type
// handles all eight structural variants (spec section 3); `Variant`
// selects which container shape each side is allowed to take, and every
// other behaviour - read, the update pipeline, remove/rename/clean - is
// shared.

pub mod containers;
pub mod update;
pub mod variant;

pub use containers::{ContainerKind, DstContainer, Id, UpdateValue};
pub use variant::Variant;

use crate::error::{CacheError, Result};
use crate::store::Store;
use crate::value::Value;
use log::{debug, trace};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

pub struct LinkTable {
    pub name: &'static str,
    pub variant: Variant,
    pub src_table: &'static str,
    pub dst_table: &'static str,

    book_col_map: HashMap<Id, DstContainer>,
    col_book_map: HashMap<Id, DstContainer>,
    id_map: HashMap<Id, Value>,
    seen_book_ids: HashSet<Id>,
    /// The closed set of link types observed on the last `read`. Typed
    /// variants only; empty and ignored otherwise.
    seen_types: HashSet<String>,
    /// Synthetic destination id -> store discriminator string, populated only
    /// by the `OneToManyPriorityTyped` (formats/covers) read path. A backup of
    /// a format file carries the same discriminator as the file it backs up,
    /// prefixed `ORIGINAL_` (spec: "discriminators prefixed ORIGINAL_ on top
    /// of the regular format discriminator").
    discriminators: HashMap<Id, String>,
    next_synthetic_id: Id,
}

impl LinkTable {
    pub fn new(name: &'static str, variant: Variant, src_table: &'static str, dst_table: &'static str) -> Self {
        LinkTable {
            name,
            variant,
            src_table,
            dst_table,
            book_col_map: HashMap::new(),
            col_book_map: HashMap::new(),
            id_map: HashMap::new(),
            seen_book_ids: HashSet::new(),
            seen_types: HashSet::new(),
            discriminators: HashMap::new(),
            next_synthetic_id: 1,
        }
    }

    pub fn id_map(&self) -> &HashMap<Id, Value> {
        &self.id_map
    }

    pub fn seen_types(&self) -> &HashSet<String> {
        &self.seen_types
    }

    /// The store discriminator a synthetic destination id was minted from.
    /// `None` for every variant but `OneToManyPriorityTyped`.
    pub fn discriminator(&self, dst: Id) -> Option<&str> {
        self.discriminators.get(&dst).map(String::as_str)
    }

    /// Whether `dst` is a backup of another format file rather than the
    /// file itself (spec: backups carry an `ORIGINAL_`-prefixed discriminator
    /// layered on top of the regular one).
    pub fn is_backup(&self, dst: Id) -> bool {
        self.discriminator(dst).is_some_and(|d| d.starts_with("ORIGINAL_"))
    }

    pub fn known_book_ids(&self) -> &HashSet<Id> {
        &self.seen_book_ids
    }

    /// Populate the cache from the store. Idempotent: discards any cached
    /// state and re-reads. `known_book_ids` is the full universe of source
    /// ids (read once, up front, from the titles identity field) - using a
    /// single canonical source rather than inferring "known" books from
    /// this table's own (possibly empty) link rows avoids the latent bug
    /// class the design notes call out in the original per-table
    /// `seen_book_ids` computation.
    pub fn read(&mut self, store: &dyn Store, known_book_ids: &HashSet<Id>) -> Result<()> {
        trace!("{}: read", self.name);
        self.book_col_map.clear();
        self.col_book_map.clear();
        self.id_map.clear();
        self.seen_types.clear();
        self.discriminators.clear();
        self.next_synthetic_id = 1;
        self.seen_book_ids = known_book_ids.clone();

        for (dst, value) in store.read_id_map(self.dst_table)? {
            self.id_map.insert(dst, value);
        }

        match self.variant {
            Variant::OneToOne | Variant::ManyToOne => {
                let rows = if self.variant == Variant::OneToOne {
                    store.read_one_to_one(self.dst_table)?
                } else {
                    store.read_many_to_one(self.dst_table)?
                };
                for (src, dst) in rows {
                    self.add_link(src, dst, None);
                }
            }
            Variant::OneToMany => {
                for (src, dst) in store.read_one_to_many(self.dst_table)? {
                    self.add_link(src, dst, None);
                }
            }
            Variant::ManyToMany => {
                for (src, dst) in store.read_many_to_many(self.dst_table)? {
                    self.add_link(src, dst, None);
                }
            }
            Variant::ManyToManyPriority => {
                // Descending priority column, so each insertion lands at the
                // back and earlier (higher-priority) entries keep the front.
                let mut rows = store.read_many_to_many_priority(self.dst_table)?;
                rows.sort_by_key(|(_, _, priority)| std::cmp::Reverse(*priority));
                for (src, dst, _) in rows {
                    self.add_link(src, dst, None);
                }
            }
            Variant::ManyToManyTyped => {
                for (src, dst, ty) in store.read_many_to_many_typed(self.dst_table)? {
                    self.seen_types.insert(ty.clone());
                    self.add_link(src, dst, Some(&ty));
                }
            }
            Variant::ManyToManyPriorityTyped => {
                let mut rows = store.read_many_to_many_priority_typed(self.dst_table)?;
                rows.sort_by_key(|(_, _, _, priority)| std::cmp::Reverse(*priority));
                for (src, dst, ty, _) in rows {
                    self.seen_types.insert(ty.clone());
                    self.add_link(src, dst, Some(&ty));
                }
            }
            Variant::OneToManyPriorityTyped => {
                let mut rows = store.read_blobs(self.dst_table)?;
                rows.sort_by(|a, b| (a.0, a.1.as_str(), a.2.as_str()).cmp(&(b.0, b.1.as_str(), b.2.as_str())));
                for (src, ty, discriminator, value) in rows {
                    let dst = self.next_synthetic_id;
                    self.next_synthetic_id += 1;
                    self.id_map.insert(dst, value);
                    self.seen_types.insert(ty.clone());
                    self.discriminators.insert(dst, discriminator);
                    self.add_link(src, dst, Some(&ty));
                }
            }
        }

        debug!(
            "{}: read {} sources, {} destinations",
            self.name,
            self.book_col_map.len(),
            self.id_map.len()
        );
        Ok(())
    }

    /// Record one (src, dst[, type]) row on both sides, growing each side's
    /// container to the shape its `Variant` prescribes.
    fn add_link(&mut self, src: Id, dst: Id, ty: Option<&str>) {
        insert_one(&mut self.book_col_map, self.variant.book_col_shape(), src, dst, ty);
        insert_one(&mut self.col_book_map, self.variant.col_book_shape(), dst, src, ty);
    }

    /// Deep-copy snapshot of the destinations associated with `src`. For
    /// typed variants, `type_filter = Some(ty)` narrows the snapshot to
    /// just that type's sub-container instead of the full type->container
    /// map; `None` (the default, and the only meaningful choice for
    /// untyped variants) returns the whole cell.
    pub fn book_data(&self, src: Id, type_filter: Option<&str>) -> DstContainer {
        let cell = self.book_col_map.get(&src).cloned().unwrap_or_default();
        match type_filter {
            Some(ty) => cell.typed_view().and_then(|m| m.get(ty)).cloned().unwrap_or_default(),
            None => cell,
        }
    }

    pub fn ids_for_book(&self, src: Id) -> Vec<Id> {
        match self.book_col_map.get(&src) {
            Some(c) if self.variant.is_priority() => c.ordered(),
            Some(c) => c.flatten().into_iter().collect(),
            None => Vec::new(),
        }
    }

    pub fn books_for(&self, dst: Id) -> Vec<Id> {
        match self.col_book_map.get(&dst) {
            Some(c) if self.variant.col_book_shape().is_ordered() => c.ordered(),
            Some(c) => c.flatten().into_iter().collect(),
            None => Vec::new(),
        }
    }

    pub fn value(&self, dst: Id) -> Result<&Value> {
        self.id_map
            .get(&dst)
            .ok_or_else(|| CacheError::NotInCache(format!("{}: no such id {dst}", self.dst_table)))
    }
}

/// Insert `value` into the container living at `map[key]`, growing it from
/// `Empty` to the shape `kind` prescribes on first use. Shared by `read`
/// (building up from store rows) and by the update pipeline's internal
/// apply step (building up the new side of a diff).
fn insert_one(map: &mut HashMap<Id, DstContainer>, kind: ContainerKind, key: Id, value: Id, ty: Option<&str>) {
    let entry = map.entry(key).or_insert(DstContainer::Empty);
    *entry = insert_value(entry, kind, value, ty);
}

/// Remove `value` from the container living at `map[key]`, dropping the
/// map entry entirely once its container becomes empty. Shape-agnostic:
/// removal never needs to know the declared `ContainerKind`.
fn remove_one(map: &mut HashMap<Id, DstContainer>, key: Id, value: Id) {
    if let Some(cell) = map.get(&key) {
        let updated = remove_value(cell, value);
        if updated.is_empty() {
            map.remove(&key);
        } else {
            map.insert(key, updated);
        }
    }
}

fn remove_value(cell: &DstContainer, value: Id) -> DstContainer {
    match cell {
        DstContainer::Empty => DstContainer::Empty,
        DstContainer::Single(id) => {
            if *id == value {
                DstContainer::Empty
            } else {
                DstContainer::Single(*id)
            }
        }
        DstContainer::Set(s) => {
            let mut s = s.clone();
            s.remove(&value);
            DstContainer::Set(s)
        }
        DstContainer::List(l) => DstContainer::List(l.iter().filter(|id| **id != value).copied().collect()),
        DstContainer::Typed(m) => DstContainer::Typed(
            m.iter()
                .map(|(ty, c)| (ty.clone(), remove_value(c, value)))
                .filter(|(_, c)| !c.is_empty())
                .collect(),
        ),
    }
}

fn insert_value(existing: &DstContainer, kind: ContainerKind, value: Id, ty: Option<&str>) -> DstContainer {
    match kind {
        ContainerKind::Single => DstContainer::Single(value),
        ContainerKind::Set => {
            let mut set = match existing {
                DstContainer::Set(s) => s.clone(),
                _ => BTreeSet::new(),
            };
            set.insert(value);
            DstContainer::Set(set)
        }
        ContainerKind::List => {
            let mut list = match existing {
                DstContainer::List(l) => l.clone(),
                _ => Vec::new(),
            };
            if !list.contains(&value) {
                list.push(value);
            }
            DstContainer::List(list)
        }
        ContainerKind::TypedSet | ContainerKind::TypedList => {
            let ty = ty.expect("typed container insert requires a link type");
            let mut typed = match existing {
                DstContainer::Typed(m) => m.clone(),
                _ => BTreeMap::new(),
            };
            let leaf_kind = if kind == ContainerKind::TypedSet {
                ContainerKind::Set
            } else {
                ContainerKind::List
            };
            let cell = typed.get(ty).cloned().unwrap_or(DstContainer::Empty);
            typed.insert(ty.to_string(), insert_value(&cell, leaf_kind, value, None));
            DstContainer::Typed(typed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::mock::MockStore;

    fn seed_tags() -> (LinkTable, HashSet<Id>) {
        let mut store = MockStore::new();
        store.seed_id_map("tags", vec![(21, Value::from("sci-fi")), (22, Value::from("space"))]);
        store.seed_many_to_many("tags", vec![(7, 21), (7, 22)]);
        let known = HashSet::from([7, 8]);
        let mut table = LinkTable::new("tags", Variant::ManyToMany, "titles", "tags");
        table.read(&store, &known).unwrap();
        (table, known)
    }

    #[test]
    fn read_populates_reciprocal_maps() {
        let (table, _known) = seed_tags();
        assert_eq!(
            table.ids_for_book(7).into_iter().collect::<HashSet<_>>(),
            HashSet::from([21, 22])
        );
        assert!(table.books_for(21).contains(&7));
        assert!(table.ids_for_book(8).is_empty());
    }

    #[test]
    fn formats_variant_gives_each_destination_exactly_one_owner() {
        let mut store = MockStore::new();
        store.seed_blobs(
            "files",
            vec![
                (7, "EPUB".into(), "EPUB_1".into(), Value::from("book7.epub")),
                (7, "MOBI".into(), "MOBI_1".into(), Value::from("book7.mobi")),
            ],
        );
        let known = HashSet::from([7]);
        let mut table = LinkTable::new("files", Variant::OneToManyPriorityTyped, "titles", "files");
        table.read(&store, &known).unwrap();
        let ids = table.ids_for_book(7);
        assert_eq!(ids.len(), 2);
        for d in ids {
            assert_eq!(table.books_for(d), vec![7]);
        }
    }

    #[test]
    fn book_data_type_filter_narrows_to_one_types_subcontainer() {
        let mut store = MockStore::new();
        store.seed_id_map("identifiers", vec![(1, Value::from("978-0")), (2, Value::from("B00ABC"))]);
        store.seed_many_to_many_typed("identifiers", vec![(7, 1, "isbn".into()), (7, 2, "asin".into())]);
        let known = HashSet::from([7]);
        let mut table = LinkTable::new("identifiers", Variant::ManyToManyTyped, "titles", "identifiers");
        table.read(&store, &known).unwrap();

        let full = table.book_data(7, None);
        assert_eq!(full.typed_view().unwrap().len(), 2);

        let isbn_only = table.book_data(7, Some("isbn"));
        assert_eq!(isbn_only.flatten(), BTreeSet::from([1]));
        assert!(table.book_data(7, Some("nonexistent")).is_empty());
    }

    #[test]
    fn format_backup_discriminator_is_recognised() {
        let mut store = MockStore::new();
        store.seed_blobs(
            "files",
            vec![
                (7, "EPUB".into(), "EPUB_1".into(), Value::from("book7.epub")),
                (7, "EPUB".into(), "ORIGINAL_EPUB_1".into(), Value::from("book7.epub.bak")),
            ],
        );
        let known = HashSet::from([7]);
        let mut table = LinkTable::new("files", Variant::OneToManyPriorityTyped, "titles", "files");
        table.read(&store, &known).unwrap();
        let backups: Vec<Id> = table.ids_for_book(7).into_iter().filter(|&id| table.is_backup(id)).collect();
        assert_eq!(backups.len(), 1);
        assert_eq!(table.discriminator(backups[0]), Some("ORIGINAL_EPUB_1"));
    }
}
