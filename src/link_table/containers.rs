// src/link_table/containers.rs
//
// One sum-typed container used on both sides of every link table (§3's
// table of per-variant map shapes collapses to a choice of `ContainerKind`
// for `book_col_map` and a (possibly different) one for `col_book_map`).
// This is the concrete resolution of the spec's open question about
// unifying the `val_unique` preflight branches: uniqueness is structural
// (Set/List/TypedSet/TypedList can never hold a duplicate), not a separate
// flag threaded through every call site.

use crate::error::{CacheError, Result};
use std::collections::{BTreeMap, BTreeSet, HashSet};

pub type Id = i64;

/// Which shape a side of a link table is allowed to take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    /// At most one id; `DstContainer::Empty` means "unset".
    Single,
    /// An unordered, duplicate-free set of ids.
    Set,
    /// An ordered, duplicate-free list of ids; position 0 is highest priority.
    List,
    /// A link-type partition of `Set`s.
    TypedSet,
    /// A link-type partition of `List`s.
    TypedList,
}

impl ContainerKind {
    pub fn is_typed(self) -> bool {
        matches!(self, ContainerKind::TypedSet | ContainerKind::TypedList)
    }

    pub fn is_ordered(self) -> bool {
        matches!(self, ContainerKind::List | ContainerKind::TypedList)
    }
}

/// The normalised, stored value for one source (or destination) entry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DstContainer {
    #[default]
    Empty,
    Single(Id),
    Set(BTreeSet<Id>),
    List(Vec<Id>),
    Typed(BTreeMap<String, DstContainer>),
}

impl DstContainer {
    pub fn is_empty(&self) -> bool {
        match self {
            DstContainer::Empty => true,
            DstContainer::Set(s) => s.is_empty(),
            DstContainer::List(l) => l.is_empty(),
            DstContainer::Typed(m) => m.values().all(DstContainer::is_empty),
            DstContainer::Single(_) => false,
        }
    }

    /// Flatten to the set of ids referenced anywhere in this container,
    /// regardless of type partition or ordering. Used for reciprocity
    /// bookkeeping and for `book_data` snapshots of untyped fields.
    pub fn flatten(&self) -> BTreeSet<Id> {
        match self {
            DstContainer::Empty => BTreeSet::new(),
            DstContainer::Single(id) => BTreeSet::from([*id]),
            DstContainer::Set(s) => s.clone(),
            DstContainer::List(l) => l.iter().copied().collect(),
            DstContainer::Typed(m) => m.values().flat_map(DstContainer::flatten).collect(),
        }
    }

    /// Ordered ids, for variants where order matters. Untyped containers
    /// return their own order; typed containers concatenate types in
    /// (link-type) key order.
    pub fn ordered(&self) -> Vec<Id> {
        match self {
            DstContainer::Empty => Vec::new(),
            DstContainer::Single(id) => vec![*id],
            DstContainer::Set(s) => s.iter().copied().collect(),
            DstContainer::List(l) => l.clone(),
            DstContainer::Typed(m) => m.values().flat_map(DstContainer::ordered).collect(),
        }
    }

    pub fn typed_view(&self) -> Option<&BTreeMap<String, DstContainer>> {
        match self {
            DstContainer::Typed(m) => Some(m),
            _ => None,
        }
    }

    pub fn single(&self) -> Option<Id> {
        match self {
            DstContainer::Single(id) => Some(*id),
            DstContainer::Empty => None,
            _ => None,
        }
    }

    /// Drop every id in `ids` from anywhere in this container, pruning
    /// type partitions that become empty. Shape-agnostic - shared by the
    /// typed preflight's cross-type-move step and the update pipeline's
    /// removal passes (`remove_items`, `fix_link_table`).
    pub fn without_ids(&self, ids: &HashSet<Id>) -> DstContainer {
        match self {
            DstContainer::Empty => DstContainer::Empty,
            DstContainer::Single(id) => {
                if ids.contains(id) {
                    DstContainer::Empty
                } else {
                    DstContainer::Single(*id)
                }
            }
            DstContainer::Set(s) => DstContainer::Set(s.iter().filter(|id| !ids.contains(id)).copied().collect()),
            DstContainer::List(l) => DstContainer::List(l.iter().filter(|id| !ids.contains(id)).copied().collect()),
            DstContainer::Typed(m) => DstContainer::Typed(
                m.iter()
                    .map(|(ty, c)| (ty.clone(), c.without_ids(ids)))
                    .filter(|(_, c)| !c.is_empty())
                    .collect(),
            ),
        }
    }
}

/// The user-facing shape of an update value, before normalisation. Mirrors
/// the accepted input shapes named in spec section 4.2: `None`, a scalar,
/// a set/list, or (for typed variants) a per-type map of the same.
#[derive(Debug, Clone)]
pub enum UpdateValue {
    Clear,
    One(Id),
    Many(Vec<Id>),
    Typed(BTreeMap<String, UpdateValue>),
}

impl UpdateValue {
    pub fn ids(&self) -> Vec<Id> {
        match self {
            UpdateValue::Clear => Vec::new(),
            UpdateValue::One(id) => vec![*id],
            UpdateValue::Many(ids) => ids.clone(),
            UpdateValue::Typed(m) => m.values().flat_map(UpdateValue::ids).collect(),
        }
    }
}

/// Preflight: fold `input` into the normalised cell for one (source[, type])
/// slot. `existing` is the cell's current value, if any - a scalar input
/// folds *into* it (spec: "set the tag" means "add to the tag set"), an
/// ordered promotion moves a re-supplied id to the front.
pub fn normalize_cell(kind: ContainerKind, existing: Option<&DstContainer>, input: UpdateValue) -> Result<DstContainer> {
    match kind {
        ContainerKind::Single => match input {
            UpdateValue::Clear => Ok(DstContainer::Empty),
            UpdateValue::One(id) => Ok(DstContainer::Single(id)),
            UpdateValue::Many(ids) if ids.len() == 1 => Ok(DstContainer::Single(ids[0])),
            other => Err(CacheError::InvalidUpdate(format!(
                "one-to-one/many-to-one slot cannot accept a multi-valued update: {other:?}"
            ))),
        },
        ContainerKind::Set => {
            let mut set: BTreeSet<Id> = existing.map(DstContainer::flatten).unwrap_or_default();
            match input {
                UpdateValue::Clear => Ok(DstContainer::Set(BTreeSet::new())),
                UpdateValue::One(id) => {
                    set.insert(id);
                    Ok(DstContainer::Set(set))
                }
                UpdateValue::Many(ids) => Ok(DstContainer::Set(ids.into_iter().collect())),
                UpdateValue::Typed(_) => Err(CacheError::InvalidUpdate(
                    "untyped set slot cannot accept a typed update".into(),
                )),
            }
        }
        ContainerKind::List => {
            let mut list: Vec<Id> = existing.map(|c| c.ordered()).unwrap_or_default();
            match input {
                UpdateValue::Clear => Ok(DstContainer::List(Vec::new())),
                UpdateValue::One(id) => {
                    list.retain(|x| *x != id);
                    list.insert(0, id);
                    Ok(DstContainer::List(list))
                }
                UpdateValue::Many(ids) => {
                    let mut seen = BTreeSet::new();
                    let mut out = Vec::with_capacity(ids.len());
                    for id in ids {
                        if seen.insert(id) {
                            out.push(id);
                        }
                    }
                    Ok(DstContainer::List(out))
                }
                UpdateValue::Typed(_) => Err(CacheError::InvalidUpdate(
                    "untyped list slot cannot accept a typed update".into(),
                )),
            }
        }
        ContainerKind::TypedSet | ContainerKind::TypedList => {
            let leaf_kind = if kind == ContainerKind::TypedSet {
                ContainerKind::Set
            } else {
                ContainerKind::List
            };
            let mut typed: BTreeMap<String, DstContainer> = existing
                .and_then(DstContainer::typed_view)
                .cloned()
                .unwrap_or_default();
            match input {
                UpdateValue::Clear => Ok(DstContainer::Typed(BTreeMap::new())),
                UpdateValue::Typed(map) => {
                    // An id linked under at most one type per source at a time
                    // (spec 4.2 tie-breaks): a type assignment that already
                    // existed under a *different* type before this call is a
                    // legal move, not a conflict - strip it from its prior
                    // type here so precheck only ever sees a genuine same-call
                    // double assignment as a violation.
                    let baseline_types: Vec<String> = typed.keys().cloned().collect();
                    for (ty, val) in map {
                        let incoming: HashSet<Id> = val.ids().into_iter().collect();
                        if !incoming.is_empty() {
                            for other_ty in &baseline_types {
                                if *other_ty == ty {
                                    continue;
                                }
                                if let Some(current) = typed.get(other_ty) {
                                    let stripped = current.without_ids(&incoming);
                                    if stripped.is_empty() {
                                        typed.remove(other_ty);
                                    } else {
                                        typed.insert(other_ty.clone(), stripped);
                                    }
                                }
                            }
                        }
                        let cell = normalize_cell(leaf_kind, typed.get(&ty), val)?;
                        if cell.is_empty() {
                            typed.remove(&ty);
                        } else {
                            typed.insert(ty, cell);
                        }
                    }
                    Ok(DstContainer::Typed(typed))
                }
                other => Err(CacheError::InvalidUpdate(format!(
                    "typed slot requires a per-type update, got {other:?}"
                ))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_folds_into_existing_set() {
        let existing = DstContainer::Set(BTreeSet::from([21, 22]));
        let got = normalize_cell(ContainerKind::Set, Some(&existing), UpdateValue::One(23)).unwrap();
        assert_eq!(got, DstContainer::Set(BTreeSet::from([21, 22, 23])));
    }

    #[test]
    fn priority_promotion_moves_to_front() {
        let existing = DstContainer::List(vec![3, 2, 1]);
        let got = normalize_cell(ContainerKind::List, Some(&existing), UpdateValue::One(1)).unwrap();
        assert_eq!(got, DstContainer::List(vec![1, 3, 2]));
    }

    #[test]
    fn list_input_dedups_preserving_first_occurrence() {
        let got = normalize_cell(ContainerKind::List, None, UpdateValue::Many(vec![1, 2, 1, 3])).unwrap();
        assert_eq!(got, DstContainer::List(vec![1, 2, 3]));
    }

    #[test]
    fn typed_set_rejects_untyped_input() {
        let err = normalize_cell(ContainerKind::TypedSet, None, UpdateValue::One(1));
        assert!(err.is_err());
    }

    #[test]
    fn typed_update_moves_id_out_of_its_prior_type() {
        let mut existing = BTreeMap::new();
        existing.insert("editor".to_string(), DstContainer::Set(BTreeSet::from([42])));
        let existing = DstContainer::Typed(existing);

        let mut input = BTreeMap::new();
        input.insert("author".to_string(), UpdateValue::One(42));
        let got = normalize_cell(ContainerKind::TypedSet, Some(&existing), UpdateValue::Typed(input)).unwrap();

        let typed = got.typed_view().unwrap();
        assert!(!typed.contains_key("editor"));
        assert_eq!(typed.get("author").unwrap().flatten(), BTreeSet::from([42]));
    }
}
