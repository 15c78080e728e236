// src/diff.rs
//
// The result of an `internal_update` pass: what changed, handed to the
// store writer so it can compute the minimal SQL delta. The cache does not
// wait on the store's acknowledgement before serving subsequent reads; a
// write failure invalidates the whole cache (see CacheError::DatabaseIntegrityError).

use crate::link_table::DstContainer;
use crate::value::Value;
use std::collections::HashMap;

pub type SrcId = i64;
pub type DstId = i64;

/// Net change to a single link table produced by one `update` call.
#[derive(Debug, Clone, Default)]
pub struct UpdateDiff {
    /// Sources whose destination set changed to a new, non-empty value.
    pub updated: HashMap<SrcId, DstContainer>,
    /// Sources whose destination set became empty (fully unlinked).
    pub deleted: Vec<SrcId>,
    /// Newly minted id_map entries that must be persisted alongside the link rows.
    pub id_map_update: HashMap<DstId, Value>,
}

impl UpdateDiff {
    pub fn is_empty(&self) -> bool {
        self.updated.is_empty() && self.deleted.is_empty() && self.id_map_update.is_empty()
    }
}
