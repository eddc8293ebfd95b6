//! Merge engine
//!
//! Confirmed duplicates are merged under a union-find structure keyed by
//! entity id: canonical-id lookup is O(1) amortized and re-merging an
//! already-merged pair is naturally a no-op. Absorbed records are never
//! hard-deleted; a tombstone maps each absorbed id to its surviving id
//! permanently so historical references still resolve.

use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use uuid::Uuid;

use entigraph_core::{EngineError, EntityRecord, Result};

/// Entity record store with union-find merge semantics
#[derive(Debug, Default)]
pub struct MergeEngine {
    records: HashMap<Uuid, EntityRecord>,
    parent: HashMap<Uuid, Uuid>,
}

impl MergeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a record. Ids are assigned once and never reused, so a
    /// re-insert with the same id replaces the stored state.
    pub fn insert(&mut self, record: EntityRecord) {
        self.parent.entry(record.id).or_insert(record.id);
        self.records.insert(record.id, record);
    }

    /// Canonical id for any historical id, following merge tombstones
    pub fn resolve(&mut self, id: Uuid) -> Uuid {
        let mut root = id;
        while let Some(&next) = self.parent.get(&root) {
            if next == root {
                break;
            }
            root = next;
        }

        // Path compression
        let mut cursor = id;
        while let Some(&next) = self.parent.get(&cursor) {
            if next == root {
                break;
            }
            self.parent.insert(cursor, root);
            cursor = next;
        }

        root
    }

    /// Look up the surviving record for an id (resolving tombstones)
    pub fn get(&mut self, id: Uuid) -> Option<&EntityRecord> {
        let root = self.resolve(id);
        self.records.get(&root)
    }

    pub fn get_mut(&mut self, id: Uuid) -> Option<&mut EntityRecord> {
        let root = self.resolve(id);
        self.records.get_mut(&root)
    }

    /// Whether this id has been absorbed into another record
    pub fn is_absorbed(&mut self, id: Uuid) -> bool {
        self.resolve(id) != id
    }

    /// All surviving (non-absorbed) records
    pub fn active_records(&self) -> impl Iterator<Item = &EntityRecord> {
        self.records.iter().filter_map(|(id, record)| {
            match self.parent.get(id) {
                Some(parent) if parent == id => Some(record),
                _ => None,
            }
        })
    }

    /// Permanent absorbed-id -> surviving-id redirects, fully resolved
    pub fn tombstones(&mut self) -> BTreeMap<Uuid, Uuid> {
        let ids: Vec<Uuid> = self.parent.keys().copied().collect();
        ids.into_iter()
            .filter_map(|id| {
                let root = self.resolve(id);
                (root != id).then_some((id, root))
            })
            .collect()
    }

    /// Merge two records confirmed to be the same identity.
    ///
    /// Survivor selection: a record with a manual override wins identity
    /// resolution; otherwise the higher classification confidence wins,
    /// with the smaller id as the deterministic tie-break. Variants and
    /// sources are unioned, mention counts summed. Idempotent: merging
    /// the same pair twice leaves the same end state.
    ///
    /// Two conflicting manual overrides are surfaced as
    /// [`EngineError::DuplicateMergeConflict`] for human resolution,
    /// never auto-resolved.
    pub fn merge(&mut self, a: Uuid, b: Uuid) -> Result<Uuid> {
        let root_a = self.resolve(a);
        let root_b = self.resolve(b);

        if root_a == root_b {
            return Ok(root_a);
        }

        let record_a = self
            .records
            .get(&root_a)
            .ok_or_else(|| EngineError::NotFound(root_a.to_string()))?;
        let record_b = self
            .records
            .get(&root_b)
            .ok_or_else(|| EngineError::NotFound(root_b.to_string()))?;

        let (survivor_id, absorbed_id) = match (&record_a.manual_override, &record_b.manual_override)
        {
            (Some(lhs), Some(rhs)) if lhs.entity_type != rhs.entity_type => {
                return Err(EngineError::DuplicateMergeConflict {
                    left: root_a,
                    right: root_b,
                });
            }
            (Some(_), None) => (root_a, root_b),
            (None, Some(_)) => (root_b, root_a),
            _ => {
                let conf_a = record_a.classification.confidence;
                let conf_b = record_b.classification.confidence;
                if conf_a > conf_b {
                    (root_a, root_b)
                } else if conf_b > conf_a {
                    (root_b, root_a)
                } else if root_a < root_b {
                    (root_a, root_b)
                } else {
                    (root_b, root_a)
                }
            }
        };

        let absorbed = self
            .records
            .get(&absorbed_id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(absorbed_id.to_string()))?;
        let survivor = self
            .records
            .get_mut(&survivor_id)
            .ok_or_else(|| EngineError::NotFound(survivor_id.to_string()))?;

        survivor
            .name_variants
            .extend(absorbed.name_variants.iter().cloned());
        survivor.sources.extend(absorbed.sources.iter().cloned());
        survivor.mention_count += absorbed.mention_count;
        survivor.connection_count += absorbed.connection_count;
        if survivor.manual_override.is_none() {
            survivor.manual_override = absorbed.manual_override.clone();
        }
        survivor.updated_at = Utc::now();

        self.parent.insert(absorbed_id, survivor_id);

        tracing::info!(
            survivor = %survivor_id,
            absorbed = %absorbed_id,
            "merged duplicate records"
        );

        Ok(survivor_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
