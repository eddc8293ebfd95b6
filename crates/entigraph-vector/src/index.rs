//! In-memory similarity index
//!
//! Stores one vector per entity and answers nearest-neighbor queries.
//! Distance is Euclidean, converted to a bounded similarity score
//! `1 / (1 + distance)` that decreases monotonically with distance.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use entigraph_core::{EngineError, Result};

/// Hash of the descriptive text a vector was generated from, used to
/// detect staleness
pub fn source_text_hash(text: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    hasher.finish()
}

/// Stored vector representation of an entity (one per entity)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub entity_id: Uuid,
    pub vector: Vec<f32>,
    pub source_text_hash: u64,
    pub updated_at: DateTime<Utc>,
}

/// One similarity query hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarEntity {
    pub entity_id: Uuid,
    pub similarity: f32,
}

// ============================================================================
// Similarity Index
// ============================================================================

/// Fixed-dimension vector index over entity embeddings
#[derive(Debug, Default)]
pub struct SimilarityIndex {
    dimension: usize,
    records: HashMap<Uuid, EmbeddingRecord>,
}

impl SimilarityIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            records: HashMap::new(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Insert or replace the vector for an entity
    pub fn upsert(&mut self, entity_id: Uuid, vector: Vec<f32>, source_text: &str) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(EngineError::ModelError(format!(
                "embedding dimension {} does not match index dimension {}",
                vector.len(),
                self.dimension
            )));
        }

        self.records.insert(
            entity_id,
            EmbeddingRecord {
                entity_id,
                vector,
                source_text_hash: source_text_hash(source_text),
                updated_at: Utc::now(),
            },
        );
        Ok(())
    }

    pub fn get(&self, entity_id: &Uuid) -> Option<&EmbeddingRecord> {
        self.records.get(entity_id)
    }

    /// All stored records, for persistence
    pub fn records(&self) -> impl Iterator<Item = &EmbeddingRecord> {
        self.records.values()
    }

    /// Rebuild an index from persisted records, validating dimensions
    pub fn from_records(dimension: usize, records: Vec<EmbeddingRecord>) -> Result<Self> {
        let mut index = Self::new(dimension);
        for record in records {
            if record.vector.len() != dimension {
                return Err(EngineError::ModelError(format!(
                    "stored embedding for {} has dimension {}, index expects {}",
                    record.entity_id,
                    record.vector.len(),
                    dimension
                )));
            }
            index.records.insert(record.entity_id, record);
        }
        Ok(index)
    }

    /// A stored embedding is stale once the entity's descriptive text no
    /// longer matches the text it was generated from. A missing record
    /// counts as stale so callers regenerate in one pass.
    pub fn is_stale(&self, entity_id: &Uuid, current_text: &str) -> bool {
        match self.records.get(entity_id) {
            Some(record) => record.source_text_hash != source_text_hash(current_text),
            None => true,
        }
    }

    /// Drop an entity's vector (e.g. after it was absorbed by a merge)
    pub fn remove(&mut self, entity_id: &Uuid) -> Option<EmbeddingRecord> {
        self.records.remove(entity_id)
    }

    /// Nearest neighbors of a stored entity.
    ///
    /// The queried entity is excluded from its own results; hits below
    /// `min_similarity` are dropped; ties are broken by entity id so
    /// repeated queries return identical rankings. Querying an id with
    /// no stored embedding is an [`EngineError::EmbeddingNotFound`],
    /// distinct from an empty result list.
    pub fn query_similar(
        &self,
        entity_id: Uuid,
        k: usize,
        min_similarity: f32,
    ) -> Result<Vec<SimilarEntity>> {
        let query = self
            .records
            .get(&entity_id)
            .ok_or(EngineError::EmbeddingNotFound(entity_id))?;

        let mut hits: Vec<SimilarEntity> = self
            .records
            .values()
            .filter(|record| record.entity_id != entity_id)
            .map(|record| SimilarEntity {
                entity_id: record.entity_id,
                similarity: similarity(&query.vector, &record.vector),
            })
            .filter(|hit| hit.similarity >= min_similarity)
            .collect();

        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.entity_id.cmp(&b.entity_id))
        });
        hits.truncate(k);
        Ok(hits)
    }
}

/// Euclidean distance mapped into (0, 1]: identical vectors score 1.0
fn similarity(a: &[f32], b: &[f32]) -> f32 {
    let distance = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt();
    1.0 / (1.0 + distance)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn index_with(vectors: &[(Uuid, Vec<f32>)]) -> SimilarityIndex {
        let mut index = SimilarityIndex::new(vectors[0].1.len());
        for (id, vector) in vectors {
            index.upsert(*id, vector.clone(), "text").unwrap();
        }
        index
    }

    #[test]
    fn test_query_excludes_self() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let index = index_with(&[(a, vec![1.0, 0.0]), (b, vec![1.0, 0.1])]);

        let hits = index.query_similar(a, 10, 0.0).unwrap();
        assert!(hits.iter().all(|h| h.entity_id != a));
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_similarity_decreases_with_distance() {
        let a = Uuid::new_v4();
        let near = Uuid::new_v4();
        let far = Uuid::new_v4();
        let index = index_with(&[
            (a, vec![0.0, 0.0]),
            (near, vec![0.1, 0.0]),
            (far, vec![5.0, 0.0]),
        ]);

        let hits = index.query_similar(a, 10, 0.0).unwrap();
        assert_eq!(hits[0].entity_id, near);
        assert!(hits[0].similarity > hits[1].similarity);
    }

    #[test]
    fn test_min_similarity_filters() {
        let a = Uuid::new_v4();
        let far = Uuid::new_v4();
        let index = index_with(&[(a, vec![0.0, 0.0]), (far, vec![9.0, 9.0])]);

        let hits = index.query_similar(a, 10, 0.5).unwrap();
        assert!(hits.is_empty()); // zero results, not an error
    }

    #[test]
    fn test_missing_entity_is_not_found() {
        let index = SimilarityIndex::new(2);
        let err = index.query_similar(Uuid::new_v4(), 10, 0.0).unwrap_err();
        assert!(matches!(err, EngineError::EmbeddingNotFound(_)));
    }

    #[test]
    fn test_tie_break_by_id_is_stable() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        // b and c are equidistant from a
        let index = index_with(&[
            (a, vec![0.0, 0.0]),
            (b, vec![1.0, 0.0]),
            (c, vec![0.0, 1.0]),
        ]);

        let first = index.query_similar(a, 10, 0.0).unwrap();
        let second = index.query_similar(a, 10, 0.0).unwrap();
        assert_eq!(first, second);
        assert_eq!(first[0].entity_id, b.min(c));
    }

    #[test]
    fn test_staleness_tracks_source_text() {
        let a = Uuid::new_v4();
        let mut index = SimilarityIndex::new(2);
        index.upsert(a, vec![1.0, 2.0], "Jeffrey Epstein (person)").unwrap();

        assert!(!index.is_stale(&a, "Jeffrey Epstein (person)"));
        assert!(index.is_stale(&a, "Jeffrey Epstein (person); appears in manifest"));
        assert!(index.is_stale(&Uuid::new_v4(), "anything"));
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let mut index = SimilarityIndex::new(3);
        let err = index.upsert(Uuid::new_v4(), vec![1.0], "text").unwrap_err();
        assert!(matches!(err, EngineError::ModelError(_)));
    }

    #[test]
    fn test_upsert_replaces() {
        let a = Uuid::new_v4();
        let mut index = SimilarityIndex::new(1);
        index.upsert(a, vec![1.0], "v1").unwrap();
        index.upsert(a, vec![2.0], "v2").unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.get(&a).unwrap().vector, vec![2.0]);
    }
}
