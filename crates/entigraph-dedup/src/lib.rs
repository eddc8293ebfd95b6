//! Entigraph Dedup - Name normalization and duplicate detection
//!
//! Canonicalizes noisy name variants into comparison keys and ranks
//! fuzzy duplicate candidates with an edit-distance-based similarity
//! measure. The merge itself lives in [`merge`], built on a union-find
//! structure so repeated merges are idempotent.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use entigraph_core::{DedupConfig, EntityRecord};

pub mod merge;

pub use merge::MergeEngine;

// ============================================================================
// Normalization
// ============================================================================

/// Canonical comparison key for a raw name: lowercased, punctuation
/// stripped, whitespace collapsed. Comma-inverted names ("Maxwell,
/// Ghislaine") are reordered so they key identically to their natural
/// form.
pub fn canonical_key(raw_name: &str) -> String {
    let reordered = match raw_name.split_once(',') {
        Some((last, first)) if !first.trim().is_empty() => {
            format!("{} {}", first.trim(), last.trim())
        }
        _ => raw_name.to_string(),
    };

    reordered
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

// ============================================================================
// Duplicate Detection
// ============================================================================

/// A ranked duplicate candidate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub entity_id: Uuid,
    pub name: String,
    pub similarity: f64,
}

/// Fuzzy duplicate detector over existing records
#[derive(Debug, Clone)]
pub struct DuplicateFinder {
    config: DedupConfig,
}

impl DuplicateFinder {
    pub fn new(config: DedupConfig) -> Self {
        Self { config }
    }

    /// Similarity between two names, computed over their canonical keys.
    /// Exact key equality short-circuits to 1.0.
    pub fn similarity(&self, a: &str, b: &str) -> f64 {
        let key_a = canonical_key(a);
        let key_b = canonical_key(b);
        if key_a == key_b {
            return 1.0;
        }
        strsim::jaro_winkler(&key_a, &key_b)
    }

    /// Rank records that look like duplicates of the candidate name.
    ///
    /// Only matches at or above the configured threshold are returned,
    /// best first; ties are broken by entity id so the ranking is stable.
    /// The threshold defaults conservative: a false negative (two records
    /// for one person) is a cheaper mistake than a false positive
    /// (merging two distinct people).
    pub fn find_duplicates<'a>(
        &self,
        candidate: &str,
        existing: impl IntoIterator<Item = &'a EntityRecord>,
    ) -> Vec<MatchCandidate> {
        let mut matches: Vec<MatchCandidate> = existing
            .into_iter()
            .filter_map(|record| {
                let best = record
                    .name_variants
                    .iter()
                    .map(|variant| self.similarity(candidate, variant))
                    .fold(0.0_f64, f64::max);

                (best >= self.config.similarity_threshold).then(|| MatchCandidate {
                    entity_id: record.id,
                    name: record.canonical_name.clone(),
                    similarity: best,
                })
            })
            .collect();

        matches.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.entity_id.cmp(&b.entity_id))
        });
        matches.truncate(self.config.max_candidates);
        matches
    }
}

impl Default for DuplicateFinder {
    fn default() -> Self {
        Self::new(DedupConfig::default())
    }
}

// ============================================================================
// Tests
// ============================================================================
