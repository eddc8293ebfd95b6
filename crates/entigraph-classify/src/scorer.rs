//! Confidence scoring
//!
//! Combines a raw tier result with corroborating evidence into a single
//! normalized confidence and a review decision. Adjustments are additive
//! and the total is clamped to [0, 1]; thresholds come from
//! configuration, not constants.

use entigraph_core::{Classification, EntityRecord, EntityType, ScoringConfig};

use crate::ClassificationResult;

// ============================================================================
// Evidence
// ============================================================================

/// Corroborating signals gathered around a classification
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoringEvidence {
    /// Descriptive context was available to the classifier
    pub has_context: bool,

    /// Appears in a curated structured source (e.g. a contact list)
    pub structured_source: bool,

    /// Number of independent provenance sources
    pub source_count: usize,

    /// Raw mention count across the corpus
    pub mention_count: u64,

    /// Degree in the relationship graph
    pub connection_count: u64,

    /// Name is a generic or ambiguous pattern (single token, initials)
    pub ambiguous_name: bool,
}

impl ScoringEvidence {
    /// Derive evidence from a record's own provenance. `has_context`
    /// reflects whether free-text context accompanied the mention.
    pub fn from_record(record: &EntityRecord, has_context: bool) -> Self {
        Self {
            has_context,
            structured_source: record.sources.contains("contact-list"),
            source_count: record.sources.len(),
            mention_count: record.mention_count,
            connection_count: record.connection_count,
            ambiguous_name: !record.canonical_name.trim().contains(' '),
        }
    }

    /// Net additive adjustment for this evidence
    fn adjustment(&self) -> f32 {
        let mut delta = 0.0;

        if self.has_context {
            delta += 0.10;
        } else {
            delta -= 0.05;
        }

        if self.structured_source {
            delta += 0.10;
        }

        match self.source_count {
            0 | 1 => delta -= 0.05,
            2 => delta += 0.05,
            _ => delta += 0.10,
        }

        if self.mention_count >= 10 || self.connection_count >= 10 {
            delta += 0.05;
        }

        if self.ambiguous_name {
            delta -= 0.10;
        }

        delta
    }
}

// ============================================================================
// Scorer
// ============================================================================

/// Applies evidence adjustments and the threshold policy
#[derive(Debug, Clone)]
pub struct ConfidenceScorer {
    config: ScoringConfig,
}

impl ConfidenceScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    /// Adjusted confidence in [0, 1]
    pub fn score(&self, raw_confidence: f32, evidence: &ScoringEvidence) -> f32 {
        (raw_confidence + evidence.adjustment()).clamp(0.0, 1.0)
    }

    /// Apply the threshold policy to a tier result.
    ///
    /// - confidence >= accept threshold: accepted as-is
    /// - in [review, accept): accepted but flagged for review
    /// - below review: forced to unknown and flagged
    pub fn finalize(
        &self,
        result: &ClassificationResult,
        evidence: &ScoringEvidence,
    ) -> (EntityType, Classification) {
        let confidence = self.score(result.confidence, evidence);

        let (entity_type, needs_review) = if confidence >= self.config.accept_threshold {
            (result.entity_type, false)
        } else if confidence >= self.config.review_threshold {
            (result.entity_type, true)
        } else {
            (EntityType::Unknown, true)
        };

        (
            entity_type,
            Classification {
                tier_used: result.tier_used,
                confidence,
                reasoning: result.reasoning.clone(),
                needs_review,
            },
        )
    }
}

impl Default for ConfidenceScorer {
    fn default() -> Self {
        Self::new(ScoringConfig::default())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use entigraph_core::ClassificationTier;

    fn result(entity_type: EntityType, confidence: f32) -> ClassificationResult {
        ClassificationResult {
            entity_type,
            confidence,
            tier_used: ClassificationTier::Rules,
            reasoning: "test".to_string(),
        }
    }

    fn corroborated() -> ScoringEvidence {
        ScoringEvidence {
            has_context: true,
            structured_source: true,
            source_count: 3,
            mention_count: 12,
            connection_count: 0,
            ambiguous_name: false,
        }
    }

    #[test]
    fn test_score_stays_in_bounds() {
        let scorer = ConfidenceScorer::default();
        assert_eq!(scorer.score(0.95, &corroborated()), 1.0);

        let weak = ScoringEvidence {
            ambiguous_name: true,
            ..Default::default()
        };
        assert_eq!(scorer.score(0.05, &weak), 0.0);
    }

    #[test]
    fn test_corroboration_raises_confidence() {
        let scorer = ConfidenceScorer::default();
        let lone = ScoringEvidence::default();
        assert!(scorer.score(0.6, &corroborated()) > scorer.score(0.6, &lone));
    }

    #[test]
    fn test_high_confidence_auto_accepts() {
        let scorer = ConfidenceScorer::default();
        let (entity_type, classification) =
            scorer.finalize(&result(EntityType::Organization, 0.85), &corroborated());

        assert_eq!(entity_type, EntityType::Organization);
        assert!(!classification.needs_review);
        assert!(classification.confidence >= 0.75);
    }

    #[test]
    fn test_mid_band_flags_review() {
        let scorer = ConfidenceScorer::default();
        // 0.55 raw, single source, no context: lands between thresholds
        let (entity_type, classification) =
            scorer.finalize(&result(EntityType::Person, 0.55), &ScoringEvidence::default());

        assert_eq!(entity_type, EntityType::Person);
        assert!(classification.needs_review);
    }

    #[test]
    fn test_low_band_forces_unknown() {
        let scorer = ConfidenceScorer::default();
        let weak = ScoringEvidence {
            ambiguous_name: true,
            ..Default::default()
        };
        let (entity_type, classification) =
            scorer.finalize(&result(EntityType::Person, 0.3), &weak);

        assert_eq!(entity_type, EntityType::Unknown);
        assert!(classification.needs_review);
    }

    #[test]
    fn test_thresholds_come_from_config() {
        let strict = ConfidenceScorer::new(ScoringConfig {
            accept_threshold: 0.99,
            review_threshold: 0.9,
        });
        let evidence = ScoringEvidence {
            has_context: true,
            source_count: 2,
            ..Default::default()
        };
        // 0.8 + 0.15 = 0.95: accepted under defaults, flagged under the
        // stricter thresholds
        let (entity_type, classification) =
            strict.finalize(&result(EntityType::Organization, 0.8), &evidence);
        assert_eq!(entity_type, EntityType::Organization);
        assert!(classification.needs_review);
    }
}
