//! Entigraph Classify - Tiered entity classification pipeline
//!
//! Resolves an entity's type using an ordered chain of strategies:
//! external model -> local NER -> rule table. Each tier either produces
//! a typed outcome or falls through to the next; transient failures are
//! recovered locally, never surfaced to the caller.

use std::sync::Arc;

use moka::future::Cache;
use serde::{Deserialize, Serialize};

use entigraph_core::{ClassificationTier, EntityType, Result};

pub mod model;
pub mod ner;
pub mod rules;
pub mod scorer;

pub use model::{ExternalModelTier, OllamaClassifier, OpenAiClassifier};
pub use ner::LocalNerTier;
pub use rules::{RuleTable, RuleTier};
pub use scorer::{ConfidenceScorer, ScoringEvidence};

// ============================================================================
// Tier Contract
// ============================================================================

/// Result produced by a single tier
#[derive(Debug, Clone, PartialEq)]
pub struct TierOutcome {
    pub entity_type: EntityType,
    pub confidence: f32,
    pub reasoning: String,
}

impl TierOutcome {
    pub fn new(entity_type: EntityType, confidence: f32, reasoning: impl Into<String>) -> Self {
        Self {
            entity_type,
            confidence: confidence.clamp(0.0, 1.0),
            reasoning: reasoning.into(),
        }
    }
}

/// One strategy in the fallback chain.
///
/// `Ok(None)` means "no result, try the next tier". Implementations must
/// map their own transient failures to `Ok(None)` as well; only
/// non-recoverable conditions may surface as errors.
#[async_trait::async_trait]
pub trait ClassifyTier: Send + Sync {
    async fn classify(&self, name: &str, context: Option<&str>) -> Result<Option<TierOutcome>>;

    /// Which tier this is, for the result record
    fn tier(&self) -> ClassificationTier;

    /// Tier name for logging
    fn name(&self) -> &str;
}

// ============================================================================
// Aggregate Result
// ============================================================================

/// Output of the full classification chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub entity_type: EntityType,
    pub confidence: f32,
    pub tier_used: ClassificationTier,
    pub reasoning: String,
}

impl ClassificationResult {
    /// The terminal default when no tier yields a result: unknown,
    /// never the majority class.
    pub fn unresolved() -> Self {
        Self {
            entity_type: EntityType::Unknown,
            confidence: 0.0,
            tier_used: ClassificationTier::Unresolved,
            reasoning: "no tier produced a result".to_string(),
        }
    }
}

// ============================================================================
// Tiered Classifier
// ============================================================================

/// Ordered fallback chain over [`ClassifyTier`] implementations.
///
/// Holds its own cache and configuration; callers share it by reference.
/// Given identical tier outputs the aggregate result is deterministic:
/// tiers are consulted in fixed order and the first outcome wins.
pub struct TieredClassifier {
    tiers: Vec<Arc<dyn ClassifyTier>>,
    cache: Cache<String, ClassificationResult>,
}

impl TieredClassifier {
    /// Build a classifier from an ordered list of tiers
    pub fn new(tiers: Vec<Arc<dyn ClassifyTier>>, cache_capacity: u64) -> Self {
        Self {
            tiers,
            cache: Cache::new(cache_capacity),
        }
    }

    /// The default chain: rule table and local NER only, no network calls
    pub fn local_only(cache_capacity: u64) -> Self {
        Self::new(
            vec![
                Arc::new(LocalNerTier::new()),
                Arc::new(RuleTier::new(RuleTable::current())),
            ],
            cache_capacity,
        )
    }

    /// Classify a name, walking the tier chain until one yields a result
    pub async fn classify(
        &self,
        name: &str,
        context: Option<&str>,
    ) -> Result<ClassificationResult> {
        let key = cache_key(name, context);
        if let Some(hit) = self.cache.get(&key).await {
            return Ok(hit);
        }

        let result = self.classify_uncached(name, context).await?;
        self.cache.insert(key, result.clone()).await;
        Ok(result)
    }

    async fn classify_uncached(
        &self,
        name: &str,
        context: Option<&str>,
    ) -> Result<ClassificationResult> {
        for tier in &self.tiers {
            match tier.classify(name, context).await {
                Ok(Some(outcome)) => {
                    tracing::debug!(
                        tier = tier.name(),
                        entity_type = %outcome.entity_type,
                        confidence = outcome.confidence,
                        "tier produced a result"
                    );
                    return Ok(ClassificationResult {
                        entity_type: outcome.entity_type,
                        confidence: outcome.confidence,
                        tier_used: tier.tier(),
                        reasoning: outcome.reasoning,
                    });
                }
                Ok(None) => continue,
                Err(e) if e.is_transient() => {
                    tracing::warn!(tier = tier.name(), error = %e, "tier failed, falling through");
                    continue;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(ClassificationResult::unresolved())
    }
}

fn cache_key(name: &str, context: Option<&str>) -> String {
    match context {
        Some(ctx) => format!("{name}\u{1f}{ctx}"),
        None => name.to_string(),
    }
}

// ============================================================================
// Tests
// ============================================================================
