//! Entigraph Core - Domain models, traits, and shared types
//!
//! This crate defines the core abstractions used throughout the entity
//! resolution engine:
//! - Entity records (canonical identities, classification state, provenance)
//! - Graph projection types (nodes, edges, exported artifact)
//! - Batch progress types (checkpoint, report)
//! - Common error types
//! - Shared traits for external model providers
//! - Configuration management

pub mod config;

pub use config::{
    AppConfig, BatchConfig, ClassifierConfig, ConfigError, DedupConfig, EdgePolicy, GraphConfig,
    ModelProvider, ScoringConfig, SimilarityConfig,
};

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for engine operations
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Classification timed out: {0}")]
    ClassificationTimeout(String),

    #[error("Classification service unavailable: {0}")]
    ClassificationUnavailable(String),

    // Field deliberately not named `source`: thiserror would treat it
    // as the error's cause and require `Uuid: Error`.
    #[error("Invalid edge {source_id} -> {target_id}: {reason}")]
    InvalidEdge {
        source_id: Uuid,
        target_id: Uuid,
        reason: String,
    },

    #[error("Merge conflict between {left} and {right}: both carry manual overrides")]
    DuplicateMergeConflict { left: Uuid, right: Uuid },

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Embedding service unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("No embedding stored for entity {0}")]
    EmbeddingNotFound(Uuid),

    #[error("Checkpoint is corrupt: {0}")]
    CheckpointCorrupt(String),

    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Model error: {0}")]
    ModelError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EngineError {
    /// Whether this error is transient and worth retrying
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ClassificationTimeout(_)
                | Self::ClassificationUnavailable(_)
                | Self::EmbeddingUnavailable(_)
                | Self::RateLimitExceeded
        )
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

// ============================================================================
// Entity Types
// ============================================================================

/// Resolved type of an entity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Person,
    Organization,
    Location,
    #[default]
    Unknown,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Person => "person",
            Self::Organization => "organization",
            Self::Location => "location",
            Self::Unknown => "unknown",
        }
    }

    /// Parse a label returned by an external model. Only the three valid
    /// type labels are accepted; anything else yields `None`.
    pub fn from_model_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "person" => Some(Self::Person),
            "organization" => Some(Self::Organization),
            "location" => Some(Self::Location),
            _ => None,
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which classifier tier produced a result
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationTier {
    ExternalModel,
    LocalNer,
    Rules,
    #[default]
    Unresolved,
}

impl std::fmt::Display for ClassificationTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExternalModel => write!(f, "external_model"),
            Self::LocalNer => write!(f, "local_ner"),
            Self::Rules => write!(f, "rules"),
            Self::Unresolved => write!(f, "unresolved"),
        }
    }
}

/// Classification state attached to an entity record
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Classification {
    /// Tier that produced the accepted result
    pub tier_used: ClassificationTier,

    /// Normalized confidence in [0, 1]
    pub confidence: f32,

    /// Human-readable explanation of the decision
    pub reasoning: String,

    /// Flagged for downstream human review
    pub needs_review: bool,
}

/// A human correction. Once present it is authoritative: automated
/// re-classification must not overwrite it silently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualOverride {
    pub entity_type: EntityType,
    pub reviewer: String,
    pub note: Option<String>,
    pub applied_at: DateTime<Utc>,
}

impl ManualOverride {
    pub fn new(entity_type: EntityType, reviewer: impl Into<String>) -> Self {
        Self {
            entity_type,
            reviewer: reviewer.into(),
            note: None,
            applied_at: Utc::now(),
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

// ============================================================================
// Entity Record
// ============================================================================

/// One resolved identity.
///
/// Created when first observed, mutated by classification, merge, and
/// override operations. Never hard-deleted: a merge marks the absorbed
/// record via a tombstone pointing at the surviving id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityRecord {
    /// Stable identifier, assigned once, never reused
    pub id: Uuid,

    /// Preferred display name
    pub canonical_name: String,

    /// All observed spellings (insertion order irrelevant)
    pub name_variants: BTreeSet<String>,

    /// Resolved type
    pub entity_type: EntityType,

    /// Classification state
    pub classification: Classification,

    /// Provenance tags (e.g. "contact-list", "manifest", "document")
    pub sources: BTreeSet<String>,

    /// How many raw mentions resolved to this record
    pub mention_count: u64,

    /// Degree in the relationship graph
    pub connection_count: u64,

    /// Human correction, authoritative once set
    pub manual_override: Option<ManualOverride>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EntityRecord {
    /// Create a record for a newly observed name
    pub fn new(canonical_name: impl Into<String>) -> Self {
        let canonical_name = canonical_name.into();
        let now = Utc::now();
        let mut name_variants = BTreeSet::new();
        name_variants.insert(canonical_name.clone());

        Self {
            id: Uuid::new_v4(),
            canonical_name,
            name_variants,
            entity_type: EntityType::Unknown,
            classification: Classification::default(),
            sources: BTreeSet::new(),
            mention_count: 0,
            connection_count: 0,
            manual_override: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Add a provenance tag
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.sources.insert(source.into());
        self
    }

    /// Add a name variant
    pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
        self.name_variants.insert(variant.into());
        self
    }

    /// Set mention count
    pub fn with_mentions(mut self, count: u64) -> Self {
        self.mention_count = count;
        self
    }

    /// The type consumers should display: a manual override wins over
    /// whatever automated classification produced.
    pub fn effective_type(&self) -> EntityType {
        self.manual_override
            .as_ref()
            .map(|o| o.entity_type)
            .unwrap_or(self.entity_type)
    }

    /// Apply an automated classification result.
    ///
    /// Returns `false` without touching the record when a manual override
    /// is present: overrides are authoritative and are never silently
    /// replaced by re-classification.
    pub fn apply_classification(
        &mut self,
        entity_type: EntityType,
        classification: Classification,
    ) -> bool {
        if self.manual_override.is_some() {
            return false;
        }
        self.entity_type = entity_type;
        self.classification = classification;
        self.updated_at = Utc::now();
        true
    }

    /// Apply a human correction
    pub fn apply_override(&mut self, correction: ManualOverride) {
        self.entity_type = correction.entity_type;
        self.classification.needs_review = false;
        self.manual_override = Some(correction);
        self.updated_at = Utc::now();
    }

    /// Descriptive text used for embedding generation
    pub fn descriptive_text(&self) -> String {
        let variants: Vec<&str> = self
            .name_variants
            .iter()
            .filter(|v| *v != &self.canonical_name)
            .map(|v| v.as_str())
            .collect();
        let sources: Vec<&str> = self.sources.iter().map(|s| s.as_str()).collect();

        let mut text = format!("{} ({})", self.canonical_name, self.effective_type());
        if !variants.is_empty() {
            text.push_str(&format!("; also known as {}", variants.join(", ")));
        }
        if !sources.is_empty() {
            text.push_str(&format!("; appears in {}", sources.join(", ")));
        }
        text
    }
}

// ============================================================================
// Graph Projection Types
// ============================================================================

/// Public-facing projection of a non-absorbed entity record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: Uuid,
    pub name: String,
    pub entity_type: EntityType,
    pub mention_count: u64,
    pub connection_count: u64,
    pub needs_review: bool,
}

impl From<&EntityRecord> for GraphNode {
    fn from(record: &EntityRecord) -> Self {
        Self {
            id: record.id,
            name: record.canonical_name.clone(),
            entity_type: record.effective_type(),
            mention_count: record.mention_count,
            connection_count: record.connection_count,
            needs_review: record.classification.needs_review,
        }
    }
}

/// Relationship between two nodes.
///
/// Invariants are enforced at construction time by the graph, never
/// relaxed: no self-loops, both endpoints must exist, and a duplicate
/// `(source, target)` pair merges into the existing edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: Uuid,
    pub target: Uuid,
    pub weight: f64,
    pub contexts: BTreeSet<String>,
}

/// The persisted graph artifact consumed by the API/UI layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphArtifact {
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

// ============================================================================
// Batch Progress Types
// ============================================================================

/// Orchestrator progress record, persisted atomically after each sub-batch
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Entity ids that have been fully processed and committed
    pub processed_ids: BTreeSet<Uuid>,

    /// Timestamp of the last checkpoint write
    pub last_updated: Option<DateTime<Utc>>,

    /// Running statistics
    pub stats: BatchStats,
}

impl Checkpoint {
    pub fn contains(&self, id: &Uuid) -> bool {
        self.processed_ids.contains(id)
    }
}

/// Counters accumulated over a batch run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    pub classified: u64,
    pub embedded: u64,
    pub failed: u64,
    pub deferred: u64,
    pub skipped: u64,
}

/// An entity that exhausted its retries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedEntity {
    pub entity_id: Uuid,
    pub error: String,
    pub attempts: u32,
}

/// Outcome of a batch run, surfaced to the operator
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchReport {
    pub stats: BatchStats,
    pub failed: Vec<FailedEntity>,
    pub edge_violations: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub cancelled: bool,
}

impl BatchReport {
    /// Whether every entity in the run was committed
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && !self.cancelled
    }
}

// ============================================================================
// Traits
// ============================================================================

/// External classification service (the highest classifier tier).
///
/// Implementations must return `Ok(None)` for anything that is not exactly
/// one of the three valid type labels; the caller treats `None` and
/// transient errors alike as "fall through to the next tier".
#[async_trait::async_trait]
pub trait ClassificationModel: Send + Sync {
    /// Ask the model to label a name, optionally disambiguated by context
    async fn classify_label(&self, name: &str, context: Option<&str>)
        -> Result<Option<EntityType>>;

    /// Provider name for logging
    fn name(&self) -> &str;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_label_parsing() {
        assert_eq!(
            EntityType::from_model_label("Person"),
            Some(EntityType::Person)
        );
        assert_eq!(
            EntityType::from_model_label("  organization\n"),
            Some(EntityType::Organization)
        );
        assert_eq!(EntityType::from_model_label("unknown"), None);
        assert_eq!(EntityType::from_model_label("a famous person"), None);
        assert_eq!(EntityType::from_model_label(""), None);
    }

    #[test]
    fn test_override_blocks_reclassification() {
        let mut record = EntityRecord::new("Jeffrey Epstein");
        record.apply_override(ManualOverride::new(EntityType::Person, "analyst1"));

        let applied = record.apply_classification(
            EntityType::Organization,
            Classification {
                tier_used: ClassificationTier::ExternalModel,
                confidence: 0.99,
                reasoning: "model said so".to_string(),
                needs_review: false,
            },
        );

        assert!(!applied);
        assert_eq!(record.effective_type(), EntityType::Person);
    }

    #[test]
    fn test_effective_type_prefers_override() {
        let mut record = EntityRecord::new("Southern Trust");
        record.entity_type = EntityType::Person;
        record.apply_override(ManualOverride::new(EntityType::Organization, "analyst2"));
        assert_eq!(record.effective_type(), EntityType::Organization);
    }

    #[test]
    fn test_new_record_starts_unknown() {
        let record = EntityRecord::new("Somebody");
        assert_eq!(record.entity_type, EntityType::Unknown);
        assert_eq!(record.classification.confidence, 0.0);
        assert!(record.name_variants.contains("Somebody"));
    }

    #[test]
    fn test_descriptive_text_mentions_variants_and_sources() {
        let record = EntityRecord::new("Jeffrey Epstein")
            .with_variant("Jeffrey Edward Epstein")
            .with_source("manifest")
            .with_source("contact-list");

        let text = record.descriptive_text();
        assert!(text.contains("Jeffrey Epstein"));
        assert!(text.contains("Jeffrey Edward Epstein"));
        assert!(text.contains("manifest"));
        assert!(text.contains("contact-list"));
    }

    #[test]
    fn test_invalid_edge_display_names_both_endpoints() {
        let source_id = Uuid::new_v4();
        let target_id = Uuid::new_v4();
        let err = EngineError::InvalidEdge {
            source_id,
            target_id,
            reason: "self-loop".to_string(),
        };

        let rendered = err.to_string();
        assert!(rendered.contains(&source_id.to_string()));
        assert!(rendered.contains(&target_id.to_string()));
        assert!(rendered.contains("self-loop"));
        // The endpoint ids are payload, not a chained cause
        assert!(std::error::Error::source(&err).is_none());
    }

    #[test]
    fn test_transient_errors() {
        assert!(EngineError::RateLimitExceeded.is_transient());
        assert!(EngineError::ClassificationTimeout("t".into()).is_transient());
        assert!(EngineError::EmbeddingUnavailable("503".into()).is_transient());
        assert!(!EngineError::EmbeddingNotFound(Uuid::new_v4()).is_transient());
        assert!(!EngineError::ModelError("bad payload".into()).is_transient());
    }

    #[test]
    fn test_checkpoint_contains() {
        let mut checkpoint = Checkpoint::default();
        let id = Uuid::new_v4();
        assert!(!checkpoint.contains(&id));
        checkpoint.processed_ids.insert(id);
        assert!(checkpoint.contains(&id));
    }
}
