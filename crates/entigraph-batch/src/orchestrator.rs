//! Batch orchestrator
//!
//! Drives classification and embedding over large entity sets under a
//! shared rate limiter, with checkpointing, bounded retry, and
//! cooperative cancellation.
//!
//! Concurrency model: a bounded pool of workers processes one entity
//! each; workers produce immutable outcomes which a single serialized
//! commit step applies to the shared store and index. The checkpoint
//! write after each sub-batch is a serialization point: no worker
//! starts the next sub-batch until it completes, so a crash never
//! loses more than one sub-batch of uncommitted work.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::Utc;
use futures::{stream, StreamExt};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use entigraph_classify::{ConfidenceScorer, ScoringEvidence, TieredClassifier};
use entigraph_core::{
    BatchConfig, BatchReport, Checkpoint, Classification, EngineError, EntityRecord, EntityType,
    FailedEntity, Result,
};
use entigraph_dedup::MergeEngine;
use entigraph_vector::{EmbeddingClient, SimilarityIndex};

use crate::checkpoint::CheckpointStore;
use crate::limiter::CallLimiter;
use crate::retry;

// ============================================================================
// Work Types
// ============================================================================

/// Immutable per-entity result produced by a worker
#[derive(Debug, Clone)]
pub struct EntityOutcome {
    pub entity_id: Uuid,
    pub entity_type: EntityType,
    pub classification: Classification,
    pub embedded_text: String,
    pub vector: Vec<f32>,
}

struct WorkItem {
    record: EntityRecord,
    defer_count: u32,
}

enum WorkOutcome {
    Completed(Box<EntityOutcome>),
    /// Could not get a limiter permit within the bounded wait, or
    /// cancellation arrived first; try again next sub-batch
    Deferred {
        item: WorkItem,
        rate_limited: bool,
    },
    Failed(FailedEntity),
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Rate-limited, checkpointed batch driver
pub struct BatchOrchestrator {
    classifier: Arc<TieredClassifier>,
    scorer: ConfidenceScorer,
    embedder: Arc<dyn EmbeddingClient>,
    limiter: Arc<CallLimiter>,
    checkpoints: CheckpointStore,
    config: BatchConfig,
}

impl BatchOrchestrator {
    pub fn new(
        classifier: Arc<TieredClassifier>,
        scorer: ConfidenceScorer,
        embedder: Arc<dyn EmbeddingClient>,
        config: BatchConfig,
    ) -> Result<Self> {
        let limiter = Arc::new(CallLimiter::new(
            config.requests_per_minute,
            std::time::Duration::from_millis(config.limiter_wait_ms),
        )?);
        let checkpoints = CheckpointStore::new(&config.checkpoint_path);

        Ok(Self {
            classifier,
            scorer,
            embedder,
            limiter,
            checkpoints,
            config,
        })
    }

    /// Resume state from disk, honoring the corrupt-checkpoint policy
    fn load_checkpoint(&self) -> Result<Checkpoint> {
        match self.checkpoints.load() {
            Ok(Some(checkpoint)) => {
                tracing::info!(
                    processed = checkpoint.processed_ids.len(),
                    "resuming from checkpoint"
                );
                Ok(checkpoint)
            }
            Ok(None) => Ok(Checkpoint::default()),
            Err(EngineError::CheckpointCorrupt(msg)) if self.config.allow_fresh_start => {
                tracing::warn!(%msg, "checkpoint corrupt; operator allowed a fresh start");
                Ok(Checkpoint::default())
            }
            Err(e) => Err(e),
        }
    }

    /// Run the batch: classify and embed every entity not already in
    /// the checkpoint, committing results through a single writer pass.
    ///
    /// Individual entity failures never abort the run; they are
    /// enumerated in the report. Cancellation lets in-flight work finish
    /// and leaves the last completed checkpoint intact.
    pub async fn run(
        &self,
        entities: Vec<EntityRecord>,
        engine: &mut MergeEngine,
        index: &mut SimilarityIndex,
        cancel: CancellationToken,
    ) -> Result<BatchReport> {
        let mut checkpoint = self.load_checkpoint()?;
        let mut stats = checkpoint.stats;
        let mut report = BatchReport {
            started_at: Some(Utc::now()),
            ..Default::default()
        };

        let mut queue: VecDeque<WorkItem> = VecDeque::new();
        for record in entities {
            if checkpoint.contains(&record.id) {
                stats.skipped += 1;
            } else {
                queue.push_back(WorkItem {
                    record,
                    defer_count: 0,
                });
            }
        }

        while !queue.is_empty() {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let batch: Vec<WorkItem> = {
                let take = self.config.sub_batch_size.max(1).min(queue.len());
                queue.drain(..take).collect()
            };

            let outcomes: Vec<WorkOutcome> = stream::iter(
                batch
                    .into_iter()
                    .map(|item| self.process(item, cancel.clone())),
            )
            .buffer_unordered(self.config.worker_count.max(1))
            .collect()
            .await;

            // Single-writer commit step: workers never touch shared state
            for outcome in outcomes {
                match outcome {
                    WorkOutcome::Completed(entity) => {
                        self.commit(engine, index, &entity);
                        checkpoint.processed_ids.insert(entity.entity_id);
                        stats.classified += 1;
                        stats.embedded += 1;
                    }
                    WorkOutcome::Deferred { item, rate_limited } => {
                        if rate_limited {
                            stats.deferred += 1;
                        }
                        queue.push_back(item);
                    }
                    WorkOutcome::Failed(failure) => {
                        tracing::warn!(
                            entity_id = %failure.entity_id,
                            error = %failure.error,
                            "entity failed after retries"
                        );
                        stats.failed += 1;
                        report.failed.push(failure);
                    }
                }
            }

            checkpoint.stats = stats;
            checkpoint.last_updated = Some(Utc::now());
            self.checkpoints.save(&checkpoint)?;
        }

        report.stats = stats;
        report.finished_at = Some(Utc::now());

        if report.is_clean() {
            self.checkpoints.archive()?;
        }

        Ok(report)
    }

    /// One entity's classification/embedding round trip. All transient
    /// trouble is absorbed here: limiter exhaustion defers, provider
    /// errors retry with backoff, and only exhausted retries fail the
    /// entity.
    async fn process(&self, mut item: WorkItem, cancel: CancellationToken) -> WorkOutcome {
        let entity_id = item.record.id;

        // One permit covers the entity's external-model call
        let permit = tokio::select! {
            result = self.limiter.acquire() => result,
            _ = cancel.cancelled() => {
                return WorkOutcome::Deferred { item, rate_limited: false };
            }
        };
        if let Err(EngineError::RateLimitExceeded) = permit {
            item.defer_count += 1;
            if item.defer_count >= self.config.max_attempts {
                return WorkOutcome::Failed(FailedEntity {
                    entity_id,
                    error: "rate limiter wait exhausted".to_string(),
                    attempts: item.defer_count,
                });
            }
            return WorkOutcome::Deferred {
                item,
                rate_limited: true,
            };
        }

        let result = match self.classifier.classify(&item.record.canonical_name, None).await {
            Ok(result) => result,
            Err(e) => {
                return WorkOutcome::Failed(FailedEntity {
                    entity_id,
                    error: e.to_string(),
                    attempts: 1,
                });
            }
        };

        let evidence = ScoringEvidence::from_record(&item.record, false);
        let (entity_type, classification) = self.scorer.finalize(&result, &evidence);

        // Build the descriptive text from the would-be committed state;
        // the actual mutation happens in the single-writer commit step.
        let mut preview = item.record.clone();
        preview.apply_classification(entity_type, classification.clone());
        let embedded_text = preview.descriptive_text();

        // Second permit for the embedding call, same cancellation race
        let permit = tokio::select! {
            result = self.limiter.acquire() => result,
            _ = cancel.cancelled() => {
                return WorkOutcome::Deferred { item, rate_limited: false };
            }
        };
        if permit.is_err() {
            item.defer_count += 1;
            if item.defer_count >= self.config.max_attempts {
                return WorkOutcome::Failed(FailedEntity {
                    entity_id,
                    error: "rate limiter wait exhausted".to_string(),
                    attempts: item.defer_count,
                });
            }
            return WorkOutcome::Deferred {
                item,
                rate_limited: true,
            };
        }

        let embedder = Arc::clone(&self.embedder);
        let vector = retry::with_backoff(
            self.config.max_attempts,
            self.config.backoff_base_ms,
            |_| {
                let embedder = Arc::clone(&embedder);
                let text = embedded_text.clone();
                async move { embedder.embed(&text).await }
            },
        )
        .await;

        match vector {
            Ok(vector) => WorkOutcome::Completed(Box::new(EntityOutcome {
                entity_id,
                entity_type,
                classification,
                embedded_text,
                vector,
            })),
            Err(e) => WorkOutcome::Failed(FailedEntity {
                entity_id,
                error: e.to_string(),
                attempts: self.config.max_attempts,
            }),
        }
    }

    /// Apply one outcome to the shared store and index. Keyed by entity
    /// id, so re-processing a completed entity (crash between commit and
    /// checkpoint write) overwrites with identical content instead of
    /// duplicating.
    fn commit(&self, engine: &mut MergeEngine, index: &mut SimilarityIndex, outcome: &EntityOutcome) {
        if let Some(record) = engine.get_mut(outcome.entity_id) {
            let applied =
                record.apply_classification(outcome.entity_type, outcome.classification.clone());
            if !applied {
                tracing::debug!(
                    entity_id = %outcome.entity_id,
                    "manual override present; classification not applied"
                );
            }
        }

        if let Err(e) = index.upsert(
            outcome.entity_id,
            outcome.vector.clone(),
            &outcome.embedded_text,
        ) {
            tracing::warn!(entity_id = %outcome.entity_id, error = %e, "embedding rejected");
        }
    }
}
