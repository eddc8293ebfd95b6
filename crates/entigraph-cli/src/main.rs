//! Entigraph CLI
//!
//! Usage:
//!   entigraph classify <name> [--context <text>]
//!   entigraph dedup <entities.json>
//!   entigraph batch <entities.json> --out <dir>
//!   entigraph similar <entity-id> --embeddings <embeddings.json>
//!   entigraph export <entities.json> --edges <edges.json> --out <graph.json>

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use entigraph_batch::BatchOrchestrator;
use entigraph_classify::{
    ClassifyTier, ConfidenceScorer, ExternalModelTier, LocalNerTier, RuleTable, RuleTier,
    ScoringEvidence, TieredClassifier,
};
use entigraph_core::{AppConfig, EntityRecord};
use entigraph_dedup::{DuplicateFinder, MergeEngine};
use entigraph_graph::{write_artifact, RelationshipGraph};
use entigraph_vector::{create_embedding_client, EmbeddingClient, EmbeddingRecord, SimilarityIndex};

#[derive(Parser)]
#[command(name = "entigraph")]
#[command(about = "Entity resolution, classification and similarity graph engine")]
#[command(version)]
struct Cli {
    /// Path to a TOML configuration file (environment overrides apply)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify a single name through the tier chain
    Classify {
        /// Name to classify
        name: String,
        /// Surrounding text to disambiguate the name
        #[arg(long)]
        context: Option<String>,
        /// Skip the external model tier
        #[arg(long)]
        local_only: bool,
    },
    /// Report duplicate candidates within an entity file
    Dedup {
        /// JSON array of entity records
        input: PathBuf,
    },
    /// Classify and embed every entity in a file, with checkpointed resume
    Batch {
        /// JSON array of entity records
        input: PathBuf,
        /// Output directory for entities.json and embeddings.json
        #[arg(long, default_value = "out")]
        out: PathBuf,
        /// Skip the external model tier
        #[arg(long)]
        local_only: bool,
        /// Start over if the checkpoint file is corrupt
        #[arg(long)]
        allow_fresh_start: bool,
    },
    /// Nearest neighbors of an entity in a stored embedding set
    Similar {
        /// Entity id to query
        entity_id: Uuid,
        /// Embeddings file produced by `batch`
        #[arg(long)]
        embeddings: PathBuf,
        /// Number of neighbors to return
        #[arg(long)]
        top_k: Option<usize>,
        /// Drop results below this similarity
        #[arg(long)]
        min_similarity: Option<f32>,
    },
    /// Build and write the relationship graph artifact
    Export {
        /// JSON array of entity records
        entities: PathBuf,
        /// JSON array of edges: {source, target, weight, contexts}
        #[arg(long)]
        edges: PathBuf,
        /// Artifact output path
        #[arg(long, default_value = "graph.json")]
        out: PathBuf,
    },
}

#[derive(serde::Deserialize)]
struct EdgeInput {
    source: Uuid,
    target: Uuid,
    weight: f64,
    #[serde(default)]
    contexts: BTreeSet<String>,
}

fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::from_file(path)?.with_env_override()?,
        None => AppConfig::from_env()?,
    };
    Ok(config)
}

fn init_logging(config: &AppConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    if config.logging.json_format {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn read_entities(path: &Path) -> anyhow::Result<Vec<EntityRecord>> {
    let content = std::fs::read(path)
        .with_context(|| format!("reading entity file {}", path.display()))?;
    let entities: Vec<EntityRecord> = serde_json::from_slice(&content)
        .with_context(|| format!("parsing entity file {}", path.display()))?;
    Ok(entities)
}

fn build_classifier(config: &AppConfig, local_only: bool) -> anyhow::Result<TieredClassifier> {
    if local_only {
        return Ok(TieredClassifier::local_only(
            config.classifier.cache_capacity,
        ));
    }

    let tiers: Vec<Arc<dyn ClassifyTier>> = vec![
        Arc::new(ExternalModelTier::from_config(&config.classifier)?),
        Arc::new(LocalNerTier::new()),
        Arc::new(RuleTier::new(RuleTable::current())),
    ];
    Ok(TieredClassifier::new(
        tiers,
        config.classifier.cache_capacity,
    ))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    init_logging(&config);

    match cli.command {
        Commands::Classify {
            name,
            context,
            local_only,
        } => {
            let classifier = build_classifier(&config, local_only)?;
            let result = classifier.classify(&name, context.as_deref()).await?;

            let scorer = ConfidenceScorer::new(config.scoring.clone());
            let evidence = ScoringEvidence {
                has_context: context.is_some(),
                ..ScoringEvidence::default()
            };
            let (entity_type, classification) = scorer.finalize(&result, &evidence);

            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "name": name,
                    "entity_type": entity_type,
                    "tier_used": result.tier_used,
                    "confidence": classification.confidence,
                    "needs_review": classification.needs_review,
                    "reasoning": result.reasoning,
                }))?
            );
        }

        Commands::Dedup { input } => {
            let entities = read_entities(&input)?;
            let finder = DuplicateFinder::new(config.dedup.clone());

            let mut reported = 0usize;
            for record in &entities {
                let candidates = finder.find_duplicates(&record.canonical_name, entities.iter());
                for candidate in candidates {
                    // Each unordered pair prints once; skip the self-match
                    if record.id < candidate.entity_id {
                        println!(
                            "{:.3}  {} ({})  <->  {} ({})",
                            candidate.similarity,
                            record.canonical_name,
                            record.id,
                            candidate.name,
                            candidate.entity_id
                        );
                        reported += 1;
                    }
                }
            }
            tracing::info!(pairs = reported, total = entities.len(), "dedup scan complete");
        }

        Commands::Batch {
            input,
            out,
            local_only,
            allow_fresh_start,
        } => {
            let entities = read_entities(&input)?;

            let mut batch_config = config.batch.clone();
            batch_config.allow_fresh_start = allow_fresh_start;

            let classifier = Arc::new(build_classifier(&config, local_only)?);
            let scorer = ConfidenceScorer::new(config.scoring.clone());
            let embedder: Arc<dyn EmbeddingClient> =
                Arc::from(create_embedding_client(&config.classifier)?);
            let dimension = embedder.dimension();

            let orchestrator =
                BatchOrchestrator::new(classifier, scorer, embedder, batch_config)?;

            let mut engine = MergeEngine::new();
            for record in &entities {
                engine.insert(record.clone());
            }
            let mut index = SimilarityIndex::new(dimension);

            let cancel = CancellationToken::new();
            let ctrl_c_cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("interrupt received, finishing current sub-batch");
                    ctrl_c_cancel.cancel();
                }
            });

            let report = orchestrator
                .run(entities, &mut engine, &mut index, cancel)
                .await?;

            std::fs::create_dir_all(&out)?;
            let records: Vec<&EntityRecord> = engine.active_records().collect();
            std::fs::write(
                out.join("entities.json"),
                serde_json::to_vec_pretty(&records)?,
            )?;
            let embeddings: Vec<&EmbeddingRecord> = index.records().collect();
            std::fs::write(
                out.join("embeddings.json"),
                serde_json::to_vec_pretty(&embeddings)?,
            )?;

            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.is_clean() {
                std::process::exit(1);
            }
        }

        Commands::Similar {
            entity_id,
            embeddings,
            top_k,
            min_similarity,
        } => {
            let content = std::fs::read(&embeddings)
                .with_context(|| format!("reading embeddings {}", embeddings.display()))?;
            let records: Vec<EmbeddingRecord> = serde_json::from_slice(&content)?;
            let dimension = records
                .first()
                .map(|r| r.vector.len())
                .context("embeddings file is empty")?;
            let index = SimilarityIndex::from_records(dimension, records)?;

            let hits = index.query_similar(
                entity_id,
                top_k.unwrap_or(config.similarity.top_k),
                min_similarity.unwrap_or(config.similarity.min_similarity),
            )?;
            println!("{}", serde_json::to_string_pretty(&hits)?);
        }

        Commands::Export {
            entities,
            edges,
            out,
        } => {
            let records = read_entities(&entities)?;
            let content = std::fs::read(&edges)
                .with_context(|| format!("reading edge file {}", edges.display()))?;
            let edge_inputs: Vec<EdgeInput> = serde_json::from_slice(&content)?;

            let mut graph = RelationshipGraph::new(config.graph.edge_policy);
            for record in &records {
                graph.add_node(record);
            }
            for edge in edge_inputs {
                graph.add_edge(edge.source, edge.target, edge.weight, edge.contexts)?;
            }

            write_artifact(&graph, &out)?;
            println!(
                "wrote {} nodes, {} edges ({} violations) to {}",
                graph.node_count(),
                graph.edge_count(),
                graph.violation_count(),
                out.display()
            );
        }
    }

    Ok(())
}
