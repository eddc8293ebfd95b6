//! Graph artifact export
//!
//! Serializes the graph into the `{metadata, nodes, edges}` JSON
//! document consumed read-only by the API/UI layer. The file is written
//! atomically (temp file + rename) so readers never observe a partial
//! artifact.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::Utc;

use entigraph_core::{EngineError, GraphArtifact, Result};

use crate::RelationshipGraph;

/// Project the graph into its exported form
pub fn build_artifact(graph: &RelationshipGraph) -> GraphArtifact {
    let mut metadata = BTreeMap::new();
    metadata.insert(
        "generated_at".to_string(),
        serde_json::json!(Utc::now().to_rfc3339()),
    );
    metadata.insert("node_count".to_string(), serde_json::json!(graph.node_count()));
    metadata.insert("edge_count".to_string(), serde_json::json!(graph.edge_count()));
    metadata.insert(
        "edge_violations".to_string(),
        serde_json::json!(graph.violation_count()),
    );

    GraphArtifact {
        metadata,
        nodes: graph.nodes().cloned().collect(),
        edges: graph.edges().cloned().collect(),
    }
}

/// Write the artifact atomically next to its final location
pub fn write_artifact(graph: &RelationshipGraph, path: &Path) -> Result<()> {
    let artifact = build_artifact(graph);
    let json = serde_json::to_vec_pretty(&artifact)?;

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    std::io::Write::write_all(&mut tmp, &json)?;
    tmp.persist(path)
        .map_err(|e| EngineError::Io(e.error))?;

    tracing::info!(path = %path.display(), nodes = artifact.nodes.len(), "wrote graph artifact");
    Ok(())
}

/// Load a previously exported artifact
pub fn read_artifact(path: &Path) -> Result<GraphArtifact> {
    let content = std::fs::read(path)?;
    Ok(serde_json::from_slice(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use entigraph_core::{EdgePolicy, EntityRecord};
    use std::collections::BTreeSet;

    #[test]
    fn test_artifact_round_trip() {
        let mut graph = RelationshipGraph::new(EdgePolicy::Strict);
        let a = EntityRecord::new("Jeffrey Epstein");
        let b = EntityRecord::new("Ghislaine Maxwell");
        graph.add_node(&a);
        graph.add_node(&b);
        graph
            .add_edge(a.id, b.id, 4.0, BTreeSet::from(["flight-log".to_string()]))
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.json");
        write_artifact(&graph, &path).unwrap();

        let loaded = read_artifact(&path).unwrap();
        assert_eq!(loaded.nodes.len(), 2);
        assert_eq!(loaded.edges.len(), 1);
        assert_eq!(loaded.edges[0].weight, 4.0);
        assert_eq!(loaded.metadata["node_count"], serde_json::json!(2));
    }

    #[test]
    fn test_artifact_metadata_counts() {
        let graph = RelationshipGraph::new(EdgePolicy::LogAndSkip);
        let artifact = build_artifact(&graph);
        assert_eq!(artifact.metadata["edge_count"], serde_json::json!(0));
        assert!(artifact.metadata.contains_key("generated_at"));
    }
}
