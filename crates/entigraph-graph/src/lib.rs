//! Entigraph Graph - Validated relationship graph
//!
//! The externally consumed artifact of the engine: one node per
//! surviving entity record, undirected weighted edges between them.
//! Edge invariants are enforced at construction time and never relaxed:
//! no self-loops, no dangling endpoints, no parallel edges. Whether a
//! violation aborts ingestion or is logged and skipped is the caller's
//! policy choice; either way it is surfaced, never silently dropped.

use std::collections::{BTreeMap, BTreeSet};

use uuid::Uuid;

use entigraph_core::{EdgePolicy, EngineError, EntityRecord, GraphEdge, GraphNode, Result};

pub mod artifact;

pub use artifact::{build_artifact, read_artifact, write_artifact};

// ============================================================================
// Relationship Graph
// ============================================================================

/// Node/edge store with construction-time invariant checks
#[derive(Debug)]
pub struct RelationshipGraph {
    policy: EdgePolicy,
    nodes: BTreeMap<Uuid, GraphNode>,
    // Keyed by normalized (smaller id, larger id) pair so re-adding the
    // reverse direction merges rather than creating a parallel edge
    edges: BTreeMap<(Uuid, Uuid), GraphEdge>,
    violations: u64,
}

impl RelationshipGraph {
    pub fn new(policy: EdgePolicy) -> Self {
        Self {
            policy,
            nodes: BTreeMap::new(),
            edges: BTreeMap::new(),
            violations: 0,
        }
    }

    /// Project a surviving entity record into the graph
    pub fn add_node(&mut self, record: &EntityRecord) {
        self.nodes.insert(record.id, GraphNode::from(record));
    }

    pub fn node(&self, id: &Uuid) -> Option<&GraphNode> {
        self.nodes.get(id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Count of edges rejected under the log-and-skip policy
    pub fn violation_count(&self) -> u64 {
        self.violations
    }

    /// Add or merge an edge.
    ///
    /// Returns `Ok(true)` when the edge was stored or merged, and
    /// `Ok(false)` when it was rejected under [`EdgePolicy::LogAndSkip`].
    /// Under [`EdgePolicy::Strict`] a rejected edge is an error.
    pub fn add_edge(
        &mut self,
        source: Uuid,
        target: Uuid,
        weight: f64,
        contexts: BTreeSet<String>,
    ) -> Result<bool> {
        if let Err(reason) = self.check_edge(source, target, weight) {
            self.violations += 1;
            match self.policy {
                EdgePolicy::Strict => {
                    return Err(EngineError::InvalidEdge {
                        source_id: source,
                        target_id: target,
                        reason,
                    })
                }
                EdgePolicy::LogAndSkip => {
                    tracing::warn!(%source, %target, %reason, "skipping invalid edge");
                    return Ok(false);
                }
            }
        }

        let key = if source < target {
            (source, target)
        } else {
            (target, source)
        };

        match self.edges.get_mut(&key) {
            Some(existing) => {
                // Duplicate pair: weights sum, contexts union
                existing.weight += weight;
                existing.contexts.extend(contexts);
            }
            None => {
                self.edges.insert(
                    key,
                    GraphEdge {
                        source: key.0,
                        target: key.1,
                        weight,
                        contexts,
                    },
                );
                for endpoint in [key.0, key.1] {
                    if let Some(node) = self.nodes.get_mut(&endpoint) {
                        node.connection_count += 1;
                    }
                }
            }
        }

        Ok(true)
    }

    fn check_edge(&self, source: Uuid, target: Uuid, weight: f64) -> std::result::Result<(), String> {
        if source == target {
            return Err("self-loop".to_string());
        }
        if !self.nodes.contains_key(&source) {
            return Err(format!("source node {source} does not exist"));
        }
        if !self.nodes.contains_key(&target) {
            return Err(format!("target node {target} does not exist"));
        }
        if weight <= 0.0 {
            return Err("non-positive weight".to_string());
        }
        Ok(())
    }

    /// Re-check every stored edge against the invariants. Construction
    /// keeps this empty; it exists so consumers can assert the artifact
    /// they load is intact.
    pub fn validate(&self) -> Vec<String> {
        let mut violations = Vec::new();

        for ((a, b), edge) in &self.edges {
            if edge.source == edge.target {
                violations.push(format!("self-loop on {}", edge.source));
            }
            for endpoint in [edge.source, edge.target] {
                if !self.nodes.contains_key(&endpoint) {
                    violations.push(format!("dangling endpoint {endpoint}"));
                }
            }
            if (edge.source, edge.target) != (*a, *b) {
                violations.push(format!("edge stored under wrong key {a}/{b}"));
            }
        }

        violations
    }

    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.values()
    }

    pub fn edges(&self) -> impl Iterator<Item = &GraphEdge> {
        self.edges.values()
    }
}

impl Default for RelationshipGraph {
    fn default() -> Self {
        Self::new(EdgePolicy::default())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn contexts(tags: &[&str]) -> BTreeSet<String> {
        tags.iter().map(|t| t.to_string()).collect()
    }

    fn graph_with_nodes(policy: EdgePolicy, count: usize) -> (RelationshipGraph, Vec<Uuid>) {
        let mut graph = RelationshipGraph::new(policy);
        let mut ids = Vec::new();
        for i in 0..count {
            let record = EntityRecord::new(format!("Entity {i}"));
            ids.push(record.id);
            graph.add_node(&record);
        }
        (graph, ids)
    }

    #[test]
    fn test_self_loop_rejected_strict() {
        let (mut graph, ids) = graph_with_nodes(EdgePolicy::Strict, 1);
        let err = graph
            .add_edge(ids[0], ids[0], 1.0, contexts(&["manifest"]))
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidEdge { .. }));
    }

    #[test]
    fn test_self_loop_skipped_with_policy() {
        let (mut graph, ids) = graph_with_nodes(EdgePolicy::LogAndSkip, 1);
        let added = graph
            .add_edge(ids[0], ids[0], 1.0, contexts(&["manifest"]))
            .unwrap();
        assert!(!added);
        assert_eq!(graph.edge_count(), 0);
        assert_eq!(graph.violation_count(), 1); // surfaced, not dropped
    }

    #[test]
    fn test_dangling_endpoint_rejected() {
        let (mut graph, ids) = graph_with_nodes(EdgePolicy::Strict, 1);
        let err = graph
            .add_edge(ids[0], Uuid::new_v4(), 1.0, contexts(&[]))
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidEdge { .. }));
    }

    #[test]
    fn test_duplicate_pair_merges() {
        let (mut graph, ids) = graph_with_nodes(EdgePolicy::Strict, 2);

        graph
            .add_edge(ids[0], ids[1], 2.0, contexts(&["flight-log"]))
            .unwrap();
        // Reverse direction lands on the same edge
        graph
            .add_edge(ids[1], ids[0], 3.0, contexts(&["contact-list"]))
            .unwrap();

        assert_eq!(graph.edge_count(), 1);
        let edge = graph.edges().next().unwrap();
        assert_eq!(edge.weight, 5.0);
        assert!(edge.contexts.contains("flight-log"));
        assert!(edge.contexts.contains("contact-list"));
    }

    #[test]
    fn test_connection_counts_track_new_edges_only() {
        let (mut graph, ids) = graph_with_nodes(EdgePolicy::Strict, 2);
        graph.add_edge(ids[0], ids[1], 1.0, contexts(&[])).unwrap();
        graph.add_edge(ids[0], ids[1], 1.0, contexts(&[])).unwrap();

        assert_eq!(graph.node(&ids[0]).unwrap().connection_count, 1);
        assert_eq!(graph.node(&ids[1]).unwrap().connection_count, 1);
    }

    #[test]
    fn test_validate_clean_graph() {
        let (mut graph, ids) = graph_with_nodes(EdgePolicy::Strict, 3);
        graph.add_edge(ids[0], ids[1], 1.0, contexts(&[])).unwrap();
        graph.add_edge(ids[1], ids[2], 1.0, contexts(&[])).unwrap();
        assert!(graph.validate().is_empty());
    }

    #[test]
    fn test_zero_weight_rejected() {
        let (mut graph, ids) = graph_with_nodes(EdgePolicy::Strict, 2);
        assert!(graph.add_edge(ids[0], ids[1], 0.0, contexts(&[])).is_err());
    }
}
