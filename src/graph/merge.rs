//! Merging graphs across agent turns.
//!
//! Each turn produces a fresh concept graph (from text extraction or from an
//! ontologist's concepts and relationships). [`CumulativeGraph`] folds those
//! into one running graph and re-deduplicates it against its embedding table.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::embedding::EmbeddingTable;
use crate::error::{CgResult, GraphError};

use super::simplify::GraphSimplifier;
use super::{Attributes, ConceptGraph, GraphResult};

/// Relation used when an ontologist relationship names none.
pub const DEFAULT_RELATIONSHIP: &str = "related_to";

impl ConceptGraph {
    /// Union `other` into `self`: nodes and edges are added, and `other`'s
    /// attributes override on conflict.
    pub fn compose(&mut self, other: &ConceptGraph) {
        for node in other.concept_nodes() {
            self.add_node_with(&node.label, node.attributes.clone());
        }
        for edge in other.edges() {
            // `other` holds no self-loops, so this cannot fail.
            let _ = self.add_edge(&edge.source, &edge.target, edge.attributes);
        }
    }
}

/// A relationship between two concepts as produced by an ontologist turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// Source concept label.
    pub source: String,
    /// Target concept label.
    pub target: String,
    /// Relation text, stored as the edge `relationship` attribute.
    #[serde(default)]
    pub relationship: Option<String>,
}

/// Outcome of absorbing one turn into the cumulative graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeReport {
    /// Turn number after this merge (1-based).
    pub turn: usize,
    /// Nodes in the cumulative graph before the merge.
    pub nodes_before: usize,
    /// Nodes after composing, before deduplication.
    pub nodes_composed: usize,
    /// Nodes after deduplication.
    pub nodes_after: usize,
    /// Edges after deduplication.
    pub edges_after: usize,
}

impl MergeReport {
    /// Nodes removed by deduplication in this merge.
    pub fn merged(&self) -> usize {
        self.nodes_composed - self.nodes_after
    }
}

/// Running knowledge graph accumulated over agent turns.
#[derive(Debug, Clone)]
pub struct CumulativeGraph {
    graph: ConceptGraph,
    embeddings: EmbeddingTable,
    simplifier: GraphSimplifier,
    turns: usize,
}

impl CumulativeGraph {
    pub fn new(simplifier: GraphSimplifier) -> Self {
        Self {
            graph: ConceptGraph::new(),
            embeddings: EmbeddingTable::new(),
            simplifier,
            turns: 0,
        }
    }

    pub fn graph(&self) -> &ConceptGraph {
        &self.graph
    }

    pub fn embeddings(&self) -> &EmbeddingTable {
        &self.embeddings
    }

    pub fn turns(&self) -> usize {
        self.turns
    }

    /// Compose a turn's graph and embeddings into the running graph, then
    /// deduplicate.
    ///
    /// Embeddings of labels merged away are dropped so the table keeps
    /// matching the node set. On error the cumulative state is unchanged.
    pub fn absorb(
        &mut self,
        graph: &ConceptGraph,
        embeddings: &EmbeddingTable,
    ) -> CgResult<MergeReport> {
        let nodes_before = self.graph.node_count();

        let mut composed = self.graph.clone();
        composed.compose(graph);
        let mut table = self.embeddings.clone();
        table.extend_from(embeddings)?;

        let simplified = self.simplifier.simplify(&composed, &table)?;
        table.retain(|l| simplified.has_node(l));

        let report = MergeReport {
            turn: self.turns + 1,
            nodes_before,
            nodes_composed: composed.node_count(),
            nodes_after: simplified.node_count(),
            edges_after: simplified.edge_count(),
        };

        self.graph = simplified;
        self.embeddings = table;
        self.turns += 1;

        tracing::info!(
            turn = report.turn,
            before = report.nodes_before,
            composed = report.nodes_composed,
            after = report.nodes_after,
            "absorbed turn into cumulative graph"
        );
        Ok(report)
    }

    /// Record an ontologist's concepts (label → definition) and relationships.
    ///
    /// Concepts become nodes with a `definition` attribute; relationships become
    /// edges with a `relationship` attribute. No deduplication happens here:
    /// the new nodes have no embeddings until the next [`absorb`](Self::absorb).
    pub fn add_concepts(
        &mut self,
        concepts: &BTreeMap<String, String>,
        relationships: &[Relationship],
    ) -> GraphResult<()> {
        let mut staged = self.graph.clone();
        for (concept, definition) in concepts {
            let attrs = Attributes::from([(
                "definition".to_string(),
                Value::String(definition.clone()),
            )]);
            staged.add_node_with(concept, attrs);
        }
        for rel in relationships {
            if rel.source == rel.target {
                return Err(GraphError::SelfLoop {
                    label: rel.source.clone(),
                });
            }
            let kind = rel
                .relationship
                .clone()
                .unwrap_or_else(|| DEFAULT_RELATIONSHIP.to_string());
            let attrs = Attributes::from([("relationship".to_string(), Value::String(kind))]);
            staged.add_edge(&rel.source, &rel.target, attrs)?;
        }
        self.graph = staged;
        Ok(())
    }

    /// Labels in the graph that still lack an embedding.
    pub fn unembedded(&self) -> Vec<&str> {
        self.graph
            .nodes()
            .filter(|l| !self.embeddings.contains(l))
            .collect()
    }
}
