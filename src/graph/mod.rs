//! Concept graph: undirected, label-keyed graph of ontology terms.
//!
//! Nodes are unique string labels; each unordered pair of labels holds at most
//! one edge, and edges carry free-form attributes (relation title, weight, ...).
//! Node and edge insertion order is preserved, which the simplifier and the
//! GraphML writer both rely on for deterministic output.
//!
//! Backed by a `petgraph` [`UnGraph`] plus a label index for O(1) lookups.

pub mod analytics;
pub mod community;
pub mod merge;
pub mod simplify;
pub mod traverse;

use std::collections::{BTreeMap, HashMap};

use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};

use crate::error::GraphError;

/// Result type for graph operations.
pub type GraphResult<T> = std::result::Result<T, GraphError>;

/// Free-form key/value attributes attached to nodes and edges.
pub type Attributes = BTreeMap<String, serde_json::Value>;

/// Node payload: the concept label and its attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptNode {
    /// Unique concept label.
    pub label: String,
    /// Node attributes (e.g. `definition`, `community`).
    #[serde(default)]
    pub attributes: Attributes,
}

/// A relation between two concepts, as yielded by [`ConceptGraph::edges`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptEdge {
    /// First endpoint as passed when the edge was added.
    pub source: String,
    /// Second endpoint.
    pub target: String,
    /// Edge attributes such as `title` and `weight`.
    #[serde(default)]
    pub attributes: Attributes,
}

/// Undirected concept graph with one edge per unordered label pair.
#[derive(Clone, Default)]
pub struct ConceptGraph {
    graph: UnGraph<ConceptNode, Attributes>,
    index: HashMap<String, NodeIndex>,
}

impl ConceptGraph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensure a node exists for `label`, returning its index.
    fn ensure_node(&mut self, label: &str) -> NodeIndex {
        if let Some(&idx) = self.index.get(label) {
            return idx;
        }
        let idx = self.graph.add_node(ConceptNode {
            label: label.to_string(),
            attributes: Attributes::new(),
        });
        self.index.insert(label.to_string(), idx);
        idx
    }

    /// Add a node (no-op if present) and return whether it was new.
    pub fn add_node(&mut self, label: impl AsRef<str>) -> bool {
        let label = label.as_ref();
        if self.index.contains_key(label) {
            return false;
        }
        self.ensure_node(label);
        true
    }

    /// Add a node or merge `attributes` into an existing node's attributes.
    pub fn add_node_with(&mut self, label: impl AsRef<str>, attributes: Attributes) {
        let idx = self.ensure_node(label.as_ref());
        self.graph[idx].attributes.extend(attributes);
    }

    /// Set one attribute on an existing node.
    pub fn set_node_attribute(
        &mut self,
        label: &str,
        key: impl Into<String>,
        value: serde_json::Value,
    ) -> GraphResult<()> {
        let idx = self.node_index(label)?;
        self.graph[idx].attributes.insert(key.into(), value);
        Ok(())
    }

    /// Add an edge between two labels, creating missing nodes.
    ///
    /// If the pair already has an edge, its attributes are replaced wholesale.
    pub fn add_edge(
        &mut self,
        source: impl AsRef<str>,
        target: impl AsRef<str>,
        attributes: Attributes,
    ) -> GraphResult<()> {
        let (source, target) = (source.as_ref(), target.as_ref());
        if source == target {
            return Err(GraphError::SelfLoop {
                label: source.to_string(),
            });
        }
        let a = self.ensure_node(source);
        let b = self.ensure_node(target);
        self.graph.update_edge(a, b, attributes);
        Ok(())
    }

    fn node_index(&self, label: &str) -> GraphResult<NodeIndex> {
        self.index
            .get(label)
            .copied()
            .ok_or_else(|| GraphError::NodeNotFound {
                label: label.to_string(),
            })
    }

    /// Check if a node exists.
    pub fn has_node(&self, label: &str) -> bool {
        self.index.contains_key(label)
    }

    /// Check if an edge exists between two labels (either direction).
    pub fn has_edge(&self, a: &str, b: &str) -> bool {
        match (self.index.get(a), self.index.get(b)) {
            (Some(&ia), Some(&ib)) => self.graph.find_edge(ia, ib).is_some(),
            _ => false,
        }
    }

    /// Attributes of the edge between `a` and `b`, if any.
    pub fn edge_attributes(&self, a: &str, b: &str) -> Option<&Attributes> {
        let (&ia, &ib) = (self.index.get(a)?, self.index.get(b)?);
        let e = self.graph.find_edge(ia, ib)?;
        self.graph.edge_weight(e)
    }

    /// Attributes of a node, if present.
    pub fn node_attributes(&self, label: &str) -> Option<&Attributes> {
        let idx = self.index.get(label)?;
        Some(&self.graph[*idx].attributes)
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of edges.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Node labels in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.graph.node_weights().map(|n| n.label.as_str())
    }

    /// Node payloads in insertion order.
    pub fn concept_nodes(&self) -> impl Iterator<Item = &ConceptNode> {
        self.graph.node_weights()
    }

    /// Edges in insertion order.
    pub fn edges(&self) -> impl Iterator<Item = ConceptEdge> + '_ {
        self.graph.edge_references().map(|e| ConceptEdge {
            source: self.graph[e.source()].label.clone(),
            target: self.graph[e.target()].label.clone(),
            attributes: e.weight().clone(),
        })
    }

    /// Labels adjacent to `label`, in edge insertion order.
    pub fn neighbors(&self, label: &str) -> GraphResult<Vec<&str>> {
        let idx = self.node_index(label)?;
        let mut out: Vec<(usize, &str)> = self
            .graph
            .edges(idx)
            .map(|e| {
                let other = if e.source() == idx { e.target() } else { e.source() };
                (e.id().index(), self.graph[other].label.as_str())
            })
            .collect();
        // petgraph walks adjacency lists newest-first.
        out.sort_by_key(|(id, _)| *id);
        Ok(out.into_iter().map(|(_, l)| l).collect())
    }

    /// Number of incident edges.
    pub fn degree(&self, label: &str) -> GraphResult<usize> {
        let idx = self.node_index(label)?;
        Ok(self.graph.edges(idx).count())
    }

    /// Sum of incident edge `weight` attributes (1.0 when absent).
    pub fn weighted_degree(&self, label: &str) -> GraphResult<f64> {
        let idx = self.node_index(label)?;
        Ok(self.graph.edges(idx).map(|e| edge_weight(e.weight())).sum())
    }

    /// Build a new graph restricted to the labels accepted by `keep`.
    ///
    /// Preserves node and edge order; edges survive when both ends are kept.
    pub fn subgraph<F>(&self, mut keep: F) -> ConceptGraph
    where
        F: FnMut(&str) -> bool,
    {
        let mut out = ConceptGraph::new();
        for node in self.graph.node_weights() {
            if keep(&node.label) {
                out.add_node_with(&node.label, node.attributes.clone());
            }
        }
        for e in self.graph.edge_references() {
            let (s, t) = (&self.graph[e.source()].label, &self.graph[e.target()].label);
            if out.has_node(s) && out.has_node(t) {
                let (a, b) = (out.index[s.as_str()], out.index[t.as_str()]);
                out.graph.update_edge(a, b, e.weight().clone());
            }
        }
        out
    }

    /// Borrow the underlying petgraph graph.
    pub fn inner(&self) -> &UnGraph<ConceptNode, Attributes> {
        &self.graph
    }

    /// Label of a petgraph node index.
    pub fn label_of(&self, idx: NodeIndex) -> Option<&str> {
        self.graph.node_weight(idx).map(|n| n.label.as_str())
    }

    /// Petgraph index of a label.
    pub fn index_of(&self, label: &str) -> Option<NodeIndex> {
        self.index.get(label).copied()
    }
}

/// Read the numeric `weight` attribute of an edge, defaulting to 1.0.
pub fn edge_weight(attributes: &Attributes) -> f64 {
    attributes
        .get("weight")
        .and_then(serde_json::Value::as_f64)
        .unwrap_or(1.0)
}

/// Two graphs are equal when they hold the same nodes (same order, same
/// attributes) and the same edge set, regardless of endpoint orientation.
impl PartialEq for ConceptGraph {
    fn eq(&self, other: &Self) -> bool {
        if !self.graph.node_weights().eq(other.graph.node_weights()) {
            return false;
        }
        if self.edge_count() != other.edge_count() {
            return false;
        }
        self.edges().all(|e| {
            other.edge_attributes(&e.source, &e.target) == Some(&e.attributes)
        })
    }
}

impl std::fmt::Debug for ConceptGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConceptGraph")
            .field("nodes", &self.node_count())
            .field("edges", &self.edge_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs(title: &str) -> Attributes {
        let mut a = Attributes::new();
        a.insert("title".into(), json!(title));
        a
    }

    #[test]
    fn add_edge_creates_nodes_in_order() {
        let mut g = ConceptGraph::new();
        g.add_edge("silk", "fiber", attrs("is")).unwrap();
        g.add_edge("beta-sheets", "strength", attrs("control")).unwrap();
        let nodes: Vec<&str> = g.nodes().collect();
        assert_eq!(nodes, vec!["silk", "fiber", "beta-sheets", "strength"]);
        assert_eq!(g.edge_count(), 2);
    }

    #[test]
    fn re_adding_edge_overwrites_attributes() {
        let mut g = ConceptGraph::new();
        g.add_edge("a", "b", attrs("first")).unwrap();
        g.add_edge("b", "a", attrs("second")).unwrap();
        assert_eq!(g.edge_count(), 1);
        assert_eq!(g.edge_attributes("a", "b").unwrap()["title"], json!("second"));
    }

    #[test]
    fn self_loop_rejected() {
        let mut g = ConceptGraph::new();
        let err = g.add_edge("a", "a", Attributes::new()).unwrap_err();
        assert!(matches!(err, GraphError::SelfLoop { .. }));
        assert!(g.is_empty());
    }

    #[test]
    fn neighbors_in_edge_order() {
        let mut g = ConceptGraph::new();
        g.add_edge("hub", "x", Attributes::new()).unwrap();
        g.add_edge("y", "hub", Attributes::new()).unwrap();
        g.add_edge("hub", "z", Attributes::new()).unwrap();
        assert_eq!(g.neighbors("hub").unwrap(), vec!["x", "y", "z"]);
        assert_eq!(g.degree("hub").unwrap(), 3);
        assert!(g.neighbors("missing").is_err());
    }

    #[test]
    fn weighted_degree_defaults_to_one() {
        let mut g = ConceptGraph::new();
        let mut heavy = Attributes::new();
        heavy.insert("weight".into(), json!(2.5));
        g.add_edge("a", "b", heavy).unwrap();
        g.add_edge("a", "c", Attributes::new()).unwrap();
        assert!((g.weighted_degree("a").unwrap() - 3.5).abs() < 1e-12);
    }

    #[test]
    fn subgraph_keeps_internal_edges() {
        let mut g = ConceptGraph::new();
        g.add_edge("a", "b", attrs("ab")).unwrap();
        g.add_edge("b", "c", attrs("bc")).unwrap();
        let sub = g.subgraph(|l| l != "c");
        assert_eq!(sub.node_count(), 2);
        assert_eq!(sub.edge_count(), 1);
        assert!(sub.has_edge("b", "a"));
    }

    #[test]
    fn equality_ignores_edge_orientation() {
        let mut g1 = ConceptGraph::new();
        g1.add_edge("a", "b", attrs("r")).unwrap();
        let mut g2 = ConceptGraph::new();
        g2.add_node("a");
        g2.add_edge("b", "a", attrs("r")).unwrap();
        assert_eq!(g1, g2);
    }
}
