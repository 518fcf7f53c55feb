//! Graph analytics: summary statistics and connected components.
//!
//! Component lists are sorted by size desc; members keep node insertion order.

use petgraph::algo::connected_components as count_components;
use petgraph::unionfind::UnionFind;
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};

use super::ConceptGraph;

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// Basic statistics for a concept graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphStats {
    /// Number of concept nodes.
    pub num_nodes: usize,
    /// Number of undirected edges.
    pub num_edges: usize,
    /// `2E / (N (N - 1))`; 0 for fewer than two nodes.
    pub density: f64,
    /// Number of connected components, isolated nodes included.
    pub connected_components: usize,
}

/// Compute node/edge counts, density and the number of connected components.
pub fn analyze(graph: &ConceptGraph) -> GraphStats {
    let n = graph.node_count();
    let e = graph.edge_count();
    let density = if n < 2 {
        0.0
    } else {
        (2 * e) as f64 / (n * (n - 1)) as f64
    };
    let stats = GraphStats {
        num_nodes: n,
        num_edges: e,
        density,
        connected_components: count_components(graph.inner()),
    };
    tracing::info!(
        nodes = stats.num_nodes,
        edges = stats.num_edges,
        density = stats.density,
        components = stats.connected_components,
        "analyzed concept graph"
    );
    stats
}

// ---------------------------------------------------------------------------
// Components
// ---------------------------------------------------------------------------

/// Connected components as label lists, largest first.
pub fn connected_components(graph: &ConceptGraph) -> Vec<Vec<String>> {
    let inner = graph.inner();
    let mut uf = UnionFind::<usize>::new(inner.node_count());
    for e in inner.edge_references() {
        uf.union(e.source().index(), e.target().index());
    }

    // Group by root, keeping first-seen order of both groups and members.
    let mut slot_of_root: Vec<Option<usize>> = vec![None; inner.node_count()];
    let mut components: Vec<Vec<String>> = Vec::new();
    for idx in inner.node_indices() {
        let root = uf.find(idx.index());
        let slot = *slot_of_root[root].get_or_insert_with(|| {
            components.push(Vec::new());
            components.len() - 1
        });
        components[slot].push(inner[idx].label.clone());
    }

    // Stable sort keeps discovery order among equal sizes.
    components.sort_by(|a, b| b.len().cmp(&a.len()));
    components
}

/// Drop every component with fewer than `min_size` nodes.
pub fn remove_small_components(graph: &ConceptGraph, min_size: usize) -> ConceptGraph {
    let keep: std::collections::HashSet<String> = connected_components(graph)
        .into_iter()
        .filter(|c| c.len() >= min_size)
        .flatten()
        .collect();
    let pruned = graph.subgraph(|l| keep.contains(l));
    tracing::debug!(
        before = graph.node_count(),
        after = pruned.node_count(),
        min_size,
        "removed small components"
    );
    pruned
}

/// The largest connected component (the earliest one on ties).
pub fn giant_component(graph: &ConceptGraph) -> ConceptGraph {
    let Some(largest) = connected_components(graph).into_iter().next() else {
        return graph.clone();
    };
    let keep: std::collections::HashSet<String> = largest.into_iter().collect();
    graph.subgraph(|l| keep.contains(l))
}
