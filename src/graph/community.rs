//! Community detection by greedy modularity maximization.
//!
//! Clauset–Newman–Moore agglomeration: start from singleton communities and
//! repeatedly join the adjacent pair with the largest modularity gain until no
//! join improves modularity. Edge weights come from the `weight` attribute
//! (1.0 when absent). Ties break toward the lowest community pair, so results
//! are deterministic for a given node/edge insertion order.

use std::collections::{BTreeMap, HashMap};

use petgraph::visit::EdgeRef;

use super::{edge_weight, ConceptGraph};

/// Node attribute written by [`assign_communities`].
pub const COMMUNITY_ATTRIBUTE: &str = "community";

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

/// Detect communities; largest first, members in node insertion order.
pub fn greedy_modularity_communities(graph: &ConceptGraph) -> Vec<Vec<String>> {
    let inner = graph.inner();
    let n = inner.node_count();
    if n == 0 {
        return Vec::new();
    }

    // links[i][j] = total edge weight between communities i and j (i != j).
    let mut links: Vec<BTreeMap<usize, f64>> = vec![BTreeMap::new(); n];
    let mut degree = vec![0.0f64; n];
    let mut total = 0.0f64;
    for e in inner.edge_references() {
        let (s, t) = (e.source().index(), e.target().index());
        let w = edge_weight(e.weight());
        *links[s].entry(t).or_default() += w;
        *links[t].entry(s).or_default() += w;
        degree[s] += w;
        degree[t] += w;
        total += w;
    }

    let mut members: Vec<Option<Vec<usize>>> = (0..n).map(|i| Some(vec![i])).collect();

    if total > 0.0 {
        let two_m = 2.0 * total;
        let mut share: Vec<f64> = degree.iter().map(|d| d / two_m).collect();

        loop {
            let mut best: Option<(f64, usize, usize)> = None;
            for (i, row) in links.iter().enumerate() {
                for (&j, &w) in row.range(i + 1..) {
                    let gain = 2.0 * (w / two_m - share[i] * share[j]);
                    if best.is_none_or(|(g, _, _)| gain > g) {
                        best = Some((gain, i, j));
                    }
                }
            }
            let Some((gain, keep, absorb)) = best else {
                break;
            };
            if gain <= 0.0 {
                break;
            }

            // Fold `absorb` into `keep`.
            let absorbed = std::mem::take(&mut links[absorb]);
            for (k, w) in absorbed {
                if k == keep {
                    continue;
                }
                links[k].remove(&absorb);
                *links[k].entry(keep).or_default() += w;
                *links[keep].entry(k).or_default() += w;
            }
            links[keep].remove(&absorb);
            share[keep] += share[absorb];
            share[absorb] = 0.0;
            if let Some(moved) = members[absorb].take() {
                if let Some(target) = members[keep].as_mut() {
                    target.extend(moved);
                }
            }
        }
    }

    let mut communities: Vec<Vec<String>> = members
        .into_iter()
        .flatten()
        .map(|mut ids| {
            ids.sort_unstable();
            ids.into_iter()
                .filter_map(|i| graph.label_of(petgraph::graph::NodeIndex::new(i)))
                .map(str::to_string)
                .collect()
        })
        .collect();
    communities.sort_by(|a, b| b.len().cmp(&a.len()));
    tracing::debug!(communities = communities.len(), "detected communities");
    communities
}

// ---------------------------------------------------------------------------
// Modularity
// ---------------------------------------------------------------------------

/// Newman modularity of a partition, using `weight` edge attributes.
pub fn modularity(graph: &ConceptGraph, communities: &[Vec<String>]) -> f64 {
    let membership: HashMap<&str, usize> = communities
        .iter()
        .enumerate()
        .flat_map(|(c, labels)| labels.iter().map(move |l| (l.as_str(), c)))
        .collect();

    let mut total = 0.0f64;
    let mut internal = vec![0.0f64; communities.len()];
    let mut degree = vec![0.0f64; communities.len()];
    for edge in graph.edges() {
        let w = edge_weight(&edge.attributes);
        total += w;
        let cs = membership.get(edge.source.as_str());
        let ct = membership.get(edge.target.as_str());
        if let Some(&cs) = cs {
            degree[cs] += w;
        }
        if let Some(&ct) = ct {
            degree[ct] += w;
        }
        if let (Some(cs), Some(ct)) = (cs, ct) {
            if cs == ct {
                internal[*cs] += w;
            }
        }
    }
    if total == 0.0 {
        return 0.0;
    }
    internal
        .iter()
        .zip(&degree)
        .map(|(l, d)| l / total - (d / (2.0 * total)).powi(2))
        .sum()
}

// ---------------------------------------------------------------------------
// Node attributes
// ---------------------------------------------------------------------------

/// Detect communities and store each node's community index as a node attribute.
///
/// Returns the number of communities.
pub fn assign_communities(graph: &mut ConceptGraph) -> usize {
    let communities = greedy_modularity_communities(graph);
    for (idx, labels) in communities.iter().enumerate() {
        for label in labels {
            // Labels come from this graph, so the node always exists.
            let _ = graph.set_node_attribute(label, COMMUNITY_ATTRIBUTE, idx.into());
        }
    }
    communities.len()
}
