//! Embedding-based node deduplication.
//!
//! Nodes whose embeddings have cosine similarity above a threshold are treated
//! as the same concept: the later node (the *donor*) is relabeled to the
//! earlier one (the *representative*). Merging is first-seen-wins and pairwise;
//! it is deliberately not a transitive closure of the similarity relation.
//!
//! The pairwise similarity matrix is computed in `batch_size × batch_size`
//! blocks to bound memory. Blocks are visited row-chunk-major and pairs inside
//! a block row-major, so every node's donor status is settled before the node
//! is offered as a representative; the resulting mapping does not depend on
//! `batch_size`.

use std::borrow::Cow;
use std::collections::HashMap;

use crate::embedding::{EmbeddingTable, SimilarityBlock};
use crate::error::SimplifyError;

use super::ConceptGraph;

/// Result type for simplification.
pub type SimplifyResult<T> = std::result::Result<T, SimplifyError>;

/// Default number of vectors per similarity block.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Default merge threshold.
pub const DEFAULT_THRESHOLD: f64 = 0.9;

/// Ordered donor → representative mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeMapping {
    entries: Vec<(String, String)>,
    index: HashMap<String, usize>,
}

impl NodeMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `donor -> representative` unless the donor is already mapped.
    ///
    /// Returns whether the entry was recorded.
    pub fn insert(&mut self, donor: impl Into<String>, representative: impl Into<String>) -> bool {
        let donor = donor.into();
        if self.index.contains_key(&donor) {
            return false;
        }
        self.index.insert(donor.clone(), self.entries.len());
        self.entries.push((donor, representative.into()));
        true
    }

    /// Representative for `donor`, if mapped.
    pub fn representative(&self, donor: &str) -> Option<&str> {
        self.index
            .get(donor)
            .map(|&pos| self.entries[pos].1.as_str())
    }

    /// Resolve a label through the mapping (one step), or return it unchanged.
    pub fn resolve<'a>(&'a self, label: &'a str) -> &'a str {
        self.representative(label).unwrap_or(label)
    }

    pub fn is_donor(&self, label: &str) -> bool {
        self.index.contains_key(label)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(donor, representative)` pairs in entry order.
    ///
    /// Mappings built by [`merge_mapping`] are ordered by the donor's position
    /// in the embedding table.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(d, r)| (d.as_str(), r.as_str()))
    }

    /// Reorder entries by `key(donor)`, stable on ties.
    fn sort_by_donor<K, F>(&mut self, mut key: F)
    where
        K: Ord,
        F: FnMut(&str) -> K,
    {
        self.entries.sort_by_key(|(d, _)| key(d));
        self.index = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, (d, _))| (d.clone(), i))
            .collect();
    }
}

/// Threshold and batching parameters for node deduplication.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GraphSimplifier {
    threshold: f64,
    batch_size: usize,
}

impl GraphSimplifier {
    /// Create a simplifier with the default batch size.
    pub fn new(threshold: f64) -> SimplifyResult<Self> {
        check_threshold(threshold)?;
        Ok(Self {
            threshold,
            batch_size: DEFAULT_BATCH_SIZE,
        })
    }

    /// Set the similarity block size.
    pub fn with_batch_size(mut self, batch_size: usize) -> SimplifyResult<Self> {
        if batch_size == 0 {
            return Err(SimplifyError::InvalidBatchSize);
        }
        self.batch_size = batch_size;
        Ok(self)
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Compute the donor → representative mapping without touching the graph.
    pub fn merge_mapping(
        &self,
        graph: &ConceptGraph,
        embeddings: &EmbeddingTable,
    ) -> SimplifyResult<NodeMapping> {
        merge_mapping(graph, embeddings, self.threshold, self.batch_size)
    }

    /// Merge similar nodes and return the relabeled graph.
    pub fn simplify(
        &self,
        graph: &ConceptGraph,
        embeddings: &EmbeddingTable,
    ) -> SimplifyResult<ConceptGraph> {
        simplify(graph, embeddings, self.threshold, self.batch_size)
    }
}

impl Default for GraphSimplifier {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

fn check_threshold(threshold: f64) -> SimplifyResult<()> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(SimplifyError::InvalidThreshold { threshold });
    }
    Ok(())
}

fn check_inputs(
    graph: &ConceptGraph,
    embeddings: &EmbeddingTable,
    threshold: f64,
    batch_size: usize,
) -> SimplifyResult<()> {
    check_threshold(threshold)?;

    let mut missing = graph.nodes().filter(|l| !embeddings.contains(l));
    if let Some(first) = missing.next() {
        return Err(SimplifyError::MissingEmbedding {
            label: first.to_string(),
            missing: 1 + missing.count(),
        });
    }

    if batch_size == 0 {
        return Err(SimplifyError::InvalidBatchSize);
    }
    Ok(())
}

/// Decide which nodes merge into which, block by block.
///
/// A pair `(a, b)` with `a` before `b` in embedding-table order and similarity
/// strictly above `threshold` records `b -> a`, unless `b` is already mapped or
/// `a` is itself a donor.
pub fn merge_mapping(
    graph: &ConceptGraph,
    embeddings: &EmbeddingTable,
    threshold: f64,
    batch_size: usize,
) -> SimplifyResult<NodeMapping> {
    check_inputs(graph, embeddings, threshold, batch_size)?;

    // Labels present in the table but not in the graph never participate.
    let order: Vec<&str> = embeddings.labels().filter(|l| graph.has_node(l)).collect();
    let chunks: Vec<&[&str]> = order.chunks(batch_size).collect();
    let mut mapping = NodeMapping::new();

    for (ci, rows) in chunks.iter().enumerate() {
        let row_vecs = flatten_chunk(embeddings, rows);
        for (cj, cols) in chunks.iter().enumerate().skip(ci) {
            let block = if cj == ci {
                SimilarityBlock::compute(&row_vecs, &row_vecs)
            } else {
                SimilarityBlock::compute(&row_vecs, &flatten_chunk(embeddings, cols))
            };
            tracing::debug!(row_chunk = ci, col_chunk = cj, "similarity block");

            for (r, c) in block.above(threshold) {
                // Only the upper triangle: representatives precede donors.
                if ci * batch_size + r >= cj * batch_size + c {
                    continue;
                }
                let (representative, donor) = (rows[r], cols[c]);
                if mapping.is_donor(representative) {
                    continue;
                }
                mapping.insert(donor, representative);
            }
        }
    }

    // Block traversal records donors out of table order when batch_size < n.
    let position: HashMap<&str, usize> = order.iter().enumerate().map(|(i, l)| (*l, i)).collect();
    mapping.sort_by_donor(|d| position.get(d).copied().unwrap_or(usize::MAX));
    Ok(mapping)
}

fn flatten_chunk<'a>(embeddings: &'a EmbeddingTable, labels: &[&str]) -> Vec<Cow<'a, [f32]>> {
    labels
        .iter()
        .filter_map(|l| embeddings.get(l))
        .map(|e| e.as_flat())
        .collect()
}

/// Apply `mapping` to `graph` in a single pass, producing a new graph.
///
/// Each endpoint is resolved one step through the mapping. Edges that collapse
/// onto an existing pair overwrite its attributes in edge order; edges whose
/// endpoints collapse onto one node are dropped. Donor nodes disappear and
/// their node attributes with them.
pub fn relabel(graph: &ConceptGraph, mapping: &NodeMapping) -> ConceptGraph {
    let mut out = ConceptGraph::new();
    for node in graph.concept_nodes() {
        match mapping.representative(&node.label) {
            Some(representative) => {
                out.add_node(representative);
            }
            None => out.add_node_with(&node.label, node.attributes.clone()),
        }
    }

    let mut dropped = 0usize;
    for edge in graph.edges() {
        let source = mapping.resolve(&edge.source);
        let target = mapping.resolve(&edge.target);
        if out.add_edge(source, target, edge.attributes).is_err() {
            dropped += 1;
        }
    }
    if dropped > 0 {
        tracing::debug!(dropped, "dropped edges collapsed onto a single node");
    }
    out
}

/// Merge nodes whose embeddings are more similar than `threshold`.
///
/// Fails with [`SimplifyError::InvalidThreshold`] for thresholds outside
/// `[0, 1]`, then with [`SimplifyError::MissingEmbedding`] if any graph node
/// lacks an embedding; nothing is computed in either case. The embedding
/// table is not updated: merged-away labels keep their stale entries.
pub fn simplify(
    graph: &ConceptGraph,
    embeddings: &EmbeddingTable,
    threshold: f64,
    batch_size: usize,
) -> SimplifyResult<ConceptGraph> {
    let mapping = merge_mapping(graph, embeddings, threshold, batch_size)?;
    let simplified = relabel(graph, &mapping);
    tracing::info!(
        before = graph.node_count(),
        after = simplified.node_count(),
        merged = mapping.len(),
        threshold,
        "simplified concept graph"
    );
    Ok(simplified)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::Embedding;
    use crate::graph::Attributes;
    use serde_json::json;

    fn attrs(title: &str) -> Attributes {
        Attributes::from([("title".to_string(), json!(title))])
    }

    fn table(entries: &[(&str, Vec<f32>)]) -> EmbeddingTable {
        let mut t = EmbeddingTable::new();
        for (label, v) in entries {
            t.insert(*label, Embedding::Flat(v.clone())).unwrap();
        }
        t
    }

    /// A, B, C with cos(A, B) = 0.97 and every other pair below 0.5.
    fn abc() -> (ConceptGraph, EmbeddingTable) {
        let mut g = ConceptGraph::new();
        g.add_edge("A", "B", attrs("ab")).unwrap();
        g.add_edge("B", "C", attrs("bc")).unwrap();
        let b_x = 0.97f32;
        let b_y = (1.0 - b_x * b_x).sqrt();
        let emb = table(&[
            ("A", vec![1.0, 0.0, 0.0]),
            ("B", vec![b_x, b_y, 0.0]),
            ("C", vec![0.0, 0.0, 1.0]),
        ]);
        (g, emb)
    }

    #[test]
    fn threshold_out_of_range_rejected() {
        let (g, emb) = abc();
        for t in [-0.01, 1.01, f64::NAN, f64::INFINITY] {
            let err = simplify(&g, &emb, t, 10).unwrap_err();
            assert!(matches!(err, SimplifyError::InvalidThreshold { .. }), "{t}");
        }
        assert!(GraphSimplifier::new(2.0).is_err());
    }

    #[test]
    fn threshold_checked_before_embeddings() {
        let (g, _) = abc();
        let err = simplify(&g, &EmbeddingTable::new(), 1.5, 10).unwrap_err();
        assert!(matches!(err, SimplifyError::InvalidThreshold { .. }));
    }

    #[test]
    fn missing_embedding_rejected() {
        let (g, mut emb) = abc();
        emb.retain(|l| l != "C");
        let err = simplify(&g, &emb, 0.9, 10).unwrap_err();
        match err {
            SimplifyError::MissingEmbedding { label, missing } => {
                assert_eq!(label, "C");
                assert_eq!(missing, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn zero_batch_size_rejected() {
        let (g, emb) = abc();
        assert!(matches!(
            simplify(&g, &emb, 0.9, 0),
            Err(SimplifyError::InvalidBatchSize)
        ));
        assert!(GraphSimplifier::default().with_batch_size(0).is_err());
    }

    #[test]
    fn near_duplicate_merges_into_earlier_node() {
        let (g, emb) = abc();
        let out = simplify(&g, &emb, 0.95, DEFAULT_BATCH_SIZE).unwrap();
        assert_eq!(out.nodes().collect::<Vec<_>>(), vec!["A", "C"]);
        assert_eq!(out.edge_count(), 1);
        assert!(out.has_edge("A", "C"));
        assert_eq!(out.edge_attributes("A", "C").unwrap()["title"], json!("bc"));
    }

    #[test]
    fn threshold_one_keeps_distinct_graph() {
        let (g, emb) = abc();
        let out = simplify(&g, &emb, 1.0, 2).unwrap();
        assert_eq!(out, g);
    }

    #[test]
    fn threshold_zero_collapses_positively_correlated_nodes() {
        let mut g = ConceptGraph::new();
        g.add_edge("p", "q", attrs("pq")).unwrap();
        g.add_edge("q", "r", attrs("qr")).unwrap();
        g.add_edge("r", "s", attrs("rs")).unwrap();
        let emb = table(&[
            ("p", vec![1.0, 0.2]),
            ("q", vec![0.9, 0.5]),
            ("r", vec![0.3, 1.0]),
            ("s", vec![0.5, 0.5]),
        ]);
        let out = simplify(&g, &emb, 0.0, 3).unwrap();
        assert_eq!(out.nodes().collect::<Vec<_>>(), vec!["p"]);
        assert_eq!(out.edge_count(), 0);
    }

    #[test]
    fn first_seen_wins_over_higher_similarity() {
        // d is closer to c than to a, but a comes first and is not a donor.
        let mut g = ConceptGraph::new();
        for l in ["a", "c", "d"] {
            g.add_node(l);
        }
        let emb = table(&[
            ("a", vec![1.0, 0.0]),
            ("c", vec![0.0, 1.0]),
            ("d", vec![0.6, 0.8]),
        ]);
        let mapping = merge_mapping(&g, &emb, 0.55, 1).unwrap();
        assert_eq!(mapping.iter().collect::<Vec<_>>(), vec![("d", "a")]);
    }

    #[test]
    fn merging_is_not_transitive() {
        // x~y and y~z but not x~z: y joins x, z stays because y is a donor.
        let mut g = ConceptGraph::new();
        g.add_edge("x", "y", attrs("xy")).unwrap();
        g.add_edge("y", "z", attrs("yz")).unwrap();
        let emb = table(&[
            ("x", vec![1.0, 0.0]),
            ("y", vec![0.8, 0.6]),
            ("z", vec![0.28, 0.96]),
        ]);
        let mapping = merge_mapping(&g, &emb, 0.75, 2).unwrap();
        assert_eq!(mapping.iter().collect::<Vec<_>>(), vec![("y", "x")]);
        let out = relabel(&g, &mapping);
        assert_eq!(out.nodes().collect::<Vec<_>>(), vec!["x", "z"]);
        assert!(out.has_edge("x", "z"));
    }

    #[test]
    fn batch_size_does_not_change_mapping() {
        let mut g = ConceptGraph::new();
        let mut entries = Vec::new();
        for i in 0..23u32 {
            let label = format!("n{i}");
            let angle = (i % 7) as f32 * 0.4 + (i / 7) as f32 * 0.05;
            entries.push((label.clone(), vec![angle.cos(), angle.sin(), 0.1]));
            g.add_node(&label);
            if i > 0 {
                g.add_edge(format!("n{}", i - 1), &label, attrs("next")).unwrap();
            }
        }
        let mut emb = EmbeddingTable::new();
        for (l, v) in entries {
            emb.insert(l, Embedding::Flat(v)).unwrap();
        }
        let reference = merge_mapping(&g, &emb, 0.97, 1000).unwrap();
        assert!(!reference.is_empty());
        for bs in [1, 2, 3, 5, 8, 22, 23] {
            assert_eq!(merge_mapping(&g, &emb, 0.97, bs).unwrap(), reference, "batch {bs}");
        }
        assert_eq!(
            simplify(&g, &emb, 0.97, 1).unwrap(),
            simplify(&g, &emb, 0.97, 1000).unwrap()
        );
    }

    #[test]
    fn mapping_ordered_by_donor_position() {
        // e ~ a and d ~ b; with two-node blocks the (b, d) block is visited
        // before the (a, e) block.
        let mut g = ConceptGraph::new();
        for l in ["a", "b", "c", "d", "e", "f"] {
            g.add_node(l);
        }
        let emb = table(&[
            ("a", vec![1.0, 0.0, 0.0, 0.0, 0.0]),
            ("b", vec![0.0, 1.0, 0.0, 0.0, 0.0]),
            ("c", vec![0.0, 0.0, 1.0, 0.0, 0.0]),
            ("d", vec![0.0, 1.0, 0.0, 0.0, 0.0]),
            ("e", vec![1.0, 0.0, 0.0, 0.0, 0.0]),
            ("f", vec![0.0, 0.0, 0.0, 0.0, 1.0]),
        ]);
        let reference = merge_mapping(&g, &emb, 0.9, 1000).unwrap();
        assert_eq!(reference.iter().collect::<Vec<_>>(), vec![("d", "b"), ("e", "a")]);
        for bs in 1..=7 {
            let mapping = merge_mapping(&g, &emb, 0.9, bs).unwrap();
            assert_eq!(mapping, reference, "batch {bs}");
            assert_eq!(mapping.representative("e"), Some("a"));
        }
    }

    #[test]
    fn representatives_are_never_donors() {
        let mut g = ConceptGraph::new();
        let mut emb = EmbeddingTable::new();
        for i in 0..12u32 {
            let label = format!("t{i}");
            g.add_node(&label);
            let angle = i as f32 * 0.15;
            emb.insert(label, Embedding::Flat(vec![angle.cos(), angle.sin()]))
                .unwrap();
        }
        let mapping = merge_mapping(&g, &emb, 0.95, 4).unwrap();
        let out = relabel(&g, &mapping);
        for (donor, representative) in mapping.iter() {
            assert_ne!(donor, representative);
            assert!(!mapping.is_donor(representative));
            assert!(out.has_node(representative));
            assert!(!out.has_node(donor));
        }
    }

    #[test]
    fn second_pass_is_a_no_op() {
        let (g, emb) = abc();
        let once = simplify(&g, &emb, 0.95, 2).unwrap();
        let twice = simplify(&once, &emb, 0.95, 2).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn batched_vectors_are_flattened() {
        let (g, _) = abc();
        let mut emb = EmbeddingTable::new();
        emb.insert("A", Embedding::Batched(vec![vec![1.0, 0.0]])).unwrap();
        emb.insert("B", Embedding::Batched(vec![vec![0.99, 0.05]])).unwrap();
        emb.insert("C", Embedding::Flat(vec![0.0, 1.0])).unwrap();
        let out = simplify(&g, &emb, 0.95, 1000).unwrap();
        assert_eq!(out.node_count(), 2);
    }

    #[test]
    fn input_graph_untouched() {
        let (g, emb) = abc();
        let before = g.clone();
        let _ = simplify(&g, &emb, 0.95, 1).unwrap();
        assert_eq!(g, before);
        assert_eq!(emb.len(), 3);
    }

    #[test]
    fn extra_embeddings_are_ignored() {
        let (g, mut emb) = abc();
        // An unrelated label identical to C must not become C's representative.
        let mut reordered = EmbeddingTable::new();
        reordered.insert("ghost", Embedding::Flat(vec![0.0, 0.0, 1.0])).unwrap();
        reordered.extend_from(&emb).unwrap();
        emb = reordered;
        let out = simplify(&g, &emb, 0.95, 1000).unwrap();
        assert!(out.has_node("C"));
        assert!(!out.has_node("ghost"));
    }

    #[test]
    fn collapsed_edges_keep_later_attributes() {
        // a-x and b-x collapse onto a-x once b merges into a.
        let mut g = ConceptGraph::new();
        g.add_edge("a", "x", attrs("first")).unwrap();
        g.add_edge("b", "x", attrs("second")).unwrap();
        let mut mapping = NodeMapping::new();
        mapping.insert("b", "a");
        let out = relabel(&g, &mapping);
        assert_eq!(out.edge_count(), 1);
        assert_eq!(out.edge_attributes("a", "x").unwrap()["title"], json!("second"));
    }

    #[test]
    fn mapping_first_insert_wins() {
        let mut m = NodeMapping::new();
        assert!(m.insert("b", "a"));
        assert!(!m.insert("b", "c"));
        assert_eq!(m.representative("b"), Some("a"));
        assert_eq!(m.resolve("z"), "z");
    }
}
