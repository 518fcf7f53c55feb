//! End-to-end integration tests for concept-graph.
//!
//! These tests drive the full pipeline from raw text through extraction,
//! embedding, deduplication and export, using in-process stand-ins for the
//! language model and the embedding model.

use std::collections::{BTreeMap, HashMap};

use concept_graph::config::GraphConfig;
use concept_graph::embedding::{Embedder, Embedding, EmbeddingResult, EmbeddingTable};
use concept_graph::error::{ConceptGraphError, ExtractError, SimplifyError};
use concept_graph::extract::{ExtractResult, TextGenerator};
use concept_graph::graph::merge::{CumulativeGraph, Relationship};
use concept_graph::graph::simplify::GraphSimplifier;
use concept_graph::graph::traverse::heuristic_path;
use concept_graph::graph::{Attributes, ConceptGraph};
use concept_graph::pipeline::KnowledgeGraphBuilder;

/// Answers every chunk with ontology triplets for "X relates Y" lines.
struct TripletModel;

impl TextGenerator for TripletModel {
    fn generate_text(&self, _system: &str, chunk: &str) -> ExtractResult<String> {
        let triplets: Vec<String> = chunk
            .lines()
            .filter_map(|line| {
                let mut parts = line.split(" relates ");
                Some((parts.next()?.trim(), parts.next()?.trim()))
            })
            .map(|(a, b)| format!(r#"{{"node_1": "{a}", "node_2": "{b}", "edge": "relates"}}"#))
            .collect();
        Ok(format!("Sure! Here are the terms:\n[{}]", triplets.join(",\n")))
    }
}

/// Looks vectors up in a fixed table; unknown labels get an orthogonal axis.
struct TableModel {
    vectors: HashMap<String, Vec<f32>>,
}

impl Embedder for TableModel {
    fn embed_batch(&self, labels: &[String]) -> EmbeddingResult<Vec<Embedding>> {
        Ok(labels
            .iter()
            .map(|l| {
                let v = self.vectors.get(l).cloned().unwrap_or_else(|| {
                    let mut v = vec![0.0; 16];
                    v[l.len() % 16] = 1.0;
                    v
                });
                Embedding::Flat(v)
            })
            .collect())
    }

    fn model_name(&self) -> &str {
        "table"
    }
}

fn unit(axis: usize) -> Vec<f32> {
    let mut v = vec![0.0; 16];
    v[axis] = 1.0;
    v
}

fn scenario_embeddings() -> EmbeddingTable {
    // cos(A, B) = 0.97; C orthogonal to both.
    let mut t = EmbeddingTable::new();
    t.insert("A", Embedding::Flat(vec![1.0, 0.0, 0.0])).unwrap();
    t.insert("B", Embedding::Flat(vec![0.97, (1.0f32 - 0.97 * 0.97).sqrt(), 0.0]))
        .unwrap();
    t.insert("C", Embedding::Flat(vec![0.0, 0.0, 1.0])).unwrap();
    t
}

fn chain() -> ConceptGraph {
    let mut g = ConceptGraph::new();
    g.add_edge("A", "B", Attributes::new()).unwrap();
    g.add_edge("B", "C", Attributes::new()).unwrap();
    g
}

#[test]
fn near_duplicate_collapses_into_first_seen() {
    let simplified = GraphSimplifier::new(0.95)
        .unwrap()
        .simplify(&chain(), &scenario_embeddings())
        .unwrap();

    assert_eq!(simplified.nodes().collect::<Vec<_>>(), vec!["A", "C"]);
    assert_eq!(simplified.edge_count(), 1);
    assert!(simplified.has_edge("A", "C"));
}

#[test]
fn result_independent_of_batch_size() {
    let g = chain();
    let t = scenario_embeddings();
    let reference = GraphSimplifier::new(0.95).unwrap().simplify(&g, &t).unwrap();
    for batch in [1, 2, 3, 1000] {
        let s = GraphSimplifier::new(0.95)
            .unwrap()
            .with_batch_size(batch)
            .unwrap()
            .simplify(&g, &t)
            .unwrap();
        assert_eq!(s, reference, "batch size {batch}");
    }
}

#[test]
fn missing_embedding_computes_nothing() {
    let mut t = scenario_embeddings();
    t.retain(|l| l != "C");
    let err = GraphSimplifier::new(0.95)
        .unwrap()
        .simplify(&chain(), &t)
        .unwrap_err();
    assert!(matches!(err, SimplifyError::MissingEmbedding { ref label, missing: 1 } if label == "C"));
}

#[test]
fn end_to_end_text_to_graph() {
    let dir = tempfile::TempDir::new().unwrap();
    let text = "# Notes\n\
                spider silk relates strength\n\
                silk fibre relates toughness\n\
                strength relates toughness\n";

    let model = TableModel {
        vectors: HashMap::from([
            ("spider silk".to_string(), unit(0)),
            ("silk fibre".to_string(), {
                let mut v = unit(0);
                v[1] = 0.1;
                v
            }),
            ("strength".to_string(), unit(2)),
            ("toughness".to_string(), unit(3)),
        ]),
    };

    let builder = KnowledgeGraphBuilder::new(GraphConfig::default(), dir.path()).unwrap();
    let out = builder
        .build_graph_from_text(text, &TripletModel, &model, "Spider Silk")
        .unwrap();

    assert_eq!(out.stats.extracted_nodes, 4);
    assert_eq!(out.stats.simplified_nodes, 3);
    assert!(!out.graph.has_node("silk fibre"));
    assert!(out.graph.has_edge("spider silk", "toughness"));
    assert!(out.graph.has_edge("strength", "toughness"));
    assert_eq!(out.stats.graph.num_nodes, 3);
    assert_eq!(out.stats.graph.connected_components, 1);
    assert!(out.stats.communities >= 1);

    // Triplets carry title and count-based weight.
    let attrs = out.graph.edge_attributes("strength", "toughness").unwrap();
    assert_eq!(attrs["title"], serde_json::json!("relates"));
    assert_eq!(attrs["weight"], serde_json::json!(0.25));

    assert!(out.graph_path.ends_with("Spider_Silk_graph.graphml"));
    let xml = std::fs::read_to_string(&out.graph_path).unwrap();
    assert!(xml.contains(r#"attr.name="community""#));

    let saved = EmbeddingTable::load(&out.embeddings_path).unwrap();
    assert_eq!(saved.len(), 3);
    assert!(saved.contains("spider silk"));

    let path = heuristic_path(&out.graph, &out.embeddings, "spider silk", "strength").unwrap();
    assert_eq!(path.first().map(String::as_str), Some("spider silk"));
    assert_eq!(path.last().map(String::as_str), Some("strength"));
}

#[test]
fn generator_failure_surfaces_when_nothing_extracted() {
    let dir = tempfile::TempDir::new().unwrap();
    let builder = KnowledgeGraphBuilder::new(GraphConfig::default(), dir.path()).unwrap();
    let refuse = |_: &str, _: &str| -> ExtractResult<String> { Ok("I'd rather not.".into()) };
    let model = TableModel {
        vectors: HashMap::new(),
    };
    let err = builder
        .build_graph_from_text("silk relates web", &refuse, &model, "g")
        .unwrap_err();
    assert!(matches!(err, ConceptGraphError::Extract(ExtractError::InvalidJson { .. })));
}

#[test]
fn cumulative_graph_over_turns() {
    let mut cumulative = CumulativeGraph::new(GraphSimplifier::new(0.95).unwrap());
    let t = scenario_embeddings();

    let mut first = ConceptGraph::new();
    first.add_edge("A", "C", Attributes::new()).unwrap();
    let mut first_t = EmbeddingTable::new();
    for l in ["A", "C"] {
        first_t.insert(l, t.get(l).unwrap().clone()).unwrap();
    }
    cumulative.absorb(&first, &first_t).unwrap();

    // Ontologist adds a definition and a relationship for B.
    cumulative
        .add_concepts(
            &BTreeMap::from([("B".to_string(), "almost A".to_string())]),
            &[Relationship {
                source: "B".into(),
                target: "C".into(),
                relationship: None,
            }],
        )
        .unwrap();
    assert_eq!(cumulative.unembedded(), vec!["B"]);

    let mut second_t = EmbeddingTable::new();
    second_t.insert("B", t.get("B").unwrap().clone()).unwrap();
    let report = cumulative.absorb(&ConceptGraph::new(), &second_t).unwrap();

    assert_eq!(report.turn, 2);
    assert_eq!(report.merged(), 1);
    assert_eq!(cumulative.graph().nodes().collect::<Vec<_>>(), vec!["A", "C"]);
    assert!(cumulative.unembedded().is_empty());
}
