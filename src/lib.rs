// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # concept-graph
//!
//! Knowledge graphs of scientific concepts, extracted from text by a language
//! model and deduplicated by embedding similarity.
//!
//! ## Architecture
//!
//! - **Concept graph** (`graph`): Undirected, label-keyed petgraph with JSON attributes
//! - **Simplification** (`graph::simplify`): Blocked cosine comparison merging near-duplicate nodes
//! - **Embeddings** (`embedding`): Ordered label → vector table behind a pluggable `Embedder`
//! - **Extraction** (`extract`): Chunked prompting of a `TextGenerator` and JSON response parsing
//! - **Pipeline** (`pipeline`): Extract → embed → simplify → prune → communities → GraphML
//!
//! ## Library usage
//!
//! ```
//! use concept_graph::embedding::{Embedding, EmbeddingTable};
//! use concept_graph::graph::simplify::GraphSimplifier;
//! use concept_graph::graph::{Attributes, ConceptGraph};
//!
//! let mut graph = ConceptGraph::new();
//! graph.add_edge("spider silk", "strength", Attributes::new()).unwrap();
//! graph.add_edge("silk fibre", "toughness", Attributes::new()).unwrap();
//!
//! let mut embeddings = EmbeddingTable::new();
//! embeddings.insert("spider silk", Embedding::Flat(vec![1.0, 0.0, 0.0])).unwrap();
//! embeddings.insert("strength", Embedding::Flat(vec![0.0, 1.0, 0.0])).unwrap();
//! embeddings.insert("silk fibre", Embedding::Flat(vec![0.99, 0.05, 0.0])).unwrap();
//! embeddings.insert("toughness", Embedding::Flat(vec![0.0, 0.0, 1.0])).unwrap();
//!
//! let simplified = GraphSimplifier::new(0.95).unwrap().simplify(&graph, &embeddings).unwrap();
//! assert_eq!(simplified.node_count(), 3);
//! assert!(simplified.has_edge("spider silk", "toughness"));
//! ```

pub mod config;
pub mod embedding;
pub mod error;
pub mod export;
pub mod extract;
pub mod graph;
pub mod pipeline;
pub mod text;
