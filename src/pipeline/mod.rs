//! Text-to-knowledge-graph pipeline.
//!
//! Stages run in a fixed order: markdown stripping, chunking and extraction,
//! node embedding, deduplication, component pruning, community detection,
//! analysis, and finally persistence of the graph and its embeddings.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::GraphConfig;
use crate::embedding::{generate_node_embeddings, Embedder, EmbeddingTable};
use crate::error::{CgResult, ConfigError, ExtractError};
use crate::export::{save_embeddings, save_graphml};
use crate::extract::TextGenerator;
use crate::graph::analytics::{analyze, giant_component, remove_small_components, GraphStats};
use crate::graph::community::assign_communities;
use crate::graph::ConceptGraph;
use crate::text::{safe_filename, strip_markdown, MarkdownOptions};

/// Everything produced by one [`KnowledgeGraphBuilder::build_graph_from_text`] run.
#[derive(Debug, Clone)]
pub struct BuildOutput {
    /// The simplified graph with community attributes assigned.
    pub graph: ConceptGraph,
    /// Embeddings of the nodes remaining in `graph`.
    pub embeddings: EmbeddingTable,
    pub stats: BuildStats,
    /// Where the GraphML file was written.
    pub graph_path: PathBuf,
    /// Where the embeddings JSON was written.
    pub embeddings_path: PathBuf,
}

/// Per-stage node counts plus final graph statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildStats {
    /// Text chunks sent to the generator.
    pub chunks: usize,
    /// Nodes in the raw extracted graph.
    pub extracted_nodes: usize,
    /// Nodes left after merging near-duplicates.
    pub simplified_nodes: usize,
    /// Communities found in the final graph.
    pub communities: usize,
    /// Statistics of the final graph.
    pub graph: GraphStats,
}

/// Builds, refines and saves knowledge graphs under one output directory.
#[derive(Debug, Clone)]
pub struct KnowledgeGraphBuilder {
    config: GraphConfig,
    output_dir: PathBuf,
}

impl KnowledgeGraphBuilder {
    /// Validate `config` and create `output_dir` if needed.
    pub fn new(config: GraphConfig, output_dir: impl Into<PathBuf>) -> CgResult<Self> {
        config.validate()?;
        let output_dir = output_dir.into();
        std::fs::create_dir_all(&output_dir).map_err(|source| ConfigError::Write {
            path: output_dir.display().to_string(),
            source,
        })?;
        Ok(Self { config, output_dir })
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Paths the graph and embeddings for `graph_root` are written to.
    pub fn output_paths(&self, graph_root: &str) -> (PathBuf, PathBuf) {
        let root = safe_filename(graph_root);
        (
            self.output_dir.join(format!("{root}_graph.graphml")),
            self.output_dir.join(format!("{root}_embeddings.json")),
        )
    }

    /// Run the full pipeline over `text` and save the results.
    pub fn build_graph_from_text(
        &self,
        text: &str,
        generator: &dyn TextGenerator,
        embedder: &dyn Embedder,
        graph_root: &str,
    ) -> CgResult<BuildOutput> {
        if text.trim().is_empty() {
            return Err(ExtractError::EmptyText.into());
        }
        if safe_filename(graph_root).trim().is_empty() {
            return Err(ExtractError::EmptyGraphRoot.into());
        }
        let cfg = &self.config;

        let text = if cfg.strip_markdown {
            strip_markdown(text, &MarkdownOptions::default())
        } else {
            text.to_string()
        };
        let extractor = cfg.extractor();
        let chunks = crate::text::split_text(&text, cfg.chunk_size, cfg.chunk_overlap).len();
        let mut graph = extractor.extract(&text, generator)?;
        let extracted_nodes = graph.node_count();
        tracing::info!(
            root = graph_root,
            chunks,
            nodes = extracted_nodes,
            edges = graph.edge_count(),
            "extracted graph"
        );

        let mut embeddings =
            generate_node_embeddings(&graph, embedder, cfg.embedding_batch_size)?;

        if cfg.simplify {
            graph = cfg.simplifier()?.simplify(&graph, &embeddings)?;
        }
        let simplified_nodes = graph.node_count();

        if cfg.size_threshold > 0 {
            graph = remove_small_components(&graph, cfg.size_threshold);
        }
        if cfg.giant_component_only {
            graph = giant_component(&graph);
        }
        embeddings.retain(|label| graph.has_node(label));

        let communities = if cfg.detect_communities {
            assign_communities(&mut graph)
        } else {
            0
        };
        let stats = BuildStats {
            chunks,
            extracted_nodes,
            simplified_nodes,
            communities,
            graph: analyze(&graph),
        };

        let (graph_path, embeddings_path) = self.output_paths(graph_root);
        save_graphml(&graph, &graph_path)?;
        save_embeddings(&embeddings, &embeddings_path)?;

        tracing::info!(
            root = graph_root,
            extracted = stats.extracted_nodes,
            simplified = stats.simplified_nodes,
            nodes = stats.graph.num_nodes,
            communities = stats.communities,
            "built knowledge graph"
        );

        Ok(BuildOutput {
            graph,
            embeddings,
            stats,
            graph_path,
            embeddings_path,
        })
    }
}
