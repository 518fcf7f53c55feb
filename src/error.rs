//! Rich diagnostic error types for concept-graph.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes, help text, and source chains so callers know exactly
//! what went wrong and how to fix it.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the crate.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain (error codes, help text) through to the caller.
#[derive(Debug, Error, Diagnostic)]
pub enum ConceptGraphError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Simplify(#[from] SimplifyError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Export(#[from] ExportError),
}

// ---------------------------------------------------------------------------
// Simplification errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum SimplifyError {
    #[error("similarity threshold must be between 0 and 1, got {threshold}")]
    #[diagnostic(
        code(cg::simplify::invalid_threshold),
        help(
            "Cosine similarity is compared against a threshold in [0.0, 1.0]. \
             Use 1.0 to disable merging and values around 0.9 for near-duplicates."
        )
    )]
    InvalidThreshold { threshold: f64 },

    #[error("missing embeddings for {missing} node(s), first: \"{label}\"")]
    #[diagnostic(
        code(cg::simplify::missing_embedding),
        help(
            "Every graph node needs an embedding before simplification. \
             Generate embeddings for the current node set, or drop the nodes first."
        )
    )]
    MissingEmbedding { label: String, missing: usize },

    #[error("similarity batch size must be positive")]
    #[diagnostic(
        code(cg::simplify::invalid_batch_size),
        help("The batch size bounds the pairwise similarity block; use the default of 1000.")
    )]
    InvalidBatchSize,
}

// ---------------------------------------------------------------------------
// Embedding errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum EmbeddingError {
    #[error("dimension mismatch for \"{label}\": expected {expected}, got {actual}")]
    #[diagnostic(
        code(cg::embedding::dim_mismatch),
        help(
            "All vectors in an embedding table must flatten to the same dimension. \
             Check that every label was embedded with the same model."
        )
    )]
    DimensionMismatch {
        label: String,
        expected: usize,
        actual: usize,
    },

    #[error("empty embedding vector for \"{label}\"")]
    #[diagnostic(
        code(cg::embedding::empty_vector),
        help("The embedding backend returned a zero-length vector for this label.")
    )]
    EmptyVector { label: String },

    #[error("embedding backend returned {returned} vectors for {requested} labels")]
    #[diagnostic(
        code(cg::embedding::count_mismatch),
        help("An embedder must return exactly one vector per input label, in order.")
    )]
    CountMismatch { requested: usize, returned: usize },

    #[error("embedding backend failed: {message}")]
    #[diagnostic(
        code(cg::embedding::backend),
        help("The embedding model could not process the batch. Check the model is loaded.")
    )]
    Backend { message: String },

    #[error("no embedding for \"{label}\"")]
    #[diagnostic(
        code(cg::embedding::not_found),
        help("Generate embeddings for the graph before running embedding-guided operations.")
    )]
    NotFound { label: String },
}

// ---------------------------------------------------------------------------
// Graph errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum GraphError {
    #[error("node not found: \"{label}\"")]
    #[diagnostic(
        code(cg::graph::node_not_found),
        help("The label has no node in this graph. Add an edge or node containing it first.")
    )]
    NodeNotFound { label: String },

    #[error("self-loop on \"{label}\" is not allowed")]
    #[diagnostic(
        code(cg::graph::self_loop),
        help("Concept graphs relate distinct terms; an edge needs two different endpoints.")
    )]
    SelfLoop { label: String },
}

// ---------------------------------------------------------------------------
// Extraction errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ExtractError {
    #[error("text input must be a non-empty string")]
    #[diagnostic(
        code(cg::extract::empty_text),
        help("Pass the document body to extract ontology terms from.")
    )]
    EmptyText,

    #[error("graph root must be a non-empty string")]
    #[diagnostic(
        code(cg::extract::empty_graph_root),
        help("The graph root names the output files, e.g. \"silk_review\".")
    )]
    EmptyGraphRoot,

    #[error("failed to decode JSON response from the language model: {message}")]
    #[diagnostic(
        code(cg::extract::invalid_json),
        help(
            "The model must answer with a JSON object holding an `edges` list, \
             or a JSON list of node_1/node_2/edge triplets."
        )
    )]
    InvalidJson { message: String },

    #[error("invalid graph data format: missing 'edges' key")]
    #[diagnostic(
        code(cg::extract::missing_edges),
        help("Wrap the extracted relations as {{\"edges\": [...]}}.")
    )]
    MissingEdges,

    #[error("invalid edge #{index}: {message}")]
    #[diagnostic(
        code(cg::extract::invalid_edge),
        help("Each edge needs `source`, `target` and an `attributes` object.")
    )]
    InvalidEdge { index: usize, message: String },

    #[error("text generation failed: {message}")]
    #[diagnostic(
        code(cg::extract::generation),
        help("The language model backend did not return a response for this chunk.")
    )]
    Generation { message: String },
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("chunk_size must be positive")]
    #[diagnostic(code(cg::config::chunk_size), help("Use the default of 2500 characters."))]
    InvalidChunkSize,

    #[error("chunk_overlap ({overlap}) must be smaller than chunk_size ({chunk_size})")]
    #[diagnostic(
        code(cg::config::chunk_overlap),
        help("Overlap is carried from one chunk into the next; keep it below the chunk size.")
    )]
    InvalidChunkOverlap { overlap: usize, chunk_size: usize },

    #[error("similarity_threshold must be between 0 and 1, got {threshold}")]
    #[diagnostic(code(cg::config::threshold), help("The default is 0.95."))]
    InvalidThreshold { threshold: f64 },

    #[error("{field} must be positive")]
    #[diagnostic(code(cg::config::batch_size), help("Batch sizes bound memory use; zero never makes progress."))]
    InvalidBatchSize { field: &'static str },

    #[error("failed to read config: {path}")]
    #[diagnostic(code(cg::config::read), help("Check that the file exists and is readable."))]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {message}")]
    #[diagnostic(code(cg::config::parse), help("The config file must be valid TOML."))]
    Parse { path: String, message: String },

    #[error("failed to write config: {path}")]
    #[diagnostic(code(cg::config::write), help("Check write permissions on the target directory."))]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Export errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ExportError {
    #[error("I/O error writing {path}")]
    #[diagnostic(
        code(cg::export::io),
        help(
            "A filesystem operation failed. Check that the output directory exists, \
             has correct permissions, and that the disk is not full."
        )
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {message}")]
    #[diagnostic(
        code(cg::export::serde),
        help("Failed to serialize or deserialize data. The file may be truncated or hand-edited.")
    )]
    Serialization { message: String },
}

/// Convenience result type for crate-level operations.
pub type CgResult<T> = std::result::Result<T, ConceptGraphError>;
