//! Knowledge-graph build configuration.
//!
//! Persisted as TOML. Every field has a default, so a config file only needs
//! the values it changes.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::extract::GraphExtractor;
use crate::graph::simplify::{GraphSimplifier, DEFAULT_BATCH_SIZE};

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Settings for [`KnowledgeGraphBuilder`](crate::pipeline::KnowledgeGraphBuilder).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Characters per text chunk sent to the generator.
    pub chunk_size: usize,
    /// Characters shared by consecutive chunks.
    pub chunk_overlap: usize,
    /// Cosine similarity above which two nodes are merged.
    pub similarity_threshold: f64,
    /// Nodes per block in pairwise similarity computation.
    pub similarity_batch_size: usize,
    /// Labels per embedding backend call.
    pub embedding_batch_size: usize,
    pub system_prompt: String,
    /// Embedding model name, recorded for provenance only.
    pub model_name: String,
    /// Merge near-duplicate nodes after extraction.
    pub simplify: bool,
    /// Drop connected components with fewer nodes than this (0 disables).
    pub size_threshold: usize,
    /// Keep only the largest connected component.
    pub giant_component_only: bool,
    /// Annotate nodes with a `community` attribute.
    pub detect_communities: bool,
    /// Remove markdown formatting before chunking.
    pub strip_markdown: bool,
}

fn default_system_prompt() -> String {
    "Extract ontology terms and identify their relationships.".into()
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            chunk_size: 2500,
            chunk_overlap: 0,
            similarity_threshold: 0.95,
            similarity_batch_size: DEFAULT_BATCH_SIZE,
            embedding_batch_size: 32,
            system_prompt: default_system_prompt(),
            model_name: "bert-base-uncased".into(),
            simplify: true,
            size_threshold: 0,
            giant_component_only: false,
            detect_communities: true,
            strip_markdown: true,
        }
    }
}

impl GraphConfig {
    /// Check value ranges.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.chunk_size == 0 {
            return Err(ConfigError::InvalidChunkSize);
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ConfigError::InvalidChunkOverlap {
                overlap: self.chunk_overlap,
                chunk_size: self.chunk_size,
            });
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(ConfigError::InvalidThreshold {
                threshold: self.similarity_threshold,
            });
        }
        if self.similarity_batch_size == 0 {
            return Err(ConfigError::InvalidBatchSize {
                field: "similarity_batch_size",
            });
        }
        if self.embedding_batch_size == 0 {
            return Err(ConfigError::InvalidBatchSize {
                field: "embedding_batch_size",
            });
        }
        Ok(())
    }

    /// Simplifier configured with this threshold and batch size.
    pub fn simplifier(&self) -> ConfigResult<GraphSimplifier> {
        let invalid_threshold = || ConfigError::InvalidThreshold {
            threshold: self.similarity_threshold,
        };
        GraphSimplifier::new(self.similarity_threshold)
            .map_err(|_| invalid_threshold())?
            .with_batch_size(self.similarity_batch_size)
            .map_err(|_| ConfigError::InvalidBatchSize {
                field: "similarity_batch_size",
            })
    }

    /// Extractor using this prompt and chunking.
    pub fn extractor(&self) -> GraphExtractor {
        GraphExtractor {
            system_prompt: self.system_prompt.clone(),
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
        }
    }

    /// Load from a TOML file and validate.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save to a TOML file, creating parent directories.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        std::fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.display().to_string(),
            source: e,
        })
    }
}
