//! Node embeddings: vectors, the ordered embedding table, and batched generation.
//!
//! Embeddings come from an external model behind the [`Embedder`] trait. A
//! vector may arrive with an extra leading axis (`[[...]]`, an artifact of
//! batched inference); every comparison works on the flattened form.

pub mod similarity;

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{EmbeddingError, ExportError};
use crate::graph::ConceptGraph;

pub use similarity::{cosine_similarity, SimilarityBlock};

/// Result type for embedding operations.
pub type EmbeddingResult<T> = std::result::Result<T, EmbeddingError>;

/// A fixed-length real vector for one node label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Embedding {
    /// Plain 1-D vector.
    Flat(Vec<f32>),
    /// Vector wrapped in a leading batch axis.
    Batched(Vec<Vec<f32>>),
}

impl Embedding {
    /// Flattened view, borrowing when already 1-D.
    pub fn as_flat(&self) -> Cow<'_, [f32]> {
        match self {
            Embedding::Flat(v) => Cow::Borrowed(v.as_slice()),
            Embedding::Batched(rows) if rows.len() == 1 => Cow::Borrowed(rows[0].as_slice()),
            Embedding::Batched(rows) => Cow::Owned(rows.iter().flatten().copied().collect()),
        }
    }

    /// Consume into a flattened vector.
    pub fn into_flat(self) -> Vec<f32> {
        match self {
            Embedding::Flat(v) => v,
            Embedding::Batched(rows) => rows.into_iter().flatten().collect(),
        }
    }

    /// Length of the flattened vector.
    pub fn dim(&self) -> usize {
        match self {
            Embedding::Flat(v) => v.len(),
            Embedding::Batched(rows) => rows.iter().map(Vec::len).sum(),
        }
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(v: Vec<f32>) -> Self {
        Embedding::Flat(v)
    }
}

/// External embedding capability.
///
/// Must return one vector per label, in input order, deterministically for a
/// given model version.
pub trait Embedder {
    fn embed_batch(&self, labels: &[String]) -> EmbeddingResult<Vec<Embedding>>;

    /// Model identifier, for logging.
    fn model_name(&self) -> &str {
        "unknown"
    }
}

/// Insertion-ordered mapping from node label to embedding.
///
/// All vectors flatten to the same dimension; the first insert fixes it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmbeddingTable {
    entries: Vec<(String, Embedding)>,
    index: HashMap<String, usize>,
    dim: Option<usize>,
}

impl EmbeddingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the vector for `label`.
    ///
    /// Replacing keeps the label's original position in the order.
    pub fn insert(&mut self, label: impl Into<String>, embedding: Embedding) -> EmbeddingResult<()> {
        let label = label.into();
        let actual = embedding.dim();
        if actual == 0 {
            return Err(EmbeddingError::EmptyVector { label });
        }
        match self.dim {
            Some(expected) if expected != actual => {
                return Err(EmbeddingError::DimensionMismatch {
                    label,
                    expected,
                    actual,
                });
            }
            _ => self.dim = Some(actual),
        }
        match self.index.get(&label) {
            Some(&pos) => self.entries[pos].1 = embedding,
            None => {
                self.index.insert(label.clone(), self.entries.len());
                self.entries.push((label, embedding));
            }
        }
        Ok(())
    }

    pub fn get(&self, label: &str) -> Option<&Embedding> {
        self.index.get(label).map(|&pos| &self.entries[pos].1)
    }

    /// Like [`get`](Self::get) but fails with [`EmbeddingError::NotFound`].
    pub fn require(&self, label: &str) -> EmbeddingResult<&Embedding> {
        self.get(label).ok_or_else(|| EmbeddingError::NotFound {
            label: label.to_string(),
        })
    }

    pub fn contains(&self, label: &str) -> bool {
        self.index.contains_key(label)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Flattened dimension shared by all vectors, once known.
    pub fn dim(&self) -> Option<usize> {
        self.dim
    }

    /// Labels in insertion order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(l, _)| l.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Embedding)> {
        self.entries.iter().map(|(l, e)| (l.as_str(), e))
    }

    /// Keep only entries whose label satisfies `keep`, preserving order.
    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&str) -> bool,
    {
        self.entries.retain(|(l, _)| keep(l));
        self.index = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, (l, _))| (l.clone(), i))
            .collect();
        if self.entries.is_empty() {
            self.dim = None;
        }
    }

    /// Insert every entry of `other`; its vectors replace existing ones.
    pub fn extend_from(&mut self, other: &EmbeddingTable) -> EmbeddingResult<()> {
        for (label, embedding) in other.iter() {
            self.insert(label, embedding.clone())?;
        }
        Ok(())
    }

    /// Write the table as a pretty JSON object (label → list), in order.
    pub fn save(&self, path: &Path) -> Result<(), ExportError> {
        let json = serde_json::to_string_pretty(self).map_err(|e| ExportError::Serialization {
            message: format!("failed to serialize embeddings: {e}"),
        })?;
        std::fs::write(path, json).map_err(|source| ExportError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    /// Read a table written by [`save`](Self::save).
    pub fn load(path: &Path) -> Result<Self, ExportError> {
        let content = std::fs::read_to_string(path).map_err(|source| ExportError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|e| ExportError::Serialization {
            message: format!("failed to parse embeddings {}: {e}", path.display()),
        })
    }
}

impl Serialize for EmbeddingTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (label, embedding) in &self.entries {
            map.serialize_entry(label, embedding)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for EmbeddingTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TableVisitor;

        impl<'de> Visitor<'de> for TableVisitor {
            type Value = EmbeddingTable;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of label to embedding vector")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut table = EmbeddingTable::new();
                while let Some((label, embedding)) = access.next_entry::<String, Embedding>()? {
                    table
                        .insert(label, embedding)
                        .map_err(<A::Error as serde::de::Error>::custom)?;
                }
                Ok(table)
            }
        }

        deserializer.deserialize_map(TableVisitor)
    }
}

/// Embed every node of `graph` in batches of `batch_size`.
///
/// A batch the backend fails on is logged and skipped, leaving its nodes
/// without embeddings; a batch returning the wrong number of vectors is an error.
pub fn generate_node_embeddings(
    graph: &ConceptGraph,
    embedder: &dyn Embedder,
    batch_size: usize,
) -> EmbeddingResult<EmbeddingTable> {
    let batch_size = batch_size.max(1);
    let nodes: Vec<String> = graph.nodes().map(str::to_string).collect();
    let mut table = EmbeddingTable::new();

    for (batch_no, batch) in nodes.chunks(batch_size).enumerate() {
        let vectors = match embedder.embed_batch(batch) {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(batch = batch_no, error = %e, "embedding batch failed, skipping");
                continue;
            }
        };
        if vectors.len() != batch.len() {
            return Err(EmbeddingError::CountMismatch {
                requested: batch.len(),
                returned: vectors.len(),
            });
        }
        for (label, embedding) in batch.iter().zip(vectors) {
            table.insert(label.clone(), embedding)?;
        }
    }

    tracing::debug!(
        model = embedder.model_name(),
        nodes = nodes.len(),
        embedded = table.len(),
        "generated node embeddings"
    );
    Ok(table)
}

/// Cosine similarity between the embeddings of two texts.
pub fn compare(embedder: &dyn Embedder, a: &str, b: &str) -> EmbeddingResult<f64> {
    let vectors = embedder.embed_batch(&[a.to_string(), b.to_string()])?;
    match vectors.as_slice() {
        [ea, eb] => Ok(cosine_similarity(&ea.as_flat(), &eb.as_flat())),
        other => Err(EmbeddingError::CountMismatch {
            requested: 2,
            returned: other.len(),
        }),
    }
}
