//! Graph extraction from free text via a language model.
//!
//! The model is an external collaborator behind [`TextGenerator`]. Its answer
//! is expected in one of two JSON shapes:
//!
//! - `{"edges": [{"source": .., "target": .., "attributes": {..}}, ..]}`
//! - `[{"node_1": .., "node_2": .., "edge": ..}, ..]` (ontology triplets)
//!
//! Responses are often wrapped in Markdown code fences or surrounded by prose;
//! [`clean_response`] cuts out the JSON payload before parsing.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::error::ExtractError;
use crate::graph::{Attributes, ConceptGraph};
use crate::text::split_text;

/// Result type for extraction.
pub type ExtractResult<T> = std::result::Result<T, ExtractError>;

/// External text-generation capability.
pub trait TextGenerator {
    fn generate_text(&self, system_prompt: &str, user_prompt: &str) -> ExtractResult<String>;
}

impl<F> TextGenerator for F
where
    F: Fn(&str, &str) -> ExtractResult<String>,
{
    fn generate_text(&self, system_prompt: &str, user_prompt: &str) -> ExtractResult<String> {
        self(system_prompt, user_prompt)
    }
}

/// Cut the outermost JSON object or array out of a model response.
///
/// Starts at whichever bracket kind appears first. Returns the trimmed input
/// unchanged when no bracket pair is found.
pub fn clean_response(raw: &str) -> &str {
    json_candidates(raw.trim())
        .into_iter()
        .next()
        .unwrap_or_else(|| raw.trim())
}

/// Object and array spans (first opening to last closing bracket), earliest
/// start first.
fn json_candidates(text: &str) -> Vec<&str> {
    let mut spans: Vec<(usize, &str)> = [('{', '}'), ('[', ']')]
        .into_iter()
        .filter_map(|(open, close)| {
            let start = text.find(open)?;
            let end = text.rfind(close)?;
            (end > start).then(|| (start, &text[start..=end]))
        })
        .collect();
    spans.sort_by_key(|(start, _)| *start);
    spans.into_iter().map(|(_, span)| span).collect()
}

/// Parse a model response into a concept graph.
///
/// Prose around the payload may itself contain brackets, so when the earliest
/// span is not valid JSON the span of the other bracket kind is tried.
pub fn parse_graph_components(raw: &str) -> ExtractResult<ConceptGraph> {
    let trimmed = raw.trim();
    let mut candidates = json_candidates(trimmed);
    if candidates.is_empty() {
        candidates.push(trimmed);
    }

    let mut first_error = None;
    for candidate in candidates {
        match serde_json::from_str::<Value>(candidate) {
            Ok(value) => return graph_from_value(value),
            Err(e) => {
                first_error.get_or_insert(e.to_string());
            }
        }
    }
    Err(ExtractError::InvalidJson {
        message: first_error.unwrap_or_default(),
    })
}

fn graph_from_value(value: Value) -> ExtractResult<ConceptGraph> {
    match value {
        Value::Object(map) => parse_edge_list(&map),
        Value::Array(items) => parse_triplets(&items),
        other => Err(ExtractError::InvalidJson {
            message: format!("expected an object or a list, got {other}"),
        }),
    }
}

/// Node labels are usually strings; anything else is stringified.
fn label(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn parse_edge_list(map: &Map<String, Value>) -> ExtractResult<ConceptGraph> {
    let edges = map
        .get("edges")
        .ok_or(ExtractError::MissingEdges)?
        .as_array()
        .ok_or_else(|| ExtractError::InvalidJson {
            message: "'edges' must be a list".into(),
        })?;

    let mut graph = ConceptGraph::new();
    for (index, edge) in edges.iter().enumerate() {
        let invalid = |message: &str| ExtractError::InvalidEdge {
            index,
            message: message.to_string(),
        };
        let obj = edge.as_object().ok_or_else(|| invalid("not an object"))?;
        let (Some(source), Some(target), Some(attributes)) =
            (obj.get("source"), obj.get("target"), obj.get("attributes"))
        else {
            return Err(invalid("requires 'source', 'target' and 'attributes'"));
        };
        let attributes: Attributes = attributes
            .as_object()
            .ok_or_else(|| invalid("'attributes' must be an object"))?
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let (source, target) = (label(source), label(target));
        if graph.add_edge(&source, &target, attributes).is_err() {
            tracing::warn!(index, label = %source, "skipping self-referencing edge");
        }
    }
    Ok(graph)
}

fn parse_triplets(items: &[Value]) -> ExtractResult<ConceptGraph> {
    struct Relation {
        source: String,
        target: String,
        title: Value,
        count: usize,
    }

    let mut order: Vec<(String, String)> = Vec::new();
    let mut relations: HashMap<(String, String), Relation> = HashMap::new();

    for (index, item) in items.iter().enumerate() {
        let (Some(n1), Some(n2), Some(edge)) = (
            item.get("node_1"),
            item.get("node_2"),
            item.get("edge"),
        ) else {
            return Err(ExtractError::InvalidEdge {
                index,
                message: "requires 'node_1', 'node_2' and 'edge'".into(),
            });
        };
        let (source, target) = (label(n1), label(n2));
        if source == target {
            tracing::warn!(index, label = %source, "skipping self-referencing triplet");
            continue;
        }
        let key = if source <= target {
            (source.clone(), target.clone())
        } else {
            (target.clone(), source.clone())
        };
        match relations.get_mut(&key) {
            Some(rel) => {
                rel.title = edge.clone();
                rel.count += 1;
            }
            None => {
                order.push(key.clone());
                relations.insert(
                    key,
                    Relation {
                        source,
                        target,
                        title: edge.clone(),
                        count: 1,
                    },
                );
            }
        }
    }

    let mut graph = ConceptGraph::new();
    for key in order {
        let Some(rel) = relations.remove(&key) else {
            continue;
        };
        let attributes = Attributes::from([
            ("title".to_string(), rel.title),
            ("weight".to_string(), Value::from(rel.count as f64 / 4.0)),
        ]);
        // Distinct endpoints were checked above.
        let _ = graph.add_edge(&rel.source, &rel.target, attributes);
    }
    Ok(graph)
}

/// Runs a [`TextGenerator`] over text chunks and assembles one graph.
#[derive(Debug, Clone)]
pub struct GraphExtractor {
    /// Instructions sent with every chunk.
    pub system_prompt: String,
    /// Maximum chunk length in characters.
    pub chunk_size: usize,
    /// Characters shared by consecutive chunks.
    pub chunk_overlap: usize,
}

impl GraphExtractor {
    /// Extract a graph from `text`, one model call per chunk.
    ///
    /// Chunks whose generation or parsing fails are skipped with a warning;
    /// if no chunk succeeds the last failure is returned.
    pub fn extract(&self, text: &str, generator: &dyn TextGenerator) -> ExtractResult<ConceptGraph> {
        if text.trim().is_empty() {
            return Err(ExtractError::EmptyText);
        }
        let chunks = split_text(text, self.chunk_size, self.chunk_overlap);
        tracing::info!(chunks = chunks.len(), "generating graph components from text");

        let mut graph = ConceptGraph::new();
        let mut succeeded = 0usize;
        let mut last_error = None;
        for (index, chunk) in chunks.iter().enumerate() {
            let parsed = generator
                .generate_text(&self.system_prompt, chunk)
                .and_then(|response| parse_graph_components(&response));
            match parsed {
                Ok(chunk_graph) => {
                    tracing::debug!(
                        chunk = index,
                        nodes = chunk_graph.node_count(),
                        edges = chunk_graph.edge_count(),
                        "extracted chunk graph"
                    );
                    graph.compose(&chunk_graph);
                    succeeded += 1;
                }
                Err(e) => {
                    tracing::warn!(chunk = index, error = %e, "error processing chunk");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if succeeded == 0 => Err(e),
            _ => Ok(graph),
        }
    }
}
