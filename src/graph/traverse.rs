//! Embedding-guided graph walks.

use std::collections::HashSet;

use crate::embedding::{cosine_similarity, EmbeddingResult, EmbeddingTable};
use crate::error::EmbeddingError;

use super::ConceptGraph;

/// Greedy best-first walk from `source` toward `target`.
///
/// At each step moves to the unvisited neighbor whose embedding is most
/// similar to the target's (earliest neighbor on ties). Returns the path
/// including both ends, or an empty path when the walk gets stuck.
pub fn heuristic_path(
    graph: &ConceptGraph,
    embeddings: &EmbeddingTable,
    source: &str,
    target: &str,
) -> EmbeddingResult<Vec<String>> {
    let target_vec = embeddings.require(target)?.as_flat();
    embeddings.require(source)?;

    let mut visited: HashSet<&str> = HashSet::new();
    let mut path = vec![source.to_string()];
    let mut current = source;

    while current != target {
        visited.insert(current);
        let neighbors: Vec<&str> = match graph.neighbors(current) {
            Ok(n) => n.into_iter().filter(|n| !visited.contains(n)).collect(),
            Err(_) => Vec::new(),
        };

        let mut best: Option<(&str, f64)> = None;
        for neighbor in neighbors {
            let Some(embedding) = embeddings.get(neighbor) else {
                return Err(EmbeddingError::NotFound {
                    label: neighbor.to_string(),
                });
            };
            let score = cosine_similarity(&embedding.as_flat(), &target_vec);
            if best.is_none_or(|(_, s)| score > s) {
                best = Some((neighbor, score));
            }
        }

        let Some((next, _)) = best else {
            tracing::warn!(source, target, "no path found");
            return Ok(Vec::new());
        };
        path.push(next.to_string());
        current = next;
    }

    Ok(path)
}
