//! Graph and embedding persistence.
//!
//! Graphs are written as GraphML so they open in Gephi, Cytoscape and
//! networkx. Attribute keys are declared once per domain (`node` or `edge`)
//! with the narrowest GraphML type that fits every value seen for that key.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::io::Write;
use std::path::Path;

use serde_json::Value;

use crate::embedding::EmbeddingTable;
use crate::error::ExportError;
use crate::graph::{Attributes, ConceptGraph};

/// Result type for export operations.
pub type ExportResult<T> = std::result::Result<T, ExportError>;

// ---------------------------------------------------------------------------
// Attribute typing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyType {
    Boolean,
    Long,
    Double,
    String,
}

impl KeyType {
    fn of(value: &Value) -> Self {
        match value {
            Value::Bool(_) => KeyType::Boolean,
            Value::Number(n) if n.is_i64() || n.is_u64() => KeyType::Long,
            Value::Number(_) => KeyType::Double,
            _ => KeyType::String,
        }
    }

    /// Smallest type able to hold both.
    fn widen(self, other: KeyType) -> KeyType {
        match (self, other) {
            (a, b) if a == b => a,
            (KeyType::Long, KeyType::Double) | (KeyType::Double, KeyType::Long) => KeyType::Double,
            _ => KeyType::String,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            KeyType::Boolean => "boolean",
            KeyType::Long => "long",
            KeyType::Double => "double",
            KeyType::String => "string",
        }
    }
}

struct Key {
    id: String,
    kind: KeyType,
}

fn collect_keys<'a>(
    domain_attrs: impl Iterator<Item = &'a Attributes>,
    next_id: &mut usize,
) -> BTreeMap<String, Key> {
    let mut types: BTreeMap<String, KeyType> = BTreeMap::new();
    for attrs in domain_attrs {
        for (name, value) in attrs {
            if value.is_null() {
                continue;
            }
            let kind = KeyType::of(value);
            types
                .entry(name.clone())
                .and_modify(|k| *k = k.widen(kind))
                .or_insert(kind);
        }
    }
    types
        .into_iter()
        .map(|(name, kind)| {
            let key = Key {
                id: format!("d{next_id}"),
                kind,
            };
            *next_id += 1;
            (name, key)
        })
        .collect()
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Escape text for use in XML content and attribute values.
///
/// Characters XML 1.0 cannot represent at all (C0 controls other than tab,
/// newline and carriage return, and the `U+FFFE`/`U+FFFF` noncharacters) are
/// dropped.
pub fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            '\t' | '\n' | '\r' => out.push(c),
            '\u{0}'..='\u{1F}' | '\u{FFFE}' | '\u{FFFF}' => {}
            c => out.push(c),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// GraphML
// ---------------------------------------------------------------------------

/// Render `graph` as a GraphML document.
pub fn to_graphml(graph: &ConceptGraph) -> String {
    let edges: Vec<_> = graph.edges().collect();
    let mut next_id = 0;
    let node_keys = collect_keys(graph.concept_nodes().map(|n| &n.attributes), &mut next_id);
    let edge_keys = collect_keys(edges.iter().map(|e| &e.attributes), &mut next_id);

    let mut out = String::new();
    out.push_str("<?xml version='1.0' encoding='utf-8'?>\n");
    out.push_str(
        "<graphml xmlns=\"http://graphml.graphdrawing.org/xmlns\" \
         xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\" \
         xsi:schemaLocation=\"http://graphml.graphdrawing.org/xmlns \
         http://graphml.graphdrawing.org/xmlns/1.0/graphml.xsd\">\n",
    );
    for (domain, keys) in [("node", &node_keys), ("edge", &edge_keys)] {
        for (name, key) in keys {
            let _ = writeln!(
                out,
                "  <key id=\"{}\" for=\"{domain}\" attr.name=\"{}\" attr.type=\"{}\" />",
                key.id,
                escape_xml(name),
                key.kind.as_str()
            );
        }
    }
    out.push_str("  <graph edgedefault=\"undirected\">\n");

    for node in graph.concept_nodes() {
        let id = escape_xml(&node.label);
        if node.attributes.is_empty() {
            let _ = writeln!(out, "    <node id=\"{id}\" />");
            continue;
        }
        let _ = writeln!(out, "    <node id=\"{id}\">");
        write_data(&mut out, &node.attributes, &node_keys);
        out.push_str("    </node>\n");
    }
    for edge in &edges {
        let (source, target) = (escape_xml(&edge.source), escape_xml(&edge.target));
        if edge.attributes.is_empty() {
            let _ = writeln!(out, "    <edge source=\"{source}\" target=\"{target}\" />");
            continue;
        }
        let _ = writeln!(out, "    <edge source=\"{source}\" target=\"{target}\">");
        write_data(&mut out, &edge.attributes, &edge_keys);
        out.push_str("    </edge>\n");
    }

    out.push_str("  </graph>\n</graphml>\n");
    out
}

fn write_data(out: &mut String, attrs: &Attributes, keys: &BTreeMap<String, Key>) {
    for (name, value) in attrs {
        let Some(key) = keys.get(name) else {
            // Null values have no declared key.
            continue;
        };
        let _ = writeln!(
            out,
            "      <data key=\"{}\">{}</data>",
            key.id,
            escape_xml(&render_value(value))
        );
    }
}

/// Write `graph` as GraphML to `writer`.
pub fn write_graphml<W: Write>(graph: &ConceptGraph, mut writer: W) -> std::io::Result<()> {
    writer.write_all(to_graphml(graph).as_bytes())?;
    writer.flush()
}

/// Write `graph` as GraphML to `path`.
pub fn save_graphml(graph: &ConceptGraph, path: &Path) -> ExportResult<()> {
    let file = std::fs::File::create(path).map_err(|source| ExportError::Io {
        path: path.display().to_string(),
        source,
    })?;
    write_graphml(graph, std::io::BufWriter::new(file)).map_err(|source| ExportError::Io {
        path: path.display().to_string(),
        source,
    })?;
    tracing::info!(
        path = %path.display(),
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        "saved graph"
    );
    Ok(())
}

/// Write an embedding table as a pretty JSON object (label → vector).
pub fn save_embeddings(table: &EmbeddingTable, path: &Path) -> ExportResult<()> {
    table.save(path)?;
    tracing::info!(path = %path.display(), embeddings = table.len(), "saved embeddings");
    Ok(())
}
