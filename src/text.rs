//! Text preparation ahead of graph extraction.
//!
//! Chunking keeps prompts within the model's context window; markdown
//! stripping removes formatting that would otherwise leak into concept labels.

use std::sync::LazyLock;

use regex::Regex;

/// Split `text` into windows of at most `chunk_size` characters, each window
/// starting `chunk_size - chunk_overlap` characters after the previous one.
///
/// Counts Unicode scalar values, never bytes. Empty input yields no chunks;
/// `chunk_size == 0` is treated as 1 and an overlap of at least `chunk_size`
/// as `chunk_size - 1`.
pub fn split_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let chunk_size = chunk_size.max(1);
    let step = chunk_size - chunk_overlap.min(chunk_size - 1);
    let chars: Vec<char> = text.chars().collect();

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + chunk_size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }
    chunks
}

/// Which markdown constructs [`strip_markdown`] leaves in place.
#[derive(Debug, Clone, Default)]
pub struct MarkdownOptions {
    pub preserve_links: bool,
    pub preserve_images: bool,
    pub preserve_code_blocks: bool,
    pub preserve_lists: bool,
    /// Additional `(pattern, replacement)` rules applied last.
    pub extra_patterns: Vec<(Regex, String)>,
}

struct Rule {
    pattern: Regex,
    replacement: &'static str,
}

fn rule(pattern: &str, replacement: &'static str) -> Rule {
    Rule {
        pattern: Regex::new(pattern).unwrap(),
        replacement,
    }
}

static INLINE_RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        rule(r"\*\*([^*]+)\*\*", "$1"),
        rule(r"\*([^*]+)\*", "$1"),
        rule(r"__([^_]+)__", "$1"),
        rule(r"_([^_]+)_", "$1"),
        rule(r"~~(.*?)~~", "$1"),
        rule(r"`([^`]+)`", "$1"),
        rule(r"#+\s", ""),
        rule(r"(?m)^>\s+", ""),
    ]
});

static IMAGE_RULE: LazyLock<Rule> = LazyLock::new(|| rule(r"!\[[^\]]*\]\([^)]+\)", ""));
static LINK_RULE: LazyLock<Rule> = LazyLock::new(|| rule(r"\[([^\]]+)\]\([^)]+\)", "$1"));
static CODE_BLOCK_RULE: LazyLock<Rule> = LazyLock::new(|| rule(r"(?s)```.*?```", ""));
static LIST_RULES: LazyLock<Vec<Rule>> =
    LazyLock::new(|| vec![rule(r"(?m)^[*\-+]\s+", ""), rule(r"(?m)^\d+\.\s+", "")]);
static BLANK_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n\s*\n").unwrap());

/// Remove markdown formatting, keeping the text content.
pub fn strip_markdown(text: &str, options: &MarkdownOptions) -> String {
    let mut result = text.to_string();

    // Fenced blocks first so their contents are not rewritten by inline rules.
    if !options.preserve_code_blocks {
        result = apply(&CODE_BLOCK_RULE, &result);
    }
    if !options.preserve_images {
        result = apply(&IMAGE_RULE, &result);
    }
    if !options.preserve_lists {
        for r in LIST_RULES.iter() {
            result = apply(r, &result);
        }
    }
    for r in INLINE_RULES.iter() {
        result = apply(r, &result);
    }
    if !options.preserve_links {
        result = apply(&LINK_RULE, &result);
    }
    for (pattern, replacement) in &options.extra_patterns {
        result = pattern.replace_all(&result, replacement.as_str()).into_owned();
    }

    BLANK_RUNS.replace_all(&result, "\n\n").trim().to_string()
}

fn apply(rule: &Rule, text: &str) -> String {
    rule.pattern.replace_all(text, rule.replacement).into_owned()
}

/// Turn an arbitrary name into a file-system-safe file name.
pub fn safe_filename(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(*c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*'))
        .map(|c| if c == ' ' { '_' } else { c })
        .take(255)
        .collect()
}

/// Whether `phrase` occurs in `text`.
pub fn contains_phrase(text: &str, phrase: &str, case_sensitive: bool) -> bool {
    if case_sensitive {
        text.contains(phrase)
    } else {
        text.to_lowercase().contains(&phrase.to_lowercase())
    }
}
