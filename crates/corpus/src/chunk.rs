//! Deterministic text chunking.
//!
//! Primary rule: split on blank-line boundaries (the payload is LF-only by
//! the time it reaches here). Fallback: a paragraph that still exceeds the
//! token budget is split at a stable, locale-free whitespace rule into
//! windows of at most `max_tokens` words joined by single spaces.
//!
//! "Token" means whitespace-delimited word; the estimate intentionally
//! ignores model-specific tokenizers so the corpus never depends on one.

/// Whitespace word count, the token estimate recorded on every chunk.
pub fn estimate_tokens(text: &str) -> u32 {
    text.split_whitespace().count() as u32
}

/// Split text into paragraphs on blank-line boundaries, applying the
/// token-bounded fallback to oversize paragraphs. Empty paragraphs are
/// dropped; each returned chunk is trimmed and non-empty.
pub fn split_paragraphs(text: &str, max_tokens: u32) -> Vec<String> {
    let mut out = Vec::new();
    for block in text.split("\n\n") {
        let block = block.trim();
        if block.is_empty() {
            continue;
        }
        if estimate_tokens(block) <= max_tokens {
            out.push(block.to_string());
        } else {
            out.extend(split_by_tokens(block, max_tokens));
        }
    }
    out
}

fn split_by_tokens(block: &str, max_tokens: u32) -> Vec<String> {
    let words: Vec<&str> = block.split_whitespace().collect();
    words
        .chunks(max_tokens.max(1) as usize)
        .map(|window| window.join(" "))
        .collect()
}
