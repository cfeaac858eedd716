//! Section-id normalization.
//!
//! The canonical form is `EAR-<part>` followed by one or more dot-segments
//! and optional parenthesised lowercase subsection tokens, e.g.
//! `EAR-736.2(b)`. The rule set below is applied in a fixed order; an input
//! that cannot reach the pattern afterwards is rejected rather than guessed
//! at.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::IdError;

static CANONICAL_SECTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^EAR-\d{3}(?:\.\d+[a-z0-9]*)+(?:\([a-z0-9]+\))*$").expect("canonical section pattern")
});

static CANONICAL_ANCHOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^p\d{4,}$").expect("canonical anchor pattern"));

/// Returns true when `id` is already in canonical section-id form.
pub fn is_canonical_id(id: &str) -> bool {
    CANONICAL_SECTION.is_match(id)
}

/// Normalize a surface-form EAR citation into its canonical section id.
///
/// Rules, in order: trim surrounding whitespace (including U+00A0), strip a
/// leading `§`, strip an optional `15 CFR ` prefix, accept an `EAR-` or
/// `EAR ` prefix, remove internal spaces, lowercase the tail, and drop a
/// single trailing dot. The result must match the canonical pattern.
///
/// Normalization is idempotent: feeding the output back in returns it
/// unchanged.
///
/// # Errors
///
/// [`IdError::InvalidId`] when the input cannot reach the canonical pattern.
///
/// # Examples
///
/// ```rust
/// use ident::normalize_section_id;
///
/// assert_eq!(normalize_section_id("§ 736.2(B)").unwrap(), "EAR-736.2(b)");
/// assert_eq!(normalize_section_id("15 CFR 736.2(b)").unwrap(), "EAR-736.2(b)");
/// assert!(normalize_section_id("Part 736").is_err());
/// ```
pub fn normalize_section_id(input: &str) -> Result<String, IdError> {
    let mut rest = input.trim_matches(char::is_whitespace);

    if let Some(stripped) = rest.strip_prefix('§') {
        rest = stripped.trim_start_matches(char::is_whitespace);
    }
    rest = strip_prefix_ci(rest, "15 CFR").unwrap_or(rest);
    rest = rest.trim_start_matches(char::is_whitespace);
    if let Some(stripped) = strip_prefix_ci(rest, "EAR") {
        // Accept `EAR-736…` and `EAR 736…`; a bare `EAR736…` run-on is not a
        // form the sources produce and falls through to validation failure.
        if let Some(after) = stripped.strip_prefix('-') {
            rest = after;
        } else if stripped.starts_with(char::is_whitespace) {
            rest = stripped.trim_start_matches(char::is_whitespace);
        }
    }

    let mut tail: String = rest
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase();
    if tail.ends_with('.') {
        tail.pop();
    }

    let candidate = format!("EAR-{tail}");
    if is_canonical_id(&candidate) {
        Ok(candidate)
    } else {
        Err(IdError::invalid(input))
    }
}

/// Normalize a retrieval-corpus doc id, which is either a bare section id or
/// `<section_id>#pNNNN`.
///
/// The anchor ordinal is re-emitted zero-padded to four digits. Anchored ids
/// never appear in dataset citation fields; callers enforcing that contract
/// use [`split_doc_id`] and reject the anchored form.
pub fn normalize_doc_id(input: &str) -> Result<String, IdError> {
    match input.split_once('#') {
        None => normalize_section_id(input),
        Some((section, anchor)) => {
            let section = normalize_section_id(section)?;
            let ordinal = parse_anchor(anchor).ok_or_else(|| IdError::anchor(input))?;
            Ok(format!("{section}#p{ordinal:04}"))
        }
    }
}

/// Split a canonical doc id into its section id and optional anchor ordinal.
pub fn split_doc_id(doc_id: &str) -> (&str, Option<u32>) {
    match doc_id.split_once('#') {
        None => (doc_id, None),
        Some((section, anchor)) => (section, parse_anchor(anchor)),
    }
}

fn parse_anchor(anchor: &str) -> Option<u32> {
    if !CANONICAL_ANCHOR.is_match(anchor) {
        // Tolerate un-padded `p7` on input; the canonical form pads to 4.
        let digits = anchor.strip_prefix('p')?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        return digits.parse().ok();
    }
    anchor[1..].parse().ok()
}

fn strip_prefix_ci<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    if s.len() >= prefix.len() && s[..prefix.len()].eq_ignore_ascii_case(prefix) {
        Some(&s[prefix.len()..])
    } else {
        None
    }
}
