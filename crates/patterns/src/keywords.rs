//! Description keyword extraction
//!
//! Shared by the matcher (transaction keyword sets) and the feedback
//! learner (keyword triggers from explanations).

use once_cell::sync::Lazy;
use std::collections::HashSet;

use taxlens_config::constants::learning;

static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "the", "a", "an", "is", "are", "was", "were", "be", "been", "of", "to", "for", "in", "on",
        "at", "by", "with", "from", "and", "or", "but", "if", "then", "else", "this", "that",
        "these", "those", "it", "its", "per", "inc", "llc", "corp", "co", "ltd", "invoice", "item",
        "qty", "each", "total", "amount", "tax", "charge", "fee", "misc", "n/a",
    ]
    .into_iter()
    .collect()
});

/// Extract up to `MAX_KEYWORDS` lowercase keywords from free text
///
/// Filters stopwords and tokens of two characters or fewer; order of first
/// appearance is preserved, duplicates dropped.
pub fn extract_keywords(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 2 && !STOPWORDS.contains(w))
        .filter(|w| seen.insert(w.to_string()))
        .map(|w| w.to_string())
        .take(learning::MAX_KEYWORDS)
        .collect()
}
