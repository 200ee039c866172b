//! Trigger phrase normalization and matching.

use memory_types::MemoryItem;

/// Lowercase and collapse runs of whitespace to a single space.
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Normalized query text plus the session's own trigger phrases.
#[derive(Debug, Clone, Default)]
pub struct TriggerMatcher {
    query: String,
    session_phrases: Vec<String>,
}

impl TriggerMatcher {
    pub fn new<S: AsRef<str>>(query: &str, session_phrases: &[S]) -> Self {
        Self {
            query: normalize(query),
            session_phrases: session_phrases
                .iter()
                .map(|p| normalize(p.as_ref()))
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// Whether nothing could ever match.
    pub fn is_empty(&self) -> bool {
        self.query.is_empty() && self.session_phrases.is_empty()
    }

    /// An item matches when one of its phrases occurs in the query, or
    /// equals a session phrase.
    pub fn matches(&self, item: &MemoryItem) -> bool {
        item.trigger_phrases.iter().any(|phrase| {
            let phrase = normalize(phrase);
            !phrase.is_empty()
                && (self.query.contains(&phrase) || self.session_phrases.contains(&phrase))
        })
    }
}
