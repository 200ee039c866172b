//! Compiled detection patterns, one matcher per pattern kind.

use std::collections::HashMap;

use memory_types::{ContextPredicate, EdgeConfig, Expectation};
use regex::Regex;

use crate::fuzzy::bounded_levenshtein;

/// The three inputs of one `check_edges` call, prepared once.
pub struct EdgeInput<'a> {
    pub code: &'a str,
    intent: String,
    intent_words: Vec<String>,
    pub context: &'a HashMap<String, String>,
}

impl<'a> EdgeInput<'a> {
    pub fn new(code: &'a str, intent: &str, context: &'a HashMap<String, String>) -> Self {
        let intent = intent.to_lowercase();
        let intent_words = intent
            .split(|c: char| !c.is_alphanumeric() && c != '_')
            .filter(|w| !w.is_empty())
            .map(str::to_string)
            .collect();
        Self {
            code,
            intent,
            intent_words,
            context,
        }
    }
}

/// A detection pattern ready to evaluate.
#[derive(Debug, Clone)]
pub enum CompiledPattern {
    Code(Regex),
    Context(Vec<ContextPredicate>),
    Intent(Vec<String>),
}

impl CompiledPattern {
    pub fn matches(&self, input: &EdgeInput<'_>, config: &EdgeConfig) -> bool {
        match self {
            CompiledPattern::Code(regex) => regex.is_match(input.code),
            CompiledPattern::Context(predicates) => context_matches(predicates, input.context),
            CompiledPattern::Intent(terms) => intent_matches(terms, input, config),
        }
    }
}

/// Every predicate holds. An empty predicate set never matches.
fn context_matches(predicates: &[ContextPredicate], context: &HashMap<String, String>) -> bool {
    !predicates.is_empty()
        && predicates.iter().all(|predicate| {
            let Some(value) = context.get(&predicate.key) else {
                return false;
            };
            match &predicate.expect {
                Expectation::Present => true,
                Expectation::Equals(expected) => eq_ignore_case(value, expected),
                Expectation::OneOf(options) => options.iter().any(|o| eq_ignore_case(value, o)),
            }
        })
}

fn eq_ignore_case(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

/// Any term occurs in the intent, case-insensitively.
///
/// With fuzzy matching on, long single-word terms also match an intent word
/// within the configured edit distance.
fn intent_matches(terms: &[String], input: &EdgeInput<'_>, config: &EdgeConfig) -> bool {
    if input.intent.trim().is_empty() {
        return false;
    }
    terms.iter().any(|term| {
        let term = term.trim().to_lowercase();
        if term.is_empty() {
            return false;
        }
        if input.intent.contains(&term) {
            return true;
        }
        let single_word = !term.contains(char::is_whitespace);
        config.fuzzy_intent
            && single_word
            && term.chars().count() >= config.min_fuzzy_term_len
            && input
                .intent_words
                .iter()
                .any(|word| bounded_levenshtein(word, &term, config.max_edit_distance).is_some())
    })
}
