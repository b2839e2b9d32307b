//! Query classifier
//!
//! Labels an incoming query as either:
//! - Simple: single company, single metric, single year — one retrieval round
//! - Complex: multiple companies, comparisons, or derived quantities spanning
//!   several facts — needs decomposition first
//!
//! A keyword fast path catches unambiguous complex queries without a model
//! call; everything else goes to the generation model. Any failure falls back
//! to Simple so the query still completes with at most one retrieval round.

use crate::models::QueryLabel;
use crate::providers::TextCompletion;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Static keyword lists — zero allocation
const ENTITY_KEYWORDS: &[&str] = &[
    "microsoft", "msft", "google", "googl", "alphabet", "nvidia", "nvda",
];

const COMPARISON_KEYWORDS: &[&str] = &[
    "compare", "comparison", "versus", " vs ", "highest", "lowest", "best",
    "which company", "which of", "each company", "across", "between", "rank",
    "all three",
];

const DERIVED_KEYWORDS: &[&str] = &[
    "grow", "grew", "growth", "change", "changed", "increase", "decrease",
    "difference", "ratio", "cagr",
];

pub struct QueryClassifier {
    completion: Arc<dyn TextCompletion>,
    call_timeout: Duration,
}

impl QueryClassifier {
    pub fn new(completion: Arc<dyn TextCompletion>, call_timeout: Duration) -> Self {
        Self {
            completion,
            call_timeout,
        }
    }

    /// Classify a query. Never errors: degraded paths label Simple.
    pub async fn classify(&self, query: &str) -> QueryLabel {
        if let Some(label) = heuristic_label(query) {
            debug!(query = %query, label = %label, "Classified by heuristic");
            return label;
        }

        let prompt = build_prompt(query);

        let response =
            match tokio::time::timeout(self.call_timeout, self.completion.complete(&prompt)).await
            {
                Ok(Ok(text)) => text,
                Ok(Err(e)) => {
                    warn!(error = %e, "Classification call failed, defaulting to simple");
                    return QueryLabel::Simple;
                }
                Err(_) => {
                    warn!("Classification call timed out, defaulting to simple");
                    return QueryLabel::Simple;
                }
            };

        let label = parse_label(&response);
        debug!(query = %query, label = %label, "Classified by model");
        label
    }
}

/// Keyword fast path. Only claims a label when the query is unambiguously
/// complex; anything uncertain is left to the model.
fn heuristic_label(query: &str) -> Option<QueryLabel> {
    let lowered = query.to_lowercase();

    let entity_mentions = ENTITY_KEYWORDS
        .iter()
        .filter(|kw| lowered.contains(**kw))
        .count();
    if entity_mentions >= 2 {
        return Some(QueryLabel::Complex);
    }

    if COMPARISON_KEYWORDS.iter().any(|kw| lowered.contains(*kw)) {
        return Some(QueryLabel::Complex);
    }

    // A derived quantity spanning more than one year needs per-year facts.
    let year_mentions = count_year_mentions(&lowered);
    if year_mentions >= 2 && DERIVED_KEYWORDS.iter().any(|kw| lowered.contains(*kw)) {
        return Some(QueryLabel::Complex);
    }

    None
}

fn count_year_mentions(text: &str) -> usize {
    text.split(|c: char| !c.is_ascii_digit())
        .filter(|token| token.len() == 4 && (token.starts_with("19") || token.starts_with("20")))
        .count()
}

fn build_prompt(query: &str) -> String {
    format!(
        r#"Analyze this financial query and classify it as either "simple" or "complex":

Query: {}

Classification criteria:
- Simple: Single company, single metric, single year (e.g., "What was Microsoft's revenue in 2023?")
- Complex: Multiple companies, comparisons, calculations, or multi-step reasoning required

Examples:
- Simple: "What was NVIDIA's total revenue in 2023?"
- Complex: "Which company had the highest operating margin in 2023?"
- Complex: "How did Microsoft's cloud revenue grow from 2022 to 2023?"

Respond with just "simple" or "complex"."#,
        query
    )
}

/// Parse the single-word reply. Unparseable replies degrade to Simple.
fn parse_label(response: &str) -> QueryLabel {
    let lowered = response.trim().to_lowercase();
    if lowered.contains("complex") {
        QueryLabel::Complex
    } else if lowered.contains("simple") {
        QueryLabel::Simple
    } else {
        warn!(response = %response, "Unparseable classification label, defaulting to simple");
        QueryLabel::Simple
    }
}
