//! Query decomposer
//!
//! Turns a complex query into an ordered list of atomic sub-queries, each
//! independently retrievable ("{entity} {metric} {year}" phrasing). The model
//! call is nondeterministic; the parse makes the result deterministic for a
//! given output: fence stripping, JSON-array parse with a line-based
//! fallback, order-preserving dedupe, then a configurable ceiling.
//!
//! An empty result is not an error here — the orchestrator substitutes the
//! original query as the sole sub-query.

use crate::providers::TextCompletion;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub struct QueryDecomposer {
    completion: Arc<dyn TextCompletion>,
    max_sub_queries: usize,
    call_timeout: Duration,
}

impl QueryDecomposer {
    pub fn new(
        completion: Arc<dyn TextCompletion>,
        max_sub_queries: usize,
        call_timeout: Duration,
    ) -> Self {
        Self {
            completion,
            max_sub_queries,
            call_timeout,
        }
    }

    /// Decompose a complex query. Returns an empty list when the model output
    /// is unusable; never errors.
    pub async fn decompose(&self, query: &str) -> Vec<String> {
        let prompt = build_prompt(query);

        let response =
            match tokio::time::timeout(self.call_timeout, self.completion.complete(&prompt)).await
            {
                Ok(Ok(text)) => text,
                Ok(Err(e)) => {
                    warn!(error = %e, "Decomposition call failed");
                    return Vec::new();
                }
                Err(_) => {
                    warn!("Decomposition call timed out");
                    return Vec::new();
                }
            };

        let sub_queries = parse_sub_queries(&response, self.max_sub_queries);
        debug!(
            query = %query,
            count = sub_queries.len(),
            ?sub_queries,
            "Query decomposed"
        );
        sub_queries
    }
}

fn build_prompt(query: &str) -> String {
    format!(
        r#"Break down this complex financial query into specific sub-queries that can be answered independently:

Original Query: {}

Guidelines:
- Create specific, searchable sub-queries
- Focus on concrete financial metrics (revenue, margin, etc.)
- Include company name and year when possible
- For comparisons, create separate queries for each company
- For growth calculations, query both years separately

Examples:
Query: "Which company had the highest operating margin in 2023?"
Sub-queries:
["Microsoft operating margin 2023", "Google operating margin 2023", "NVIDIA operating margin 2023"]

Query: "How did NVIDIA's data center revenue grow from 2022 to 2023?"
Sub-queries:
["NVIDIA data center revenue 2022", "NVIDIA data center revenue 2023"]

Respond with a JSON array of sub-queries:
["sub-query 1", "sub-query 2", ...]"#,
        query
    )
}

/// Strip markdown code fences the model tends to wrap JSON in.
fn strip_fences(response: &str) -> &str {
    response
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

fn parse_sub_queries(response: &str, max: usize) -> Vec<String> {
    let cleaned = strip_fences(response);

    let raw = parse_json_array(cleaned)
        .or_else(|| extract_bracketed_array(cleaned))
        .unwrap_or_else(|| parse_listed_lines(cleaned));

    dedupe_preserving_order(raw, max)
}

fn parse_json_array(text: &str) -> Option<Vec<String>> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    let items = value.as_array()?;
    Some(
        items
            .iter()
            .filter_map(|v| v.as_str().map(|s| s.trim().to_string()))
            .collect(),
    )
}

/// The array is sometimes embedded in surrounding prose.
fn extract_bracketed_array(text: &str) -> Option<Vec<String>> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    if end <= start {
        return None;
    }
    parse_json_array(&text[start..=end])
}

/// Last resort: one sub-query per numbered or bulleted line.
fn parse_listed_lines(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| {
            let trimmed = line.trim();
            let stripped = trimmed
                .trim_start_matches(|c: char| c.is_ascii_digit() || c == '.' || c == ')')
                .trim_start_matches(['-', '*'])
                .trim();
            if stripped.is_empty() || stripped == trimmed {
                None
            } else {
                Some(stripped.trim_matches('"').to_string())
            }
        })
        .collect()
}

fn dedupe_preserving_order(items: Vec<String>, max: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|q| !q.is_empty())
        .filter(|q| seen.insert(q.to_lowercase()))
        .take(max)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::StubCompletion;

    fn decomposer(stub: StubCompletion) -> QueryDecomposer {
        QueryDecomposer::new(Arc::new(stub), 8, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_parses_fenced_json_array() {
        let stub = StubCompletion::new(
            "```json\n[\"Microsoft operating margin 2023\", \"Google operating margin 2023\"]\n```",
        );
        let subs = decomposer(stub)
            .decompose("Which company had the higher operating margin in 2023?")
            .await;

        assert_eq!(
            subs,
            vec![
                "Microsoft operating margin 2023",
                "Google operating margin 2023"
            ]
        );
    }

    #[tokio::test]
    async fn test_dedupes_preserving_first_seen_order() {
        let stub = StubCompletion::new(
            r#"["NVIDIA revenue 2023", "Microsoft revenue 2023", "nvidia revenue 2023"]"#,
        );
        let subs = decomposer(stub).decompose("compare revenue").await;

        assert_eq!(subs, vec!["NVIDIA revenue 2023", "Microsoft revenue 2023"]);
    }

    #[tokio::test]
    async fn test_array_embedded_in_prose() {
        let stub = StubCompletion::new(
            "Here are the sub-queries:\n[\"MSFT cloud revenue 2022\", \"MSFT cloud revenue 2023\"]\nGood luck!",
        );
        let subs = decomposer(stub).decompose("cloud growth").await;
        assert_eq!(subs.len(), 2);
        assert_eq!(subs[0], "MSFT cloud revenue 2022");
    }

    #[tokio::test]
    async fn test_numbered_line_fallback() {
        let stub = StubCompletion::new(
            "1. Microsoft operating margin 2023\n2. Google operating margin 2023\n3. NVIDIA operating margin 2023",
        );
        let subs = decomposer(stub).decompose("highest margin").await;
        assert_eq!(subs.len(), 3);
        assert_eq!(subs[2], "NVIDIA operating margin 2023");
    }

    #[tokio::test]
    async fn test_ceiling_truncates() {
        let many: Vec<String> = (0..20).map(|i| format!("sub-query {}", i)).collect();
        let stub = StubCompletion::new(serde_json::to_string(&many).unwrap());
        let decomposer = QueryDecomposer::new(Arc::new(stub), 8, Duration::from_secs(5));

        let subs = decomposer.decompose("everything about everything").await;
        assert_eq!(subs.len(), 8);
        assert_eq!(subs[0], "sub-query 0");
    }

    #[tokio::test]
    async fn test_malformed_output_yields_empty() {
        let stub = StubCompletion::new("I cannot break this down, sorry.");
        assert!(decomposer(stub).decompose("complex query").await.is_empty());
    }

    #[tokio::test]
    async fn test_call_failure_yields_empty() {
        assert!(decomposer(StubCompletion::failing())
            .decompose("complex query")
            .await
            .is_empty());
    }
}
