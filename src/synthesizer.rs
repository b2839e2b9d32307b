//! Answer synthesizer
//!
//! Builds one generation prompt from the original query and the top chunks
//! per sub-query, then recovers a structured answer from whatever the model
//! returns. Parsing is an explicit ordered chain of `try_*` functions:
//!
//! 1. the whole cleaned response as JSON
//! 2. the largest brace-delimited substring as JSON
//! 3. regex field extraction from prose
//! 4. the raw response text as the answer
//!
//! The chain never errors and always yields a non-empty answer. Sources are
//! derived from the evidence chunks actually retrieved — model-returned chunk
//! ids can only narrow that set, never extend it.

use crate::models::{ScoredChunk, Source};
use crate::providers::TextCompletion;
use regex::Regex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const UNSTRUCTURED_REASONING: &str = "Unstructured model response";
const DEFAULT_REASONING: &str = "Analysis based on search results";
const EMPTY_ANSWER: &str = "Unable to determine an answer from the retrieved context.";

/// Maximum characters of chunk content embedded per prompt result.
const PROMPT_CHUNK_LEN: usize = 500;
/// Cap applied to raw-text fallback answers.
const RAW_ANSWER_LEN: usize = 500;

pub struct SynthesisResult {
    pub answer: String,
    pub reasoning: String,
    pub sources: Vec<Source>,
}

struct ParsedSynthesis {
    answer: String,
    reasoning: String,
    chunk_ids: Option<Vec<String>>,
}

pub struct AnswerSynthesizer {
    completion: Arc<dyn TextCompletion>,
    context_chunks_per_query: usize,
    excerpt_len: usize,
    call_timeout: Duration,
    answer_pattern: Regex,
    reasoning_pattern: Regex,
}

impl AnswerSynthesizer {
    pub fn new(
        completion: Arc<dyn TextCompletion>,
        context_chunks_per_query: usize,
        excerpt_len: usize,
        call_timeout: Duration,
    ) -> Self {
        Self {
            completion,
            context_chunks_per_query,
            excerpt_len,
            call_timeout,
            // Line-oriented field extraction for prose like `Answer: ...`
            // or half-parsed JSON like `"answer": "..."`.
            answer_pattern: Regex::new(r#"(?im)^[\s"']*answer[\s"']*[:=][\s"']*(.+?)[",]*\s*$"#)
                .expect("static regex"),
            reasoning_pattern: Regex::new(
                r#"(?im)^[\s"']*reasoning[\s"']*[:=][\s"']*(.+?)[",]*\s*$"#,
            )
            .expect("static regex"),
        }
    }

    /// Synthesize a structured answer from per-sub-query evidence. Never
    /// errors; degraded paths still produce a non-empty answer and sources
    /// drawn from the evidence set.
    pub async fn synthesize(
        &self,
        query: &str,
        evidence: &[(String, Vec<ScoredChunk>)],
    ) -> SynthesisResult {
        let deduped = dedupe_evidence(evidence);
        let prompt = self.build_prompt(query, evidence);

        let response =
            match tokio::time::timeout(self.call_timeout, self.completion.complete(&prompt)).await
            {
                Ok(Ok(text)) => text,
                Ok(Err(e)) => {
                    warn!(error = %e, "Synthesis call failed, degrading to evidence summary");
                    return self.degraded_result(&deduped);
                }
                Err(_) => {
                    warn!("Synthesis call timed out, degrading to evidence summary");
                    return self.degraded_result(&deduped);
                }
            };

        let parsed = parse_response(&response, &self.answer_pattern, &self.reasoning_pattern);

        let sources = match &parsed.chunk_ids {
            Some(ids) if !ids.is_empty() => {
                let wanted: HashSet<&str> = ids.iter().map(|s| s.as_str()).collect();
                let filtered: Vec<Source> = deduped
                    .iter()
                    .filter(|sc| wanted.contains(sc.chunk.chunk_id.as_str()))
                    .map(|sc| Source::from_scored(sc, self.excerpt_len))
                    .collect();
                if filtered.is_empty() {
                    self.all_sources(&deduped)
                } else {
                    filtered
                }
            }
            _ => self.all_sources(&deduped),
        };

        debug!(
            sources = sources.len(),
            reasoning = %parsed.reasoning,
            "Synthesis complete"
        );

        SynthesisResult {
            answer: parsed.answer,
            reasoning: parsed.reasoning,
            sources,
        }
    }

    fn build_prompt(&self, query: &str, evidence: &[(String, Vec<ScoredChunk>)]) -> String {
        let mut context = String::new();
        for (sub_query, chunks) in evidence {
            context.push_str(&format!("Search: {}\n", sub_query));
            for (i, scored) in chunks.iter().take(self.context_chunks_per_query).enumerate() {
                let content: String = scored.chunk.content.chars().take(PROMPT_CHUNK_LEN).collect();
                context.push_str(&format!(
                    "Result {} [{}]: {}\n",
                    i + 1,
                    scored.chunk.chunk_id,
                    content
                ));
            }
            context.push('\n');
        }

        format!(
            r#"You are a financial analyst. Based on the search results, answer the question in JSON format.

Question: {}

Search Results:
{}
Instructions:
1. Analyze the search results for relevant financial information
2. Extract specific numbers, percentages, and facts when available
3. If no relevant data is found, state that clearly
4. Respond with ONLY valid JSON in this format:

{{"answer": "your detailed answer with specific numbers", "reasoning": "explain how you derived this answer", "source_chunk_ids": ["ids of the results you used"]}}

IMPORTANT: Return ONLY the JSON object, no other text or formatting."#,
            query, context
        )
    }

    fn all_sources(&self, deduped: &[ScoredChunk]) -> Vec<Source> {
        deduped
            .iter()
            .map(|sc| Source::from_scored(sc, self.excerpt_len))
            .collect()
    }

    /// Terminal degradation when the generation call itself fails: summarize
    /// straight from the evidence so the caller still gets a complete answer.
    fn degraded_result(&self, deduped: &[ScoredChunk]) -> SynthesisResult {
        let answer = match deduped.first() {
            Some(first) => {
                let sample: String = first.chunk.content.chars().take(200).collect();
                format!("Based on available data: {}", sample)
            }
            None => "Unable to find relevant information in the search results.".to_string(),
        };

        SynthesisResult {
            answer,
            reasoning: "Generated from search results because answer synthesis failed".to_string(),
            sources: self.all_sources(deduped),
        }
    }
}

/// Deduplicate evidence by chunk id across sub-queries, keeping the first
/// occurrence so sub-query order is preserved in attribution.
fn dedupe_evidence(evidence: &[(String, Vec<ScoredChunk>)]) -> Vec<ScoredChunk> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for (_, chunks) in evidence {
        for scored in chunks {
            if seen.insert(scored.chunk.chunk_id.clone()) {
                out.push(scored.clone());
            }
        }
    }
    out
}

fn parse_response(response: &str, answer_rx: &Regex, reasoning_rx: &Regex) -> ParsedSynthesis {
    let cleaned = strip_fences(response);

    if let Some(parsed) = try_parse_json(cleaned) {
        return parsed;
    }
    if let Some(parsed) = try_parse_embedded_json(cleaned) {
        return parsed;
    }
    if let Some(parsed) = try_parse_fields(cleaned, answer_rx, reasoning_rx) {
        return parsed;
    }
    raw_fallback(cleaned)
}

fn strip_fences(response: &str) -> &str {
    response
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

/// Step 1: the whole response is the JSON object.
fn try_parse_json(text: &str) -> Option<ParsedSynthesis> {
    from_value(serde_json::from_str(text).ok()?)
}

/// Step 2: the object is embedded in surrounding prose; take the largest
/// brace-delimited substring.
fn try_parse_embedded_json(text: &str) -> Option<ParsedSynthesis> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    from_value(serde_json::from_str(&text[start..=end]).ok()?)
}

fn from_value(value: serde_json::Value) -> Option<ParsedSynthesis> {
    let answer = value.get("answer")?.as_str()?.trim().to_string();
    if answer.is_empty() {
        return None;
    }

    let reasoning = value
        .get("reasoning")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_REASONING.to_string());

    let chunk_ids = value
        .get("source_chunk_ids")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(|s| s.to_string()))
                .collect()
        });

    Some(ParsedSynthesis {
        answer,
        reasoning,
        chunk_ids,
    })
}

/// Step 3: pattern extraction from prose that names the expected fields.
fn try_parse_fields(text: &str, answer_rx: &Regex, reasoning_rx: &Regex) -> Option<ParsedSynthesis> {
    let answer = answer_rx
        .captures(text)?
        .get(1)?
        .as_str()
        .trim()
        .to_string();
    if answer.is_empty() {
        return None;
    }

    let reasoning = reasoning_rx
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_REASONING.to_string());

    Some(ParsedSynthesis {
        answer,
        reasoning,
        chunk_ids: None,
    })
}

/// Step 4: the raw response is the answer. Guarantees a non-empty answer
/// even for an empty response.
fn raw_fallback(text: &str) -> ParsedSynthesis {
    let trimmed = text.trim();
    let answer = if trimmed.is_empty() {
        EMPTY_ANSWER.to_string()
    } else {
        trimmed.chars().take(RAW_ANSWER_LEN).collect()
    };

    ParsedSynthesis {
        answer,
        reasoning: UNSTRUCTURED_REASONING.to_string(),
        chunk_ids: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocumentChunk;
    use crate::providers::StubCompletion;

    fn scored(id: &str, company: &str, content: &str, score: f32) -> ScoredChunk {
        ScoredChunk {
            chunk: Arc::new(DocumentChunk {
                chunk_id: id.to_string(),
                content: content.to_string(),
                company: company.to_string(),
                year: "2023".to_string(),
                section: Some("Item 7".to_string()),
                page_number: Some(7),
                document_id: format!("{}-10k-2023", company.to_lowercase()),
            }),
            score,
        }
    }

    fn sample_evidence() -> Vec<(String, Vec<ScoredChunk>)> {
        vec![
            (
                "MSFT operating margin 2023".to_string(),
                vec![scored("msft-1", "MSFT", "MSFT operating margin was 42%", 0.9)],
            ),
            (
                "NVDA operating margin 2023".to_string(),
                vec![
                    scored("nvda-1", "NVDA", "NVDA operating margin was 54%", 0.88),
                    // duplicate across sub-queries
                    scored("msft-1", "MSFT", "MSFT operating margin was 42%", 0.4),
                ],
            ),
        ]
    }

    fn synthesizer(stub: StubCompletion) -> AnswerSynthesizer {
        AnswerSynthesizer::new(Arc::new(stub), 3, 200, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_valid_json_response() {
        let stub = StubCompletion::new(
            r#"{"answer": "NVIDIA had the highest margin at 54%.", "reasoning": "Compared margins.", "source_chunk_ids": ["nvda-1"]}"#,
        );
        let result = synthesizer(stub)
            .synthesize("Which company had the highest margin?", &sample_evidence())
            .await;

        assert_eq!(result.answer, "NVIDIA had the highest margin at 54%.");
        assert_eq!(result.reasoning, "Compared margins.");
        // Model-listed ids narrow the source set.
        assert_eq!(result.sources.len(), 1);
        assert_eq!(result.sources[0].chunk_id, "nvda-1");
    }

    #[tokio::test]
    async fn test_json_embedded_in_prose() {
        let stub = StubCompletion::new(
            "Here is my analysis:\n{\"answer\": \"42% for Microsoft\", \"reasoning\": \"From the filing\"}\nHope that helps.",
        );
        let result = synthesizer(stub)
            .synthesize("What was MSFT's margin?", &sample_evidence())
            .await;

        assert_eq!(result.answer, "42% for Microsoft");
        // No ids returned: sources come from the full deduped evidence set.
        assert_eq!(result.sources.len(), 2);
    }

    #[tokio::test]
    async fn test_prose_with_named_fields() {
        let stub = StubCompletion::new(
            "answer: NVIDIA led with a 54% operating margin\nreasoning: margins compared across filings",
        );
        let result = synthesizer(stub)
            .synthesize("Highest margin?", &sample_evidence())
            .await;

        assert_eq!(result.answer, "NVIDIA led with a 54% operating margin");
        assert_eq!(result.reasoning, "margins compared across filings");
    }

    #[tokio::test]
    async fn test_plain_prose_fallback() {
        let stub = StubCompletion::new("NVIDIA clearly outperformed the others last year.");
        let result = synthesizer(stub)
            .synthesize("Highest margin?", &sample_evidence())
            .await;

        assert_eq!(
            result.answer,
            "NVIDIA clearly outperformed the others last year."
        );
        assert_eq!(result.reasoning, UNSTRUCTURED_REASONING);
        assert_eq!(result.sources.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_response_still_yields_answer() {
        let stub = StubCompletion::new("");
        let result = synthesizer(stub)
            .synthesize("Highest margin?", &sample_evidence())
            .await;

        assert!(!result.answer.is_empty());
        assert_eq!(result.sources.len(), 2);
    }

    #[tokio::test]
    async fn test_completion_failure_degrades_to_evidence_summary() {
        let result = synthesizer(StubCompletion::failing())
            .synthesize("Highest margin?", &sample_evidence())
            .await;

        assert!(result.answer.starts_with("Based on available data:"));
        assert_eq!(result.sources.len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_chunk_ids_fall_back_to_evidence() {
        let stub = StubCompletion::new(
            r#"{"answer": "54%", "reasoning": "ok", "source_chunk_ids": ["made-up-id"]}"#,
        );
        let result = synthesizer(stub)
            .synthesize("Highest margin?", &sample_evidence())
            .await;

        // Never attribute to content that was not retrieved.
        assert_eq!(result.sources.len(), 2);
        assert!(result.sources.iter().all(|s| s.chunk_id != "made-up-id"));
    }

    #[test]
    fn test_dedupe_preserves_sub_query_order() {
        let deduped = dedupe_evidence(&sample_evidence());
        let ids: Vec<&str> = deduped.iter().map(|s| s.chunk.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["msft-1", "nvda-1"]);
    }
}
