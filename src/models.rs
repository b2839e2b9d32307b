//! Core data models for the financial Q&A agent

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

//
// ================= Enums =================
//

/// Classification label for an incoming query.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum QueryLabel {
    Simple,
    Complex,
}

impl fmt::Display for QueryLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryLabel::Simple => write!(f, "simple"),
            QueryLabel::Complex => write!(f, "complex"),
        }
    }
}

/// Stage marker for the orchestrator state machine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QueryStage {
    Received,
    Classified,
    Decomposed,
    SkipDecompose,
    Retrieved,
    Synthesized,
    Done,
    Errored,
}

//
// ================= Chunks =================
//

/// Immutable unit of indexed text. Created during ingestion, never mutated,
/// replaced only by a full index rebuild.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub chunk_id: String,
    pub content: String,
    pub company: String,
    pub year: String,
    #[serde(default)]
    pub section: Option<String>,
    #[serde(default)]
    pub page_number: Option<u32>,
    pub document_id: String,
}

/// A chunk paired with its similarity score, produced per retrieval call.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub chunk: Arc<DocumentChunk>,
    pub score: f32,
}

/// Exact-match metadata filters applied during search. All present fields
/// must match (conjunction); a filter matching zero chunks yields an empty
/// result, not an error.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchFilters {
    pub company: Option<String>,
    pub year: Option<String>,
    pub section: Option<String>,
}

impl SearchFilters {
    pub fn is_empty(&self) -> bool {
        self.company.is_none() && self.year.is_none() && self.section.is_none()
    }

    pub fn matches(&self, chunk: &DocumentChunk) -> bool {
        if let Some(company) = &self.company {
            if &chunk.company != company {
                return false;
            }
        }
        if let Some(year) = &self.year {
            if &chunk.year != year {
                return false;
            }
        }
        if let Some(section) = &self.section {
            if chunk.section.as_deref() != Some(section.as_str()) {
                return false;
            }
        }
        true
    }
}

//
// ================= Sources =================
//

/// Attribution record derived from a retrieved chunk. Outward-facing only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub company: String,
    pub year: String,
    pub excerpt: String,
    pub page: Option<u32>,
    pub section: Option<String>,
    pub chunk_id: String,
    pub similarity_score: f32,
}

impl Source {
    /// Build a source from a scored chunk, truncating the excerpt.
    pub fn from_scored(scored: &ScoredChunk, excerpt_len: usize) -> Self {
        let content = &scored.chunk.content;
        let excerpt = if content.chars().count() > excerpt_len {
            let truncated: String = content.chars().take(excerpt_len).collect();
            format!("{}...", truncated)
        } else {
            content.clone()
        };

        Self {
            company: scored.chunk.company.clone(),
            year: scored.chunk.year.clone(),
            excerpt,
            page: scored.chunk.page_number,
            section: scored.chunk.section.clone(),
            chunk_id: scored.chunk.chunk_id.clone(),
            similarity_score: scored.score,
        }
    }
}

//
// ================= Agent State =================
//

/// Mutable record threaded through one query's processing. Owned by a single
/// query lifetime; never shared across concurrent queries.
#[derive(Debug, Clone)]
pub struct AgentState {
    pub query_id: Uuid,
    pub query: String,
    pub stage: QueryStage,
    pub label: Option<QueryLabel>,
    pub sub_queries: Vec<String>,
    /// Evidence per sub-query, in sub-query submission order.
    pub evidence: Vec<(String, Vec<ScoredChunk>)>,
    pub answer: String,
    pub reasoning: String,
    pub sources: Vec<Source>,
    pub started_at: DateTime<Utc>,
}

impl AgentState {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query_id: Uuid::new_v4(),
            query: query.into(),
            stage: QueryStage::Received,
            label: None,
            sub_queries: Vec::new(),
            evidence: Vec::new(),
            answer: String::new(),
            reasoning: String::new(),
            sources: Vec::new(),
            started_at: Utc::now(),
        }
    }
}

//
// ================= API Models =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default)]
    pub max_results: Option<usize>,
}

/// Final response object for one answered query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub query: String,
    pub answer: String,
    pub reasoning: String,
    pub sub_queries: Vec<String>,
    pub sources: Vec<Source>,
    /// Seconds from query receipt to response assembly.
    pub processing_time: f64,
}

/// Statistics about the chunk index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStats {
    pub total_chunks: usize,
    pub companies: Vec<String>,
    pub years: Vec<String>,
    pub sections: Vec<String>,
    pub embedding_dimension: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_chunk() -> DocumentChunk {
        DocumentChunk {
            chunk_id: "msft-2023-0001".to_string(),
            content: "Microsoft's total revenue in fiscal year 2023 was $211.9 billion."
                .to_string(),
            company: "MSFT".to_string(),
            year: "2023".to_string(),
            section: Some("Item 7".to_string()),
            page_number: Some(42),
            document_id: "msft-10k-2023".to_string(),
        }
    }

    #[test]
    fn test_filter_conjunction() {
        let chunk = sample_chunk();

        let mut filters = SearchFilters::default();
        assert!(filters.matches(&chunk));

        filters.company = Some("MSFT".to_string());
        filters.year = Some("2023".to_string());
        assert!(filters.matches(&chunk));

        filters.year = Some("2022".to_string());
        assert!(!filters.matches(&chunk));

        filters.year = None;
        filters.section = Some("Item 1A".to_string());
        assert!(!filters.matches(&chunk));
    }

    #[test]
    fn test_excerpt_truncation() {
        let chunk = sample_chunk();
        let scored = ScoredChunk {
            chunk: Arc::new(chunk),
            score: 0.91,
        };

        let short = Source::from_scored(&scored, 10);
        assert!(short.excerpt.ends_with("..."));
        assert_eq!(short.excerpt.chars().count(), 13);

        let full = Source::from_scored(&scored, 500);
        assert!(!full.excerpt.ends_with("..."));
        assert_eq!(full.chunk_id, "msft-2023-0001");
    }

    #[test]
    fn test_label_serialization() {
        assert_eq!(
            serde_json::to_string(&QueryLabel::Complex).unwrap(),
            "\"complex\""
        );
        assert_eq!(QueryLabel::Simple.to_string(), "simple");
    }
}
