//! Query orchestrator - the per-query state machine
//!
//! RECEIVED → CLASSIFIED → {DECOMPOSED | SKIP-DECOMPOSE} → RETRIEVED →
//! SYNTHESIZED → DONE
//!
//! Every stage has a guaranteed-progress contract (classification falls back
//! to simple, decomposition to the original query, retrieval to empty
//! evidence, synthesis to a degraded answer), so the only fatal path is the
//! embedding provider or index being unreachable for the whole query.

use crate::classifier::QueryClassifier;
use crate::config::AgentConfig;
use crate::decomposer::QueryDecomposer;
use crate::error::AgentError;
use crate::fanout::FanoutExecutor;
use crate::models::{AgentState, QueryLabel, QueryResponse, QueryStage};
use crate::synthesizer::AnswerSynthesizer;
use crate::Result;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Sequences classifier, decomposer, fan-out executor and synthesizer for
/// one query at a time. Holds no per-query state itself; each call threads
/// its own AgentState.
pub struct Orchestrator {
    classifier: QueryClassifier,
    decomposer: QueryDecomposer,
    executor: FanoutExecutor,
    synthesizer: AnswerSynthesizer,
    config: AgentConfig,
}

impl Orchestrator {
    pub fn new(
        classifier: QueryClassifier,
        decomposer: QueryDecomposer,
        executor: FanoutExecutor,
        synthesizer: AnswerSynthesizer,
        config: AgentConfig,
    ) -> Self {
        Self {
            classifier,
            decomposer,
            executor,
            synthesizer,
            config,
        }
    }

    /// Answer one query. Returns a complete response or a single explicit
    /// error; never a partial result.
    pub async fn answer_query(&self, query: &str) -> Result<QueryResponse> {
        let start_time = Instant::now();
        let mut state = AgentState::new(query);

        info!(
            query_id = ?state.query_id,
            query = %state.query,
            "Orchestrator: query received"
        );

        // === CLASSIFY ===
        let label = self.classifier.classify(&state.query).await;
        state.label = Some(label);
        state.stage = QueryStage::Classified;
        debug!(query_id = ?state.query_id, label = %label, "Query classified");

        // === DECOMPOSE / SKIP ===
        state.sub_queries = match label {
            QueryLabel::Simple => {
                state.stage = QueryStage::SkipDecompose;
                vec![state.query.clone()]
            }
            QueryLabel::Complex => {
                let sub_queries = self.decomposer.decompose(&state.query).await;
                if sub_queries.is_empty() {
                    // Malformed decomposition output: fall back to the
                    // original query rather than failing the request.
                    warn!(query_id = ?state.query_id, "Decomposition yielded nothing, using original query");
                    state.stage = QueryStage::SkipDecompose;
                    vec![state.query.clone()]
                } else {
                    state.stage = QueryStage::Decomposed;
                    sub_queries
                }
            }
        };

        debug!(
            query_id = ?state.query_id,
            sub_queries = state.sub_queries.len(),
            "Sub-queries prepared"
        );

        // === RETRIEVE (fan-out) ===
        let outcome = self
            .executor
            .execute(&state.sub_queries, self.config.top_k)
            .await;

        // Fatal only when every retrieval attempt failed hard.
        if outcome.failed == outcome.results.len() && outcome.failed > 0 {
            warn!(query_id = ?state.query_id, "All sub-query retrievals failed");
            state.stage = QueryStage::Errored;
            return Err(AgentError::ProviderUnavailable(
                "retrieval failed for every sub-query".to_string(),
            ));
        }

        state.evidence = outcome.results;
        state.stage = QueryStage::Retrieved;

        // === SYNTHESIZE ===
        let synthesis = self
            .synthesizer
            .synthesize(&state.query, &state.evidence)
            .await;
        state.answer = synthesis.answer;
        state.reasoning = synthesis.reasoning;
        state.sources = synthesis.sources;
        state.stage = QueryStage::Synthesized;

        // === DONE ===
        state.stage = QueryStage::Done;
        let processing_time = start_time.elapsed().as_secs_f64();

        info!(
            query_id = ?state.query_id,
            sub_queries = state.sub_queries.len(),
            sources = state.sources.len(),
            elapsed_secs = processing_time,
            "Orchestrator: query complete"
        );

        Ok(QueryResponse {
            query: state.query,
            answer: state.answer,
            reasoning: state.reasoning,
            sub_queries: state.sub_queries,
            sources: state.sources,
            processing_time,
        })
    }
}
