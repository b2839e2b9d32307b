//! Fan-out executor
//!
//! Runs one retrieval task per sub-query concurrently against the shared
//! read-only index, bounded by a concurrency limit to cap embedding-provider
//! load and by a global timeout on total fan-out duration. Results are
//! re-assembled into sub-query submission order regardless of completion
//! order, so synthesis input is deterministic.
//!
//! A sub-query whose retrieval errors or misses the deadline contributes an
//! empty evidence set; partial results are preferred over total failure.

use crate::models::{ScoredChunk, SearchFilters};
use crate::retriever::Retriever;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Ordered per-sub-query evidence plus a count of hard retrieval failures
/// (provider errors, not deadline misses). The orchestrator treats
/// "every sub-query failed hard" as infrastructure unavailability.
pub struct FanoutOutcome {
    pub results: Vec<(String, Vec<ScoredChunk>)>,
    pub failed: usize,
}

pub struct FanoutExecutor {
    retriever: Arc<Retriever>,
    limit: Arc<Semaphore>,
    fanout_timeout: Duration,
}

impl FanoutExecutor {
    pub fn new(retriever: Arc<Retriever>, max_concurrency: usize, fanout_timeout: Duration) -> Self {
        Self {
            retriever,
            limit: Arc::new(Semaphore::new(max_concurrency.max(1))),
            fanout_timeout,
        }
    }

    pub async fn execute(&self, sub_queries: &[String], k: usize) -> FanoutOutcome {
        let deadline = Instant::now() + self.fanout_timeout;

        let mut handles = Vec::with_capacity(sub_queries.len());
        for sub_query in sub_queries {
            let retriever = Arc::clone(&self.retriever);
            let limit = Arc::clone(&self.limit);
            let query = sub_query.clone();

            handles.push(tokio::spawn(async move {
                // Closed-semaphore errors cannot happen; the semaphore lives
                // as long as the executor.
                let _permit = limit.acquire_owned().await;
                retriever.search(&query, k, &SearchFilters::default()).await
            }));
        }

        let mut results = Vec::with_capacity(sub_queries.len());
        let mut failed = 0;

        // Join in submission order; the tasks themselves run concurrently.
        for (sub_query, mut handle) in sub_queries.iter().zip(handles) {
            let evidence = match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(Ok(chunks))) => chunks,
                Ok(Ok(Err(e))) => {
                    warn!(sub_query = %sub_query, error = %e, "Sub-query retrieval failed");
                    failed += 1;
                    Vec::new()
                }
                Ok(Err(join_err)) => {
                    warn!(sub_query = %sub_query, error = %join_err, "Retrieval task aborted");
                    Vec::new()
                }
                Err(_) => {
                    warn!(sub_query = %sub_query, "Fan-out deadline reached, dropping sub-query");
                    handle.abort();
                    Vec::new()
                }
            };

            debug!(sub_query = %sub_query, chunks = evidence.len(), "Sub-query joined");
            results.push((sub_query.clone(), evidence));
        }

        FanoutOutcome { results, failed }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgentConfig;
    use crate::index::{ChunkIndex, EmbeddedChunk};
    use crate::models::DocumentChunk;
    use crate::providers::{EmbeddingProvider, StubEmbedding};

    async fn seeded_index(provider: &StubEmbedding) -> Arc<ChunkIndex> {
        let index = Arc::new(ChunkIndex::new());

        let texts = [
            ("googl-1", "GOOGL", "GOOGL operating margin 2023 was 27%"),
            ("msft-1", "MSFT", "MSFT operating margin 2023 was 42%"),
            ("nvda-1", "NVDA", "NVDA operating margin 2023 was 54%"),
        ];

        let mut entries = Vec::new();
        for (id, company, content) in texts {
            entries.push(EmbeddedChunk {
                chunk: DocumentChunk {
                    chunk_id: id.to_string(),
                    content: content.to_string(),
                    company: company.to_string(),
                    year: "2023".to_string(),
                    section: Some("Item 7".to_string()),
                    page_number: Some(5),
                    document_id: format!("{}-10k-2023", company.to_lowercase()),
                },
                embedding: provider.embed(content).await.unwrap(),
            });
        }
        index.bulk_load(entries).await.unwrap();
        index
    }

    fn executor(
        index: Arc<ChunkIndex>,
        provider: Arc<dyn EmbeddingProvider>,
        fanout_timeout: Duration,
    ) -> FanoutExecutor {
        let config = AgentConfig::default();
        let retriever = Arc::new(Retriever::new(index, provider, &config));
        FanoutExecutor::new(retriever, config.max_concurrency, fanout_timeout)
    }

    fn margin_sub_queries() -> Vec<String> {
        vec![
            "GOOGL operating margin 2023".to_string(),
            "MSFT operating margin 2023".to_string(),
            "NVDA operating margin 2023".to_string(),
        ]
    }

    #[tokio::test]
    async fn test_order_preserved_despite_slow_retrieval() {
        // Index is seeded with a plain stub; only query-time embedding is
        // slowed, so the first sub-query finishes last.
        let index = seeded_index(&StubEmbedding::new(64)).await;
        let slow = StubEmbedding::new(64).delay_matching("GOOGL", Duration::from_millis(150));
        let executor = executor(index, Arc::new(slow), Duration::from_secs(10));

        let sub_queries = margin_sub_queries();
        let outcome = executor.execute(&sub_queries, 2).await;

        assert_eq!(outcome.failed, 0);
        let order: Vec<&str> = outcome.results.iter().map(|(q, _)| q.as_str()).collect();
        assert_eq!(order, sub_queries.iter().map(|s| s.as_str()).collect::<Vec<_>>());
        assert!(outcome.results.iter().all(|(_, ev)| !ev.is_empty()));
        // Each sub-query's best hit is its own company.
        assert_eq!(outcome.results[0].1[0].chunk.company, "GOOGL");
        assert_eq!(outcome.results[2].1[0].chunk.company, "NVDA");
    }

    #[tokio::test]
    async fn test_failed_sub_query_yields_empty_not_abort() {
        let index = seeded_index(&StubEmbedding::new(64)).await;
        let flaky = StubEmbedding::new(64).fail_matching("MSFT");
        let executor = executor(index, Arc::new(flaky), Duration::from_secs(10));

        let outcome = executor.execute(&margin_sub_queries(), 2).await;

        assert_eq!(outcome.failed, 1);
        assert!(!outcome.results[0].1.is_empty());
        assert!(outcome.results[1].1.is_empty());
        assert!(!outcome.results[2].1.is_empty());
    }

    #[tokio::test]
    async fn test_global_timeout_drops_pending_sub_queries() {
        let index = seeded_index(&StubEmbedding::new(64)).await;
        let stalled = StubEmbedding::new(64).delay_matching("NVDA", Duration::from_secs(30));
        let executor = executor(index, Arc::new(stalled), Duration::from_millis(300));

        let outcome = executor.execute(&margin_sub_queries(), 2).await;

        // Timed-out sub-query is empty, not counted as a hard failure.
        assert_eq!(outcome.failed, 0);
        assert!(!outcome.results[0].1.is_empty());
        assert!(outcome.results[2].1.is_empty());
    }

    #[tokio::test]
    async fn test_all_failures_counted() {
        let broken = StubEmbedding::new(64).fail_matching("margin");
        let index = seeded_index(&StubEmbedding::new(64)).await;
        let executor = executor(index, Arc::new(broken), Duration::from_secs(10));

        let outcome = executor.execute(&margin_sub_queries(), 2).await;
        assert_eq!(outcome.failed, 3);
        assert!(outcome.results.iter().all(|(_, ev)| ev.is_empty()));
    }
}
