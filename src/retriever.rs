//! Retriever: query string → ranked scored chunks
//!
//! Thin composition of the embedding provider and the chunk index. The
//! embedding call crosses the system boundary and is wrapped with the
//! per-call timeout; index search is local and cheap.

use crate::config::AgentConfig;
use crate::error::AgentError;
use crate::index::ChunkIndex;
use crate::models::{ScoredChunk, SearchFilters};
use crate::providers::EmbeddingProvider;
use crate::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub struct Retriever {
    index: Arc<ChunkIndex>,
    embedding: Arc<dyn EmbeddingProvider>,
    call_timeout: Duration,
}

impl Retriever {
    pub fn new(
        index: Arc<ChunkIndex>,
        embedding: Arc<dyn EmbeddingProvider>,
        config: &AgentConfig,
    ) -> Self {
        Self {
            index,
            embedding,
            call_timeout: config.call_timeout,
        }
    }

    pub fn index(&self) -> &Arc<ChunkIndex> {
        &self.index
    }

    /// Embed the query and return the top-k most similar chunks, descending
    /// by score. An embedding timeout or failure is a retrieval error; the
    /// fan-out layer degrades it to empty evidence for that sub-query.
    pub async fn search(
        &self,
        query: &str,
        k: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<ScoredChunk>> {
        let vector = tokio::time::timeout(self.call_timeout, self.embedding.embed(query))
            .await
            .map_err(|_| {
                AgentError::RetrievalError(format!("embedding timed out for '{}'", query))
            })??;

        let results = self.index.search(&vector, k, filters).await?;

        debug!(query = %query, results = results.len(), "Retrieval complete");

        Ok(results)
    }
}
