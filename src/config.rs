//! Runtime configuration
//!
//! All tunables are read once at process start and passed explicitly to the
//! orchestrator and its collaborators. No global singletons.

use std::env;
use std::time::Duration;

/// Configuration for one agent instance.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Results requested per sub-query retrieval.
    pub top_k: usize,
    /// Ceiling on decomposed sub-queries per query.
    pub max_sub_queries: usize,
    /// Chunks embedded into the synthesis prompt per sub-query.
    pub context_chunks_per_query: usize,
    /// Character length of source excerpts.
    pub excerpt_len: usize,
    /// Concurrent retrieval tasks during fan-out.
    pub max_concurrency: usize,
    /// Timeout applied to each boundary call (embedding, completion, search).
    pub call_timeout: Duration,
    /// Global bound on total fan-out duration.
    pub fanout_timeout: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            max_sub_queries: 8,
            context_chunks_per_query: 3,
            excerpt_len: 200,
            max_concurrency: 4,
            call_timeout: Duration::from_secs(15),
            fanout_timeout: Duration::from_secs(45),
        }
    }
}

impl AgentConfig {
    /// Build configuration from environment variables, falling back to
    /// defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            top_k: env_usize("AGENT_TOP_K", defaults.top_k),
            max_sub_queries: env_usize("AGENT_MAX_SUB_QUERIES", defaults.max_sub_queries),
            context_chunks_per_query: env_usize(
                "AGENT_CONTEXT_CHUNKS",
                defaults.context_chunks_per_query,
            ),
            excerpt_len: env_usize("AGENT_EXCERPT_LEN", defaults.excerpt_len),
            max_concurrency: env_usize("AGENT_MAX_CONCURRENCY", defaults.max_concurrency).max(1),
            call_timeout: env_secs("AGENT_CALL_TIMEOUT_SECS", defaults.call_timeout),
            fanout_timeout: env_secs("AGENT_FANOUT_TIMEOUT_SECS", defaults.fanout_timeout),
        }
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_secs(key: &str, default: Duration) -> Duration {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AgentConfig::default();
        assert_eq!(config.top_k, 5);
        assert_eq!(config.max_sub_queries, 8);
        assert!(config.fanout_timeout > config.call_timeout);
    }

    #[test]
    fn test_env_parse_fallback() {
        assert_eq!(env_usize("AGENT_TEST_UNSET_KEY", 7), 7);
        assert_eq!(
            env_secs("AGENT_TEST_UNSET_KEY", Duration::from_secs(3)),
            Duration::from_secs(3)
        );
    }
}
