//! Provider traits for the two external model capabilities
//!
//! The agent only ever needs `text -> vector` and `prompt -> text`. Both are
//! narrow trait seams so tests and the demo binary can substitute
//! deterministic stubs for the network-backed Gemini clients.

use crate::Result;
use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

pub mod gemini;
pub use gemini::{GeminiCompletion, GeminiEmbedding};

/// Maps text to a fixed-dimension vector. Pure function, no state.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
    fn dimension(&self) -> usize;
}

/// Single narrow capability used by classifier, decomposer and synthesizer.
#[async_trait]
pub trait TextCompletion: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

//
// ================= Deterministic Stubs =================
//

/// Deterministic bag-of-words embedding for tests and the offline demo.
///
/// Hashes each lowercase token into a fixed-dimension histogram and
/// L2-normalizes it, so texts sharing tokens score higher than unrelated
/// ones and identical text always embeds identically.
pub struct StubEmbedding {
    dimension: usize,
    delay_on: Option<(String, Duration)>,
    fail_on: Option<String>,
}

impl StubEmbedding {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            delay_on: None,
            fail_on: None,
        }
    }

    /// Sleep before embedding any text containing `needle`.
    pub fn delay_matching(mut self, needle: impl Into<String>, delay: Duration) -> Self {
        self.delay_on = Some((needle.into(), delay));
        self
    }

    /// Fail any embedding of text containing `needle`.
    pub fn fail_matching(mut self, needle: impl Into<String>) -> Self {
        self.fail_on = Some(needle.into());
        self
    }
}

#[async_trait]
impl EmbeddingProvider for StubEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(needle) = &self.fail_on {
            if text.contains(needle.as_str()) {
                return Err(crate::error::AgentError::EmbeddingError(format!(
                    "stub embedding failure for '{}'",
                    needle
                )));
            }
        }

        if let Some((needle, delay)) = &self.delay_on {
            if text.contains(needle.as_str()) {
                tokio::time::sleep(*delay).await;
            }
        }

        let mut vector = vec![0.0f32; self.dimension];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            token.to_lowercase().hash(&mut hasher);
            let slot = (hasher.finish() as usize) % self.dimension;
            vector[slot] += 1.0;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }

        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Rule-based completion stub. Returns the response of the first rule whose
/// needle appears in the prompt, otherwise the default response.
pub struct StubCompletion {
    rules: Vec<(String, String)>,
    default_response: String,
    fail: bool,
}

impl StubCompletion {
    pub fn new(default_response: impl Into<String>) -> Self {
        Self {
            rules: Vec::new(),
            default_response: default_response.into(),
            fail: false,
        }
    }

    /// A stub whose every call errors, for exercising fallback paths.
    pub fn failing() -> Self {
        Self {
            rules: Vec::new(),
            default_response: String::new(),
            fail: true,
        }
    }

    pub fn with_rule(mut self, needle: impl Into<String>, response: impl Into<String>) -> Self {
        self.rules.push((needle.into(), response.into()));
        self
    }
}

#[async_trait]
impl TextCompletion for StubCompletion {
    async fn complete(&self, prompt: &str) -> Result<String> {
        if self.fail {
            return Err(crate::error::AgentError::CompletionError(
                "stub completion failure".to_string(),
            ));
        }

        for (needle, response) in &self.rules {
            if prompt.contains(needle.as_str()) {
                return Ok(response.clone());
            }
        }

        Ok(self.default_response.clone())
    }
}
