//! Gemini API clients for text completion and embeddings
//!
//! Uses long-lived reqwest::Clients for connection pooling. Every request
//! carries a hard timeout; callers treat failures as transient faults.

use crate::error::AgentError;
use crate::providers::{EmbeddingProvider, TextCompletion};
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info};

const COMPLETION_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent";
const EMBEDDING_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/text-embedding-004:embedContent";

/// Embedding width of text-embedding-004.
const EMBEDDING_DIMENSION: usize = 768;

fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .pool_idle_timeout(Duration::from_secs(90))
        .pool_max_idle_per_host(8)
        .timeout(timeout)
        .build()
        .map_err(AgentError::from)
}

//
// ================= Completion =================
//

/// Reusable Gemini completion client (connection-pooled).
pub struct GeminiCompletion {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GeminiCompletion {
    pub fn new(api_key: String, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            api_key,
            base_url: COMPLETION_URL.to_string(),
        })
    }
}

#[async_trait]
impl TextCompletion for GeminiCompletion {
    async fn complete(&self, prompt: &str) -> Result<String> {
        if self.api_key.is_empty() {
            return Err(AgentError::ConfigError(
                "GEMINI_API_KEY not configured".to_string(),
            ));
        }

        let url = format!("{}?key={}", self.base_url, self.api_key);

        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.3,
                top_p: 0.9,
                top_k: 40,
                max_output_tokens: 1024,
            },
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("Gemini completion request failed: {}", e);
                AgentError::CompletionError(format!("Gemini API error: {}", e))
            })?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Gemini completion error response: {}", error_text);
            return Err(AgentError::CompletionError(format!(
                "Gemini API error: {}",
                error_text
            )));
        }

        let body: GenerateResponse = response.json().await.map_err(|e| {
            error!("Failed to parse Gemini response: {}", e);
            AgentError::CompletionError(format!("Gemini parse error: {}", e))
        })?;

        let text = body
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.clone())
            .ok_or_else(|| {
                AgentError::CompletionError("Empty response from Gemini".to_string())
            })?;

        info!(chars = text.len(), "Gemini completion received");

        Ok(text)
    }
}

//
// ================= Embedding =================
//

/// Reusable Gemini embedding client.
pub struct GeminiEmbedding {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GeminiEmbedding {
    pub fn new(api_key: String, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            api_key,
            base_url: EMBEDDING_URL.to_string(),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if self.api_key.is_empty() {
            return Err(AgentError::ConfigError(
                "GEMINI_API_KEY not configured".to_string(),
            ));
        }

        let url = format!("{}?key={}", self.base_url, self.api_key);

        let request = EmbedRequest {
            model: "models/text-embedding-004".to_string(),
            content: Content {
                parts: vec![Part {
                    text: text.to_string(),
                }],
            },
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("Gemini embedding request failed: {}", e);
                AgentError::EmbeddingError(format!("Gemini API error: {}", e))
            })?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Gemini embedding error response: {}", error_text);
            return Err(AgentError::EmbeddingError(format!(
                "Gemini API error: {}",
                error_text
            )));
        }

        let body: EmbedResponse = response
            .json()
            .await
            .map_err(|e| AgentError::EmbeddingError(format!("Gemini parse error: {}", e)))?;

        if body.embedding.values.is_empty() {
            return Err(AgentError::EmbeddingError(
                "Empty embedding from Gemini".to_string(),
            ));
        }

        Ok(body.embedding.values)
    }

    fn dimension(&self) -> usize {
        EMBEDDING_DIMENSION
    }
}

//
// ================= Wire Types =================
//

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "topP")]
    top_p: f32,
    #[serde(rename = "topK")]
    top_k: i32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: i32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}

#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    content: Content,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}
