//! Financial Q&A Agent
//!
//! Answers natural-language financial questions over a corpus of embedded
//! document chunks:
//! - Classifies each query as simple or complex
//! - Decomposes complex queries into atomic sub-queries
//! - Fans retrieval out across sub-queries concurrently
//! - Synthesizes one structured answer with source attribution
//!
//! PIPELINE:
//! RECEIVED → CLASSIFIED → {DECOMPOSED | SKIP} → RETRIEVED → SYNTHESIZED → DONE

pub mod agent;
pub mod api;
pub mod classifier;
pub mod config;
pub mod decomposer;
pub mod error;
pub mod fanout;
pub mod index;
pub mod models;
pub mod providers;
pub mod retriever;
pub mod synthesizer;

pub use error::{AgentError, Result};

// Re-export common types
pub use config::AgentConfig;
pub use models::*;
