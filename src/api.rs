//! REST API server for the financial Q&A agent
//!
//! Exposes the orchestrator and the retrieval engine over HTTP under
//! /api/v1. The caller always receives either a complete QueryResponse or a
//! single explicit error body — never a partial response.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::agent::Orchestrator;
use crate::error::AgentError;
use crate::models::{QueryRequest, SearchFilters};
use crate::retriever::Retriever;

/// =============================
/// State & Error Body
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
    pub retriever: Arc<Retriever>,
    pub search_k: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: String,
    pub timestamp: String,
}

impl ErrorBody {
    fn new(kind: &str, message: String) -> Self {
        Self {
            error: message,
            kind: kind.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

fn error_response(err: AgentError) -> (StatusCode, Json<ErrorBody>) {
    let (status, kind) = match &err {
        AgentError::ProviderUnavailable(_) => {
            (StatusCode::SERVICE_UNAVAILABLE, "provider_unavailable")
        }
        AgentError::ConfigError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config"),
        AgentError::IndexError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "index"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
    };

    (status, Json(ErrorBody::new(kind, err.to_string())))
}

/// =============================
/// Query Endpoint
/// =============================

async fn answer_query(
    State(state): State<ApiState>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<crate::models::QueryResponse>, (StatusCode, Json<ErrorBody>)> {
    let query = req.query.trim();
    if query.is_empty() {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ErrorBody::new("bad_request", "query must not be empty".into())),
        ));
    }

    if state.retriever.index().is_empty().await {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorBody::new(
                "empty_index",
                "No documents loaded. Run ingestion before querying.".into(),
            )),
        ));
    }

    info!(query = %query, "Received query request");

    match state.orchestrator.answer_query(query).await {
        Ok(response) => Ok(Json(response)),
        Err(e) => {
            warn!(error = %e, "Query processing failed");
            Err(error_response(e))
        }
    }
}

/// =============================
/// Search Endpoint
/// =============================

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub query: String,
    pub k: Option<usize>,
    pub company: Option<String>,
    pub year: Option<String>,
    pub section: Option<String>,
}

#[derive(Debug, Serialize)]
struct SearchHit {
    content: String,
    similarity_score: f32,
    company: String,
    year: String,
    section: Option<String>,
    page: Option<u32>,
    chunk_id: String,
}

#[derive(Debug, Serialize)]
struct SearchResponse {
    query: String,
    results: Vec<SearchHit>,
    total_found: usize,
}

async fn search_documents(
    State(state): State<ApiState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, (StatusCode, Json<ErrorBody>)> {
    let filters = SearchFilters {
        company: params.company,
        year: params.year,
        section: params.section,
    };
    let k = params.k.unwrap_or(state.search_k);

    let results = state
        .retriever
        .search(&params.query, k, &filters)
        .await
        .map_err(error_response)?;

    let hits: Vec<SearchHit> = results
        .into_iter()
        .map(|scored| {
            let content = if scored.chunk.content.chars().count() > 500 {
                let truncated: String = scored.chunk.content.chars().take(500).collect();
                format!("{}...", truncated)
            } else {
                scored.chunk.content.clone()
            };
            SearchHit {
                content,
                similarity_score: scored.score,
                company: scored.chunk.company.clone(),
                year: scored.chunk.year.clone(),
                section: scored.chunk.section.clone(),
                page: scored.chunk.page_number,
                chunk_id: scored.chunk.chunk_id.clone(),
            }
        })
        .collect();

    Ok(Json(SearchResponse {
        total_found: hits.len(),
        query: params.query,
        results: hits,
    }))
}

/// =============================
/// Status Endpoints
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn stats(State(state): State<ApiState>) -> Json<serde_json::Value> {
    let stats = state.retriever.index().stats().await;
    Json(serde_json::json!({
        "vector_store": stats,
        "system_status": "operational"
    }))
}

async fn companies(State(state): State<ApiState>) -> Json<serde_json::Value> {
    let stats = state.retriever.index().stats().await;
    Json(serde_json::json!({
        "companies": stats.companies,
        "years": stats.years,
        "sections": stats.sections,
    }))
}

/// =============================
/// Router & Server Startup
/// =============================

pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/stats", get(stats))
        .route("/api/v1/companies", get(companies))
        .route("/api/v1/query", post(answer_query))
        .route("/api/v1/search", get(search_documents))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

pub async fn start_server(
    state: ApiState,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API server listening on http://0.0.0.0:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_body_kinds() {
        let (status, body) =
            error_response(AgentError::ProviderUnavailable("all retrievals failed".into()));
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body.kind, "provider_unavailable");

        let (status, body) = error_response(AgentError::SynthesisError("boom".into()));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.kind, "internal");
    }
}
