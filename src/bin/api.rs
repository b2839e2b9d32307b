use financial_qa_agent::{
    agent::Orchestrator,
    api::{start_server, ApiState},
    classifier::QueryClassifier,
    config::AgentConfig,
    decomposer::QueryDecomposer,
    fanout::FanoutExecutor,
    index::ChunkIndex,
    providers::{GeminiCompletion, GeminiEmbedding},
    retriever::Retriever,
    synthesizer::AnswerSynthesizer,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // Load environment variables
    dotenv::dotenv().ok();

    let gemini_api_key = std::env::var("GEMINI_API_KEY").unwrap_or_else(|_| {
        eprintln!("GEMINI_API_KEY not set in .env — model calls will fail");
        String::new()
    });

    let port: u16 = std::env::var("PORT")
        .or_else(|_| std::env::var("API_PORT"))
        .unwrap_or_else(|_| "8000".to_string())
        .parse()?;

    let snapshot_path = PathBuf::from(
        std::env::var("INDEX_SNAPSHOT_PATH")
            .unwrap_or_else(|_| "data/vector_index.json".to_string()),
    );

    let config = AgentConfig::from_env();

    info!("Financial Q&A Agent - API server");
    info!(port, snapshot = %snapshot_path.display(), "Starting up");

    // Load the chunk index snapshot produced by ingestion (empty if absent).
    let index = Arc::new(ChunkIndex::load_from(&snapshot_path)?);
    info!(chunks = index.len().await, "Chunk index ready");

    // Wire the providers and pipeline components
    let embedding = Arc::new(GeminiEmbedding::new(
        gemini_api_key.clone(),
        config.call_timeout,
    )?);
    let completion = Arc::new(GeminiCompletion::new(gemini_api_key, config.call_timeout)?);

    let retriever = Arc::new(Retriever::new(Arc::clone(&index), embedding, &config));

    let orchestrator = Arc::new(Orchestrator::new(
        QueryClassifier::new(completion.clone(), config.call_timeout),
        QueryDecomposer::new(
            completion.clone(),
            config.max_sub_queries,
            config.call_timeout,
        ),
        FanoutExecutor::new(
            Arc::clone(&retriever),
            config.max_concurrency,
            config.fanout_timeout,
        ),
        AnswerSynthesizer::new(
            completion,
            config.context_chunks_per_query,
            config.excerpt_len,
            config.call_timeout,
        ),
        config.clone(),
    ));

    info!("Orchestrator initialized");

    start_server(
        ApiState {
            orchestrator,
            retriever,
            search_k: config.top_k,
        },
        port,
    )
    .await?;

    Ok(())
}
