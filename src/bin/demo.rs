//! Offline demonstration of the query pipeline.
//!
//! Seeds a three-company index and runs the canonical comparison query end
//! to end with stub providers, so the full pipeline can be exercised without
//! network access or API keys.

use financial_qa_agent::{
    agent::Orchestrator,
    classifier::QueryClassifier,
    config::AgentConfig,
    decomposer::QueryDecomposer,
    fanout::FanoutExecutor,
    index::{ChunkIndex, EmbeddedChunk},
    models::DocumentChunk,
    providers::{EmbeddingProvider, StubCompletion, StubEmbedding},
    retriever::Retriever,
    synthesizer::AnswerSynthesizer,
};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    info!("Financial Q&A Agent demo starting");

    let config = AgentConfig::default();
    let embedding = Arc::new(StubEmbedding::new(64));

    // Seed one operating-margin chunk per company.
    let index = Arc::new(ChunkIndex::new());
    let rows = [
        ("googl-1", "GOOGL", "GOOGL operating margin in 2023 was 27%", 12),
        ("msft-1", "MSFT", "MSFT operating margin in 2023 was 42%", 34),
        ("nvda-1", "NVDA", "NVDA operating margin in 2023 was 54%", 56),
    ];

    let mut entries = Vec::new();
    for (id, company, content, page) in rows {
        entries.push(EmbeddedChunk {
            chunk: DocumentChunk {
                chunk_id: id.to_string(),
                content: content.to_string(),
                company: company.to_string(),
                year: "2023".to_string(),
                section: Some("Item 7".to_string()),
                page_number: Some(page),
                document_id: format!("{}-10k-2023", company.to_lowercase()),
            },
            embedding: embedding.embed(content).await?,
        });
    }
    index.bulk_load(entries).await?;

    // Scripted model responses for each pipeline stage.
    let completion = Arc::new(
        StubCompletion::new("simple")
            .with_rule(
                "Break down this complex financial query",
                r#"["GOOGL operating margin 2023", "MSFT operating margin 2023", "NVDA operating margin 2023"]"#,
            )
            .with_rule(
                "You are a financial analyst",
                r#"{"answer": "NVDA had the highest operating margin in 2023 at 54%, ahead of MSFT (42%) and GOOGL (27%).", "reasoning": "Compared the operating margins reported by each company for 2023.", "source_chunk_ids": ["googl-1", "msft-1", "nvda-1"]}"#,
            ),
    );

    let retriever = Arc::new(Retriever::new(Arc::clone(&index), embedding, &config));

    let orchestrator = Orchestrator::new(
        QueryClassifier::new(completion.clone(), config.call_timeout),
        QueryDecomposer::new(
            completion.clone(),
            config.max_sub_queries,
            config.call_timeout,
        ),
        FanoutExecutor::new(retriever, config.max_concurrency, config.fanout_timeout),
        AnswerSynthesizer::new(
            completion,
            config.context_chunks_per_query,
            config.excerpt_len,
            config.call_timeout,
        ),
        config,
    );

    let query = "Which company had the highest operating margin in 2023?";
    info!(query, "Running query");

    let response = orchestrator.answer_query(query).await?;

    println!("\n=== QUERY RESPONSE ===");
    println!("Query: {}", response.query);
    println!("Answer: {}", response.answer);
    println!("Reasoning: {}", response.reasoning);
    println!("\nSub-queries:");
    for (i, sub) in response.sub_queries.iter().enumerate() {
        println!("  {}: {}", i + 1, sub);
    }
    println!("\nSources:");
    for source in &response.sources {
        println!(
            "  [{} {}] p.{:?} score={:.3} — {}",
            source.company, source.year, source.page, source.similarity_score, source.excerpt
        );
    }
    println!("\nProcessing time: {:.3}s", response.processing_time);

    Ok(())
}
