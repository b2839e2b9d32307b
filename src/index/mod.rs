//! Chunk index: similarity search over embedded document chunks
//!
//! The index owns a single immutable snapshot (chunks + normalized vectors)
//! behind an RwLock'd Arc. Readers clone the Arc and search without holding
//! the lock, so concurrent queries need no mutual exclusion; a bulk load
//! builds a complete replacement snapshot and swaps it in atomically.
//! Readers always see either the fully-old or fully-new snapshot.

use crate::error::AgentError;
use crate::models::{DocumentChunk, IndexStats, ScoredChunk, SearchFilters};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// A chunk paired with its precomputed embedding, as produced by ingestion
/// and persisted in snapshot files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddedChunk {
    pub chunk: DocumentChunk,
    pub embedding: Vec<f32>,
}

/// On-disk snapshot format. Self-describing: the dimension is stored so a
/// reload can validate vectors without re-deriving it.
#[derive(Debug, Serialize, Deserialize)]
struct SnapshotFile {
    dimension: usize,
    chunks: Vec<EmbeddedChunk>,
}

/// Immutable in-memory snapshot. Chunks and vectors are parallel arrays;
/// they are built together and never independently.
struct IndexSnapshot {
    dimension: usize,
    chunks: Vec<Arc<DocumentChunk>>,
    vectors: Vec<Vec<f32>>,
}

impl IndexSnapshot {
    fn empty() -> Self {
        Self {
            dimension: 0,
            chunks: Vec::new(),
            vectors: Vec::new(),
        }
    }
}

/// Shared, read-mostly chunk index.
pub struct ChunkIndex {
    snapshot: RwLock<Arc<IndexSnapshot>>,
}

impl ChunkIndex {
    pub fn new() -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(IndexSnapshot::empty())),
        }
    }

    /// Replace the entire index contents atomically. Vectors are
    /// L2-normalized on the way in so search scores are cosine similarities.
    pub async fn bulk_load(&self, entries: Vec<EmbeddedChunk>) -> Result<()> {
        let snapshot = build_snapshot(entries)?;
        let count = snapshot.chunks.len();

        // Exclusive access only for the pointer swap itself.
        let mut guard = self.snapshot.write().await;
        *guard = Arc::new(snapshot);
        drop(guard);

        info!(chunks = count, "Chunk index rebuilt");
        Ok(())
    }

    /// Top-k similarity search against the current snapshot. Filters restrict
    /// candidates before ranking; score ties resolve by insertion order.
    pub async fn search(
        &self,
        query_vector: &[f32],
        k: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<ScoredChunk>> {
        let snapshot = self.snapshot.read().await.clone();

        if snapshot.chunks.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        if query_vector.len() != snapshot.dimension {
            return Err(AgentError::IndexError(format!(
                "query vector dimension {} does not match index dimension {}",
                query_vector.len(),
                snapshot.dimension
            )));
        }

        let query = normalize(query_vector.to_vec());

        let mut scored: Vec<ScoredChunk> = snapshot
            .chunks
            .iter()
            .zip(snapshot.vectors.iter())
            .filter(|(chunk, _)| filters.matches(chunk))
            .map(|(chunk, vector)| ScoredChunk {
                chunk: Arc::clone(chunk),
                score: dot(&query, vector),
            })
            .collect();

        // Stable sort: equal scores keep insertion order.
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        Ok(scored)
    }

    pub async fn len(&self) -> usize {
        self.snapshot.read().await.chunks.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Distinct metadata values and size of the current snapshot.
    pub async fn stats(&self) -> IndexStats {
        let snapshot = self.snapshot.read().await.clone();

        let mut companies = BTreeSet::new();
        let mut years = BTreeSet::new();
        let mut sections = BTreeSet::new();

        for chunk in &snapshot.chunks {
            companies.insert(chunk.company.clone());
            years.insert(chunk.year.clone());
            if let Some(section) = &chunk.section {
                sections.insert(section.clone());
            }
        }

        IndexStats {
            total_chunks: snapshot.chunks.len(),
            companies: companies.into_iter().collect(),
            years: years.into_iter().collect(),
            sections: sections.into_iter().collect(),
            embedding_dimension: snapshot.dimension,
        }
    }

    /// Persist the current snapshot to disk as JSON.
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        let snapshot = self.snapshot.read().await.clone();

        let file = SnapshotFile {
            dimension: snapshot.dimension,
            chunks: snapshot
                .chunks
                .iter()
                .zip(snapshot.vectors.iter())
                .map(|(chunk, vector)| EmbeddedChunk {
                    chunk: (**chunk).clone(),
                    embedding: vector.clone(),
                })
                .collect(),
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string(&file)?;
        std::fs::write(path, json)?;

        info!(path = %path.display(), chunks = file.chunks.len(), "Index snapshot saved");
        Ok(())
    }

    /// Load an index from a snapshot file. A missing file yields an empty
    /// index so a fresh deployment can start before ingestion has run.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(path = %path.display(), "No index snapshot found, starting empty");
            return Ok(Self::new());
        }

        let raw = std::fs::read_to_string(path)?;
        let file: SnapshotFile = serde_json::from_str(&raw)
            .map_err(|e| AgentError::SnapshotError(format!("invalid snapshot file: {}", e)))?;

        let expected = file.dimension;
        let snapshot = build_snapshot(file.chunks)?;
        if snapshot.dimension != 0 && expected != 0 && snapshot.dimension != expected {
            return Err(AgentError::SnapshotError(format!(
                "snapshot declares dimension {} but vectors have dimension {}",
                expected, snapshot.dimension
            )));
        }

        info!(path = %path.display(), chunks = snapshot.chunks.len(), "Index snapshot loaded");

        Ok(Self {
            snapshot: RwLock::new(Arc::new(snapshot)),
        })
    }
}

impl Default for ChunkIndex {
    fn default() -> Self {
        Self::new()
    }
}

fn build_snapshot(entries: Vec<EmbeddedChunk>) -> Result<IndexSnapshot> {
    let mut snapshot = IndexSnapshot::empty();

    for entry in entries {
        if entry.embedding.is_empty() {
            return Err(AgentError::IndexError(format!(
                "chunk {} has an empty embedding",
                entry.chunk.chunk_id
            )));
        }

        if snapshot.dimension == 0 {
            snapshot.dimension = entry.embedding.len();
        } else if entry.embedding.len() != snapshot.dimension {
            return Err(AgentError::IndexError(format!(
                "chunk {} has dimension {} but index dimension is {}",
                entry.chunk.chunk_id,
                entry.embedding.len(),
                snapshot.dimension
            )));
        }

        snapshot.chunks.push(Arc::new(entry.chunk));
        snapshot.vectors.push(normalize(entry.embedding));
    }

    Ok(snapshot)
}

fn normalize(mut vector: Vec<f32>) -> Vec<f32> {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut vector {
            *v /= norm;
        }
    }
    vector
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
