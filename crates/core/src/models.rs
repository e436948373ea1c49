use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_INDEX_NAME: &str = "main";
pub const DEFAULT_NAMESPACE: &str = "default";
pub const DEFAULT_TOP_K: usize = 5;
pub const MAX_TOP_K: usize = 10;
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant using RAG.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub page_number: u32,
    pub raw_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanPage {
    pub page_number: u32,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub source_page: u32,
    pub sequence_index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedChunk {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentFingerprint {
    pub document_id: String,
    pub document_title: String,
    pub source_path: String,
    pub checksum: String,
    pub ingested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexHandle {
    pub name: String,
    pub namespace: String,
    pub dimensionality: usize,
}

impl IndexHandle {
    pub fn in_namespace(&self, namespace: impl Into<String>) -> Self {
        Self {
            name: self.name.clone(),
            namespace: namespace.into(),
            dimensionality: self.dimensionality,
        }
    }
}

/// Metadata stored next to every vector. `text` is what retrieval reads back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub text: String,
    pub source_page: u32,
    pub sequence_index: usize,
    pub document_id: String,
    pub document_title: String,
    pub source_path: String,
    pub ingested_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub metadata: ChunkMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryRequest {
    pub index_name: String,
    pub namespace: String,
    pub query_text: String,
    pub top_k: usize,
}

impl QueryRequest {
    pub fn new(query_text: impl Into<String>) -> Self {
        Self {
            index_name: DEFAULT_INDEX_NAME.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            query_text: query_text.into(),
            top_k: DEFAULT_TOP_K,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub chunk_text: String,
    pub score: f32,
}

pub type RetrievalResult = Vec<RetrievedChunk>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    #[serde(rename = "query")]
    pub query_text: String,
    #[serde(rename = "answer")]
    pub answer_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionReport {
    pub filename: String,
    pub num_pages: usize,
    pub num_chunks: usize,
    pub status: String,
}

#[derive(Debug, Clone)]
pub struct IngestionOptions {
    pub chunk_max_chars: usize,
    pub chunk_overlap_chars: usize,
    pub embedding_batch_size: usize,
    pub embedding_concurrency: usize,
    pub upsert_batch_size: usize,
    pub timeout: Duration,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            chunk_max_chars: 1_000,
            chunk_overlap_chars: 200,
            embedding_batch_size: 64,
            embedding_concurrency: 4,
            upsert_batch_size: 100,
            timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetrievalOptions {
    pub system_prompt: String,
    pub timeout: Duration,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}
