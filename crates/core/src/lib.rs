pub mod chunking;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod index;
pub mod ingest;
pub mod models;
pub mod normalizer;
pub mod providers;
pub mod retrieval;
pub mod stores;
pub mod timeout;
pub mod traits;

pub use chunking::{chunk_pages, record_id, split_with_overlap, ChunkingConfig};
pub use embeddings::{CharacterNgramEmbedder, DEFAULT_NGRAM_DIMENSIONS};
pub use error::{DocumentError, ErrorKind, RagError};
pub use extractor::{load_pages, load_pages_from_bytes, LopdfExtractor, PdfExtractor};
pub use index::{ensure_index, open_index};
pub use ingest::{digest_file, discover_pdf_files, Ingestor};
pub use models::{
    Answer, Chunk, ChunkMetadata, CleanPage, DocumentFingerprint, EmbeddedChunk, IndexHandle,
    IngestionOptions, IngestionReport, Page, QueryRequest, RetrievalOptions, RetrievalResult,
    RetrievedChunk, VectorRecord, DEFAULT_INDEX_NAME, DEFAULT_NAMESPACE, DEFAULT_SYSTEM_PROMPT,
    DEFAULT_TOP_K, MAX_TOP_K,
};
pub use normalizer::{normalize, normalize_text};
pub use providers::{OpenAiChat, OpenAiConfig, OpenAiEmbedder};
pub use retrieval::{assemble_context, Retriever};
pub use stores::{InMemoryVectorStore, PineconeConfig, PineconeStore, QdrantStore};
pub use timeout::with_timeout;
pub use traits::{CompletionModel, CompletionPrompt, CreateIndexOutcome, Embedder, VectorStore};
