use crate::chunking::{chunk_pages, record_id, ChunkingConfig};
use crate::error::{DocumentError, RagError};
use crate::extractor::{LopdfExtractor, PdfExtractor};
use crate::index::ensure_index;
use crate::models::{
    Chunk, ChunkMetadata, DocumentFingerprint, EmbeddedChunk, IndexHandle, IngestionOptions,
    IngestionReport, Page, VectorRecord,
};
use crate::normalizer::normalize;
use crate::timeout::with_timeout;
use crate::traits::{Embedder, VectorStore};
use chrono::Utc;
use futures::{stream, StreamExt, TryStreamExt};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

pub fn digest_file(path: &Path) -> Result<String, DocumentError> {
    let bytes = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Drives load, normalize, chunk, embed and store for one document.
///
/// Every chunk is embedded before anything is written, so an embedding
/// failure leaves the namespace untouched. A failed write batch removes every
/// record the call sent, the failed batch included, before the error is
/// returned.
pub struct Ingestor<'a, E: ?Sized, S: ?Sized> {
    embedder: &'a E,
    store: &'a S,
    extractor: Arc<dyn PdfExtractor>,
    options: IngestionOptions,
    upload_dir: Option<PathBuf>,
}

impl<'a, E, S> Ingestor<'a, E, S>
where
    E: Embedder + ?Sized,
    S: VectorStore + ?Sized,
{
    pub fn new(embedder: &'a E, store: &'a S, options: IngestionOptions) -> Self {
        Self {
            embedder,
            store,
            extractor: Arc::new(LopdfExtractor),
            options,
            upload_dir: None,
        }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn PdfExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Directory for temporary upload files; the system temp dir otherwise.
    pub fn with_upload_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.upload_dir = Some(dir.into());
        self
    }

    pub async fn ingest(
        &self,
        path: &Path,
        index_name: &str,
        namespace: &str,
    ) -> Result<IngestionReport, RagError> {
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_string)
            .unwrap_or_else(|| path.display().to_string());
        let source_path = path.to_string_lossy().to_string();

        self.ingest_document(path, &filename, &source_path, index_name, namespace)
            .await
    }

    /// Ingests uploaded bytes through a temporary `.pdf` file that is removed
    /// when this call returns or is cancelled.
    pub async fn ingest_upload(
        &self,
        filename: &str,
        bytes: &[u8],
        index_name: &str,
        namespace: &str,
    ) -> Result<IngestionReport, RagError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("upload-").suffix(".pdf");
        let mut upload = match &self.upload_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(DocumentError::Io)?;

        upload.write_all(bytes).map_err(DocumentError::Io)?;
        upload.flush().map_err(DocumentError::Io)?;

        self.ingest_document(upload.path(), filename, filename, index_name, namespace)
            .await
    }

    async fn ingest_document(
        &self,
        path: &Path,
        filename: &str,
        source_path: &str,
        index_name: &str,
        namespace: &str,
    ) -> Result<IngestionReport, RagError> {
        let config = ChunkingConfig::from(&self.options);
        config.validate()?;

        let (checksum, pages) = self.load(path).await?;
        let fingerprint = DocumentFingerprint {
            document_id: checksum.clone(),
            document_title: filename.to_string(),
            source_path: source_path.to_string(),
            checksum,
            ingested_at: Utc::now(),
        };

        let clean_pages = normalize(&pages);
        let chunks = chunk_pages(&clean_pages, config)?;
        info!(
            file = filename,
            index = index_name,
            namespace,
            pages = clean_pages.len(),
            chunks = chunks.len(),
            "chunked document"
        );

        let embedded = self.embed_chunks(&chunks).await?;

        let target = ensure_index(
            self.store,
            index_name,
            self.embedder.dimensions(),
            self.options.timeout,
        )
        .await?
        .in_namespace(namespace);

        if let Some(mismatched) = embedded
            .iter()
            .find(|item| item.vector.len() != target.dimensionality)
        {
            return Err(RagError::DimensionMismatch {
                index: target.name.clone(),
                existing: target.dimensionality,
                requested: mismatched.vector.len(),
            });
        }

        let records = build_records(&target.namespace, &fingerprint, embedded);
        self.write_records(&target, &records).await?;

        info!(
            file = filename,
            index = index_name,
            namespace,
            records = records.len(),
            "ingest complete"
        );

        Ok(IngestionReport {
            filename: filename.to_string(),
            num_pages: clean_pages.len(),
            num_chunks: chunks.len(),
            status: format!(
                "Inserted into index '{index_name}' under namespace '{namespace}'"
            ),
        })
    }

    async fn load(&self, path: &Path) -> Result<(String, Vec<Page>), RagError> {
        let extractor = Arc::clone(&self.extractor);
        let path = path.to_path_buf();

        let loaded = tokio::task::spawn_blocking(move || {
            let pages = extractor.extract_pages(&path)?;
            let checksum = digest_file(&path)?;
            Ok::<_, DocumentError>((checksum, pages))
        })
        .await
        .map_err(|join| DocumentError::Io(std::io::Error::other(join)))??;

        Ok(loaded)
    }

    async fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<EmbeddedChunk>, RagError> {
        let embedder = self.embedder;
        let limit = self.options.timeout;

        let batches = stream::iter(chunks.chunks(self.options.embedding_batch_size.max(1)))
            .map(|batch| async move {
                let texts = batch.iter().map(|chunk| chunk.text.as_str()).collect::<Vec<_>>();
                let vectors = with_timeout("embed", limit, embedder.embed_batch(&texts)).await?;
                pair_with_chunks(batch, vectors)
            })
            .buffered(self.options.embedding_concurrency.max(1))
            .try_collect::<Vec<_>>()
            .await?;

        Ok(batches.into_iter().flatten().collect())
    }

    async fn write_records(
        &self,
        target: &IndexHandle,
        records: &[VectorRecord],
    ) -> Result<(), RagError> {
        let mut sent: Vec<String> = Vec::new();

        for batch in records.chunks(self.options.upsert_batch_size.max(1)) {
            // A failed or timed-out batch may still have been applied.
            sent.extend(batch.iter().map(|record| record.id.clone()));

            let result = with_timeout(
                "upsert",
                self.options.timeout,
                self.store.upsert(target, batch),
            )
            .await;

            if let Err(write_error) = result {
                self.roll_back(target, &sent).await;
                return Err(write_error);
            }

            debug!(written = sent.len(), total = records.len(), "upserted batch");
        }

        Ok(())
    }

    async fn roll_back(&self, target: &IndexHandle, ids: &[String]) {
        if ids.is_empty() {
            return;
        }

        match with_timeout("delete", self.options.timeout, self.store.delete(target, ids)).await {
            Ok(()) => warn!(
                index = %target.name,
                namespace = %target.namespace,
                removed = ids.len(),
                "rolled back partially written document"
            ),
            Err(rollback_error) => error!(
                index = %target.name,
                namespace = %target.namespace,
                orphaned = ids.len(),
                error = %rollback_error,
                "rollback of partially written document failed"
            ),
        }
    }
}

/// Attaches each vector to the chunk at the same position of the batch it
/// was requested for.
fn pair_with_chunks(
    batch: &[Chunk],
    vectors: Vec<Vec<f32>>,
) -> Result<Vec<EmbeddedChunk>, RagError> {
    if vectors.len() != batch.len() {
        return Err(RagError::EmbeddingService(format!(
            "embedding count {} doesn't match chunk count {}",
            vectors.len(),
            batch.len()
        )));
    }

    Ok(batch
        .iter()
        .cloned()
        .zip(vectors)
        .map(|(chunk, vector)| EmbeddedChunk { chunk, vector })
        .collect())
}

fn build_records(
    namespace: &str,
    document: &DocumentFingerprint,
    embedded: Vec<EmbeddedChunk>,
) -> Vec<VectorRecord> {
    let ingested_at = document.ingested_at.to_rfc3339();

    embedded
        .into_iter()
        .map(|EmbeddedChunk { chunk, vector }| VectorRecord {
            id: record_id(namespace, &document.document_id, &chunk),
            vector,
            metadata: ChunkMetadata {
                text: chunk.text,
                source_page: chunk.source_page,
                sequence_index: chunk.sequence_index,
                document_id: document.document_id.clone(),
                document_title: document.document_title.clone(),
                source_path: document.source_path.clone(),
                ingested_at: ingested_at.clone(),
            },
        })
        .collect()
}
