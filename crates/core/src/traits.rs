use crate::error::RagError;
use crate::models::{IndexHandle, RetrievedChunk, VectorRecord};
use async_trait::async_trait;

#[async_trait]
pub trait Embedder: Send + Sync {
    fn dimensions(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError>;

    /// Output position `i` must be the embedding of `texts[i]`.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, RagError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateIndexOutcome {
    Created,
    AlreadyExists,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    fn backend(&self) -> &'static str;

    /// Dimensionality of `index`, or `None` when it does not exist.
    async fn describe_index(&self, index: &str) -> Result<Option<usize>, RagError>;

    async fn create_index(
        &self,
        index: &str,
        dimensionality: usize,
    ) -> Result<CreateIndexOutcome, RagError>;

    async fn upsert(&self, target: &IndexHandle, records: &[VectorRecord]) -> Result<(), RagError>;

    async fn delete(&self, target: &IndexHandle, ids: &[String]) -> Result<(), RagError>;

    /// Nearest records in `target.namespace`, best score first.
    async fn query(
        &self,
        target: &IndexHandle,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, RagError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionPrompt<'a> {
    pub system: &'a str,
    pub question: &'a str,
    pub context: &'a str,
}

impl CompletionPrompt<'_> {
    pub fn user_message(&self) -> String {
        format!("Question: {}\n\nContext:\n{}", self.question, self.context)
    }
}

#[async_trait]
pub trait CompletionModel: Send + Sync {
    async fn complete(&self, prompt: &CompletionPrompt<'_>) -> Result<String, RagError>;
}
