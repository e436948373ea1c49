use crate::error::RagError;
use crate::models::{IndexHandle, RetrievedChunk, VectorRecord};
use crate::traits::{CreateIndexOutcome, VectorStore};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

const BACKEND: &str = "memory";

#[derive(Debug, Default)]
struct MemoryIndex {
    dimensionality: usize,
    namespaces: HashMap<String, BTreeMap<String, VectorRecord>>,
}

/// Process-local store ranking by cosine similarity.
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    indexes: RwLock<HashMap<String, MemoryIndex>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records stored under `index`/`namespace`.
    pub async fn record_count(&self, index: &str, namespace: &str) -> usize {
        self.indexes
            .read()
            .await
            .get(index)
            .and_then(|found| found.namespaces.get(namespace))
            .map_or(0, BTreeMap::len)
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    async fn describe_index(&self, index: &str) -> Result<Option<usize>, RagError> {
        Ok(self
            .indexes
            .read()
            .await
            .get(index)
            .map(|found| found.dimensionality))
    }

    async fn create_index(
        &self,
        index: &str,
        dimensionality: usize,
    ) -> Result<CreateIndexOutcome, RagError> {
        let mut indexes = self.indexes.write().await;
        if indexes.contains_key(index) {
            return Ok(CreateIndexOutcome::AlreadyExists);
        }
        indexes.insert(
            index.to_string(),
            MemoryIndex {
                dimensionality,
                namespaces: HashMap::new(),
            },
        );
        Ok(CreateIndexOutcome::Created)
    }

    async fn upsert(&self, target: &IndexHandle, records: &[VectorRecord]) -> Result<(), RagError> {
        let mut indexes = self.indexes.write().await;
        let index = indexes
            .get_mut(&target.name)
            .ok_or_else(|| RagError::IndexNotFound(target.name.clone()))?;

        if let Some(record) = records
            .iter()
            .find(|record| record.vector.len() != index.dimensionality)
        {
            return Err(RagError::store_write(
                BACKEND,
                format!(
                    "vector dimension {} != {}",
                    record.vector.len(),
                    index.dimensionality
                ),
            ));
        }

        let namespace = index.namespaces.entry(target.namespace.clone()).or_default();
        for record in records {
            namespace.insert(record.id.clone(), record.clone());
        }
        Ok(())
    }

    async fn delete(&self, target: &IndexHandle, ids: &[String]) -> Result<(), RagError> {
        let mut indexes = self.indexes.write().await;
        let index = indexes
            .get_mut(&target.name)
            .ok_or_else(|| RagError::IndexNotFound(target.name.clone()))?;

        if let Some(namespace) = index.namespaces.get_mut(&target.namespace) {
            for id in ids {
                namespace.remove(id);
            }
        }
        Ok(())
    }

    async fn query(
        &self,
        target: &IndexHandle,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, RagError> {
        let indexes = self.indexes.read().await;
        let index = indexes
            .get(&target.name)
            .ok_or_else(|| RagError::IndexNotFound(target.name.clone()))?;

        if vector.len() != index.dimensionality {
            return Err(RagError::store_query(
                BACKEND,
                format!(
                    "query vector dimension {} != {}",
                    vector.len(),
                    index.dimensionality
                ),
            ));
        }

        let Some(namespace) = index.namespaces.get(&target.namespace) else {
            return Ok(Vec::new());
        };

        let mut scored = namespace
            .values()
            .map(|record| RetrievedChunk {
                chunk_text: record.metadata.text.clone(),
                score: cosine_similarity(vector, &record.vector),
            })
            .collect::<Vec<_>>();

        scored.sort_by(|left, right| right.score.total_cmp(&left.score));
        scored.truncate(top_k);
        Ok(scored)
    }
}

fn cosine_similarity(left: &[f32], right: &[f32]) -> f32 {
    let dot = left.iter().zip(right).map(|(a, b)| a * b).sum::<f32>();
    let left_norm = left.iter().map(|value| value * value).sum::<f32>().sqrt();
    let right_norm = right.iter().map(|value| value * value).sum::<f32>().sqrt();
    if left_norm == 0.0 || right_norm == 0.0 {
        0.0
    } else {
        dot / (left_norm * right_norm)
    }
}
