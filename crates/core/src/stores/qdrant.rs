use crate::error::RagError;
use crate::models::{IndexHandle, RetrievedChunk, VectorRecord};
use crate::traits::{CreateIndexOutcome, VectorStore};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::{json, Value};
use url::Url;

const BACKEND: &str = "qdrant";
const NAMESPACE_FIELD: &str = "namespace";

/// Qdrant collections act as indexes; namespaces are a filtered payload field.
pub struct QdrantStore {
    endpoint: String,
    api_key: Option<String>,
    client: Client,
}

impl QdrantStore {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Result<Self, RagError> {
        let endpoint = endpoint.into();
        Url::parse(&endpoint)
            .map_err(|error| RagError::InvalidArgument(format!("qdrant url {endpoint}: {error}")))?;

        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            client: Client::new(),
        })
    }

    fn collection_url(&self, collection: &str) -> String {
        format!("{}/collections/{}", self.endpoint, collection)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("api-key", key),
            None => request,
        }
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    async fn describe_index(&self, index: &str) -> Result<Option<usize>, RagError> {
        let response = self
            .authorized(self.client.get(self.collection_url(index)))
            .send()
            .await
            .map_err(|error| RagError::store_query(BACKEND, error))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(RagError::store_query(BACKEND, response.status()));
        }

        let parsed: Value = response
            .json()
            .await
            .map_err(|error| RagError::store_query(BACKEND, error))?;
        collection_dimension(&parsed).map(Some).ok_or_else(|| {
            RagError::store_query(BACKEND, format!("collection {index} has no single vector size"))
        })
    }

    async fn create_index(
        &self,
        index: &str,
        dimensionality: usize,
    ) -> Result<CreateIndexOutcome, RagError> {
        let response = self
            .authorized(self.client.put(self.collection_url(index)))
            .json(&json!({
                "vectors": { "size": dimensionality, "distance": "Cosine" },
            }))
            .send()
            .await
            .map_err(|error| RagError::store_write(BACKEND, error))?;

        let status = response.status();
        if status.is_success() {
            return Ok(CreateIndexOutcome::Created);
        }
        if status == StatusCode::CONFLICT {
            return Ok(CreateIndexOutcome::AlreadyExists);
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::BAD_REQUEST && body.contains("already exists") {
            return Ok(CreateIndexOutcome::AlreadyExists);
        }
        Err(RagError::store_write(
            BACKEND,
            format!("collection setup failed with {status}: {body}"),
        ))
    }

    async fn upsert(&self, target: &IndexHandle, records: &[VectorRecord]) -> Result<(), RagError> {
        if records.is_empty() {
            return Ok(());
        }

        let points = records
            .iter()
            .map(|record| {
                let mut payload = serde_json::to_value(&record.metadata)
                    .map_err(|error| RagError::store_write(BACKEND, error))?;
                payload[NAMESPACE_FIELD] = json!(target.namespace);
                Ok(json!({
                    "id": record.id,
                    "vector": record.vector,
                    "payload": payload,
                }))
            })
            .collect::<Result<Vec<_>, RagError>>()?;

        let response = self
            .authorized(
                self.client
                    .put(format!("{}/points?wait=true", self.collection_url(&target.name))),
            )
            .json(&json!({ "points": points }))
            .send()
            .await
            .map_err(|error| RagError::store_write(BACKEND, error))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(RagError::IndexNotFound(target.name.clone())),
            status if !status.is_success() => Err(RagError::store_write(BACKEND, status)),
            _ => Ok(()),
        }
    }

    async fn delete(&self, target: &IndexHandle, ids: &[String]) -> Result<(), RagError> {
        if ids.is_empty() {
            return Ok(());
        }

        let response = self
            .authorized(self.client.post(format!(
                "{}/points/delete?wait=true",
                self.collection_url(&target.name)
            )))
            .json(&json!({
                "filter": {
                    "must": [
                        { "has_id": ids },
                        { "key": NAMESPACE_FIELD, "match": { "value": target.namespace } }
                    ]
                }
            }))
            .send()
            .await
            .map_err(|error| RagError::store_write(BACKEND, error))?;

        if !response.status().is_success() {
            return Err(RagError::store_write(BACKEND, response.status()));
        }
        Ok(())
    }

    async fn query(
        &self,
        target: &IndexHandle,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, RagError> {
        let response = self
            .authorized(
                self.client
                    .post(format!("{}/points/search", self.collection_url(&target.name))),
            )
            .json(&json!({
                "vector": vector,
                "limit": top_k,
                "with_payload": true,
                "filter": {
                    "must": [{ "key": NAMESPACE_FIELD, "match": { "value": target.namespace } }]
                },
            }))
            .send()
            .await
            .map_err(|error| RagError::store_query(BACKEND, error))?;

        match response.status() {
            StatusCode::NOT_FOUND => return Err(RagError::IndexNotFound(target.name.clone())),
            status if !status.is_success() => {
                return Err(RagError::store_query(BACKEND, status));
            }
            _ => {}
        }

        let parsed: Value = response
            .json()
            .await
            .map_err(|error| RagError::store_query(BACKEND, error))?;
        Ok(hits_from_response(&parsed))
    }
}

fn collection_dimension(parsed: &Value) -> Option<usize> {
    parsed
        .pointer("/result/config/params/vectors/size")
        .and_then(Value::as_u64)
        .map(|size| size as usize)
}

fn hits_from_response(parsed: &Value) -> Vec<RetrievedChunk> {
    parsed
        .pointer("/result")
        .and_then(Value::as_array)
        .map(|hits| {
            hits.iter()
                .map(|hit| RetrievedChunk {
                    chunk_text: hit
                        .pointer("/payload/text")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    score: hit.pointer("/score").and_then(Value::as_f64).unwrap_or(0.0) as f32,
                })
                .collect()
        })
        .unwrap_or_default()
}
