use crate::error::RagError;
use crate::models::{IndexHandle, RetrievedChunk, VectorRecord};
use crate::traits::{CreateIndexOutcome, VectorStore};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;
use url::Url;

const BACKEND: &str = "pinecone";
const API_VERSION: &str = "2024-07";
pub const DEFAULT_CONTROL_URL: &str = "https://api.pinecone.io";

#[derive(Debug, Clone)]
pub struct PineconeConfig {
    pub api_key: String,
    pub control_url: String,
    pub cloud: String,
    pub region: String,
    pub ready_poll_interval: Duration,
    /// Upper bound on waiting for a new index to report ready. Index creation
    /// runs under the caller's per-call timeout, so keep this below it.
    pub ready_timeout: Duration,
}

impl PineconeConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            control_url: DEFAULT_CONTROL_URL.to_string(),
            cloud: "aws".to_string(),
            region: "us-east-1".to_string(),
            ready_poll_interval: Duration::from_secs(1),
            ready_timeout: Duration::from_secs(45),
        }
    }
}

#[derive(Debug, Deserialize)]
struct IndexDescription {
    dimension: usize,
    host: String,
    #[serde(default)]
    status: IndexStatus,
}

#[derive(Debug, Default, Deserialize)]
struct IndexStatus {
    #[serde(default)]
    ready: bool,
}

/// Serverless Pinecone indexes. The index host is looked up per call, so the
/// store keeps no per-index state between requests.
pub struct PineconeStore {
    config: PineconeConfig,
    client: Client,
}

impl PineconeStore {
    pub fn new(config: PineconeConfig) -> Result<Self, RagError> {
        if config.api_key.trim().is_empty() {
            return Err(RagError::InvalidArgument("missing Pinecone API key".to_string()));
        }
        Url::parse(&config.control_url).map_err(|error| {
            RagError::InvalidArgument(format!("pinecone url {}: {error}", config.control_url))
        })?;

        Ok(Self {
            config: PineconeConfig {
                control_url: config.control_url.trim_end_matches('/').to_string(),
                ..config
            },
            client: Client::new(),
        })
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("Api-Key", self.config.api_key.trim())
            .header("X-Pinecone-API-Version", API_VERSION)
    }

    async fn describe(&self, index: &str) -> Result<Option<IndexDescription>, RagError> {
        let response = self
            .authorized(
                self.client
                    .get(format!("{}/indexes/{}", self.config.control_url, index)),
            )
            .send()
            .await
            .map_err(|error| RagError::store_query(BACKEND, error))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(RagError::store_query(BACKEND, response.status()));
        }

        response
            .json::<IndexDescription>()
            .await
            .map(Some)
            .map_err(|error| RagError::store_query(BACKEND, error))
    }

    async fn data_plane_url(&self, index: &str, path: &str) -> Result<String, RagError> {
        let description = self
            .describe(index)
            .await?
            .ok_or_else(|| RagError::IndexNotFound(index.to_string()))?;
        Ok(format!("{}{}", host_base(&description.host), path))
    }

    async fn wait_until_ready(&self, index: &str) -> Result<(), RagError> {
        let deadline = Instant::now() + self.config.ready_timeout;
        let mut attempt = 0usize;

        loop {
            if let Some(description) = self.describe(index).await? {
                if description.status.ready {
                    return Ok(());
                }
            }
            if Instant::now() + self.config.ready_poll_interval > deadline {
                return Err(RagError::store_write(
                    BACKEND,
                    format!(
                        "index {index} was created but not ready within {:?}",
                        self.config.ready_timeout
                    ),
                ));
            }
            debug!(index, attempt, "waiting for pinecone index to become ready");
            attempt += 1;
            tokio::time::sleep(self.config.ready_poll_interval).await;
        }
    }
}

fn host_base(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{host}")
    }
}

#[async_trait]
impl VectorStore for PineconeStore {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    async fn describe_index(&self, index: &str) -> Result<Option<usize>, RagError> {
        Ok(self.describe(index).await?.map(|description| description.dimension))
    }

    async fn create_index(
        &self,
        index: &str,
        dimensionality: usize,
    ) -> Result<CreateIndexOutcome, RagError> {
        let response = self
            .authorized(self.client.post(format!("{}/indexes", self.config.control_url)))
            .json(&json!({
                "name": index,
                "dimension": dimensionality,
                "metric": "cosine",
                "spec": {
                    "serverless": { "cloud": self.config.cloud, "region": self.config.region }
                },
            }))
            .send()
            .await
            .map_err(|error| RagError::store_write(BACKEND, error))?;

        let status = response.status();
        if status == StatusCode::CONFLICT {
            return Ok(CreateIndexOutcome::AlreadyExists);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::store_write(
                BACKEND,
                format!("index creation failed with {status}: {body}"),
            ));
        }

        self.wait_until_ready(index).await?;
        Ok(CreateIndexOutcome::Created)
    }

    async fn upsert(&self, target: &IndexHandle, records: &[VectorRecord]) -> Result<(), RagError> {
        if records.is_empty() {
            return Ok(());
        }

        let vectors = records
            .iter()
            .map(|record| {
                Ok(json!({
                    "id": record.id,
                    "values": record.vector,
                    "metadata": serde_json::to_value(&record.metadata)
                        .map_err(|error| RagError::store_write(BACKEND, error))?,
                }))
            })
            .collect::<Result<Vec<_>, RagError>>()?;

        let url = self.data_plane_url(&target.name, "/vectors/upsert").await?;
        let response = self
            .authorized(self.client.post(url))
            .json(&json!({ "vectors": vectors, "namespace": target.namespace }))
            .send()
            .await
            .map_err(|error| RagError::store_write(BACKEND, error))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::store_write(BACKEND, format!("{status}: {body}")));
        }
        Ok(())
    }

    async fn delete(&self, target: &IndexHandle, ids: &[String]) -> Result<(), RagError> {
        if ids.is_empty() {
            return Ok(());
        }

        let url = self.data_plane_url(&target.name, "/vectors/delete").await?;
        let response = self
            .authorized(self.client.post(url))
            .json(&json!({ "ids": ids, "namespace": target.namespace }))
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
        let url = self.data_plane_url(&target.name, "/query").await?;
        let response = self
            .authorized(self.client.post(url))
            .json(&json!({
                "namespace": target.namespace,
                "vector": vector,
                "topK": top_k,
                "includeMetadata": true,
                "includeValues": false,
            }))
            .send()
            .await
            .map_err(|error| RagError::store_query(BACKEND, error))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::store_query(BACKEND, format!("{status}: {body}")));
        }

        let parsed: Value = response
            .json()
            .await
            .map_err(|error| RagError::store_query(BACKEND, error))?;
        Ok(matches_from_response(&parsed))
    }
}

fn matches_from_response(parsed: &Value) -> Vec<RetrievedChunk> {
    parsed
        .pointer("/matches")
        .and_then(Value::as_array)
        .map(|matches| {
            matches
                .iter()
                .map(|found| RetrievedChunk {
                    chunk_text: found
                        .pointer("/metadata/text")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    score: found.pointer("/score").and_then(Value::as_f64).unwrap_or(0.0) as f32,
                })
                .collect()
        })
        .unwrap_or_default()
}
