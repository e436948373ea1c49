//! OpenAI-compatible embedding and chat completion clients.

use crate::error::RagError;
use crate::traits::{CompletionModel, CompletionPrompt, Embedder};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 1536;
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(60),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    fn client(&self) -> Result<Client, RagError> {
        let api_key = self.api_key.trim();
        if api_key.is_empty() {
            return Err(RagError::InvalidArgument("missing OpenAI API key".to_string()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {api_key}"))
                .map_err(|_| RagError::InvalidArgument("invalid OpenAI API key".to_string()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        Client::builder()
            .timeout(self.timeout)
            .default_headers(headers)
            .build()
            .map_err(|error| RagError::InvalidArgument(format!("http client: {error}")))
    }
}

/// Embeddings over `POST {base}/embeddings`.
#[derive(Clone)]
pub struct OpenAiEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    dimensions: usize,
}

impl OpenAiEmbedder {
    pub fn new(
        config: &OpenAiConfig,
        model: impl Into<String>,
        dimensions: usize,
    ) -> Result<Self, RagError> {
        let model = model.into();
        if model.trim().is_empty() {
            return Err(RagError::InvalidArgument("missing embedding model name".to_string()));
        }
        Ok(Self {
            client: config.client()?,
            endpoint: config.endpoint("embeddings"),
            model,
            dimensions,
        })
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
    dimensions: usize,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        let mut vectors = self.embed_batch(&[text]).await?;
        vectors
            .pop()
            .ok_or_else(|| RagError::EmbeddingService("empty embedding response".to_string()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, RagError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
            dimensions: self.dimensions,
        };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|error| RagError::EmbeddingService(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(RagError::EmbeddingService(format!(
                "embeddings request failed ({status}): {body}"
            )));
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|error| {
                RagError::EmbeddingService(format!("bad embedding response: {error}"))
            })?;
        parsed.data.sort_by_key(|entry| entry.index);

        if parsed.data.len() != texts.len() {
            return Err(RagError::EmbeddingService(format!(
                "received {} embeddings for {} inputs",
                parsed.data.len(),
                texts.len()
            )));
        }

        Ok(parsed.data.into_iter().map(|entry| entry.embedding).collect())
    }
}

/// Chat completions over `POST {base}/chat/completions`.
#[derive(Clone)]
pub struct OpenAiChat {
    client: Client,
    endpoint: String,
    model: String,
}

impl OpenAiChat {
    pub fn new(config: &OpenAiConfig, model: impl Into<String>) -> Result<Self, RagError> {
        let model = model.into();
        if model.trim().is_empty() {
            return Err(RagError::InvalidArgument("missing chat model name".to_string()));
        }
        Ok(Self {
            client: config.client()?,
            endpoint: config.endpoint("chat/completions"),
            model,
        })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl CompletionModel for OpenAiChat {
    async fn complete(&self, prompt: &CompletionPrompt<'_>) -> Result<String, RagError> {
        let user = prompt.user_message();
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &user,
                },
            ],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|error| RagError::CompletionService(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(RagError::CompletionService(format!(
                "chat completion failed ({status}): {text}"
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|error| {
                RagError::CompletionService(format!("bad completion response: {error}"))
            })?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| RagError::CompletionService("completion had no content".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server, ServerGuard};
    use serde_json::json;

    fn config_for(server: &ServerGuard) -> OpenAiConfig {
        OpenAiConfig {
            base_url: server.url(),
            ..OpenAiConfig::new("sk-test")
        }
    }

    #[tokio::test]
    async fn embeddings_are_paired_by_response_index() -> Result<(), RagError> {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/embeddings")
            .match_header("authorization", "Bearer sk-test")
            .match_body(Matcher::PartialJson(json!({
                "model": "text-embedding-3-small",
                "dimensions": 2
            })))
            .with_status(200)
            .with_body(
                r#"{"data":[
                    {"embedding":[0.0,1.0],"index":1},
                    {"embedding":[1.0,0.0],"index":0}
                ]}"#,
            )
            .create_async()
            .await;

        let embedder = OpenAiEmbedder::new(&config_for(&server), DEFAULT_EMBEDDING_MODEL, 2)?;
        let vectors = embedder.embed_batch(&["first", "second"]).await?;

        mock.assert_async().await;
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
        Ok(())
    }

    #[tokio::test]
    async fn embedding_failures_surface_as_service_errors() -> Result<(), RagError> {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/embeddings")
            .with_status(429)
            .with_body(r#"{"error":{"message":"quota exceeded"}}"#)
            .create_async()
            .await;

        let embedder = OpenAiEmbedder::new(&config_for(&server), DEFAULT_EMBEDDING_MODEL, 2)?;
        match embedder.embed("text").await {
            Err(RagError::EmbeddingService(details)) => assert!(details.contains("quota exceeded")),
            other => panic!("expected embedding service error, got {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn short_embedding_response_is_rejected() -> Result<(), RagError> {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/embeddings")
            .with_status(200)
            .with_body(r#"{"data":[{"embedding":[1.0,0.0],"index":0}]}"#)
            .create_async()
            .await;

        let embedder = OpenAiEmbedder::new(&config_for(&server), DEFAULT_EMBEDDING_MODEL, 2)?;
        let result = embedder.embed_batch(&["a", "b"]).await;
        assert!(matches!(result, Err(RagError::EmbeddingService(_))));
        Ok(())
    }

    #[tokio::test]
    async fn chat_sends_question_and_context() -> Result<(), RagError> {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_body(Matcher::AllOf(vec![
                Matcher::PartialJson(json!({ "model": "gpt-4o-mini" })),
                Matcher::Regex("Question: what pressure\\?".to_string()),
                Matcher::Regex("Context:\\\\n200 bar".to_string()),
            ]))
            .with_status(200)
            .with_body(r#"{"choices":[{"message":{"role":"assistant","content":"200 bar."}}]}"#)
            .create_async()
            .await;

        let chat = OpenAiChat::new(&config_for(&server), DEFAULT_CHAT_MODEL)?;
        let answer = chat
            .complete(&CompletionPrompt {
                system: "be brief",
                question: "what pressure?",
                context: "200 bar",
            })
            .await?;

        mock.assert_async().await;
        assert_eq!(answer, "200 bar.");
        Ok(())
    }

    #[tokio::test]
    async fn chat_errors_are_completion_errors() -> Result<(), RagError> {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(500)
            .create_async()
            .await;

        let chat = OpenAiChat::new(&config_for(&server), DEFAULT_CHAT_MODEL)?;
        let result = chat
            .complete(&CompletionPrompt {
                system: "s",
                question: "q",
                context: "",
            })
            .await;
        assert!(matches!(result, Err(RagError::CompletionService(_))));
        Ok(())
    }

    #[test]
    fn blank_api_key_is_rejected() {
        assert!(matches!(
            OpenAiEmbedder::new(&OpenAiConfig::new(" "), DEFAULT_EMBEDDING_MODEL, 8),
            Err(RagError::InvalidArgument(_))
        ));
    }
}
