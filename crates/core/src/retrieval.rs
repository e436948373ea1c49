use crate::error::RagError;
use crate::index::open_index;
use crate::models::{
    Answer, QueryRequest, RetrievalOptions, RetrievalResult, RetrievedChunk, MAX_TOP_K,
};
use crate::timeout::with_timeout;
use crate::traits::{CompletionModel, CompletionPrompt, Embedder, VectorStore};
use tracing::{debug, info};

/// Answers questions from an index: embed, query, assemble context, complete.
pub struct Retriever<'a, E: ?Sized, S: ?Sized, C: ?Sized> {
    embedder: &'a E,
    store: &'a S,
    completion: &'a C,
    options: RetrievalOptions,
}

impl<'a, E, S, C> Retriever<'a, E, S, C>
where
    E: Embedder + ?Sized,
    S: VectorStore + ?Sized,
    C: CompletionModel + ?Sized,
{
    pub fn new(
        embedder: &'a E,
        store: &'a S,
        completion: &'a C,
        options: RetrievalOptions,
    ) -> Self {
        Self {
            embedder,
            store,
            completion,
            options,
        }
    }

    /// Chunks nearest to the query, best first. An empty or unknown namespace
    /// yields an empty result; an unknown index is an error.
    pub async fn retrieve(&self, request: &QueryRequest) -> Result<RetrievalResult, RagError> {
        validate(request)?;
        let limit = self.options.timeout;

        let query_vector =
            with_timeout("embed", limit, self.embedder.embed(&request.query_text)).await?;
        let target = open_index(self.store, &request.index_name, &request.namespace, limit).await?;

        if query_vector.len() != target.dimensionality {
            return Err(RagError::DimensionMismatch {
                index: target.name,
                existing: target.dimensionality,
                requested: query_vector.len(),
            });
        }

        let hits = with_timeout(
            "query",
            limit,
            self.store.query(&target, &query_vector, request.top_k),
        )
        .await?;

        debug!(
            index = %target.name,
            namespace = %target.namespace,
            hits = hits.len(),
            "retrieved chunks"
        );
        Ok(hits)
    }

    /// Always calls the model, even with no context; the model is left to
    /// say it has nothing to ground the answer on.
    pub async fn answer(&self, request: &QueryRequest) -> Result<Answer, RagError> {
        self.answer_with_sources(request)
            .await
            .map(|(answer, _hits)| answer)
    }

    /// Like [`Retriever::answer`], also returning the chunks used as context.
    pub async fn answer_with_sources(
        &self,
        request: &QueryRequest,
    ) -> Result<(Answer, RetrievalResult), RagError> {
        let hits = self.retrieve(request).await?;
        let context = assemble_context(&hits);

        let prompt = CompletionPrompt {
            system: &self.options.system_prompt,
            question: &request.query_text,
            context: &context,
        };
        let answer_text = with_timeout(
            "completion",
            self.options.timeout,
            self.completion.complete(&prompt),
        )
        .await?;

        info!(
            index = %request.index_name,
            namespace = %request.namespace,
            context_chunks = hits.len(),
            "answered query"
        );

        let answer = Answer {
            query_text: request.query_text.clone(),
            answer_text,
        };
        Ok((answer, hits))
    }
}

pub fn assemble_context(hits: &[RetrievedChunk]) -> String {
    hits.iter()
        .map(|hit| hit.chunk_text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

fn validate(request: &QueryRequest) -> Result<(), RagError> {
    if request.query_text.trim().is_empty() {
        return Err(RagError::InvalidArgument("query is empty".to_string()));
    }
    if request.top_k == 0 || request.top_k > MAX_TOP_K {
        return Err(RagError::InvalidArgument(format!(
            "top_k must be between 1 and {MAX_TOP_K}, got {}",
            request.top_k
        )));
    }
    if request.index_name.trim().is_empty() {
        return Err(RagError::InvalidArgument("index name is empty".to_string()));
    }
    Ok(())
}
