use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use clap::builder::TypedValueParser;
use pdf_rag_core::providers::openai::{
    DEFAULT_BASE_URL, DEFAULT_CHAT_MODEL, DEFAULT_EMBEDDING_DIMENSIONS, DEFAULT_EMBEDDING_MODEL,
};
use pdf_rag_core::stores::pinecone::DEFAULT_CONTROL_URL;
use pdf_rag_core::{
    discover_pdf_files, CharacterNgramEmbedder, Embedder, IngestionOptions, Ingestor, OpenAiChat,
    OpenAiConfig, OpenAiEmbedder, PineconeConfig, PineconeStore, QdrantStore, QueryRequest,
    RetrievalOptions, Retriever, VectorStore, DEFAULT_INDEX_NAME, DEFAULT_NAMESPACE,
    DEFAULT_SYSTEM_PROMPT, DEFAULT_TOP_K, MAX_TOP_K,
};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum StoreKind {
    Pinecone,
    Qdrant,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum EmbedderKind {
    Openai,
    Ngram,
}

#[derive(Parser)]
#[command(name = "pdf-rag", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Vector store backend
    #[arg(long, value_enum, default_value_t = StoreKind::Pinecone)]
    store: StoreKind,

    /// Pinecone API key
    #[arg(long, env = "PINECONE_API_KEY", hide_env_values = true)]
    pinecone_api_key: Option<String>,

    /// Pinecone control plane URL
    #[arg(long, default_value = DEFAULT_CONTROL_URL)]
    pinecone_url: String,

    /// Cloud for newly created serverless indexes
    #[arg(long, default_value = "aws")]
    pinecone_cloud: String,

    /// Region for newly created serverless indexes
    #[arg(long, default_value = "us-east-1")]
    pinecone_region: String,

    /// Qdrant base URL
    #[arg(long, env = "QDRANT_URL", default_value = "http://localhost:6333")]
    qdrant_url: String,

    /// Qdrant API key
    #[arg(long, env = "QDRANT_API_KEY", hide_env_values = true)]
    qdrant_api_key: Option<String>,

    /// Embedding provider
    #[arg(long, value_enum, default_value_t = EmbedderKind::Openai)]
    embedder: EmbedderKind,

    /// OpenAI API key, used for embeddings and answers
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: Option<String>,

    /// OpenAI-compatible API base URL
    #[arg(long, env = "OPENAI_BASE_URL", default_value = DEFAULT_BASE_URL)]
    openai_base_url: String,

    /// Embedding model name
    #[arg(long, default_value = DEFAULT_EMBEDDING_MODEL)]
    embedding_model: String,

    /// Embedding dimensionality; must match the index
    #[arg(long, default_value_t = DEFAULT_EMBEDDING_DIMENSIONS)]
    embedding_dimensions: usize,

    /// Chat model used to answer questions
    #[arg(long, default_value = DEFAULT_CHAT_MODEL)]
    chat_model: String,

    /// Timeout for every remote call, in seconds
    #[arg(long, default_value = "60")]
    timeout_secs: u64,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest a PDF, or every PDF under a folder, into an index namespace.
    Ingest {
        /// PDF file or folder that contains PDFs recursively.
        #[arg(long)]
        path: String,
        /// Index to write into; created when absent.
        #[arg(long, default_value = DEFAULT_INDEX_NAME)]
        index_name: String,
        /// Namespace inside the index.
        #[arg(long, default_value = DEFAULT_NAMESPACE)]
        namespace: String,
        /// Maximum chunk length in characters.
        #[arg(long, default_value = "1000")]
        chunk_max_chars: usize,
        /// Characters shared by consecutive chunks.
        #[arg(long, default_value = "200")]
        chunk_overlap_chars: usize,
    },
    /// Answer a question from the chunks stored in an index namespace.
    Ask {
        /// Question to answer
        #[arg(long)]
        query: String,
        /// Number of chunks to retrieve as context.
        #[arg(long, default_value_t = DEFAULT_TOP_K,
              value_parser = clap::value_parser!(u8).range(1..=MAX_TOP_K as i64).map(usize::from))]
        top_k: usize,
        /// Index to query.
        #[arg(long, default_value = DEFAULT_INDEX_NAME)]
        index_name: String,
        /// Namespace inside the index.
        #[arg(long, default_value = DEFAULT_NAMESPACE)]
        namespace: String,
        /// System instructions for the language model.
        #[arg(long, default_value = DEFAULT_SYSTEM_PROMPT)]
        system_prompt: String,
        /// Print the retrieved chunks before the answer.
        #[arg(long, default_value_t = false)]
        show_context: bool,
    },
}

impl Cli {
    fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    fn openai_config(&self) -> anyhow::Result<OpenAiConfig> {
        let api_key = self
            .openai_api_key
            .clone()
            .context("an OpenAI API key is required (--openai-api-key or OPENAI_API_KEY)")?;
        Ok(OpenAiConfig {
            base_url: self.openai_base_url.clone(),
            timeout: self.timeout(),
            ..OpenAiConfig::new(api_key)
        })
    }

    fn build_store(&self) -> anyhow::Result<Box<dyn VectorStore>> {
        let store: Box<dyn VectorStore> = match self.store {
            StoreKind::Pinecone => {
                let api_key = self.pinecone_api_key.clone().context(
                    "a Pinecone API key is required (--pinecone-api-key or PINECONE_API_KEY)",
                )?;
                let config = PineconeConfig {
                    control_url: self.pinecone_url.clone(),
                    cloud: self.pinecone_cloud.clone(),
                    region: self.pinecone_region.clone(),
                    ready_timeout: self.timeout().mul_f32(0.75),
                    ..PineconeConfig::new(api_key)
                };
                Box::new(PineconeStore::new(config)?)
            }
            StoreKind::Qdrant => Box::new(QdrantStore::new(
                self.qdrant_url.clone(),
                self.qdrant_api_key.clone(),
            )?),
        };
        Ok(store)
    }

    fn build_embedder(&self) -> anyhow::Result<Box<dyn Embedder>> {
        let embedder: Box<dyn Embedder> = match self.embedder {
            EmbedderKind::Openai => Box::new(OpenAiEmbedder::new(
                &self.openai_config()?,
                self.embedding_model.clone(),
                self.embedding_dimensions,
            )?),
            EmbedderKind::Ngram => Box::new(CharacterNgramEmbedder::new(self.embedding_dimensions)),
        };
        Ok(embedder)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        store = ?cli.store,
        embedder = ?cli.embedder,
        "pdf-rag boot"
    );

    let store = cli.build_store()?;
    let embedder = cli.build_embedder()?;

    match &cli.command {
        Command::Ingest {
            path,
            index_name,
            namespace,
            chunk_max_chars,
            chunk_overlap_chars,
        } => {
            let options = IngestionOptions {
                chunk_max_chars: *chunk_max_chars,
                chunk_overlap_chars: *chunk_overlap_chars,
                timeout: cli.timeout(),
                ..IngestionOptions::default()
            };
            let ingestor = Ingestor::new(&*embedder, &*store, options);

            let root = Path::new(path);
            let files = if root.is_dir() {
                discover_pdf_files(root)
            } else {
                vec![root.to_path_buf()]
            };
            if files.is_empty() {
                bail!("no pdf files found in {}", root.display());
            }

            let mut failed = 0usize;
            for file in &files {
                match ingestor.ingest(file, index_name, namespace).await {
                    Ok(report) => println!("{}", serde_json::to_string(&report)?),
                    Err(error) => {
                        failed += 1;
                        warn!(
                            path = %file.display(),
                            kind = ?error.kind(),
                            reason = %error,
                            "ingest failed"
                        );
                    }
                }
            }

            info!(files = files.len(), failed, "ingest finished");
            if failed > 0 {
                bail!("{failed} of {} file(s) failed to ingest", files.len());
            }
        }
        Command::Ask {
            query,
            top_k,
            index_name,
            namespace,
            system_prompt,
            show_context,
        } => {
            let completion = OpenAiChat::new(&cli.openai_config()?, cli.chat_model.clone())?;
            let options = RetrievalOptions {
                system_prompt: system_prompt.clone(),
                timeout: cli.timeout(),
            };
            let retriever = Retriever::new(&*embedder, &*store, &completion, options);

            let request = QueryRequest {
                index_name: index_name.clone(),
                namespace: namespace.clone(),
                query_text: query.clone(),
                top_k: *top_k,
            };
            let (answer, hits) = retriever.answer_with_sources(&request).await?;

            if *show_context {
                for (rank, hit) in hits.iter().enumerate() {
                    println!("[{}] score={:.4}\n{}\n", rank + 1, hit.score, hit.chunk_text);
                }
            }
            println!("query: {}", answer.query_text);
            println!("answer: {}", answer.answer_text);
        }
    }

    Ok(())
}
