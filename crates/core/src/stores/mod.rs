pub mod memory;
pub mod pinecone;
pub mod qdrant;

pub use memory::InMemoryVectorStore;
pub use pinecone::{PineconeConfig, PineconeStore};
pub use qdrant::QdrantStore;
