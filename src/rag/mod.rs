//! Retrieval over stored emails: chunking, embeddings, similarity search
//! and grounded answers that cite email ids.

pub mod chunking;
pub mod embedding;
pub mod service;

pub use embedding::{EmbeddingProvider, HttpEmbedder};
pub use service::{RagAnswer, RagConfig, RagService, RetrievedChunk};
