//! sentinel-embeddings - Embedding providers for sentinel.
//!
//! Turns are embedded so the memory store can answer similarity queries.
//!
//! # Example
//!
//! ```ignore
//! use sentinel_embeddings::EmbedderFactory;
//!
//! let embedder = EmbedderFactory::ollama_with_model("nomic-embed-text", 768)?;
//! let vector = embedder.embed("checked the smoke alarm").await?;
//! ```

mod factory;
mod ollama;

pub use factory::EmbedderFactory;
pub use ollama::OllamaEmbedder;

// Re-export core types for convenience
pub use sentinel_core::traits::{Embedder, EmbedderConfig, EmbedderProvider};
