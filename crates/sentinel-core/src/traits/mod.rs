//! Core traits for sentinel collaborators.

mod channel;
mod detector;
mod embedder;
mod llm;

pub use channel::*;
pub use detector::*;
pub use embedder::*;
pub use llm::*;
