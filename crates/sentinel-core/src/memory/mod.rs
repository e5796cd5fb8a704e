//! Persistent conversation memory.

mod similarity;
mod store;

pub use similarity::{cosine_distance, cosine_similarity};
pub use store::{MemoryStore, PruneStats, SqliteMemoryStore};
