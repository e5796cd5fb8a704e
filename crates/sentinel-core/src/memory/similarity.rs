//! Vector helpers for turn embeddings.

use zerocopy::byteorder::little_endian::F32;
use zerocopy::{FromBytes, IntoBytes};

/// Cosine similarity in `[-1, 1]`. Zero for empty, mismatched or zero-norm input.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Cosine distance, `1 - similarity`.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}

/// Encode as little-endian `f32`s regardless of host byte order.
pub(crate) fn vector_to_bytes(vector: &[f32]) -> Vec<u8> {
    let le: Vec<F32> = vector.iter().copied().map(F32::new).collect();
    le.as_bytes().to_vec()
}

/// Decode a little-endian BLOB. A length that is not a multiple of four
/// yields an empty vector, which similarity search skips.
pub(crate) fn bytes_to_vector(bytes: &[u8]) -> Vec<f32> {
    match <[F32]>::ref_from_bytes(bytes) {
        Ok(values) => values.iter().map(|v| v.get()).collect(),
        Err(_) => Vec::new(),
    }
}
