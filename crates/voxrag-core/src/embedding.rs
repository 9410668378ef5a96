//! Embedding types, the [`Embedder`] trait and vector utilities.
//!
//! Embedding services never fail loudly: an input whose embedding could not
//! be produced is represented as [`Embedding::Degraded`] instead of an error
//! or a silent all-zero vector. Scoring treats a degraded embedding as having
//! zero similarity to everything, and may additionally penalize it.
//!
//! Concrete embedders (OpenAI, Ollama, local models) live in the `voxrag`
//! app crate.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One embedding vector, or a marker that the service failed for this input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Embedding {
    Vector { values: Vec<f32> },
    Degraded { dims: usize },
}

impl Embedding {
    pub fn vector(values: Vec<f32>) -> Self {
        Embedding::Vector { values }
    }

    pub fn degraded(dims: usize) -> Self {
        Embedding::Degraded { dims }
    }

    /// The vector, or `None` for a degraded embedding.
    pub fn as_slice(&self) -> Option<&[f32]> {
        match self {
            Embedding::Vector { values } => Some(values),
            Embedding::Degraded { .. } => None,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Embedding::Degraded { .. })
    }

    pub fn dims(&self) -> usize {
        match self {
            Embedding::Vector { values } => values.len(),
            Embedding::Degraded { dims } => *dims,
        }
    }

    /// Dense form for backends that cannot store a marker: zeros when degraded.
    pub fn to_dense(&self) -> Vec<f32> {
        match self {
            Embedding::Vector { values } => values.clone(),
            Embedding::Degraded { dims } => vec![0.0; *dims],
        }
    }
}

/// An embedding service.
///
/// `embed` returns exactly one [`Embedding`] per input, in input order.
/// Transport and service failures are reported as
/// [`Embedding::Degraded`] entries, never as errors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;

    /// Vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;

    async fn embed(&self, texts: &[String]) -> Vec<Embedding>;

    async fn embed_one(&self, text: &str) -> Embedding {
        self.embed(&[text.to_string()])
            .await
            .into_iter()
            .next()
            .unwrap_or_else(|| Embedding::degraded(self.dims()))
    }
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, and `0.0` for empty vectors, vectors
/// of different lengths, or when either vector is all zeros.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    (dot / denom).clamp(-1.0, 1.0)
}

/// Cosine similarity between two [`Embedding`]s; `0.0` if either is degraded.
pub fn embedding_similarity(a: &Embedding, b: &Embedding) -> f32 {
    match (a.as_slice(), b.as_slice()) {
        (Some(x), Some(y)) => cosine_similarity(x, y),
        _ => 0.0,
    }
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_opposite() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_symmetric_and_bounded() {
        let pairs = [
            (vec![0.3f32, -1.2, 4.0, 0.01], vec![2.0f32, 0.5, -0.7, 9.0]),
            (vec![1e-3, 1e-3, 1e-3], vec![5.0, 5.0, 5.0]),
            (vec![-2.0, -2.0], vec![3.0, -1.0]),
        ];
        for (a, b) in &pairs {
            let ab = cosine_similarity(a, b);
            let ba = cosine_similarity(b, a);
            assert_eq!(ab, ba);
            assert!((-1.0..=1.0).contains(&ab), "out of range: {}", ab);
        }
    }

    #[test]
    fn test_cosine_zero_vector() {
        let zero = vec![0.0, 0.0, 0.0];
        let v = vec![1.0, 2.0, 3.0];
        assert_eq!(cosine_similarity(&zero, &v), 0.0);
        assert_eq!(cosine_similarity(&v, &zero), 0.0);
    }

    #[test]
    fn test_cosine_empty() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn test_cosine_different_lengths() {
        let a = vec![1.0, 2.0];
        let b = vec![1.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn test_degraded_similarity_is_zero() {
        let v = Embedding::vector(vec![1.0, 0.0]);
        let d = Embedding::degraded(2);
        assert_eq!(embedding_similarity(&v, &d), 0.0);
        assert_eq!(embedding_similarity(&d, &v), 0.0);
        assert_eq!(d.to_dense(), vec![0.0, 0.0]);
        assert_eq!(d.dims(), 2);
    }

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        assert_eq!(blob_to_vec(&vec_to_blob(&vec)), vec);
    }
}
