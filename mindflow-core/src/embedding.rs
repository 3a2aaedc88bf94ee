//! Vector embedding abstraction layer.
//!
//! Provides a trait-based interface for turning text into vectors, plus the
//! dense similarity helpers every recall step is built on.
//!
//! All providers return L2-normalised vectors so that a dot product equals
//! cosine similarity. The optional ONNX provider (feature `onnx`) wraps
//! `fastembed`; the stub, random and hashing providers cover tests, benches
//! and offline development.

use crate::error::{MindflowError, Result};
use crate::types::Embedding;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Generate vector embeddings from text.
///
/// Implementations must be `Send + Sync` for use from async contexts.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text string.
    ///
    /// # Errors
    ///
    /// Returns [`MindflowError::Embedding`] if the model fails to produce
    /// an embedding.
    fn embed(&self, text: &str) -> Result<Embedding>;

    /// Embed a batch of texts.
    ///
    /// Default implementation calls `embed` in a loop.
    ///
    /// # Errors
    ///
    /// Returns an error if any embedding in the batch fails.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// The dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;

    /// A human-readable name for the model.
    fn model_name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Similarity
// ---------------------------------------------------------------------------

/// Dot product of two vectors; `0.0` on dimension mismatch.
#[must_use]
pub fn dot(a: &Embedding, b: &Embedding) -> f32 {
    if a.0.len() != b.0.len() {
        return 0.0;
    }
    a.0.iter().zip(b.0.iter()).map(|(x, y)| x * y).sum()
}

/// Compute the cosine similarity between two embedding vectors.
///
/// Returns a value in \[-1.0, 1.0\].  Returns `0.0` if either vector
/// has zero magnitude.
#[must_use]
pub fn cosine_similarity(a: &Embedding, b: &Embedding) -> f32 {
    if a.0.len() != b.0.len() {
        return 0.0;
    }

    let mut dot = 0.0_f32;
    let mut mag_a = 0.0_f32;
    let mut mag_b = 0.0_f32;

    for (x, y) in a.0.iter().zip(b.0.iter()) {
        dot += x * y;
        mag_a += x * x;
        mag_b += y * y;
    }

    let denom = mag_a.sqrt() * mag_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

/// Scale a vector to unit length in place. Zero vectors are left untouched.
pub fn l2_normalize(values: &mut [f32]) {
    let mag: f32 = values.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag < f32::EPSILON {
        return;
    }
    for v in values.iter_mut() {
        *v /= mag;
    }
}

/// One embedding per row, computed once at construction and projected
/// against query vectors on every turn.
#[derive(Debug, Clone, Default)]
pub struct EmbeddingMatrix {
    rows: Vec<Embedding>,
}

impl EmbeddingMatrix {
    /// Embed every text with `provider`.
    ///
    /// # Errors
    /// Propagates the provider's failure.
    pub fn build(provider: &dyn EmbeddingProvider, texts: &[&str]) -> Result<Self> {
        if texts.is_empty() {
            return Ok(Self::default());
        }
        Ok(Self {
            rows: provider.embed_batch(texts)?,
        })
    }

    /// Wrap precomputed rows.
    #[must_use]
    pub fn from_rows(rows: Vec<Embedding>) -> Self {
        Self { rows }
    }

    /// Dot-product similarity of `query` against every row, in row order.
    #[must_use]
    pub fn scores(&self, query: &Embedding) -> Vec<f32> {
        self.rows.iter().map(|row| dot(query, row)).collect()
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the matrix has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Stub / Zero-cost provider
// ---------------------------------------------------------------------------

/// A stub embedding provider that returns zero-vectors.
///
/// Every similarity against a zero vector is `0.0`, so nothing ever clears
/// a recall threshold.
pub struct StubEmbeddingProvider {
    dims: usize,
}

impl StubEmbeddingProvider {
    /// Create a new stub provider with the given dimensionality.
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self { dims: dimensions }
    }
}

impl Default for StubEmbeddingProvider {
    fn default() -> Self {
        Self::new(384)
    }
}

impl EmbeddingProvider for StubEmbeddingProvider {
    fn embed(&self, _text: &str) -> Result<Embedding> {
        Ok(Embedding(vec![0.0; self.dims]))
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn model_name(&self) -> &str {
        "stub-zero-vector"
    }
}

// ---------------------------------------------------------------------------
// Normalized random provider
// ---------------------------------------------------------------------------

/// An embedding provider that returns random unit-length vectors.
pub struct RandomEmbeddingProvider {
    dims: usize,
}

impl RandomEmbeddingProvider {
    /// Create a new random provider.
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self { dims: dimensions }
    }
}

impl EmbeddingProvider for RandomEmbeddingProvider {
    fn embed(&self, _text: &str) -> Result<Embedding> {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        let mut raw: Vec<f32> = (0..self.dims).map(|_| rng.gen_range(-1.0..1.0)).collect();
        l2_normalize(&mut raw);
        Ok(Embedding(raw))
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn model_name(&self) -> &str {
        "random-unit-vector"
    }
}

// ---------------------------------------------------------------------------
// Deterministic hashing provider
// ---------------------------------------------------------------------------

/// Bag-of-characters hashing embedder.
///
/// Every `char` (and every adjacent pair) is hashed into a bucket; the
/// bucket counts are normalised. Identical texts map to identical vectors
/// and texts sharing many characters score high, which is enough for
/// deterministic tests of the recall thresholds.
pub struct HashEmbeddingProvider {
    dims: usize,
}

impl HashEmbeddingProvider {
    /// Create a hashing provider with `dimensions` buckets.
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self {
            dims: dimensions.max(1),
        }
    }

    fn bucket(&self, seed: u64) -> usize {
        // FNV-1a style mixing
        let mut h: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in seed.to_le_bytes() {
            h ^= u64::from(byte);
            h = h.wrapping_mul(0x0100_0000_01b3);
        }
        #[allow(clippy::cast_possible_truncation)]
        let idx = (h % self.dims as u64) as usize;
        idx
    }
}

impl Default for HashEmbeddingProvider {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EmbeddingProvider for HashEmbeddingProvider {
    fn embed(&self, text: &str) -> Result<Embedding> {
        let mut v = vec![0.0_f32; self.dims];
        let chars: Vec<char> = text.chars().filter(|c| !c.is_whitespace()).collect();
        for c in &chars {
            v[self.bucket(u64::from(*c as u32))] += 1.0;
        }
        for pair in chars.windows(2) {
            let seed = (u64::from(pair[0] as u32) << 32) | u64::from(pair[1] as u32);
            v[self.bucket(seed)] += 0.5;
        }
        l2_normalize(&mut v);
        Ok(Embedding(v))
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn model_name(&self) -> &str {
        "hash-char-bigram"
    }
}

// ---------------------------------------------------------------------------
// ONNX provider
// ---------------------------------------------------------------------------

/// Production embedding provider backed by `fastembed` (ONNX Runtime).
#[cfg(feature = "onnx")]
pub struct OnnxEmbeddingProvider {
    model: parking_lot::Mutex<fastembed::TextEmbedding>,
    dims: usize,
    name: String,
}

#[cfg(feature = "onnx")]
impl OnnxEmbeddingProvider {
    /// Load the multilingual MiniLM model.
    ///
    /// # Errors
    ///
    /// Returns [`MindflowError::Embedding`] if the model cannot be loaded.
    pub fn new() -> Result<Self> {
        use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

        let model = TextEmbedding::try_new(InitOptions::new(
            EmbeddingModel::ParaphraseMLMiniLML12V2,
        ))
        .map_err(|e| MindflowError::Embedding(e.to_string()))?;
        Ok(Self {
            model: parking_lot::Mutex::new(model),
            dims: 384,
            name: "paraphrase-multilingual-MiniLM-L12-v2".to_string(),
        })
    }
}

#[cfg(feature = "onnx")]
impl EmbeddingProvider for OnnxEmbeddingProvider {
    fn embed(&self, text: &str) -> Result<Embedding> {
        let mut batch = self.embed_batch(&[text])?;
        batch
            .pop()
            .ok_or_else(|| MindflowError::Embedding("model returned no vector".to_string()))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        let owned: Vec<String> = texts.iter().map(|t| (*t).to_string()).collect();
        let raw = self
            .model
            .lock()
            .embed(owned, None)
            .map_err(|e| MindflowError::Embedding(e.to_string()))?;
        Ok(raw
            .into_iter()
            .map(|mut v| {
                l2_normalize(&mut v);
                Embedding(v)
            })
            .collect())
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn model_name(&self) -> &str {
        &self.name
    }
}

/// Construct the embedder named in configuration.
///
/// # Errors
///
/// Returns [`MindflowError::Config`] for an unknown provider name, or for
/// `onnx` when the crate was built without the `onnx` feature.
pub fn provider_from_name(name: &str, dimensions: usize) -> Result<Box<dyn EmbeddingProvider>> {
    match name {
        "stub" => Ok(Box::new(StubEmbeddingProvider::new(dimensions))),
        "random" => Ok(Box::new(RandomEmbeddingProvider::new(dimensions))),
        "hash" => Ok(Box::new(HashEmbeddingProvider::new(dimensions))),
        #[cfg(feature = "onnx")]
        "onnx" => Ok(Box::new(OnnxEmbeddingProvider::new()?)),
        other => Err(MindflowError::Config(format!(
            "unknown embedding provider '{other}'"
        ))),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_identical_vectors() {
        let a = Embedding(vec![1.0, 0.0, 0.0]);
        let b = Embedding(vec![1.0, 0.0, 0.0]);
        let sim = cosine_similarity(&a, &b);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_orthogonal_vectors() {
        let a = Embedding(vec![1.0, 0.0]);
        let b = Embedding(vec![0.0, 1.0]);
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn cosine_mismatched_dimensions() {
        let a = Embedding(vec![1.0, 0.0]);
        let b = Embedding(vec![1.0, 0.0, 0.0]);
        assert_eq!(cosine_similarity(&a, &b), 0.0);
        assert_eq!(dot(&a, &b), 0.0);
    }

    #[test]
    fn normalize_produces_unit_length() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        let mut zero = vec![0.0, 0.0];
        l2_normalize(&mut zero);
        assert_eq!(zero, vec![0.0, 0.0]);
    }

    #[test]
    fn hash_provider_is_deterministic_and_normalised() {
        let provider = HashEmbeddingProvider::new(64);
        let a = provider.embed("你喜欢什么").expect("embed");
        let b = provider.embed("你喜欢什么").expect("embed");
        assert_eq!(a, b);
        let mag: f32 = a.0.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((mag - 1.0).abs() < 1e-4);
        assert!((dot(&a, &b) - 1.0).abs() < 1e-4);
    }

    #[test]
    fn hash_provider_separates_unrelated_text() {
        let provider = HashEmbeddingProvider::new(512);
        let a = provider.embed("你喜欢吃什么").expect("embed");
        let b = provider.embed("abcdefg").expect("embed");
        assert!(dot(&a, &b) < 0.3);
    }

    #[test]
    fn random_provider_returns_unit_vectors() {
        let provider = RandomEmbeddingProvider::new(64);
        let emb = provider.embed("hello").expect("embed");
        assert_eq!(emb.len(), 64);
        let mag: f32 = emb.0.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((mag - 1.0).abs() < 0.01, "expected unit vector, got magnitude {mag}");
    }

    #[test]
    fn matrix_scores_in_row_order() {
        let m = EmbeddingMatrix::from_rows(vec![
            Embedding(vec![1.0, 0.0]),
            Embedding(vec![0.0, 1.0]),
        ]);
        let scores = m.scores(&Embedding(vec![0.6, 0.8]));
        assert_eq!(scores.len(), 2);
        assert!((scores[0] - 0.6).abs() < 1e-6);
        assert!((scores[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn empty_matrix_build_skips_provider() {
        let m = EmbeddingMatrix::build(&StubEmbeddingProvider::new(4), &[]).expect("build");
        assert!(m.is_empty());
    }

    #[test]
    fn provider_from_name_rejects_unknown() {
        assert!(provider_from_name("hash", 32).is_ok());
        assert!(matches!(
            provider_from_name("word2vec", 32),
            Err(MindflowError::Config(_))
        ));
    }
}
