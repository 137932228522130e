//! Embedding maintenance.
//!
//! The engine only marks embeddings stale (`text_embedding = None`). Filling
//! them is the job of a [`TextEmbedder`]: a production worker plugs in a
//! neural model, while [`LexicalEmbedder`] is a deterministic, offline
//! baseline using feature hashing over tokens. It is *not* a neural model,
//! but it is stable enough for duplicate detection in tests and small
//! deployments.

use blake3::Hasher;
use tracing::debug;

use crate::error::GraphResult;
use crate::storage::GraphStores;
use crate::text::record_text;

/// Default embedding dimensionality for lexical embeddings.
pub const DEFAULT_EMBEDDING_DIM: usize = 64;

/// Turns semantic text into a vector.
pub trait TextEmbedder: Send + Sync {
    /// Embeds `text`. Must be deterministic for equal inputs.
    fn embed(&self, text: &str) -> Vec<f32>;
}

/// Feature-hashing embedder keyed by blake3.
#[derive(Debug, Clone, Copy)]
pub struct LexicalEmbedder {
    dim: usize,
}

impl Default for LexicalEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_EMBEDDING_DIM)
    }
}

impl LexicalEmbedder {
    /// An embedder producing `dim`-dimensional vectors.
    #[must_use]
    pub const fn new(dim: usize) -> Self {
        Self { dim }
    }

    /// Output dimensionality.
    #[must_use]
    pub const fn dim(&self) -> usize {
        self.dim
    }
}

impl TextEmbedder for LexicalEmbedder {
    fn embed(&self, text: &str) -> Vec<f32> {
        lexical_embedding(text, self.dim)
    }
}

fn tokenize(s: &str) -> impl Iterator<Item = &str> {
    s.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty())
}

/// Hashes each lower-cased token into a signed bucket, then L2-normalizes.
#[must_use]
pub fn lexical_embedding(text: &str, dim: usize) -> Vec<f32> {
    if dim == 0 {
        return Vec::new();
    }

    let mut vec = vec![0.0f32; dim];
    let lower = text.to_lowercase();
    for token in tokenize(&lower) {
        let mut h = Hasher::new();
        h.update(token.as_bytes());
        let hash = h.finalize();
        let bytes = hash.as_bytes();

        let mut bucket = [0u8; 8];
        bucket.copy_from_slice(&bytes[..8]);
        #[allow(clippy::cast_possible_truncation)]
        let idx = (u64::from_le_bytes(bucket) % dim as u64) as usize;
        let sign = if bytes[8] & 1 == 0 { 1.0f32 } else { -1.0f32 };
        vec[idx] += sign;
    }

    let norm2: f64 = vec.iter().map(|&x| f64::from(x) * f64::from(x)).sum();
    if norm2 > 0.0 {
        #[allow(clippy::cast_possible_truncation)]
        let inv = norm2.sqrt().recip() as f32;
        for x in &mut vec {
            *x *= inv;
        }
    }
    vec
}

/// Recomputes up to `limit` stale embeddings. Returns how many were written.
pub fn refresh_stale_embeddings(stores: &GraphStores, embedder: &dyn TextEmbedder, limit: usize) -> GraphResult<usize> {
    let stale = stores.records.find_stale(limit)?;
    for record in &stale {
        let text = record_text(stores, record)?;
        stores.records.set_embedding(record.id, embedder.embed(&text))?;
    }
    debug!(refreshed = stale.len(), "stale embeddings refreshed");
    Ok(stale.len())
}
