//! Embedder contract and vector utilities.
//!
//! Defines the [`Embedder`] trait that embedding backends implement,
//! plus the vector literal conversion used at the store boundary and
//! cosine similarity.
//!
//! Concrete providers (OpenAI, Ollama) live in the `ragweave` app crate.
//!
//! # Vector literal format
//!
//! Stores receive query vectors as text of the form `[v0,v1,...,vn]`,
//! each component printed with six decimals. [`to_vector_literal`] and
//! [`parse_vector_literal`] are the only producer and parser of this
//! format; swapping the storage engine never touches retrieval code.

use async_trait::async_trait;

use crate::error::{Error, Result};

/// Maps text to fixed-dimension float vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;

    /// Embed one text. Fails with `InvalidInput` on empty text.
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of texts, returning one vector per input in input order.
    ///
    /// The default implementation calls [`embed_one`](Embedder::embed_one)
    /// sequentially; HTTP providers override it with a single batched call.
    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Err(Error::InvalidInput("no texts to embed".into()));
        }
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed_one(text).await?);
        }
        Ok(out)
    }
}

/// Serialize a vector to the store's similarity-search parameter form.
///
/// ```rust
/// use ragweave_core::embedding::to_vector_literal;
///
/// assert_eq!(to_vector_literal(&[0.5, -1.0]), "[0.500000,-1.000000]");
/// assert_eq!(to_vector_literal(&[]), "[]");
/// ```
pub fn to_vector_literal(vector: &[f32]) -> String {
    if vector.is_empty() {
        return "[]".to_string();
    }
    let mut out = String::with_capacity(vector.len() * 10 + 2);
    out.push('[');
    for (i, v) in vector.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&format!("{:.6}", v));
    }
    out.push(']');
    out
}

/// Parse a vector literal produced by [`to_vector_literal`].
pub fn parse_vector_literal(literal: &str) -> Result<Vec<f32>> {
    let inner = literal
        .trim()
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| Error::InvalidInput(format!("malformed vector literal: {literal:.40}")))?;
    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }
    inner
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<f32>()
                .map_err(|e| Error::InvalidInput(format!("bad vector component '{part}': {e}")))
        })
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors,
/// vectors of different lengths, and zero-magnitude vectors.
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

    dot / denom
}
