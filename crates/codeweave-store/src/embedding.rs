//! Embedding providers used to vectorize chunk text and search queries.

use std::sync::atomic::{AtomicUsize, Ordering};

use ollama_rs::Ollama;
use ollama_rs::generation::embeddings::request::{EmbeddingsInput, GenerateEmbeddingsRequest};

use crate::error::{Result, StoreError};
use crate::vector_store::BoxFuture;

pub trait EmbeddingProvider: Send + Sync {
    /// Prepare the provider and report the vector dimension it produces.
    fn initialize(&self) -> BoxFuture<'_, Result<usize>>;

    /// Embed `texts` in request batches of at most `batch_size`, preserving order.
    fn embed_batch<'a>(
        &'a self,
        texts: &'a [String],
        batch_size: usize,
    ) -> BoxFuture<'a, Result<Vec<Vec<f32>>>>;

    fn name(&self) -> &str;
}

/// Embeddings served by an Ollama instance.
#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    client: Ollama,
    model: String,
}

impl OllamaEmbedder {
    /// # Errors
    ///
    /// Returns an error if `base_url` is not an `http(s)` URL with a host.
    pub fn new(base_url: &str, model: impl Into<String>) -> Result<Self> {
        let (host, port) = parse_host_port(base_url);
        let url = Ollama::try_new(host.as_str())
            .map_err(|e| StoreError::Embedding(format!("invalid Ollama url {base_url}: {e}")))?
            .url()
            .clone();
        if !matches!(url.scheme(), "http" | "https") || !url.has_host() {
            return Err(StoreError::Embedding(format!(
                "invalid Ollama url {base_url}: expected http(s)://host[:port]"
            )));
        }
        Ok(Self {
            client: Ollama::builder().host(url).port(port).build(),
            model: model.into(),
        })
    }

    async fn embed_chunk(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let expected = texts.len();
        let request =
            GenerateEmbeddingsRequest::new(self.model.clone(), EmbeddingsInput::Multiple(texts));
        let response = self
            .client
            .generate_embeddings(request)
            .await
            .map_err(|e| StoreError::Embedding(format!("Ollama embedding request failed: {e}")))?;
        if response.embeddings.len() != expected {
            return Err(StoreError::Embedding(format!(
                "Ollama returned {} embeddings for {expected} inputs",
                response.embeddings.len()
            )));
        }
        Ok(response.embeddings)
    }
}

impl EmbeddingProvider for OllamaEmbedder {
    fn initialize(&self) -> BoxFuture<'_, Result<usize>> {
        Box::pin(async move {
            let probe = self.embed_chunk(vec!["dimension probe".to_owned()]).await?;
            let dims = probe.first().map_or(0, Vec::len);
            if dims == 0 {
                return Err(StoreError::Embedding(format!(
                    "model {} returned an empty embedding",
                    self.model
                )));
            }
            tracing::info!(model = %self.model, dims, "ollama embedder ready");
            Ok(dims)
        })
    }

    fn embed_batch<'a>(
        &'a self,
        texts: &'a [String],
        batch_size: usize,
    ) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
        Box::pin(async move {
            let mut out = Vec::with_capacity(texts.len());
            for batch in texts.chunks(batch_size.max(1)) {
                out.extend(self.embed_chunk(batch.to_vec()).await?);
            }
            Ok(out)
        })
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "ollama"
    }
}

fn parse_host_port(url: &str) -> (String, u16) {
    let url = url.trim_end_matches('/');
    if let Some(colon_pos) = url.rfind(':')
        && let Ok(port) = url[colon_pos + 1..].parse::<u16>()
    {
        return (url[..colon_pos].to_string(), port);
    }
    (url.to_string(), 11434)
}

/// Deterministic offline embedder.
///
/// Identifier tokens (split on punctuation and camelCase boundaries,
/// lowercased) are hashed with BLAKE3 into a signed bag-of-words vector,
/// then L2-normalized. Texts sharing identifiers get positive cosine
/// similarity, which is enough for lexical lookups without a model.
#[derive(Debug)]
pub struct HashEmbedder {
    dimensions: usize,
    calls: AtomicUsize,
}

impl HashEmbedder {
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of `embed_batch` requests served, one per batch.
    #[must_use]
    pub fn batches_served(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimensions];
        for token in tokenize(text) {
            let hash = blake3::hash(token.as_bytes());
            let bytes = hash.as_bytes();
            let mut idx_bytes = [0_u8; 8];
            idx_bytes.copy_from_slice(&bytes[..8]);
            let bucket = u64::from_le_bytes(idx_bytes) % self.dimensions as u64;
            #[allow(clippy::cast_possible_truncation)]
            let bucket = bucket as usize;
            let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        vector
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EmbeddingProvider for HashEmbedder {
    fn initialize(&self) -> BoxFuture<'_, Result<usize>> {
        Box::pin(async move { Ok(self.dimensions) })
    }

    fn embed_batch<'a>(
        &'a self,
        texts: &'a [String],
        batch_size: usize,
    ) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
        Box::pin(async move {
            let mut out = Vec::with_capacity(texts.len());
            for batch in texts.chunks(batch_size.max(1)) {
                self.calls.fetch_add(1, Ordering::Relaxed);
                out.extend(batch.iter().map(|t| self.embed_text(t)));
            }
            Ok(out)
        })
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "hash"
    }
}

fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let lower = word.to_lowercase();
        let parts = split_camel(word);
        if parts.len() > 1 {
            tokens.extend(parts.into_iter().map(|p| p.to_lowercase()));
        }
        tokens.push(lower);
    }
    tokens
}

fn split_camel(word: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut prev_lower = false;
    for (i, c) in word.char_indices() {
        if c.is_uppercase() && prev_lower {
            parts.push(&word[start..i]);
            start = i;
        }
        prev_lower = c.is_lowercase() || c.is_ascii_digit();
    }
    parts.push(&word[start..]);
    parts
}
