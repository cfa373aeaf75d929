//! Backend-neutral vector storage port. [`crate::ChunkVectorStore`] is its
//! only consumer, so the surface is exactly what chunk indexing needs.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub type Payload = HashMap<String, serde_json::Value>;

#[derive(Debug, thiserror::Error)]
pub enum VectorStoreError {
    #[error("cannot reach vector backend: {0}")]
    Connection(String),
    #[error("collection {0} does not exist")]
    MissingCollection(String),
    #[error("{op} failed: {message}")]
    Backend { op: &'static str, message: String },
    #[error("payload encoding: {0}")]
    Payload(String),
}

impl VectorStoreError {
    pub(crate) fn backend(op: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Backend {
            op,
            message: err.to_string(),
        }
    }
}

/// A vector with its JSON payload, keyed by a UUID string.
#[derive(Debug, Clone)]
pub struct VectorPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: Payload,
}

/// A search hit. Vectors are never returned.
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub id: String,
    /// Cosine similarity; higher is closer.
    pub score: f32,
    pub payload: Payload,
}

/// Selects points whose payload has `key` equal to the string `value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadMatch {
    pub key: String,
    pub value: String,
}

impl PayloadMatch {
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    #[must_use]
    pub fn matches(&self, payload: &Payload) -> bool {
        payload.get(&self.key).and_then(serde_json::Value::as_str) == Some(self.value.as_str())
    }
}

pub trait VectorStore: Send + Sync {
    /// Create a cosine collection of `dimensions` unless it already exists.
    fn ensure_collection<'a>(
        &'a self,
        collection: &'a str,
        dimensions: u64,
    ) -> BoxFuture<'a, Result<(), VectorStoreError>>;

    /// Insert or overwrite points by id.
    fn upsert<'a>(
        &'a self,
        collection: &'a str,
        points: Vec<VectorPoint>,
    ) -> BoxFuture<'a, Result<(), VectorStoreError>>;

    /// Nearest `limit` points, best first.
    fn search<'a>(
        &'a self,
        collection: &'a str,
        vector: Vec<f32>,
        limit: u64,
    ) -> BoxFuture<'a, Result<Vec<VectorHit>, VectorStoreError>>;

    /// Payloads for the ids that exist; unknown ids are skipped.
    fn payloads<'a>(
        &'a self,
        collection: &'a str,
        ids: Vec<String>,
    ) -> BoxFuture<'a, Result<Vec<(String, Payload)>, VectorStoreError>>;

    fn delete_matching<'a>(
        &'a self,
        collection: &'a str,
        filter: PayloadMatch,
    ) -> BoxFuture<'a, Result<(), VectorStoreError>>;
}
