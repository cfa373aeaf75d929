use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::vector_store::{
    BoxFuture, Payload, PayloadMatch, VectorHit, VectorPoint, VectorStore, VectorStoreError,
};

struct Collection {
    dimensions: usize,
    points: HashMap<String, (Vec<f32>, Payload)>,
}

/// Process-local vector store with brute-force cosine search.
///
/// Contents are lost when the process exits.
#[derive(Default)]
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryVectorStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of points in `collection`, or `None` if it does not exist.
    #[must_use]
    pub fn point_count(&self, collection: &str) -> Option<usize> {
        let cols = self
            .collections
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        cols.get(collection).map(|c| c.points.len())
    }
}

impl std::fmt::Debug for InMemoryVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryVectorStore").finish_non_exhaustive()
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut na, mut nb) = (0.0_f32, 0.0_f32, 0.0_f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na.sqrt() * nb.sqrt())
    }
}

fn missing(collection: &str) -> VectorStoreError {
    VectorStoreError::MissingCollection(collection.to_owned())
}

impl VectorStore for InMemoryVectorStore {
    fn ensure_collection<'a>(
        &'a self,
        collection: &'a str,
        dimensions: u64,
    ) -> BoxFuture<'a, Result<(), VectorStoreError>> {
        Box::pin(async move {
            let dimensions = usize::try_from(dimensions)
                .map_err(|e| VectorStoreError::backend("ensure_collection", e))?;
            let mut cols = self
                .collections
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            cols.entry(collection.to_owned()).or_insert_with(|| Collection {
                dimensions,
                points: HashMap::new(),
            });
            Ok(())
        })
    }

    fn upsert<'a>(
        &'a self,
        collection: &'a str,
        points: Vec<VectorPoint>,
    ) -> BoxFuture<'a, Result<(), VectorStoreError>> {
        Box::pin(async move {
            let mut cols = self
                .collections
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let col = cols.get_mut(collection).ok_or_else(|| missing(collection))?;
            if let Some(bad) = points.iter().find(|p| p.vector.len() != col.dimensions) {
                return Err(VectorStoreError::backend(
                    "upsert",
                    format!(
                        "point {} has {} dimensions, collection expects {}",
                        bad.id,
                        bad.vector.len(),
                        col.dimensions
                    ),
                ));
            }
            for p in points {
                col.points.insert(p.id, (p.vector, p.payload));
            }
            Ok(())
        })
    }

    fn search<'a>(
        &'a self,
        collection: &'a str,
        vector: Vec<f32>,
        limit: u64,
    ) -> BoxFuture<'a, Result<Vec<VectorHit>, VectorStoreError>> {
        Box::pin(async move {
            let cols = self
                .collections
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            let col = cols.get(collection).ok_or_else(|| missing(collection))?;

            let mut hits: Vec<VectorHit> = col
                .points
                .iter()
                .map(|(id, (v, payload))| VectorHit {
                    id: id.clone(),
                    score: cosine(&vector, v),
                    payload: payload.clone(),
                })
                .collect();
            hits.sort_by(|a, b| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| a.id.cmp(&b.id))
            });
            hits.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
            Ok(hits)
        })
    }

    fn payloads<'a>(
        &'a self,
        collection: &'a str,
        ids: Vec<String>,
    ) -> BoxFuture<'a, Result<Vec<(String, Payload)>, VectorStoreError>> {
        Box::pin(async move {
            let cols = self
                .collections
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            let col = cols.get(collection).ok_or_else(|| missing(collection))?;
            Ok(ids
                .into_iter()
                .filter_map(|id| {
                    let payload = col.points.get(&id)?.1.clone();
                    Some((id, payload))
                })
                .collect())
        })
    }

    fn delete_matching<'a>(
        &'a self,
        collection: &'a str,
        filter: PayloadMatch,
    ) -> BoxFuture<'a, Result<(), VectorStoreError>> {
        Box::pin(async move {
            let mut cols = self
                .collections
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let col = cols.get_mut(collection).ok_or_else(|| missing(collection))?;
            col.points.retain(|_, (_, payload)| !filter.matches(payload));
            Ok(())
        })
    }
}
