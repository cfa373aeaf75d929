//! Qdrant adapter for the [`VectorStore`] port.

use qdrant_client::Qdrant;
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter, GetPointsBuilder,
    PointId, PointStruct, SearchPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder,
    point_id::PointIdOptions, value::Kind,
};

use crate::vector_store::{
    BoxFuture, Payload, PayloadMatch, VectorHit, VectorPoint, VectorStore, VectorStoreError,
};

type QdrantPayload = std::collections::HashMap<String, qdrant_client::qdrant::Value>;

/// Vector store backed by a remote Qdrant instance over gRPC.
#[derive(Clone)]
pub struct QdrantVectorStore {
    client: Qdrant,
}

impl std::fmt::Debug for QdrantVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QdrantVectorStore").finish_non_exhaustive()
    }
}

impl QdrantVectorStore {
    /// Build a client for `url`. Nothing is sent until the first call.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL cannot be turned into a client.
    pub fn new(url: &str) -> Result<Self, VectorStoreError> {
        let client = Qdrant::from_url(url)
            .build()
            .map_err(|e| VectorStoreError::Connection(e.to_string()))?;
        Ok(Self { client })
    }
}

fn encode_payload(payload: Payload) -> Result<QdrantPayload, VectorStoreError> {
    serde_json::from_value(serde_json::Value::Object(payload.into_iter().collect()))
        .map_err(|e| VectorStoreError::Payload(e.to_string()))
}

fn decode_value(value: qdrant_client::qdrant::Value) -> Option<serde_json::Value> {
    Some(match value.kind? {
        Kind::NullValue(_) => serde_json::Value::Null,
        Kind::BoolValue(b) => b.into(),
        Kind::IntegerValue(i) => i.into(),
        Kind::DoubleValue(d) => serde_json::Number::from_f64(d)?.into(),
        Kind::StringValue(s) => s.into(),
        Kind::ListValue(list) => list.values.into_iter().filter_map(decode_value).collect(),
        Kind::StructValue(s) => serde_json::Value::Object(
            s.fields
                .into_iter()
                .filter_map(|(k, v)| Some((k, decode_value(v)?)))
                .collect(),
        ),
    })
}

fn decode_payload(payload: QdrantPayload) -> Payload {
    payload
        .into_iter()
        .filter_map(|(k, v)| Some((k, decode_value(v)?)))
        .collect()
}

fn point_id(id: Option<PointId>) -> String {
    match id.and_then(|pid| pid.point_id_options) {
        Some(PointIdOptions::Uuid(u)) => u,
        Some(PointIdOptions::Num(n)) => n.to_string(),
        None => String::new(),
    }
}

fn to_filter(filter: PayloadMatch) -> Filter {
    Filter::must([Condition::matches(filter.key, filter.value)])
}

impl VectorStore for QdrantVectorStore {
    fn ensure_collection<'a>(
        &'a self,
        collection: &'a str,
        dimensions: u64,
    ) -> BoxFuture<'a, Result<(), VectorStoreError>> {
        Box::pin(async move {
            let exists = self
                .client
                .collection_exists(collection)
                .await
                .map_err(|e| VectorStoreError::Connection(e.to_string()))?;
            if exists {
                return Ok(());
            }
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(collection)
                        .vectors_config(VectorParamsBuilder::new(dimensions, Distance::Cosine)),
                )
                .await
                .map_err(|e| VectorStoreError::backend("create collection", e))?;
            tracing::info!(collection, dimensions, "created qdrant collection");
            Ok(())
        })
    }

    fn upsert<'a>(
        &'a self,
        collection: &'a str,
        points: Vec<VectorPoint>,
    ) -> BoxFuture<'a, Result<(), VectorStoreError>> {
        Box::pin(async move {
            if points.is_empty() {
                return Ok(());
            }
            let points = points
                .into_iter()
                .map(|p| Ok(PointStruct::new(p.id, p.vector, encode_payload(p.payload)?)))
                .collect::<Result<Vec<_>, VectorStoreError>>()?;
            self.client
                .upsert_points(UpsertPointsBuilder::new(collection, points).wait(true))
                .await
                .map_err(|e| VectorStoreError::backend("upsert", e))?;
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
            let response = self
                .client
                .search_points(SearchPointsBuilder::new(collection, vector, limit).with_payload(true))
                .await
                .map_err(|e| VectorStoreError::backend("search", e))?;
            Ok(response
                .result
                .into_iter()
                .map(|p| VectorHit {
                    id: point_id(p.id),
                    score: p.score,
                    payload: decode_payload(p.payload),
                })
                .collect())
        })
    }

    fn payloads<'a>(
        &'a self,
        collection: &'a str,
        ids: Vec<String>,
    ) -> BoxFuture<'a, Result<Vec<(String, Payload)>, VectorStoreError>> {
        Box::pin(async move {
            if ids.is_empty() {
                return Ok(Vec::new());
            }
            let ids: Vec<PointId> = ids.into_iter().map(PointId::from).collect();
            let response = self
                .client
                .get_points(
                    GetPointsBuilder::new(collection, ids)
                        .with_payload(true)
                        .with_vectors(false),
                )
                .await
                .map_err(|e| VectorStoreError::backend("get points", e))?;
            Ok(response
                .result
                .into_iter()
                .map(|p| (point_id(p.id), decode_payload(p.payload)))
                .collect())
        })
    }

    fn delete_matching<'a>(
        &'a self,
        collection: &'a str,
        filter: PayloadMatch,
    ) -> BoxFuture<'a, Result<(), VectorStoreError>> {
        Box::pin(async move {
            self.client
                .delete_points(
                    DeletePointsBuilder::new(collection)
                        .points(to_filter(filter))
                        .wait(true),
                )
                .await
                .map_err(|e| VectorStoreError::backend("delete", e))?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_from_url() {
        assert!(QdrantVectorStore::new("http://localhost:6334").is_ok());
        assert!(QdrantVectorStore::new("not a valid url").is_err());
    }

    #[test]
    fn debug_hides_client() {
        let store = QdrantVectorStore::new("http://localhost:6334").unwrap();
        assert_eq!(format!("{store:?}"), "QdrantVectorStore { .. }");
    }

    #[test]
    fn chunk_payload_survives_encoding() {
        let payload = Payload::from([
            ("file_path".to_owned(), serde_json::json!("src/a.ts")),
            ("line_start".to_owned(), serde_json::json!(3)),
            ("exported".to_owned(), serde_json::json!(true)),
        ]);
        let back = decode_payload(encode_payload(payload.clone()).unwrap());
        assert_eq!(back, payload);
    }

    #[test]
    fn payload_match_becomes_single_must_condition() {
        let filter = to_filter(PayloadMatch::new("file_path", "a.ts"));
        assert_eq!(filter.must.len(), 1);
        assert!(filter.must_not.is_empty());
    }

    #[test]
    fn point_ids_render_as_strings() {
        assert_eq!(point_id(None), "");
        assert_eq!(point_id(Some(PointId::from(7_u64))), "7");
    }
}
