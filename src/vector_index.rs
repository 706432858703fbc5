//! Qdrant-wire-compatible vector store client and payload-index inference
//! (component C8). Collection lifecycle, point upsert/search, and the
//! idempotent index-ensurance cache that keeps repeated searches cheap.

use crate::models::{VectorDistance, VectorRecord};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::RwLock;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VectorIndexError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("vector store returned {status}: {body}")]
    Store { status: u16, body: String },
}

/// Base set of fields every collection gets an index for, per spec §4.8(a).
const BASE_INDEXED_FIELDS: &[&str] =
    &["user_id", "tenant_id", "workspace_id", "model_id", "status", "visibility", "type"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadFieldType {
    Keyword,
    Integer,
    Float,
    Bool,
}

/// A column's declared SQL-ish type, used only to disambiguate rules 2-5 of
/// the inference table — columns the caller has no type information for
/// (e.g. base/custom fields) should pass `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Int,
    Float,
    Bool,
    Uuid,
    Text,
}

/// Infer the Qdrant payload index type for `field`, per the 7-rule table:
/// `_id`/`id` fields are always `keyword` regardless of declared column
/// type (rule 1 short-circuits everything else).
pub fn infer_field_type(field: &str, column_type: Option<ColumnType>) -> PayloadFieldType {
    if field == "id" || field.ends_with("_id") {
        return PayloadFieldType::Keyword;
    }
    match column_type {
        Some(ColumnType::Int) => return PayloadFieldType::Integer,
        Some(ColumnType::Float) => return PayloadFieldType::Float,
        Some(ColumnType::Bool) => return PayloadFieldType::Bool,
        Some(ColumnType::Uuid) | Some(ColumnType::Text) => return PayloadFieldType::Keyword,
        None => {}
    }
    if field.starts_with("is_") || field.starts_with("has_") {
        return PayloadFieldType::Bool;
    }
    PayloadFieldType::Keyword
}

#[derive(Debug, Clone)]
pub struct CollectionConfig {
    pub dims: usize,
    pub distance: VectorDistance,
    pub segment_number: Option<u32>,
    pub replication_factor: Option<u32>,
    /// Extra fields to index beyond the base set, e.g. a model's belongs-to
    /// foreign keys or custom-declared filters.
    pub extra_indexed_fields: Vec<(String, Option<ColumnType>)>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
    pub metadata: Value,
}

/// Client for the vector store's Qdrant-style wire contract. Ensures
/// payload indexes exist before any search that filters on a not-yet-seen
/// field, and caches `(collection, field)` pairs it has already verified so
/// repeat searches skip the round trip.
pub struct VectorIndexManager {
    client: reqwest::Client,
    base_url: String,
    verified_indexes: RwLock<HashSet<(String, String)>>,
}

impl VectorIndexManager {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("reqwest client config is valid"),
            base_url: base_url.into(),
            verified_indexes: RwLock::new(HashSet::new()),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    /// Create `name`, wait for it to settle, then ensure every base and
    /// extra field has a payload index. Idempotent: an "already exists"
    /// response from the store is treated as success.
    pub async fn create_collection(
        &self,
        name: &str,
        config: &CollectionConfig,
    ) -> Result<(), VectorIndexError> {
        let body = json!({
            "vectors": {
                "size": config.dims,
                "distance": distance_name(config.distance),
            },
            "segment_number": config.segment_number,
            "replication_factor": config.replication_factor,
        });

        let response = self.client.put(self.url(&format!("/collections/{name}"))).json(&body).send().await?;
        if !response.status().is_success() && !is_already_exists(response.status()) {
            return Err(self.store_error(response).await);
        }

        tokio::time::sleep(Duration::from_millis(500)).await;

        let mut fields: Vec<(String, Option<ColumnType>)> =
            BASE_INDEXED_FIELDS.iter().map(|f| (f.to_string(), None)).collect();
        fields.extend(config.extra_indexed_fields.clone());

        for (field, column_type) in fields {
            self.ensure_index(name, &field, column_type).await?;
        }

        Ok(())
    }

    pub async fn delete_collection(&self, name: &str) -> Result<(), VectorIndexError> {
        let response = self.client.delete(self.url(&format!("/collections/{name}"))).send().await?;
        if !response.status().is_success() {
            return Err(self.store_error(response).await);
        }
        self.verified_indexes.write().expect("index cache poisoned").retain(|(c, _)| c != name);
        Ok(())
    }

    pub async fn collection_exists(&self, name: &str) -> Result<bool, VectorIndexError> {
        let response = self.client.get(self.url(&format!("/collections/{name}"))).send().await?;
        Ok(response.status().is_success())
    }

    /// Create a payload index for `field` if one hasn't already been
    /// verified for this collection. "Already exists"/"already indexed"
    /// responses count as success, same as collection creation.
    pub async fn ensure_index(
        &self,
        collection: &str,
        field: &str,
        column_type: Option<ColumnType>,
    ) -> Result<(), VectorIndexError> {
        let key = (collection.to_string(), field.to_string());
        if self.verified_indexes.read().expect("index cache poisoned").contains(&key) {
            return Ok(());
        }

        let field_type = infer_field_type(field, column_type);
        let body = json!({
            "field_name": field,
            "field_schema": field_type,
        });

        let response = self
            .client
            .put(self.url(&format!("/collections/{collection}/index")))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() && !is_already_exists(response.status()) {
            return Err(self.store_error(response).await);
        }

        self.verified_indexes.write().expect("index cache poisoned").insert(key);
        Ok(())
    }

    /// Before searching on `filter_fields`, make sure each has a verified
    /// index, issuing any missing ones. O(1) after the first call per field.
    pub async fn ensure_search_indexes(
        &self,
        collection: &str,
        filter_fields: &[&str],
    ) -> Result<(), VectorIndexError> {
        for field in filter_fields {
            self.ensure_index(collection, field, None).await?;
        }
        Ok(())
    }

    pub async fn upsert(&self, records: &[VectorRecord]) -> Result<(), VectorIndexError> {
        let Some(collection) = records.first().map(|r| r.collection.clone()) else {
            return Ok(());
        };
        let points: Vec<Value> = records
            .iter()
            .map(|r| json!({ "id": r.id, "vector": r.embedding, "payload": r.payload }))
            .collect();

        let response = self
            .client
            .put(self.url(&format!("/collections/{collection}/points")))
            .json(&json!({ "points": points }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.store_error(response).await);
        }
        Ok(())
    }

    pub async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
        score_threshold: Option<f32>,
        filter: Option<Value>,
    ) -> Result<Vec<SearchHit>, VectorIndexError> {
        let body = json!({
            "vector": vector,
            "limit": limit,
            "score_threshold": score_threshold,
            "filter": filter,
            "with_payload": true,
        });

        let response = self
            .client
            .post(self.url(&format!("/collections/{collection}/points/search")))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.store_error(response).await);
        }

        let parsed: SearchResponse = response.json().await?;
        Ok(parsed
            .result
            .into_iter()
            .map(|r| SearchHit { id: r.id, score: r.score, metadata: r.payload })
            .collect())
    }

    pub async fn count(&self, collection: &str) -> Result<u64, VectorIndexError> {
        let response = self
            .client
            .post(self.url(&format!("/collections/{collection}/points/count")))
            .json(&json!({ "exact": true }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.store_error(response).await);
        }
        let parsed: CountResponse = response.json().await?;
        Ok(parsed.result.count)
    }

    async fn store_error(&self, response: reqwest::Response) -> VectorIndexError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        VectorIndexError::Store { status, body }
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    result: Vec<SearchResultPoint>,
}

#[derive(Deserialize)]
struct SearchResultPoint {
    id: String,
    score: f32,
    #[serde(default, rename = "payload")]
    payload: Value,
}

#[derive(Deserialize)]
struct CountResponse {
    result: CountResult,
}

#[derive(Deserialize)]
struct CountResult {
    count: u64,
}

fn distance_name(distance: VectorDistance) -> &'static str {
    match distance {
        VectorDistance::Cosine => "Cosine",
        VectorDistance::Dot => "Dot",
        VectorDistance::Euclid => "Euclid",
    }
}

fn is_already_exists(status: reqwest::StatusCode) -> bool {
    status.as_u16() == 409
}
