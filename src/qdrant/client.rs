//! HTTP client wrapper for interacting with Qdrant.

use crate::qdrant::{
    filters::build_match_filter,
    payload::{build_point, stringify_point_id},
    types::{CountResponse, QdrantError, QueryResponse, QueryResponseResult, ScrollResponse},
};
use crate::store::{
    IndexedVector, MetadataFilter, QueryMatch, StoredPoint, VectorMetadata, VectorStore,
    VectorStoreError,
};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde_json::{Map, Value, json};
use std::time::Duration;

const SCROLL_PAGE_SIZE: usize = 512;

/// Payload fields that receive keyword indexes for filtered search.
const INDEXED_FIELDS: [&str; 3] = ["loanId", "documentId", "type"];

/// Lightweight HTTP client for one Qdrant collection.
pub struct QdrantService {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) api_key: Option<String>,
    pub(crate) collection: String,
}

impl QdrantService {
    /// Construct a client bound to `collection`, applying `timeout` to every request.
    pub fn new(
        url: &str,
        api_key: Option<String>,
        collection: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, QdrantError> {
        let client = Client::builder()
            .user_agent("loan-rag/0.1")
            .timeout(timeout)
            .build()?;

        let base_url = normalize_base_url(url).map_err(QdrantError::InvalidUrl)?;
        let collection = collection.into();
        tracing::debug!(
            url = %base_url,
            collection = %collection,
            timeout_ms = timeout.as_millis() as u64,
            has_api_key = api_key.as_deref().is_some_and(|value| !value.is_empty()),
            "Initialized Qdrant HTTP client"
        );

        Ok(Self {
            client,
            base_url,
            api_key,
            collection,
        })
    }

    /// Name of the collection this client reads and writes.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Create the collection with cosine distance when it is missing, then ensure indexes.
    pub async fn ensure_collection(&self, vector_size: u64) -> Result<(), QdrantError> {
        if !self.collection_exists().await? {
            tracing::info!(
                collection = %self.collection,
                vector_size,
                "Creating collection"
            );
            let body = json!({
                "vectors": {
                    "size": vector_size,
                    "distance": "Cosine"
                }
            });
            let response = self
                .request(Method::PUT, &format!("collections/{}", self.collection))
                .json(&body)
                .send()
                .await?;
            self.ensure_success(response, || {
                tracing::debug!(collection = %self.collection, "Collection created");
            })
            .await?;
        }
        self.ensure_payload_indexes().await
    }

    /// Upsert points with caller-supplied ids; existing ids are overwritten.
    pub async fn upsert_points(&self, vectors: &[IndexedVector]) -> Result<usize, QdrantError> {
        if vectors.is_empty() {
            return Ok(0);
        }

        let mut points = Vec::with_capacity(vectors.len());
        for vector in vectors {
            let point = build_point(vector).map_err(|err| QdrantError::UnexpectedStatus {
                status: StatusCode::BAD_REQUEST,
                body: format!("unserializable payload: {err}"),
            })?;
            points.push(point);
        }

        let point_count = points.len();
        let response = self
            .request(
                Method::PUT,
                &format!("collections/{}/points", self.collection),
            )
            .query(&[("wait", true)])
            .json(&json!({ "points": points }))
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(
                collection = %self.collection,
                points = point_count,
                "Points upserted"
            );
        })
        .await?;
        Ok(point_count)
    }

    /// Delete points by id.
    pub async fn delete_points(&self, ids: &[String]) -> Result<(), QdrantError> {
        if ids.is_empty() {
            return Ok(());
        }

        let response = self
            .request(
                Method::POST,
                &format!("collections/{}/points/delete", self.collection),
            )
            .query(&[("wait", true)])
            .json(&json!({ "points": ids }))
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(
                collection = %self.collection,
                points = ids.len(),
                "Points deleted"
            );
        })
        .await
    }

    /// Perform a filtered similarity search, returning scored points with payloads.
    pub async fn search_points(
        &self,
        vector: Vec<f32>,
        filter: Option<Value>,
        limit: usize,
    ) -> Result<Vec<(String, f32, Option<Map<String, Value>>)>, QdrantError> {
        let mut body = Map::new();
        body.insert("query".into(), json!(vector));
        body.insert("limit".into(), json!(limit));
        body.insert("with_payload".into(), Value::Bool(true));
        if let Some(filter_value) = filter {
            body.insert("filter".into(), filter_value);
        }

        let response = self
            .request(
                Method::POST,
                &format!("collections/{}/points/query", self.collection),
            )
            .json(&Value::Object(body))
            .send()
            .await?;
        let response = self.check_status(response, "Qdrant search failed").await?;

        let payload: QueryResponse = response.json().await?;
        let points = match payload.result {
            QueryResponseResult::Points(points) => points,
            QueryResponseResult::Object { points } => points,
        };
        Ok(points
            .into_iter()
            .map(|point| (stringify_point_id(point.id), point.score, point.payload))
            .collect())
    }

    /// Scroll every point matching `filter`, returning ids with payloads.
    pub async fn scroll_points(
        &self,
        filter: Option<Value>,
    ) -> Result<Vec<(String, Map<String, Value>)>, QdrantError> {
        let mut offset: Option<Value> = None;
        let mut results = Vec::new();
        let filter_body = filter.unwrap_or_else(|| json!({ "must": [] }));

        loop {
            let mut body = Map::new();
            body.insert("with_payload".into(), Value::Bool(true));
            body.insert("with_vector".into(), Value::Bool(false));
            body.insert("limit".into(), json!(SCROLL_PAGE_SIZE));
            body.insert("filter".into(), filter_body.clone());
            if let Some(next) = offset.take() {
                body.insert("offset".into(), next);
            }

            let response = self
                .request(
                    Method::POST,
                    &format!("collections/{}/points/scroll", self.collection),
                )
                .json(&Value::Object(body))
                .send()
                .await?;
            let response = self
                .check_status(response, "Failed to scroll points")
                .await?;

            let ScrollResponse { result } = response.json().await?;
            for point in result.points {
                if let (Some(id), Some(payload)) = (point.id, point.payload) {
                    results.push((stringify_point_id(id), payload));
                }
            }

            match result.next_page_offset {
                Some(next) if !next.is_null() => offset = Some(next),
                _ => break,
            }
        }

        Ok(results)
    }

    /// Count points matching `filter` exactly.
    pub async fn count_points(&self, filter: Option<Value>) -> Result<usize, QdrantError> {
        let mut body = Map::new();
        body.insert("exact".into(), Value::Bool(true));
        if let Some(filter_value) = filter {
            body.insert("filter".into(), filter_value);
        }

        let response = self
            .request(
                Method::POST,
                &format!("collections/{}/points/count", self.collection),
            )
            .json(&Value::Object(body))
            .send()
            .await?;
        let response = self.check_status(response, "Failed to count points").await?;
        let CountResponse { result } = response.json().await?;
        Ok(result.count)
    }

    async fn ensure_payload_indexes(&self) -> Result<(), QdrantError> {
        for field in INDEXED_FIELDS {
            let body = json!({
                "field_name": field,
                "field_schema": "keyword",
            });

            let response = self
                .request(
                    Method::PUT,
                    &format!("collections/{}/index", self.collection),
                )
                .json(&body)
                .send()
                .await?;

            if response.status().is_success() || response.status() == StatusCode::CONFLICT {
                tracing::debug!(collection = %self.collection, field, "Payload index ensured");
            } else {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                let error = QdrantError::UnexpectedStatus { status, body };
                tracing::warn!(collection = %self.collection, field, error = %error, "Failed to ensure payload index");
            }
        }

        Ok(())
    }

    async fn collection_exists(&self) -> Result<bool, QdrantError> {
        let response = self
            .request(Method::GET, &format!("collections/{}", self.collection))
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => {
                let body = response.text().await.unwrap_or_default();
                let error = QdrantError::UnexpectedStatus { status, body };
                tracing::error!(collection = %self.collection, error = %error, "Collection existence check failed");
                Err(error)
            }
        }
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format_endpoint(&self.base_url, path);
        let mut req = self.client.request(method, url);
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            req = req.header("api-key", api_key);
        }
        req
    }

    async fn check_status(
        &self,
        response: reqwest::Response,
        context: &'static str,
    ) -> Result<reqwest::Response, QdrantError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let error = QdrantError::UnexpectedStatus { status, body };
        tracing::error!(collection = %self.collection, error = %error, "{context}");
        Err(error)
    }

    async fn ensure_success<F>(
        &self,
        response: reqwest::Response,
        on_success: F,
    ) -> Result<(), QdrantError>
    where
        F: FnOnce(),
    {
        self.check_status(response, "Qdrant request failed").await?;
        on_success();
        Ok(())
    }
}

#[async_trait]
impl VectorStore for QdrantService {
    async fn upsert(&self, vectors: Vec<IndexedVector>) -> Result<(), VectorStoreError> {
        self.upsert_points(&vectors).await?;
        Ok(())
    }

    async fn delete(&self, vector_ids: Vec<String>) -> Result<(), VectorStoreError> {
        Ok(self.delete_points(&vector_ids).await?)
    }

    async fn query(
        &self,
        embedding: Vec<f32>,
        top_k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<QueryMatch>, VectorStoreError> {
        let hits = self
            .search_points(embedding, build_match_filter(filter), top_k)
            .await?;

        let mut matches = Vec::with_capacity(hits.len());
        for (vector_id, score, payload) in hits {
            let Some(payload) = payload else {
                tracing::warn!(vector_id = %vector_id, "Skipping match without payload");
                continue;
            };
            match VectorMetadata::from_payload(payload) {
                Ok(metadata) => matches.push(QueryMatch {
                    vector_id,
                    score,
                    metadata,
                }),
                Err(error) => {
                    tracing::warn!(vector_id = %vector_id, error = %error, "Skipping match with malformed payload");
                }
            }
        }
        Ok(matches)
    }

    async fn list(&self, filter: &MetadataFilter) -> Result<Vec<StoredPoint>, VectorStoreError> {
        let points = self.scroll_points(build_match_filter(filter)).await?;
        let mut stored = Vec::with_capacity(points.len());
        for (vector_id, payload) in points {
            let metadata = match VectorMetadata::from_payload(payload) {
                Ok(metadata) => Some(metadata),
                Err(error) => {
                    tracing::warn!(vector_id = %vector_id, error = %error, "Stored point has malformed payload");
                    None
                }
            };
            stored.push(StoredPoint {
                vector_id,
                metadata,
            });
        }
        Ok(stored)
    }

    async fn count(&self, filter: &MetadataFilter) -> Result<usize, VectorStoreError> {
        Ok(self.count_points(build_match_filter(filter)).await?)
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}
