//! HTTP surface for the loan document pipeline.
//!
//! - `POST /index` – Index documents for a loan. With `documents` in the body they are indexed
//!   directly; without it the loan's documents are pulled from the configured document source.
//!   Returns `{loanId, totalDocuments, indexedCount, chunksIndexed, failedDocuments, errors}`.
//! - `GET /index?loanId=` – Number of vectors currently indexed for a loan.
//! - `POST /query` – Retrieve the best passages for a question and assemble a cited context.
//! - `GET /metrics` – Indexing and query counters.

use crate::metrics::MetricsSnapshot;
use crate::processing::{
    Document, FailedDocument, IndexError, IndexErrorEntry, QueryOutcome, QueryRequest, RagApi,
    RetrievalError,
};
use crate::source::DocumentSourceError;
use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

/// Build the HTTP router exposing the pipeline.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: RagApi + 'static,
{
    Router::new()
        .route("/index", post(index_loan::<S>).get(index_status::<S>))
        .route("/query", post(query_loan::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .with_state(service)
}

/// Request body for `POST /index`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexRequest {
    loan_id: String,
    /// Documents to index; when absent they are pulled from the document source.
    #[serde(default)]
    documents: Option<Vec<Document>>,
}

/// Response body for `POST /index`.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IndexResponse {
    loan_id: String,
    total_documents: usize,
    indexed_count: usize,
    chunks_indexed: usize,
    failed_documents: Vec<FailedDocument>,
    errors: Vec<IndexErrorEntry>,
}

async fn index_loan<S>(
    State(service): State<Arc<S>>,
    Json(request): Json<IndexRequest>,
) -> Result<Json<IndexResponse>, AppError>
where
    S: RagApi,
{
    let IndexRequest { loan_id, documents } = request;
    let outcome = match documents {
        Some(documents) => service.index_documents(&loan_id, documents).await?,
        None => service.index_loan(&loan_id).await?,
    };
    tracing::info!(
        loan_id = %outcome.loan_id,
        documents = outcome.total_documents,
        indexed = outcome.indexed_count,
        chunks = outcome.chunks_indexed,
        errors = outcome.errors.len(),
        "Index request completed"
    );
    Ok(Json(IndexResponse {
        loan_id: outcome.loan_id,
        total_documents: outcome.total_documents,
        indexed_count: outcome.indexed_count,
        chunks_indexed: outcome.chunks_indexed,
        failed_documents: outcome.failed_documents,
        errors: outcome.errors,
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexStatusParams {
    loan_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IndexStatusResponse {
    loan_id: String,
    indexed_vectors: usize,
}

async fn index_status<S>(
    State(service): State<Arc<S>>,
    Query(params): Query<IndexStatusParams>,
) -> Result<Json<IndexStatusResponse>, AppError>
where
    S: RagApi,
{
    let indexed_vectors = service.indexed_vector_count(&params.loan_id).await?;
    Ok(Json(IndexStatusResponse {
        loan_id: params.loan_id,
        indexed_vectors,
    }))
}

async fn query_loan<S>(
    State(service): State<Arc<S>>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryOutcome>, AppError>
where
    S: RagApi,
{
    let outcome = service.query(request).await?;
    tracing::info!(
        loan_id = %outcome.loan_id,
        matches = outcome.match_count,
        truncated = outcome.truncated,
        estimated_tokens = outcome.estimated_tokens,
        "Query served"
    );
    Ok(Json(outcome))
}

async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<MetricsSnapshot>
where
    S: RagApi,
{
    Json(service.metrics_snapshot())
}

enum AppError {
    Index(IndexError),
    Retrieval(RetrievalError),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Index(
                IndexError::InvalidLoanId(_)
                | IndexError::MissingDocumentId
                | IndexError::LoanMismatch { .. }
                | IndexError::SourceNotConfigured
                | IndexError::Source(DocumentSourceError::InvalidLoanId(_)),
            ) => StatusCode::BAD_REQUEST,
            Self::Index(IndexError::Source(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Retrieval(
                RetrievalError::InvalidLoanId
                | RetrievalError::EmptyQuery
                | RetrievalError::InvalidTopK,
            ) => StatusCode::BAD_REQUEST,
            Self::Retrieval(RetrievalError::QueryEmbeddingFailed(_)) => StatusCode::BAD_GATEWAY,
            Self::Retrieval(RetrievalError::RetrievalUnavailable(_)) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
        }
    }

    fn message(&self) -> String {
        match self {
            Self::Index(error) => error.to_string(),
            Self::Retrieval(error) => error.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.message();
        if status.is_server_error() {
            tracing::error!(%status, error = %message, "Request failed");
        }
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<IndexError> for AppError {
    fn from(inner: IndexError) -> Self {
        Self::Index(inner)
    }
}

impl From<RetrievalError> for AppError {
    fn from(inner: RetrievalError) -> Self {
        Self::Retrieval(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::create_router;
    use crate::metrics::MetricsSnapshot;
    use crate::processing::{
        Document, IndexError, LoanIndexOutcome, QueryOutcome, QueryRequest, RagApi,
        RetrievalError,
    };
    use async_trait::async_trait;
    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode},
    };
    use serde_json::{Value, json};
    use std::sync::Arc;
    use tokio::sync::Mutex;
    use tower::ServiceExt;

    #[derive(Clone, Debug, PartialEq)]
    enum Call {
        IndexDocuments { loan_id: String, documents: usize },
        IndexLoan { loan_id: String },
        Query { loan_id: String, top_k: Option<usize> },
    }

    #[derive(Default)]
    struct StubRagService {
        calls: Mutex<Vec<Call>>,
        fail_query_with: Mutex<Option<RetrievalError>>,
    }

    impl StubRagService {
        async fn recorded_calls(&self) -> Vec<Call> {
            self.calls.lock().await.clone()
        }
    }

    #[async_trait]
    impl RagApi for StubRagService {
        async fn index_documents(
            &self,
            loan_id: &str,
            documents: Vec<Document>,
        ) -> Result<LoanIndexOutcome, IndexError> {
            self.calls.lock().await.push(Call::IndexDocuments {
                loan_id: loan_id.to_string(),
                documents: documents.len(),
            });
            Ok(LoanIndexOutcome {
                loan_id: loan_id.to_string(),
                total_documents: documents.len(),
                indexed_count: documents.len(),
                chunks_indexed: 3,
                ..LoanIndexOutcome::default()
            })
        }

        async fn index_loan(&self, loan_id: &str) -> Result<LoanIndexOutcome, IndexError> {
            self.calls.lock().await.push(Call::IndexLoan {
                loan_id: loan_id.to_string(),
            });
            Err(IndexError::SourceNotConfigured)
        }

        async fn query(&self, request: QueryRequest) -> Result<QueryOutcome, RetrievalError> {
            self.calls.lock().await.push(Call::Query {
                loan_id: request.loan_id.clone(),
                top_k: request.top_k,
            });
            if let Some(error) = self.fail_query_with.lock().await.take() {
                return Err(error);
            }
            Ok(QueryOutcome {
                loan_id: request.loan_id,
                query: request.query,
                contexts: Vec::new(),
                context_string: "context".into(),
                match_count: 0,
                truncated: false,
                estimated_tokens: 1,
            })
        }

        async fn indexed_vector_count(&self, _loan_id: &str) -> Result<usize, RetrievalError> {
            Ok(12)
        }

        fn metrics_snapshot(&self) -> MetricsSnapshot {
            MetricsSnapshot {
                documents_indexed: 2,
                queries_served: 5,
                ..MetricsSnapshot::default()
            }
        }
    }

    async fn send(
        service: Arc<StubRagService>,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let app = create_router(service);
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(payload) => {
                builder = builder.header("content-type", "application/json");
                Body::from(payload.to_string())
            }
            None => Body::empty(),
        };
        let response = app
            .oneshot(builder.body(body).expect("request"))
            .await
            .expect("router response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn index_route_passes_documents_through() {
        let service = Arc::new(StubRagService::default());
        let payload = json!({
            "loanId": "loan-1",
            "documents": [
                { "id": "d1", "filename": "note.pdf", "textContent": "Promissory note" },
                { "id": "d2", "content": "Deed of trust" }
            ]
        });

        let (status, body) = send(service.clone(), Method::POST, "/index", Some(payload)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["loanId"], "loan-1");
        assert_eq!(body["indexedCount"], 2);
        assert_eq!(body["chunksIndexed"], 3);
        assert_eq!(body["errors"], json!([]));
        assert_eq!(
            service.recorded_calls().await,
            vec![Call::IndexDocuments {
                loan_id: "loan-1".into(),
                documents: 2
            }]
        );
    }

    #[tokio::test]
    async fn index_route_without_documents_pulls_from_source() {
        let service = Arc::new(StubRagService::default());
        let (status, body) = send(
            service.clone(),
            Method::POST,
            "/index",
            Some(json!({ "loanId": "loan-1" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().expect("error").contains("source"));
        assert_eq!(
            service.recorded_calls().await,
            vec![Call::IndexLoan {
                loan_id: "loan-1".into()
            }]
        );
    }

    #[tokio::test]
    async fn index_status_reports_vector_count() {
        let service = Arc::new(StubRagService::default());
        let (status, body) = send(service, Method::GET, "/index?loanId=loan-9", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "loanId": "loan-9", "indexedVectors": 12 }));
    }

    #[tokio::test]
    async fn query_route_forwards_top_k() {
        let service = Arc::new(StubRagService::default());
        let (status, body) = send(
            service.clone(),
            Method::POST,
            "/query",
            Some(json!({ "loanId": "loan-1", "query": "rate?", "topK": 3 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["contextString"], "context");
        assert_eq!(body["matchCount"], 0);
        assert_eq!(
            service.recorded_calls().await,
            vec![Call::Query {
                loan_id: "loan-1".into(),
                top_k: Some(3)
            }]
        );
    }

    #[tokio::test]
    async fn retrieval_failures_map_to_gateway_statuses() {
        for (error, expected) in [
            (
                RetrievalError::RetrievalUnavailable("down".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                RetrievalError::QueryEmbeddingFailed("quota".into()),
                StatusCode::BAD_GATEWAY,
            ),
            (RetrievalError::EmptyQuery, StatusCode::BAD_REQUEST),
        ] {
            let service = Arc::new(StubRagService::default());
            *service.fail_query_with.lock().await = Some(error);
            let (status, body) = send(
                service,
                Method::POST,
                "/query",
                Some(json!({ "loanId": "loan-1", "query": "rate?" })),
            )
            .await;
            assert_eq!(status, expected);
            assert!(body["error"].is_string());
        }
    }

    #[tokio::test]
    async fn metrics_route_serializes_snapshot() {
        let service = Arc::new(StubRagService::default());
        let (status, body) = send(service, Method::GET, "/metrics", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["documentsIndexed"], 2);
        assert_eq!(body["queriesServed"], 5);
        assert_eq!(body["staleVectorsRemoved"], 0);
    }
}
