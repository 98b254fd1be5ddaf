use loan_rag::embedding::HashEmbeddingClient;
use loan_rag::processing::{
    ChunkerSettings, Document, IndexerSettings, NO_CONTEXT_SENTINEL, PipelineSettings,
    QueryRequest, RagApi, RagService, RetrieverSettings,
};
use loan_rag::retry::RetryPolicy;
use loan_rag::source::DirectoryDocumentSource;
use loan_rag::store::InMemoryVectorStore;
use std::sync::Arc;

const CHUNK_CHARS: usize = 40;

fn pipeline() -> RagService {
    let mut indexer = IndexerSettings::new(ChunkerSettings::new(CHUNK_CHARS, 0).expect("chunker"));
    indexer.retry = RetryPolicy::none();
    let settings = PipelineSettings {
        indexer,
        retriever: RetrieverSettings {
            retry: RetryPolicy::none(),
            ..RetrieverSettings::default()
        },
        context_max_chars: 4_000,
    };
    RagService::new(
        Arc::new(HashEmbeddingClient::new("hash", 64)),
        Arc::new(InMemoryVectorStore::new()),
        settings,
    )
}

/// Pad a sentence with dots to exactly one chunk window.
fn segment(text: &str) -> String {
    format!("{text:.<40}")
}

fn document(id: &str, loan: &str, text: String) -> Document {
    Document {
        id: id.into(),
        loan_id: loan.into(),
        filename: Some(format!("{id}.pdf")),
        doc_type: Some("loan_agreement".into()),
        category: None,
        text_content: text,
        file_type: None,
    }
}

fn query(loan: &str, text: &str, top_k: usize) -> QueryRequest {
    QueryRequest {
        loan_id: loan.into(),
        query: text.into(),
        top_k: Some(top_k),
    }
}

fn three_chunk_text() -> (String, [String; 3]) {
    let parts = [
        segment("Borrower: Jane Q. Public, Austin TX"),
        segment("Interest rate 6.25% fixed, 30 years"),
        segment("Prepayment penalty waived after year 2"),
    ];
    (parts.concat(), parts)
}

#[tokio::test]
async fn exact_chunk_query_ranks_that_chunk_first() {
    let service = pipeline();
    let (text, parts) = three_chunk_text();
    let summary = service
        .index_documents("loan-1", vec![document("agreement", "loan-1", text)])
        .await
        .expect("index");
    assert_eq!(summary.chunks_indexed, 3);
    assert!(summary.failed_documents.is_empty());

    let outcome = service
        .query(query("loan-1", &parts[1], 3))
        .await
        .expect("query");
    assert_eq!(outcome.match_count, 3);
    let top = &outcome.contexts[0];
    assert_eq!(top.metadata.chunk_index, 1);
    assert!(outcome.contexts[1..].iter().all(|other| top.score > other.score));
    assert!(outcome.context_string.starts_with(
        "[1] From document \"agreement.pdf\" (loan_agreement):\nInterest rate 6.25%"
    ));
    assert!(!outcome.truncated);
}

#[tokio::test]
async fn reindexing_is_idempotent() {
    let service = pipeline();
    let (text, parts) = three_chunk_text();
    let doc = document("agreement", "loan-1", text);

    service
        .index_documents("loan-1", vec![doc.clone()])
        .await
        .expect("index");
    let count = service.indexed_vector_count("loan-1").await.expect("count");
    let before = service
        .query(query("loan-1", &parts[2], 3))
        .await
        .expect("query");

    service
        .index_documents("loan-1", vec![doc])
        .await
        .expect("reindex");
    let after = service
        .query(query("loan-1", &parts[2], 3))
        .await
        .expect("query");

    assert_eq!(service.indexed_vector_count("loan-1").await.expect("count"), count);
    assert_eq!(before.context_string, after.context_string);
    assert_eq!(before.contexts, after.contexts);
}

#[tokio::test]
async fn shrinking_document_prunes_excess_chunks() {
    let service = pipeline();
    let (text, parts) = three_chunk_text();
    service
        .index_documents("loan-1", vec![document("agreement", "loan-1", text)])
        .await
        .expect("index");
    assert_eq!(service.indexed_vector_count("loan-1").await.expect("count"), 3);

    let summary = service
        .index_documents(
            "loan-1",
            vec![document("agreement", "loan-1", parts[0].clone())],
        )
        .await
        .expect("reindex");
    assert_eq!(summary.documents[0].removed_stale_count, 2);
    assert_eq!(service.indexed_vector_count("loan-1").await.expect("count"), 1);

    let outcome = service
        .query(query("loan-1", &parts[2], 5))
        .await
        .expect("query");
    assert!(outcome.contexts.iter().all(|m| m.metadata.chunk_index == 0));
    assert_eq!(service.metrics_snapshot().stale_vectors_removed, 2);
}

#[tokio::test]
async fn loans_never_see_each_others_passages() {
    let service = pipeline();
    let shared = segment("Appraised value $450,000 as of March");
    let near_duplicate = segment("Appraised value $450,000 as of March!");

    service
        .index_documents("loan-a", vec![document("appraisal-a", "loan-a", near_duplicate)])
        .await
        .expect("index a");
    service
        .index_documents("loan-b", vec![document("appraisal-b", "loan-b", shared.clone())])
        .await
        .expect("index b");

    let outcome = service
        .query(query("loan-a", &shared, 10))
        .await
        .expect("query");
    assert_eq!(outcome.match_count, 1);
    assert!(outcome.contexts.iter().all(|m| m.metadata.loan_id == "loan-a"));

    let empty = service
        .query(query("loan-c", &shared, 10))
        .await
        .expect("query");
    assert_eq!(empty.match_count, 0);
    assert_eq!(empty.context_string, NO_CONTEXT_SENTINEL);
}

#[tokio::test]
async fn pull_indexing_reads_the_loan_directory() {
    let root = tempfile::tempdir().expect("tempdir");
    let loan_dir = root.path().join("loan-42");
    std::fs::create_dir_all(&loan_dir).expect("mkdir");
    std::fs::write(
        loan_dir.join("closing.html"),
        "<html><body><h1>Closing Disclosure</h1><p>Cash to close: $12,400</p></body></html>",
    )
    .expect("write");
    std::fs::write(
        loan_dir.join("docs.json"),
        r#"{ "id": "title-1", "filename": "title.pdf", "docType": "title_report", "textContent": "No liens recorded." }"#,
    )
    .expect("write");

    let service = pipeline().with_source(Arc::new(DirectoryDocumentSource::new(root.path())));
    let summary = service.index_loan("loan-42").await.expect("index");
    assert_eq!(summary.total_documents, 2);
    assert_eq!(summary.indexed_count, 2);

    let outcome = service
        .query(query("loan-42", "Cash to close", 5))
        .await
        .expect("query");
    assert!(outcome
        .contexts
        .iter()
        .any(|m| m.metadata.document_name == "closing.html"));
    assert!(!outcome.context_string.contains("<h1>"));
}

#[tokio::test]
async fn same_file_name_under_two_loans_stays_separate() {
    let root = tempfile::tempdir().expect("tempdir");
    let shared = segment("Underwriter memo: income verified");
    for (loan, text) in [
        ("loan-a", shared.clone()),
        ("loan-b", shared.clone()),
        ("loan-c", segment("Underwriter memo: assets pending")),
    ] {
        let dir = root.path().join(loan);
        std::fs::create_dir_all(&dir).expect("mkdir");
        std::fs::write(dir.join("memo.txt"), text.repeat(2)).expect("write");
    }

    let service = pipeline().with_source(Arc::new(DirectoryDocumentSource::new(root.path())));
    for loan in ["loan-a", "loan-b", "loan-c"] {
        let summary = service.index_loan(loan).await.expect("index");
        assert_eq!(summary.chunks_indexed, 2, "{loan}");
        assert!(summary.documents.iter().all(|doc| !doc.unchanged), "{loan}");
    }

    for loan in ["loan-a", "loan-b", "loan-c"] {
        assert_eq!(service.indexed_vector_count(loan).await.expect("count"), 2, "{loan}");
        let outcome = service
            .query(query(loan, "Underwriter memo", 5))
            .await
            .expect("query");
        assert_eq!(outcome.match_count, 2, "{loan}");
        assert!(outcome.contexts.iter().all(|m| m.metadata.loan_id == loan));
    }
}
