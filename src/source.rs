//! Document sources feeding the indexer.
//!
//! The directory source expects one sub-directory per loan:
//!
//! ```text
//! <root>/<loanId>/documents.json    one Document or an array of Documents
//! <root>/<loanId>/appraisal.html    a single document; id = relative path
//! ```

use crate::processing::Document;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

const TEXT_EXTENSIONS: &[&str] = &["txt", "md", "html", "htm"];

/// Errors raised while reading documents from a source.
#[derive(Debug, Error)]
pub enum DocumentSourceError {
    /// Loan id is blank or would escape the source root.
    #[error("Invalid loan id for document source: {0:?}")]
    InvalidLoanId(String),
    /// File could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        /// File or directory being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// JSON document file was malformed.
    #[error("Failed to parse {path}: {source}")]
    Parse {
        /// File being parsed.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },
    /// Background read task failed.
    #[error("Document source task failed: {0}")]
    Task(String),
}

/// Supplies the documents belonging to a loan.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Return every document recorded for `loan_id`. An unknown loan yields an empty list.
    async fn documents_for_loan(&self, loan_id: &str) -> Result<Vec<Document>, DocumentSourceError>;
}

/// File-backed document source rooted at a directory.
#[derive(Debug, Clone)]
pub struct DirectoryDocumentSource {
    root: PathBuf,
}

impl DirectoryDocumentSource {
    /// Create a source reading from `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of the source.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl DocumentSource for DirectoryDocumentSource {
    async fn documents_for_loan(&self, loan_id: &str) -> Result<Vec<Document>, DocumentSourceError> {
        let loan_id = loan_id.trim();
        if loan_id.is_empty()
            || loan_id.contains(['/', '\\'])
            || loan_id.contains("..")
        {
            return Err(DocumentSourceError::InvalidLoanId(loan_id.to_string()));
        }

        let loan_dir = self.root.join(loan_id);
        let owned_loan = loan_id.to_string();
        let documents = tokio::task::spawn_blocking(move || read_loan_dir(&loan_dir, &owned_loan))
            .await
            .map_err(|err| DocumentSourceError::Task(err.to_string()))??;
        tracing::debug!(loan_id, documents = documents.len(), "Loaded documents from directory");
        Ok(documents)
    }
}

fn read_loan_dir(loan_dir: &Path, loan_id: &str) -> Result<Vec<Document>, DocumentSourceError> {
    if !loan_dir.is_dir() {
        tracing::debug!(path = %loan_dir.display(), "Loan directory not found; no documents");
        return Ok(Vec::new());
    }

    let mut documents = Vec::new();
    for entry in WalkDir::new(loan_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
    {
        let path = entry.path();
        let Some(extension) = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
        else {
            continue;
        };

        if extension == "json" {
            documents.extend(read_json_documents(path)?);
        } else if TEXT_EXTENSIONS.contains(&extension.as_str()) {
            documents.push(read_text_document(loan_dir, path, &extension)?);
        }
    }

    for document in &mut documents {
        if document.loan_id.trim().is_empty() {
            document.loan_id = loan_id.to_string();
        }
    }
    Ok(documents)
}

fn read_json_documents(path: &Path) -> Result<Vec<Document>, DocumentSourceError> {
    let content = std::fs::read_to_string(path).map_err(|source| DocumentSourceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let parse_error = |source| DocumentSourceError::Parse {
        path: path.to_path_buf(),
        source,
    };
    if content.trim_start().starts_with('[') {
        serde_json::from_str(&content).map_err(parse_error)
    } else {
        serde_json::from_str::<Document>(&content)
            .map(|document| vec![document])
            .map_err(parse_error)
    }
}

fn read_text_document(
    loan_dir: &Path,
    path: &Path,
    extension: &str,
) -> Result<Document, DocumentSourceError> {
    let text_content = std::fs::read_to_string(path).map_err(|source| DocumentSourceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let relative = path.strip_prefix(loan_dir).unwrap_or(path);
    let id = relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned());
    let file_type = match extension {
        "html" | "htm" => "text/html",
        "md" => "text/markdown",
        _ => "text/plain",
    };

    Ok(Document {
        id,
        loan_id: String::new(),
        filename,
        doc_type: None,
        category: None,
        text_content,
        file_type: Some(file_type.to_string()),
    })
}
