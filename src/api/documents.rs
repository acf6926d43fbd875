//! Knowledge-base documents and retrieval search (project key)

use std::path::Path;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use urlencoding::encode;

use crate::api::{timestamp, Listing};
use crate::error::{BotdeskError, Result};
use crate::http::{ApiClient, ApiRequest, FilePart};
use crate::session::id_string;

/// An uploaded document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    /// Ingestion state such as `processing` or `ready`.
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub chunk_count: Option<u64>,
    #[serde(default, deserialize_with = "timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Document {
    /// Title if set, else the uploaded file name, else the id.
    pub fn display_name(&self) -> &str {
        self.title
            .as_deref()
            .or(self.filename.as_deref())
            .unwrap_or(&self.id)
    }
}

/// One retrieval result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(alias = "text")]
    pub content: String,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub document_id: Option<serde_json::Value>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SearchResults {
    Bare(Vec<SearchHit>),
    Wrapped {
        #[serde(alias = "hits", alias = "contexts")]
        results: Vec<SearchHit>,
    },
}

const UPLOAD_FIELD: &str = "file";

/// Best-effort content type from the file extension.
fn guess_mime(file_name: &str) -> Option<&'static str> {
    let extension = Path::new(file_name)
        .extension()?
        .to_str()?
        .to_ascii_lowercase();
    Some(match extension.as_str() {
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        "md" | "markdown" => "text/markdown",
        "html" | "htm" => "text/html",
        "csv" => "text/csv",
        "json" => "application/json",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        _ => return None,
    })
}

impl ApiClient {
    pub async fn list_documents(&self) -> Result<Vec<Document>> {
        self.require_project_key()?;
        let listing: Listing<Document> = self.get_json("/documents").await?;
        Ok(listing.into_vec())
    }

    /// Uploads `bytes` as `file_name`.
    ///
    /// The multipart form is rebuilt from the retained bytes if the request
    /// has to be retried after a token refresh.
    pub async fn upload_document(
        &self,
        file_name: &str,
        bytes: Bytes,
        title: Option<&str>,
    ) -> Result<Document> {
        self.require_project_key()?;
        let file = FilePart {
            field: UPLOAD_FIELD.to_string(),
            file_name: file_name.to_string(),
            bytes,
            mime: guess_mime(file_name).map(str::to_string),
        };
        let fields = title
            .map(|t| vec![("title".to_string(), t.to_string())])
            .unwrap_or_default();

        tracing::info!(file_name, size = file.bytes.len(), "Uploading document");
        self.send_json(ApiRequest::post("/documents/upload").multipart(fields, Some(file)))
            .await
    }

    /// Reads `path` and uploads it under its file name.
    pub async fn upload_document_file(&self, path: &Path, title: Option<&str>) -> Result<Document> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| BotdeskError::Config(format!("Not a file: {}", path.display())))?
            .to_string();
        let bytes = tokio::fs::read(path).await.map_err(BotdeskError::from)?;
        self.upload_document(&file_name, Bytes::from(bytes), title)
            .await
    }

    pub async fn delete_document(&self, document_id: &str) -> Result<()> {
        self.require_project_key()?;
        let path = format!("/documents/{}", encode(document_id));
        self.send_empty(ApiRequest::delete(path)).await
    }

    /// Runs a retrieval query against the project's documents.
    pub async fn search_documents(&self, query: &str, top_k: Option<u32>) -> Result<Vec<SearchHit>> {
        self.require_project_key()?;
        let results: SearchResults = self
            .post_json("/search", &SearchRequest { query, top_k })
            .await?;
        Ok(match results {
            SearchResults::Bare(hits) | SearchResults::Wrapped { results: hits } => hits,
        })
    }
}
