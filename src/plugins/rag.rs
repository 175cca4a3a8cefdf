use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{error, info};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{Result, WorkshopError};
use crate::plugins::{
    bool_arg, int_arg, required_string_arg, string_arg, FunctionDefinition, FunctionParameter, KernelPlugin,
    ParameterType,
};
use crate::search::{BlobStore, SearchClient, SearchDocument, SearchOptions};

/// Characters of content shown per search hit.
pub const EXCERPT_CHARS: usize = 500;

/// Document as shown to agents; field order is preserved in the JSON.
#[derive(Debug, Serialize)]
struct DocumentView<'a> {
    id: &'a str,
    title: &'a str,
    content: String,
    source: &'a str,
    #[serde(rename = "documentType")]
    document_type: &'a str,
    #[serde(rename = "uploadTimestamp")]
    upload_timestamp: &'a str,
}

impl<'a> DocumentView<'a> {
    fn full(doc: &'a SearchDocument) -> Self {
        Self::with_content(doc, doc.content.clone())
    }

    fn excerpt(doc: &'a SearchDocument) -> Self {
        Self::with_content(doc, excerpt(&doc.content))
    }

    fn with_content(doc: &'a SearchDocument, content: String) -> Self {
        Self {
            id: &doc.id,
            title: &doc.title,
            content,
            source: &doc.source,
            document_type: &doc.document_type,
            upload_timestamp: &doc.upload_timestamp,
        }
    }
}

/// First [`EXCERPT_CHARS`] characters followed by `...` when longer.
pub fn excerpt(content: &str) -> String {
    match content.char_indices().nth(EXCERPT_CHARS) {
        Some((cut, _)) => format!("{}...", &content[..cut]),
        None => content.to_string(),
    }
}

/// Knowledge-base retrieval backed by blob storage and a search index.
pub struct RagPlugin {
    search: SearchClient,
    blobs: BlobStore,
}

impl RagPlugin {
    pub const NAME: &'static str = "RAG";

    pub fn new(search: SearchClient, blobs: BlobStore) -> Self {
        Self { search, blobs }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let blobs = BlobStore::new(&config.storage)?;
        let search = SearchClient::new(&config.search)?;
        Ok(Self::new(search, blobs))
    }

    async fn try_upload(&self, content: &str, title: &str, source: &str, document_type: &str) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let blob_name = format!("{}.txt", id);

        self.blobs.upload_text(&blob_name, content).await?;

        let document = SearchDocument {
            id: id.clone(),
            title: title.to_string(),
            content: content.to_string(),
            source: source.to_string(),
            document_type: document_type.to_string(),
            upload_timestamp: Utc::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
            blob_name: Some(blob_name),
        };
        self.search.upload_documents(std::slice::from_ref(&document)).await?;
        Ok(id)
    }

    pub async fn upload_document(&self, content: &str, title: &str, source: &str, document_type: &str) -> String {
        match self.try_upload(content, title, source, document_type).await {
            Ok(id) => {
                info!("Uploaded document '{}' as {}", title, id);
                format!("Document '{}' (ID: {}) successfully uploaded to the knowledge base.", title, id)
            }
            Err(e) => {
                error!("Error uploading document '{}': {}", title, e);
                format!("Error uploading document: {}", e)
            }
        }
    }

    async fn try_search(&self, query: &str, top: usize, semantic: bool) -> Result<String> {
        let options = SearchOptions {
            top,
            semantic,
            ..SearchOptions::default()
        };
        let results = self.search.search(query, &options).await?;
        let views: Vec<DocumentView<'_>> = results.documents.iter().map(DocumentView::excerpt).collect();
        let total = results.total_count.unwrap_or(views.len() as u64);

        Ok(format!(
            "Found {} results for query '{}'.\n\nTop {} results:\n{}",
            total,
            query,
            views.len(),
            serde_json::to_string_pretty(&views)?
        ))
    }

    pub async fn search_knowledge_base(&self, query: &str, top: usize, use_semantic_search: bool) -> String {
        self.try_search(query, top, use_semantic_search)
            .await
            .unwrap_or_else(|e| {
                error!("Error searching knowledge base for '{}': {}", query, e);
                format!("Error searching knowledge base: {}", e)
            })
    }

    async fn try_get(&self, document_id: &str) -> Result<String> {
        match self.search.get_document(document_id).await? {
            Some(doc) => Ok(format!(
                "Document retrieved:\n{}",
                serde_json::to_string_pretty(&DocumentView::full(&doc))?
            )),
            None => Ok(format!("Document with ID '{}' not found.", document_id)),
        }
    }

    pub async fn get_document_by_id(&self, document_id: &str) -> String {
        self.try_get(document_id).await.unwrap_or_else(|e| {
            error!("Error retrieving document {}: {}", document_id, e);
            format!("Error retrieving document: {}", e)
        })
    }
}

#[async_trait]
impl KernelPlugin for RagPlugin {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn functions(&self) -> Vec<FunctionDefinition> {
        vec![
            FunctionDefinition::new("upload_document", "Upload a document to the knowledge base.")
                .param(FunctionParameter::required(
                    "content",
                    ParameterType::String,
                    "The text content of the document",
                ))
                .param(FunctionParameter::required("title", ParameterType::String, "The title of the document"))
                .param(
                    FunctionParameter::optional(
                        "source",
                        ParameterType::String,
                        "The source of the document (e.g., 'internal', 'web', 'manual')",
                    )
                    .with_default(json!("internal")),
                )
                .param(
                    FunctionParameter::optional(
                        "document_type",
                        ParameterType::String,
                        "The type of the document (e.g., 'report', 'article', 'guide')",
                    )
                    .with_default(json!("document")),
                ),
            FunctionDefinition::new("search_knowledge_base", "Search for information in the knowledge base.")
                .param(FunctionParameter::required("query", ParameterType::String, "The search query"))
                .param(
                    FunctionParameter::optional("top", ParameterType::Integer, "The number of results to return")
                        .with_default(json!(3)),
                )
                .param(
                    FunctionParameter::optional(
                        "use_semantic_search",
                        ParameterType::Boolean,
                        "Whether to use semantic search capabilities",
                    )
                    .with_default(json!(true)),
                ),
            FunctionDefinition::new(
                "get_document_by_id",
                "Retrieve the full content of a specific document by ID.",
            )
            .param(FunctionParameter::required(
                "document_id",
                ParameterType::String,
                "The ID of the document to retrieve",
            )),
        ]
    }

    async fn invoke(&self, function: &str, arguments: &Value) -> Result<String> {
        info!("{} invoking {}", Self::NAME, function);
        match function {
            "upload_document" => {
                let content = required_string_arg(arguments, "content")?;
                let title = required_string_arg(arguments, "title")?;
                let source = string_arg(arguments, "source").unwrap_or_else(|| "internal".to_string());
                let document_type = string_arg(arguments, "document_type").unwrap_or_else(|| "document".to_string());
                Ok(self.upload_document(&content, &title, &source, &document_type).await)
            }
            "search_knowledge_base" => {
                let query = required_string_arg(arguments, "query")?;
                let top = int_arg(arguments, "top", 3).max(1) as usize;
                let semantic = bool_arg(arguments, "use_semantic_search", true);
                Ok(self.search_knowledge_base(&query, top, semantic).await)
            }
            "get_document_by_id" => {
                let id = required_string_arg(arguments, "document_id")?;
                Ok(self.get_document_by_id(&id).await)
            }
            other => Err(WorkshopError::Plugin(format!("{} has no function '{}'", Self::NAME, other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::tests::{fake_search_service, search_config};
    use axum::{http::StatusCode, routing::put, Router};

    async fn fake_blob_service() -> String {
        let router = Router::new().route("/:container/:blob", put(|| async { StatusCode::CREATED }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    async fn plugin() -> RagPlugin {
        let search = SearchClient::new(&search_config(fake_search_service().await)).unwrap();
        let blobs = BlobStore::from_connection_string(
            &format!("BlobEndpoint={};SharedAccessSignature=sv=2022&sig=test", fake_blob_service().await),
            "documents",
        )
        .unwrap();
        RagPlugin::new(search, blobs)
    }

    fn uploaded_id(message: &str) -> String {
        let start = message.find("(ID: ").unwrap() + 5;
        let end = message[start..].find(')').unwrap() + start;
        message[start..end].to_string()
    }

    #[test]
    fn test_excerpt_truncates_long_content() {
        assert_eq!(excerpt("short"), "short");
        let long = "é".repeat(EXCERPT_CHARS + 10);
        let cut = excerpt(&long);
        assert!(cut.ends_with("..."));
        assert_eq!(cut.chars().count(), EXCERPT_CHARS + 3);
        assert_eq!(excerpt(&"x".repeat(EXCERPT_CHARS)), "x".repeat(EXCERPT_CHARS));
    }

    #[tokio::test]
    async fn test_upload_then_search_and_fetch() {
        let plugin = plugin().await;

        let long_report = format!("Dike inspection. {}", "Sediment levels nominal. ".repeat(40));
        let message = plugin
            .upload_document(&long_report, "Dike Report 2024", "internal", "report")
            .await;
        assert!(message.starts_with("Document 'Dike Report 2024' (ID: "));
        let id = uploaded_id(&message);

        plugin
            .invoke(
                "upload_document",
                &json!({"content": "Bridge joints need replacement", "title": "Bridge Memo"}),
            )
            .await
            .unwrap();

        let found = plugin.search_knowledge_base("dike", 3, true).await;
        assert!(found.starts_with("Found 1 results for query 'dike'.\n\nTop 1 results:\n"));
        assert!(found.contains("Dike Report 2024"));
        assert!(found.contains("...\""));
        let id_pos = found.find("\"id\"").unwrap();
        let title_pos = found.find("\"title\"").unwrap();
        assert!(id_pos < title_pos);

        let document = plugin.get_document_by_id(&id).await;
        assert!(document.starts_with("Document retrieved:\n"));
        assert!(document.contains("\"documentType\": \"report\""));
        assert!(!document.contains("..."));

        let missing = plugin.get_document_by_id("does-not-exist").await;
        assert_eq!(missing, "Document with ID 'does-not-exist' not found.");
    }

    #[tokio::test]
    async fn test_missing_arguments_are_plugin_errors() {
        let plugin = plugin().await;
        let err = plugin.invoke("search_knowledge_base", &json!({})).await.unwrap_err();
        assert!(matches!(err, WorkshopError::Plugin(_)));
    }

    #[tokio::test]
    async fn test_storage_failure_is_reported_as_text() {
        let search = SearchClient::new(&search_config(fake_search_service().await)).unwrap();
        let blobs =
            BlobStore::from_connection_string("BlobEndpoint=http://127.0.0.1:9;SharedAccessSignature=sig=x", "documents")
                .unwrap();
        let plugin = RagPlugin::new(search, blobs);

        let message = plugin.upload_document("text", "Title", "internal", "document").await;
        assert!(message.starts_with("Error uploading document:"));
    }
}
