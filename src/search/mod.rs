pub mod blob;

use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::SearchConfig;
use crate::error::{Result, WorkshopError};

pub use blob::BlobStore;

/// Fields returned by knowledge-base searches.
pub const DEFAULT_SELECT: &[&str] = &["id", "title", "content", "source", "documentType", "uploadTimestamp"];

/// A document of the knowledge-base index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchDocument {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub document_type: String,
    #[serde(default)]
    pub upload_timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub top: usize,
    pub select: Vec<String>,
    pub semantic: bool,
    pub include_total_count: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            top: 3,
            select: DEFAULT_SELECT.iter().map(|f| f.to_string()).collect(),
            semantic: true,
            include_total_count: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SearchResults {
    /// Matches in the whole index, when requested.
    pub total_count: Option<u64>,
    pub documents: Vec<SearchDocument>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(rename = "@odata.count")]
    count: Option<u64>,
    #[serde(default)]
    value: Vec<SearchDocument>,
}

#[derive(Debug, Deserialize)]
struct IndexResponse {
    #[serde(default)]
    value: Vec<IndexResult>,
}

#[derive(Debug, Deserialize)]
struct IndexResult {
    key: String,
    status: bool,
    #[serde(rename = "errorMessage")]
    error_message: Option<String>,
}

/// Client for one index of the managed search service.
pub struct SearchClient {
    client: Client,
    endpoint: String,
    api_key: String,
    index_name: String,
    api_version: String,
    semantic_configuration: String,
}

impl SearchClient {
    pub fn new(config: &SearchConfig) -> Result<Self> {
        let (endpoint, api_key) = config.credentials()?;
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| WorkshopError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            index_name: config.index_name.clone(),
            api_version: config.api_version.clone(),
            semantic_configuration: config.semantic_configuration.clone(),
        })
    }

    fn docs_url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&format!("{}/indexes/{}/docs", self.endpoint, self.index_name))
            .map_err(|e| WorkshopError::Search(format!("Invalid search endpoint: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| WorkshopError::Search("Search endpoint cannot be a base URL".to_string()))?
            .extend(segments);
        url.query_pairs_mut().append_pair("api-version", &self.api_version);
        Ok(url)
    }

    async fn failure(response: reqwest::Response) -> WorkshopError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
            .unwrap_or(body);
        WorkshopError::Search(format!("Search request failed with status {}: {}", status, message))
    }

    pub async fn search(&self, query: &str, options: &SearchOptions) -> Result<SearchResults> {
        let mut body = json!({
            "search": query,
            "top": options.top,
            "count": options.include_total_count,
        });
        if !options.select.is_empty() {
            body["select"] = Value::String(options.select.join(","));
        }
        if options.semantic {
            body["queryType"] = json!("semantic");
            body["semanticConfiguration"] = json!(self.semantic_configuration);
        }

        debug!("Searching {} for '{}'", self.index_name, query);
        let response = self
            .client
            .post(self.docs_url(&["search"])?)
            .header("api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::failure(response).await);
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| WorkshopError::Search(format!("Invalid search response: {}", e)))?;

        Ok(SearchResults {
            total_count: parsed.count,
            documents: parsed.value,
        })
    }

    /// Look a document up by key; `None` when the index has no such key.
    pub async fn get_document(&self, id: &str) -> Result<Option<SearchDocument>> {
        let response = self
            .client
            .get(self.docs_url(&[id])?)
            .header("api-key", &self.api_key)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Self::failure(response).await);
        }

        let document = response
            .json()
            .await
            .map_err(|e| WorkshopError::Search(format!("Invalid document response: {}", e)))?;
        Ok(Some(document))
    }

    pub async fn upload_documents(&self, documents: &[SearchDocument]) -> Result<()> {
        let actions: Vec<Value> = documents
            .iter()
            .map(|doc| -> Result<Value> {
                let mut action = serde_json::to_value(doc)?;
                action["@search.action"] = json!("upload");
                Ok(action)
            })
            .collect::<Result<_>>()?;

        let response = self
            .client
            .post(self.docs_url(&["index"])?)
            .header("api-key", &self.api_key)
            .json(&json!({ "value": actions }))
            .send()
            .await?;

        // 207 carries per-document failures in an otherwise successful batch.
        if !response.status().is_success() {
            return Err(Self::failure(response).await);
        }
        let parsed: IndexResponse = response
            .json()
            .await
            .map_err(|e| WorkshopError::Search(format!("Invalid index response: {}", e)))?;

        let failed: Vec<String> = parsed
            .value
            .iter()
            .filter(|r| !r.status)
            .map(|r| format!("{}: {}", r.key, r.error_message.as_deref().unwrap_or("unknown error")))
            .collect();
        if !failed.is_empty() {
            return Err(WorkshopError::Search(format!("Failed to index documents: {}", failed.join("; "))));
        }

        info!("Indexed {} documents into {}", documents.len(), self.index_name);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use axum::{
        extract::{Path, State},
        http::StatusCode,
        routing::{get, post},
        Json, Router,
    };
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};

    type Index = Arc<Mutex<BTreeMap<String, Value>>>;

    async fn index_docs(State(index): State<Index>, Json(body): Json<Value>) -> Json<Value> {
        let mut results = Vec::new();
        let mut index = index.lock().unwrap();
        for mut doc in body["value"].as_array().cloned().unwrap_or_default() {
            let key = doc["id"].as_str().unwrap_or_default().to_string();
            doc.as_object_mut().unwrap().remove("@search.action");
            index.insert(key.clone(), doc);
            results.push(json!({"key": key, "status": true, "errorMessage": null, "statusCode": 201}));
        }
        Json(json!({ "value": results }))
    }

    async fn search_docs(State(index): State<Index>, Json(body): Json<Value>) -> Json<Value> {
        let query = body["search"].as_str().unwrap_or_default().to_lowercase();
        let top = body["top"].as_u64().unwrap_or(50) as usize;
        let index = index.lock().unwrap();
        let hits: Vec<Value> = index
            .values()
            .filter(|doc| doc["content"].as_str().unwrap_or_default().to_lowercase().contains(&query))
            .cloned()
            .collect();
        let count = hits.len();
        let mut value: Vec<Value> = hits.into_iter().take(top).collect();
        for hit in &mut value {
            hit["@search.score"] = json!(1.0);
            if body["queryType"] == "semantic" {
                hit["@search.rerankerScore"] = json!(2.5);
            }
        }
        Json(json!({ "@odata.count": count, "value": value }))
    }

    async fn lookup(
        State(index): State<Index>,
        Path((_, key)): Path<(String, String)>,
    ) -> std::result::Result<Json<Value>, StatusCode> {
        index.lock().unwrap().get(&key).cloned().map(Json).ok_or(StatusCode::NOT_FOUND)
    }

    /// In-process stand-in for the search service; returns its endpoint.
    pub(crate) async fn fake_search_service() -> String {
        let index: Index = Arc::default();
        let router = Router::new()
            .route("/indexes/:index/docs/index", post(index_docs))
            .route("/indexes/:index/docs/search", post(search_docs))
            .route("/indexes/:index/docs/:key", get(lookup))
            .with_state(index);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    pub(crate) fn search_config(endpoint: String) -> SearchConfig {
        SearchConfig {
            endpoint: Some(endpoint),
            admin_key: Some("admin".to_string()),
            ..SearchConfig::default()
        }
    }

    fn document(id: &str, content: &str) -> SearchDocument {
        SearchDocument {
            id: id.to_string(),
            title: format!("Doc {}", id),
            content: content.to_string(),
            source: "internal".to_string(),
            document_type: "report".to_string(),
            upload_timestamp: "2024-05-01T08:30:00".to_string(),
            blob_name: Some(format!("{}.txt", id)),
        }
    }

    #[test]
    fn test_document_field_names() {
        let json = serde_json::to_value(document("1", "dike")).unwrap();
        assert_eq!(json["documentType"], "report");
        assert_eq!(json["uploadTimestamp"], "2024-05-01T08:30:00");
        assert_eq!(json["blobName"], "1.txt");
    }

    #[tokio::test]
    async fn test_upload_search_and_lookup() {
        let client = SearchClient::new(&search_config(fake_search_service().await)).unwrap();
        client
            .upload_documents(&[
                document("a", "Dike reinforcement plan for the Afsluitdijk"),
                document("b", "Bridge inspection guideline"),
                document("c", "Storm surge barrier and dike maintenance"),
            ])
            .await
            .unwrap();

        let options = SearchOptions {
            top: 1,
            ..SearchOptions::default()
        };
        let results = client.search("dike", &options).await.unwrap();
        assert_eq!(results.total_count, Some(2));
        assert_eq!(results.documents.len(), 1);

        let found = client.get_document("b").await.unwrap().unwrap();
        assert_eq!(found.title, "Doc b");
        assert!(client.get_document("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_service_errors_are_search_errors() {
        let router = Router::new().route(
            "/indexes/:index/docs/search",
            post(|| async {
                (
                    StatusCode::FORBIDDEN,
                    Json(json!({"error": {"code": "Forbidden", "message": "Invalid api-key"}})),
                )
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let client = SearchClient::new(&search_config(format!("http://{}", addr))).unwrap();
        let err = client.search("dike", &SearchOptions::default()).await.unwrap_err();
        assert!(matches!(err, WorkshopError::Search(ref m) if m.contains("Invalid api-key")));
    }
}
