//! Blob storage uploads authenticated from a storage connection string.
//!
//! Two credential forms are understood: an account key, used to sign each
//! request with the SharedKey scheme, and a shared access signature that is
//! appended to the blob URL as-is.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client;
use sha2::Sha256;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::StorageConfig;
use crate::error::{Result, WorkshopError};

type HmacSha256 = Hmac<Sha256>;

pub const STORAGE_API_VERSION: &str = "2021-08-06";
const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

#[derive(Debug, Clone, PartialEq)]
pub enum StorageCredential {
    AccountKey { account_name: String, key: Vec<u8> },
    SharedAccessSignature(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StorageConnection {
    pub blob_endpoint: String,
    pub credential: StorageCredential,
}

impl StorageConnection {
    /// Parse a `Key=Value;...` storage connection string.
    pub fn parse(connection_string: &str) -> Result<Self> {
        let mut parts: BTreeMap<String, String> = BTreeMap::new();
        for pair in connection_string.split(';').filter(|p| !p.trim().is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| WorkshopError::Config(format!("Malformed connection string segment '{}'", pair)))?;
            parts.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
        }

        let account_name = parts.get("accountname").cloned();
        let blob_endpoint = match (parts.get("blobendpoint"), &account_name) {
            (Some(endpoint), _) => endpoint.trim_end_matches('/').to_string(),
            (None, Some(account)) => {
                let protocol = parts.get("defaultendpointsprotocol").map(String::as_str).unwrap_or("https");
                let suffix = parts.get("endpointsuffix").map(String::as_str).unwrap_or("core.windows.net");
                format!("{}://{}.blob.{}", protocol, account, suffix)
            }
            (None, None) => {
                return Err(WorkshopError::Config(
                    "Connection string needs AccountName or BlobEndpoint".to_string(),
                ))
            }
        };

        let credential = if let Some(sas) = parts.get("sharedaccesssignature") {
            StorageCredential::SharedAccessSignature(sas.trim_start_matches('?').to_string())
        } else {
            let account_name = account_name
                .ok_or_else(|| WorkshopError::Config("Connection string is missing AccountName".to_string()))?;
            let encoded = parts
                .get("accountkey")
                .ok_or_else(|| WorkshopError::Config("Connection string is missing AccountKey".to_string()))?;
            let key = STANDARD
                .decode(encoded)
                .map_err(|e| WorkshopError::Config(format!("AccountKey is not valid base64: {}", e)))?;
            StorageCredential::AccountKey { account_name, key }
        };

        Ok(Self {
            blob_endpoint,
            credential,
        })
    }
}

/// The SharedKey string-to-sign for a request without query parameters.
pub fn string_to_sign(
    method: &str,
    content_length: usize,
    content_type: &str,
    ms_headers: &BTreeMap<String, String>,
    account_name: &str,
    path: &str,
) -> String {
    let length = if content_length == 0 {
        String::new()
    } else {
        content_length.to_string()
    };
    let canonical_headers: String = ms_headers
        .iter()
        .map(|(name, value)| format!("{}:{}\n", name.to_ascii_lowercase(), value.trim()))
        .collect();

    // Encoding, language, length, MD5, type, date, four conditionals, range.
    format!(
        "{}\n\n\n{}\n\n{}\n\n\n\n\n\n\n{}/{}{}",
        method, length, content_type, canonical_headers, account_name, path
    )
}

pub fn sign(key: &[u8], string_to_sign: &str) -> Result<String> {
    let mut mac =
        HmacSha256::new_from_slice(key).map_err(|e| WorkshopError::Storage(format!("Invalid account key: {}", e)))?;
    mac.update(string_to_sign.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

fn rfc1123(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// One blob container.
pub struct BlobStore {
    client: Client,
    connection: StorageConnection,
    container: String,
}

impl BlobStore {
    pub fn new(config: &StorageConfig) -> Result<Self> {
        let (connection_string, container) = config.credentials()?;
        Self::from_connection_string(connection_string, container)
    }

    pub fn from_connection_string(connection_string: &str, container: &str) -> Result<Self> {
        let connection = StorageConnection::parse(connection_string)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| WorkshopError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            connection,
            container: container.to_string(),
        })
    }

    pub fn blob_url(&self, blob_name: &str) -> String {
        format!("{}/{}/{}", self.connection.blob_endpoint, self.container, blob_name)
    }

    /// Upload `content` as a block blob, replacing any existing blob.
    pub async fn upload_text(&self, blob_name: &str, content: &str) -> Result<String> {
        let url = self.blob_url(blob_name);
        let mut ms_headers = BTreeMap::new();
        ms_headers.insert("x-ms-blob-type".to_string(), "BlockBlob".to_string());
        ms_headers.insert("x-ms-date".to_string(), rfc1123(Utc::now()));
        ms_headers.insert("x-ms-version".to_string(), STORAGE_API_VERSION.to_string());

        let mut request = self.client.put(match &self.connection.credential {
            StorageCredential::SharedAccessSignature(sas) => format!("{}?{}", url, sas),
            StorageCredential::AccountKey { .. } => url.clone(),
        });

        if let StorageCredential::AccountKey { account_name, key } = &self.connection.credential {
            let path = reqwest::Url::parse(&url)
                .map_err(|e| WorkshopError::Storage(format!("Invalid blob url {}: {}", url, e)))?
                .path()
                .to_string();
            let to_sign = string_to_sign("PUT", content.len(), TEXT_CONTENT_TYPE, &ms_headers, account_name, &path);
            let signature = sign(key, &to_sign)?;
            request = request.header("Authorization", format!("SharedKey {}:{}", account_name, signature));
        }

        for (name, value) in &ms_headers {
            request = request.header(name.as_str(), value.as_str());
        }

        debug!("Uploading blob {} ({} bytes)", url, content.len());
        let response = request
            .header("Content-Type", TEXT_CONTENT_TYPE)
            .body(content.to_string())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WorkshopError::Storage(format!(
                "Blob upload of {} failed with status {}: {}",
                blob_name, status, body
            )));
        }

        info!("Uploaded blob {} to container {}", blob_name, self.container);
        Ok(url)
    }
}
