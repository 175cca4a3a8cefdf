use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{Result, WorkshopError};

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct Config {
    pub openai: OpenAiConfig,
    pub apim: ApimConfig,
    pub search: SearchConfig,
    pub storage: StorageConfig,
    pub backend: BackendConfig,
    pub collaboration: CollaborationConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OpenAiConfig {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub deployment: Option<String>,
    pub api_version: String,
    pub temperature: f32,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApimConfig {
    pub gateway_url: Option<String>,
    pub subscription_key: Option<String>,
    pub route_prefix: String,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SearchConfig {
    pub endpoint: Option<String>,
    pub admin_key: Option<String>,
    pub index_name: String,
    pub semantic_configuration: String,
    pub api_version: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct StorageConfig {
    pub connection_string: Option<String>,
    pub container_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendConfig {
    pub database_url: String,
    pub listen_addr: String,
    pub max_connections: u32,
    pub seed_demo_data: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CollaborationConfig {
    pub max_iterations: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            deployment: None,
            api_version: "2024-02-15-preview".to_string(),
            temperature: 0.7,
            timeout: Duration::from_secs(120),
        }
    }
}

impl Default for ApimConfig {
    fn default() -> Self {
        Self {
            gateway_url: None,
            subscription_key: None,
            route_prefix: "/sql".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            admin_key: None,
            index_name: "documents-index".to_string(),
            semantic_configuration: "default".to_string(),
            api_version: "2023-11-01".to_string(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            listen_addr: "0.0.0.0:7071".to_string(),
            max_connections: 5,
            seed_demo_data: true,
        }
    }
}

impl Default for CollaborationConfig {
    fn default() -> Self {
        Self { max_iterations: 6 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Environment variables that override the file configuration.
pub const ENV_OVERRIDES: &[&str] = &[
    "AZURE_OPENAI_ENDPOINT",
    "AZURE_OPENAI_API_KEY",
    "AZURE_OPENAI_MODEL_DEPLOYMENT_NAME",
    "APIM_GATEWAY_URL",
    "APIM_SUBSCRIPTION_KEY",
    "SEARCH_SERVICE_ENDPOINT",
    "SEARCH_SERVICE_ADMIN_KEY",
    "SEARCH_INDEX_NAME",
    "RAG_STORAGE_CONNECTION_STRING",
    "RAG_DOCUMENTS_CONTAINER_NAME",
    "SQL_CONNECTION_STRING",
];

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Apply overrides using `lookup` to resolve environment variable names.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| non_empty(lookup(name));

        if let Some(v) = get("AZURE_OPENAI_ENDPOINT") {
            self.openai.endpoint = Some(v);
        }
        if let Some(v) = get("AZURE_OPENAI_API_KEY") {
            self.openai.api_key = Some(v);
        }
        if let Some(v) = get("AZURE_OPENAI_MODEL_DEPLOYMENT_NAME") {
            self.openai.deployment = Some(v);
        }
        if let Some(v) = get("APIM_GATEWAY_URL") {
            self.apim.gateway_url = Some(v);
        }
        if let Some(v) = get("APIM_SUBSCRIPTION_KEY") {
            self.apim.subscription_key = Some(v);
        }
        if let Some(v) = get("SEARCH_SERVICE_ENDPOINT") {
            self.search.endpoint = Some(v);
        }
        if let Some(v) = get("SEARCH_SERVICE_ADMIN_KEY") {
            self.search.admin_key = Some(v);
        }
        if let Some(v) = get("SEARCH_INDEX_NAME") {
            self.search.index_name = v;
        }
        if let Some(v) = get("RAG_STORAGE_CONNECTION_STRING") {
            self.storage.connection_string = Some(v);
        }
        if let Some(v) = get("RAG_DOCUMENTS_CONTAINER_NAME") {
            self.storage.container_name = Some(v);
        }
        if let Some(v) = get("SQL_CONNECTION_STRING") {
            self.backend.database_url = v;
        }
    }
}

/// Resolved credentials for the chat completion service.
#[derive(Debug, Clone)]
pub struct OpenAiCredentials<'a> {
    pub endpoint: &'a str,
    pub api_key: &'a str,
    pub deployment: &'a str,
}

impl OpenAiConfig {
    pub fn credentials(&self) -> Result<OpenAiCredentials<'_>> {
        match (&self.endpoint, &self.api_key, &self.deployment) {
            (Some(endpoint), Some(api_key), Some(deployment)) => Ok(OpenAiCredentials {
                endpoint,
                api_key,
                deployment,
            }),
            _ => Err(WorkshopError::Config(
                "AZURE_OPENAI_ENDPOINT, AZURE_OPENAI_API_KEY, and AZURE_OPENAI_MODEL_DEPLOYMENT_NAME must be set".to_string(),
            )),
        }
    }
}

impl ApimConfig {
    pub fn credentials(&self) -> Result<(&str, &str)> {
        match (&self.gateway_url, &self.subscription_key) {
            (Some(url), Some(key)) => Ok((url, key)),
            _ => Err(WorkshopError::Config(
                "APIM_GATEWAY_URL and APIM_SUBSCRIPTION_KEY environment variables must be set".to_string(),
            )),
        }
    }
}

impl SearchConfig {
    pub fn credentials(&self) -> Result<(&str, &str)> {
        match (&self.endpoint, &self.admin_key) {
            (Some(endpoint), Some(key)) => Ok((endpoint, key)),
            _ => Err(WorkshopError::Config(
                "SEARCH_SERVICE_ENDPOINT and SEARCH_SERVICE_ADMIN_KEY environment variables must be set".to_string(),
            )),
        }
    }
}

impl StorageConfig {
    pub fn credentials(&self) -> Result<(&str, &str)> {
        match (&self.connection_string, &self.container_name) {
            (Some(conn), Some(container)) => Ok((conn, container)),
            _ => Err(WorkshopError::Config(
                "RAG_STORAGE_CONNECTION_STRING and RAG_DOCUMENTS_CONTAINER_NAME environment variables must be set".to_string(),
            )),
        }
    }
}

#[async_trait::async_trait]
pub trait ConfigManager {
    async fn load_config(&self) -> Result<Config>;
    async fn save_config(&self, config: &Config) -> Result<()>;
    fn validate_config(&self, config: &Config) -> Result<()>;
}

pub struct FileConfigManager {
    config_path: PathBuf,
    use_environment: bool,
}

impl FileConfigManager {
    pub fn new(config_path: PathBuf) -> Self {
        Self {
            config_path,
            use_environment: true,
        }
    }

    /// Skip `.env` loading and environment overrides.
    pub fn without_environment(mut self) -> Self {
        self.use_environment = false;
        self
    }

    pub fn config_path(&self) -> &PathBuf {
        &self.config_path
    }
}

#[async_trait::async_trait]
impl ConfigManager for FileConfigManager {
    async fn load_config(&self) -> Result<Config> {
        info!("Loading configuration from {:?}", self.config_path);

        let mut config = if self.config_path.exists() {
            let config_content = fs::read_to_string(&self.config_path)
                .map_err(|e| WorkshopError::Config(format!("Failed to read config file: {}", e)))?;

            toml::from_str::<Config>(&config_content)
                .map_err(|e| WorkshopError::Config(format!("Failed to parse TOML config: {}", e)))?
        } else {
            warn!("Configuration file {:?} not found, using defaults", self.config_path);
            Config::default()
        };

        if self.use_environment {
            match dotenvy::dotenv() {
                Ok(path) => debug!("Loaded environment from {:?}", path),
                Err(e) if e.not_found() => debug!("No .env file found"),
                Err(e) => warn!("Failed to load .env file: {}", e),
            }
            config.apply_env_overrides(|name| std::env::var(name).ok());
        }

        self.validate_config(&config)?;

        info!("Configuration loaded successfully");
        Ok(config)
    }

    fn validate_config(&self, config: &Config) -> Result<()> {
        debug!("Validating configuration");

        if !(0.0..=2.0).contains(&config.openai.temperature) {
            return Err(WorkshopError::Config(format!(
                "temperature must be between 0.0 and 2.0, got {}",
                config.openai.temperature
            )));
        }

        let urls = [
            ("openai.endpoint", config.openai.endpoint.as_deref()),
            ("apim.gateway_url", config.apim.gateway_url.as_deref()),
            ("search.endpoint", config.search.endpoint.as_deref()),
        ];
        for (name, url) in urls {
            if let Some(url) = url {
                if !url.starts_with("http://") && !url.starts_with("https://") {
                    return Err(WorkshopError::Config(format!(
                        "{} must start with http:// or https://",
                        name
                    )));
                }
            }
        }

        if !config.apim.route_prefix.is_empty() && !config.apim.route_prefix.starts_with('/') {
            return Err(WorkshopError::Config(format!(
                "route_prefix '{}' must start with '/'",
                config.apim.route_prefix
            )));
        }

        if config.search.index_name.trim().is_empty() {
            return Err(WorkshopError::Config("search index_name cannot be empty".to_string()));
        }

        if config.collaboration.max_iterations == 0 {
            return Err(WorkshopError::Config("max_iterations must be greater than 0".to_string()));
        }
        if config.collaboration.max_iterations > 50 {
            return Err(WorkshopError::Config("max_iterations cannot exceed 50".to_string()));
        }

        if config.backend.max_connections == 0 {
            return Err(WorkshopError::Config("max_connections must be greater than 0".to_string()));
        }
        if !config.backend.database_url.starts_with("sqlite:") {
            return Err(WorkshopError::Config(format!(
                "Unsupported database url '{}', expected a sqlite: url",
                config.backend.database_url
            )));
        }

        debug!("Configuration validation passed");
        Ok(())
    }

    async fn save_config(&self, config: &Config) -> Result<()> {
        info!("Saving configuration to {:?}", self.config_path);

        let toml_content = toml::to_string_pretty(config)
            .map_err(|e| WorkshopError::Config(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = self.config_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| WorkshopError::Config(format!("Failed to create config directory: {}", e)))?;
            }
        }

        fs::write(&self.config_path, toml_content)
            .map_err(|e| WorkshopError::Config(format!("Failed to write config file: {}", e)))?;

        info!("Configuration saved successfully");
        Ok(())
    }
}
