use thiserror::Error;

pub type Result<T> = std::result::Result<T, WorkshopError>;

#[derive(Error, Debug)]
pub enum WorkshopError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error ({status}): {error}{}", detail_suffix(.details))]
    Api {
        status: u16,
        error: String,
        details: Option<String>,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Search error: {0}")]
    Search(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Chat completion error: {0}")]
    Completion(String),

    #[error("Workflow error: {0}")]
    Workflow(String),

    #[error("Plugin error: {0}")]
    Plugin(String),
}

fn detail_suffix(details: &Option<String>) -> String {
    details
        .as_deref()
        .map(|d| format!(" - {}", d))
        .unwrap_or_default()
}

impl WorkshopError {
    pub fn api(status: u16, error: impl Into<String>) -> Self {
        WorkshopError::Api {
            status,
            error: error.into(),
            details: None,
        }
    }
}

// Conversion implementations for common error types
impl From<std::io::Error> for WorkshopError {
    fn from(err: std::io::Error) -> Self {
        WorkshopError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for WorkshopError {
    fn from(err: serde_json::Error) -> Self {
        WorkshopError::Parse(err.to_string())
    }
}

impl From<toml::de::Error> for WorkshopError {
    fn from(err: toml::de::Error) -> Self {
        WorkshopError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for WorkshopError {
    fn from(err: toml::ser::Error) -> Self {
        WorkshopError::Config(err.to_string())
    }
}

impl From<reqwest::Error> for WorkshopError {
    fn from(err: reqwest::Error) -> Self {
        WorkshopError::Network(err.to_string())
    }
}

impl From<sqlx::Error> for WorkshopError {
    fn from(err: sqlx::Error) -> Self {
        WorkshopError::Database(err.to_string())
    }
}
