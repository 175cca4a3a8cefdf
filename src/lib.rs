pub mod agents;
pub mod backend;
pub mod collaboration;
pub mod config;
pub mod error;
pub mod llm;
pub mod models;
pub mod plugins;
pub mod search;
pub mod telemetry;

pub use agents::{AgentFactory, ChatAgent, ChatCompletionAgent};
pub use collaboration::AgentGroupChat;
pub use config::Config;
pub use error::{Result, WorkshopError};
