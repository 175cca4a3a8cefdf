pub mod agent;
pub mod factory;


pub use agent::{AgentId, ChatAgent, ChatCompletionAgent, MAX_TOOL_ROUNDS};
pub use factory::{AgentFactory, AGENT_NAMES};
