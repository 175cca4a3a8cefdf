use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::llm::{ChatCompletion, ChatHistory, ChatMessage, ExecutionSettings, ToolCall};
use crate::plugins::PluginRegistry;
use crate::telemetry::Instrumentation;

pub type AgentId = Uuid;

/// Tool-calling rounds before the agent must answer in plain text.
pub const MAX_TOOL_ROUNDS: usize = 5;

/// A participant in a conversation.
#[async_trait]
pub trait ChatAgent: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// Produce this agent's next message for the conversation so far.
    async fn get_response(&self, history: &ChatHistory) -> Result<ChatMessage>;
}

/// An agent driven by a chat completion service, with plugins as tools.
pub struct ChatCompletionAgent {
    pub id: AgentId,
    name: String,
    description: String,
    instructions: String,
    service: Arc<dyn ChatCompletion>,
    plugins: PluginRegistry,
    settings: ExecutionSettings,
    instrumentation: Instrumentation,
}

impl ChatCompletionAgent {
    pub fn new(name: impl Into<String>, instructions: impl Into<String>, service: Arc<dyn ChatCompletion>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: String::new(),
            instructions: instructions.into(),
            service,
            plugins: PluginRegistry::new(),
            settings: ExecutionSettings::default(),
            instrumentation: Instrumentation::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_plugins(mut self, plugins: PluginRegistry) -> Self {
        self.plugins = plugins;
        self
    }

    pub fn with_settings(mut self, settings: ExecutionSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_instrumentation(mut self, instrumentation: Instrumentation) -> Self {
        self.instrumentation = instrumentation;
        self
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    pub fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }

    async fn invoke_tool(&self, call: &ToolCall) -> String {
        let result = self
            .instrumentation
            .track(&self.name, &call.name, self.plugins.invoke(&call.name, &call.arguments))
            .await;
        result.unwrap_or_else(|e| format!("Error invoking {}: {}", call.name, e))
    }

    async fn respond(&self, history: &ChatHistory) -> Result<ChatMessage> {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(ChatMessage::system(self.instructions.as_str()));
        messages.extend(history.iter().cloned());

        let settings = self.settings.with_tools(self.plugins.tool_definitions());
        if !settings.tools.is_empty() {
            for round in 1..=MAX_TOOL_ROUNDS {
                let reply = self.service.complete(&messages, &settings).await?;
                if !reply.has_tool_calls() {
                    return Ok(reply.with_name(self.name.as_str()));
                }

                debug!("{} requested {} tool calls in round {}", self.name, reply.tool_calls.len(), round);
                let calls = reply.tool_calls.clone();
                messages.push(reply.with_name(self.name.as_str()));
                for call in &calls {
                    let output = self.invoke_tool(call).await;
                    messages.push(ChatMessage::tool_result(call.id.as_str(), output));
                }
            }
            warn!("{} reached {} tool rounds, asking for a final answer", self.name, MAX_TOOL_ROUNDS);
        }

        let mut reply = self.service.complete(&messages, &self.settings.with_tools(Vec::new())).await?;
        reply.tool_calls.clear();
        Ok(reply.with_name(self.name.as_str()))
    }
}

#[async_trait]
impl ChatAgent for ChatCompletionAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn get_response(&self, history: &ChatHistory) -> Result<ChatMessage> {
        info!("{} responding to {} messages", self.name, history.len());
        self.instrumentation
            .track(&self.name, "get_response", self.respond(history))
            .await
    }
}
