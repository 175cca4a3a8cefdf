use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::config::OpenAiConfig;
use crate::error::{Result, WorkshopError};
use crate::llm::{ChatCompletion, ChatMessage, ExecutionSettings, Role, ToolCall, ToolDefinition};

/// Azure OpenAI chat completions over REST.
pub struct AzureChatCompletion {
    client: Client,
    url: String,
    api_key: String,
    deployment: String,
}

impl AzureChatCompletion {
    pub fn new(config: &OpenAiConfig) -> Result<Self> {
        let credentials = config.credentials()?;
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| WorkshopError::Network(format!("Failed to create HTTP client: {}", e)))?;

        let url = format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            credentials.endpoint.trim_end_matches('/'),
            credentials.deployment,
            config.api_version
        );

        Ok(Self {
            client,
            url,
            api_key: credentials.api_key.to_string(),
            deployment: credentials.deployment.to_string(),
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_type")]
    kind: String,
    function: WireFunction,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: Role,
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: &'a ToolDefinition,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    messages: Vec<WireMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

/// The service only accepts `[a-zA-Z0-9_-]{1,64}` as participant names.
fn participant_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .take(64)
        .collect()
}

fn to_wire(message: &ChatMessage) -> WireMessage {
    let name = match message.role {
        Role::Tool => None,
        _ => message.name.as_deref().map(participant_name),
    };
    let tool_calls: Vec<WireToolCall> = message
        .tool_calls
        .iter()
        .map(|call| WireToolCall {
            id: call.id.clone(),
            kind: function_type(),
            function: WireFunction {
                name: call.name.clone(),
                arguments: call.arguments.clone(),
            },
        })
        .collect();
    let content = if message.content.is_empty() && !tool_calls.is_empty() {
        None
    } else {
        Some(message.content.clone())
    };

    WireMessage {
        role: message.role,
        content,
        name,
        tool_calls,
        tool_call_id: message.tool_call_id.clone(),
    }
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

#[async_trait]
impl ChatCompletion for AzureChatCompletion {
    async fn complete(&self, messages: &[ChatMessage], settings: &ExecutionSettings) -> Result<ChatMessage> {
        let tools: Vec<WireTool<'_>> = settings
            .tools
            .iter()
            .map(|function| WireTool { kind: "function", function })
            .collect();
        let request = CompletionRequest {
            messages: messages.iter().map(to_wire).collect(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            tool_choice: if tools.is_empty() { None } else { Some("auto") },
            tools,
        };

        debug!(
            "Requesting chat completion from {} with {} messages",
            self.deployment,
            request.messages.len()
        );

        let response = self
            .client
            .post(&self.url)
            .header("api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(WorkshopError::Completion(format!(
                "Chat completion failed with status {}: {}",
                status,
                error_message(&body)
            )));
        }

        let parsed: CompletionResponse = serde_json::from_str(&body)?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| WorkshopError::Completion("Chat completion returned no choices".to_string()))?;

        debug!("Chat completion finished: {:?}", choice.finish_reason);

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|call| ToolCall {
                id: call.id,
                name: call.function.name,
                arguments: call.function.arguments,
            })
            .collect();

        Ok(ChatMessage::assistant(choice.message.content.unwrap_or_default()).with_tool_calls(tool_calls))
    }
}
