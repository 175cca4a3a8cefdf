pub mod api;
pub mod rag;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{Result, WorkshopError};
use crate::llm::ToolDefinition;

pub use api::{ApiClient, ApiManagementPlugin, ApiOperation};
pub use rag::RagPlugin;

/// Separator between plugin and function in advertised tool names.
pub const TOOL_NAME_SEPARATOR: char = '-';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterType {
    String,
    Integer,
    Boolean,
}

impl ParameterType {
    fn schema_name(self) -> &'static str {
        match self {
            ParameterType::String => "string",
            ParameterType::Integer => "integer",
            ParameterType::Boolean => "boolean",
        }
    }
}

#[derive(Debug, Clone)]
pub struct FunctionParameter {
    pub name: &'static str,
    pub description: &'static str,
    pub kind: ParameterType,
    pub required: bool,
    pub default: Option<Value>,
}

impl FunctionParameter {
    pub fn required(name: &'static str, kind: ParameterType, description: &'static str) -> Self {
        Self {
            name,
            description,
            kind,
            required: true,
            default: None,
        }
    }

    pub fn optional(name: &'static str, kind: ParameterType, description: &'static str) -> Self {
        Self {
            name,
            description,
            kind,
            required: false,
            default: None,
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }
}

/// A function a plugin exposes to agents.
#[derive(Debug, Clone)]
pub struct FunctionDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Vec<FunctionParameter>,
}

impl FunctionDefinition {
    pub fn new(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            description,
            parameters: Vec::new(),
        }
    }

    pub fn param(mut self, parameter: FunctionParameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// JSON schema of the arguments object.
    pub fn schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for p in &self.parameters {
            let mut property = json!({
                "type": p.kind.schema_name(),
                "description": p.description,
            });
            if let Some(default) = &p.default {
                property["default"] = default.clone();
            }
            properties.insert(p.name.to_string(), property);
            if p.required {
                required.push(Value::String(p.name.to_string()));
            }
        }
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

/// A named group of functions callable by agents.
#[async_trait]
pub trait KernelPlugin: Send + Sync {
    fn name(&self) -> &str;
    fn functions(&self) -> Vec<FunctionDefinition>;
    async fn invoke(&self, function: &str, arguments: &Value) -> Result<String>;
}

pub fn tool_name(plugin: &str, function: &str) -> String {
    format!("{}{}{}", plugin, TOOL_NAME_SEPARATOR, function)
}

/// Plugins bound to one agent, addressed by tool name.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    plugins: Vec<Arc<dyn KernelPlugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_plugin(&mut self, plugin: Arc<dyn KernelPlugin>) {
        self.plugins.push(plugin);
    }

    pub fn with_plugin(mut self, plugin: Arc<dyn KernelPlugin>) -> Self {
        self.add_plugin(plugin);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn plugin_names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.plugins
            .iter()
            .flat_map(|plugin| {
                plugin.functions().into_iter().map(move |f| ToolDefinition {
                    name: tool_name(plugin.name(), f.name),
                    description: f.description.to_string(),
                    parameters: f.schema(),
                })
            })
            .collect()
    }

    /// Split a tool name into its plugin and function parts.
    pub fn resolve<'a>(&self, tool: &'a str) -> Result<(Arc<dyn KernelPlugin>, &'a str)> {
        let (plugin_name, function) = tool
            .split_once(TOOL_NAME_SEPARATOR)
            .ok_or_else(|| WorkshopError::Plugin(format!("Malformed tool name '{}'", tool)))?;

        let plugin = self
            .plugins
            .iter()
            .find(|p| p.name() == plugin_name)
            .cloned()
            .ok_or_else(|| WorkshopError::Plugin(format!("Unknown plugin '{}'", plugin_name)))?;

        if !plugin.functions().iter().any(|f| f.name == function) {
            return Err(WorkshopError::Plugin(format!(
                "Plugin '{}' has no function '{}'",
                plugin_name, function
            )));
        }
        Ok((plugin, function))
    }

    /// Invoke a tool with JSON-encoded arguments.
    pub async fn invoke(&self, tool: &str, arguments: &str) -> Result<String> {
        let (plugin, function) = self.resolve(tool)?;
        let arguments: Value = if arguments.trim().is_empty() {
            json!({})
        } else {
            serde_json::from_str(arguments)
                .map_err(|e| WorkshopError::Plugin(format!("Invalid arguments for {}: {}", tool, e)))?
        };
        debug!("Invoking {} with {}", tool, arguments);
        plugin.invoke(function, &arguments).await
    }
}

// Argument helpers. Models sometimes send numbers and booleans as strings.

pub fn string_arg(arguments: &Value, name: &str) -> Option<String> {
    match arguments.get(name)? {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

pub fn required_string_arg(arguments: &Value, name: &str) -> Result<String> {
    string_arg(arguments, name)
        .ok_or_else(|| WorkshopError::Plugin(format!("Missing required argument '{}'", name)))
}

fn integral(value: f64) -> Option<i64> {
    (value.is_finite() && value.fract() == 0.0 && value.abs() < i64::MAX as f64).then(|| value as i64)
}

/// Integer argument; integral floats such as `2.0` are accepted.
pub fn int_arg(arguments: &Value, name: &str, default: i64) -> i64 {
    let value = match arguments.get(name) {
        None | Some(Value::Null) => return default,
        Some(value) => value,
    };
    let parsed = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(integral)),
        Value::String(s) => {
            let s = s.trim();
            s.parse().ok().or_else(|| s.parse::<f64>().ok().and_then(integral))
        }
        _ => None,
    };
    parsed.unwrap_or_else(|| {
        warn!("Ignoring non-integer value {} for {}", value, name);
        default
    })
}

pub fn bool_arg(arguments: &Value, name: &str, default: bool) -> bool {
    match arguments.get(name) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => true,
            "false" | "no" | "0" => false,
            _ => default,
        },
        _ => default,
    }
}
