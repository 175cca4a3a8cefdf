use std::sync::Arc;
use tracing::{info, warn};

use crate::agents::{ChatAgent, ChatCompletionAgent};
use crate::config::Config;
use crate::error::{Result, WorkshopError};
use crate::llm::{AzureChatCompletion, ChatCompletion, ExecutionSettings};
use crate::plugins::{ApiManagementPlugin, KernelPlugin, PluginRegistry, RagPlugin};
use crate::telemetry::Instrumentation;

pub const INFRASTRUCTURE_ANALYST: &str = "InfrastructureAnalyst";
pub const WATER_MANAGEMENT_EXPERT: &str = "WaterManagementExpert";
pub const STRATEGIC_ADVISOR: &str = "StrategicAdvisor";
pub const KNOWLEDGE_AGENT: &str = "KnowledgeAgent";
pub const RESEARCH_SYNTHESIS_AGENT: &str = "ResearchSynthesisAgent";

pub const AGENT_NAMES: [&str; 5] = [
    INFRASTRUCTURE_ANALYST,
    WATER_MANAGEMENT_EXPERT,
    STRATEGIC_ADVISOR,
    KNOWLEDGE_AGENT,
    RESEARCH_SYNTHESIS_AGENT,
];

const INFRASTRUCTURE_ANALYST_INSTRUCTIONS: &str = "\
You are an infrastructure analyst who specializes in the condition of national road and waterway infrastructure.

Your responsibilities:
- Retrieve asset, inspection and maintenance data through the available API functions
- Identify critical assets and explain why they need attention
- Compare regions and asset types using the statistics you retrieve
- Point out trends in safety ratings and inspection findings
- Use the available functions to access data rather than making assumptions

Always structure your analysis logically and explain your reasoning. Be concise and focus on the most important information.";

const WATER_MANAGEMENT_EXPERT_INSTRUCTIONS: &str = "\
You are a water management expert who specializes in dikes, locks, storm surge barriers and waterways.

Your responsibilities:
- Interpret inspection findings for water infrastructure and flood defences
- Explain the risks that deteriorating water assets pose to surrounding regions
- Relate active maintenance projects to flood protection and navigation
- Use the available functions to get current data rather than making assumptions

Be concise and provide practical insights based on the information you retrieve.";

const STRATEGIC_ADVISOR_INSTRUCTIONS: &str = "\
You are a strategic advisor who turns infrastructure analysis into maintenance priorities and investment recommendations.

Your responsibilities:
- Synthesize the findings of the other specialists in the conversation
- Weigh safety risk, budget and project timelines against each other
- Identify where maintenance should be accelerated, postponed or re-scoped
- Provide a balanced view and focus on practical, actionable recommendations

Your recommendations should be clear, specific and directly relevant to infrastructure management.";

const KNOWLEDGE_AGENT_INSTRUCTIONS: &str = "\
You are a knowledgeable research assistant who specializes in retrieving and synthesizing information from a knowledge base.

Your responsibilities:
- Search the knowledge base for relevant information using specific queries
- Retrieve complete documents when needed for more detailed analysis
- Extract and summarize key points from retrieved documents
- Help upload new information to the knowledge base when appropriate

Always use the knowledge base functions rather than making assumptions about content. When presenting information, cite the source document titles and IDs and explain how the information relates to the query.";

const RESEARCH_SYNTHESIS_INSTRUCTIONS: &str = "\
You are a research synthesis expert who combines documented knowledge with current infrastructure data.

Your responsibilities:
- Search the knowledge base for relevant guidelines, reports and historical information
- Retrieve current asset, inspection and project data from the available API functions
- Highlight where current data confirms or contradicts existing knowledge
- Identify gaps where additional information might be needed
- Suggest specific actions based on the combined analysis

Clearly distinguish between historical knowledge and current data. Your synthesis should be well-structured, evidence-based and actionable.";

/// Builds the workshop agents around one completion service.
pub struct AgentFactory {
    service: Arc<dyn ChatCompletion>,
    settings: ExecutionSettings,
    instrumentation: Instrumentation,
    api_plugin: Option<Arc<dyn KernelPlugin>>,
    rag_plugin: Option<Arc<dyn KernelPlugin>>,
}

impl AgentFactory {
    pub fn new(service: Arc<dyn ChatCompletion>, settings: ExecutionSettings) -> Self {
        Self {
            service,
            settings,
            instrumentation: Instrumentation::new(),
            api_plugin: None,
            rag_plugin: None,
        }
    }

    /// Completion service and plugins from configuration. A plugin whose
    /// credentials are missing is left out with a warning.
    pub fn from_config(config: &Config, instrumentation: Instrumentation) -> Result<Self> {
        let service: Arc<dyn ChatCompletion> = Arc::new(AzureChatCompletion::new(&config.openai)?);
        let mut factory = Self::new(service, ExecutionSettings::with_temperature(config.openai.temperature))
            .with_instrumentation(instrumentation);

        match ApiManagementPlugin::from_config(&config.apim) {
            Ok(plugin) => factory = factory.with_api_plugin(Arc::new(plugin)),
            Err(e) => warn!("API plugin unavailable: {}", e),
        }
        match RagPlugin::from_config(config) {
            Ok(plugin) => factory = factory.with_rag_plugin(Arc::new(plugin)),
            Err(e) => warn!("RAG plugin unavailable: {}", e),
        }
        Ok(factory)
    }

    pub fn with_instrumentation(mut self, instrumentation: Instrumentation) -> Self {
        self.instrumentation = instrumentation;
        self
    }

    pub fn with_api_plugin(mut self, plugin: Arc<dyn KernelPlugin>) -> Self {
        self.api_plugin = Some(plugin);
        self
    }

    pub fn with_rag_plugin(mut self, plugin: Arc<dyn KernelPlugin>) -> Self {
        self.rag_plugin = Some(plugin);
        self
    }

    pub fn instrumentation(&self) -> &Instrumentation {
        &self.instrumentation
    }

    fn build(
        &self,
        name: &str,
        description: &str,
        instructions: &str,
        plugins: &[&Option<Arc<dyn KernelPlugin>>],
    ) -> ChatCompletionAgent {
        let registry = plugins
            .iter()
            .filter_map(|p| Option::as_ref(*p))
            .fold(PluginRegistry::new(), |registry, plugin| registry.with_plugin(plugin.clone()));

        ChatCompletionAgent::new(name, instructions, self.service.clone())
            .with_description(description)
            .with_plugins(registry)
            .with_settings(self.settings.clone())
            .with_instrumentation(self.instrumentation.clone())
    }

    pub fn infrastructure_analyst(&self) -> ChatCompletionAgent {
        self.build(
            INFRASTRUCTURE_ANALYST,
            "Analyzes asset condition, inspections and regional statistics.",
            INFRASTRUCTURE_ANALYST_INSTRUCTIONS,
            &[&self.api_plugin],
        )
    }

    pub fn water_management_expert(&self) -> ChatCompletionAgent {
        self.build(
            WATER_MANAGEMENT_EXPERT,
            "Assesses water infrastructure and flood defence risks.",
            WATER_MANAGEMENT_EXPERT_INSTRUCTIONS,
            &[&self.api_plugin],
        )
    }

    pub fn strategic_advisor(&self) -> ChatCompletionAgent {
        self.build(
            STRATEGIC_ADVISOR,
            "Turns findings into maintenance priorities and recommendations.",
            STRATEGIC_ADVISOR_INSTRUCTIONS,
            &[],
        )
    }

    pub fn knowledge_agent(&self) -> ChatCompletionAgent {
        self.build(
            KNOWLEDGE_AGENT,
            "Searches and maintains the document knowledge base.",
            KNOWLEDGE_AGENT_INSTRUCTIONS,
            &[&self.rag_plugin],
        )
    }

    pub fn research_synthesis_agent(&self) -> ChatCompletionAgent {
        self.build(
            RESEARCH_SYNTHESIS_AGENT,
            "Combines knowledge base documents with current API data.",
            RESEARCH_SYNTHESIS_INSTRUCTIONS,
            &[&self.api_plugin, &self.rag_plugin],
        )
    }

    pub fn by_name(&self, name: &str) -> Result<ChatCompletionAgent> {
        match name {
            INFRASTRUCTURE_ANALYST => Ok(self.infrastructure_analyst()),
            WATER_MANAGEMENT_EXPERT => Ok(self.water_management_expert()),
            STRATEGIC_ADVISOR => Ok(self.strategic_advisor()),
            KNOWLEDGE_AGENT => Ok(self.knowledge_agent()),
            RESEARCH_SYNTHESIS_AGENT => Ok(self.research_synthesis_agent()),
            other => Err(WorkshopError::Workflow(format!(
                "Unknown agent '{}', expected one of: {}",
                other,
                AGENT_NAMES.join(", ")
            ))),
        }
    }

    /// All five agents in their default speaking order.
    pub fn all(&self) -> Vec<Arc<dyn ChatAgent>> {
        let agents: Vec<Arc<dyn ChatAgent>> = vec![
            Arc::new(self.infrastructure_analyst()),
            Arc::new(self.water_management_expert()),
            Arc::new(self.strategic_advisor()),
            Arc::new(self.knowledge_agent()),
            Arc::new(self.research_synthesis_agent()),
        ];
        info!(
            "Created specialized agents: {}",
            agents.iter().map(|a| a.name()).collect::<Vec<_>>().join(", ")
        );
        agents
    }
}
