use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::agents::ChatAgent;
use crate::error::{Result, WorkshopError};
use crate::llm::ChatHistory;

/// Picks the agent that speaks next.
#[async_trait]
pub trait SelectionStrategy: Send + Sync {
    async fn next(&mut self, agents: &[Arc<dyn ChatAgent>], history: &ChatHistory) -> Result<Arc<dyn ChatAgent>>;
}

/// Decides when a conversation is finished.
#[async_trait]
pub trait TerminationStrategy: Send + Sync {
    /// Hard cap on turns per invocation.
    fn maximum_iterations(&self) -> usize;

    async fn should_terminate(&self, agent: &dyn ChatAgent, history: &ChatHistory) -> Result<bool>;
}

/// Round-robin over the agents in insertion order.
#[derive(Debug, Default)]
pub struct SequentialSelectionStrategy {
    index: usize,
}

impl SequentialSelectionStrategy {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SelectionStrategy for SequentialSelectionStrategy {
    async fn next(&mut self, agents: &[Arc<dyn ChatAgent>], _history: &ChatHistory) -> Result<Arc<dyn ChatAgent>> {
        if agents.is_empty() {
            return Err(WorkshopError::Workflow("No agents to select from".to_string()));
        }
        let agent = agents[self.index % agents.len()].clone();
        self.index += 1;
        Ok(agent)
    }
}

/// Follows a caller-supplied sequence of agent names, cycling if needed.
#[derive(Debug)]
pub struct FixedWorkflowStrategy {
    sequence: Vec<String>,
    counter: usize,
}

impl FixedWorkflowStrategy {
    pub fn new(sequence: Vec<String>) -> Result<Self> {
        if sequence.is_empty() {
            return Err(WorkshopError::Workflow("Workflow sequence cannot be empty".to_string()));
        }
        Ok(Self { sequence, counter: 0 })
    }
}

#[async_trait]
impl SelectionStrategy for FixedWorkflowStrategy {
    async fn next(&mut self, agents: &[Arc<dyn ChatAgent>], _history: &ChatHistory) -> Result<Arc<dyn ChatAgent>> {
        let name = &self.sequence[self.counter % self.sequence.len()];
        let agent = agents
            .iter()
            .find(|a| a.name() == name)
            .cloned()
            .ok_or_else(|| WorkshopError::Workflow(format!("Agent '{}' in workflow not found in provided agents", name)))?;
        self.counter += 1;
        debug!("Selected: {}", agent.name());
        Ok(agent)
    }
}

/// Never stops on content; only the iteration cap ends the run.
#[derive(Debug, Clone)]
pub struct DefaultTerminationStrategy {
    pub maximum_iterations: usize,
}

impl DefaultTerminationStrategy {
    pub fn new(maximum_iterations: usize) -> Self {
        Self { maximum_iterations }
    }
}

#[async_trait]
impl TerminationStrategy for DefaultTerminationStrategy {
    fn maximum_iterations(&self) -> usize {
        self.maximum_iterations
    }

    async fn should_terminate(&self, _agent: &dyn ChatAgent, _history: &ChatHistory) -> Result<bool> {
        Ok(false)
    }
}
