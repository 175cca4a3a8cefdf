use async_stream::try_stream;
use futures::Stream;
use std::sync::Arc;
use tracing::debug;

use crate::agents::ChatAgent;
use crate::collaboration::strategies::{SelectionStrategy, TerminationStrategy};
use crate::error::{Result, WorkshopError};
use crate::llm::{ChatHistory, ChatMessage};
use crate::telemetry::Instrumentation;

/// Several agents taking turns on one shared history.
pub struct AgentGroupChat {
    agents: Vec<Arc<dyn ChatAgent>>,
    selection: Box<dyn SelectionStrategy>,
    termination: Box<dyn TerminationStrategy>,
    history: ChatHistory,
    instrumentation: Option<Instrumentation>,
    pub is_complete: bool,
}

impl AgentGroupChat {
    pub fn new(
        agents: Vec<Arc<dyn ChatAgent>>,
        selection: Box<dyn SelectionStrategy>,
        termination: Box<dyn TerminationStrategy>,
    ) -> Self {
        Self {
            agents,
            selection,
            termination,
            history: ChatHistory::new(),
            instrumentation: None,
            is_complete: false,
        }
    }

    pub fn with_instrumentation(mut self, instrumentation: Instrumentation) -> Self {
        self.instrumentation = Some(instrumentation);
        self
    }

    pub fn instrumentation(&self) -> Option<&Instrumentation> {
        self.instrumentation.as_ref()
    }

    pub fn history(&self) -> &ChatHistory {
        &self.history
    }

    pub fn add_chat_message(&mut self, message: impl Into<ChatMessage>) {
        self.history.add_message(message.into());
    }

    /// Run turns until the termination strategy stops the chat or the
    /// iteration cap is reached, yielding each reply as it is appended.
    pub fn invoke(&mut self) -> impl Stream<Item = Result<ChatMessage>> + Send + '_ {
        try_stream! {
            if self.is_complete {
                Err::<(), _>(WorkshopError::Workflow("Chat is already complete".to_string()))?;
            }

            let maximum = self.termination.maximum_iterations();
            for turn in 1..=maximum {
                let agent = self.selection.next(&self.agents, &self.history).await?;
                debug!("Turn {}/{}: {}", turn, maximum, agent.name());

                let reply = agent.get_response(&self.history).await?;
                self.history.add_message(reply.clone());
                let done = self.termination.should_terminate(agent.as_ref(), &self.history).await?;
                yield reply;

                if done {
                    self.is_complete = true;
                    break;
                }
            }
        }
    }
}
