pub mod group_chat;
pub mod strategies;

#[cfg(test)]
mod tests;

use futures::{pin_mut, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info};

use crate::agents::ChatAgent;
use crate::error::{Result, WorkshopError};
use crate::llm::{ChatHistory, ChatMessage};

pub use group_chat::AgentGroupChat;
pub use strategies::{
    DefaultTerminationStrategy, FixedWorkflowStrategy, SelectionStrategy, SequentialSelectionStrategy,
    TerminationStrategy,
};

pub const DEFAULT_MAX_ITERATIONS: usize = 6;

/// Round-robin chat capped at `max_iterations` turns.
pub fn create_sequential_group(agents: Vec<Arc<dyn ChatAgent>>, max_iterations: usize) -> AgentGroupChat {
    AgentGroupChat::new(
        agents,
        Box::new(SequentialSelectionStrategy::new()),
        Box::new(DefaultTerminationStrategy::new(max_iterations)),
    )
}

/// Chat following `workflow` by agent name. The cap defaults to the
/// length of the workflow.
pub fn create_fixed_workflow_chat<S: AsRef<str>>(
    agents: Vec<Arc<dyn ChatAgent>>,
    workflow: &[S],
    max_iterations: Option<usize>,
) -> Result<AgentGroupChat> {
    let known: HashSet<&str> = agents.iter().map(|a| a.name()).collect();
    if let Some(missing) = workflow.iter().map(AsRef::as_ref).find(|name| !known.contains(name)) {
        return Err(WorkshopError::Workflow(format!(
            "Agent '{}' in workflow not found in provided agents",
            missing
        )));
    }

    let sequence: Vec<String> = workflow.iter().map(|s| s.as_ref().to_string()).collect();
    let maximum = max_iterations.unwrap_or(sequence.len());
    let strategy = FixedWorkflowStrategy::new(sequence)?;

    Ok(AgentGroupChat::new(
        agents,
        Box::new(strategy),
        Box::new(DefaultTerminationStrategy::new(maximum)),
    ))
}

/// Post `user_message`, run the chat to completion and return the history.
/// Invocation errors are logged and end the run early.
pub async fn run_group_chat(chat: &mut AgentGroupChat, user_message: &str) -> ChatHistory {
    let _session = chat.instrumentation().map(|i| i.session("AgentGroupChat", None));

    chat.add_chat_message(ChatMessage::user(user_message));
    info!("User: {}", user_message);
    info!("=== Beginning Agent Collaboration ===");

    let mut current_agent: Option<String> = None;
    let mut failed = false;
    {
        let replies = chat.invoke();
        pin_mut!(replies);
        while let Some(reply) = replies.next().await {
            match reply {
                Ok(message) => {
                    let Some(name) = message.name.as_deref() else {
                        continue;
                    };
                    if current_agent.as_deref() != Some(name) {
                        current_agent = Some(name.to_string());
                        info!("## {}:\n{}", name, message.content);
                    } else {
                        info!("{}", message.content);
                    }
                }
                Err(e) => {
                    error!("Error during chat invocation: {}", e);
                    failed = true;
                    break;
                }
            }
        }
    }
    if !failed {
        info!("=== Agent Collaboration Complete ===");
    }

    chat.is_complete = false;
    chat.history().clone()
}

/// Ask one agent a single question on a fresh history.
pub async fn test_agent(agent: &dyn ChatAgent, user_message: &str) -> Result<ChatMessage> {
    info!("=== Testing {} ===", agent.name());
    info!("User: {}", user_message);

    let mut history = ChatHistory::new();
    history.add_user_message(user_message);
    let response = agent.get_response(&history).await?;

    info!("{}: {}", agent.name(), response.content);
    info!("=== Test Complete ===");
    Ok(response)
}
