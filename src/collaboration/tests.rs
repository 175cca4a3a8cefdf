use async_trait::async_trait;
use futures::StreamExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::agents::ChatAgent;
use crate::collaboration::*;
use crate::error::{Result, WorkshopError};
use crate::llm::{ChatHistory, ChatMessage, Role};
use crate::telemetry::Instrumentation;

/// Replies with its name and the history length it saw.
struct ScriptedAgent {
    name: String,
    fail_on_call: Option<usize>,
    calls: AtomicUsize,
}

impl ScriptedAgent {
    fn new(name: &str) -> Arc<dyn ChatAgent> {
        Arc::new(Self {
            name: name.to_string(),
            fail_on_call: None,
            calls: AtomicUsize::new(0),
        })
    }

    fn failing(name: &str, call: usize) -> Arc<dyn ChatAgent> {
        Arc::new(Self {
            name: name.to_string(),
            fail_on_call: Some(call),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ChatAgent for ScriptedAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_response(&self, history: &ChatHistory) -> Result<ChatMessage> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on_call == Some(call) {
            return Err(WorkshopError::Completion(format!("{} is unavailable", self.name)));
        }
        Ok(ChatMessage::assistant(format!("{} saw {} messages", self.name, history.len())).with_name(self.name.as_str()))
    }
}

fn agents(names: &[&str]) -> Vec<Arc<dyn ChatAgent>> {
    names.iter().map(|n| ScriptedAgent::new(n)).collect()
}

fn speakers(history: &ChatHistory) -> Vec<String> {
    history
        .iter()
        .filter(|m| m.role == Role::Assistant)
        .filter_map(|m| m.name.clone())
        .collect()
}

#[tokio::test]
async fn test_round_robin_turn_order() {
    let names = ["A", "B", "C"];
    for (agent_count, cap) in [(1, 1), (2, 5), (3, 3), (3, 7), (3, 6)] {
        let mut chat = create_sequential_group(agents(&names[..agent_count]), cap);
        let history = run_group_chat(&mut chat, "Status of the dikes?").await;

        let turns = speakers(&history);
        assert_eq!(turns.len(), cap);
        for (k, speaker) in turns.iter().enumerate() {
            assert_eq!(speaker, names[k % agent_count]);
        }
    }
}

#[tokio::test]
async fn test_agents_see_full_history() {
    let mut chat = create_sequential_group(agents(&["A", "B"]), 4);
    let history = run_group_chat(&mut chat, "hello").await;

    let contents: Vec<&str> = history.iter().skip(1).map(|m| m.content.as_str()).collect();
    assert_eq!(
        contents,
        vec!["A saw 1 messages", "B saw 2 messages", "A saw 3 messages", "B saw 4 messages"]
    );
    assert_eq!(history.messages()[0].role, Role::User);
}

#[tokio::test]
async fn test_fixed_workflow_follows_sequence() {
    let workflow = ["C", "A", "C", "B"];
    let mut chat = create_fixed_workflow_chat(agents(&["A", "B", "C"]), &workflow, None).unwrap();
    let history = run_group_chat(&mut chat, "Plan the maintenance").await;

    assert_eq!(speakers(&history), workflow);
}

#[tokio::test]
async fn test_fixed_workflow_cycles_past_sequence() {
    let mut chat = create_fixed_workflow_chat(agents(&["A", "B"]), &["B", "A"], Some(5)).unwrap();
    let history = run_group_chat(&mut chat, "go").await;
    assert_eq!(speakers(&history), vec!["B", "A", "B", "A", "B"]);
}

#[test]
fn test_fixed_workflow_rejects_unknown_agent() {
    let err = create_fixed_workflow_chat(agents(&["A", "B"]), &["A", "Z"], None)
        .err()
        .unwrap();
    assert!(matches!(err, WorkshopError::Workflow(ref m) if m.contains("'Z'")));

    let empty: [&str; 0] = [];
    assert!(create_fixed_workflow_chat(agents(&["A"]), &empty, None).is_err());
}

#[tokio::test]
async fn test_invoke_streams_each_reply() {
    let mut chat = create_sequential_group(agents(&["A", "B"]), 3);
    chat.add_chat_message("start");

    let replies: Vec<ChatMessage> = chat.invoke().map(|r| r.unwrap()).collect().await;
    assert_eq!(replies.len(), 3);
    assert_eq!(chat.history().len(), 4);
    assert!(!chat.is_complete);
}

#[tokio::test]
async fn test_error_ends_run_and_keeps_history() {
    let agents = vec![ScriptedAgent::new("A"), ScriptedAgent::failing("B", 1)];
    let mut chat = create_sequential_group(agents, 6);
    let history = run_group_chat(&mut chat, "question").await;

    assert_eq!(history.len(), 2);
    assert_eq!(speakers(&history), vec!["A"]);
    assert!(!chat.is_complete);

    // The chat can be continued after a failed run.
    let history = run_group_chat(&mut chat, "again").await;
    assert!(history.len() > 3);
}

#[tokio::test]
async fn test_session_is_active_only_during_run() {
    let instrumentation = Instrumentation::new();
    let mut chat = create_sequential_group(agents(&["A"]), 1).with_instrumentation(instrumentation.clone());

    run_group_chat(&mut chat, "hi").await;
    assert!(instrumentation.active_sessions().is_empty());
}

#[tokio::test]
async fn test_single_agent_uses_fresh_history() {
    let agent = ScriptedAgent::new("KnowledgeAgent");
    let response = test_agent(agent.as_ref(), "Find the dike report").await.unwrap();
    assert_eq!(response.content, "KnowledgeAgent saw 1 messages");
    assert_eq!(response.name.as_deref(), Some("KnowledgeAgent"));
}
