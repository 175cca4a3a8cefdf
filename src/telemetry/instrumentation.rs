use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument, Span};
use uuid::Uuid;

use crate::error::Result;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ActionMetrics {
    pub calls: u64,
    pub errors: u64,
    #[serde(with = "humantime_serde")]
    pub total_duration: Duration,
    pub last_call: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActionRecord {
    pub agent: String,
    pub function: String,
    pub metrics: ActionMetrics,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstrumentationSnapshot {
    pub actions: Vec<ActionRecord>,
    pub active_sessions: Vec<String>,
}

type ActionKey = (String, String);

/// Spans and counters for agent actions, shared by every agent of a run.
#[derive(Clone, Default)]
pub struct Instrumentation {
    metrics: Arc<RwLock<HashMap<ActionKey, ActionMetrics>>>,
    sessions: Arc<Mutex<HashSet<String>>>,
}

impl Instrumentation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `action` inside an `agent_action` span and record its outcome.
    pub async fn track<T, F>(&self, agent: &str, function: &str, action: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let span = info_span!("agent_action", agent.name = %agent, function.name = %function);
        let started = Instant::now();
        let result = action.instrument(span.clone()).await;
        let elapsed = started.elapsed();

        let mut metrics = self.metrics.write().await;
        let entry = metrics.entry((agent.to_string(), function.to_string())).or_default();
        entry.calls += 1;
        entry.total_duration += elapsed;
        entry.last_call = Some(Utc::now());

        span.in_scope(|| match &result {
            Ok(_) => debug!("{}.{} completed in {:?}", agent, function, elapsed),
            Err(e) => {
                entry.errors += 1;
                warn!("{}.{} failed after {:?}: {}", agent, function, elapsed, e);
            }
        });

        result
    }

    pub async fn metrics_for(&self, agent: &str, function: &str) -> Option<ActionMetrics> {
        self.metrics
            .read()
            .await
            .get(&(agent.to_string(), function.to_string()))
            .cloned()
    }

    /// Register a session that stays active until the guard is dropped.
    pub fn session(&self, agent_name: &str, session_id: Option<String>) -> SessionGuard {
        let id = session_id.unwrap_or_else(|| {
            format!(
                "{}_{}",
                Utc::now().format("%Y%m%d_%H%M%S"),
                &Uuid::new_v4().simple().to_string()[..8]
            )
        });
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(id.clone());

        let span = info_span!("agent_session", agent.name = %agent_name, session.id = %id);
        span.in_scope(|| info!("Session {} started", id));

        SessionGuard {
            id,
            sessions: self.sessions.clone(),
            span,
            started: Instant::now(),
        }
    }

    pub fn active_sessions(&self) -> Vec<String> {
        let mut sessions: Vec<String> = self
            .sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .cloned()
            .collect();
        sessions.sort();
        sessions
    }

    pub async fn snapshot(&self) -> InstrumentationSnapshot {
        let mut actions: Vec<ActionRecord> = self
            .metrics
            .read()
            .await
            .iter()
            .map(|((agent, function), metrics)| ActionRecord {
                agent: agent.clone(),
                function: function.clone(),
                metrics: metrics.clone(),
            })
            .collect();
        actions.sort_by(|a, b| (&a.agent, &a.function).cmp(&(&b.agent, &b.function)));

        InstrumentationSnapshot {
            actions,
            active_sessions: self.active_sessions(),
        }
    }
}

pub struct SessionGuard {
    id: String,
    sessions: Arc<Mutex<HashSet<String>>>,
    span: Span,
    started: Instant,
}

impl SessionGuard {
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&self.id);
        let elapsed = self.started.elapsed();
        self.span
            .in_scope(|| info!("Session {} ended after {:?}", self.id, elapsed));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WorkshopError;

    #[tokio::test]
    async fn test_track_records_calls_and_errors() {
        let instrumentation = Instrumentation::new();

        let value = instrumentation
            .track("InfrastructureAnalyst", "get_response", async { Ok::<_, WorkshopError>(42) })
            .await
            .unwrap();
        assert_eq!(value, 42);

        let failed: Result<()> = instrumentation
            .track("InfrastructureAnalyst", "get_response", async {
                Err(WorkshopError::Completion("timeout".to_string()))
            })
            .await;
        assert!(failed.is_err());

        let metrics = instrumentation
            .metrics_for("InfrastructureAnalyst", "get_response")
            .await
            .unwrap();
        assert_eq!(metrics.calls, 2);
        assert_eq!(metrics.errors, 1);
        assert!(metrics.last_call.is_some());
        assert!(instrumentation.metrics_for("StrategicAdvisor", "get_response").await.is_none());
    }

    #[tokio::test]
    async fn test_session_guard_removes_on_drop() {
        let instrumentation = Instrumentation::new();
        {
            let guard = instrumentation.session("GroupChat", Some("session-1".to_string()));
            assert_eq!(guard.id(), "session-1");
            let _other = instrumentation.session("GroupChat", None);
            assert_eq!(instrumentation.active_sessions().len(), 2);
        }
        assert!(instrumentation.active_sessions().is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_serializes() {
        let instrumentation = Instrumentation::new();
        instrumentation
            .track("KnowledgeAgent", "RAG-search_knowledge_base", async { Ok::<_, WorkshopError>(()) })
            .await
            .unwrap();
        let _session = instrumentation.session("KnowledgeAgent", Some("s".to_string()));

        let json = serde_json::to_value(instrumentation.snapshot().await).unwrap();
        assert_eq!(json["actions"][0]["agent"], "KnowledgeAgent");
        assert_eq!(json["actions"][0]["metrics"]["calls"], 1);
        assert_eq!(json["active_sessions"][0], "s");
    }
}
