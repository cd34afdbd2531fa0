//! Workflow engine — one active context per user, explicit forward/back
//! transitions, idle reaping.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use futures::future::BoxFuture;

use herald_core::error::{HeraldError, Result};

use crate::step::{StepInput, StepOutcome, WorkflowData, WorkflowStep};

/// Fired once when a user passes the last step; receives the user id and
/// the full data map. The callback owns its own replies (it typically
/// sends the confirmation message itself).
pub type CompletionCallback =
    Arc<dyn Fn(i64, WorkflowData) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// A registered workflow: named, ordered steps, one completion callback.
pub struct WorkflowDefinition {
    pub name: String,
    pub steps: Vec<Box<dyn WorkflowStep>>,
    pub on_complete: CompletionCallback,
}

/// Per-user conversational state.
#[derive(Debug, Clone)]
pub struct WorkflowContext {
    pub workflow_name: String,
    pub data: WorkflowData,
    pub current_step: usize,
    pub step_history: Vec<usize>,
    pub last_message_id: Option<i64>,
    pub last_activity: DateTime<Utc>,
}

enum Advanced {
    Reply(String),
    Complete(WorkflowData, Arc<WorkflowDefinition>),
    Nothing,
}

/// Drives every registered workflow; one active context per user.
pub struct WorkflowEngine {
    definitions: HashMap<String, Arc<WorkflowDefinition>>,
    contexts: DashMap<i64, WorkflowContext>,
    idle_timeout: Duration,
}

impl WorkflowEngine {
    pub fn new(idle_timeout: std::time::Duration) -> Self {
        Self {
            definitions: HashMap::new(),
            contexts: DashMap::new(),
            idle_timeout: Duration::from_std(idle_timeout)
                .unwrap_or_else(|_| Duration::minutes(30)),
        }
    }

    /// Register a workflow definition. Called once at wiring time.
    pub fn register(&mut self, definition: WorkflowDefinition) {
        self.definitions
            .insert(definition.name.clone(), Arc::new(definition));
    }

    /// Start `workflow_name` for a user, replacing any context they had.
    /// An unregistered name is a wiring bug and fails fast.
    pub fn start(&self, user_id: i64, workflow_name: &str) -> Result<String> {
        let def = self
            .definitions
            .get(workflow_name)
            .ok_or_else(|| HeraldError::UnknownWorkflow(workflow_name.to_string()))?;
        let context = WorkflowContext {
            workflow_name: workflow_name.to_string(),
            data: WorkflowData::new(),
            current_step: 0,
            step_history: Vec::new(),
            last_message_id: None,
            last_activity: Utc::now(),
        };
        let question = def.steps[0].question(&context.data);
        self.contexts.insert(user_id, context);
        tracing::debug!("▶️ Workflow '{workflow_name}' started for user {user_id}");
        Ok(question)
    }

    /// Feed one input to the user's current step. Returns the reply to
    /// show, or `None` when there is no active context or the step
    /// ignored the input.
    pub async fn advance(&self, user_id: i64, input: StepInput<'_>) -> Option<String> {
        let advanced = {
            let mut entry = self.contexts.get_mut(&user_id)?;
            let context = entry.value_mut();
            context.last_activity = Utc::now();
            // Registered at start; definitions are never unregistered.
            let def = self.definitions.get(&context.workflow_name)?.clone();

            match def.steps[context.current_step].consume(&mut context.data, input) {
                StepOutcome::Stay(reply) => Advanced::Reply(reply),
                StepOutcome::Ignored => Advanced::Nothing,
                StepOutcome::Advance => {
                    context.step_history.push(context.current_step);
                    context.current_step += 1;
                    if context.current_step >= def.steps.len() {
                        Advanced::Complete(std::mem::take(&mut context.data), def)
                    } else {
                        Advanced::Reply(def.steps[context.current_step].question(&context.data))
                    }
                }
            }
        }; // map guard dropped before any await

        match advanced {
            Advanced::Reply(reply) => Some(reply),
            Advanced::Nothing => None,
            Advanced::Complete(data, def) => {
                self.contexts.remove(&user_id);
                tracing::debug!(
                    "🏁 Workflow '{}' completed for user {user_id}",
                    def.name
                );
                match (def.on_complete)(user_id, data).await {
                    Ok(()) => None,
                    Err(e) => {
                        tracing::error!("💥 Workflow '{}' completion failed: {e}", def.name);
                        Some("💥 Something went wrong finishing that — please start over.".into())
                    }
                }
            }
        }
    }

    /// Step back to the previous question. With no history left the
    /// context is destroyed: there is nothing to return to.
    pub fn back(&self, user_id: i64) -> Option<String> {
        let popped = {
            let mut entry = self.contexts.get_mut(&user_id)?;
            let context = entry.value_mut();
            context.last_activity = Utc::now();
            match context.step_history.pop() {
                Some(step) => {
                    context.current_step = step;
                    let def = self.definitions.get(&context.workflow_name)?.clone();
                    Some(def.steps[step].question(&context.data))
                }
                None => None,
            }
        };
        match popped {
            Some(question) => Some(question),
            None => {
                self.contexts.remove(&user_id);
                Some("↩️ Can't go back any further — the process has ended.".into())
            }
        }
    }

    /// Abort the user's workflow, if any.
    pub fn cancel(&self, user_id: i64) -> Option<String> {
        self.contexts
            .remove(&user_id)
            .map(|_| "❎ Cancelled.".to_string())
    }

    pub fn has_active(&self, user_id: i64) -> bool {
        self.contexts.contains_key(&user_id)
    }

    /// Remember which message carried the last question for this user.
    pub fn note_message(&self, user_id: i64, message_id: i64) {
        if let Some(mut entry) = self.contexts.get_mut(&user_id) {
            entry.last_message_id = Some(message_id);
        }
    }

    /// Destroy contexts idle past the timeout. Returns how many died.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let before = self.contexts.len();
        let timeout = self.idle_timeout;
        self.contexts.retain(|_, c| now - c.last_activity <= timeout);
        let reaped = before - self.contexts.len();
        if reaped > 0 {
            tracing::debug!("🧹 Reaped {reaped} idle workflow context(s)");
        }
        reaped
    }

    /// Spawn the periodic idle sweep.
    pub fn spawn_sweeper(self: &Arc<Self>, every: std::time::Duration) -> tokio::task::JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await;
            loop {
                interval.tick().await;
                engine.sweep(Utc::now());
            }
        })
    }
}
