//! Progress projector — turns fan-out progress into edits of one status
//! message.
//!
//! The target message is the confirmation message the admin pressed; every
//! update rewrites it in place. "Not modified" answers are expected (two
//! updates can compose the same text) and swallowed; "target not found"
//! means someone deleted the status message, so the state is dropped and
//! the broadcast runs on silently.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use herald_core::Transport;

use crate::queue::BroadcastTask;

/// Live bookkeeping for one running broadcast.
#[derive(Debug, Clone)]
pub struct ProgressState {
    pub broadcast_id: String,
    pub target_chat_id: i64,
    pub target_message_id: i64,
    pub total_recipients: usize,
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Maps broadcast id → live status-message state.
pub struct ProgressProjector {
    states: DashMap<String, ProgressState>,
    transport: Arc<dyn Transport>,
    ttl: Duration,
}

impl ProgressProjector {
    pub fn new(transport: Arc<dyn Transport>, ttl: std::time::Duration) -> Self {
        Self {
            states: DashMap::new(),
            transport,
            ttl: Duration::from_std(ttl).unwrap_or_else(|_| Duration::hours(1)),
        }
    }

    /// Begin tracking a broadcast against its status message.
    pub fn start(&self, task: &BroadcastTask, total_recipients: usize) {
        let now = Utc::now();
        self.states.insert(
            task.broadcast_id.clone(),
            ProgressState {
                broadcast_id: task.broadcast_id.clone(),
                target_chat_id: task.target_chat_id,
                target_message_id: task.target_message_id,
                total_recipients,
                started_at: now,
                expires_at: now + self.ttl,
            },
        );
    }

    pub async fn update_preparing(&self, broadcast_id: &str) {
        let total = match self.states.get(broadcast_id) {
            Some(s) => s.total_recipients,
            None => return,
        };
        self.edit(broadcast_id, &format!("⏳ Preparing broadcast to {total} recipients…"))
            .await;
    }

    pub async fn update_sending(&self, broadcast_id: &str, success: usize, failed: usize) {
        let total = match self.states.get(broadcast_id) {
            Some(s) => s.total_recipients,
            None => return,
        };
        self.edit(
            broadcast_id,
            &format!("📤 Sending… {}/{total} (failed: {failed})", success + failed),
        )
        .await;
    }

    /// Final success summary; drops the state.
    pub async fn complete(&self, broadcast_id: &str, success: usize, failed: usize, total: usize) {
        self.edit(
            broadcast_id,
            &format!("✅ Broadcast finished: {success} delivered, {failed} failed, {total} total."),
        )
        .await;
        self.states.remove(broadcast_id);
    }

    /// Final failure notice; drops the state.
    pub async fn fail(&self, broadcast_id: &str, error: &str) {
        self.edit(broadcast_id, &format!("💥 Broadcast failed: {error}"))
            .await;
        self.states.remove(broadcast_id);
    }

    async fn edit(&self, broadcast_id: &str, text: &str) {
        // Copy the target out so no map guard is held across the await.
        let (chat_id, message_id) = match self.states.get(broadcast_id) {
            Some(s) => (s.target_chat_id, s.target_message_id),
            None => return,
        };
        match self
            .transport
            .edit_message_text(chat_id, message_id, text, None)
            .await
        {
            Ok(()) => {}
            Err(herald_core::HeraldError::NotModified) => {}
            Err(herald_core::HeraldError::TargetNotFound) => {
                tracing::warn!("🪦 Status message for broadcast {broadcast_id} is gone; dropping progress state");
                self.states.remove(broadcast_id);
            }
            Err(e) => {
                tracing::warn!("⚠️ Progress edit for broadcast {broadcast_id} failed: {e}");
            }
        }
    }

    pub fn is_tracking(&self, broadcast_id: &str) -> bool {
        self.states.contains_key(broadcast_id)
    }

    /// Drop state whose bookkeeping TTL elapsed (the task never reached a
    /// terminal call). Returns how many were evicted.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let before = self.states.len();
        self.states.retain(|_, s| now <= s.expires_at);
        let evicted = before - self.states.len();
        if evicted > 0 {
            tracing::debug!("🧹 Progress sweep evicted {evicted} stale state(s)");
        }
        evicted
    }

    /// Spawn the periodic sweep loop.
    pub fn spawn_sweeper(self: &Arc<Self>, every: std::time::Duration) -> tokio::task::JoinHandle<()> {
        let projector = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await;
            loop {
                interval.tick().await;
                projector.sweep(Utc::now());
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{EditMode, MockTransport};
    use herald_core::types::AudienceFilter;

    fn task(id: &str) -> BroadcastTask {
        BroadcastTask {
            broadcast_id: id.into(),
            text: "hi".into(),
            spans: None,
            audience: AudienceFilter::EVERYONE,
            excluded_admin_id: 99,
            target_chat_id: 7,
            target_message_id: 70,
        }
    }

    fn projector(transport: Arc<MockTransport>) -> ProgressProjector {
        ProgressProjector::new(transport, std::time::Duration::from_secs(3600))
    }

    #[tokio::test]
    async fn test_status_edit_sequence() {
        let transport = Arc::new(MockTransport::new());
        let projector = projector(transport.clone());
        projector.start(&task("b1"), 3);

        projector.update_preparing("b1").await;
        projector.update_sending("b1", 1, 0).await;
        projector.complete("b1", 2, 1, 3).await;

        let edits = transport.edits.lock().unwrap().clone();
        assert_eq!(edits.len(), 3);
        assert!(edits[0].text.contains("Preparing"));
        assert!(edits[1].text.contains("1/3"));
        assert!(edits[2].text.contains("2 delivered, 1 failed, 3 total"));
        assert!(edits.iter().all(|e| e.chat_id == 7 && e.message_id == 70));
        assert!(!projector.is_tracking("b1"));
    }

    #[tokio::test]
    async fn test_not_modified_is_swallowed() {
        let transport = Arc::new(MockTransport::new());
        let projector = projector(transport.clone());
        projector.start(&task("b1"), 1);

        transport.set_edit_mode(EditMode::NotModified);
        projector.update_preparing("b1").await;
        // Still tracking; nothing blew up
        assert!(projector.is_tracking("b1"));
    }

    #[tokio::test]
    async fn test_target_gone_drops_state() {
        let transport = Arc::new(MockTransport::new());
        let projector = projector(transport.clone());
        projector.start(&task("b1"), 1);

        transport.set_edit_mode(EditMode::NotFound);
        projector.update_preparing("b1").await;
        assert!(!projector.is_tracking("b1"));

        // Further updates are no-ops
        transport.set_edit_mode(EditMode::Ok);
        projector.update_sending("b1", 1, 0).await;
        assert_eq!(transport.edit_count(), 0);
    }

    #[tokio::test]
    async fn test_fail_reports_error_text() {
        let transport = Arc::new(MockTransport::new());
        let projector = projector(transport.clone());
        projector.start(&task("b1"), 1);

        projector.fail("b1", "audience store unreachable").await;
        assert!(transport
            .last_edit()
            .unwrap()
            .text
            .contains("audience store unreachable"));
        assert!(!projector.is_tracking("b1"));
    }

    #[tokio::test]
    async fn test_sweep_ttl() {
        let transport = Arc::new(MockTransport::new());
        let projector = projector(transport.clone());
        projector.start(&task("b1"), 1);

        assert_eq!(projector.sweep(Utc::now()), 0);
        assert_eq!(projector.sweep(Utc::now() + Duration::hours(2)), 1);
        assert!(!projector.is_tracking("b1"));
    }
}
