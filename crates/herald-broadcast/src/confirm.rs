//! Confirm/cancel service — the entry point a callback router calls when
//! the admin presses a button on the confirmation message.
//!
//! "Not found" and "not yours" are answers, not errors: rejected presses
//! return the user-facing denial text. Accepted presses edit the
//! confirmation message themselves — before anything is enqueued, so the
//! progress projector never shares its target with another editor.

use std::sync::Arc;

use herald_core::Transport;

use crate::queue::{BroadcastQueue, BroadcastTask};
use crate::reminder::ReminderScheduler;
use crate::staging::StagingStore;

const NOT_FOUND: &str = "🤷 That broadcast is gone — not found or expired. Start over with /broadcast.";
const NOT_YOURS: &str = "🚫 Only the admin who staged this broadcast can confirm or cancel it.";

pub struct ConfirmService {
    staging: Arc<StagingStore>,
    reminders: Arc<ReminderScheduler>,
    queue: BroadcastQueue,
    transport: Arc<dyn Transport>,
}

impl ConfirmService {
    pub fn new(
        staging: Arc<StagingStore>,
        reminders: Arc<ReminderScheduler>,
        queue: BroadcastQueue,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            staging,
            reminders,
            queue,
            transport,
        }
    }

    /// Confirm a staged proposal: untrack reminders, remove it from
    /// staging, and queue the fan-out. `chat_id`/`message_id` locate the
    /// confirmation message, which becomes the live status message.
    ///
    /// Returns `Some(denial)` when the press is rejected — the caller
    /// should deliver it as a fresh message, since the target may already
    /// be showing live progress from an earlier press. `None` means the
    /// status was written to the confirmation message itself.
    pub async fn confirm(
        &self,
        proposal_id: &str,
        user_id: i64,
        chat_id: i64,
        message_id: i64,
    ) -> Option<String> {
        let Some(proposal) = self.staging.get(proposal_id) else {
            return Some(NOT_FOUND.to_string());
        };
        if proposal.requested_by != user_id {
            tracing::warn!("🚫 User {user_id} tried to confirm {proposal_id} staged by {}", proposal.requested_by);
            return Some(NOT_YOURS.to_string());
        }

        // Reminders stop before the proposal disappears; the removal is
        // also the atomic arbiter between concurrent presses of the same
        // button — whoever loses it gets the denial, and the task is
        // enqueued exactly once.
        self.reminders.untrack(proposal_id);
        if !self.staging.remove(proposal_id) {
            return Some(NOT_FOUND.to_string());
        }

        // Strip the keyboard and announce the queueing before enqueue:
        // from here the status message belongs to the progress projector.
        self.update_status(
            chat_id,
            message_id,
            "📨 Broadcast queued. This message will show live progress.",
        )
        .await;

        let task = BroadcastTask::from_proposal(&proposal, chat_id, message_id);
        match self.queue.enqueue(task).await {
            Ok(()) => {
                tracing::info!("✅ Proposal {proposal_id} confirmed by admin {user_id}");
            }
            Err(e) => {
                tracing::error!("💥 Couldn't queue confirmed broadcast {proposal_id}: {e}");
                self.update_status(
                    chat_id,
                    message_id,
                    "💥 The broadcast queue is unavailable; nothing was sent.",
                )
                .await;
            }
        }
        None
    }

    /// Cancel a staged proposal. Same return contract as [`confirm`].
    ///
    /// [`confirm`]: ConfirmService::confirm
    pub async fn cancel(
        &self,
        proposal_id: &str,
        user_id: i64,
        chat_id: i64,
        message_id: i64,
    ) -> Option<String> {
        let Some(proposal) = self.staging.get(proposal_id) else {
            return Some(NOT_FOUND.to_string());
        };
        if proposal.requested_by != user_id {
            return Some(NOT_YOURS.to_string());
        }
        self.reminders.untrack(proposal_id);
        if !self.staging.remove(proposal_id) {
            return Some(NOT_FOUND.to_string());
        }
        self.update_status(chat_id, message_id, "❎ Broadcast cancelled.").await;
        tracing::info!("❎ Proposal {proposal_id} cancelled by admin {user_id}");
        None
    }

    async fn update_status(&self, chat_id: i64, message_id: i64, text: &str) {
        if let Err(e) = self
            .transport
            .edit_message_text(chat_id, message_id, text, None)
            .await
        {
            if !e.is_soft() {
                tracing::warn!("⚠️ Status edit on confirmation message failed: {e}");
            }
        }
    }
}
