//! Execution queue — bounded FIFO with a single consumer that fans each
//! confirmed broadcast out to its recipients.
//!
//! `enqueue` blocks when the queue is full: deliberate backpressure
//! instead of dropping or growing without bound. The consumer catches
//! everything at the per-task boundary; one broken broadcast never takes
//! the loop down. Closing the producer side drains the queue and exits.

use std::sync::Arc;

use tokio::sync::mpsc;

use herald_core::error::{HeraldError, Result};
use herald_core::spans::FormattingSpan;
use herald_core::types::AudienceFilter;
use herald_core::{AudienceResolver, Transport};

use crate::progress::ProgressProjector;
use crate::staging::{BroadcastProposal, StagingStore};
use crate::template::render_for_recipient;

/// A confirmed broadcast, queued for fan-out. Immutable once built.
#[derive(Debug, Clone)]
pub struct BroadcastTask {
    pub broadcast_id: String,
    pub text: String,
    pub spans: Option<Vec<FormattingSpan>>,
    pub audience: AudienceFilter,
    /// The confirming admin; they staged it, they don't receive it.
    pub excluded_admin_id: i64,
    /// Chat/message the progress projector edits.
    pub target_chat_id: i64,
    pub target_message_id: i64,
}

impl BroadcastTask {
    pub fn from_proposal(
        proposal: &BroadcastProposal,
        target_chat_id: i64,
        target_message_id: i64,
    ) -> Self {
        Self {
            broadcast_id: proposal.id.clone(),
            text: proposal.text.clone(),
            spans: proposal.spans.clone(),
            audience: proposal.audience,
            excluded_admin_id: proposal.requested_by,
            target_chat_id,
            target_message_id,
        }
    }
}

/// Producer handle; clone freely, every confirmation path holds one.
#[derive(Clone)]
pub struct BroadcastQueue {
    tx: mpsc::Sender<BroadcastTask>,
}

impl BroadcastQueue {
    /// Queue a task. Waits while the queue is full; fails only when the
    /// consumer is gone.
    pub async fn enqueue(&self, task: BroadcastTask) -> Result<()> {
        let id = task.broadcast_id.clone();
        self.tx.send(task).await.map_err(|_| HeraldError::QueueClosed)?;
        tracing::info!("📨 Broadcast {id} queued");
        Ok(())
    }
}

/// Create the bounded queue; the receiver goes to exactly one
/// [`BroadcastRunner`].
pub fn broadcast_queue(capacity: usize) -> (BroadcastQueue, mpsc::Receiver<BroadcastTask>) {
    let (tx, rx) = mpsc::channel(capacity);
    (BroadcastQueue { tx }, rx)
}

/// The single consumer: dequeues tasks strictly in order and performs the
/// fan-out, driving the progress projector as it goes.
pub struct BroadcastRunner {
    transport: Arc<dyn Transport>,
    audience: Arc<dyn AudienceResolver>,
    staging: Arc<StagingStore>,
    progress: Arc<ProgressProjector>,
    /// Edit the status message every N delivery attempts.
    update_every: usize,
}

impl BroadcastRunner {
    pub fn new(
        transport: Arc<dyn Transport>,
        audience: Arc<dyn AudienceResolver>,
        staging: Arc<StagingStore>,
        progress: Arc<ProgressProjector>,
        update_every: usize,
    ) -> Self {
        Self {
            transport,
            audience,
            staging,
            progress,
            update_every: update_every.max(1),
        }
    }

    /// Consume until the queue's writer side closes, then drain and exit.
    pub async fn run(self, mut rx: mpsc::Receiver<BroadcastTask>) {
        tracing::info!("📤 Broadcast runner started");
        while let Some(task) = rx.recv().await {
            let id = task.broadcast_id.clone();
            // Track before the first fallible step so a failure anywhere
            // in the pipeline still reaches the status message.
            self.progress.start(&task, 0);
            if let Err(e) = self.process(&task).await {
                tracing::error!("💥 Broadcast {id} failed: {e}");
                self.progress.fail(&id, &e.to_string()).await;
            }
            // Safety net: the confirm path already removed it.
            self.staging.remove(&id);
        }
        tracing::info!("📪 Broadcast queue closed; runner exiting");
    }

    async fn process(&self, task: &BroadcastTask) -> Result<()> {
        let total = self
            .audience
            .count_matching(task.audience, Some(task.excluded_admin_id))
            .await?;
        self.progress.start(task, total);
        self.progress.update_preparing(&task.broadcast_id).await;

        let recipients = self.audience.list_matching(task.audience).await?;
        let mut success = 0usize;
        let mut failed = 0usize;
        let mut attempted = 0usize;

        for recipient in recipients {
            if recipient.id == task.excluded_admin_id {
                continue;
            }
            let (text, spans) =
                render_for_recipient(&task.text, task.spans.as_deref(), &recipient);
            match self
                .transport
                .send_message(recipient.id, &text, spans.as_deref(), None)
                .await
            {
                Ok(_) => success += 1,
                Err(HeraldError::RecipientBlocked) => {
                    failed += 1;
                    tracing::info!("🚫 Recipient {} blocked the bot", recipient.id);
                    if let Err(e) = self.audience.remove(recipient.id).await {
                        tracing::warn!("⚠️ Failed to drop blocked recipient {}: {e}", recipient.id);
                    }
                }
                Err(e) => {
                    failed += 1;
                    tracing::warn!("⚠️ Delivery to {} failed: {e}", recipient.id);
                }
            }
            attempted += 1;
            if attempted % self.update_every == 0 {
                self.progress
                    .update_sending(&task.broadcast_id, success, failed)
                    .await;
            }
        }

        tracing::info!(
            "📬 Broadcast {} done: {success} ok, {failed} failed, {total} total",
            task.broadcast_id
        );
        self.progress
            .complete(&task.broadcast_id, success, failed, total)
            .await;
        Ok(())
    }
}
