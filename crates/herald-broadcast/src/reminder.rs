//! Reminder scheduler — escalating nags for unconfirmed proposals.
//!
//! Timeline per proposal: first reminder a few seconds after staging
//! (one-shot, not tied to the periodic tick), then reminders with a
//! doubling interval, then a single pre-warning once the TTL is nearly
//! out, then silence until the expiry notice. Confirmation or cancellation
//! unhooks everything immediately.
//!
//! Delivery is delete-then-resend: the previous reminder message goes away
//! (a vanished message is fine) and a fresh one arrives carrying the
//! reminder line plus the original confirmation content, spans shifted by
//! the prefix length. The newest message is always the complete, current
//! state — no partial edits.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use herald_core::config::ReminderConfig;
use herald_core::spans::{self, utf16_len, FormattingSpan};
use herald_core::types::Keyboard;
use herald_core::{HeraldError, Transport};

use crate::staging::BroadcastProposal;

/// Escalation state for one outstanding proposal. Proposal data is copied
/// in at creation time: removing the proposal never invalidates a reminder
/// mid-flight.
#[derive(Debug, Clone)]
pub struct ReminderState {
    pub proposal_id: String,
    pub chat_id: i64,
    pub display_message_id: i64,
    /// The confirmation message content, re-sent under each reminder line.
    pub text: String,
    pub spans: Option<Vec<FormattingSpan>>,
    pub keyboard: Option<Keyboard>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub next_reminder_at: DateTime<Utc>,
    pub reminder_interval: Duration,
    pub pre_warning_sent: bool,
    pub confirmed: bool,
}

/// What a tick decided to do for one proposal.
enum Due {
    Remind {
        proposal_id: String,
        prefix: String,
        final_warning: bool,
    },
    Expire {
        proposal_id: String,
    },
}

/// Tracks and escalates reminders for every staged proposal.
pub struct ReminderScheduler {
    reminders: DashMap<String, ReminderState>,
    transport: Arc<dyn Transport>,
    cfg: ReminderConfig,
}

impl ReminderScheduler {
    pub fn new(transport: Arc<dyn Transport>, cfg: ReminderConfig) -> Self {
        Self {
            reminders: DashMap::new(),
            transport,
            cfg,
        }
    }

    /// Begin escalation for a freshly staged proposal. `display_text` /
    /// `display_spans` / `keyboard` are the confirmation message as shown,
    /// so every reminder re-send is self-contained and still confirmable.
    pub fn track(
        self: &Arc<Self>,
        proposal: &BroadcastProposal,
        chat_id: i64,
        display_message_id: i64,
        display_text: String,
        display_spans: Option<Vec<FormattingSpan>>,
        keyboard: Option<Keyboard>,
    ) {
        let first_after = Duration::seconds(self.cfg.first_after_secs as i64);
        let state = ReminderState {
            proposal_id: proposal.id.clone(),
            chat_id,
            display_message_id,
            text: display_text,
            spans: display_spans,
            keyboard,
            created_at: proposal.created_at,
            expires_at: proposal.expires_at,
            next_reminder_at: proposal.created_at + first_after,
            reminder_interval: Duration::seconds(self.cfg.base_interval_secs as i64),
            pre_warning_sent: false,
            confirmed: false,
        };
        self.reminders.insert(proposal.id.clone(), state);
        tracing::debug!("⏱ Tracking reminders for proposal {}", proposal.id);

        // First reminder fires on its own one-shot schedule, ahead of the
        // coarser periodic tick.
        let scheduler = Arc::clone(self);
        let id = proposal.id.clone();
        let sleep = first_after.to_std().unwrap_or_default();
        tokio::spawn(async move {
            tokio::time::sleep(sleep).await;
            scheduler.fire(&id, Utc::now()).await;
        });
    }

    /// Stop all future reminders for a confirmed/cancelled proposal.
    /// Returns true if it was being tracked.
    pub fn untrack(&self, proposal_id: &str) -> bool {
        if let Some(mut state) = self.reminders.get_mut(proposal_id) {
            state.confirmed = true;
        }
        self.reminders.remove(proposal_id).is_some()
    }

    pub fn is_tracking(&self, proposal_id: &str) -> bool {
        self.reminders.contains_key(proposal_id)
    }

    /// Scan every tracked proposal and deliver whatever is due at `now`.
    pub async fn tick(&self, now: DateTime<Utc>) {
        let mut due = Vec::new();
        for mut entry in self.reminders.iter_mut() {
            if let Some(action) = self.assess(entry.value_mut(), now) {
                due.push(action);
            }
        }
        for action in due {
            self.deliver(action).await;
        }
    }

    /// Single-proposal variant driven by the one-shot first-reminder task.
    async fn fire(&self, proposal_id: &str, now: DateTime<Utc>) {
        let action = match self.reminders.get_mut(proposal_id) {
            Some(mut entry) => self.assess(entry.value_mut(), now),
            None => None,
        };
        if let Some(action) = action {
            self.deliver(action).await;
        }
    }

    /// Decide what is due for one proposal, advancing its escalation
    /// state. Pure over `now`; no I/O.
    fn assess(&self, state: &mut ReminderState, now: DateTime<Utc>) -> Option<Due> {
        if state.confirmed {
            return None;
        }
        if now >= state.expires_at {
            return Some(Due::Expire {
                proposal_id: state.proposal_id.clone(),
            });
        }
        let remaining = state.expires_at - now;
        if remaining <= Duration::seconds(self.cfg.pre_warning_secs as i64) {
            if state.pre_warning_sent {
                return None;
            }
            state.pre_warning_sent = true;
            let minutes = (remaining.num_seconds() + 59) / 60;
            return Some(Due::Remind {
                proposal_id: state.proposal_id.clone(),
                prefix: format!(
                    "🚨 Last call — this broadcast expires in about {minutes} min and will be discarded.\n\n"
                ),
                final_warning: true,
            });
        }
        if state.pre_warning_sent || now < state.next_reminder_at {
            return None;
        }
        state.next_reminder_at = now + state.reminder_interval;
        state.reminder_interval = std::cmp::min(
            state.reminder_interval * 2,
            Duration::seconds(self.cfg.max_interval_secs as i64),
        );
        Some(Due::Remind {
            proposal_id: state.proposal_id.clone(),
            prefix: "⏰ Still waiting for your confirmation on this broadcast.\n\n".to_string(),
            final_warning: false,
        })
    }

    async fn deliver(&self, action: Due) {
        match action {
            Due::Remind {
                proposal_id,
                prefix,
                final_warning,
            } => self.send_reminder(&proposal_id, &prefix, final_warning).await,
            Due::Expire { proposal_id } => self.expire(&proposal_id).await,
        }
    }

    /// Delete the stale reminder message and send a fresh, self-contained
    /// one.
    async fn send_reminder(&self, proposal_id: &str, prefix: &str, final_warning: bool) {
        // Copy what we need; no map guard across awaits.
        let (chat_id, old_message_id, text, spans, keyboard) =
            match self.reminders.get(proposal_id) {
                Some(s) => (
                    s.chat_id,
                    s.display_message_id,
                    s.text.clone(),
                    s.spans.clone(),
                    s.keyboard.clone(),
                ),
                None => return,
            };

        self.delete_stale(chat_id, old_message_id).await;

        let full_text = format!("{prefix}{text}");
        let shifted = spans::shift(spans, utf16_len(prefix));
        match self
            .transport
            .send_message(chat_id, &full_text, shifted.as_deref(), keyboard.as_ref())
            .await
        {
            Ok(message_id) => {
                tracing::info!(
                    "⏰ Reminder sent for proposal {proposal_id}{}",
                    if final_warning { " (final warning)" } else { "" }
                );
                if let Some(mut state) = self.reminders.get_mut(proposal_id) {
                    state.display_message_id = message_id;
                }
            }
            Err(e) => {
                tracing::warn!("⚠️ Reminder send for proposal {proposal_id} failed: {e}");
            }
        }
    }

    /// One-time expiry notice; the staging store's own sweep removes the
    /// proposal itself.
    async fn expire(&self, proposal_id: &str) {
        let (chat_id, old_message_id) = match self.reminders.get(proposal_id) {
            Some(s) => (s.chat_id, s.display_message_id),
            None => return,
        };
        self.delete_stale(chat_id, old_message_id).await;
        if let Err(e) = self
            .transport
            .send_message(
                chat_id,
                "🗑 This broadcast was never confirmed and has expired. Start over with /broadcast.",
                None,
                None,
            )
            .await
        {
            tracing::warn!("⚠️ Expiry notice for proposal {proposal_id} failed: {e}");
        }
        self.reminders.remove(proposal_id);
        tracing::info!("🗑 Proposal {proposal_id} expired unconfirmed");
    }

    async fn delete_stale(&self, chat_id: i64, message_id: i64) {
        match self.transport.delete_message(chat_id, message_id).await {
            Ok(()) | Err(HeraldError::TargetNotFound) => {}
            Err(e) => tracing::warn!("⚠️ Couldn't delete stale reminder message: {e}"),
        }
    }

    /// Spawn the periodic tick loop.
    pub fn spawn_ticker(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let scheduler = Arc::clone(self);
        let every = std::time::Duration::from_secs(self.cfg.tick_secs.max(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await;
            loop {
                interval.tick().await;
                scheduler.tick(Utc::now()).await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MockTransport;
    use herald_core::types::AudienceFilter;

    fn proposal(id: &str, created_at: DateTime<Utc>, ttl_secs: i64) -> BroadcastProposal {
        BroadcastProposal {
            id: id.into(),
            text: "hello".into(),
            spans: None,
            audience: AudienceFilter::EVERYONE,
            requested_by: 42,
            created_at,
            expires_at: created_at + Duration::seconds(ttl_secs),
        }
    }

    fn scheduler(transport: Arc<MockTransport>) -> Arc<ReminderScheduler> {
        Arc::new(ReminderScheduler::new(transport, ReminderConfig::default()))
    }

    /// Insert state directly, skipping `track`'s one-shot sleep task so
    /// tests control the clock completely.
    fn track_silently(
        scheduler: &Arc<ReminderScheduler>,
        p: &BroadcastProposal,
        display_text: &str,
    ) {
        scheduler.reminders.insert(
            p.id.clone(),
            ReminderState {
                proposal_id: p.id.clone(),
                chat_id: 42,
                display_message_id: 1,
                text: display_text.into(),
                spans: None,
                keyboard: None,
                created_at: p.created_at,
                expires_at: p.expires_at,
                next_reminder_at: p.created_at + Duration::seconds(30),
                reminder_interval: Duration::seconds(30),
                pre_warning_sent: false,
                confirmed: false,
            },
        );
    }

    #[tokio::test]
    async fn test_escalation_schedule() {
        let transport = Arc::new(MockTransport::new());
        let scheduler = scheduler(transport.clone());
        let t0 = Utc::now();
        let p = proposal("p1", t0, 600);
        track_silently(&scheduler, &p, "confirm me");

        // Expected: reminders at 30, 60, 120, 240; pre-warning at 300;
        // silence after; expiry notice at 600.
        let mut reminder_seconds = Vec::new();
        for s in 0..=600 {
            let before = transport.sent_count();
            scheduler.tick(t0 + Duration::seconds(s)).await;
            if transport.sent_count() > before {
                reminder_seconds.push(s);
            }
        }
        assert_eq!(reminder_seconds, vec![30, 60, 120, 240, 300, 600]);

        let sent = transport.sent.lock().unwrap().clone();
        // Regular reminders carry the original confirmation content
        assert!(sent[0].text.ends_with("confirm me"));
        assert!(sent[3].text.contains("Still waiting"));
        // Exactly one pre-warning, then only the expiry notice
        assert!(sent[4].text.contains("Last call"));
        assert!(sent[5].text.contains("expired"));
        assert!(!scheduler.is_tracking("p1"));
    }

    #[tokio::test]
    async fn test_untrack_suppresses_everything() {
        let transport = Arc::new(MockTransport::new());
        let scheduler = scheduler(transport.clone());
        let t0 = Utc::now();
        let p = proposal("p1", t0, 600);
        track_silently(&scheduler, &p, "confirm me");

        assert!(scheduler.untrack("p1"));
        assert!(!scheduler.untrack("p1"));
        for s in [30, 60, 300, 600] {
            scheduler.tick(t0 + Duration::seconds(s)).await;
        }
        assert_eq!(transport.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_reminder_shifts_spans_by_prefix() {
        let transport = Arc::new(MockTransport::new());
        let scheduler = scheduler(transport.clone());
        let t0 = Utc::now();
        let p = proposal("p1", t0, 600);
        track_silently(&scheduler, &p, "bold text");
        scheduler.reminders.get_mut("p1").unwrap().spans = Some(vec![FormattingSpan::new(
            herald_core::spans::SpanKind::Bold,
            0,
            4,
        )]);

        scheduler.tick(t0 + Duration::seconds(30)).await;

        let sent = transport.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        let prefix_len = utf16_len(&sent[0].text) - utf16_len("bold text");
        let span = &sent[0].spans.as_ref().unwrap()[0];
        assert_eq!(span.offset, prefix_len);
        assert_eq!(span.length, 4);
        // Old display message was deleted, id now points at the resend
        assert_eq!(transport.deleted.lock().unwrap().as_slice(), &[(42, 1)]);
        assert_eq!(
            scheduler.reminders.get("p1").unwrap().display_message_id,
            sent[0].message_id
        );
    }

    #[tokio::test]
    async fn test_one_shot_first_reminder() {
        tokio::time::pause();
        let transport = Arc::new(MockTransport::new());
        let mut cfg = ReminderConfig::default();
        // Due immediately: the paused tokio clock advances, wall time doesn't
        cfg.first_after_secs = 0;
        let scheduler = Arc::new(ReminderScheduler::new(transport.clone(), cfg));
        let p = proposal("p1", Utc::now(), 600);
        scheduler.track(&p, 42, 1, "confirm me".into(), None, None);

        tokio::time::advance(std::time::Duration::from_secs(1)).await;
        tokio::task::yield_now().await;
        assert_eq!(transport.sent_count(), 1);
    }
}
