//! The broadcast staging workflow: collect the message, collect the
//! audience, then stage the proposal and post the confirmation message
//! with its confirm/cancel keyboard.

use std::sync::Arc;

use herald_broadcast::{ReminderScheduler, StagingStore};
use herald_core::spans::{self, utf16_len, FormattingSpan};
use herald_core::types::{AudienceFilter, Button, Keyboard};
use herald_core::{AudienceResolver, Transport};

use crate::engine::WorkflowDefinition;
use crate::step::{StepInput, StepOutcome, WorkflowData, WorkflowStep};

pub const WORKFLOW_NAME: &str = "broadcast";

const DATA_TEXT: &str = "text";
const DATA_SPANS: &str = "spans";
const DATA_AUDIENCE: &str = "audience";

/// Callback-data prefixes the router matches on.
pub const CB_CONFIRM: &str = "bcast:confirm:";
pub const CB_CANCEL: &str = "bcast:cancel:";

/// Step 1: the broadcast message itself, formatting preserved.
struct CollectMessage;

impl WorkflowStep for CollectMessage {
    fn question(&self, _data: &WorkflowData) -> String {
        "📝 Send the broadcast message. Formatting is preserved; you can use \
         <first_name>, <username>, and <alias> placeholders."
            .to_string()
    }

    fn consume(&self, data: &mut WorkflowData, input: StepInput<'_>) -> StepOutcome {
        match input {
            StepInput::Message { text, spans } => {
                if text.trim().is_empty() {
                    return StepOutcome::Stay("The message can't be empty — send some text.".into());
                }
                data.insert(DATA_TEXT.into(), serde_json::json!(text));
                if let Some(spans) = spans {
                    match serde_json::to_value(spans) {
                        Ok(value) => {
                            data.insert(DATA_SPANS.into(), value);
                        }
                        Err(e) => tracing::warn!("⚠️ Couldn't capture formatting spans: {e}"),
                    }
                }
                StepOutcome::Advance
            }
            StepInput::Selection(_) => StepOutcome::Ignored,
        }
    }
}

/// Step 2: who gets it.
struct CollectAudience;

impl WorkflowStep for CollectAudience {
    fn question(&self, _data: &WorkflowData) -> String {
        "🎯 Who should receive it? Reply with an audience: everyone, \
         subscribers, testers, or inactive (combine with +)."
            .to_string()
    }

    fn consume(&self, data: &mut WorkflowData, input: StepInput<'_>) -> StepOutcome {
        let token = match input {
            StepInput::Message { text, .. } => text,
            StepInput::Selection(token) => token,
        };
        match AudienceFilter::parse(token) {
            Ok(filter) => {
                data.insert(DATA_AUDIENCE.into(), serde_json::json!(filter.0));
                StepOutcome::Advance
            }
            Err(corrective) => StepOutcome::Stay(corrective),
        }
    }
}

/// Build the registered workflow. The completion callback stages the
/// proposal, posts the confirmation message, and hands the proposal to the
/// reminder scheduler.
pub fn broadcast_workflow(
    staging: Arc<StagingStore>,
    reminders: Arc<ReminderScheduler>,
    transport: Arc<dyn Transport>,
    audience: Arc<dyn AudienceResolver>,
) -> WorkflowDefinition {
    WorkflowDefinition {
        name: WORKFLOW_NAME.to_string(),
        steps: vec![Box::new(CollectMessage), Box::new(CollectAudience)],
        on_complete: Arc::new(move |user_id, data| {
            let staging = staging.clone();
            let reminders = reminders.clone();
            let transport = transport.clone();
            let audience = audience.clone();
            Box::pin(async move {
                let text = data
                    .get(DATA_TEXT)
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                let message_spans: Option<Vec<FormattingSpan>> = data
                    .get(DATA_SPANS)
                    .and_then(|v| serde_json::from_value(v.clone()).ok());
                let filter = AudienceFilter(
                    data.get(DATA_AUDIENCE).and_then(|v| v.as_u64()).unwrap_or(0) as u32,
                );

                let recipients = audience.count_matching(filter, Some(user_id)).await?;
                let id = staging.stage(text.clone(), filter, message_spans.clone(), user_id);

                let header =
                    format!("📣 Send this broadcast to {recipients} recipients ({filter})?\n\n");
                let confirm_text = format!("{header}{text}");
                let confirm_spans = spans::shift(message_spans, utf16_len(&header));
                let keyboard = Keyboard::single_row(vec![
                    Button::new("✅ Send", &format!("{CB_CONFIRM}{id}")),
                    Button::new("❌ Cancel", &format!("{CB_CANCEL}{id}")),
                ]);

                let message_id = match transport
                    .send_message(user_id, &confirm_text, confirm_spans.as_deref(), Some(&keyboard))
                    .await
                {
                    Ok(message_id) => message_id,
                    Err(e) => {
                        // The admin never saw a keyboard for it; don't
                        // leave the proposal waiting for the sweep.
                        staging.remove(&id);
                        return Err(e);
                    }
                };

                if let Some(proposal) = staging.get(&id) {
                    reminders.track(
                        &proposal,
                        user_id,
                        message_id,
                        confirm_text,
                        confirm_spans,
                        Some(keyboard),
                    );
                }
                Ok(())
            })
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::WorkflowEngine;
    use async_trait::async_trait;
    use herald_core::config::ReminderConfig;
    use herald_core::error::Result;
    use herald_core::ids::HexIdGenerator;
    use herald_core::spans::SpanKind;
    use herald_core::types::Recipient;
    use herald_core::HeraldError;
    use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
    use std::sync::Mutex;

    struct RecordingTransport {
        next_id: AtomicI64,
        fail_sends: AtomicBool,
        pub sent: Mutex<Vec<(i64, String, Option<Vec<FormattingSpan>>, Option<Keyboard>)>>,
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send_message(
            &self,
            chat_id: i64,
            text: &str,
            spans: Option<&[FormattingSpan]>,
            keyboard: Option<&Keyboard>,
        ) -> Result<i64> {
            if self.fail_sends.load(Ordering::SeqCst) {
                return Err(HeraldError::Transport("wire down".into()));
            }
            self.sent.lock().unwrap().push((
                chat_id,
                text.to_string(),
                spans.map(|s| s.to_vec()),
                keyboard.cloned(),
            ));
            Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
        }

        async fn edit_message_text(
            &self,
            _: i64,
            _: i64,
            _: &str,
            _: Option<&[FormattingSpan]>,
        ) -> Result<()> {
            Ok(())
        }

        async fn delete_message(&self, _: i64, _: i64) -> Result<()> {
            Ok(())
        }

        async fn answer_callback(&self, _: &str) -> Result<()> {
            Ok(())
        }
    }

    struct StaticAudience(usize);

    #[async_trait]
    impl AudienceResolver for StaticAudience {
        async fn count_matching(&self, _: AudienceFilter, _: Option<i64>) -> Result<usize> {
            Ok(self.0)
        }
        async fn list_matching(&self, _: AudienceFilter) -> Result<Vec<Recipient>> {
            Ok(Vec::new())
        }
        async fn remove(&self, _: i64) -> Result<()> {
            Ok(())
        }
    }

    struct Fixture {
        engine: WorkflowEngine,
        staging: Arc<StagingStore>,
        reminders: Arc<ReminderScheduler>,
        transport: Arc<RecordingTransport>,
    }

    fn fixture() -> Fixture {
        let transport = Arc::new(RecordingTransport {
            next_id: AtomicI64::new(500),
            fail_sends: AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
        });
        let staging = Arc::new(StagingStore::new(
            Arc::new(HexIdGenerator),
            std::time::Duration::from_secs(600),
        ));
        let reminders = Arc::new(ReminderScheduler::new(
            transport.clone(),
            ReminderConfig::default(),
        ));
        let mut engine = WorkflowEngine::new(std::time::Duration::from_secs(1800));
        engine.register(broadcast_workflow(
            staging.clone(),
            reminders.clone(),
            transport.clone(),
            Arc::new(StaticAudience(3)),
        ));
        Fixture {
            engine,
            staging,
            reminders,
            transport,
        }
    }

    #[tokio::test]
    async fn test_full_staging_flow() {
        let f = fixture();
        let q1 = f.engine.start(42, WORKFLOW_NAME).unwrap();
        assert!(q1.contains("broadcast message"));

        let spans = vec![FormattingSpan::new(SpanKind::Bold, 0, 5)];
        let q2 = f
            .engine
            .advance(
                42,
                StepInput::Message {
                    text: "Hello <first_name>",
                    spans: Some(&spans),
                },
            )
            .await
            .unwrap();
        assert!(q2.contains("Who should receive"));

        // Completion sends the confirmation itself: no engine reply
        let done = f
            .engine
            .advance(42, StepInput::Message { text: "everyone", spans: None })
            .await;
        assert_eq!(done, None);
        assert!(!f.engine.has_active(42));

        let sent = f.transport.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        let (chat_id, text, sent_spans, keyboard) = &sent[0];
        assert_eq!(*chat_id, 42);
        assert!(text.contains("3 recipients (everyone)"));
        assert!(text.ends_with("Hello <first_name>"));
        // Span shifted past the header, still 5 units long
        let span = &sent_spans.as_ref().unwrap()[0];
        assert_eq!(span.length, 5);
        assert!(span.offset > 0);

        // Keyboard carries confirm/cancel for the staged id
        let buttons = &keyboard.as_ref().unwrap().rows[0];
        let id = buttons[0].callback_data.strip_prefix(CB_CONFIRM).unwrap();
        assert_eq!(buttons[1].callback_data, format!("{CB_CANCEL}{id}"));

        // Proposal staged and reminders tracking it
        let proposal = f.staging.get(id).unwrap();
        assert_eq!(proposal.text, "Hello <first_name>");
        assert_eq!(proposal.requested_by, 42);
        assert!(f.reminders.is_tracking(id));
    }

    #[tokio::test]
    async fn test_bad_audience_token_stays() {
        let f = fixture();
        f.engine.start(42, WORKFLOW_NAME).unwrap();
        f.engine
            .advance(42, StepInput::Message { text: "hi", spans: None })
            .await;

        let reply = f
            .engine
            .advance(42, StepInput::Message { text: "robots", spans: None })
            .await
            .unwrap();
        assert!(reply.contains("Unknown audience"));
        assert!(f.engine.has_active(42));

        // Selection tokens work too
        let done = f.engine.advance(42, StepInput::Selection("testers")).await;
        assert_eq!(done, None);
        assert!(!f.engine.has_active(42));
    }

    #[tokio::test]
    async fn test_failed_confirmation_send_unstages() {
        let f = fixture();
        f.transport.fail_sends.store(true, Ordering::SeqCst);

        f.engine.start(42, WORKFLOW_NAME).unwrap();
        f.engine
            .advance(42, StepInput::Message { text: "hi", spans: None })
            .await;
        let reply = f
            .engine
            .advance(42, StepInput::Message { text: "everyone", spans: None })
            .await
            .unwrap();
        assert!(reply.contains("start over"));

        // No orphaned proposal waiting for the TTL sweep, nothing tracked
        assert!(f.staging.is_empty());
        assert!(f.transport.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_message_rejected() {
        let f = fixture();
        f.engine.start(42, WORKFLOW_NAME).unwrap();
        let reply = f
            .engine
            .advance(42, StepInput::Message { text: "   ", spans: None })
            .await
            .unwrap();
        assert!(reply.contains("can't be empty"));
        assert!(f.engine.has_active(42));
    }
}
