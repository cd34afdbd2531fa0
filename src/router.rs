//! Update routing: commands, workflow input, and confirmation buttons.
//!
//! One router instance handles every incoming update. Commands gate on the
//! admin list; everything else is fed to the workflow engine, which ignores
//! input from users with no active workflow.

use std::sync::Arc;

use herald_broadcast::confirm::ConfirmService;
use herald_core::Transport;
use herald_telegram::{TgCallbackQuery, TgMessage, TgUpdate};
use herald_workflow::broadcast_flow::{CB_CANCEL, CB_CONFIRM, WORKFLOW_NAME};
use herald_workflow::engine::WorkflowEngine;
use herald_workflow::step::StepInput;

const HELP: &str = "📣 Herald broadcast bot.\n\n\
    /broadcast — stage a new broadcast\n\
    /back — go back one step\n\
    /cancel — abandon the current broadcast";

const NOT_ADMIN: &str = "🚫 Only admins can stage broadcasts.";

pub struct UpdateRouter {
    engine: Arc<WorkflowEngine>,
    confirm: Arc<ConfirmService>,
    transport: Arc<dyn Transport>,
    admins: Vec<i64>,
}

impl UpdateRouter {
    pub fn new(
        engine: Arc<WorkflowEngine>,
        confirm: Arc<ConfirmService>,
        transport: Arc<dyn Transport>,
        admins: Vec<i64>,
    ) -> Self {
        Self {
            engine,
            confirm,
            transport,
            admins,
        }
    }

    fn is_admin(&self, user_id: i64) -> bool {
        self.admins.contains(&user_id)
    }

    pub async fn handle(&self, update: TgUpdate) {
        if let Some(message) = update.message {
            self.handle_message(message).await;
        } else if let Some(query) = update.callback_query {
            self.handle_callback(query).await;
        }
    }

    async fn handle_message(&self, message: TgMessage) {
        let Some(from) = message.from else { return };
        if from.is_bot {
            return;
        }
        let Some(text) = message.text.as_deref() else {
            return;
        };
        let chat_id = message.chat.id;

        let reply = match text.trim() {
            "/start" | "/help" => Some(HELP.to_string()),
            "/broadcast" => {
                if !self.is_admin(from.id) {
                    tracing::warn!("🚫 Non-admin {} tried /broadcast", from.id);
                    Some(NOT_ADMIN.to_string())
                } else {
                    match self.engine.start(from.id, WORKFLOW_NAME) {
                        Ok(question) => Some(question),
                        Err(e) => {
                            tracing::error!("💥 Couldn't start broadcast workflow: {e}");
                            Some("💥 Something went wrong. Try again.".to_string())
                        }
                    }
                }
            }
            "/back" => self.engine.back(from.id),
            "/cancel" => self.engine.cancel(from.id),
            _ => {
                self.engine
                    .advance(
                        from.id,
                        StepInput::Message {
                            text,
                            spans: message.entities.as_deref(),
                        },
                    )
                    .await
            }
        };

        if let Some(reply) = reply {
            match self.transport.send_message(chat_id, &reply, None, None).await {
                Ok(message_id) => self.engine.note_message(from.id, message_id),
                Err(e) => tracing::warn!("⚠️ Reply to {chat_id} failed: {e}"),
            }
        }
    }

    async fn handle_callback(&self, query: TgCallbackQuery) {
        // Acknowledge first so the client stops its spinner.
        if let Err(e) = self.transport.answer_callback(&query.id).await {
            tracing::warn!("⚠️ answerCallbackQuery failed: {e}");
        }
        let Some(data) = query.data.as_deref() else {
            return;
        };
        let Some(message) = query.message else { return };
        let chat_id = message.chat.id;
        let user_id = query.from.id;

        // The confirm service edits the confirmation message itself on
        // accepted presses; a denial arrives as a fresh message, since the
        // target may already be showing live progress.
        if let Some(proposal_id) = data.strip_prefix(CB_CONFIRM) {
            if let Some(denial) = self
                .confirm
                .confirm(proposal_id, user_id, chat_id, message.message_id)
                .await
            {
                if let Err(e) = self.transport.send_message(chat_id, &denial, None, None).await {
                    tracing::warn!("⚠️ Reply to {chat_id} failed: {e}");
                }
            }
        } else if let Some(proposal_id) = data.strip_prefix(CB_CANCEL) {
            if let Some(denial) = self
                .confirm
                .cancel(proposal_id, user_id, chat_id, message.message_id)
                .await
            {
                if let Err(e) = self.transport.send_message(chat_id, &denial, None, None).await {
                    tracing::warn!("⚠️ Reply to {chat_id} failed: {e}");
                }
            }
        } else if let Some(reply) = self
            .engine
            .advance(user_id, StepInput::Selection(data))
            .await
        {
            match self.transport.send_message(chat_id, &reply, None, None).await {
                Ok(message_id) => self.engine.note_message(user_id, message_id),
                Err(e) => tracing::warn!("⚠️ Reply to {chat_id} failed: {e}"),
            }
        }
    }
}
