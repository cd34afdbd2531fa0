//! Shared test doubles for the broadcast engine.

use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use herald_core::error::{HeraldError, Result};
use herald_core::spans::FormattingSpan;
use herald_core::types::Keyboard;
use herald_core::Transport;

#[derive(Debug, Clone)]
pub struct SentMessage {
    pub message_id: i64,
    pub chat_id: i64,
    pub text: String,
    pub spans: Option<Vec<FormattingSpan>>,
    pub keyboard: Option<Keyboard>,
}

#[derive(Debug, Clone)]
pub struct Edit {
    pub chat_id: i64,
    pub message_id: i64,
    pub text: String,
}

/// How the mock answers edit calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditMode {
    Ok,
    NotModified,
    NotFound,
}

/// Records every transport call; per-chat failure injection for sends.
pub struct MockTransport {
    next_id: AtomicI64,
    pub sent: Mutex<Vec<SentMessage>>,
    pub edits: Mutex<Vec<Edit>>,
    pub deleted: Mutex<Vec<(i64, i64)>>,
    pub blocked_chats: Mutex<HashSet<i64>>,
    pub failing_chats: Mutex<HashSet<i64>>,
    pub edit_mode: Mutex<EditMode>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1000),
            sent: Mutex::new(Vec::new()),
            edits: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
            blocked_chats: Mutex::new(HashSet::new()),
            failing_chats: Mutex::new(HashSet::new()),
            edit_mode: Mutex::new(EditMode::Ok),
        }
    }

    pub fn block_chat(&self, chat_id: i64) {
        self.blocked_chats.lock().unwrap().insert(chat_id);
    }

    pub fn fail_chat(&self, chat_id: i64) {
        self.failing_chats.lock().unwrap().insert(chat_id);
    }

    pub fn set_edit_mode(&self, mode: EditMode) {
        *self.edit_mode.lock().unwrap() = mode;
    }

    pub fn sent_to(&self, chat_id: i64) -> Vec<SentMessage> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.chat_id == chat_id)
            .cloned()
            .collect()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn edit_count(&self) -> usize {
        self.edits.lock().unwrap().len()
    }

    pub fn last_edit(&self) -> Option<Edit> {
        self.edits.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        spans: Option<&[FormattingSpan]>,
        keyboard: Option<&Keyboard>,
    ) -> Result<i64> {
        if self.blocked_chats.lock().unwrap().contains(&chat_id) {
            return Err(HeraldError::RecipientBlocked);
        }
        if self.failing_chats.lock().unwrap().contains(&chat_id) {
            return Err(HeraldError::Transport("mock send failure".into()));
        }
        let message_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.sent.lock().unwrap().push(SentMessage {
            message_id,
            chat_id,
            text: text.to_string(),
            spans: spans.map(|s| s.to_vec()),
            keyboard: keyboard.cloned(),
        });
        Ok(message_id)
    }

    async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        _spans: Option<&[FormattingSpan]>,
    ) -> Result<()> {
        match *self.edit_mode.lock().unwrap() {
            EditMode::NotModified => return Err(HeraldError::NotModified),
            EditMode::NotFound => return Err(HeraldError::TargetNotFound),
            EditMode::Ok => {}
        }
        self.edits.lock().unwrap().push(Edit {
            chat_id,
            message_id,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<()> {
        self.deleted.lock().unwrap().push((chat_id, message_id));
        Ok(())
    }

    async fn answer_callback(&self, _callback_id: &str) -> Result<()> {
        Ok(())
    }
}
