//! Herald error type.
//!
//! One enum for the whole workspace. Transport soft-failures ("not
//! modified", "target not found", "blocked by recipient") get their own
//! variants because call sites branch on them; everything remote that we
//! only log or surface keeps the API's description as a String.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, HeraldError>;

#[derive(Debug, Error)]
pub enum HeraldError {
    /// Edit was a no-op: the message already has this content.
    #[error("message not modified")]
    NotModified,

    /// The message to edit/delete no longer exists.
    #[error("target message not found")]
    TargetNotFound,

    /// The recipient has blocked the bot; they should leave the audience.
    #[error("recipient blocked the bot")]
    RecipientBlocked,

    /// Transport-level failure (HTTP error, API rejection).
    #[error("transport error: {0}")]
    Transport(String),

    /// Audience store failure.
    #[error("audience error: {0}")]
    Audience(String),

    /// Configuration load/parse failure.
    #[error("config error: {0}")]
    Config(String),

    /// The execution queue's consumer is gone; nothing will be processed.
    #[error("broadcast queue closed")]
    QueueClosed,

    /// A workflow name that no registered definition matches. This is a
    /// wiring bug, not a runtime condition to recover from.
    #[error("unknown workflow: {0}")]
    UnknownWorkflow(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl HeraldError {
    /// True for edit/delete outcomes the caller is expected to swallow.
    pub fn is_soft(&self) -> bool {
        matches!(self, Self::NotModified | Self::TargetNotFound)
    }
}
