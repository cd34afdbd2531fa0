//! Collaborator traits — the seams between the engine and the outside
//! world. The broadcast and workflow crates are written purely against
//! these; herald-telegram and the in-memory audience store implement them.

use async_trait::async_trait;

use crate::error::Result;
use crate::spans::FormattingSpan;
use crate::types::{AudienceFilter, Keyboard, Recipient};

/// Message transport: send/edit/delete chat messages, answer callbacks.
///
/// Implementations must surface [`HeraldError::NotModified`] and
/// [`HeraldError::TargetNotFound`] as distinct variants — the engine
/// treats both as non-fatal — and map "bot was blocked" delivery failures
/// to [`HeraldError::RecipientBlocked`].
///
/// [`HeraldError::NotModified`]: crate::error::HeraldError::NotModified
/// [`HeraldError::TargetNotFound`]: crate::error::HeraldError::TargetNotFound
/// [`HeraldError::RecipientBlocked`]: crate::error::HeraldError::RecipientBlocked
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a message; returns the new message id.
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        spans: Option<&[FormattingSpan]>,
        keyboard: Option<&Keyboard>,
    ) -> Result<i64>;

    /// Edit an existing message's text and spans.
    async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        spans: Option<&[FormattingSpan]>,
    ) -> Result<()>;

    /// Delete a message.
    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<()>;

    /// Acknowledge a callback query so the client stops its spinner.
    async fn answer_callback(&self, callback_id: &str) -> Result<()>;
}

/// Recipient/audience store.
#[async_trait]
pub trait AudienceResolver: Send + Sync {
    /// Count recipients matching the filter, optionally excluding one id.
    async fn count_matching(&self, filter: AudienceFilter, exclude: Option<i64>) -> Result<usize>;

    /// List recipients matching the filter.
    async fn list_matching(&self, filter: AudienceFilter) -> Result<Vec<Recipient>>;

    /// Drop a recipient (e.g. they blocked the bot).
    async fn remove(&self, recipient_id: i64) -> Result<()>;
}

/// Produces short collision-resistant opaque ids for staged proposals.
pub trait IdGenerator: Send + Sync {
    fn generate(&self) -> String;
}
