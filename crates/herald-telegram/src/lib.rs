//! # Herald Telegram
//!
//! Telegram Bot API transport: message send/edit/delete, callback
//! answers, and long-polling updates. Formatting spans ride the wire as
//! `entities`; the API's soft failures are mapped onto the dedicated
//! error variants the engine branches on.

use async_trait::async_trait;
use serde::Deserialize;

use herald_core::error::{HeraldError, Result};
use herald_core::spans::FormattingSpan;
use herald_core::types::Keyboard;
use herald_core::Transport;

/// Bot API envelope for every method call.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

/// Telegram Bot API client implementing [`Transport`].
pub struct TelegramTransport {
    bot_token: String,
    client: reqwest::Client,
}

impl TelegramTransport {
    pub fn new(bot_token: &str) -> Self {
        Self {
            bot_token: bot_token.to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{}", self.bot_token, method)
    }

    /// Call one Bot API method, unwrapping the envelope.
    async fn call(&self, method: &str, body: serde_json::Value) -> Result<serde_json::Value> {
        let response = self
            .client
            .post(self.api_url(method))
            .json(&body)
            .timeout(std::time::Duration::from_secs(35))
            .send()
            .await
            .map_err(|e| HeraldError::Transport(format!("{method} failed: {e}")))?;

        let envelope: ApiResponse<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| HeraldError::Transport(format!("invalid {method} response: {e}")))?;

        if !envelope.ok {
            let description = envelope.description.unwrap_or_default();
            tracing::debug!("📡 {method} rejected: {description}");
            return Err(map_api_error(&description));
        }
        Ok(envelope.result.unwrap_or(serde_json::Value::Null))
    }

    /// Bot identity check, used at startup.
    pub async fn get_me(&self) -> Result<BotUser> {
        let result = self.call("getMe", serde_json::json!({})).await?;
        serde_json::from_value(result)
            .map_err(|e| HeraldError::Transport(format!("invalid getMe payload: {e}")))
    }
}

/// Map an API error description onto the engine's failure taxonomy.
fn map_api_error(description: &str) -> HeraldError {
    let lower = description.to_lowercase();
    if lower.contains("message is not modified") {
        HeraldError::NotModified
    } else if lower.contains("message to edit not found")
        || lower.contains("message to delete not found")
    {
        HeraldError::TargetNotFound
    } else if lower.contains("bot was blocked by the user")
        || lower.contains("user is deactivated")
    {
        HeraldError::RecipientBlocked
    } else {
        HeraldError::Transport(description.to_string())
    }
}

fn keyboard_json(keyboard: &Keyboard) -> serde_json::Value {
    serde_json::json!({
        "inline_keyboard": keyboard
            .rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|b| serde_json::json!({"text": b.label, "callback_data": b.callback_data}))
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>()
    })
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        spans: Option<&[FormattingSpan]>,
        keyboard: Option<&Keyboard>,
    ) -> Result<i64> {
        let mut body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        });
        if let Some(spans) = spans {
            body["entities"] = serde_json::json!(spans);
        }
        if let Some(keyboard) = keyboard {
            body["reply_markup"] = keyboard_json(keyboard);
        }
        let result = self.call("sendMessage", body).await?;
        result["message_id"]
            .as_i64()
            .ok_or_else(|| HeraldError::Transport("sendMessage: no message_id".into()))
    }

    async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        spans: Option<&[FormattingSpan]>,
    ) -> Result<()> {
        let mut body = serde_json::json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "text": text,
        });
        if let Some(spans) = spans {
            body["entities"] = serde_json::json!(spans);
        }
        self.call("editMessageText", body).await.map(|_| ())
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<()> {
        self.call(
            "deleteMessage",
            serde_json::json!({"chat_id": chat_id, "message_id": message_id}),
        )
        .await
        .map(|_| ())
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<()> {
        self.call(
            "answerCallbackQuery",
            serde_json::json!({"callback_query_id": callback_id}),
        )
        .await
        .map(|_| ())
    }
}

// --- Update types (long polling) ---

#[derive(Debug, Clone, Deserialize)]
pub struct BotUser {
    pub id: i64,
    pub first_name: String,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TgUpdate {
    pub update_id: i64,
    pub message: Option<TgMessage>,
    pub callback_query: Option<TgCallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TgMessage {
    pub message_id: i64,
    pub from: Option<TgFrom>,
    pub chat: TgChat,
    pub text: Option<String>,
    pub entities: Option<Vec<FormattingSpan>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TgFrom {
    pub id: i64,
    pub is_bot: bool,
    pub first_name: String,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TgChat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TgCallbackQuery {
    pub id: String,
    pub from: TgFrom,
    pub data: Option<String>,
    pub message: Option<TgMessage>,
}

/// Long-polling cursor over getUpdates. One poller per bot.
pub struct UpdatePoller {
    transport: std::sync::Arc<TelegramTransport>,
    last_update_id: i64,
}

impl UpdatePoller {
    pub fn new(transport: std::sync::Arc<TelegramTransport>) -> Self {
        Self {
            transport,
            last_update_id: 0,
        }
    }

    /// Fetch the next batch of updates (blocks server-side up to 30s).
    pub async fn next_batch(&mut self) -> Result<Vec<TgUpdate>> {
        let result = self
            .transport
            .call(
                "getUpdates",
                serde_json::json!({
                    "offset": self.last_update_id + 1,
                    "timeout": 30,
                    "allowed_updates": ["message", "callback_query"],
                }),
            )
            .await?;
        let updates: Vec<TgUpdate> = serde_json::from_value(result)
            .map_err(|e| HeraldError::Transport(format!("invalid getUpdates payload: {e}")))?;
        if let Some(last) = updates.last() {
            self.last_update_id = last.update_id;
        }
        Ok(updates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_core::spans::SpanKind;
    use herald_core::types::Button;

    #[test]
    fn test_error_mapping() {
        assert!(matches!(
            map_api_error("Bad Request: message is not modified"),
            HeraldError::NotModified
        ));
        assert!(matches!(
            map_api_error("Bad Request: message to edit not found"),
            HeraldError::TargetNotFound
        ));
        assert!(matches!(
            map_api_error("Bad Request: message to delete not found"),
            HeraldError::TargetNotFound
        ));
        assert!(matches!(
            map_api_error("Forbidden: bot was blocked by the user"),
            HeraldError::RecipientBlocked
        ));
        assert!(matches!(
            map_api_error("Too Many Requests: retry after 30"),
            HeraldError::Transport(_)
        ));
    }

    #[test]
    fn test_entity_wire_shape() {
        let span = FormattingSpan::new(SpanKind::Bold, 0, 5);
        let value = serde_json::json!([span]);
        assert_eq!(value[0]["type"], "bold");
        assert_eq!(value[0]["offset"], 0);
        assert_eq!(value[0]["length"], 5);
        // Absent payload fields stay off the wire
        assert!(value[0].get("url").is_none());
    }

    #[test]
    fn test_keyboard_wire_shape() {
        let kb = Keyboard::single_row(vec![
            Button::new("✅ Send", "bcast:confirm:abc"),
            Button::new("❌ Cancel", "bcast:cancel:abc"),
        ]);
        let value = keyboard_json(&kb);
        assert_eq!(value["inline_keyboard"][0][0]["text"], "✅ Send");
        assert_eq!(
            value["inline_keyboard"][0][1]["callback_data"],
            "bcast:cancel:abc"
        );
    }

    #[test]
    fn test_update_deserialization() {
        let raw = serde_json::json!({
            "update_id": 7,
            "message": {
                "message_id": 1,
                "from": {"id": 42, "is_bot": false, "first_name": "Ann", "username": "ann"},
                "chat": {"id": 42},
                "text": "Hello world",
                "entities": [{"type": "bold", "offset": 0, "length": 5}],
            }
        });
        let update: TgUpdate = serde_json::from_value(raw).unwrap();
        let msg = update.message.unwrap();
        assert_eq!(msg.chat.id, 42);
        assert_eq!(msg.entities.unwrap()[0].kind, SpanKind::Bold);
    }
}
