use std::time::Duration;

use court_scan::{NotificationError, Notifier};
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, error, info, warn};

use crate::types::*;

/// Public Bot API endpoint
pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Telegram Bot API client bound to the single configured chat
#[derive(Debug, Clone)]
pub struct TelegramService {
    client: Client,
    api_base: String,
    chat_id: String,
}

impl TelegramService {
    /// Creates a client for the public Bot API
    pub fn new(bot_token: &str, chat_id: impl Into<String>) -> Result<Self, NotificationError> {
        Self::with_api_base(&format!("{}/bot{}", TELEGRAM_API_BASE, bot_token), chat_id)
    }

    /// Creates a client for an arbitrary bot endpoint (`{base}/sendMessage`, ...)
    pub fn with_api_base(api_base: &str, chat_id: impl Into<String>) -> Result<Self, NotificationError> {
        let client = Client::builder()
            .build()
            .map_err(|e| NotificationError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            chat_id: chat_id.into(),
        })
    }

    /// Configured recipient
    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    /// Whether a command from `chat_id` should be obeyed
    pub fn is_authorized(&self, chat_id: i64) -> bool {
        self.chat_id.trim() == chat_id.to_string()
    }

    /// Send `text` to `chat_id`, optionally with a "book this slot" button for the slot
    /// with id `book_button`
    pub async fn send_to(
        &self,
        chat_id: &str,
        text: &str,
        book_button: Option<&str>,
    ) -> Result<(), NotificationError> {
        let body = message_body(chat_id, text, book_button);
        self.call::<Value>("sendMessage", &body, None).await?;
        debug!("Telegram message sent to {}", chat_id);
        Ok(())
    }

    /// Long-poll for updates after `offset`
    pub async fn get_updates(
        &self,
        offset: Option<i64>,
        timeout_secs: u64,
    ) -> Result<Vec<Update>, NotificationError> {
        let mut body = json!({
            "timeout": timeout_secs,
            "allowed_updates": ["message", "callback_query"],
        });
        if let Some(offset) = offset {
            body["offset"] = json!(offset);
        }

        let request_timeout = Duration::from_secs(timeout_secs + 10);
        Ok(self
            .call::<Vec<Update>>("getUpdates", &body, Some(request_timeout))
            .await?
            .unwrap_or_default())
    }

    /// Acknowledge an inline button press
    pub async fn answer_callback(&self, callback_id: &str) -> Result<(), NotificationError> {
        self.call::<Value>("answerCallbackQuery", &json!({ "callback_query_id": callback_id }), None)
            .await?;
        Ok(())
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        body: &Value,
        timeout: Option<Duration>,
    ) -> Result<Option<T>, NotificationError> {
        let url = format!("{}/{}", self.api_base, method);

        let mut request = self.client.post(&url).json(body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await.map_err(|e| {
            error!("Telegram {} request failed: {}", method, e);
            NotificationError::Transport(e.to_string())
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| NotificationError::Transport(format!("Failed to read response: {}", e)))?;

        let parsed = serde_json::from_str::<TelegramResponse<T>>(&text);

        match parsed {
            Ok(envelope) if status.is_success() && envelope.ok => Ok(envelope.result),
            Ok(envelope) => Err(NotificationError::Api {
                status: status.as_u16(),
                description: envelope
                    .description
                    .unwrap_or_else(|| "unknown error".to_string()),
            }),
            Err(_) => Err(NotificationError::Api {
                status: status.as_u16(),
                description: text,
            }),
        }
    }
}

/// `sendMessage` payload.
///
/// The button is left out when its callback data would exceed the Bot API limit;
/// the slot can still be booked with `/book N`.
pub fn message_body(chat_id: &str, text: &str, book_button: Option<&str>) -> Value {
    let mut body = json!({
        "chat_id": chat_id,
        "text": text,
    });

    let Some(slot_id) = book_button else {
        return body;
    };

    let callback_data = book_callback_data(slot_id);
    if callback_data.len() > CALLBACK_DATA_LIMIT {
        warn!("Slot id {} is too long for a book button, sending without it", slot_id);
        return body;
    }

    body["reply_markup"] = json!({
        "inline_keyboard": [[{
            "text": "📅 Reservar este turno",
            "callback_data": callback_data,
        }]]
    });
    body
}

#[async_trait::async_trait]
impl Notifier for TelegramService {
    async fn send_message(&self, text: &str) -> Result<(), NotificationError> {
        self.send_to(&self.chat_id, text, None).await
    }

    async fn send_slot_offer(&self, text: &str, slot_id: &str) -> Result<(), NotificationError> {
        info!("Offering slot {} to chat {}", slot_id, self.chat_id);
        self.send_to(&self.chat_id, text, Some(slot_id)).await
    }
}

/// Notifier that answers in the chat a command came from
pub struct ChatReply<'a> {
    service: &'a TelegramService,
    chat_id: String,
}

impl<'a> ChatReply<'a> {
    /// Reply target for `chat_id`
    pub fn new(service: &'a TelegramService, chat_id: i64) -> Self {
        Self {
            service,
            chat_id: chat_id.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl Notifier for ChatReply<'_> {
    async fn send_message(&self, text: &str) -> Result<(), NotificationError> {
        self.service.send_to(&self.chat_id, text, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_messages_have_no_keyboard() {
        let body = message_body("555", "hola", None);
        assert_eq!(body["chat_id"], "555");
        assert_eq!(body["text"], "hola");
        assert!(body.get("reply_markup").is_none());
    }

    #[test]
    fn slot_offers_carry_a_book_button() {
        let body = message_body("555", "🎾 Turno disponible", Some("2026-10-19-12-18:00"));
        let button = &body["reply_markup"]["inline_keyboard"][0][0];
        assert_eq!(button["callback_data"], "book_2026-10-19-12-18:00");
        assert_eq!(button["text"], "📅 Reservar este turno");

        let pressed = BotCommand::from_callback(button["callback_data"].as_str().unwrap());
        assert_eq!(pressed, Some(BotCommand::BookSlot("2026-10-19-12-18:00".to_string())));
    }

    #[test]
    fn oversized_slot_ids_are_sent_without_a_button() {
        let court = "x".repeat(CALLBACK_DATA_LIMIT);
        let slot_id = format!("2026-10-19-{}-18:00", court);
        let body = message_body("555", "🎾 Turno disponible", Some(&slot_id));
        assert_eq!(body["text"], "🎾 Turno disponible");
        assert!(body.get("reply_markup").is_none());
    }

    #[test]
    fn only_the_configured_chat_is_authorized() {
        let service = TelegramService::with_api_base("http://127.0.0.1:9/botX", "-1001234").unwrap();
        assert!(service.is_authorized(-1001234));
        assert!(!service.is_authorized(1234));
    }

    #[tokio::test]
    async fn unreachable_api_is_a_transport_error() {
        let service = TelegramService::with_api_base("http://127.0.0.1:9/botX", "555").unwrap();

        assert!(matches!(
            service.send_message("hola").await,
            Err(NotificationError::Transport(_))
        ));
        assert!(matches!(
            service.get_updates(None, 0).await,
            Err(NotificationError::Transport(_))
        ));
    }
}
