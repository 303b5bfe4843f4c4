//! Telegram Bot HTTP API gateway.
//!
//! Outbound calls go through `sendMessage`, `editMessageText` and
//! `deleteMessage`; inbound replies arrive through a `getUpdates` long-poll
//! loop. HTTP 429 (or a body carrying `error_code: 429`) is surfaced as
//! [`DeliveryError::RateLimited`] with the server's `retry_after` hint.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::channels::rate_limit::RateLimiter;
use crate::channels::traits::{
    ChannelInboundMessage, DeliveryGateway, InboundSource, MessageHandle, SendOptions,
};
use crate::config::TelegramConfig;
use crate::error::DeliveryError;

const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(5);
const POLL_RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    error_code: Option<u16>,
    description: Option<String>,
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    retry_after: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<Message>,
    callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Deserialize)]
struct Message {
    message_id: i64,
    from: Option<User>,
    chat: Chat,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct User {
    #[serde(default)]
    is_bot: bool,
    username: Option<String>,
    #[serde(default)]
    first_name: String,
    last_name: Option<String>,
}

impl User {
    fn display_name(&self) -> String {
        if let Some(username) = self.username.as_deref().filter(|u| !u.is_empty()) {
            return username.to_owned();
        }
        match self.last_name.as_deref().filter(|l| !l.is_empty()) {
            Some(last) => format!("{} {last}", self.first_name),
            None => self.first_name.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    id: String,
    from: User,
    message: Option<Message>,
    data: Option<String>,
}

/// One `getUpdates` result after chat/bot filtering.
#[derive(Debug, Default)]
pub struct UpdateBatch {
    pub messages: Vec<ChannelInboundMessage>,
    /// Offset acknowledging everything in this batch, if it was non-empty.
    pub next_offset: Option<i64>,
}

/// Telegram Bot API adapter.
pub struct TelegramGateway {
    api_base: String,
    bot_token: String,
    chat_id: String,
    poll_timeout: Duration,
    client: reqwest::Client,
    limiter: Mutex<RateLimiter>,
}

impl TelegramGateway {
    /// Every call is bounded by `request_timeout_secs`, except `getUpdates`
    /// which waits for the long poll plus a margin.
    pub fn new(config: &TelegramConfig) -> Self {
        Self {
            api_base: config.api_base.trim_end_matches('/').to_owned(),
            bot_token: config.bot_token.clone(),
            chat_id: config.chat_id.clone(),
            poll_timeout: Duration::from_secs(config.poll_timeout_secs),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.request_timeout_secs))
                .build()
                .unwrap_or_default(),
            limiter: Mutex::new(RateLimiter::new(config.max_messages_per_minute)),
        }
    }

    /// Chat id replies are accepted from.
    #[must_use]
    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &serde_json::Value,
        timeout: Option<Duration>,
    ) -> Result<T, DeliveryError> {
        if self.bot_token.trim().is_empty() {
            return Err(DeliveryError::Failed("telegram bot token is empty".to_owned()));
        }

        let url = format!("{}/bot{}/{method}", self.api_base, self.bot_token);
        let mut request = self.client.post(&url).json(body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        let response = request
            .send()
            .await
            .map_err(|e| DeliveryError::Failed(format!("{method}: {}", e.without_url())))?;

        let status = response.status();
        let header_retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let text = response
            .text()
            .await
            .map_err(|e| DeliveryError::Failed(format!("{method}: {}", e.without_url())))?;
        let parsed = serde_json::from_str::<ApiResponse<T>>(&text).ok();

        let rate_limited = status == reqwest::StatusCode::TOO_MANY_REQUESTS
            || parsed.as_ref().and_then(|r| r.error_code) == Some(429);
        if rate_limited {
            let retry_after = parsed
                .as_ref()
                .and_then(|r| r.parameters.as_ref())
                .and_then(|p| p.retry_after)
                .or(header_retry_after)
                .map(Duration::from_secs);
            return Err(DeliveryError::RateLimited { retry_after });
        }

        match parsed {
            Some(ApiResponse {
                ok: true,
                result: Some(result),
                ..
            }) if status.is_success() => Ok(result),
            Some(response) => Err(DeliveryError::Failed(format!(
                "{method} failed ({status}): {}",
                response.description.unwrap_or_else(|| "no description".to_owned())
            ))),
            None => Err(DeliveryError::Failed(format!(
                "{method} failed ({status}): {text}"
            ))),
        }
    }

    /// Fetch one batch of updates, keeping only the configured chat.
    pub async fn poll_updates(&self, offset: Option<i64>) -> Result<UpdateBatch, DeliveryError> {
        let mut body = serde_json::json!({
            "timeout": self.poll_timeout.as_secs(),
            "allowed_updates": ["message", "callback_query"],
        });
        if let Some(offset) = offset {
            body["offset"] = serde_json::json!(offset);
        }

        let updates: Vec<Update> = self
            .call(
                "getUpdates",
                &body,
                Some(self.poll_timeout + Duration::from_secs(10)),
            )
            .await?;

        let mut batch = UpdateBatch::default();
        for update in updates {
            batch.next_offset = Some(update.update_id + 1);
            if let Some(message) = self.inbound_from(update) {
                batch.messages.push(message);
            }
        }
        Ok(batch)
    }

    fn inbound_from(&self, update: Update) -> Option<ChannelInboundMessage> {
        if let Some(query) = update.callback_query {
            let message = query.message?;
            if !self.is_own_chat(message.chat.id) || query.from.is_bot {
                return None;
            }
            return Some(ChannelInboundMessage {
                channel: self.id().to_owned(),
                sender: query.from.display_name(),
                message_id: message.message_id,
                text: query.data.unwrap_or_default(),
                callback_id: Some(query.id),
            });
        }

        let message = update.message?;
        if !self.is_own_chat(message.chat.id) {
            debug!(chat_id = message.chat.id, "ignoring message from foreign chat");
            return None;
        }
        let from = message.from?;
        let text = message.text?.trim().to_owned();
        if from.is_bot || text.is_empty() {
            return None;
        }
        Some(ChannelInboundMessage {
            channel: self.id().to_owned(),
            sender: from.display_name(),
            message_id: message.message_id,
            text,
            callback_id: None,
        })
    }

    fn is_own_chat(&self, chat_id: i64) -> bool {
        self.chat_id.trim() == chat_id.to_string()
    }

    /// Acknowledge a button press so the client stops its spinner.
    pub async fn answer_callback(&self, callback_id: &str, text: &str) -> Result<(), DeliveryError> {
        let body = serde_json::json!({ "callback_query_id": callback_id, "text": text });
        self.call::<serde_json::Value>("answerCallbackQuery", &body, None)
            .await
            .map(|_| ())
    }

    /// Best-effort probe of the bot token.
    pub async fn health_check(&self) -> bool {
        self.call::<serde_json::Value>("getMe", &serde_json::json!({}), None)
            .await
            .is_ok()
    }
}

#[async_trait]
impl DeliveryGateway for TelegramGateway {
    fn id(&self) -> &'static str {
        "telegram"
    }

    async fn send(
        &self,
        channel: &str,
        text: &str,
        options: &SendOptions,
    ) -> Result<MessageHandle, DeliveryError> {
        self.limiter
            .lock()
            .map_err(|_| DeliveryError::Failed("rate limiter lock poisoned".to_owned()))?
            .try_send()?;

        let mut body = serde_json::json!({ "chat_id": channel, "text": text });
        if let Some(mode) = options.parse_mode {
            body["parse_mode"] = serde_json::json!(mode.as_str());
        }
        if let Some(reply_to) = options.reply_to {
            body["reply_to_message_id"] = serde_json::json!(reply_to);
        }
        if options.disable_notification {
            body["disable_notification"] = serde_json::json!(true);
        }
        if let Some(task_id) = &options.ack_buttons {
            body["reply_markup"] = serde_json::json!({
                "inline_keyboard": [[
                    { "text": format!("✅ Yes {task_id}"), "callback_data": format!("yes_{task_id}") },
                    { "text": format!("❌ No {task_id}"), "callback_data": format!("no_{task_id}") },
                ]]
            });
        }

        let sent: SentMessage = self.call("sendMessage", &body, None).await?;
        Ok(MessageHandle {
            channel: channel.to_owned(),
            message_id: sent.message_id,
        })
    }

    async fn edit(&self, channel: &str, message_id: i64, text: &str) -> Result<(), DeliveryError> {
        let body = serde_json::json!({
            "chat_id": channel,
            "message_id": message_id,
            "text": text,
            "parse_mode": "Markdown",
        });
        self.call::<serde_json::Value>("editMessageText", &body, None)
            .await
            .map(|_| ())
    }

    async fn delete(&self, channel: &str, message_id: i64) -> Result<(), DeliveryError> {
        let body = serde_json::json!({ "chat_id": channel, "message_id": message_id });
        self.call::<serde_json::Value>("deleteMessage", &body, None)
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl InboundSource for TelegramGateway {
    async fn run(
        &self,
        inbound_tx: mpsc::Sender<ChannelInboundMessage>,
        cancel: CancellationToken,
    ) -> Result<(), DeliveryError> {
        let mut offset = None;
        loop {
            let polled = tokio::select! {
                () = cancel.cancelled() => return Ok(()),
                polled = self.poll_updates(offset) => polled,
            };

            let backoff = match polled {
                Ok(batch) => {
                    if batch.next_offset.is_some() {
                        offset = batch.next_offset;
                    }
                    for message in batch.messages {
                        if inbound_tx.send(message).await.is_err() {
                            debug!("inbound receiver dropped, stopping telegram poll loop");
                            return Ok(());
                        }
                    }
                    continue;
                }
                Err(DeliveryError::RateLimited { retry_after }) => {
                    let wait = retry_after.unwrap_or(POLL_RATE_LIMIT_BACKOFF);
                    warn!(wait_secs = wait.as_secs(), "telegram polling rate limited");
                    wait
                }
                Err(e) => {
                    warn!(error = %e, "telegram polling failed");
                    POLL_ERROR_BACKOFF
                }
            };

            tokio::select! {
                () = cancel.cancelled() => return Ok(()),
                () = tokio::time::sleep(backoff) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn gateway() -> TelegramGateway {
        TelegramGateway::new(&TelegramConfig {
            bot_token: "t".to_owned(),
            chat_id: "-100".to_owned(),
            ..TelegramConfig::default()
        })
    }

    fn update(json: serde_json::Value) -> Update {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn display_name_prefers_username() {
        let user: User = serde_json::from_value(serde_json::json!({
            "is_bot": false, "first_name": "Ada", "last_name": "L", "username": "ada"
        }))
        .unwrap();
        assert_eq!(user.display_name(), "ada");

        let user: User = serde_json::from_value(serde_json::json!({
            "first_name": "Ada", "last_name": "Lovelace"
        }))
        .unwrap();
        assert_eq!(user.display_name(), "Ada Lovelace");
    }

    #[test]
    fn text_messages_are_filtered_by_chat_and_sender() {
        let gw = gateway();
        let own = update(serde_json::json!({
            "update_id": 1,
            "message": {
                "message_id": 10, "chat": { "id": -100 }, "text": " Task-T1: yes ",
                "from": { "is_bot": false, "first_name": "Bo", "username": "bo" }
            }
        }));
        let inbound = gw.inbound_from(own).unwrap();
        assert_eq!(inbound.text, "Task-T1: yes");
        assert_eq!(inbound.sender, "bo");
        assert!(inbound.callback_id.is_none());

        let foreign = update(serde_json::json!({
            "update_id": 2,
            "message": {
                "message_id": 11, "chat": { "id": 5 }, "text": "Task-T1: yes",
                "from": { "is_bot": false, "first_name": "Eve" }
            }
        }));
        assert!(gw.inbound_from(foreign).is_none());

        let bot = update(serde_json::json!({
            "update_id": 3,
            "message": {
                "message_id": 12, "chat": { "id": -100 }, "text": "Task-T1: yes",
                "from": { "is_bot": true, "first_name": "Bot" }
            }
        }));
        assert!(gw.inbound_from(bot).is_none());
    }

    #[test]
    fn callback_queries_carry_data_and_original_message() {
        let gw = gateway();
        let pressed = update(serde_json::json!({
            "update_id": 4,
            "callback_query": {
                "id": "cb-9",
                "from": { "first_name": "Cy" },
                "data": "no_T2",
                "message": { "message_id": 77, "chat": { "id": -100 } }
            }
        }));
        let inbound = gw.inbound_from(pressed).unwrap();
        assert_eq!(inbound.callback_id.as_deref(), Some("cb-9"));
        assert_eq!(inbound.message_id, 77);
        assert_eq!(inbound.text, "no_T2");
    }
}
