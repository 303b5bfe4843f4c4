use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::DeliveryError;

/// Message formatting understood by the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    Markdown,
    Html,
}

impl ParseMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Markdown => "Markdown",
            Self::Html => "HTML",
        }
    }
}

/// Per-send options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendOptions {
    pub parse_mode: Option<ParseMode>,
    /// Message id this send replies to.
    pub reply_to: Option<i64>,
    pub disable_notification: bool,
    /// Attach yes/no buttons acknowledging this task id.
    pub ack_buttons: Option<String>,
}

impl SendOptions {
    #[must_use]
    pub fn markdown() -> Self {
        Self {
            parse_mode: Some(ParseMode::Markdown),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_ack_buttons(mut self, task_id: impl Into<String>) -> Self {
        self.ack_buttons = Some(task_id.into());
        self
    }
}

/// Reference to a delivered message, used for later edits and deletes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHandle {
    pub channel: String,
    pub message_id: i64,
}

/// Inbound message received from the notification channel.
#[derive(Debug, Clone)]
pub struct ChannelInboundMessage {
    pub channel: String,
    pub sender: String,
    /// The received message, or for button presses the message carrying the buttons.
    pub message_id: i64,
    pub text: String,
    /// Set when the message is a button press rather than typed text.
    pub callback_id: Option<String>,
}

/// Outbound side of the notification channel.
///
/// Every call may fail with [`DeliveryError::RateLimited`], which callers
/// treat differently from any other failure.
#[async_trait]
pub trait DeliveryGateway: Send + Sync {
    /// Stable channel identifier (e.g. `telegram`).
    fn id(&self) -> &'static str;

    async fn send(
        &self,
        channel: &str,
        text: &str,
        options: &SendOptions,
    ) -> Result<MessageHandle, DeliveryError>;

    async fn edit(&self, channel: &str, message_id: i64, text: &str) -> Result<(), DeliveryError>;

    async fn delete(&self, channel: &str, message_id: i64) -> Result<(), DeliveryError>;
}

/// Inbound side of the notification channel.
#[async_trait]
pub trait InboundSource: Send + Sync {
    /// Receive messages and forward them until `cancel` fires.
    async fn run(
        &self,
        inbound_tx: mpsc::Sender<ChannelInboundMessage>,
        cancel: CancellationToken,
    ) -> Result<(), DeliveryError>;
}
