//! Notification channel: delivery gateway contract, Telegram adapter and
//! inbound reply decoding.
//!
//! The lifecycle engine only sees [`DeliveryGateway`]; everything
//! channel-specific (HTTP, message ids, button payloads) stays behind it.

pub mod inbound;
pub mod rate_limit;
pub mod telegram;
pub mod traits;

pub use inbound::{Answer, InboundCommand, InboundReply};
pub use telegram::TelegramGateway;
pub use traits::{
    ChannelInboundMessage, DeliveryGateway, InboundSource, MessageHandle, ParseMode, SendOptions,
};
