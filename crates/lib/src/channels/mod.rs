//! Messaging platform channels.
//!
//! The `Platform` trait is the seam the relay polls and sends through; Telegram is the
//! built-in implementation. Inbound messages flow to the dispatch worker through a bounded queue.

mod inbound;
mod platform;
mod telegram;

pub use inbound::InboundMessage;
pub use platform::{Platform, SendError};
pub use telegram::{send_message_body, TelegramPlatform};
