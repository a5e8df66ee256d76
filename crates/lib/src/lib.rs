//! Bot relay core: per-bot polling workers feeding a dispatch worker, an HTTP ingress that
//! sends through a bot, and the classifier that renders outbound messages.

pub mod access;
pub mod bots;
pub mod channels;
pub mod config;
pub mod dispatch;
pub mod gateway;
pub mod init;
pub mod lifecycle;
pub mod message;
pub mod relay;
pub mod shutdown;
