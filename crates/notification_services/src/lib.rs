//! # Notification Services
//!
//! This crate delivers monitor notices through the Telegram Bot API.
//! It includes the outbound [`TelegramService`], inbound update polling and
//! parsing of the bot's chat commands.

/// Telegram client and [`court_scan::Notifier`] implementations.
pub mod service;
/// Telegram API payloads and chat commands.
pub mod types;

pub use service::{ChatReply, TelegramService};
pub use types::{BotCommand, HELP_TEXT, InboundCommand, Update};
