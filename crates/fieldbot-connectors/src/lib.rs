//! Chat transport for FieldBot.
//!
//! A thin Telegram Bot API client: long-poll `getUpdates`, text replies,
//! workbook delivery through `sendDocument`, and photo downloads through
//! `getFile`. Every error is reported with the bot token masked.

pub mod telegram;
pub mod types;

pub use telegram::TelegramBot;
pub use types::*;
