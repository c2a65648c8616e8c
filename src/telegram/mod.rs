pub mod client;
pub mod init_data;
pub mod types;

pub use client::{BotApi, TelegramClient};
