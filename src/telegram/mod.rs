mod client;
pub mod formatter;
mod handler;

pub use client::TelegramClient;
pub use handler::{AppState, run_bot};
