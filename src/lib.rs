//! Telegram relay bot: forwards user messages to a selectable catalog of
//! hosted language models and keeps a short per-user conversation history.

pub mod catalog;
pub mod config;
pub mod error;
pub mod llm;
pub mod logger;
pub mod subsystems;
