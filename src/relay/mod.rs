//! Relay module - forwards private messages to a staff chat and routes staff
//! replies back to the sender.

pub mod commands;
pub mod engine;
pub mod error;
pub mod menu;
pub mod router;
pub mod storage;
pub mod telegram;
pub mod update;
pub mod worker;


pub use engine::RelayBot;
pub use error::{HandleError, RelayError};
pub use storage::{ForwardedMessage, MessageStatus, Settings, Storage, StoreError};
pub use telegram::{Messenger, TelegramClient};
pub use update::Event;
pub use worker::spawn_workers;
