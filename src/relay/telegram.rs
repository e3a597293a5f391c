//! Telegram client using teloxide.

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{
    AllowedUpdate, BotCommand, CallbackQueryId, ForceReply, InlineKeyboardButton, InlineKeyboardMarkup, MessageId,
    ReplyParameters,
};
use thiserror::Error;
use tracing::{info, warn};

/// A failed platform call.
#[derive(Debug, Error)]
#[error("Failed to {action}: {message}")]
pub struct SendError {
    pub action: &'static str,
    pub message: String,
}

impl SendError {
    pub fn new(action: &'static str, message: impl Into<String>) -> Self {
        Self { action, message: message.into() }
    }
}

/// An inline keyboard button carrying callback data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub text: String,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Markup {
    /// Rows of inline buttons.
    Keyboard(Vec<Vec<Button>>),
    /// Ask the client to open a reply to the sent message.
    ForceReply,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendOptions {
    pub reply_to: Option<i32>,
    pub markup: Option<Markup>,
}

impl SendOptions {
    pub fn reply_to(message_id: i32) -> Self {
        Self { reply_to: Some(message_id), markup: None }
    }

    pub fn markup(markup: Markup) -> Self {
        Self { reply_to: None, markup: Some(markup) }
    }
}

/// A command published to the platform's command menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInfo {
    pub command: String,
    pub description: String,
}

#[derive(Debug, Clone, Default)]
pub struct WebhookStatus {
    /// Current webhook URL, `None` when no webhook is installed.
    pub url: Option<String>,
    pub last_error: Option<String>,
}

/// Outbound platform operations used by the relay.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Send a text message. Returns the id of the sent message.
    async fn send_message(&self, chat_id: i64, text: &str, options: SendOptions) -> Result<i32, SendError>;

    async fn delete_message(&self, chat_id: i64, message_id: i32) -> Result<(), SendError>;

    /// Forward a message. Returns the id of the copy in `to_chat_id`.
    async fn forward_message(&self, to_chat_id: i64, from_chat_id: i64, message_id: i32) -> Result<i32, SendError>;

    async fn answer_callback(&self, callback_id: &str, text: &str) -> Result<(), SendError>;

    async fn set_commands(&self, commands: &[CommandInfo]) -> Result<(), SendError>;

    async fn webhook_status(&self) -> Result<WebhookStatus, SendError>;

    async fn set_webhook(&self, url: &str, max_connections: u8) -> Result<(), SendError>;
}

/// Telegram API client.
pub struct TelegramClient {
    bot: Bot,
}

impl TelegramClient {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

fn keyboard(rows: Vec<Vec<Button>>) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(rows.into_iter().map(|row| {
        row.into_iter()
            .map(|b| InlineKeyboardButton::callback(b.text, b.data))
            .collect::<Vec<_>>()
    }))
}

#[async_trait]
impl Messenger for TelegramClient {
    async fn send_message(&self, chat_id: i64, text: &str, options: SendOptions) -> Result<i32, SendError> {
        let mut request = self.bot.send_message(ChatId(chat_id), text);

        if let Some(msg_id) = options.reply_to {
            request = request.reply_parameters(ReplyParameters::new(MessageId(msg_id)));
        }

        match options.markup {
            Some(Markup::Keyboard(rows)) => request = request.reply_markup(keyboard(rows)),
            Some(Markup::ForceReply) => request = request.reply_markup(ForceReply::new().selective()),
            None => {}
        }

        request.await.map(|msg| msg.id.0).map_err(|e| {
            let err = SendError::new("send", e.to_string());
            warn!(chat_id, "{err}");
            err
        })
    }

    async fn delete_message(&self, chat_id: i64, message_id: i32) -> Result<(), SendError> {
        info!("🗑️ Deleting message {} in chat {}", message_id, chat_id);

        self.bot
            .delete_message(ChatId(chat_id), MessageId(message_id))
            .await
            .map_err(|e| {
                let err = SendError::new("delete message", e.to_string());
                warn!("{err}");
                err
            })?;

        Ok(())
    }

    async fn forward_message(&self, to_chat_id: i64, from_chat_id: i64, message_id: i32) -> Result<i32, SendError> {
        self.bot
            .forward_message(ChatId(to_chat_id), ChatId(from_chat_id), MessageId(message_id))
            .await
            .map(|msg| msg.id.0)
            .map_err(|e| SendError::new("forward", e.to_string()))
    }

    async fn answer_callback(&self, callback_id: &str, text: &str) -> Result<(), SendError> {
        self.bot
            .answer_callback_query(CallbackQueryId(callback_id.to_string()))
            .text(text)
            .await
            .map_err(|e| SendError::new("answer callback", e.to_string()))?;
        Ok(())
    }

    async fn set_commands(&self, commands: &[CommandInfo]) -> Result<(), SendError> {
        let commands: Vec<BotCommand> = commands
            .iter()
            .map(|c| BotCommand::new(c.command.clone(), c.description.clone()))
            .collect();

        self.bot
            .set_my_commands(commands)
            .await
            .map_err(|e| SendError::new("set commands", e.to_string()))?;
        Ok(())
    }

    async fn webhook_status(&self) -> Result<WebhookStatus, SendError> {
        let info = self
            .bot
            .get_webhook_info()
            .await
            .map_err(|e| SendError::new("get webhook info", e.to_string()))?;

        Ok(WebhookStatus {
            url: info.url.map(|u| u.to_string()),
            last_error: info.last_error_message,
        })
    }

    async fn set_webhook(&self, url: &str, max_connections: u8) -> Result<(), SendError> {
        let url = reqwest::Url::parse(url).map_err(|e| SendError::new("parse webhook url", e.to_string()))?;

        self.bot
            .set_webhook(url)
            .max_connections(max_connections)
            .allowed_updates(vec![AllowedUpdate::Message, AllowedUpdate::CallbackQuery])
            .await
            .map_err(|e| SendError::new("set webhook", e.to_string()))?;
        Ok(())
    }
}
