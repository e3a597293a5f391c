//! Inbound events decoded from webhook payloads.
//!
//! Telegram types are converted once at the edge so the relay workflow only
//! deals with the handful of fields it needs.

use chrono::{DateTime, Utc};
use teloxide::types::{CallbackQuery, Message, Update, UpdateKind, User};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatKind {
    Private,
    Group,
    Supergroup,
    Channel,
}

impl ChatKind {
    pub fn is_group(self) -> bool {
        matches!(self, ChatKind::Group | ChatKind::Supergroup)
    }
}

#[derive(Debug, Clone)]
pub struct Sender {
    pub id: u64,
    pub is_bot: bool,
    pub username: Option<String>,
    pub first_name: String,
}

impl Sender {
    /// Username, else first name, else `@{id}`.
    pub fn display_name(&self) -> String {
        match self.username.as_deref() {
            Some(u) if !u.is_empty() => u.to_string(),
            _ if !self.first_name.is_empty() => self.first_name.clone(),
            _ => format!("@{}", self.id),
        }
    }

    fn from_user(user: &User) -> Self {
        Self {
            id: user.id.0,
            is_bot: user.is_bot,
            username: user.username.clone(),
            first_name: user.first_name.clone(),
        }
    }
}

/// The message an incoming message replies to.
#[derive(Debug, Clone)]
pub struct RepliedMessage {
    pub message_id: i32,
    pub from_bot: bool,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub message_id: i32,
    pub chat_id: i64,
    pub chat_kind: ChatKind,
    pub from: Option<Sender>,
    pub text: String,
    pub date: DateTime<Utc>,
    pub reply_to: Option<RepliedMessage>,
    /// Service message about members joining or leaving.
    pub membership_change: bool,
}

impl IncomingMessage {
    pub fn from_telegram(msg: &Message) -> Self {
        let chat_kind = if msg.chat.is_private() {
            ChatKind::Private
        } else if msg.chat.is_supergroup() {
            ChatKind::Supergroup
        } else if msg.chat.is_group() {
            ChatKind::Group
        } else {
            ChatKind::Channel
        };

        let reply_to = msg.reply_to_message().map(|reply| RepliedMessage {
            message_id: reply.id.0,
            from_bot: reply.from.as_ref().is_some_and(|u| u.is_bot),
            text: reply.text().unwrap_or("").to_string(),
        });

        Self {
            message_id: msg.id.0,
            chat_id: msg.chat.id.0,
            chat_kind,
            from: msg.from.as_ref().map(Sender::from_user),
            text: msg.text().unwrap_or("").to_string(),
            date: msg.date,
            reply_to,
            membership_change: msg.new_chat_members().is_some() || msg.left_chat_member().is_some(),
        }
    }

    /// Command name if the text starts with `/`, without any `@botname` suffix.
    pub fn command(&self) -> Option<&str> {
        let first = self.text.split_whitespace().next()?;
        let name = first.strip_prefix('/')?;
        let name = name.split('@').next().unwrap_or(name);
        if name.is_empty() { None } else { Some(name) }
    }

    pub fn sender_id(&self) -> Option<u64> {
        self.from.as_ref().map(|s| s.id)
    }
}

/// Message the pressed button was attached to.
#[derive(Debug, Clone, Copy)]
pub struct CallbackOrigin {
    pub chat_id: i64,
    pub message_id: i32,
}

#[derive(Debug, Clone)]
pub struct IncomingCallback {
    pub id: String,
    pub from: Sender,
    pub data: String,
    pub message: Option<CallbackOrigin>,
}

impl IncomingCallback {
    pub fn from_telegram(query: &CallbackQuery) -> Self {
        Self {
            id: query.id.0.clone(),
            from: Sender::from_user(&query.from),
            data: query.data.clone().unwrap_or_default(),
            message: query.message.as_ref().map(|m| CallbackOrigin {
                chat_id: m.chat().id.0,
                message_id: m.id().0,
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Event {
    Message(IncomingMessage),
    Callback(IncomingCallback),
    /// Undecodable or irrelevant update.
    Empty,
}

impl Event {
    /// Decode a webhook body. Malformed payloads become `Event::Empty`.
    pub fn decode(body: &[u8]) -> Self {
        match serde_json::from_slice::<Update>(body) {
            Ok(update) => Self::from_update(update),
            Err(_) => Event::Empty,
        }
    }

    pub fn from_update(update: Update) -> Self {
        match update.kind {
            UpdateKind::Message(msg) => Event::Message(IncomingMessage::from_telegram(&msg)),
            UpdateKind::CallbackQuery(query) => Event::Callback(IncomingCallback::from_telegram(&query)),
            _ => Event::Empty,
        }
    }

    /// Events from bots, membership service messages and anonymous posts are
    /// dropped before dispatch.
    pub fn is_ignored(&self) -> bool {
        match self {
            Event::Message(msg) => match &msg.from {
                Some(sender) => sender.is_bot || msg.membership_change,
                None => true,
            },
            Event::Callback(query) => query.from.is_bot,
            Event::Empty => true,
        }
    }
}
