//! Relay engine - forwards private messages to the staff chat and routes
//! staff replies back to the original sender.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::relay::commands;
use crate::relay::error::{HandleError, RelayError};
use crate::relay::menu::{MenuAction, SettingField, settings_keyboard};
use crate::relay::router::{CommandRouter, RouterError};
use crate::relay::storage::{NewMessage, Settings, StoreError, Storage};
use crate::relay::telegram::{CommandInfo, Markup, Messenger, SendError, SendOptions};
use crate::relay::update::{ChatKind, Event, IncomingCallback, IncomingMessage};

pub const FORWARD_FAILED_TEXT: &str = "forward failed...try again?";
pub const SOURCE_NOT_FOUND_TEXT: &str = "can not found source message";
pub const REPLY_FAILED_TEXT: &str = "reply message failed";

/// Webhook connection limit requested from Telegram.
const WEBHOOK_MAX_CONNECTIONS: u8 = 20;

/// Last known forward destination.
///
/// Read on every private message to decide whether to relay at all; refreshed
/// from the store before each relay and after every settings write.
#[derive(Debug, Default)]
pub struct ForwardTarget(AtomicI64);

impl ForwardTarget {
    pub fn get(&self) -> i64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn set(&self, chat_id: i64) {
        self.0.store(chat_id, Ordering::Relaxed);
    }
}

/// The relay bot.
pub struct RelayBot {
    messenger: Arc<dyn Messenger>,
    storage: Arc<Storage>,
    admin_id: u64,
    router: CommandRouter<RelayBot>,
    commands: Vec<CommandInfo>,
    forward_target: ForwardTarget,
}

impl RelayBot {
    /// Build the bot and register its commands.
    ///
    /// Fails if a command name is registered twice.
    pub fn new(messenger: Arc<dyn Messenger>, storage: Arc<Storage>, admin_id: u64) -> Result<Self, RouterError> {
        let mut router = CommandRouter::new();
        let commands = commands::register_all(&mut router)?;

        let forward_target = ForwardTarget::default();
        match storage.get_settings() {
            Ok(settings) => forward_target.set(settings.forward_to_chat_id),
            Err(e) => warn!("need set settings: {e}"),
        }

        Ok(Self {
            messenger,
            storage,
            admin_id,
            router,
            commands,
            forward_target,
        })
    }

    pub fn messenger(&self) -> &dyn Messenger {
        self.messenger.as_ref()
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn commands(&self) -> &[CommandInfo] {
        &self.commands
    }

    pub fn forward_target(&self) -> i64 {
        self.forward_target.get()
    }

    pub fn is_admin(&self, user_id: Option<u64>) -> bool {
        user_id == Some(self.admin_id)
    }

    /// Publish the command list to the platform's command menu.
    pub async fn publish_commands(&self) {
        if let Err(e) = self.messenger.set_commands(&self.commands).await {
            warn!("failed to register bot commands: {e}");
        }
    }

    /// Install the webhook unless one is already set.
    pub async fn ensure_webhook(&self, url: &str) -> Result<(), SendError> {
        let status = self.messenger.webhook_status().await?;
        if let Some(ref last_error) = status.last_error {
            info!(last_error = %last_error, "Telegram callback failed");
        }
        if status.url.as_deref().is_some_and(|u| !u.is_empty()) {
            debug!("webhook already set");
            return Ok(());
        }
        self.messenger.set_webhook(url, WEBHOOK_MAX_CONNECTIONS).await?;
        info!("set webhook success");
        Ok(())
    }

    /// Delete relayed ledger records past the retention window.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        self.storage.purge_expired(now)
    }

    // ==================== DISPATCH ====================

    /// Handle one inbound event.
    pub async fn handle_event(&self, event: Event) -> Result<(), HandleError> {
        if event.is_ignored() {
            debug!("ignoring event: {event:?}");
            return Ok(());
        }

        match event {
            Event::Callback(query) => self.handle_callback(&query).await?,
            Event::Message(msg) => {
                if let Some(name) = msg.command() {
                    self.router.dispatch(name, self, &msg).await?;
                } else {
                    self.handle_plain_message(&msg).await?;
                }
            }
            Event::Empty => {}
        }
        Ok(())
    }

    async fn handle_plain_message(&self, msg: &IncomingMessage) -> Result<(), RelayError> {
        if self.try_settings_edit(msg).await? {
            return Ok(());
        }

        if msg.chat_kind == ChatKind::Private {
            if self.forward_target.get() != 0 {
                self.forward(msg).await?;
            }
        } else if msg.chat_kind.is_group() && msg.reply_to.is_some() {
            self.reply(msg).await?;
        }
        Ok(())
    }

    // ==================== FORWARD / REPLY ====================

    async fn forward(&self, msg: &IncomingMessage) -> Result<(), RelayError> {
        let Some(ref sender) = msg.from else {
            return Ok(());
        };

        let record = NewMessage {
            username: sender.display_name(),
            user_id: sender.id as i64,
            chat_id: msg.chat_id,
            message_id: msg.message_id,
            created_at: msg.date,
        };
        let record_id = match self.storage.create_message(&record) {
            Ok(id) => id,
            Err(e) => {
                self.notify(msg.chat_id, FORWARD_FAILED_TEXT).await;
                return Err(e.into());
            }
        };

        let settings = self.storage.get_settings()?;
        self.forward_target.set(settings.forward_to_chat_id);
        let destination = settings.forward_to_chat_id;
        if destination == 0 {
            return Err(RelayError::NoDestination);
        }

        let forward_id = match self
            .messenger
            .forward_message(destination, msg.chat_id, msg.message_id)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                error!(
                    forward_to = destination,
                    origin_chat = msg.chat_id,
                    message_id = msg.message_id,
                    "relay failed: {e}"
                );
                return Err(e.into());
            }
        };

        if let Err(e) = self.storage.mark_forwarded(&record_id, forward_id) {
            error!(record = %record_id, forward_id, "failed to mark message forwarded: {e}");
        }
        info!(
            "📨 Relayed msg {} from {} ({}) to {} as {}",
            msg.message_id, record.username, sender.id, destination, forward_id
        );

        if !settings.thanks.is_empty() {
            self.messenger
                .send_message(msg.chat_id, &settings.thanks, SendOptions::reply_to(msg.message_id))
                .await?;
        }
        Ok(())
    }

    async fn reply(&self, msg: &IncomingMessage) -> Result<(), RelayError> {
        let Some(ref replied) = msg.reply_to else {
            return Ok(());
        };

        let origin = match self.storage.find_by_forward_id(replied.message_id) {
            Ok(Some(origin)) => origin,
            Ok(None) => {
                debug!(forward_id = replied.message_id, "no ledger record for reply");
                self.notify(msg.chat_id, SOURCE_NOT_FOUND_TEXT).await;
                return Ok(());
            }
            Err(e) => {
                self.notify(msg.chat_id, SOURCE_NOT_FOUND_TEXT).await;
                return Err(e.into());
            }
        };

        if let Err(e) = self
            .messenger
            .send_message(origin.chat_id, &msg.text, SendOptions::default())
            .await
        {
            self.notify(msg.chat_id, REPLY_FAILED_TEXT).await;
            return Err(e.into());
        }
        info!("↩️ Routed reply from chat {} to {} ({})", msg.chat_id, origin.username, origin.chat_id);
        Ok(())
    }

    /// Best-effort notice to a chat; failures are only logged.
    async fn notify(&self, chat_id: i64, text: &str) {
        if let Err(e) = self.messenger.send_message(chat_id, text, SendOptions::default()).await {
            warn!(chat_id, "failed to send notice: {e}");
        }
    }

    // ==================== SETTINGS MENU ====================

    /// Apply an admin's reply to a settings prompt. Returns `true` when the
    /// message was consumed.
    async fn try_settings_edit(&self, msg: &IncomingMessage) -> Result<bool, RelayError> {
        if !self.is_admin(msg.sender_id()) {
            return Ok(false);
        }
        let Some(ref replied) = msg.reply_to else {
            return Ok(false);
        };
        if !replied.from_bot {
            return Ok(false);
        }
        let Some(field) = SettingField::from_prompt(&replied.text) else {
            return Ok(false);
        };

        let mut settings = match self.storage.get_settings() {
            Ok(settings) => settings,
            Err(StoreError::SettingsNotFound) => Settings::default(),
            Err(e) => {
                self.send_edit_result(msg.chat_id, &Settings::default(), Some(&e.to_string()))
                    .await;
                return Err(e.into());
            }
        };

        let result = field
            .apply(&mut settings, &msg.text)
            .and_then(|_| self.storage.save_settings(&settings).map_err(RelayError::from));

        match result {
            Ok(written) => {
                self.forward_target.set(settings.forward_to_chat_id);
                info!(field = ?field, written, "settings updated");
                self.send_edit_result(msg.chat_id, &settings, None).await;
            }
            Err(e) => {
                error!(field = ?field, "settings update failed: {e}");
                self.send_edit_result(msg.chat_id, &settings, Some(&e.to_string()))
                    .await;
            }
        }
        Ok(true)
    }

    async fn send_edit_result(&self, chat_id: i64, settings: &Settings, error: Option<&str>) {
        let text = match error {
            None => format!("update success\n{settings}"),
            Some(e) => format!("update failed\n error:{e}\n{settings}"),
        };
        if let Err(e) = self
            .messenger
            .send_message(chat_id, &text, SendOptions::markup(settings_keyboard()))
            .await
        {
            warn!(chat_id, "failed to send settings summary: {e}");
        }
    }

    async fn handle_callback(&self, query: &IncomingCallback) -> Result<(), RelayError> {
        if !self.is_admin(Some(query.from.id)) {
            debug!(user = query.from.id, "ignoring callback from non-admin");
            return Ok(());
        }
        let Some(action) = MenuAction::parse(&query.data) else {
            return Ok(());
        };

        if let Some(origin) = query.message
            && let Err(e) = self.messenger.delete_message(origin.chat_id, origin.message_id).await
        {
            warn!("failed to delete settings menu: {e}");
        }

        match action {
            MenuAction::Done => {
                self.messenger.answer_callback(&query.id, "done").await?;
            }
            MenuAction::Edit(field) => {
                let sent = self
                    .messenger
                    .send_message(query.from.id as i64, field.prompt(), SendOptions::markup(Markup::ForceReply))
                    .await;
                if let Err(e) = self.messenger.answer_callback(&query.id, "update request received").await {
                    warn!("failed to answer callback: {e}");
                }
                sent?;
            }
        }
        Ok(())
    }
}
