//! Bot commands: /start, /settings, /getchatid, /help.

use crate::relay::engine::RelayBot;
use crate::relay::menu::settings_keyboard;
use crate::relay::router::{CommandHandler, CommandRouter, HandlerFuture, RouterError};
use crate::relay::storage::{Settings, StoreError};
use crate::relay::telegram::{CommandInfo, SendOptions};
use crate::relay::update::IncomingMessage;

pub const NOT_CONFIGURED_TEXT: &str = "Please configure the bot with /settings first";

/// Register every command in menu order. Returns the published command list.
pub fn register_all(router: &mut CommandRouter<RelayBot>) -> Result<Vec<CommandInfo>, RouterError> {
    let table: [(&str, &str, CommandHandler<RelayBot>); 4] = [
        ("start", "start use bot", cmd_start),
        ("settings", "admin change settings", cmd_settings),
        ("getchatid", "get chat id", cmd_get_chat_id),
        ("help", "show available commands", cmd_help),
    ];

    let mut commands = Vec::with_capacity(table.len());
    for (name, description, handler) in table {
        router.register(name, handler)?;
        commands.push(CommandInfo {
            command: name.to_string(),
            description: description.to_string(),
        });
    }
    Ok(commands)
}

/// Settings, or defaults when none have been saved yet.
fn settings_or_default(bot: &RelayBot) -> Result<Settings, StoreError> {
    match bot.storage().get_settings() {
        Err(StoreError::SettingsNotFound) => Ok(Settings::default()),
        other => other,
    }
}

fn cmd_start<'a>(bot: &'a RelayBot, msg: &'a IncomingMessage) -> HandlerFuture<'a> {
    Box::pin(async move {
        let settings = match bot.storage().get_settings() {
            Ok(settings) => settings,
            Err(StoreError::SettingsNotFound) => {
                bot.messenger()
                    .send_message(msg.chat_id, NOT_CONFIGURED_TEXT, SendOptions::default())
                    .await?;
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        for text in [&settings.bot_info, &settings.welcome_words] {
            if !text.is_empty() {
                bot.messenger().send_message(msg.chat_id, text, SendOptions::default()).await?;
            }
        }
        Ok(())
    })
}

fn cmd_settings<'a>(bot: &'a RelayBot, msg: &'a IncomingMessage) -> HandlerFuture<'a> {
    Box::pin(async move {
        if !bot.is_admin(msg.sender_id()) {
            return Ok(());
        }
        let settings = settings_or_default(bot)?;
        bot.messenger()
            .send_message(
                msg.chat_id,
                &format!("change settings\n{settings}"),
                SendOptions::markup(settings_keyboard()),
            )
            .await?;
        Ok(())
    })
}

fn cmd_get_chat_id<'a>(bot: &'a RelayBot, msg: &'a IncomingMessage) -> HandlerFuture<'a> {
    Box::pin(async move {
        if !bot.is_admin(msg.sender_id()) {
            return Ok(());
        }
        bot.messenger()
            .send_message(msg.chat_id, &msg.chat_id.to_string(), SendOptions::default())
            .await?;
        Ok(())
    })
}

fn cmd_help<'a>(bot: &'a RelayBot, msg: &'a IncomingMessage) -> HandlerFuture<'a> {
    Box::pin(async move {
        let settings = settings_or_default(bot)?;
        let text = help_text(&settings.bot_info, bot.commands());
        bot.messenger().send_message(msg.chat_id, &text, SendOptions::default()).await?;
        Ok(())
    })
}

fn help_text(description: &str, commands: &[CommandInfo]) -> String {
    let lines: Vec<String> = commands
        .iter()
        .map(|c| format!("/{} {}", c.command, c.description))
        .collect();
    if description.is_empty() {
        lines.join("\n")
    } else {
        format!("{}\n{}", description, lines.join("\n"))
    }
}
