//! The admin settings menu: inline buttons, edit prompts and field updates.
//!
//! Edit prompts are matched by exact text when the admin replies to them, so
//! the prompt strings double as the conversation state.

use crate::relay::error::RelayError;
use crate::relay::storage::Settings;
use crate::relay::telegram::{Button, Markup};

/// A settings field editable through the menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingField {
    WelcomeWords,
    BotInfo,
    Thanks,
    ForwardToChatId,
}

impl SettingField {
    pub const ALL: [SettingField; 4] = [
        SettingField::WelcomeWords,
        SettingField::BotInfo,
        SettingField::Thanks,
        SettingField::ForwardToChatId,
    ];

    pub fn callback_data(self) -> &'static str {
        match self {
            SettingField::WelcomeWords => "change_welcome_words",
            SettingField::BotInfo => "change_bot_info",
            SettingField::Thanks => "change_thanks",
            SettingField::ForwardToChatId => "change_forward_to_chat_id",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SettingField::WelcomeWords => "change welcome words",
            SettingField::BotInfo => "change bot info",
            SettingField::Thanks => "change thanks words",
            SettingField::ForwardToChatId => "change forward to chat id",
        }
    }

    /// Prompt text sent to the admin; a reply to it edits this field.
    pub fn prompt(self) -> &'static str {
        match self {
            SettingField::WelcomeWords => "change welcome words:",
            SettingField::BotInfo => "change bot info:",
            SettingField::Thanks => "change thanks words:",
            SettingField::ForwardToChatId => "change forward to chat id:",
        }
    }

    pub fn from_prompt(text: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.prompt() == text)
    }

    /// Write `value` into the matching field of `settings`.
    pub fn apply(self, settings: &mut Settings, value: &str) -> Result<(), RelayError> {
        match self {
            SettingField::WelcomeWords => settings.welcome_words = value.to_string(),
            SettingField::BotInfo => settings.bot_info = value.to_string(),
            SettingField::Thanks => settings.thanks = value.to_string(),
            SettingField::ForwardToChatId => {
                settings.forward_to_chat_id = value
                    .trim()
                    .parse::<i64>()
                    .map_err(|_| RelayError::InvalidChatId(value.to_string()))?;
            }
        }
        Ok(())
    }
}

const DONE_DATA: &str = "change_done";

/// A pressed settings-menu button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    Edit(SettingField),
    Done,
}

impl MenuAction {
    /// Parse button data, with or without a leading `/`.
    pub fn parse(data: &str) -> Option<Self> {
        let data = data.strip_prefix('/').unwrap_or(data);
        if data == DONE_DATA {
            return Some(MenuAction::Done);
        }
        SettingField::ALL
            .into_iter()
            .find(|f| f.callback_data() == data)
            .map(MenuAction::Edit)
    }
}

/// One button per row: the four edit buttons, then "done".
pub fn settings_keyboard() -> Markup {
    let mut rows: Vec<Vec<Button>> = SettingField::ALL
        .into_iter()
        .map(|f| {
            vec![Button {
                text: f.label().to_string(),
                data: f.callback_data().to_string(),
            }]
        })
        .collect();
    rows.push(vec![Button {
        text: "done".to_string(),
        data: DONE_DATA.to_string(),
    }]);
    Markup::Keyboard(rows)
}
