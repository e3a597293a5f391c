//! Persistent SQLite store for the bot settings and the forwarded-message ledger.

use std::fmt;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Row, params};
use thiserror::Error;
use tracing::{debug, info};

/// Forwarded records older than this are purged by the housekeeping sweep.
pub const RETENTION_DAYS: i64 = 3;

const SETTINGS_KEY: &str = "setting";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("settings not found")]
    SettingsNotFound,
    #[error("message record {0} not found")]
    MessageNotFound(String),
    #[error("forward id must be non-zero")]
    InvalidForwardId,
}

/// Bot settings, a single record per deployment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    pub welcome_words: String,
    pub thanks: String,
    /// Chat that private messages are relayed to. `0` disables forwarding.
    pub forward_to_chat_id: i64,
    pub bot_info: String,
}

impl Settings {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            welcome_words: row.get(0)?,
            thanks: row.get(1)?,
            forward_to_chat_id: row.get(2)?,
            bot_info: row.get(3)?,
        })
    }

    /// Column/value pairs for every field that differs from `old`.
    fn changed_fields(&self, old: &Settings) -> Vec<(&'static str, Value)> {
        let mut updates = Vec::new();
        if old.bot_info != self.bot_info {
            updates.push(("bot_info", Value::Text(self.bot_info.clone())));
        }
        if old.welcome_words != self.welcome_words {
            updates.push(("welcome_words", Value::Text(self.welcome_words.clone())));
        }
        if old.thanks != self.thanks {
            updates.push(("thanks", Value::Text(self.thanks.clone())));
        }
        if old.forward_to_chat_id != self.forward_to_chat_id {
            updates.push(("forward_to_chat_id", Value::Integer(self.forward_to_chat_id)));
        }
        updates
    }
}

impl fmt::Display for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "bot info: {}\nwelcome words: {}\nthanks words: {}\nforward to: {}",
            self.bot_info, self.welcome_words, self.thanks, self.forward_to_chat_id
        )
    }
}

/// Relay state of a ledger record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageStatus {
    Unread,
    Forwarded,
}

impl MessageStatus {
    fn as_str(self) -> &'static str {
        match self {
            MessageStatus::Unread => "unread",
            MessageStatus::Forwarded => "forward",
        }
    }

    fn from_str(s: &str) -> Self {
        match s {
            "forward" => MessageStatus::Forwarded,
            _ => MessageStatus::Unread,
        }
    }
}

/// A user message that was (or is being) relayed to the operator chat.
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardedMessage {
    /// Store-assigned record id.
    pub id: String,
    pub username: String,
    pub user_id: i64,
    pub chat_id: i64,
    pub message_id: i32,
    pub created_at: DateTime<Utc>,
    pub status: MessageStatus,
    /// Id of the relayed copy in the operator chat, `0` until relayed.
    pub forward_id: i32,
}

impl ForwardedMessage {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let created_at: i64 = row.get(5)?;
        Ok(Self {
            id: row.get(0)?,
            username: row.get(1)?,
            user_id: row.get(2)?,
            chat_id: row.get(3)?,
            message_id: row.get(4)?,
            created_at: DateTime::from_timestamp(created_at, 0).unwrap_or_default(),
            status: MessageStatus::from_str(&row.get::<_, String>(6)?),
            forward_id: row.get(7)?,
        })
    }
}

/// Fields of a ledger record known at forward time.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub username: String,
    pub user_id: i64,
    pub chat_id: i64,
    pub message_id: i32,
    pub created_at: DateTime<Utc>,
}

pub struct Storage {
    conn: Mutex<Connection>,
}

impl Storage {
    /// Create a new in-memory store.
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn)
    }

    /// Open (or create) the store at the given path.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let storage = Self::with_connection(conn)?;
        info!("Opened store at {:?} ({} ledger records)", path, storage.message_count()?);
        Ok(storage)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                welcome_words TEXT NOT NULL,
                thanks TEXT NOT NULL,
                forward_to_chat_id INTEGER NOT NULL,
                bot_info TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                username TEXT NOT NULL,
                user_id INTEGER NOT NULL,
                chat_id INTEGER NOT NULL,
                message_id INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                status TEXT NOT NULL,
                forward_id INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_messages_forward_id ON messages(forward_id);
            CREATE INDEX IF NOT EXISTS idx_messages_status_created ON messages(status, created_at);
        "#,
        )?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ==================== SETTINGS ====================

    pub fn get_settings(&self) -> Result<Settings, StoreError> {
        let conn = self.conn();
        conn.query_row(
            "SELECT welcome_words, thanks, forward_to_chat_id, bot_info FROM settings WHERE key = ?1",
            params![SETTINGS_KEY],
            Settings::from_row,
        )
        .optional()?
        .ok_or(StoreError::SettingsNotFound)
    }

    /// Persist settings. The record is created on first save; afterwards only
    /// fields that differ from the stored record are written.
    ///
    /// Returns the number of fields written.
    pub fn save_settings(&self, settings: &Settings) -> Result<usize, StoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let old = tx
            .query_row(
                "SELECT welcome_words, thanks, forward_to_chat_id, bot_info FROM settings WHERE key = ?1",
                params![SETTINGS_KEY],
                Settings::from_row,
            )
            .optional()?;

        let written = match old {
            None => {
                tx.execute(
                    "INSERT INTO settings (key, welcome_words, thanks, forward_to_chat_id, bot_info)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        SETTINGS_KEY,
                        settings.welcome_words,
                        settings.thanks,
                        settings.forward_to_chat_id,
                        settings.bot_info
                    ],
                )?;
                info!("Created settings record");
                4
            }
            Some(old) => {
                let updates = settings.changed_fields(&old);
                for (column, value) in &updates {
                    // column names come from a fixed set in changed_fields
                    tx.execute(
                        &format!("UPDATE settings SET {column} = ?1 WHERE key = ?2"),
                        params![value, SETTINGS_KEY],
                    )?;
                }
                debug!("Updated {} settings field(s)", updates.len());
                updates.len()
            }
        };

        tx.commit()?;
        Ok(written)
    }

    // ==================== LEDGER ====================

    /// Record a user message as `unread`. Returns the new record id.
    pub fn create_message(&self, msg: &NewMessage) -> Result<String, StoreError> {
        let id = uuid::Uuid::new_v4().to_string();
        self.conn().execute(
            "INSERT INTO messages (id, username, user_id, chat_id, message_id, created_at, status, forward_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0)",
            params![
                id,
                msg.username,
                msg.user_id,
                msg.chat_id,
                msg.message_id,
                msg.created_at.timestamp(),
                MessageStatus::Unread.as_str()
            ],
        )?;
        Ok(id)
    }

    /// Mark a record as relayed, storing the id of the relayed copy.
    pub fn mark_forwarded(&self, id: &str, forward_id: i32) -> Result<(), StoreError> {
        if forward_id == 0 {
            return Err(StoreError::InvalidForwardId);
        }
        let updated = self.conn().execute(
            "UPDATE messages SET forward_id = ?1, status = ?2 WHERE id = ?3",
            params![forward_id, MessageStatus::Forwarded.as_str(), id],
        )?;
        if updated == 0 {
            return Err(StoreError::MessageNotFound(id.to_string()));
        }
        Ok(())
    }

    pub fn get_message(&self, id: &str) -> Result<Option<ForwardedMessage>, StoreError> {
        let conn = self.conn();
        let msg = conn
            .query_row(
                "SELECT id, username, user_id, chat_id, message_id, created_at, status, forward_id
                 FROM messages WHERE id = ?1",
                params![id],
                ForwardedMessage::from_row,
            )
            .optional()?;
        Ok(msg)
    }

    /// Find the record whose relayed copy has the given id.
    pub fn find_by_forward_id(&self, forward_id: i32) -> Result<Option<ForwardedMessage>, StoreError> {
        if forward_id == 0 {
            return Ok(None);
        }
        let conn = self.conn();
        let msg = conn
            .query_row(
                "SELECT id, username, user_id, chat_id, message_id, created_at, status, forward_id
                 FROM messages WHERE forward_id = ?1 LIMIT 1",
                params![forward_id],
                ForwardedMessage::from_row,
            )
            .optional()?;
        Ok(msg)
    }

    /// Delete relayed records created before `now - RETENTION_DAYS`.
    /// Unread records are kept regardless of age.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let cutoff = now - Duration::days(RETENTION_DAYS);
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let ids: Vec<String> = {
            let mut stmt = tx.prepare(
                "SELECT id FROM messages WHERE status = ?1 AND created_at < ?2",
            )?;
            let rows = stmt.query_map(
                params![MessageStatus::Forwarded.as_str(), cutoff.timestamp()],
                |row| row.get::<_, String>(0),
            )?;
            rows.collect::<Result<_, _>>()?
        };

        for id in &ids {
            tx.execute("DELETE FROM messages WHERE id = ?1", params![id])?;
        }
        tx.commit()?;

        if !ids.is_empty() {
            info!("🧹 Purged {} forwarded message(s) older than {}", ids.len(), cutoff);
        }
        Ok(ids.len())
    }

    pub fn message_count(&self) -> Result<usize, StoreError> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Drop the ledger table so that ledger writes fail.
    #[cfg(test)]
    pub(crate) fn break_ledger(&self) {
        self.conn().execute_batch("DROP TABLE messages").unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_msg(chat_id: i64, message_id: i32, created_at: DateTime<Utc>) -> NewMessage {
        NewMessage {
            username: "alice".to_string(),
            user_id: 100,
            chat_id,
            message_id,
            created_at,
        }
    }

    fn sample_settings() -> Settings {
        Settings {
            welcome_words: "hi".to_string(),
            thanks: "thanks!".to_string(),
            forward_to_chat_id: -100200,
            bot_info: "relay bot".to_string(),
        }
    }

    #[test]
    fn test_settings_missing() {
        let store = Storage::in_memory().unwrap();
        assert!(matches!(store.get_settings(), Err(StoreError::SettingsNotFound)));
    }

    #[test]
    fn test_settings_created_on_first_save() {
        let store = Storage::in_memory().unwrap();
        let settings = sample_settings();
        assert_eq!(store.save_settings(&settings).unwrap(), 4);
        assert_eq!(store.get_settings().unwrap(), settings);
    }

    #[test]
    fn test_settings_partial_update() {
        let store = Storage::in_memory().unwrap();
        store.save_settings(&sample_settings()).unwrap();

        let mut changed = sample_settings();
        changed.thanks = "much appreciated".to_string();
        assert_eq!(store.save_settings(&changed).unwrap(), 1);

        let loaded = store.get_settings().unwrap();
        assert_eq!(loaded.thanks, "much appreciated");
        assert_eq!(loaded.welcome_words, "hi");
        assert_eq!(loaded.bot_info, "relay bot");
        assert_eq!(loaded.forward_to_chat_id, -100200);
    }

    #[test]
    fn test_settings_unchanged_writes_nothing() {
        let store = Storage::in_memory().unwrap();
        store.save_settings(&sample_settings()).unwrap();
        assert_eq!(store.save_settings(&sample_settings()).unwrap(), 0);
    }

    #[test]
    fn test_settings_summary() {
        let summary = sample_settings().to_string();
        assert_eq!(
            summary,
            "bot info: relay bot\nwelcome words: hi\nthanks words: thanks!\nforward to: -100200"
        );
    }

    #[test]
    fn test_create_and_mark_forwarded() {
        let store = Storage::in_memory().unwrap();
        let id = store.create_message(&new_msg(100, 7, Utc::now())).unwrap();

        let msg = store.get_message(&id).unwrap().unwrap();
        assert_eq!(msg.status, MessageStatus::Unread);
        assert_eq!(msg.forward_id, 0);

        store.mark_forwarded(&id, 555).unwrap();
        let msg = store.find_by_forward_id(555).unwrap().unwrap();
        assert_eq!(msg.id, id);
        assert_eq!(msg.status, MessageStatus::Forwarded);
        assert_eq!(msg.chat_id, 100);
        assert_eq!(msg.message_id, 7);
    }

    #[test]
    fn test_mark_forwarded_rejects_zero() {
        let store = Storage::in_memory().unwrap();
        let id = store.create_message(&new_msg(100, 7, Utc::now())).unwrap();
        assert!(matches!(store.mark_forwarded(&id, 0), Err(StoreError::InvalidForwardId)));
        assert_eq!(store.get_message(&id).unwrap().unwrap().status, MessageStatus::Unread);
    }

    #[test]
    fn test_mark_forwarded_unknown_record() {
        let store = Storage::in_memory().unwrap();
        let err = store.mark_forwarded("nope", 5).unwrap_err();
        assert!(matches!(err, StoreError::MessageNotFound(_)));
    }

    #[test]
    fn test_unread_records_not_found_by_zero() {
        let store = Storage::in_memory().unwrap();
        store.create_message(&new_msg(100, 7, Utc::now())).unwrap();
        assert!(store.find_by_forward_id(0).unwrap().is_none());
    }

    #[test]
    fn test_purge_only_old_forwarded() {
        let store = Storage::in_memory().unwrap();
        let now = Utc::now();
        let old = now - Duration::days(4);

        let old_forwarded = store.create_message(&new_msg(1, 1, old)).unwrap();
        store.mark_forwarded(&old_forwarded, 11).unwrap();
        let old_unread = store.create_message(&new_msg(2, 2, old)).unwrap();
        let new_forwarded = store.create_message(&new_msg(3, 3, now)).unwrap();
        store.mark_forwarded(&new_forwarded, 33).unwrap();

        assert_eq!(store.purge_expired(now).unwrap(), 1);
        assert!(store.get_message(&old_forwarded).unwrap().is_none());
        assert!(store.get_message(&old_unread).unwrap().is_some());
        assert!(store.get_message(&new_forwarded).unwrap().is_some());
        assert_eq!(store.message_count().unwrap(), 2);
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relaybot.db");
        {
            let store = Storage::open(&path).unwrap();
            store.save_settings(&sample_settings()).unwrap();
            let id = store.create_message(&new_msg(1, 1, Utc::now())).unwrap();
            store.mark_forwarded(&id, 9).unwrap();
        }
        let store = Storage::open(&path).unwrap();
        assert_eq!(store.get_settings().unwrap(), sample_settings());
        assert!(store.find_by_forward_id(9).unwrap().is_some());
    }
}
