use std::path::PathBuf;

use teloxide::types::UserId;
use thiserror::Error;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_WORKERS: usize = 2;

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required variable is not set (or is empty).
    #[error("no env var: {0}")]
    Missing(&'static str),
    /// A variable is set but cannot be parsed.
    #[error("invalid value for {name}: '{value}'")]
    Invalid { name: &'static str, value: String },
    /// Validation error.
    #[error("config validation error: {0}")]
    Validation(String),
}

pub struct Config {
    pub telegram_bot_token: String,
    /// The only user allowed to change settings and query chat ids.
    pub admin_id: UserId,
    /// Public host the webhook is served on.
    pub domain: String,
    pub port: u16,
    /// Directory for state files (database, logs).
    pub data_dir: PathBuf,
    /// Number of update workers.
    pub workers: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a config from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &'static str| lookup(name).filter(|v| !v.trim().is_empty());

        let telegram_bot_token = get("BOT_TOKEN").ok_or(ConfigError::Missing("BOT_TOKEN"))?;
        // Telegram tokens are formatted as {bot_id}:{secret} where bot_id is numeric
        let token_parts: Vec<&str> = telegram_bot_token.split(':').collect();
        if token_parts.len() != 2 || token_parts[0].parse::<u64>().is_err() || token_parts[1].is_empty() {
            return Err(ConfigError::Validation(
                "BOT_TOKEN appears invalid (expected format: 123456789:ABCdefGHI...)".into(),
            ));
        }

        let admin = get("BOT_ADMIN").ok_or(ConfigError::Missing("BOT_ADMIN"))?;
        let admin_id = admin
            .trim()
            .parse::<u64>()
            .map(UserId)
            .map_err(|_| ConfigError::Invalid { name: "BOT_ADMIN", value: admin.clone() })?;

        let domain = get("DOMAIN").ok_or(ConfigError::Missing("DOMAIN"))?;
        let domain = domain.trim().trim_end_matches('/').to_string();

        let port = match get("PORT") {
            Some(p) => p
                .trim()
                .parse::<u16>()
                .map_err(|_| ConfigError::Invalid { name: "PORT", value: p.clone() })?,
            None => DEFAULT_PORT,
        };

        let workers = match get("WORKERS") {
            Some(w) => w
                .trim()
                .parse::<usize>()
                .map_err(|_| ConfigError::Invalid { name: "WORKERS", value: w.clone() })?,
            None => DEFAULT_WORKERS,
        };
        if workers == 0 {
            return Err(ConfigError::Validation("WORKERS must be at least 1".into()));
        }

        let data_dir = get("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Self {
            telegram_bot_token,
            admin_id,
            domain,
            port,
            data_dir,
            workers,
        })
    }

    /// Public URL Telegram delivers updates to.
    pub fn webhook_url(&self) -> String {
        format!("https://{}/{}", self.domain, self.telegram_bot_token)
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("relaybot.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    fn assert_err<T>(result: Result<T, ConfigError>) -> ConfigError {
        match result {
            Ok(_) => panic!("expected error, got Ok"),
            Err(e) => e,
        }
    }

    const VALID: &[(&str, &str)] = &[
        ("BOT_TOKEN", "123456789:ABCdefGHIjklMNOpqrsTUVwxyz"),
        ("BOT_ADMIN", "42"),
        ("DOMAIN", "bot.example.com"),
    ];

    #[test]
    fn test_valid_config_with_defaults() {
        let config = load(VALID).expect("should load valid config");
        assert_eq!(config.admin_id, UserId(42));
        assert_eq!(config.port, 8080);
        assert_eq!(config.workers, 2);
        assert_eq!(config.data_dir, PathBuf::from("."));
    }

    #[test]
    fn test_webhook_url() {
        let mut vars = VALID.to_vec();
        vars[2] = ("DOMAIN", "bot.example.com/");
        let config = load(&vars).unwrap();
        assert_eq!(
            config.webhook_url(),
            "https://bot.example.com/123456789:ABCdefGHIjklMNOpqrsTUVwxyz"
        );
    }

    #[test]
    fn test_overrides() {
        let mut vars = VALID.to_vec();
        vars.push(("PORT", "9000"));
        vars.push(("WORKERS", "4"));
        vars.push(("DATA_DIR", "/var/lib/relaybot"));
        let config = load(&vars).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.workers, 4);
        assert_eq!(config.database_path(), PathBuf::from("/var/lib/relaybot/relaybot.db"));
    }

    #[test]
    fn test_missing_admin() {
        let err = assert_err(load(&VALID[..1]));
        assert!(matches!(err, ConfigError::Missing("BOT_ADMIN")));
    }

    #[test]
    fn test_missing_domain() {
        let err = assert_err(load(&VALID[..2]));
        assert!(matches!(err, ConfigError::Missing("DOMAIN")));
        assert!(err.to_string().contains("DOMAIN"));
    }

    #[test]
    fn test_empty_token_is_missing() {
        let mut vars = VALID.to_vec();
        vars[0] = ("BOT_TOKEN", "  ");
        let err = assert_err(load(&vars));
        assert!(matches!(err, ConfigError::Missing("BOT_TOKEN")));
    }

    #[test]
    fn test_invalid_token_format() {
        for token in ["invalid_token_no_colon", "notanumber:ABCdef", "123456789:"] {
            let mut vars = VALID.to_vec();
            vars[0] = ("BOT_TOKEN", token);
            let err = assert_err(load(&vars));
            assert!(matches!(err, ConfigError::Validation(_)), "token {token}");
        }
    }

    #[test]
    fn test_non_numeric_admin() {
        let mut vars = VALID.to_vec();
        vars[1] = ("BOT_ADMIN", "alice");
        let err = assert_err(load(&vars));
        assert!(matches!(err, ConfigError::Invalid { name: "BOT_ADMIN", .. }));
    }

    #[test]
    fn test_zero_workers() {
        let mut vars = VALID.to_vec();
        vars.push(("WORKERS", "0"));
        let err = assert_err(load(&vars));
        assert!(matches!(err, ConfigError::Validation(_)));
    }
}
