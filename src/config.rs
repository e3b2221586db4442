use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bot API token issued by BotFather
    pub bot_token: Option<String>,
    /// Bot username, used in invite links
    pub bot_username: String,
    /// Path to the SQLite database
    pub database_path: PathBuf,
    /// Base URL of the Bot API
    pub api_url: String,
    /// Long-polling timeout for getUpdates
    pub poll_timeout_secs: u64,
    /// Timeout for every other API request
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bot_token: None,
            bot_username: "sync_family_bot".to_string(),
            database_path: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("syncfamily")
                .join("syncfamily.db"),
            api_url: "https://api.telegram.org".to_string(),
            poll_timeout_secs: 30,
            request_timeout_secs: 10,
        }
    }
}

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            config = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;
        }

        if let Ok(token) = std::env::var("SYNCFAMILY_BOT_TOKEN") {
            config.bot_token = Some(token);
        }
        if let Ok(username) = std::env::var("SYNCFAMILY_BOT_USERNAME") {
            config.bot_username = username;
        }
        if let Ok(db_path) = std::env::var("SYNCFAMILY_DATABASE_PATH") {
            config.database_path = PathBuf::from(db_path);
        }
        if let Ok(api_url) = std::env::var("SYNCFAMILY_API_URL") {
            config.api_url = api_url;
        }

        Ok(config)
    }

    /// Default config file path: ~/.config/syncfamily/config.yaml
    pub fn default_config_path() -> PathBuf {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home)
            .join(".config")
            .join("syncfamily")
            .join("config.yaml")
    }

    /// The bot token, which the bot cannot run without.
    pub fn require_token(&self) -> Result<&str, ConfigError> {
        self.bot_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(ConfigError::Missing("bot_token"))
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
    Missing(&'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(
                    f,
                    "Failed to parse config file '{}': {}",
                    path.display(),
                    e
                )
            }
            ConfigError::Missing(field) => {
                write!(f, "Missing required setting '{}'", field)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
