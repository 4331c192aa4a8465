//! Bot configuration: Telegram credentials from the environment, with a
//! `.env` file merged underneath.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Default Bot API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

/// Highest numbered `TELEGRAM_BOT_TOKEN_N` key consulted.
const MAX_TOKEN_SLOT: usize = 5;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no bot token configured (set TELEGRAM_BOT_TOKEN)")]
    NoTokens,

    #[error("TELEGRAM_CHAT_ID is not set")]
    MissingChatId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotConfig {
    pub tokens: Vec<String>,
    pub chat_id: String,
    pub api_url: String,
}

impl BotConfig {
    /// Resolve from the process environment, falling back to the nearest
    /// `.env` file.
    pub fn from_env() -> Result<Self, ConfigError> {
        let dotenv = load_dotenv_vars();
        Self::from_lookup(|key| {
            std::env::var(key)
                .ok()
                .or_else(|| dotenv.get(key).cloned())
        })
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let present = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let mut tokens = Vec::new();
        if let Some(token) = present("TELEGRAM_BOT_TOKEN") {
            tokens.push(token);
        }
        for slot in 2..=MAX_TOKEN_SLOT {
            if let Some(token) = present(&format!("TELEGRAM_BOT_TOKEN_{slot}")) {
                if !tokens.contains(&token) {
                    tokens.push(token);
                }
            }
        }
        if tokens.is_empty() {
            return Err(ConfigError::NoTokens);
        }

        let chat_id = present("TELEGRAM_CHAT_ID").ok_or(ConfigError::MissingChatId)?;
        let api_url = present("TELEGRAM_API_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        Ok(Self {
            tokens,
            chat_id,
            api_url,
        })
    }
}

fn find_dotenv(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .take(6)
        .map(|dir| dir.join(".env"))
        .find(|candidate| candidate.exists())
}

/// Variables from the nearest `.env`, or empty if there is none.
pub fn load_dotenv_vars() -> HashMap<String, String> {
    let Ok(start) = std::env::current_dir() else {
        return HashMap::new();
    };
    let Some(path) = find_dotenv(&start) else {
        return HashMap::new();
    };
    match dotenvy::from_path_iter(&path) {
        Ok(iter) => collect_vars(iter, &path),
        Err(e) => {
            tracing::warn!("cannot read {}: {e}", path.display());
            HashMap::new()
        }
    }
}

/// Parse `.env` content without touching the process environment.
pub fn parse_dotenv(raw: &str) -> HashMap<String, String> {
    collect_vars(dotenvy::from_read_iter(raw.as_bytes()), Path::new(".env"))
}

fn collect_vars<I>(iter: I, origin: &Path) -> HashMap<String, String>
where
    I: Iterator<Item = dotenvy::Result<(String, String)>>,
{
    let mut vars = HashMap::new();
    for item in iter {
        match item {
            Ok((key, value)) => {
                vars.insert(key, value);
            }
            Err(e) => tracing::warn!("skipping malformed line in {}: {e}", origin.display()),
        }
    }
    vars
}
