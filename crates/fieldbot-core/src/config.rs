//! Configuration and data directory management.

use std::path::{Path, PathBuf};

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Paths to all FieldBot data directories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPaths {
    /// Root data directory (e.g., `data/`).
    pub root: PathBuf,
    /// Archived reports for the team (`data/messages/<team>/`).
    pub messages: PathBuf,
    /// Generated workbooks (`data/excel/`).
    pub excel: PathBuf,
    /// Extraction cache (`data/analysis_cache.json`).
    pub cache_file: PathBuf,
    /// Reference catalogue (`data/reference_data.json`).
    pub reference_file: PathBuf,
}

impl DataPaths {
    /// Create data paths from a root directory. Creates directories if needed.
    pub fn new(root: impl AsRef<Path>, team_name: &str) -> std::io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        let paths = Self {
            messages: root.join("messages").join(team_name),
            excel: root.join("excel"),
            cache_file: root.join("analysis_cache.json"),
            reference_file: root.join("reference_data.json"),
            root,
        };
        paths.ensure_dirs()?;
        Ok(paths)
    }

    /// Create all required directories.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.messages)?;
        std::fs::create_dir_all(&self.excel)?;
        Ok(())
    }
}

/// Top-level bot configuration.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Telegram bot token.
    pub bot_token: String,
    /// Team name, used for the message archive directory.
    pub team_name: String,
    /// Chats allowed to talk to the bot. Empty means every chat.
    pub allowed_chat_ids: Vec<i64>,
    /// Users allowed to run admin operations (reset).
    pub admin_user_ids: Vec<i64>,
    /// Daily report generation time.
    pub report_time: NaiveTime,
    /// Chats that receive the scheduled report.
    pub report_send_to: Vec<i64>,
    pub data_paths: DataPaths,
}

impl BotConfig {
    /// Create configuration from environment and defaults.
    ///
    /// A missing `BOT_TOKEN` is a configuration error; the process must not start.
    pub fn from_env(data_dir: impl AsRef<Path>) -> Result<Self> {
        let bot_token = std::env::var("BOT_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| Error::Config("BOT_TOKEN is not set".into()))?;

        let team_name = std::env::var("TEAM_NAME").unwrap_or_else(|_| "agronomists".into());

        let allowed_chat_ids = parse_id_list(&std::env::var("ALLOWED_CHAT_IDS").unwrap_or_default())?;
        let admin_user_ids = parse_id_list(&std::env::var("ADMIN_USER_IDS").unwrap_or_default())?;
        let report_send_to = parse_id_list(&std::env::var("REPORT_SEND_TO").unwrap_or_default())?;

        let report_time_raw =
            std::env::var("REPORT_GENERATION_TIME").unwrap_or_else(|_| "06:00".into());
        let report_time = NaiveTime::parse_from_str(report_time_raw.trim(), "%H:%M").map_err(|e| {
            Error::Config(format!("REPORT_GENERATION_TIME '{}': {}", report_time_raw, e))
        })?;

        let data_paths = DataPaths::new(data_dir, &team_name)?;

        Ok(Self {
            bot_token,
            team_name,
            allowed_chat_ids,
            admin_user_ids,
            report_time,
            report_send_to,
            data_paths,
        })
    }

    /// Whether the chat may use the bot.
    pub fn is_allowed_chat(&self, chat_id: i64) -> bool {
        self.allowed_chat_ids.is_empty() || self.allowed_chat_ids.contains(&chat_id)
    }

    /// Whether the user may run admin operations.
    pub fn is_admin(&self, user_id: i64) -> bool {
        self.admin_user_ids.contains(&user_id)
    }

    /// Replace the bot token with a placeholder wherever it appears.
    pub fn mask_token(&self, text: &str) -> String {
        text.replace(&self.bot_token, "***TOKEN***")
    }
}

/// Parse a comma-separated list of numeric ids. Blank entries are skipped.
pub fn parse_id_list(raw: &str) -> Result<Vec<i64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>()
                .map_err(|_| Error::Config(format!("invalid id '{}'", s)))
        })
        .collect()
}
