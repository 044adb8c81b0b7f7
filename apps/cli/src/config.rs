//! CLI configuration.
//!
//! Reads the `config.json` written by the token tool, keeping its key names.
//! The file is only read; the uploader never writes it back.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, FixedOffset, Utc};
use serde::Deserialize;

use panup_upload::UploadOptions;

/// Default config location, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config.json";

/// A folder id stored either as a JSON number or as a numeric string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum FolderId {
    Number(i64),
    Text(String),
}

/// On-disk config format. Unknown keys (`client_id`, `client_secret`,
/// `last_updated`, …) are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    expired_at: String,
    #[serde(default)]
    upload_file_path: String,
    #[serde(default)]
    parent_folder_id: Option<FolderId>,
    #[serde(default)]
    base_url: Option<String>,
    #[serde(default)]
    concurrency: Option<usize>,
    #[serde(default)]
    max_chunk_attempts: Option<u32>,
    #[serde(default)]
    poll_interval_secs: Option<u64>,
    #[serde(default)]
    max_wait_secs: Option<u64>,
}

/// CLI configuration snapshot.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub access_token: String,
    /// Token expiry, when present and parseable.
    pub expired_at: Option<DateTime<FixedOffset>>,
    /// File to upload when none is given on the command line.
    pub upload_file_path: Option<PathBuf>,
    /// Destination folder when none is given on the command line (0 = root).
    pub parent_folder_id: i64,
    pub base_url: Option<String>,
    pub concurrency: Option<usize>,
    pub max_chunk_attempts: Option<u32>,
    pub poll_interval_secs: Option<u64>,
    pub max_wait_secs: Option<u64>,
}

impl AppConfig {
    /// Loads configuration from `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_json(&content).with_context(|| format!("parsing config {}", path.display()))
    }

    /// Parses configuration from JSON text.
    pub fn from_json(content: &str) -> anyhow::Result<Self> {
        let file: ConfigFile = serde_json::from_str(content)?;

        let expired_at = if file.expired_at.is_empty() {
            None
        } else {
            match DateTime::parse_from_rfc3339(&file.expired_at) {
                Ok(t) => Some(t),
                Err(e) => {
                    tracing::warn!(
                        expired_at = %file.expired_at,
                        error = %e,
                        "ignoring unparseable token expiry"
                    );
                    None
                }
            }
        };

        let parent_folder_id = match file.parent_folder_id {
            None => 0,
            Some(FolderId::Number(n)) => n,
            Some(FolderId::Text(s)) if s.trim().is_empty() => 0,
            Some(FolderId::Text(s)) => s
                .trim()
                .parse()
                .with_context(|| format!("parent_folder_id {s:?} is not a number"))?,
        };

        Ok(Self {
            access_token: file.access_token,
            expired_at,
            upload_file_path: (!file.upload_file_path.is_empty())
                .then(|| PathBuf::from(file.upload_file_path)),
            parent_folder_id,
            base_url: file.base_url.filter(|u| !u.is_empty()),
            concurrency: file.concurrency,
            max_chunk_attempts: file.max_chunk_attempts,
            poll_interval_secs: file.poll_interval_secs,
            max_wait_secs: file.max_wait_secs,
        })
    }

    /// Returns `true` if the token expiry is known and not after `now`.
    pub fn token_expired(&self, now: DateTime<Utc>) -> bool {
        self.expired_at.is_some_and(|t| t <= now)
    }

    /// Library options with the config's overrides applied.
    pub fn upload_options(&self) -> UploadOptions {
        let mut options = UploadOptions::default();
        if let Some(n) = self.concurrency {
            options.concurrency = n.max(1);
        }
        if let Some(n) = self.max_chunk_attempts {
            options.retry.max_attempts = n.max(1);
        }
        if let Some(secs) = self.poll_interval_secs {
            options.poll.interval = Duration::from_secs(secs.max(1));
        }
        if let Some(secs) = self.max_wait_secs {
            options.poll.max_wait = Duration::from_secs(secs);
        }
        options
    }
}
