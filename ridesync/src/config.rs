//! Runtime settings, loaded from a TOML file with serde defaults for every key.
//!
//! ```toml
//! [store]
//! backend = "redis"
//! redis_url = "${REDIS_URL}"
//!
//! [conversations]
//! utc_offset_minutes = -240
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::SyncError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub store: StoreSettings,
    #[serde(default)]
    pub ledger: LedgerSettings,
    #[serde(default)]
    pub feed: FeedSettings,
    #[serde(default)]
    pub conversations: ConversationSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Memory,
    Redis,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSettings {
    #[serde(default)]
    pub backend: Backend,
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default = "default_service")]
    pub service: String,
    #[serde(default = "default_max_transaction_attempts")]
    pub max_transaction_attempts: u32,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            redis_url: default_redis_url(),
            prefix: default_prefix(),
            service: default_service(),
            max_transaction_attempts: default_max_transaction_attempts(),
        }
    }
}

fn default_redis_url() -> String {
    "${REDIS_URL}".to_string()
}

fn default_prefix() -> String {
    "ridesync".to_string()
}

fn default_service() -> String {
    "social".to_string()
}

fn default_max_transaction_attempts() -> u32 {
    5
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerSettings {
    /// Key edges by their sorted user pair so mirrored requests collide in the store.
    #[serde(default = "default_true")]
    pub canonical_edge_ids: bool,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            canonical_edge_ids: default_true(),
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedSettings {
    #[serde(default = "default_feed_limit")]
    pub limit: usize,
    #[serde(default = "default_placeholder_name")]
    pub placeholder_name: String,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            limit: default_feed_limit(),
            placeholder_name: default_placeholder_name(),
        }
    }
}

fn default_feed_limit() -> usize {
    50
}

fn default_placeholder_name() -> String {
    "User".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSettings {
    #[serde(default = "default_placeholder_text")]
    pub placeholder_text: String,
    /// chrono format string for the last-message time label.
    #[serde(default = "default_time_format")]
    pub time_format: String,
    #[serde(default)]
    pub utc_offset_minutes: i32,
    #[serde(default = "default_avatar_url")]
    pub default_avatar_url: String,
}

impl Default for ConversationSettings {
    fn default() -> Self {
        Self {
            placeholder_text: default_placeholder_text(),
            time_format: default_time_format(),
            utc_offset_minutes: 0,
            default_avatar_url: default_avatar_url(),
        }
    }
}

fn default_placeholder_text() -> String {
    "Start a conversation!".to_string()
}

fn default_time_format() -> String {
    "%H:%M".to_string()
}

fn default_avatar_url() -> String {
    "https://cdn-icons-png.flaticon.com/512/3177/3177440.png".to_string()
}

impl Settings {
    pub fn from_toml_str(raw: &str) -> Result<Self, SyncError> {
        toml::from_str(raw).map_err(|err| SyncError::InvalidRequest {
            message: format!("invalid settings: {err}"),
        })
    }

    pub fn load(path: &Path) -> Result<Self, SyncError> {
        let raw = std::fs::read_to_string(path).map_err(|err| SyncError::InvalidRequest {
            message: format!("failed to read {}: {err}", path.display()),
        })?;
        Self::from_toml_str(&raw)
    }
}

impl StoreSettings {
    /// Redis URL with `${VAR}` references expanded from the environment.
    pub fn resolved_redis_url(&self) -> Result<String, SyncError> {
        expand_env(&self.redis_url)
    }
}

/// Replaces every `${VAR}` with the value of the environment variable.
pub fn expand_env(raw: &str) -> Result<String, SyncError> {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find('}').ok_or_else(|| SyncError::InvalidRequest {
            message: format!("unterminated variable in '{raw}'"),
        })?;
        let name = &after[..end];
        let value = std::env::var(name).map_err(|_| SyncError::InvalidRequest {
            message: format!("environment variable {name} is not set"),
        })?;
        out.push_str(&value);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}
