//! Configuration loading for the Review Gate toolchain.
//!
//! Settings live in a TOML file (`revgate.toml` by default). Every
//! field has a sensible default so a missing file yields a working
//! bridge; credentials for the dashboard and Telegram integrations
//! must be supplied explicitly.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::paths::RecordPaths;
use crate::{Error, Result};

/// Default config file name, resolved against the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "revgate.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RevgateConfig {
    #[serde(default)]
    pub bridge: BridgeSettings,
    #[serde(default)]
    pub dashboard: DashboardSettings,
    #[serde(default)]
    pub telegram: TelegramSettings,
    #[serde(default)]
    pub cookie: CookieSettings,
}

impl RevgateConfig {
    /// Loads configuration from `path`, or returns defaults when the
    /// file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse {}: {}", path.display(), e)))
    }

    /// Writes a default config file for hand editing.
    pub fn write_default(path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(&Self::default())
            .map_err(|e| Error::Config(format!("failed to render defaults: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Timing and placement knobs for the file bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeSettings {
    /// Directory holding the protocol records. Defaults to the OS
    /// temp directory, which is where the editor extension looks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_dir: Option<PathBuf>,
    #[serde(default = "default_ack_poll_interval_ms")]
    pub ack_poll_interval_ms: u64,
    #[serde(default = "default_ack_timeout_secs")]
    pub ack_timeout_secs: u64,
    #[serde(default = "default_response_poll_interval_ms")]
    pub response_poll_interval_ms: u64,
    #[serde(default = "default_backup_trigger_count")]
    pub backup_trigger_count: usize,
    #[serde(default = "default_speech_poll_interval_ms")]
    pub speech_poll_interval_ms: u64,
}

impl BridgeSettings {
    pub fn record_paths(&self) -> RecordPaths {
        match &self.temp_dir {
            Some(dir) => RecordPaths::new(dir),
            None => RecordPaths::system_temp(),
        }
    }

    pub fn ack_poll_interval(&self) -> Duration {
        Duration::from_millis(self.ack_poll_interval_ms)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_secs(self.ack_timeout_secs)
    }

    pub fn response_poll_interval(&self) -> Duration {
        Duration::from_millis(self.response_poll_interval_ms)
    }

    pub fn speech_poll_interval(&self) -> Duration {
        Duration::from_millis(self.speech_poll_interval_ms)
    }
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            temp_dir: None,
            ack_poll_interval_ms: default_ack_poll_interval_ms(),
            ack_timeout_secs: default_ack_timeout_secs(),
            response_poll_interval_ms: default_response_poll_interval_ms(),
            backup_trigger_count: default_backup_trigger_count(),
            speech_poll_interval_ms: default_speech_poll_interval_ms(),
        }
    }
}

fn default_ack_poll_interval_ms() -> u64 {
    100
}

fn default_ack_timeout_secs() -> u64 {
    30
}

fn default_response_poll_interval_ms() -> u64 {
    100
}

fn default_backup_trigger_count() -> usize {
    3
}

fn default_speech_poll_interval_ms() -> u64 {
    500
}

/// Usage-limit dashboard access. The session cookie is a credential
/// and is never defaulted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardSettings {
    #[serde(default = "default_dashboard_base_url")]
    pub base_url: String,
    /// Full `Cookie` header value for an authenticated dashboard
    /// session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookie: Option<String>,
    #[serde(default = "default_dashboard_referer")]
    pub referer: String,
    #[serde(default = "default_dashboard_origin")]
    pub origin: String,
}

impl Default for DashboardSettings {
    fn default() -> Self {
        Self {
            base_url: default_dashboard_base_url(),
            cookie: None,
            referer: default_dashboard_referer(),
            origin: default_dashboard_origin(),
        }
    }
}

fn default_dashboard_base_url() -> String {
    "https://cursor.com/api/dashboard".to_string()
}

fn default_dashboard_referer() -> String {
    "https://cursor.com/dashboard?tab=settings".to_string()
}

fn default_dashboard_origin() -> String {
    "https://cursor.com".to_string()
}

/// Telegram notification credentials. Both fields are required for
/// sending; the proxy is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelegramSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    /// Proxy URL (e.g. `socks5://127.0.0.1:1080`). When connectivity
    /// through it fails, the client falls back to a direct connection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
}

/// Source files whose embedded session cookie gets rewritten by the
/// `cookie update` command.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CookieSettings {
    #[serde(default)]
    pub files: Vec<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_match_protocol_timings() {
        let config = RevgateConfig::default();
        assert_eq!(config.bridge.ack_poll_interval(), Duration::from_millis(100));
        assert_eq!(config.bridge.ack_timeout(), Duration::from_secs(30));
        assert_eq!(config.bridge.backup_trigger_count, 3);
        assert_eq!(
            config.bridge.speech_poll_interval(),
            Duration::from_millis(500)
        );
        assert!(config.dashboard.cookie.is_none());
        assert!(config.telegram.bot_token.is_none());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config = RevgateConfig::load_or_default(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.bridge.ack_timeout_secs, 30);
    }

    #[test]
    fn partial_file_overrides_only_named_fields() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("revgate.toml");
        std::fs::write(
            &path,
            "[bridge]\nack_timeout_secs = 5\n\n[telegram]\nbot_token = \"t\"\nchat_id = \"c\"\n",
        )
        .unwrap();

        let config = RevgateConfig::load_or_default(&path).unwrap();
        assert_eq!(config.bridge.ack_timeout_secs, 5);
        assert_eq!(config.bridge.ack_poll_interval_ms, 100);
        assert_eq!(config.telegram.bot_token.as_deref(), Some("t"));
    }

    #[test]
    fn write_default_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("revgate.toml");
        RevgateConfig::write_default(&path).unwrap();

        let config = RevgateConfig::load_or_default(&path).unwrap();
        assert_eq!(config.bridge.backup_trigger_count, 3);
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("revgate.toml");
        std::fs::write(&path, "[bridge\nnot toml").unwrap();

        let err = RevgateConfig::load_or_default(&path).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn explicit_temp_dir_overrides_system_temp() {
        let settings = BridgeSettings {
            temp_dir: Some(PathBuf::from("/var/run/revgate")),
            ..Default::default()
        };
        assert_eq!(
            settings.record_paths().dir(),
            Path::new("/var/run/revgate")
        );
    }
}
