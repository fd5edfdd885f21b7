//! Configuration loading and management.

use std::fmt;
use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use vl_core::SystemClock;
use vl_core::clock::DEFAULT_OFFSET_SECONDS;
use vl_core::record::DEFAULT_SHEET_NAME;

/// Bare environment variables accepted alongside `VL_*`.
const CONVENTIONAL_ENV: &[&str] = &["discord_token", "spreadsheet_id", "credentials_json"];

/// Configuration problems detected before any event is consumed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A value required by the selected backend or event source is absent.
    #[error("{key} is not set")]
    Missing { key: &'static str },
    /// The UTC offset does not describe a valid fixed offset.
    #[error("utc_offset_minutes out of range: {0}")]
    InvalidOffset(i32),
}

/// Which store intervals are written to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// A worksheet in a Google spreadsheet.
    #[default]
    Sheets,
    /// A local `SQLite` database.
    Sqlite,
}

/// Where the service-account credential comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource<'a> {
    Inline(&'a str),
    File(&'a Path),
}

/// Application configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Store backend.
    #[serde(default)]
    pub backend: Backend,
    /// Gateway access token, handed to the bridge command.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discord_token: Option<String>,
    /// Spreadsheet identifier for the sheets backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spreadsheet_id: Option<String>,
    /// Inline service-account JSON. Takes precedence over `credentials_path`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_json: Option<String>,
    /// Service-account JSON file.
    pub credentials_path: PathBuf,
    /// Label of the sheet (or table) intervals are written to.
    pub sheet_name: String,
    /// Path to the database file for the sqlite backend.
    pub database_path: PathBuf,
    /// Fixed offset east of UTC, in minutes, used for dates and times.
    pub utc_offset_minutes: i32,
    /// Program (and arguments) that connects to the gateway and prints
    /// transition events as JSON Lines.
    #[serde(default)]
    pub bridge_command: Vec<String>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("Config")
            .field("backend", &self.backend)
            .field("discord_token", &redact(&self.discord_token))
            .field("spreadsheet_id", &self.spreadsheet_id)
            .field("credentials_json", &redact(&self.credentials_json))
            .field("credentials_path", &self.credentials_path)
            .field("sheet_name", &self.sheet_name)
            .field("database_path", &self.database_path)
            .field("utc_offset_minutes", &self.utc_offset_minutes)
            .field("bridge_command", &self.bridge_command)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            backend: Backend::default(),
            discord_token: None,
            spreadsheet_id: None,
            credentials_json: None,
            credentials_path: PathBuf::from("credentials.json"),
            sheet_name: DEFAULT_SHEET_NAME.to_string(),
            database_path: data_dir.join("voice-log.db"),
            utc_offset_minutes: DEFAULT_OFFSET_SECONDS / 60,
            bridge_command: Vec::new(),
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Load from default config location
        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // DISCORD_TOKEN, SPREADSHEET_ID, CREDENTIALS_JSON, then VL_*
        figment = figment
            .merge(Env::raw().only(CONVENTIONAL_ENV))
            .merge(Env::prefixed("VL_"));

        figment.extract()
    }

    /// Returns the spreadsheet ID, failing if unset or blank.
    pub fn require_spreadsheet_id(&self) -> Result<&str, ConfigError> {
        non_blank(self.spreadsheet_id.as_deref()).ok_or(ConfigError::Missing {
            key: "spreadsheet_id",
        })
    }

    /// Returns the gateway token, failing if unset or blank.
    pub fn require_discord_token(&self) -> Result<&str, ConfigError> {
        non_blank(self.discord_token.as_deref()).ok_or(ConfigError::Missing {
            key: "discord_token",
        })
    }

    /// Returns the bridge command, failing if none is configured.
    pub fn require_bridge_command(&self) -> Result<&[String], ConfigError> {
        if self.bridge_command.is_empty() {
            return Err(ConfigError::Missing {
                key: "bridge_command",
            });
        }
        Ok(&self.bridge_command)
    }

    /// Inline credentials win over the credential file.
    pub fn credential_source(&self) -> CredentialSource<'_> {
        non_blank(self.credentials_json.as_deref())
            .map_or(CredentialSource::File(&self.credentials_path), CredentialSource::Inline)
    }

    /// Clock in the configured offset.
    pub fn clock(&self) -> Result<SystemClock, ConfigError> {
        SystemClock::from_offset_minutes(self.utc_offset_minutes)
            .ok_or(ConfigError::InvalidOffset(self.utc_offset_minutes))
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Returns the platform-specific config directory for vl.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("vl"))
}

/// Returns the platform-specific data directory for vl.
///
/// On Linux: `~/.local/share/vl`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("vl"))
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;

    #[test]
    fn test_dirs_data_path_ends_with_vl() {
        let path = dirs_data_path().unwrap();
        assert_eq!(path.file_name().unwrap(), "vl");
    }

    #[test]
    fn test_default_config_uses_data_dir_for_db() {
        let config = Config::default();
        let data_dir = dirs_data_path().unwrap();
        assert_eq!(config.database_path, data_dir.join("voice-log.db"));
        assert_eq!(config.utc_offset_minutes, 540);
        assert_eq!(config.backend, Backend::Sheets);
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
backend = "sqlite"
sheet_name = "Rooms"
utc_offset_minutes = 0
bridge_command = ["node", "bridge.js"]
"#
        )
        .unwrap();

        let config = Config::load_from(Some(file.path())).unwrap();
        assert_eq!(config.backend, Backend::Sqlite);
        assert_eq!(config.sheet_name, "Rooms");
        assert_eq!(config.utc_offset_minutes, 0);
        assert_eq!(config.bridge_command, vec!["node", "bridge.js"]);
    }

    #[test]
    fn test_missing_values_are_reported_by_key() {
        let config = Config {
            spreadsheet_id: Some("  ".into()),
            discord_token: None,
            ..Config::default()
        };
        assert_eq!(
            config.require_spreadsheet_id(),
            Err(ConfigError::Missing {
                key: "spreadsheet_id"
            })
        );
        assert_eq!(
            config.require_discord_token().unwrap_err().to_string(),
            "discord_token is not set"
        );
        assert!(config.require_bridge_command().is_err());
    }

    #[test]
    fn test_inline_credentials_take_precedence() {
        let mut config = Config {
            credentials_json: Some("{}".into()),
            ..Config::default()
        };
        assert_eq!(config.credential_source(), CredentialSource::Inline("{}"));

        config.credentials_json = None;
        assert_eq!(
            config.credential_source(),
            CredentialSource::File(Path::new("credentials.json"))
        );
    }

    #[test]
    fn test_invalid_offset_is_rejected() {
        let config = Config {
            utc_offset_minutes: 10_000,
            ..Config::default()
        };
        assert_eq!(config.clock().unwrap_err(), ConfigError::InvalidOffset(10_000));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = Config {
            discord_token: Some("token-value".into()),
            credentials_json: Some("{\"private_key\":\"k\"}".into()),
            ..Config::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("token-value"));
        assert!(!debug.contains("private_key"));
    }
}
