// ── Configuration ─────────────────────────────────────────────────────────────
//
// Effective settings are layered, lowest precedence first:
//   built-in defaults → JSON file → XML_INBOX_* environment → command-line flags
//
// Credentials are deliberately absent; see `crate::cli` for where they come from.

use inbox_sftp::sftp::{ConflictPolicy, ConnectOptions, HostKeyPolicy, TransferCredentials};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_HOST: &str = "integrationprod.pixid-services.net";
pub const DEFAULT_PORT: u16 = 22;
pub const DEFAULT_REMOTE_DIRECTORY: &str = "inbox";
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

pub const ENV_HOST: &str = "XML_INBOX_HOST";
pub const ENV_PORT: &str = "XML_INBOX_PORT";
pub const ENV_REMOTE_DIR: &str = "XML_INBOX_REMOTE_DIR";
pub const ENV_TIMEOUT_SECS: &str = "XML_INBOX_TIMEOUT_SECS";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid value '{value}' for {var}")]
    Env { var: &'static str, value: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InboxConfig {
    pub host: String,
    pub port: u16,
    pub remote_directory: String,
    pub connect_timeout_secs: u64,
    pub host_key_policy: HostKeyPolicy,
    pub known_hosts_file: Option<PathBuf>,
    pub on_conflict: ConflictPolicy,
}

impl Default for InboxConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            remote_directory: DEFAULT_REMOTE_DIRECTORY.to_string(),
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            host_key_policy: HostKeyPolicy::default(),
            known_hosts_file: None,
            on_conflict: ConflictPolicy::default(),
        }
    }
}

/// Values given on the command line. `None` leaves the lower layer alone.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub remote_directory: Option<String>,
    pub connect_timeout_secs: Option<u64>,
    pub host_key_policy: Option<HostKeyPolicy>,
    pub known_hosts_file: Option<PathBuf>,
    pub on_conflict: Option<ConflictPolicy>,
}

/// `<config dir>/xml-inbox/config.json`, when the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("xml-inbox").join("config.json"))
}

impl InboxConfig {
    /// Build the effective configuration.
    ///
    /// An `explicit` path must exist. Without one, the default location is
    /// read when present and silently skipped otherwise.
    pub fn load(explicit: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self, ConfigError> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path() {
                Some(path) if path.is_file() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_env(|var| std::env::var(var).ok())?;
        config.apply_overrides(overrides);
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `XML_INBOX_*` variables through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup(ENV_HOST) {
            self.host = host;
        }
        if let Some(raw) = lookup(ENV_PORT) {
            self.port = raw.trim().parse().map_err(|_| ConfigError::Env {
                var: ENV_PORT,
                value: raw.clone(),
            })?;
        }
        if let Some(dir) = lookup(ENV_REMOTE_DIR) {
            self.remote_directory = dir;
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_SECS) {
            self.connect_timeout_secs = raw.trim().parse().map_err(|_| ConfigError::Env {
                var: ENV_TIMEOUT_SECS,
                value: raw.clone(),
            })?;
        }
        Ok(())
    }

    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(host) = &overrides.host {
            self.host = host.clone();
        }
        if let Some(port) = overrides.port {
            self.port = port;
        }
        if let Some(dir) = &overrides.remote_directory {
            self.remote_directory = dir.clone();
        }
        if let Some(secs) = overrides.connect_timeout_secs {
            self.connect_timeout_secs = secs;
        }
        if let Some(policy) = overrides.host_key_policy {
            self.host_key_policy = policy;
        }
        if let Some(path) = &overrides.known_hosts_file {
            self.known_hosts_file = Some(path.clone());
        }
        if let Some(policy) = overrides.on_conflict {
            self.on_conflict = policy;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Invalid("host must not be empty".into()));
        }
        if self.port == 0 {
            return Err(ConfigError::Invalid("port must be between 1 and 65535".into()));
        }
        if self.connect_timeout_secs == 0 {
            return Err(ConfigError::Invalid("connectTimeoutSecs must be at least 1".into()));
        }
        Ok(())
    }

    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            connect_timeout_secs: self.connect_timeout_secs,
            host_key_policy: self.host_key_policy,
            known_hosts_file: self.known_hosts_file.clone(),
        }
    }

    /// Credentials for one attempt against the configured inbox.
    pub fn credentials(&self, username: &str, secret: SecretString) -> TransferCredentials {
        TransferCredentials::from_secret(
            self.host.clone(),
            self.port,
            username,
            secret,
            self.remote_directory.clone(),
        )
    }
}
