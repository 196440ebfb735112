//! Server configuration: defaults, a TOML file, then environment overrides.
//!
//! ```toml
//! bind = "0.0.0.0:8080"
//! token_secret = "change-me"
//!
//! [session]
//! handshake_timeout_secs = 5
//! idle_timeout_secs = 60
//!
//! [registry]
//! max_connections_per_user = 1
//! shards = 16
//!
//! [credits]
//! warning_at = 1248
//! urgent_at = 1245
//! mode = "level"
//! ```
//!
//! Every key is optional. `BEACON_BIND`, `BEACON_TOKEN_SECRET` and
//! `BEACON_MAX_CONNECTIONS_PER_USER` override the file.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use beacon_notify::{CreditThresholds, ThresholdMode};
use beacon_registry::RegistryConfig;
use beacon_session::SessionConfig;
use serde::Deserialize;

pub const ENV_BIND: &str = "BEACON_BIND";
pub const ENV_TOKEN_SECRET: &str = "BEACON_TOKEN_SECRET";
pub const ENV_MAX_CONNECTIONS_PER_USER: &str = "BEACON_MAX_CONNECTIONS_PER_USER";

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// An environment override could not be parsed.
    #[error("invalid value {value:?} for {var}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("no token secret configured (set BEACON_TOKEN_SECRET or `token_secret`)")]
    MissingTokenSecret,
}

/// Resolved server configuration.
#[derive(Clone)]
pub struct BeaconConfig {
    /// Address the WebSocket listener binds to. Default: `127.0.0.1:8080`.
    pub bind: String,
    /// Default: 5 seconds.
    pub handshake_timeout: Duration,
    /// A connection that sends nothing for this long is closed. Default: 60
    /// seconds.
    pub idle_timeout: Duration,
    /// Default: 1.
    pub max_connections_per_user: usize,
    /// Default: 16.
    pub registry_shards: usize,
    pub credit_thresholds: CreditThresholds,
    /// HMAC secret for bearer tokens. Required by the `beacon-server`
    /// binary.
    pub token_secret: Option<String>,
}

impl std::fmt::Debug for BeaconConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BeaconConfig")
            .field("bind", &self.bind)
            .field("handshake_timeout", &self.handshake_timeout)
            .field("idle_timeout", &self.idle_timeout)
            .field("max_connections_per_user", &self.max_connections_per_user)
            .field("registry_shards", &self.registry_shards)
            .field("credit_thresholds", &self.credit_thresholds)
            .field("token_secret", &self.token_secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Default for BeaconConfig {
    fn default() -> Self {
        let session = SessionConfig::default();
        let registry = RegistryConfig::default();
        Self {
            bind: "127.0.0.1:8080".to_string(),
            handshake_timeout: session.handshake_timeout,
            idle_timeout: Duration::from_secs(60),
            max_connections_per_user: registry.max_connections_per_user,
            registry_shards: registry.shards,
            credit_thresholds: CreditThresholds::default(),
            token_secret: None,
        }
    }
}

impl BeaconConfig {
    /// Loads `path` if it exists, then applies process environment
    /// overrides. A missing file means defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let file = read_toml_if_exists(path)?.unwrap_or_default();
        Self::from_file(file).with_env_overrides(|var| std::env::var(var).ok())
    }

    /// Parses a TOML document on top of the defaults. No env overrides.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let file: FileConfig = toml::from_str(s)?;
        Ok(Self::from_file(file))
    }

    /// Applies overrides resolved through `lookup` (normally
    /// `std::env::var`). Blank values are ignored.
    pub fn with_env_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let get = |var: &str| {
            lookup(var)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(bind) = get(ENV_BIND) {
            tracing::info!(%bind, "config: bind overridden by env");
            self.bind = bind;
        }
        if let Some(secret) = get(ENV_TOKEN_SECRET) {
            tracing::info!("config: token_secret overridden by env");
            self.token_secret = Some(secret);
        }
        if let Some(value) = get(ENV_MAX_CONNECTIONS_PER_USER) {
            self.max_connections_per_user = value
                .parse()
                .ok()
                .filter(|&n: &usize| n > 0)
                .ok_or(ConfigError::InvalidEnv {
                    var: ENV_MAX_CONNECTIONS_PER_USER,
                    value,
                })?;
            tracing::info!(
                max = self.max_connections_per_user,
                "config: max_connections_per_user overridden by env"
            );
        }
        Ok(self)
    }

    /// The configured token secret.
    ///
    /// # Errors
    /// [`ConfigError::MissingTokenSecret`] if none was set.
    pub fn require_token_secret(&self) -> Result<&str, ConfigError> {
        self.token_secret
            .as_deref()
            .ok_or(ConfigError::MissingTokenSecret)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            handshake_timeout: self.handshake_timeout,
        }
    }

    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            max_connections_per_user: self.max_connections_per_user,
            shards: self.registry_shards,
        }
    }

    fn from_file(file: FileConfig) -> Self {
        let defaults = Self::default();
        let thresholds = CreditThresholds {
            warning_at: file
                .credits
                .warning_at
                .unwrap_or(defaults.credit_thresholds.warning_at),
            urgent_at: file
                .credits
                .urgent_at
                .unwrap_or(defaults.credit_thresholds.urgent_at),
            mode: file.credits.mode.unwrap_or(defaults.credit_thresholds.mode),
        };
        Self {
            bind: file
                .bind
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.bind),
            handshake_timeout: file
                .session
                .handshake_timeout_secs
                .map_or(defaults.handshake_timeout, Duration::from_secs),
            idle_timeout: file
                .session
                .idle_timeout_secs
                .map_or(defaults.idle_timeout, Duration::from_secs),
            max_connections_per_user: file
                .registry
                .max_connections_per_user
                .unwrap_or(defaults.max_connections_per_user),
            registry_shards: file.registry.shards.unwrap_or(defaults.registry_shards),
            credit_thresholds: thresholds,
            token_secret: file.token_secret.filter(|s| !s.trim().is_empty()),
        }
    }
}

fn read_toml_if_exists(path: &Path) -> Result<Option<FileConfig>, ConfigError> {
    match fs::read_to_string(path) {
        Ok(s) => Ok(Some(toml::from_str(&s)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Ok(None)
        }
        Err(source) => Err(ConfigError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}

// File model: every field optional so a partial file layers over defaults.

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    bind: Option<String>,
    token_secret: Option<String>,
    #[serde(default)]
    session: FileSessionSettings,
    #[serde(default)]
    registry: FileRegistrySettings,
    #[serde(default)]
    credits: FileCreditSettings,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileSessionSettings {
    handshake_timeout_secs: Option<u64>,
    idle_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileRegistrySettings {
    max_connections_per_user: Option<usize>,
    shards: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileCreditSettings {
    warning_at: Option<i64>,
    urgent_at: Option<i64>,
    mode: Option<ThresholdMode>,
}
