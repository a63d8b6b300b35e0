//! Configuration for the pollcast adapter.
//!
//! TOML file + environment, validation, and translation to
//! `pollcast_core::AdapterConfig`. The binary layers `--config` on top.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use pollcast_core::{AdapterConfig, BackoffPolicy, SessionConfig, StoreConfig};

/// Prefix of the adapter's own environment variables. `__` separates
/// nesting levels, e.g. `POLLCAST_BROKER__PORT`.
pub const ENV_PREFIX: &str = "POLLCAST_";

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "POLLCAST_CONFIG";

/// Deployment variables accepted for compatibility, and the keys they set.
const LEGACY_ENV: [(&str, &str); 4] = [
    ("SUPABASE_URL", "store.url"),
    ("SUPABASE_SERVICE_KEY", "store.service_key"),
    ("LS_HOST", "broker.host"),
    ("LS_PORT", "broker.port"),
];

const REDACTED: &str = "********";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("missing {field} (set it in the config file or via {env})")]
    Missing { field: String, env: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub broker: BrokerSection,
    #[serde(default)]
    pub store: StoreSection,
    #[serde(default)]
    pub detector: DetectorSection,
    #[serde(default)]
    pub presence: PresenceSection,
    #[serde(default)]
    pub reconnect: ReconnectSection,
}

/// Streaming broker connection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct BrokerSection {
    pub host: String,
    pub port: u16,
    pub connect_timeout_secs: u64,
    /// Idle interval before a `KEEPALIVE` is sent.
    pub keepalive_secs: u64,
}

impl Default for BrokerSection {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 6661,
            connect_timeout_secs: 5,
            keepalive_secs: 10,
        }
    }
}

/// Counter store (PostgREST).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreSection {
    /// Project URL. Required.
    pub url: Option<String>,
    /// Service-role key (plaintext; prefer the environment). Required.
    pub service_key: Option<String>,
    pub table: String,
    pub timeout_secs: u64,
    /// Path to a custom CA certificate.
    pub ca_cert: Option<PathBuf>,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            url: None,
            service_key: None,
            table: "poll_options".into(),
            timeout_secs: 10,
            ca_cert: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct DetectorSection {
    pub interval_ms: u64,
}

impl Default for DetectorSection {
    fn default() -> Self {
        Self { interval_ms: 500 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct PresenceSection {
    pub sweep_interval_secs: u64,
    pub ttl_secs: u64,
}

impl Default for PresenceSection {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 15,
            ttl_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ReconnectSection {
    pub initial_delay_ms: u64,
    pub factor: f64,
    pub max_delay_secs: u64,
    pub max_attempts: u32,
}

impl Default for ReconnectSection {
    fn default() -> Self {
        Self {
            initial_delay_ms: 2000,
            factor: 1.5,
            max_delay_secs: 30,
            max_attempts: 10,
        }
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the default config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("dev", "pollcast", "pollcast").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("pollcast");
    p
}

/// The explicit path if one was given, the default path otherwise.
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    explicit.map_or_else(config_path, Path::to_path_buf)
}

// ── Config loading ──────────────────────────────────────────────────

/// Layered sources, lowest precedence first: built-in defaults, the TOML
/// file (if it exists), deployment variables, `POLLCAST_` variables.
pub fn sources(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(legacy_env())
        .merge(Env::prefixed(ENV_PREFIX).ignore(&["config"]).split("__"))
}

fn legacy_env() -> Env {
    Env::raw().filter_map(|key| {
        LEGACY_ENV
            .iter()
            .find(|(name, _)| key == *name)
            .map(|(_, path)| (*path).into())
    })
}

/// Load the config from `path` + environment. A missing file is not an
/// error; the defaults and environment still apply.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let config: Config = sources(path).extract()?;
    Ok(config)
}

// ── Validation & translation ────────────────────────────────────────

impl Config {
    /// Check required fields and value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.store_url()?;
        self.service_key()?;

        if self.store.table.trim().is_empty() {
            return Err(invalid("store.table", "must not be empty"));
        }
        if self.broker.host.trim().is_empty() {
            return Err(invalid("broker.host", "must not be empty"));
        }
        if self.broker.port == 0 {
            return Err(invalid("broker.port", "must be between 1 and 65535"));
        }
        for (field, value) in [
            ("broker.connect_timeout_secs", self.broker.connect_timeout_secs),
            ("broker.keepalive_secs", self.broker.keepalive_secs),
            ("store.timeout_secs", self.store.timeout_secs),
            ("detector.interval_ms", self.detector.interval_ms),
            ("presence.sweep_interval_secs", self.presence.sweep_interval_secs),
            ("presence.ttl_secs", self.presence.ttl_secs),
            ("reconnect.max_delay_secs", self.reconnect.max_delay_secs),
        ] {
            if value == 0 {
                return Err(invalid(field, "must be greater than zero"));
            }
        }
        if !(self.reconnect.factor.is_finite() && self.reconnect.factor >= 1.0) {
            return Err(invalid(
                "reconnect.factor",
                format!("must be a number >= 1, got {}", self.reconnect.factor),
            ));
        }
        if self.reconnect.max_attempts == 0 {
            return Err(invalid("reconnect.max_attempts", "must be at least 1"));
        }
        Ok(())
    }

    fn store_url(&self) -> Result<Url, ConfigError> {
        let raw = self.store.url.as_deref().ok_or_else(|| ConfigError::Missing {
            field: "store.url".into(),
            env: "SUPABASE_URL".into(),
        })?;
        let url = Url::parse(raw).map_err(|e| invalid("store.url", format!("{raw}: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid("store.url", format!("expected http(s), got {raw}")));
        }
        Ok(url)
    }

    fn service_key(&self) -> Result<SecretString, ConfigError> {
        match self.store.service_key.as_deref() {
            Some(key) if !key.is_empty() => Ok(SecretString::from(key)),
            _ => Err(ConfigError::Missing {
                field: "store.service_key".into(),
                env: "SUPABASE_SERVICE_KEY".into(),
            }),
        }
    }

    /// Validate and build the runtime adapter configuration.
    pub fn to_adapter_config(&self) -> Result<AdapterConfig, ConfigError> {
        self.validate()?;

        let mut store = StoreConfig::new(self.store_url()?, self.service_key()?);
        store.table.clone_from(&self.store.table);
        store.timeout = Duration::from_secs(self.store.timeout_secs);
        store.ca_cert.clone_from(&self.store.ca_cert);

        let mut config = AdapterConfig::new(store);
        config.broker = SessionConfig {
            host: self.broker.host.clone(),
            port: self.broker.port,
            connect_timeout: Duration::from_secs(self.broker.connect_timeout_secs),
            keepalive: Duration::from_secs(self.broker.keepalive_secs),
        };
        config.detector_interval = Duration::from_millis(self.detector.interval_ms);
        config.sweep_interval = Duration::from_secs(self.presence.sweep_interval_secs);
        config.visitor_ttl = Duration::from_secs(self.presence.ttl_secs);
        config.reconnect = BackoffPolicy {
            initial_delay: Duration::from_millis(self.reconnect.initial_delay_ms),
            factor: self.reconnect.factor,
            max_delay: Duration::from_secs(self.reconnect.max_delay_secs),
            max_attempts: self.reconnect.max_attempts,
        };
        Ok(config)
    }

    /// Copy with the service key masked, for display.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.store.service_key.is_some() {
            copy.store.service_key = Some(REDACTED.into());
        }
        copy
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}
