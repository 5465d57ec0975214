//! # Configuration
//!
//! Dispatcher configuration structures and parsing utilities. One TOML file
//! describes everything a run needs: the monitored service, the strategy,
//! the known locations, authentication keys, and the TLS material used to
//! reach the satellites.
//!
//! ## Example TOML
//!
//! ```toml
//! [dispatcher]
//! service = "web-frontend"
//! strategy = "rotate"
//! concurrency = 3
//! cache_file = "/var/cache/satcheck/rotation.json"
//!
//! [tls]
//! ca_file = "/etc/satcheck/ca.pem"
//! cert_file = "/etc/satcheck/client.pem"
//! key_file = "/etc/satcheck/client.key"
//! verify = "peer"
//!
//! [auth]
//! default_key = "shared-secret"
//!
//! [[locations]]
//! hostname = "sat1.example.net"
//! ipaddr = "192.0.2.11"
//!
//! [command]
//! check = "http"
//! url = "https://service.example.net/health"
//! ```

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

use crate::common::messages::Location;
use crate::dispatch::strategy::Strategy;

/// Fatal configuration problem, reported before any dispatch begins.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    Missing(&'static str),
    #[error("invalid setting {setting}: {reason}")]
    Invalid {
        setting: &'static str,
        reason: String,
    },
}

/// Load a TOML configuration file and deserialize it into the specified type.
///
/// # Example
/// ```ignore
/// let config: DispatcherConfig = load_config("satcheck.toml")?;
/// ```
pub fn load_config<T>(path: &str) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    let content = fs::read_to_string(path)?;
    let config: T = toml::from_str(&content)?;
    Ok(config)
}

/// Complete dispatcher configuration loaded from one TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    pub dispatcher: DispatcherSection,
    #[serde(default)]
    pub tls: TlsConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    /// Locations supplied fresh for this invocation
    #[serde(default)]
    pub locations: Vec<Location>,
    /// Opaque check command forwarded verbatim to every satellite
    #[serde(default)]
    pub command: Value,
}

/// The `[dispatcher]` section: what to check, how, and from where.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherSection {
    /// Service identifier keying the rotation cache
    pub service: String,
    pub strategy: Strategy,
    /// Worker bound for the `multiple` strategy
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Rotation cache path; required for the `rotate` strategy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_file: Option<PathBuf>,
    /// Port the satellite service listens on
    #[serde(default = "default_satellite_port")]
    pub satellite_port: u16,
}

fn default_concurrency() -> usize {
    3
}

fn default_satellite_port() -> u16 {
    6556
}

/// Peer certificate verification mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerifyMode {
    /// Verify the satellite certificate against the CA bundle and check the
    /// peer name against the location hostname
    #[default]
    Peer,
    /// Accept any certificate (encryption without authentication)
    None,
}

/// The `[tls]` section: material for the encrypted satellite connections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TlsConfig {
    /// CA bundle used to verify satellite certificates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_file: Option<PathBuf>,
    /// Client certificate presented to the satellites
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_file: Option<PathBuf>,
    /// Private key for the client certificate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_file: Option<PathBuf>,
    #[serde(default)]
    pub verify: VerifyMode,
}

/// The `[auth]` section: satellite authentication keys.
///
/// Resolution order for one location: the location's own `authkey` override,
/// then the hostname-keyed table, then the global default, then empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_key: Option<String>,
    /// Hostname-keyed overrides
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub keys: HashMap<String, String>,
}

impl AuthConfig {
    /// Resolve the authentication key to present to one location.
    pub fn resolve(&self, location: &Location) -> String {
        if let Some(key) = &location.authkey {
            return key.clone();
        }
        if let Some(key) = self.keys.get(&location.hostname) {
            return key.clone();
        }
        self.default_key.clone().unwrap_or_default()
    }
}

impl DispatcherConfig {
    /// Validate everything that must be right before dispatch begins.
    ///
    /// An empty location list is deliberately NOT a configuration error: it
    /// degrades to an UNKNOWN verdict so the monitoring system still gets
    /// exactly one structured answer.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dispatcher.service.is_empty() {
            return Err(ConfigError::Missing("dispatcher.service"));
        }
        if self.dispatcher.concurrency == 0 {
            return Err(ConfigError::Invalid {
                setting: "dispatcher.concurrency",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.dispatcher.strategy == Strategy::Rotate && self.dispatcher.cache_file.is_none() {
            return Err(ConfigError::Missing("dispatcher.cache_file"));
        }
        if self.tls.cert_file.is_some() != self.tls.key_file.is_some() {
            return Err(ConfigError::Invalid {
                setting: "tls.cert_file/tls.key_file",
                reason: "client certificate and key must be configured together".to_string(),
            });
        }
        for location in &self.locations {
            if location.hostname.is_empty() || location.ipaddr.is_empty() {
                return Err(ConfigError::Invalid {
                    setting: "locations",
                    reason: "every location needs a hostname and an ipaddr".to_string(),
                });
            }
        }
        Ok(())
    }
}
