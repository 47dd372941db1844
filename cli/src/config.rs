//! `$SAFEROUTE_HOME/config.toml` plus environment and flag overrides.

use anyhow::Context;
use anyhow::Result;
use anyhow::anyhow;
use anyhow::bail;
use dirs::home_dir;
use saferoute_channel::Backoff;
use saferoute_channel::ConnectOptions;
use saferoute_channel::RetryPolicy;
use serde::Deserialize;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

pub const CONFIG_FILE: &str = "config.toml";
pub const HOME_ENV: &str = "SAFEROUTE_HOME";
pub const API_URL_ENV: &str = "SAFEROUTE_API_URL";
pub const SOCKET_URL_ENV: &str = "SAFEROUTE_SOCKET_URL";

const DEFAULT_SERVER: &str = "http://127.0.0.1:5001";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    #[default]
    Fixed,
    Exponential,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChannelSection {
    pub reconnection: bool,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    pub backoff: BackoffKind,
    pub backoff_factor: u32,
    pub max_delay_ms: u64,
    pub namespace: String,
    pub handshake_timeout_secs: u64,
}

impl Default for ChannelSection {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        let options = ConnectOptions::default();
        Self {
            reconnection: retry.reconnection,
            max_attempts: retry.max_attempts,
            retry_delay_ms: retry.retry_delay.as_millis() as u64,
            backoff: BackoffKind::Fixed,
            backoff_factor: 2,
            max_delay_ms: saferoute_channel::DEFAULT_MAX_DELAY.as_millis() as u64,
            namespace: options.namespace,
            handshake_timeout_secs: options.handshake_timeout.as_secs(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimelapseSection {
    pub default_radius_km: f64,
}

impl Default for TimelapseSection {
    fn default() -> Self {
        Self {
            default_radius_km: 10.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SafeRouteConfig {
    pub api_base_url: String,
    pub socket_url: String,
    pub request_timeout_secs: u64,
    pub channel: ChannelSection,
    pub timelapse: TimelapseSection,
}

impl Default for SafeRouteConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_SERVER.to_string(),
            socket_url: DEFAULT_SERVER.to_string(),
            request_timeout_secs: 30,
            channel: ChannelSection::default(),
            timelapse: TimelapseSection::default(),
        }
    }
}

/// Values given on the command line; they win over the file and the
/// environment.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub api_base_url: Option<String>,
    pub socket_url: Option<String>,
}

impl SafeRouteConfig {
    pub fn load(overrides: ConfigOverrides) -> Result<Self> {
        let home = find_saferoute_home()?;
        Self::load_from(&home, overrides)
    }

    pub fn load_from(home: &Path, overrides: ConfigOverrides) -> Result<Self> {
        let path = home.join(CONFIG_FILE);
        let mut config = match std::fs::read_to_string(&path) {
            Ok(raw) => toml::from_str::<Self>(&raw)
                .with_context(|| format!("failed to parse {}", path.display()))?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no config file, using defaults");
                Self::default()
            }
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read {}", path.display()));
            }
        };

        if let Some(url) = env_override(API_URL_ENV) {
            config.api_base_url = url;
        }
        if let Some(url) = env_override(SOCKET_URL_ENV) {
            config.socket_url = url;
        }
        if let Some(url) = overrides.api_base_url {
            config.api_base_url = url;
        }
        if let Some(url) = overrides.socket_url {
            config.socket_url = url;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_base_url.trim().is_empty() {
            bail!("api_base_url must not be empty");
        }
        if self.socket_url.trim().is_empty() {
            bail!("socket_url must not be empty");
        }
        if self.request_timeout_secs == 0 {
            bail!("request_timeout_secs must be at least 1");
        }
        let radius = self.timelapse.default_radius_km;
        if !radius.is_finite() || radius <= 0.0 {
            bail!("timelapse.default_radius_km must be positive, got {radius}");
        }
        if !self.channel.namespace.starts_with('/') {
            bail!(
                "channel.namespace must start with '/', got {:?}",
                self.channel.namespace
            );
        }
        if self.channel.reconnection && self.channel.max_attempts == 0 {
            bail!("channel.max_attempts must be at least 1 when reconnection is enabled");
        }
        if self.channel.handshake_timeout_secs == 0 {
            bail!("channel.handshake_timeout_secs must be at least 1");
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_options(&self) -> ConnectOptions {
        let channel = &self.channel;
        let backoff = match channel.backoff {
            BackoffKind::Fixed => Backoff::Fixed,
            BackoffKind::Exponential => Backoff::Exponential {
                factor: channel.backoff_factor,
                max_delay: Duration::from_millis(channel.max_delay_ms),
            },
        };
        let retry = RetryPolicy {
            reconnection: channel.reconnection,
            max_attempts: channel.max_attempts,
            retry_delay: Duration::from_millis(channel.retry_delay_ms),
            backoff,
        };
        ConnectOptions {
            handshake_timeout: Duration::from_secs(channel.handshake_timeout_secs),
            ..ConnectOptions::default()
        }
        .with_retry(retry)
        .with_namespace(channel.namespace.clone())
    }
}

fn env_override(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

/// `$SAFEROUTE_HOME` when set, otherwise `~/.saferoute`. The directory does
/// not have to exist.
pub fn find_saferoute_home() -> Result<PathBuf> {
    if let Some(home) = env_override(HOME_ENV) {
        return Ok(PathBuf::from(home));
    }
    let mut home = home_dir().ok_or_else(|| anyhow!("Could not locate home directory"))?;
    home.push(".saferoute");
    Ok(home)
}
