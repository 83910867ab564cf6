//! Configuration management for mavping.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::pinger::PingerConfig;
use crate::protocol::{CodecConfig, SigningConfig};
use crate::transport::TransportConfig;
use crate::types::{
    Endpoint, EndpointIdentity, PeerIdentity, DEFAULT_SYSTEM_ID, MAV_COMP_ID_AUTOPILOT1,
};

/// Main configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Default endpoint when none is given on the command line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<Endpoint>,

    /// Identity this node answers and sends as.
    #[serde(default)]
    pub identity: IdentityConfig,

    /// Frame codec settings.
    #[serde(default)]
    pub codec: CodecSettings,

    /// Transport configuration.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Ping client defaults.
    #[serde(default)]
    pub pinger: PingerSettings,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Config(format!("Failed to read config: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path.as_ref(), self.to_toml()?)
            .map_err(|e| Error::Config(format!("Failed to write config: {e}")))?;

        Ok(())
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {e}")))
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.identity.system_id == 0 {
            return Err(Error::InvalidConfig(
                "system_id 0 is reserved for broadcast".into(),
            ));
        }
        if self.identity.component_id == 0 {
            return Err(Error::InvalidConfig(
                "component_id 0 is reserved for broadcast".into(),
            ));
        }

        if let Some(key) = &self.codec.signing_key {
            SigningConfig::from_hex(key, self.codec.link_id, self.codec.sign_outgoing)?;
        } else if self.codec.sign_outgoing {
            return Err(Error::InvalidConfig(
                "sign_outgoing requires a signing_key".into(),
            ));
        }

        if self.pinger.interval.is_zero() || self.pinger.timeout.is_zero() {
            return Err(Error::InvalidConfig(
                "Ping interval and timeout must be greater than zero".into(),
            ));
        }

        if self.transport.read_buffer_size == 0 {
            return Err(Error::InvalidConfig(
                "transport.read_buffer_size must be greater than zero".into(),
            ));
        }

        Ok(())
    }

    /// Get default config path.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("org", "mavping", "mavping").map_or_else(
            || PathBuf::from("mavping.toml"),
            |dirs| dirs.config_dir().join("config.toml"),
        )
    }

    /// Create example configuration.
    pub fn example() -> Self {
        Self {
            url: Some(Endpoint::UdpIn {
                addr: format!("0.0.0.0:{}", crate::DEFAULT_UDP_PORT),
            }),
            pinger: PingerSettings {
                count: 10,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// This node's identity.
    pub fn identity(&self) -> EndpointIdentity {
        EndpointIdentity::new(self.identity.system_id, self.identity.component_id)
    }

    /// Codec settings with the signing key parsed.
    pub fn codec_config(&self) -> Result<CodecConfig> {
        let signing = self
            .codec
            .signing_key
            .as_deref()
            .map(|key| SigningConfig::from_hex(key, self.codec.link_id, self.codec.sign_outgoing))
            .transpose()?;

        Ok(CodecConfig {
            force_v2: self.codec.force_v2,
            strict_signing: self.codec.strict_signing,
            signing,
        })
    }

    /// Pinger settings aimed at `target`.
    pub fn pinger_config(&self, target: PeerIdentity) -> PingerConfig {
        PingerConfig {
            target,
            count: (self.pinger.count > 0).then_some(self.pinger.count),
            interval: self.pinger.interval,
            timeout: self.pinger.timeout,
        }
    }
}

/// Node identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Source system id.
    #[serde(default = "default_system_id")]
    pub system_id: u8,

    /// Source component id.
    #[serde(default = "default_component_id")]
    pub component_id: u8,
}

fn default_system_id() -> u8 {
    DEFAULT_SYSTEM_ID
}
fn default_component_id() -> u8 {
    MAV_COMP_ID_AUTOPILOT1
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            system_id: default_system_id(),
            component_id: default_component_id(),
        }
    }
}

/// Codec settings as written in the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecSettings {
    /// Skip MAVLink v1 frames silently instead of reporting them.
    #[serde(default = "default_force_v2")]
    pub force_v2: bool,

    /// Drop signed frames that cannot be verified.
    #[serde(default)]
    pub strict_signing: bool,

    /// 32-byte signing key as 64 hex characters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signing_key: Option<String>,

    /// Link id for outgoing signatures.
    #[serde(default)]
    pub link_id: u8,

    /// Sign outgoing frames.
    #[serde(default)]
    pub sign_outgoing: bool,
}

fn default_force_v2() -> bool {
    true
}

impl Default for CodecSettings {
    fn default() -> Self {
        Self {
            force_v2: default_force_v2(),
            strict_signing: false,
            signing_key: None,
            link_id: 0,
            sign_outgoing: false,
        }
    }
}

/// Ping client defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingerSettings {
    /// Number of pings, 0 = until interrupted.
    #[serde(default)]
    pub count: u32,

    /// Pause between a reply and the next request.
    #[serde(default = "default_ping_interval", with = "humantime_serde")]
    pub interval: Duration,

    /// Reply timeout.
    #[serde(default = "default_ping_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

fn default_ping_interval() -> Duration {
    Duration::from_secs(1)
}
fn default_ping_timeout() -> Duration {
    Duration::from_secs(1)
}

impl Default for PingerSettings {
    fn default() -> Self {
        Self {
            count: 0,
            interval: default_ping_interval(),
            timeout: default_ping_timeout(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text or json).
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Enable colored output.
    #[serde(default = "default_color")]
    pub color: bool,
}

fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "text".into()
}
fn default_color() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            color: default_color(),
        }
    }
}

/// Initialize logging.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.format == "json" {
        subscriber
            .with(fmt::layer().json())
            .try_init()
            .map_err(|e| Error::Config(format!("Failed to init logging: {e}")))?;
    } else {
        subscriber
            .with(fmt::layer().with_ansi(config.color).with_writer(std::io::stderr))
            .try_init()
            .map_err(|e| Error::Config(format!("Failed to init logging: {e}")))?;
    }

    Ok(())
}
