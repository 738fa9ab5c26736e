use crate::mqtt_service::SessionSettings;
use crate::topics::{BoatSelection, DEFAULT_BOAT_ID};
use clap::Parser;
use dotenvy::dotenv;
use rumqttc::QoS;
use std::time::Duration;
use thiserror::Error;

/// Keep-alive travels as a 16-bit field in CONNECT; zero would disable it.
const KEEP_ALIVE_RANGE: std::ops::RangeInclusive<u64> = 1..=u16::MAX as u64;

#[derive(Debug, Clone, Parser)]
#[command(name = "mqtt-sniffer", version, about = "Subscribe to RCBoat MQTT topics")]
pub struct Config {
    /// Broker host or URL (e.g. ssl://host or host)
    #[arg(long, env = "SNIFFER_HOST")]
    pub host: String,

    /// Port (defaults 8883 for ssl, 1883 for tcp)
    #[arg(long, env = "SNIFFER_PORT", value_parser = clap::value_parser!(u16).range(1..))]
    pub port: Option<u16>,

    #[arg(long, env = "SNIFFER_USERNAME")]
    pub username: Option<String>,

    #[arg(long, env = "SNIFFER_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Boat ID to subscribe to
    #[arg(long, env = "SNIFFER_BOAT_ID", default_value = DEFAULT_BOAT_ID)]
    pub boat_id: String,

    /// Subscribe to all boats (uses +)
    #[arg(long, env = "SNIFFER_WILDCARD")]
    pub wildcard: bool,

    #[arg(long, env = "SNIFFER_QOS", default_value_t = 1, value_parser = clap::value_parser!(u8).range(0..=2))]
    pub qos: u8,

    /// Client ID (defaults to rcboat_sniffer_<unix time>)
    #[arg(long, env = "SNIFFER_CLIENT_ID")]
    pub client_id: Option<String>,

    /// Keep-alive interval in seconds
    #[arg(long, default_value_t = 60)]
    pub keep_alive: u64,

    /// Shortest delay between reconnect attempts, in seconds
    #[arg(long, default_value_t = 1)]
    pub min_backoff: u64,

    /// Longest delay between reconnect attempts, in seconds
    #[arg(long, default_value_t = 60)]
    pub max_backoff: u64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("--min-backoff must be at least 1 second and not above --max-backoff ({min}s > {max}s)")]
    InvalidBackoff { min: u64, max: u64 },
    #[error("--keep-alive must be between 1 and 65535 seconds, got {0}")]
    KeepAliveOutOfRange(u64),
    #[error("QoS must be 0, 1 or 2, got {0}")]
    InvalidQos(u8),
}

impl Config {
    /// Load `.env` (if any), then parse the command line with environment
    /// fallbacks. clap exits on its own for usage errors and `--help`.
    pub fn load() -> Result<Self, ConfigError> {
        dotenv().ok();
        let config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_backoff == 0 || self.min_backoff > self.max_backoff {
            return Err(ConfigError::InvalidBackoff {
                min: self.min_backoff,
                max: self.max_backoff,
            });
        }
        if !KEEP_ALIVE_RANGE.contains(&self.keep_alive) {
            return Err(ConfigError::KeepAliveOutOfRange(self.keep_alive));
        }
        self.qos()?;
        Ok(())
    }

    pub fn qos(&self) -> Result<QoS, ConfigError> {
        match self.qos {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            other => Err(ConfigError::InvalidQos(other)),
        }
    }

    pub fn selection(&self) -> BoatSelection {
        BoatSelection::from_flags(&self.boat_id, self.wildcard)
    }

    /// Credentials are only sent when a username is set; a missing password
    /// becomes the empty string.
    pub fn credentials(&self) -> Option<(String, String)> {
        self.username
            .as_ref()
            .filter(|name| !name.is_empty())
            .map(|name| (name.clone(), self.password.clone().unwrap_or_default()))
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            keep_alive: Duration::from_secs(self.keep_alive),
            min_backoff: Duration::from_secs(self.min_backoff),
            max_backoff: Duration::from_secs(self.max_backoff),
            ..SessionSettings::default()
        }
    }
}
