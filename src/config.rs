//! Application-level configuration loading, including the scheduler tunables.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "OPEN_MIC_BACK_CONFIG_PATH";

/// Cap on queued items per room; the queue state is rebroadcast in full on
/// every change, which stays cheap only while rooms hold a few hundred items.
const DEFAULT_MAX_ITEMS_PER_ROOM: usize = 500;
/// Capacity of each room's broadcast channel.
const DEFAULT_BROADCAST_CAPACITY: usize = 16;
/// Seconds a fresh socket may take to identify itself.
const DEFAULT_IDENTIFICATION_TIMEOUT_SECS: u64 = 10;
/// Milliseconds after which clients treat an unacknowledged mutation as
/// failed.
const DEFAULT_ACK_TIMEOUT_MS: u64 = 5000;

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    max_items_per_room: usize,
    broadcast_capacity: usize,
    identification_timeout: Duration,
    ack_timeout: Duration,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to the
    /// baked-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let config: Self = raw.into();
                    info!(path = %path.display(), ?config, "loaded configuration");
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Maximum number of queued items a room accepts.
    pub fn max_items_per_room(&self) -> usize {
        self.max_items_per_room
    }

    /// Capacity of each room's state broadcast channel.
    pub fn broadcast_capacity(&self) -> usize {
        self.broadcast_capacity
    }

    /// How long a fresh socket may take to send its identification frame.
    pub fn identification_timeout(&self) -> Duration {
        self.identification_timeout
    }

    /// Client-side deadline for unacknowledged mutations, advertised in the
    /// identification acknowledgement.
    pub fn ack_timeout(&self) -> Duration {
        self.ack_timeout
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            max_items_per_room: DEFAULT_MAX_ITEMS_PER_ROOM,
            broadcast_capacity: DEFAULT_BROADCAST_CAPACITY,
            identification_timeout: Duration::from_secs(DEFAULT_IDENTIFICATION_TIMEOUT_SECS),
            ack_timeout: Duration::from_millis(DEFAULT_ACK_TIMEOUT_MS),
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of the configuration file located at
/// [`DEFAULT_CONFIG_PATH`]. Every field is optional; omitted fields keep
/// their default.
struct RawConfig {
    max_items_per_room: Option<usize>,
    broadcast_capacity: Option<usize>,
    identification_timeout_secs: Option<u64>,
    ack_timeout_ms: Option<u64>,
}

impl From<RawConfig> for AppConfig {
    fn from(raw: RawConfig) -> Self {
        let defaults = Self::default();
        Self {
            max_items_per_room: raw
                .max_items_per_room
                .unwrap_or(defaults.max_items_per_room),
            broadcast_capacity: raw
                .broadcast_capacity
                .unwrap_or(defaults.broadcast_capacity),
            identification_timeout: raw
                .identification_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.identification_timeout),
            ack_timeout: raw
                .ack_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.ack_timeout),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_raw_config_keeps_defaults() {
        let raw: RawConfig = serde_json::from_str(r#"{"max_items_per_room": 42}"#).unwrap();
        let config: AppConfig = raw.into();

        assert_eq!(config.max_items_per_room(), 42);
        assert_eq!(
            config.broadcast_capacity(),
            AppConfig::default().broadcast_capacity()
        );
        assert_eq!(config.ack_timeout(), AppConfig::default().ack_timeout());
    }
}
