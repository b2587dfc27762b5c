//! Configuration system for sonde.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $SONDE_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/sonde/config.toml
//!   3. ~/.config/sonde/config.toml
//!
//! This file holds daemon tuning only. Parameters an operator changes at
//! runtime (rate, channel, timeout, ...) live in the parameter store.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub node: DaemonConfig,
    pub ranging: RangingConfig,
    pub monitor: MonitorConfig,
    pub telemetry: TelemetryConfig,
    pub command: CommandConfig,
    pub simulation: SimulationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Parameter store file. Empty = volatile in-memory store.
    pub store_path: PathBuf,
    /// Local HTTP status/command port. 0 = disabled.
    pub api_port: u16,
    /// Fixed seed for the backoff random source. 0 = OS entropy.
    pub rng_seed: u64,
}

/// Inter-attempt delay law for the ranging initiator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    /// Uniform in [rate, rate + 50].
    #[default]
    Uniform,
    /// Exponential inter-arrival with a 10 tick floor.
    Exponential,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RangingConfig {
    /// Exchanges per peer per sweep. Successful results are averaged.
    pub attempts: u32,
    pub backoff: BackoffKind,
    /// Sleep while the polling rate is 0.
    pub idle_ticks: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub period_ticks: u32,
    /// Re-rank at least every N monitor passes.
    pub rerank_every: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub period_ticks: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    pub poll_ticks: u32,
    pub queue_depth: usize,
}

/// Simulated radio neighbourhood used when no hardware is attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub peers: Vec<SimulatedPeer>,
    /// Interval between discovery sightings of each peer.
    pub announce_ticks: u32,
    /// Duration of one initiator exchange.
    pub exchange_ticks: u32,
    /// Duration of one responder listen window.
    pub response_window_ticks: u32,
    /// Fail radio bring-up, for exercising the fatal boot path.
    pub fail_init: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedPeer {
    pub id: u32,
    pub rssi: i8,
    /// Distance reported by exchanges. Absent = the peer never answers.
    pub distance: Option<f32>,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            store_path: data_dir().join("params.json"),
            api_port: 9101,
            rng_seed: 0,
        }
    }
}

impl Default for RangingConfig {
    fn default() -> Self {
        Self {
            attempts: 1,
            backoff: BackoffKind::Uniform,
            idle_ticks: 1000,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            period_ticks: 1000,
            rerank_every: 5,
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self { period_ticks: 50 }
    }
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            poll_ticks: 100,
            queue_depth: 25,
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            peers: vec![
                SimulatedPeer { id: 101, rssi: -48, distance: Some(1.25) },
                SimulatedPeer { id: 102, rssi: -63, distance: Some(4.80) },
                SimulatedPeer { id: 103, rssi: -71, distance: None },
            ],
            announce_ticks: 100,
            exchange_ticks: 3,
            response_window_ticks: 20,
            fail_init: false,
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("sonde")
}

pub fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".local").join("share"))
        .join("sonde")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl NodeConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            NodeConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("SONDE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&NodeConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply SONDE_* env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("SONDE_NODE__STORE_PATH") {
            self.node.store_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("SONDE_NODE__API_PORT") {
            if let Ok(p) = v.parse() {
                self.node.api_port = p;
            }
        }
        if let Ok(v) = std::env::var("SONDE_NODE__RNG_SEED") {
            if let Ok(s) = v.parse() {
                self.node.rng_seed = s;
            }
        }
        if let Ok(v) = std::env::var("SONDE_RANGING__ATTEMPTS") {
            if let Ok(n) = v.parse() {
                self.ranging.attempts = n;
            }
        }
        if let Ok(v) = std::env::var("SONDE_RANGING__BACKOFF") {
            match v.as_str() {
                "uniform" => self.ranging.backoff = BackoffKind::Uniform,
                "exponential" => self.ranging.backoff = BackoffKind::Exponential,
                _ => tracing::warn!(value = %v, "unknown backoff law, keeping configured one"),
            }
        }
        if let Ok(v) = std::env::var("SONDE_SIMULATION__FAIL_INIT") {
            self.simulation.fail_init = v == "true" || v == "1";
        }
    }
}
