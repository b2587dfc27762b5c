//! Node parameters — the persisted, command-mutable part of the configuration.
//!
//! Each parameter lives under a fixed store key. Values are validated here
//! both when a command changes them and when they are restored at boot, so a
//! corrupt store entry can never put the node into a state a command could not.

use serde::{Deserialize, Serialize};

use crate::registry::PeerId;
use crate::store::KvStore;

pub const DEFAULT_POLLING_RATE: u32 = 100;
pub const MAX_POLLING_RATE: u32 = 500;
pub const DEFAULT_EVICTION_TIMEOUT: u32 = 5000;
pub const DEFAULT_CHANNEL: u8 = 5;
pub const MAX_CHANNEL: u8 = 7;
/// Channel 6 is not supported by the transceiver.
pub const RESERVED_CHANNEL: u8 = 6;

/// Store keys. The discriminants are the on-flash record keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKey {
    Identity = 1,
    BootMode = 2,
    PollingRate = 3,
    Channel = 4,
    EvictionTimeout = 5,
    TxPower = 6,
    StreamMode = 7,
}

impl ParamKey {
    pub const ALL: [ParamKey; 7] = [
        ParamKey::Identity,
        ParamKey::BootMode,
        ParamKey::PollingRate,
        ParamKey::Channel,
        ParamKey::EvictionTimeout,
        ParamKey::TxPower,
        ParamKey::StreamMode,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ParamKey::Identity => "identity",
            ParamKey::BootMode => "boot_mode",
            ParamKey::PollingRate => "polling_rate",
            ParamKey::Channel => "channel",
            ParamKey::EvictionTimeout => "eviction_timeout",
            ParamKey::TxPower => "tx_power",
            ParamKey::StreamMode => "stream_mode",
        }
    }
}

/// Transmit power level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxPower {
    #[default]
    Default,
    Max,
}

impl TxPower {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(TxPower::Default),
            1 => Some(TxPower::Max),
            _ => None,
        }
    }

    pub fn code(self) -> u32 {
        match self {
            TxPower::Default => 0,
            TxPower::Max => 1,
        }
    }
}

/// Telemetry mode: every live peer each period, or only peers that changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamMode {
    #[default]
    Full,
    Delta,
}

impl StreamMode {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(StreamMode::Full),
            1 => Some(StreamMode::Delta),
            _ => None,
        }
    }

    pub fn code(self) -> u32 {
        match self {
            StreamMode::Full => 0,
            StreamMode::Delta => 1,
        }
    }
}

/// Which subsystems come up on their own at boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BootMode {
    #[default]
    Idle,
    Discovery,
    DiscoveryAndRanging,
}

impl BootMode {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(BootMode::Idle),
            1 => Some(BootMode::Discovery),
            2 => Some(BootMode::DiscoveryAndRanging),
            _ => None,
        }
    }

    pub fn code(self) -> u32 {
        match self {
            BootMode::Idle => 0,
            BootMode::Discovery => 1,
            BootMode::DiscoveryAndRanging => 2,
        }
    }

    pub fn starts_discovery(self) -> bool {
        !matches!(self, BootMode::Idle)
    }

    pub fn starts_ranging(self) -> bool {
        matches!(self, BootMode::DiscoveryAndRanging)
    }
}

/// A rejected parameter. The message is the reply sent back to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid node ID")]
    Identity,
    #[error("Invalid bootmode parameter")]
    BootMode,
    #[error("Invalid rate parameter")]
    PollingRate,
    #[error("Invalid Channel number")]
    Channel,
    #[error("Timeout cannot be negative")]
    EvictionTimeout,
    #[error("Tx Power parameter input error")]
    TxPower,
    #[error("Stream mode parameter input error")]
    StreamMode,
}

/// Live node parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeParams {
    /// Advertised identity. `None` until one is assigned.
    pub identity: Option<PeerId>,
    pub boot_mode: BootMode,
    /// Initiator attempts per window. 0 disables the initiator.
    pub polling_rate: u32,
    /// Ticks without a ranging result before a peer is dropped.
    pub eviction_timeout: u32,
    pub channel: u8,
    pub tx_power: TxPower,
    pub stream_mode: StreamMode,
}

impl Default for NodeParams {
    fn default() -> Self {
        Self {
            identity: None,
            boot_mode: BootMode::Idle,
            polling_rate: DEFAULT_POLLING_RATE,
            eviction_timeout: DEFAULT_EVICTION_TIMEOUT,
            channel: DEFAULT_CHANNEL,
            tx_power: TxPower::Default,
            stream_mode: StreamMode::Full,
        }
    }
}

pub fn valid_channel(channel: i64) -> bool {
    (1..=MAX_CHANNEL as i64).contains(&channel) && channel != RESERVED_CHANNEL as i64
}

impl NodeParams {
    /// Validate `raw` for `key` and apply it. Returns the value to persist.
    pub fn set(&mut self, key: ParamKey, raw: i64) -> Result<u32, ValidationError> {
        match key {
            ParamKey::Identity => {
                let id = u32::try_from(raw)
                    .ok()
                    .and_then(PeerId::new)
                    .ok_or(ValidationError::Identity)?;
                self.identity = Some(id);
                Ok(id.get())
            }
            ParamKey::BootMode => {
                let mode = BootMode::from_code(raw).ok_or(ValidationError::BootMode)?;
                self.boot_mode = mode;
                Ok(mode.code())
            }
            ParamKey::PollingRate => {
                let rate = u32::try_from(raw)
                    .ok()
                    .filter(|r| *r <= MAX_POLLING_RATE)
                    .ok_or(ValidationError::PollingRate)?;
                self.polling_rate = rate;
                Ok(rate)
            }
            ParamKey::Channel => {
                if !valid_channel(raw) {
                    return Err(ValidationError::Channel);
                }
                self.channel = raw as u8;
                Ok(raw as u32)
            }
            ParamKey::EvictionTimeout => {
                let timeout = u32::try_from(raw).map_err(|_| ValidationError::EvictionTimeout)?;
                self.eviction_timeout = timeout;
                Ok(timeout)
            }
            ParamKey::TxPower => {
                let level = TxPower::from_code(raw).ok_or(ValidationError::TxPower)?;
                self.tx_power = level;
                Ok(level.code())
            }
            ParamKey::StreamMode => {
                let mode = StreamMode::from_code(raw).ok_or(ValidationError::StreamMode)?;
                self.stream_mode = mode;
                Ok(mode.code())
            }
        }
    }

    /// Current value of `key` in its stored form. `None` for an unset identity.
    pub fn get(&self, key: ParamKey) -> Option<u32> {
        match key {
            ParamKey::Identity => self.identity.map(PeerId::get),
            ParamKey::BootMode => Some(self.boot_mode.code()),
            ParamKey::PollingRate => Some(self.polling_rate),
            ParamKey::Channel => Some(self.channel as u32),
            ParamKey::EvictionTimeout => Some(self.eviction_timeout),
            ParamKey::TxPower => Some(self.tx_power.code()),
            ParamKey::StreamMode => Some(self.stream_mode.code()),
        }
    }

    /// Defaults overridden by whatever the store holds.
    ///
    /// The boot mode is only honoured once an identity has been assigned.
    /// Unreadable or out-of-range entries are logged and skipped.
    pub fn restore(store: &dyn KvStore) -> Self {
        let mut params = NodeParams::default();
        for key in ParamKey::ALL {
            if key == ParamKey::BootMode && params.identity.is_none() {
                continue;
            }
            match store.read(key) {
                Ok(Some(value)) => {
                    if let Err(e) = params.set(key, value as i64) {
                        tracing::warn!(key = key.as_str(), value, error = %e, "ignoring stored parameter");
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(key = key.as_str(), error = %e, "failed to read stored parameter");
                }
            }
        }
        params
    }
}
