//! sonde-core — peer registry, node parameters, parameter store and command
//! syntax. All other sonde crates depend on this one.

pub mod command;
pub mod config;
pub mod params;
pub mod registry;
pub mod store;

pub use command::{Command, LexError};
pub use params::{BootMode, NodeParams, ParamKey, StreamMode, TxPower, ValidationError};
pub use registry::{PeerId, PeerRecord, PeerRegistry, RegistryError, Upsert, MAX_PEERS};
pub use store::{FileStore, KvStore, MemoryStore, StoreError};
