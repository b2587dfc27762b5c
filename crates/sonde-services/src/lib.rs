//! sonde-services — the tasks that run a ranging node: initiator and
//! responder duties, maintenance, command processing and telemetry, plus
//! the collaborator traits they drive and simulated implementations of them.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use sonde_core::PeerRegistry;

pub mod arbiter;
pub mod boot;
pub mod clock;
pub mod command;
pub mod discovery;
pub mod monitor;
pub mod node;
pub mod radio;
pub mod ranging;
pub mod scheduler;
pub mod sim;
pub mod telemetry;

pub use arbiter::{RoleArbiter, SubsystemState};
pub use clock::TickClock;
pub use command::{CommandProcessor, Envelope};
pub use discovery::{Discovery, PeerSighting};
pub use monitor::{MaintenanceMonitor, MaintenanceReport};
pub use node::{Collaborators, NodeHandle};
pub use radio::{RadioError, RangingRadio};
pub use ranging::{CycleOutcome, RangingCycle, Responder};
pub use scheduler::{AccessScheduler, Backoff, Entropy, RandomSource};
pub use sim::{SimDiscovery, SimRadio};
pub use telemetry::TelemetryPublisher;

/// The peer registry shared by every task. Holding the lock is the
/// exclusive-access guard for the table.
pub type SharedRegistry = Arc<Mutex<PeerRegistry>>;

/// Create a new empty shared registry.
pub fn new_registry() -> SharedRegistry {
    Arc::new(Mutex::new(PeerRegistry::new()))
}

/// Line-oriented operator output: command replies and telemetry tables.
pub type Console = mpsc::UnboundedSender<String>;
