//! sonde integration test harness.
//!
//! Every test boots a complete node in-process on top of the simulated
//! radio and discovery collaborators, drives it through the same command
//! queue the daemon uses, and observes the registry, the console and the
//! simulated hardware. Time is paused, so a test sleeping 5000 ticks runs
//! instantly and deterministically.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use sonde_core::config::{NodeConfig, SimulatedPeer};
use sonde_core::{MemoryStore, PeerId, PeerRecord};
use sonde_services::clock::ticks;
use sonde_services::{
    node, Collaborators, Entropy, NodeHandle, PeerSighting, RadioError, SimDiscovery, SimRadio,
};

mod commands;
mod maintenance;
mod ranging;
mod telemetry;

// ── Harness ───────────────────────────────────────────────────────────────────

/// Config with the given simulated neighbours: `(id, rssi, distance)`.
pub fn config_with(peers: &[(u32, i8, Option<f32>)]) -> NodeConfig {
    let mut config = NodeConfig::default();
    config.node.rng_seed = 7;
    config.simulation.peers = peers
        .iter()
        .map(|&(id, rssi, distance)| SimulatedPeer { id, rssi, distance })
        .collect();
    config
}

pub struct TestNode {
    pub node: NodeHandle,
    pub radio: Arc<SimRadio>,
    pub discovery: Arc<SimDiscovery>,
    pub store: MemoryStore,
    pub console: mpsc::UnboundedReceiver<String>,
    pub sightings: mpsc::Sender<PeerSighting>,
    announcer: JoinHandle<Result<()>>,
}

/// Boot a node against `store`. Clones of one `MemoryStore` share contents,
/// so booting twice with the same store is a restart.
pub fn boot(config: &NodeConfig, store: &MemoryStore) -> Result<TestNode, RadioError> {
    let radio = Arc::new(SimRadio::new(&config.simulation));
    let discovery = Arc::new(SimDiscovery::new(&config.simulation));
    let (sightings, sightings_rx) = mpsc::channel(64);
    let (console_tx, console) = mpsc::unbounded_channel();

    let node = node::start(
        config,
        Collaborators {
            radio: radio.clone(),
            discovery: discovery.clone(),
            store: Arc::new(store.clone()),
            random: Box::new(Entropy::from_seed_setting(config.node.rng_seed)),
        },
        sightings_rx,
        console_tx,
    )?;
    let announcer = tokio::spawn(
        discovery
            .clone()
            .announce(sightings.clone(), node.shutdown_signal().subscribe()),
    );

    Ok(TestNode {
        node,
        radio,
        discovery,
        store: store.clone(),
        console,
        sightings,
        announcer,
    })
}

impl TestNode {
    /// Run one AT line through the command queue and return the reply.
    pub async fn command(&self, line: &str) -> String {
        let command = line.parse().unwrap_or_else(|e| panic!("bad test line {line:?}: {e}"));
        self.node.submit(command).await.expect("command reply")
    }

    /// Everything written to the console since the last drain.
    pub fn drain_console(&mut self) -> Vec<String> {
        std::iter::from_fn(|| self.console.try_recv().ok()).collect()
    }

    pub async fn record(&self, raw: u32) -> Option<PeerRecord> {
        let id = PeerId::new(raw)?;
        self.node.registry.lock().await.get(id).copied()
    }

    pub async fn peer_ids(&self) -> Vec<u32> {
        self.node
            .registry
            .lock()
            .await
            .iter()
            .map(|r| r.id.get())
            .collect()
    }

    pub async fn stop(self) {
        self.node.shutdown().await;
        let _ = self.announcer.await;
    }
}

pub async fn advance(n: u32) {
    tokio::time::sleep(ticks(n)).await;
}

// ── Tests ─────────────────────────────────────────────────────────────────────

/// A fresh node with nothing stored boots idle with default parameters.
#[tokio::test(start_paused = true)]
async fn test_fresh_node_boots_idle() {
    let store = MemoryStore::new();
    let mut node = boot(&config_with(&[(1, -50, Some(1.0))]), &store).unwrap();

    assert!(!node.node.arbiter.ranging_running());
    assert!(!node.node.arbiter.discovery_running());
    let params = node.node.params.borrow().clone();
    assert_eq!(params.polling_rate, 100);
    assert_eq!(params.eviction_timeout, 5000);
    assert_eq!(params.channel, 5);
    assert_eq!(node.radio.channel(), 5);

    // Idle discovery means no peers and no table.
    advance(1000).await;
    assert!(node.peer_ids().await.is_empty());
    assert_eq!(node.drain_console(), vec!["Flash Configuration:"]);

    node.stop().await;
}

/// Radio bring-up failure is fatal.
#[tokio::test(start_paused = true)]
async fn test_radio_init_failure_aborts_boot() {
    let mut config = config_with(&[]);
    config.simulation.fail_init = true;
    let result = boot(&config, &MemoryStore::new());
    assert!(matches!(result, Err(RadioError::InitFailed(_))));
}
