//! Simulated collaborators.
//!
//! `SimRadio` answers exchanges from a table of scripted distances and
//! counts duty conflicts, so tests can assert that the initiator and the
//! responder never shared the radio. `SimDiscovery` announces a fixed set
//! of neighbours while it is running. The daemon uses both when no
//! hardware is attached.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc};
use tokio::time::MissedTickBehavior;

use sonde_core::config::SimulationConfig;
use sonde_core::{PeerId, TxPower};

use crate::clock::ticks;
use crate::discovery::{Discovery, PeerSighting};
use crate::radio::{RadioError, RangingRadio};

// ── Radio ─────────────────────────────────────────────────────────────────────

pub struct SimRadio {
    distances: DashMap<PeerId, f32>,
    exchange_ticks: u32,
    response_window_ticks: u32,
    fail_init: bool,
    initiator_mode: AtomicBool,
    busy: AtomicBool,
    conflicts: AtomicU32,
    exchanges: AtomicU32,
    responses: AtomicU32,
    channel: AtomicU8,
    tx_power: AtomicU32,
}

impl SimRadio {
    pub fn new(config: &SimulationConfig) -> Self {
        let distances = DashMap::new();
        for peer in &config.peers {
            if let (Some(id), Some(distance)) = (PeerId::new(peer.id), peer.distance) {
                distances.insert(id, distance);
            }
        }
        Self {
            distances,
            exchange_ticks: config.exchange_ticks,
            response_window_ticks: config.response_window_ticks,
            fail_init: config.fail_init,
            initiator_mode: AtomicBool::new(false),
            busy: AtomicBool::new(false),
            conflicts: AtomicU32::new(0),
            exchanges: AtomicU32::new(0),
            responses: AtomicU32::new(0),
            channel: AtomicU8::new(0),
            tx_power: AtomicU32::new(TxPower::Default.code()),
        }
    }

    /// Script the distance `peer` answers with. `None` = never answers.
    pub fn set_distance(&self, peer: PeerId, distance: Option<f32>) {
        match distance {
            Some(d) => {
                self.distances.insert(peer, d);
            }
            None => {
                self.distances.remove(&peer);
            }
        }
    }

    pub fn in_initiator_mode(&self) -> bool {
        self.initiator_mode.load(Ordering::SeqCst)
    }

    /// Times a duty started while the radio was busy or in the wrong mode.
    pub fn conflict_count(&self) -> u32 {
        self.conflicts.load(Ordering::SeqCst)
    }

    pub fn exchange_count(&self) -> u32 {
        self.exchanges.load(Ordering::SeqCst)
    }

    pub fn response_count(&self) -> u32 {
        self.responses.load(Ordering::SeqCst)
    }

    /// Configured channel, 0 before the first `set_channel`.
    pub fn channel(&self) -> u8 {
        self.channel.load(Ordering::SeqCst)
    }

    pub fn tx_power(&self) -> TxPower {
        TxPower::from_code(self.tx_power.load(Ordering::SeqCst) as i64).unwrap_or_default()
    }

    fn claim(&self, initiating: bool) {
        let busy = self.busy.swap(true, Ordering::SeqCst);
        if busy || self.in_initiator_mode() != initiating {
            self.conflicts.fetch_add(1, Ordering::SeqCst);
            tracing::warn!(initiating, busy, "radio duty conflict");
        }
    }

    fn release(&self) {
        self.busy.store(false, Ordering::SeqCst);
    }
}

impl RangingRadio for SimRadio {
    fn initialize(&self) -> Result<(), RadioError> {
        if self.fail_init {
            return Err(RadioError::InitFailed("simulated transceiver absent".into()));
        }
        tracing::debug!(peers = self.distances.len(), "simulated radio ready");
        Ok(())
    }

    fn enter_initiator_mode(&self) {
        self.initiator_mode.store(true, Ordering::SeqCst);
    }

    fn enter_responder_mode(&self) {
        self.initiator_mode.store(false, Ordering::SeqCst);
    }

    fn set_channel(&self, channel: u8) -> Result<(), RadioError> {
        self.channel.store(channel, Ordering::SeqCst);
        Ok(())
    }

    fn set_tx_power(&self, level: TxPower) -> Result<(), RadioError> {
        self.tx_power.store(level.code(), Ordering::SeqCst);
        Ok(())
    }

    async fn perform_exchange(&self, peer: PeerId) -> Result<f32, RadioError> {
        self.claim(true);
        self.exchanges.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(ticks(self.exchange_ticks)).await;
        let result = self
            .distances
            .get(&peer)
            .map(|d| *d.value())
            .ok_or(RadioError::ExchangeFailed(peer));
        self.release();
        result
    }

    async fn respond_once(&self) {
        self.claim(false);
        tokio::time::sleep(ticks(self.response_window_ticks.max(1))).await;
        self.responses.fetch_add(1, Ordering::SeqCst);
        self.release();
    }
}

// ── Discovery ─────────────────────────────────────────────────────────────────

pub struct SimDiscovery {
    neighbours: Vec<PeerSighting>,
    announce_ticks: u32,
    running: AtomicBool,
    paused: AtomicBool,
    identity: AtomicU32,
    pauses: AtomicU32,
}

impl SimDiscovery {
    pub fn new(config: &SimulationConfig) -> Self {
        let neighbours = config
            .peers
            .iter()
            .filter_map(|p| match PeerId::new(p.id) {
                Some(id) => Some(PeerSighting { id, rssi: p.rssi }),
                None => {
                    tracing::warn!("ignoring simulated peer with id 0");
                    None
                }
            })
            .collect();
        Self {
            neighbours,
            announce_ticks: config.announce_ticks,
            running: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            identity: AtomicU32::new(0),
            pauses: AtomicU32::new(0),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Identity currently advertised.
    pub fn identity(&self) -> Option<PeerId> {
        PeerId::new(self.identity.load(Ordering::SeqCst))
    }

    /// How many times scanning has been paused.
    pub fn pause_count(&self) -> u32 {
        self.pauses.load(Ordering::SeqCst)
    }

    /// Emit a sighting of every neighbour each announce interval while
    /// running and not paused.
    pub async fn announce(
        self: Arc<Self>,
        sightings: mpsc::Sender<PeerSighting>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> anyhow::Result<()> {
        let mut interval = tokio::time::interval(ticks(self.announce_ticks.max(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.recv() => return Ok(()),

                _ = interval.tick() => {
                    if !self.is_running() || self.is_paused() {
                        continue;
                    }
                    for sighting in &self.neighbours {
                        match sightings.try_send(*sighting) {
                            Ok(()) => {}
                            Err(mpsc::error::TrySendError::Full(_)) => {
                                tracing::trace!(peer = %sighting.id, "sighting queue full");
                            }
                            Err(mpsc::error::TrySendError::Closed(_)) => return Ok(()),
                        }
                    }
                }
            }
        }
    }
}

impl Discovery for SimDiscovery {
    fn start(&self) {
        self.running.store(true, Ordering::SeqCst);
        self.paused.store(false, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
        self.pauses.fetch_add(1, Ordering::SeqCst);
    }

    fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    fn set_identity(&self, id: PeerId) {
        self.identity.store(id.get(), Ordering::SeqCst);
    }
}
