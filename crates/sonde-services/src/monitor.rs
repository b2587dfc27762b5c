//! Maintenance monitor — evicts silent peers and keeps the registry ordered.
//!
//! Every period the monitor takes the registry, drops peers whose last
//! ranging result is older than the eviction timeout, then re-ranks by
//! signal strength when something changed: a peer was evicted, a new peer
//! was admitted since the last pass, or enough passes went by without a
//! re-rank. Scanning is paused around the re-rank so no sighting lands in
//! a half-sorted table.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tokio::time::MissedTickBehavior;

use sonde_core::NodeParams;

use crate::arbiter::RoleArbiter;
use crate::clock::{ticks, TickClock};
use crate::discovery::Discovery;
use crate::SharedRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MaintenanceReport {
    pub evicted: usize,
    pub reranked: bool,
}

pub struct MaintenanceMonitor<D: Discovery> {
    registry: SharedRegistry,
    arbiter: Arc<RoleArbiter>,
    discovery: Arc<D>,
    params: watch::Receiver<NodeParams>,
    clock: TickClock,
    period_ticks: u32,
    rerank_every: u32,
    passes_since_rerank: u32,
}

impl<D: Discovery> MaintenanceMonitor<D> {
    pub fn new(
        registry: SharedRegistry,
        arbiter: Arc<RoleArbiter>,
        discovery: Arc<D>,
        params: watch::Receiver<NodeParams>,
        clock: TickClock,
        period_ticks: u32,
        rerank_every: u32,
    ) -> Self {
        Self {
            registry,
            arbiter,
            discovery,
            params,
            clock,
            period_ticks: period_ticks.max(1),
            rerank_every,
            passes_since_rerank: 0,
        }
    }

    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> anyhow::Result<()> {
        let period = ticks(self.period_ticks);
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(period_ticks = self.period_ticks, "maintenance monitor starting");

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("maintenance monitor shutting down");
                    return Ok(());
                }

                _ = interval.tick() => {
                    let report = self.run_once().await;
                    if report.evicted > 0 {
                        tracing::info!(evicted = report.evicted, "stale peers evicted");
                    }
                }
            }
        }
    }

    pub async fn run_once(&mut self) -> MaintenanceReport {
        self.passes_since_rerank += 1;
        let timeout = self.params.borrow().eviction_timeout;

        let mut registry = self.registry.lock().await;
        let evicted = registry.evict_stale(self.clock.now(), timeout);
        let peer_added = registry.take_peer_added();
        let due = self.rerank_every > 0 && self.passes_since_rerank >= self.rerank_every;

        let reranked = evicted > 0 || peer_added || due;
        if reranked {
            // Only bracket a scan that is actually running.
            let scanning = self.arbiter.discovery_running();
            if scanning {
                self.discovery.pause();
            }
            registry.rerank();
            if scanning {
                self.discovery.resume();
            }
            self.passes_since_rerank = 0;
            tracing::debug!(peers = registry.len(), evicted, peer_added, "registry re-ranked");
        }

        MaintenanceReport { evicted, reranked }
    }
}
