//! Ranging duties.
//!
//! [`RangingCycle`] is the initiator: after each scheduled wait it takes the
//! radio, walks the registry in slot order and measures the distance to
//! every peer. [`Responder`] answers other nodes' polls whenever the
//! initiator is not using the radio.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};

use sonde_core::{NodeParams, PeerId, PeerRegistry};

use crate::arbiter::RoleArbiter;
use crate::clock::{ticks, TickClock};
use crate::radio::RangingRadio;
use crate::scheduler::{AccessScheduler, Backoff};
use crate::SharedRegistry;

/// What one pass of the initiator did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Polling rate is 0.
    Idle,
    /// Ranging was disabled before the radio could be taken.
    Skipped,
    /// The registry was walked. `ranged` peers were polled, of which
    /// `recorded` produced a plausible distance.
    Swept { ranged: usize, recorded: usize },
}

pub struct RangingCycle<R: RangingRadio> {
    radio: Arc<R>,
    arbiter: Arc<RoleArbiter>,
    registry: SharedRegistry,
    params: watch::Receiver<NodeParams>,
    scheduler: AccessScheduler,
    clock: TickClock,
    attempts: u32,
    idle_ticks: u32,
}

impl<R: RangingRadio> RangingCycle<R> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        radio: Arc<R>,
        arbiter: Arc<RoleArbiter>,
        registry: SharedRegistry,
        params: watch::Receiver<NodeParams>,
        scheduler: AccessScheduler,
        clock: TickClock,
        attempts: u32,
        idle_ticks: u32,
    ) -> Self {
        Self {
            radio,
            arbiter,
            registry,
            params,
            scheduler,
            clock,
            attempts: attempts.max(1),
            idle_ticks,
        }
    }

    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> anyhow::Result<()> {
        tracing::info!(attempts = self.attempts, "ranging initiator starting");
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("ranging initiator shutting down");
                    return Ok(());
                }

                outcome = self.run_once() => {
                    if let CycleOutcome::Swept { ranged, recorded } = outcome {
                        tracing::trace!(ranged, recorded, "sweep complete");
                    }
                }
            }
        }
    }

    /// Wait out one backoff, then sweep the registry if ranging is enabled.
    pub async fn run_once(&mut self) -> CycleOutcome {
        let rate = self.params.borrow().polling_rate;
        match self.scheduler.next_delay(rate) {
            Backoff::Disabled => {
                tokio::time::sleep(ticks(self.idle_ticks)).await;
                return CycleOutcome::Idle;
            }
            Backoff::Wait(delay) => tokio::time::sleep(ticks(delay)).await,
        }

        let Some(turn) = self.arbiter.begin_initiator().await else {
            return CycleOutcome::Skipped;
        };
        self.radio.enter_initiator_mode();
        let mut registry = self.registry.lock().await;
        let outcome = self.sweep(&mut registry).await;
        self.radio.enter_responder_mode();
        drop(registry);
        drop(turn);
        outcome
    }

    async fn sweep(&self, registry: &mut PeerRegistry) -> CycleOutcome {
        let mut ranged = 0;
        let mut recorded = 0;
        for index in 0..registry.capacity() {
            let Some(peer) = registry.slot(index).map(|r| r.id) else {
                continue;
            };
            ranged += 1;
            let Some(distance) = self.measure(peer).await else {
                tracing::debug!(peer = %peer, "no answer from peer");
                continue;
            };
            let now = self.clock.now();
            if registry.record_result(peer, distance, now) {
                recorded += 1;
                tracing::debug!(peer = %peer, distance, timestamp = now, "range recorded");
            } else {
                tracing::debug!(peer = %peer, distance, "implausible range discarded");
            }
        }
        CycleOutcome::Swept { ranged, recorded }
    }

    /// Average of the successful exchanges, `None` if every one failed.
    async fn measure(&self, peer: PeerId) -> Option<f32> {
        let mut sum = 0.0;
        let mut successes = 0u32;
        for _ in 0..self.attempts {
            match self.radio.perform_exchange(peer).await {
                Ok(distance) => {
                    sum += distance;
                    successes += 1;
                }
                Err(e) => tracing::trace!(error = %e, "exchange attempt failed"),
            }
        }
        (successes > 0).then(|| sum / successes as f32)
    }
}

pub struct Responder<R: RangingRadio> {
    radio: Arc<R>,
    arbiter: Arc<RoleArbiter>,
}

impl<R: RangingRadio> Responder<R> {
    pub fn new(radio: Arc<R>, arbiter: Arc<RoleArbiter>) -> Self {
        Self { radio, arbiter }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) -> anyhow::Result<()> {
        tracing::info!("ranging responder starting");
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("ranging responder shutting down");
                    return Ok(());
                }

                turn = self.arbiter.begin_responder() => {
                    self.radio.respond_once().await;
                    drop(turn);
                }
            }
        }
    }
}
