//! Telemetry — periodic neighbour table on the console.
//!
//! While discovery is running the table is printed every period. In full
//! mode every known peer is listed each time. In delta mode only peers with
//! a ranging result not yet reported are listed, and nothing at all is
//! printed when there are none.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tokio::time::MissedTickBehavior;

use sonde_core::{NodeParams, PeerRecord, StreamMode};

use crate::arbiter::RoleArbiter;
use crate::clock::ticks;
use crate::{Console, SharedRegistry};

pub const TABLE_HEADER: &str = "# ID, RANGE, RSSI, TIMESTAMP";

/// One table row. Peers never ranged report a distance of 0.
pub fn format_row(record: &PeerRecord) -> String {
    format!(
        "{}, {:.6}, {}, {}",
        record.id,
        record.distance.unwrap_or(0.0),
        record.rssi,
        record.timestamp
    )
}

pub struct TelemetryPublisher {
    registry: SharedRegistry,
    arbiter: Arc<RoleArbiter>,
    params: watch::Receiver<NodeParams>,
    console: Console,
    period_ticks: u32,
}

impl TelemetryPublisher {
    pub fn new(
        registry: SharedRegistry,
        arbiter: Arc<RoleArbiter>,
        params: watch::Receiver<NodeParams>,
        console: Console,
        period_ticks: u32,
    ) -> Self {
        Self {
            registry,
            arbiter,
            params,
            console,
            period_ticks: period_ticks.max(1),
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) -> anyhow::Result<()> {
        let mut interval = tokio::time::interval(ticks(self.period_ticks));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("telemetry publisher shutting down");
                    return Ok(());
                }

                _ = interval.tick() => {
                    if self.arbiter.discovery_running() {
                        self.publish_once().await;
                    }
                }
            }
        }
    }

    /// Print one table. Returns the number of rows printed.
    pub async fn publish_once(&self) -> usize {
        let mode = self.params.borrow().stream_mode;
        let rows: Vec<String> = {
            let mut registry = self.registry.lock().await;
            registry.snapshot(mode).map(|r| format_row(&r)).collect()
        };
        if mode == StreamMode::Delta && rows.is_empty() {
            return 0;
        }

        let _ = self.console.send(TABLE_HEADER.to_string());
        let count = rows.len();
        for row in rows {
            let _ = self.console.send(row);
        }
        count
    }
}
