//! Peer discovery interface and the intake task that feeds the registry.
//!
//! The discovery radio reports every peer it hears as a [`PeerSighting`].
//! The intake loop upserts sightings into the shared registry; when the
//! table is full the candidate is dropped and will be offered again by its
//! next sighting.

use tokio::sync::{broadcast, mpsc};

use sonde_core::{PeerId, Upsert};

use crate::SharedRegistry;

/// A peer heard by the discovery radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerSighting {
    pub id: PeerId,
    pub rssi: i8,
}

/// Advertising and scanning radio.
pub trait Discovery: Send + Sync + 'static {
    /// Start advertising our identity and scanning for peers.
    fn start(&self);
    /// Stop both advertising and scanning.
    fn stop(&self);
    /// Hold scanning while the registry is being reordered.
    fn pause(&self);
    fn resume(&self);
    /// Identity to advertise from now on.
    fn set_identity(&self, id: PeerId);
}

/// Upsert sightings into the registry until shutdown or until every sender
/// is gone.
pub async fn intake_loop(
    registry: SharedRegistry,
    mut sightings: mpsc::Receiver<PeerSighting>,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    tracing::info!("discovery intake starting");
    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("discovery intake shutting down");
                return Ok(());
            }

            sighting = sightings.recv() => {
                let Some(sighting) = sighting else {
                    tracing::info!("discovery source closed");
                    return Ok(());
                };
                let result = registry.lock().await.upsert(sighting.id, sighting.rssi);
                match result {
                    Ok(Upsert::Inserted(slot)) => {
                        tracing::debug!(peer = %sighting.id, rssi = sighting.rssi, slot, "peer discovered");
                    }
                    Ok(Upsert::Refreshed(_)) => {
                        tracing::trace!(peer = %sighting.id, rssi = sighting.rssi, "peer refreshed");
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "dropping sighting");
                    }
                }
            }
        }
    }
}
