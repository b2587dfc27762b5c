//! Peer registry — fixed-capacity table of nearby ranging peers.
//!
//! Slots are filled by discovery, refreshed by ranging results and emptied
//! by the maintenance monitor. Slot order carries no meaning except right
//! after [`PeerRegistry::rerank`], when live peers are sorted by signal
//! strength. Any insert or eviction invalidates that order again.
//!
//! The registry itself is a plain data structure. Callers share it behind a
//! single mutex and hold the guard for every multi-record operation.

use std::fmt;
use std::num::NonZeroU32;

use serde::Serialize;

use crate::params::StreamMode;

/// Number of peer slots.
pub const MAX_PEERS: usize = 20;

/// Ranging results outside this band are treated as failed exchanges.
pub const MIN_PLAUSIBLE_DISTANCE: f32 = -5.0;
pub const MAX_PLAUSIBLE_DISTANCE: f32 = 100.0;

/// Stable numeric identity of a node. Zero is never a valid identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct PeerId(NonZeroU32);

impl PeerId {
    /// Returns `None` for the reserved value 0.
    pub fn new(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One live peer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PeerRecord {
    pub id: PeerId,
    /// Last accepted ranging result. `None` until the first one lands.
    pub distance: Option<f32>,
    /// Signal strength from the most recent discovery sighting.
    pub rssi: i8,
    /// Tick of the last accepted ranging result. 0 = never ranged.
    pub timestamp: u32,
    /// Set by a ranging result, cleared when delta telemetry emits the record.
    pub dirty: bool,
}

impl PeerRecord {
    pub fn new(id: PeerId, rssi: i8) -> Self {
        Self {
            id,
            distance: None,
            rssi,
            timestamp: 0,
            dirty: false,
        }
    }
}

/// What an upsert did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    /// New record placed in the given slot.
    Inserted(usize),
    /// Existing record in the given slot had its signal strength refreshed.
    Refreshed(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("peer registry full ({capacity} slots), dropping peer {id}")]
    Full { id: PeerId, capacity: usize },
}

/// Fixed-capacity peer table.
#[derive(Debug, Clone)]
pub struct PeerRegistry<const N: usize = MAX_PEERS> {
    slots: [Option<PeerRecord>; N],
    /// Raised by an insert, consumed by the maintenance monitor.
    peer_added: bool,
}

impl<const N: usize> Default for PeerRegistry<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> PeerRegistry<N> {
    pub fn new() -> Self {
        Self {
            slots: [None; N],
            peer_added: false,
        }
    }

    pub fn capacity(&self) -> usize {
        N
    }

    /// Number of live peers.
    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    pub fn get(&self, id: PeerId) -> Option<&PeerRecord> {
        self.iter().find(|r| r.id == id)
    }

    /// The record in slot `index`, if that slot is live.
    pub fn slot(&self, index: usize) -> Option<&PeerRecord> {
        self.slots.get(index)?.as_ref()
    }

    /// Live records in slot order. Does not touch dirty flags.
    pub fn iter(&self) -> impl Iterator<Item = &PeerRecord> {
        self.slots.iter().flatten()
    }

    fn position(&self, id: PeerId) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| matches!(slot, Some(r) if r.id == id))
    }

    /// Insert a newly sighted peer or refresh the signal strength of a known one.
    ///
    /// Refreshing never touches the timestamp; only a ranging result does.
    pub fn upsert(&mut self, id: PeerId, rssi: i8) -> Result<Upsert, RegistryError> {
        if let Some(index) = self.position(id) {
            if let Some(record) = self.slots[index].as_mut() {
                record.rssi = rssi;
            }
            return Ok(Upsert::Refreshed(index));
        }

        let index = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(RegistryError::Full { id, capacity: N })?;
        self.slots[index] = Some(PeerRecord::new(id, rssi));
        self.peer_added = true;
        Ok(Upsert::Inserted(index))
    }

    /// Store a ranging result. Returns false (and changes nothing) when the
    /// peer is unknown or the distance is outside the plausibility band.
    pub fn record_result(&mut self, id: PeerId, distance: f32, now: u32) -> bool {
        if !(MIN_PLAUSIBLE_DISTANCE..=MAX_PLAUSIBLE_DISTANCE).contains(&distance) {
            return false;
        }
        let Some(index) = self.position(id) else {
            return false;
        };
        match self.slots[index].as_mut() {
            Some(record) => {
                record.distance = Some(distance);
                record.timestamp = now;
                record.dirty = true;
                true
            }
            None => false,
        }
    }

    /// Drop every peer whose last result is at least `timeout` ticks old.
    /// Tick arithmetic wraps, matching the free-running counter.
    pub fn evict_stale(&mut self, now: u32, timeout: u32) -> usize {
        let mut removed = 0;
        for slot in self.slots.iter_mut() {
            if matches!(slot, Some(r) if now.wrapping_sub(r.timestamp) >= timeout) {
                *slot = None;
                removed += 1;
            }
        }
        removed
    }

    /// Stable sort by signal strength, strongest first. Free slots go last.
    pub fn rerank(&mut self) {
        self.slots.sort_by(|a, b| match (a, b) {
            (Some(a), Some(b)) => b.rssi.cmp(&a.rssi),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
    }

    /// Lazy view of the table for telemetry.
    ///
    /// In delta mode only dirty records are yielded, and each one has its
    /// dirty flag cleared as it is consumed.
    pub fn snapshot(&mut self, mode: StreamMode) -> Snapshot<'_> {
        Snapshot {
            slots: self.slots.iter_mut(),
            mode,
        }
    }

    /// Read and clear the "new peer observed" flag.
    pub fn take_peer_added(&mut self) -> bool {
        std::mem::take(&mut self.peer_added)
    }
}

/// Iterator returned by [`PeerRegistry::snapshot`].
pub struct Snapshot<'a> {
    slots: std::slice::IterMut<'a, Option<PeerRecord>>,
    mode: StreamMode,
}

impl Iterator for Snapshot<'_> {
    type Item = PeerRecord;

    fn next(&mut self) -> Option<PeerRecord> {
        for record in self.slots.by_ref().flatten() {
            match self.mode {
                StreamMode::Full => return Some(*record),
                StreamMode::Delta if record.dirty => {
                    let out = *record;
                    record.dirty = false;
                    return Some(out);
                }
                StreamMode::Delta => {}
            }
        }
        None
    }
}
