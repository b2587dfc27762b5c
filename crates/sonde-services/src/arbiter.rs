//! Role arbitration for the ranging radio.
//!
//! The radio is shared by two duties: the initiator (polling peers) and the
//! responder (answering peers' polls). They must never overlap. Two separate
//! pieces of state keep them apart:
//!
//! - whether ranging is enabled at all, published on a watch channel so
//!   both duties can park cheaply while it is off;
//! - the radio guard, a mutex held for the full length of one duty.
//!
//! An initiator turn additionally closes the responder gate before queueing
//! on the guard, so a responder that is between listen windows yields to a
//! waiting initiator instead of grabbing the radio again.
//!
//! Lock order is radio guard, then registry. Nothing takes them the other
//! way round.

use tokio::sync::{watch, Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubsystemState {
    #[default]
    Stopped,
    Running,
}

impl SubsystemState {
    pub fn as_str(self) -> &'static str {
        match self {
            SubsystemState::Stopped => "stopped",
            SubsystemState::Running => "running",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResponderGate {
    Open,
    Suspended,
}

pub struct RoleArbiter {
    ranging: watch::Sender<SubsystemState>,
    discovery: watch::Sender<SubsystemState>,
    responder: watch::Sender<ResponderGate>,
    radio: Mutex<()>,
}

impl Default for RoleArbiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RoleArbiter {
    pub fn new() -> Self {
        Self {
            ranging: watch::Sender::new(SubsystemState::Stopped),
            discovery: watch::Sender::new(SubsystemState::Stopped),
            responder: watch::Sender::new(ResponderGate::Open),
            radio: Mutex::new(()),
        }
    }

    // ── Subsystem state ───────────────────────────────────────────────────────

    pub fn ranging_state(&self) -> SubsystemState {
        *self.ranging.borrow()
    }

    pub fn ranging_running(&self) -> bool {
        self.ranging_state() == SubsystemState::Running
    }

    /// Let both duties run. Returns false if ranging was already enabled.
    pub fn enable_ranging(&self) -> bool {
        let changed = set_state(&self.ranging, SubsystemState::Running);
        if changed {
            tracing::info!("ranging enabled");
        }
        changed
    }

    /// Stop both duties. Returns once any duty already holding the radio has
    /// finished, so no exchange is in flight when this resolves.
    pub async fn disable_ranging(&self) -> bool {
        let changed = set_state(&self.ranging, SubsystemState::Stopped);
        drop(self.radio.lock().await);
        if changed {
            tracing::info!("ranging disabled");
        }
        changed
    }

    pub fn discovery_state(&self) -> SubsystemState {
        *self.discovery.borrow()
    }

    pub fn discovery_running(&self) -> bool {
        self.discovery_state() == SubsystemState::Running
    }

    pub fn set_discovery(&self, state: SubsystemState) -> bool {
        let changed = set_state(&self.discovery, state);
        if changed {
            tracing::info!(state = state.as_str(), "discovery state changed");
        }
        changed
    }

    // ── Duty turns ────────────────────────────────────────────────────────────

    /// Take the radio for one initiator sweep.
    ///
    /// Returns `None` if ranging is disabled, including when it is disabled
    /// while this call waits for the responder to finish its window.
    pub async fn begin_initiator(&self) -> Option<InitiatorTurn<'_>> {
        let mut ranging = self.ranging.subscribe();
        if *ranging.borrow_and_update() == SubsystemState::Stopped {
            return None;
        }

        self.responder.send_replace(ResponderGate::Suspended);
        let guard = tokio::select! {
            guard = self.radio.lock() => guard,
            _ = wait_until(&mut ranging, SubsystemState::Stopped) => {
                self.responder.send_replace(ResponderGate::Open);
                return None;
            }
        };
        let turn = InitiatorTurn {
            arbiter: self,
            _radio: guard,
        };

        // Disabled between the lock being granted and us observing it.
        if !self.ranging_running() {
            return None;
        }
        Some(turn)
    }

    /// Wait until ranging is enabled, no initiator wants the radio and the
    /// radio is free, then take it for one listen window.
    pub async fn begin_responder(&self) -> ResponderTurn<'_> {
        let mut ranging = self.ranging.subscribe();
        let mut gate = self.responder.subscribe();
        loop {
            wait_until(&mut ranging, SubsystemState::Running).await;
            wait_until(&mut gate, ResponderGate::Open).await;
            let guard = self.radio.lock().await;
            if self.ranging_running() && *self.responder.borrow() == ResponderGate::Open {
                return ResponderTurn { _radio: guard };
            }
        }
    }

    /// Run `f` while holding the radio guard, for reconfiguration that must
    /// not land in the middle of an exchange.
    pub async fn with_radio<T>(&self, f: impl FnOnce() -> T) -> T {
        let _radio = self.radio.lock().await;
        f()
    }
}

/// Exclusive use of the radio as initiator. Dropping it reopens the
/// responder gate and then releases the radio.
pub struct InitiatorTurn<'a> {
    arbiter: &'a RoleArbiter,
    _radio: MutexGuard<'a, ()>,
}

impl Drop for InitiatorTurn<'_> {
    fn drop(&mut self) {
        self.arbiter.responder.send_replace(ResponderGate::Open);
    }
}

/// Exclusive use of the radio as responder.
pub struct ResponderTurn<'a> {
    _radio: MutexGuard<'a, ()>,
}

fn set_state<T: PartialEq + Copy>(tx: &watch::Sender<T>, state: T) -> bool {
    tx.send_if_modified(|current| {
        if *current == state {
            false
        } else {
            *current = state;
            true
        }
    })
}

async fn wait_until<T: PartialEq + Copy>(rx: &mut watch::Receiver<T>, target: T) {
    loop {
        let current = *rx.borrow_and_update();
        if current == target {
            return;
        }
        if rx.changed().await.is_err() {
            // The arbiter owns every sender, so this cannot resolve.
            std::future::pending::<()>().await;
        }
    }
}
