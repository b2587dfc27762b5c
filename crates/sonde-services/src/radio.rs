//! Ranging radio interface.
//!
//! The transceiver is either initiating exchanges toward peers or listening
//! to answer theirs, never both. Who gets to do which, and when, is decided
//! by the [`RoleArbiter`](crate::arbiter::RoleArbiter); implementations only
//! need to do what they are told.
//!
//! Initialization is part of the trait because a node cannot run without a
//! working radio: a failure there aborts boot.

use std::future::Future;

use sonde_core::{PeerId, TxPower};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RadioError {
    #[error("ranging exchange with peer {0} failed")]
    ExchangeFailed(PeerId),
    #[error("radio initialization failed: {0}")]
    InitFailed(String),
    #[error("radio rejected configuration: {0}")]
    ConfigRejected(String),
}

pub trait RangingRadio: Send + Sync + 'static {
    /// Bring the transceiver up. Called once at boot.
    fn initialize(&self) -> Result<(), RadioError>;

    /// Switch to initiator timing (response delay and receive timeout armed).
    fn enter_initiator_mode(&self);

    /// Switch back to responder timing (no delay, no receive timeout).
    fn enter_responder_mode(&self);

    fn set_channel(&self, channel: u8) -> Result<(), RadioError>;

    fn set_tx_power(&self, level: TxPower) -> Result<(), RadioError>;

    /// One two-way exchange with `peer`. Resolves to the measured distance, or
    /// an error once the hardware timeout expires without a usable answer.
    fn perform_exchange(&self, peer: PeerId) -> impl Future<Output = Result<f32, RadioError>> + Send;

    /// Listen for one incoming poll and answer it. Bounded by the radio's
    /// own receive window.
    fn respond_once(&self) -> impl Future<Output = ()> + Send;
}
