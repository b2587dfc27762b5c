//! Command processor — applies operator commands to the running node.
//!
//! Commands arrive already lexed, wrapped in an [`Envelope`]. The queue is
//! polled once per `poll_ticks` and at most one command is taken per poll.
//! Every command produces exactly one reply line, sent to the console and,
//! when the envelope carries a reply channel, back to the submitter.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::MissedTickBehavior;

use sonde_core::{Command, KvStore, NodeParams, ParamKey, PeerId, TxPower, ValidationError};

use crate::arbiter::{RoleArbiter, SubsystemState};
use crate::clock::ticks;
use crate::discovery::Discovery;
use crate::radio::{RadioError, RangingRadio};
use crate::Console;

/// A queued command and where its reply should go besides the console.
#[derive(Debug)]
pub struct Envelope {
    pub command: Command,
    pub reply: Option<oneshot::Sender<String>>,
}

impl Envelope {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            reply: None,
        }
    }

    /// Envelope whose reply is also delivered on the returned receiver.
    pub fn with_reply(command: Command) -> (Self, oneshot::Receiver<String>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                command,
                reply: Some(tx),
            },
            rx,
        )
    }
}

#[derive(Debug, thiserror::Error)]
enum CommandError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error(transparent)]
    Radio(#[from] RadioError),
}

pub struct CommandProcessor<R: RangingRadio, D: Discovery> {
    params: watch::Sender<NodeParams>,
    store: Arc<dyn KvStore>,
    arbiter: Arc<RoleArbiter>,
    radio: Arc<R>,
    discovery: Arc<D>,
    console: Console,
    poll_ticks: u32,
}

impl<R: RangingRadio, D: Discovery> CommandProcessor<R, D> {
    pub fn new(
        params: watch::Sender<NodeParams>,
        store: Arc<dyn KvStore>,
        arbiter: Arc<RoleArbiter>,
        radio: Arc<R>,
        discovery: Arc<D>,
        console: Console,
        poll_ticks: u32,
    ) -> Self {
        Self {
            params,
            store,
            arbiter,
            radio,
            discovery,
            console,
            poll_ticks: poll_ticks.max(1),
        }
    }

    pub async fn run(
        self,
        mut inbox: mpsc::Receiver<Envelope>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> anyhow::Result<()> {
        let mut interval = tokio::time::interval(ticks(self.poll_ticks));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(poll_ticks = self.poll_ticks, "command processor starting");

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("command processor shutting down");
                    return Ok(());
                }

                _ = interval.tick() => {
                    match inbox.try_recv() {
                        Ok(envelope) => self.process(envelope).await,
                        Err(mpsc::error::TryRecvError::Empty) => {}
                        Err(mpsc::error::TryRecvError::Disconnected) => {
                            tracing::info!("command queue closed, processor exiting");
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    /// Execute one envelope and deliver its reply.
    pub async fn process(&self, envelope: Envelope) {
        let reply = self.execute(envelope.command).await;
        let _ = self.console.send(reply.clone());
        if let Some(tx) = envelope.reply {
            let _ = tx.send(reply);
        }
    }

    /// Execute `command` and return its reply line.
    pub async fn execute(&self, command: Command) -> String {
        match self.apply(command).await {
            Ok(reply) => {
                tracing::debug!(command = %command, reply = %reply, "command applied");
                reply
            }
            Err(e) => {
                tracing::warn!(command = %command, error = %e, "command rejected");
                e.to_string()
            }
        }
    }

    async fn apply(&self, command: Command) -> Result<String, CommandError> {
        let reply = match command {
            Command::StartRanging => {
                self.arbiter.enable_ranging();
                "OK".to_string()
            }
            Command::StopRanging => {
                self.arbiter.disable_ranging().await;
                "OK".to_string()
            }
            Command::StartDiscovery => {
                self.discovery.start();
                self.arbiter.set_discovery(SubsystemState::Running);
                "OK".to_string()
            }
            Command::StopDiscovery => {
                self.discovery.stop();
                self.arbiter.set_discovery(SubsystemState::Stopped);
                "OK".to_string()
            }
            Command::SetIdentity(raw) => {
                let value = self.update(ParamKey::Identity, raw)?;
                if let Some(id) = PeerId::new(value) {
                    self.discovery.set_identity(id);
                }
                "OK".to_string()
            }
            Command::SetBootMode(raw) => {
                let value = self.update(ParamKey::BootMode, raw)?;
                format!("Bootmode: {value} OK")
            }
            Command::SetRate(raw) => {
                let value = self.update(ParamKey::PollingRate, raw)?;
                format!("Rate: {value} OK")
            }
            Command::SetChannel(raw) => {
                if !sonde_core::params::valid_channel(raw) {
                    return Err(ValidationError::Channel.into());
                }
                let channel = raw as u8;
                self.arbiter
                    .with_radio(|| self.radio.set_channel(channel))
                    .await?;
                self.update(ParamKey::Channel, raw)?;
                "OK".to_string()
            }
            Command::Reset => {
                for key in ParamKey::ALL {
                    if let Err(e) = self.store.delete(key) {
                        tracing::warn!(key = key.as_str(), error = %e, "failed to clear stored parameter");
                    }
                }
                "Reset OK".to_string()
            }
            Command::SetTimeout(raw) => {
                self.update(ParamKey::EvictionTimeout, raw)?;
                "OK".to_string()
            }
            Command::SetTxPower(raw) => {
                let level = TxPower::from_code(raw).ok_or(ValidationError::TxPower)?;
                self.arbiter
                    .with_radio(|| self.radio.set_tx_power(level))
                    .await?;
                self.update(ParamKey::TxPower, raw)?;
                "OK".to_string()
            }
            Command::SetStreamMode(raw) => {
                self.update(ParamKey::StreamMode, raw)?;
                "OK".to_string()
            }
        };
        Ok(reply)
    }

    /// Validate and apply one parameter, then persist it. A failed write is
    /// logged; the live value stands until the next restart.
    fn update(&self, key: ParamKey, raw: i64) -> Result<u32, ValidationError> {
        let mut result = Err(ValidationError::Identity);
        self.params.send_if_modified(|params| {
            result = params.set(key, raw);
            result.is_ok()
        });
        let value = result?;

        if let Err(e) = self.store.write(key, value) {
            tracing::warn!(key = key.as_str(), value, error = %e, "failed to persist parameter");
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimDiscovery, SimRadio};
    use sonde_core::config::SimulationConfig;
    use sonde_core::{BootMode, MemoryStore, StreamMode};

    struct Fixture {
        processor: CommandProcessor<SimRadio, SimDiscovery>,
        params: watch::Receiver<NodeParams>,
        store: MemoryStore,
        arbiter: Arc<RoleArbiter>,
        radio: Arc<SimRadio>,
        discovery: Arc<SimDiscovery>,
        console: mpsc::UnboundedReceiver<String>,
    }

    fn fixture() -> Fixture {
        let config = SimulationConfig::default();
        let (params_tx, params) = watch::channel(NodeParams::default());
        let store = MemoryStore::new();
        let arbiter = Arc::new(RoleArbiter::new());
        let radio = Arc::new(SimRadio::new(&config));
        let discovery = Arc::new(SimDiscovery::new(&config));
        let (console_tx, console) = mpsc::unbounded_channel();
        let processor = CommandProcessor::new(
            params_tx,
            Arc::new(store.clone()),
            arbiter.clone(),
            radio.clone(),
            discovery.clone(),
            console_tx,
            100,
        );
        Fixture {
            processor,
            params,
            store,
            arbiter,
            radio,
            discovery,
            console,
        }
    }

    #[tokio::test]
    async fn rate_validation_and_persistence() {
        let f = fixture();
        assert_eq!(f.processor.execute(Command::SetRate(600)).await, "Invalid rate parameter");
        assert_eq!(f.params.borrow().polling_rate, 100);
        assert_eq!(f.store.read(ParamKey::PollingRate).unwrap(), None);

        assert_eq!(f.processor.execute(Command::SetRate(250)).await, "Rate: 250 OK");
        assert_eq!(f.params.borrow().polling_rate, 250);
        assert_eq!(f.store.read(ParamKey::PollingRate).unwrap(), Some(250));
    }

    #[tokio::test]
    async fn replies_use_console_text() {
        let f = fixture();
        let cases = [
            (Command::SetIdentity(0), "Invalid node ID"),
            (Command::SetIdentity(42), "OK"),
            (Command::SetBootMode(3), "Invalid bootmode parameter"),
            (Command::SetBootMode(2), "Bootmode: 2 OK"),
            (Command::SetChannel(6), "Invalid Channel number"),
            (Command::SetChannel(0), "Invalid Channel number"),
            (Command::SetChannel(3), "OK"),
            (Command::SetTimeout(-1), "Timeout cannot be negative"),
            (Command::SetTimeout(2000), "OK"),
            (Command::SetTxPower(2), "Tx Power parameter input error"),
            (Command::SetTxPower(1), "OK"),
            (Command::SetStreamMode(5), "Stream mode parameter input error"),
            (Command::SetStreamMode(1), "OK"),
            (Command::Reset, "Reset OK"),
        ];
        for (command, expected) in cases {
            assert_eq!(f.processor.execute(command).await, expected, "{command}");
        }

        let params = f.params.borrow().clone();
        assert_eq!(params.identity, PeerId::new(42));
        assert_eq!(params.boot_mode, BootMode::DiscoveryAndRanging);
        assert_eq!(params.channel, 3);
        assert_eq!(params.eviction_timeout, 2000);
        assert_eq!(params.tx_power, TxPower::Max);
        assert_eq!(params.stream_mode, StreamMode::Delta);
    }

    #[tokio::test]
    async fn radio_follows_channel_and_power() {
        let f = fixture();
        f.processor.execute(Command::SetChannel(2)).await;
        f.processor.execute(Command::SetTxPower(1)).await;
        assert_eq!(f.radio.channel(), 2);
        assert_eq!(f.radio.tx_power(), TxPower::Max);

        f.processor.execute(Command::SetChannel(6)).await;
        assert_eq!(f.radio.channel(), 2);
    }

    #[tokio::test]
    async fn reset_clears_store_but_not_live_params() {
        let f = fixture();
        f.processor.execute(Command::SetRate(10)).await;
        f.processor.execute(Command::SetIdentity(8)).await;
        assert_eq!(f.store.len(), 2);

        f.processor.execute(Command::Reset).await;
        assert!(f.store.is_empty());
        assert_eq!(f.params.borrow().polling_rate, 10);
    }

    #[tokio::test]
    async fn persistence_failure_keeps_change() {
        let f = fixture();
        f.store.set_fail_writes(true);
        assert_eq!(f.processor.execute(Command::SetTimeout(700)).await, "OK");
        assert_eq!(f.params.borrow().eviction_timeout, 700);
        assert!(f.store.is_empty());
    }

    #[tokio::test]
    async fn subsystem_toggles() {
        let f = fixture();
        assert_eq!(f.processor.execute(Command::StartDiscovery).await, "OK");
        assert!(f.discovery.is_running());
        assert!(f.arbiter.discovery_running());

        assert_eq!(f.processor.execute(Command::StartRanging).await, "OK");
        assert!(f.arbiter.ranging_running());
        assert_eq!(f.processor.execute(Command::StopRanging).await, "OK");
        assert!(!f.arbiter.ranging_running());

        f.processor.execute(Command::StopDiscovery).await;
        assert!(!f.discovery.is_running());
        assert!(!f.arbiter.discovery_running());

        f.processor.execute(Command::SetIdentity(77)).await;
        assert_eq!(f.discovery.identity(), PeerId::new(77));
    }

    #[tokio::test(start_paused = true)]
    async fn one_command_per_poll() {
        let mut f = fixture();
        let (tx, rx) = mpsc::channel(25);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let (first, first_reply) = Envelope::with_reply(Command::SetRate(5));
        tx.send(first).await.unwrap();
        tx.send(Envelope::new(Command::SetRate(6))).await.unwrap();
        tx.send(Envelope::new(Command::SetRate(999))).await.unwrap();

        let task = tokio::spawn(f.processor.run(rx, shutdown_rx));

        // The first poll fires immediately, the next two 100 ticks apart.
        tokio::time::sleep(ticks(10)).await;
        assert_eq!(f.params.borrow().polling_rate, 5);
        assert_eq!(first_reply.await.unwrap(), "Rate: 5 OK");

        tokio::time::sleep(ticks(100)).await;
        assert_eq!(f.params.borrow().polling_rate, 6);

        tokio::time::sleep(ticks(100)).await;
        let lines: Vec<String> = std::iter::from_fn(|| f.console.try_recv().ok()).collect();
        assert_eq!(lines, vec!["Rate: 5 OK", "Rate: 6 OK", "Invalid rate parameter"]);

        shutdown_tx.send(()).unwrap();
        task.await.unwrap().unwrap();
    }
}
