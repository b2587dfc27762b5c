//! Node assembly — restores parameters, brings the radio up and spawns
//! every control task against one shared registry and arbiter.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinSet;

use sonde_core::config::NodeConfig;
use sonde_core::{Command, KvStore, NodeParams};

use crate::arbiter::RoleArbiter;
use crate::boot;
use crate::clock::TickClock;
use crate::command::{CommandProcessor, Envelope};
use crate::discovery::{intake_loop, Discovery, PeerSighting};
use crate::monitor::MaintenanceMonitor;
use crate::radio::{RadioError, RangingRadio};
use crate::ranging::{RangingCycle, Responder};
use crate::scheduler::{AccessScheduler, RandomSource};
use crate::telemetry::TelemetryPublisher;
use crate::{new_registry, Console, SharedRegistry};

/// The hardware-facing pieces a node is built from.
pub struct Collaborators<R: RangingRadio, D: Discovery> {
    pub radio: Arc<R>,
    pub discovery: Arc<D>,
    pub store: Arc<dyn KvStore>,
    pub random: Box<dyn RandomSource>,
}

type TaskResult = (&'static str, anyhow::Result<()>);

/// A running node.
pub struct NodeHandle {
    pub registry: SharedRegistry,
    pub arbiter: Arc<RoleArbiter>,
    pub params: watch::Receiver<NodeParams>,
    pub clock: TickClock,
    commands: mpsc::Sender<Envelope>,
    shutdown: broadcast::Sender<()>,
    tasks: JoinSet<TaskResult>,
}

/// Boot the node and spawn its tasks. Fails only if the radio cannot be
/// brought up.
pub fn start<R: RangingRadio, D: Discovery>(
    config: &NodeConfig,
    parts: Collaborators<R, D>,
    sightings: mpsc::Receiver<PeerSighting>,
    console: Console,
) -> Result<NodeHandle, RadioError> {
    let Collaborators {
        radio,
        discovery,
        store,
        random,
    } = parts;

    let params = NodeParams::restore(store.as_ref());
    boot::bring_up_radio(radio.as_ref(), &params)?;
    for line in boot::config_report(store.as_ref(), &params) {
        let _ = console.send(line);
    }

    let clock = TickClock::start();
    let registry = new_registry();
    let arbiter = Arc::new(RoleArbiter::new());
    boot::apply_boot_mode(&params, &arbiter, discovery.as_ref());

    let (params_tx, params_rx) = watch::channel(params);
    let (commands_tx, commands_rx) = mpsc::channel(config.command.queue_depth.max(1));
    let (shutdown_tx, _) = broadcast::channel(1);
    let mut tasks = JoinSet::new();

    tasks.spawn(named(
        "discovery intake",
        intake_loop(registry.clone(), sightings, shutdown_tx.subscribe()),
    ));

    let cycle = RangingCycle::new(
        radio.clone(),
        arbiter.clone(),
        registry.clone(),
        params_rx.clone(),
        AccessScheduler::from_kind(config.ranging.backoff, random),
        clock,
        config.ranging.attempts,
        config.ranging.idle_ticks,
    );
    tasks.spawn(named("ranging initiator", cycle.run(shutdown_tx.subscribe())));

    let responder = Responder::new(radio.clone(), arbiter.clone());
    tasks.spawn(named("ranging responder", responder.run(shutdown_tx.subscribe())));

    let monitor = MaintenanceMonitor::new(
        registry.clone(),
        arbiter.clone(),
        discovery.clone(),
        params_rx.clone(),
        clock,
        config.monitor.period_ticks,
        config.monitor.rerank_every,
    );
    tasks.spawn(named("maintenance monitor", monitor.run(shutdown_tx.subscribe())));

    let processor = CommandProcessor::new(
        params_tx,
        store,
        arbiter.clone(),
        radio,
        discovery,
        console.clone(),
        config.command.poll_ticks,
    );
    tasks.spawn(named(
        "command processor",
        processor.run(commands_rx, shutdown_tx.subscribe()),
    ));

    let telemetry = TelemetryPublisher::new(
        registry.clone(),
        arbiter.clone(),
        params_rx.clone(),
        console,
        config.telemetry.period_ticks,
    );
    tasks.spawn(named("telemetry", telemetry.run(shutdown_tx.subscribe())));

    tracing::info!(tasks = tasks.len(), "node started");

    Ok(NodeHandle {
        registry,
        arbiter,
        params: params_rx,
        clock,
        commands: commands_tx,
        shutdown: shutdown_tx,
        tasks,
    })
}

async fn named(
    name: &'static str,
    task: impl std::future::Future<Output = anyhow::Result<()>>,
) -> TaskResult {
    (name, task.await)
}

impl NodeHandle {
    /// Sender for queueing commands without waiting for their reply.
    pub fn commands(&self) -> mpsc::Sender<Envelope> {
        self.commands.clone()
    }

    /// Shutdown signal shared with the node's own tasks.
    pub fn shutdown_signal(&self) -> broadcast::Sender<()> {
        self.shutdown.clone()
    }

    /// Queue `command` and wait for its reply line. Fails if the queue is
    /// full or the processor has stopped.
    pub async fn submit(&self, command: Command) -> anyhow::Result<String> {
        submit(&self.commands, command).await
    }

    /// Wait for the next task to exit. Tasks only exit on shutdown, so an
    /// exit before that is a failure worth reporting.
    pub async fn next_exit(&mut self) -> Option<TaskResult> {
        let joined = self.tasks.join_next().await?;
        Some(joined.unwrap_or_else(|e| ("unknown", Err(anyhow::Error::new(e)))))
    }

    /// Signal every task and wait for all of them to finish.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        while let Some((name, result)) = self.next_exit().await {
            match result {
                Ok(()) => tracing::debug!(task = name, "task stopped"),
                Err(e) => tracing::error!(task = name, error = %e, "task failed"),
            }
        }
    }
}

/// Queue `command` on `queue` and wait for the reply.
pub async fn submit(queue: &mpsc::Sender<Envelope>, command: Command) -> anyhow::Result<String> {
    let (envelope, reply) = Envelope::with_reply(command);
    queue
        .try_send(envelope)
        .map_err(|e| anyhow::anyhow!("command queue rejected {command}: {e}"))?;
    reply.await.context("command processor stopped before replying")
}
