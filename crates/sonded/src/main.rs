//! sonded — UWB ranging node daemon.
//!
//! Stdout carries the operator channel (command replies and the neighbour
//! table); logs go to stderr.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;

use sonde_core::config::NodeConfig;
use sonde_core::{FileStore, KvStore, MemoryStore};
use sonde_services::{node, Collaborators, Entropy, SimDiscovery, SimRadio};

mod status;
mod transport;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    // Load config
    if let Err(e) = NodeConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = NodeConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        NodeConfig::default()
    });

    // Console
    let (console_tx, console_rx) = mpsc::unbounded_channel();
    let console_task = tokio::spawn(transport::console_loop(console_rx, tokio::io::stdout()));
    let _ = console_tx.send(format!(
        "Node On: Firmware version {}",
        env!("CARGO_PKG_VERSION")
    ));

    // Parameter store
    let store: Arc<dyn KvStore> = if config.node.store_path.as_os_str().is_empty() {
        tracing::info!("no store path configured, parameters are volatile");
        Arc::new(MemoryStore::new())
    } else {
        let store = FileStore::open(&config.node.store_path).with_context(|| {
            format!(
                "failed to open parameter store {}",
                config.node.store_path.display()
            )
        })?;
        tracing::info!(path = %store.path().display(), "parameter store ready");
        Arc::new(store)
    };

    // Collaborators
    let radio = Arc::new(SimRadio::new(&config.simulation));
    let discovery = Arc::new(SimDiscovery::new(&config.simulation));
    let (sightings_tx, sightings_rx) = mpsc::channel(64);
    tracing::info!(
        neighbours = config.simulation.peers.len(),
        "using simulated radio and discovery"
    );

    let mut node = node::start(
        &config,
        Collaborators {
            radio,
            discovery: discovery.clone(),
            store,
            random: Box::new(Entropy::from_seed_setting(config.node.rng_seed)),
        },
        sightings_rx,
        console_tx.clone(),
    )
    .context("radio bring-up failed")?;
    let shutdown_tx = node.shutdown_signal();

    let announcer = tokio::spawn(discovery.announce(sightings_tx, shutdown_tx.subscribe()));

    // Operator input
    let (lines_tx, lines_rx) = mpsc::channel(16);
    transport::spawn_stdin_reader(lines_tx);
    let command_lines = tokio::spawn(transport::command_line_loop(
        lines_rx,
        node.commands(),
        console_tx.clone(),
        shutdown_tx.subscribe(),
    ));
    drop(console_tx);

    // Status API
    if config.node.api_port != 0 {
        let state = status::StatusState {
            registry: node.registry.clone(),
            arbiter: node.arbiter.clone(),
            params: node.params.clone(),
            clock: node.clock,
            commands: node.commands(),
            shutdown: shutdown_tx.clone(),
        };
        let port = config.node.api_port;
        tokio::spawn(async move {
            if let Err(e) = status::serve(state, port).await {
                tracing::error!(error = %e, "status server failed");
            }
        });
    }

    {
        let shutdown_tx = shutdown_tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received");
                let _ = shutdown_tx.send(());
            }
        });
    }

    // ── Wait for exit ────────────────────────────────────────────────────────

    let mut shutdown_rx = shutdown_tx.subscribe();

    tokio::select! {
        _ = shutdown_rx.recv() => tracing::info!("shutting down"),
        exit = node.next_exit() => {
            if let Some((task, result)) = exit {
                tracing::error!(task, "node task exited: {:?}", result);
            }
        }
        r = announcer => tracing::error!("discovery announcer exited: {:?}", r),
    }

    let _ = shutdown_tx.send(());
    node.shutdown().await;
    if let Err(e) = command_lines.await {
        tracing::warn!(error = %e, "command line task failed");
    }
    // Every console sender is gone now; this drains what is left.
    if let Ok(Err(e)) = console_task.await {
        tracing::warn!(error = %e, "console writer failed");
    }

    Ok(())
}
