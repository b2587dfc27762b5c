//! Operator line transport: stdin in, stdout out.
//!
//! Stdin is read on a plain thread so a pending read never holds up
//! runtime shutdown. Lines are lexed here; lexer rejections are answered
//! straight away and valid commands are queued for the processor. A full
//! queue drops the command with a warning.

use std::io::BufRead;

use anyhow::Context;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{broadcast, mpsc};

use sonde_core::Command;
use sonde_services::{Console, Envelope};

/// Forward stdin lines into `lines` until stdin closes or the receiver is gone.
pub fn spawn_stdin_reader(lines: mpsc::Sender<String>) {
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if lines.blocking_send(line).is_err() {
                break;
            }
        }
        tracing::debug!("stdin closed");
    });
}

/// Lex incoming lines and queue the commands.
pub async fn command_line_loop(
    mut lines: mpsc::Receiver<String>,
    queue: mpsc::Sender<Envelope>,
    console: Console,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    loop {
        tokio::select! {
            _ = shutdown.recv() => return Ok(()),

            line = lines.recv() => {
                let Some(line) = line else {
                    return Ok(());
                };
                dispatch_line(&line, &queue, &console);
            }
        }
    }
}

fn dispatch_line(line: &str, queue: &mpsc::Sender<Envelope>, console: &Console) {
    if line.trim().is_empty() {
        return;
    }
    match line.parse::<Command>() {
        Ok(command) => {
            if let Err(e) = queue.try_send(Envelope::new(command)) {
                tracing::warn!(command = %command, error = %e, "command queue full, dropping command");
            }
        }
        Err(e) => {
            tracing::debug!(line, error = %e, "unparseable line");
            let _ = console.send(e.to_string());
        }
    }
}

/// Write console lines to `out` until every sender is gone.
pub async fn console_loop<W: AsyncWrite + Unpin>(
    mut lines: mpsc::UnboundedReceiver<String>,
    mut out: W,
) -> anyhow::Result<()> {
    while let Some(line) = lines.recv().await {
        out.write_all(line.as_bytes())
            .await
            .context("console write failed")?;
        out.write_all(b"\n").await.context("console write failed")?;
        out.flush().await.context("console flush failed")?;
    }
    Ok(())
}
