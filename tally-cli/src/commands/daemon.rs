//! Daemon command - run the monitor in the foreground
//!
//! Each stdin line is one JSON request; each reply is written to stdout as
//! one JSON line. Balance events are written to stdout as they happen.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{broadcast, mpsc};

use tally_core::adapters::deepseek::DeepSeekClient;
use tally_core::adapters::indicator::TracingIndicator;
use tally_core::adapters::memory_store::MemoryStore;
use tally_core::config::Config;
use tally_core::services::{EntryPoint, LogEvent, LoggingService};
use tally_core::{Envelope, Monitor, MonitorEvent, Reply};

use super::get_tally_dir;

/// Requests waiting for a free handler
const QUEUE_DEPTH: usize = 16;

pub async fn run(ephemeral: bool) -> Result<()> {
    let tally_dir = get_tally_dir()?;
    let logger = LoggingService::new(&tally_dir, EntryPoint::Daemon, env!("CARGO_PKG_VERSION"))
        .ok()
        .map(Arc::new);

    let monitor = if ephemeral {
        let config = Config::load(&tally_dir)?;
        let provider = DeepSeekClient::new_with_base_url(&config.api_base_url, config.request_timeout)?;
        Monitor::new(
            config,
            Arc::new(MemoryStore::new()),
            Arc::new(provider),
            Arc::new(TracingIndicator),
            None,
        )
    } else {
        super::get_monitor(logger.clone())?
    };
    let monitor = Arc::new(monitor);

    let activation = monitor.detect_activation().await?;
    tracing::debug!(?activation, "starting monitor");
    monitor
        .activate(activation)
        .await
        .context("Failed to start monitor")?;
    if let Some(log) = &logger {
        let _ = log.log(LogEvent::new("daemon_started").with_command("daemon"));
    }

    let (sender, receiver) = mpsc::channel::<Envelope>(QUEUE_DEPTH);
    let (out_tx, out_rx) = mpsc::unbounded_channel::<String>();

    let server = {
        let monitor = Arc::clone(&monitor);
        tokio::spawn(async move { monitor.serve(receiver).await })
    };
    let writer = tokio::spawn(write_lines(out_rx));
    let events = tokio::spawn(forward_events(monitor.subscribe(), out_tx.clone()));

    tokio::select! {
        result = read_requests(sender, out_tx) => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("interrupted"),
    }

    monitor.shutdown();
    events.abort();
    let _ = server.await;
    let _ = writer.await;
    Ok(())
}

async fn read_requests(
    sender: mpsc::Sender<Envelope>,
    out: mpsc::UnboundedSender<String>,
) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        if line.trim().is_empty() {
            continue;
        }

        let message = match serde_json::from_str(&line) {
            Ok(message) => message,
            Err(e) => {
                let reply = Reply::Err {
                    error: format!("Invalid JSON: {}", e),
                };
                let _ = out.send(reply.to_json().to_string());
                continue;
            }
        };

        let (envelope, reply) = Envelope::new(message);
        if sender.send(envelope).await.is_err() {
            break;
        }
        let out = out.clone();
        tokio::spawn(async move {
            if let Ok(reply) = reply.await {
                let _ = out.send(reply.to_json().to_string());
            }
        });
    }

    tracing::info!("stdin closed");
    Ok(())
}

async fn forward_events(
    mut events: broadcast::Receiver<MonitorEvent>,
    out: mpsc::UnboundedSender<String>,
) {
    loop {
        match events.recv().await {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(line) => {
                    if out.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => tracing::warn!(error = %e, "failed to encode event"),
            },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "event output fell behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn write_lines(mut lines: mpsc::UnboundedReceiver<String>) {
    let mut stdout = tokio::io::stdout();
    while let Some(line) = lines.recv().await {
        let written = async {
            stdout.write_all(line.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await
        }
        .await;
        if let Err(e) = written {
            tracing::warn!(error = %e, "failed to write to stdout");
            break;
        }
    }
}
