// src/server/connection_loop.rs

//! Contains the main server loop for accepting connections and handling graceful shutdown.

use super::context::ServerContext;
use super::stream::AnyStream;
use crate::connection::Connection;
use crate::core::{Task, metrics};
use anyhow::{Result, anyhow};
use std::time::Duration;
use tokio::signal::unix::{SignalKind, signal};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Extra time, on top of `flush_timeout`, that connections get to finish after
/// the shutdown signal before being aborted.
const CONNECTION_DRAIN_GRACE: Duration = Duration::from_secs(1);

/// The main server loop that accepts connections and handles graceful shutdown.
///
/// Runs until SIGINT, SIGTERM, a message on the context's shutdown channel,
/// or the failure of a background task.
pub async fn run<T: Task>(mut ctx: ServerContext<T>) -> Result<()> {
    let mut session_id_counter: u64 = 0;
    let mut client_tasks = JoinSet::new();
    let mut stop_rx = ctx.shutdown_tx.subscribe();

    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow!("Failed to register SIGINT handler: {}", e))?;
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow!("Failed to register SIGTERM handler: {}", e))?;

    loop {
        tokio::select! {
            biased;

            _ = sigint.recv() => {
                info!("SIGINT received, initiating graceful shutdown.");
                break;
            }
            _ = sigterm.recv() => {
                info!("SIGTERM received, initiating graceful shutdown.");
                break;
            }
            _ = stop_rx.recv() => {
                info!("Shutdown requested, initiating graceful shutdown.");
                break;
            }

            Some(res) = ctx.background_tasks.join_next() => {
                match res {
                    Ok(Ok(())) => warn!("A background task finished unexpectedly without an error."),
                    Ok(Err(e)) => { error!("CRITICAL: Background task failed: {}. Shutting down.", e); break; }
                    Err(e) => { error!("CRITICAL: Background task panicked: {e:?}. Shutting down."); break; }
                }
            },

            res = ctx.listener.accept() => {
                let (socket, addr) = match res {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        continue;
                    }
                };

                let Ok(permit) = ctx.connection_permits.clone().try_acquire_owned() else {
                    warn!("Rejecting connection from {}: max_clients limit reached.", addr);
                    ctx.state.stats.increment_rejected_connections();
                    metrics::CONNECTIONS_REJECTED_TOTAL.inc();
                    drop(socket);
                    continue;
                };

                info!("Accepted new connection from: {}", addr);
                ctx.state.stats.increment_total_connections();
                metrics::CONNECTIONS_RECEIVED_TOTAL.inc();

                session_id_counter = session_id_counter.wrapping_add(1);
                let session_id = session_id_counter;
                let state = ctx.state.clone();
                let task = (ctx.make_task)();
                let shutdown_rx = ctx.shutdown_tx.subscribe();
                let acceptor = ctx.acceptor.clone();

                client_tasks.spawn(async move {
                    let _permit = permit;
                    let stream = match acceptor {
                        Some(acceptor) => match acceptor.accept(socket).await {
                            Ok(tls_stream) => {
                                info!("TLS handshake successful for {addr}");
                                AnyStream::Tls(Box::new(tls_stream))
                            }
                            Err(e) => {
                                warn!("TLS handshake error for {addr}: {e}");
                                return;
                            }
                        },
                        None => AnyStream::Tcp(socket),
                    };
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!("Could not set TCP_NODELAY for {addr}: {e}");
                    }

                    let connection = Connection::new(stream, session_id, addr, state, task, shutdown_rx);
                    if let Err(e) = connection.run().await {
                        warn!("Connection from {} terminated unexpectedly: {}", addr, e);
                    }
                });
            },

            Some(res) = client_tasks.join_next() => {
                if let Err(e) = res
                    && e.is_panic()
                {
                    error!("A client handler panicked: {e:?}");
                }
            },
        }
    }

    info!("Shutting down. Sending signal to all tasks.");
    if ctx.shutdown_tx.send(()).is_err() {
        debug!("No task was listening for the shutdown signal.");
    }

    // Each connection flushes its pending writes before its task ends.
    let drain_timeout = ctx.state.config.flush_timeout + CONNECTION_DRAIN_GRACE;
    if tokio::time::timeout(drain_timeout, async {
        while client_tasks.join_next().await.is_some() {}
    })
    .await
    .is_err()
    {
        warn!("Timed out waiting for connections to close; aborting the rest.");
        client_tasks.shutdown().await;
    }
    info!(
        "All client connections closed ({} still registered).",
        ctx.state.registry.len()
    );

    info!("Waiting for background tasks to finish...");
    if tokio::time::timeout(Duration::from_secs(10), async {
        while ctx.background_tasks.join_next().await.is_some() {}
    })
    .await
    .is_err()
    {
        warn!("Timed out waiting for background tasks to finish cleanly.");
    };
    info!("Server shutdown complete.");
    Ok(())
}
