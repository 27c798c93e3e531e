// src/connection/writer.rs

//! The write pump: the only owner of a connection's write half.
//!
//! Writes are queued by `ConnectionHandle::response` from any thread and
//! applied here in order. Failures are logged and discarded so a transient
//! write error never interrupts the connection's read cycle; a dead peer is
//! discovered by the next read instead.

use super::handle::Outbound;
use crate::core::metrics;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::debug;

/// Drains `rx` into `writer` until a `Close` command arrives or every handle
/// is dropped, then shuts the transport down once.
pub(crate) async fn run<W>(mut writer: W, mut rx: mpsc::UnboundedReceiver<Outbound>, session_id: u64)
where
    W: AsyncWrite + Unpin,
{
    while let Some(command) = rx.recv().await {
        match command {
            Outbound::Data(payload) => {
                if payload.is_empty() {
                    continue;
                }
                let result = async {
                    writer.write_all(&payload).await?;
                    writer.flush().await
                }
                .await;
                if let Err(e) = result {
                    metrics::WRITE_ERRORS_TOTAL.inc();
                    debug!("Session {}: discarding failed write: {}", session_id, e);
                }
            }
            Outbound::Close => break,
        }
    }

    // Anything queued after `Close` belongs to a stopped connection.
    rx.close();
    if let Err(e) = writer.shutdown().await {
        debug!("Session {}: transport shutdown failed: {}", session_id, e);
    }
}
