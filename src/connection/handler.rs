// src/connection/handler.rs

//! Defines `Connection`, which drives one client's read → parse → process cycle.

use super::context::ConnectionContext;
use super::guard::ConnectionGuard;
use super::handle::ConnectionHandle;
use super::writer;
use crate::core::metrics;
use crate::core::state::ServerState;
use crate::core::{Action, SpindleError, Task};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, ReadHalf};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Where the cycle goes once a step has completed.
enum Step {
    Next(Action),
    /// The task asked for nothing further. The connection stays registered
    /// (fan-out can still write to it) and waits for shutdown.
    ///
    /// No read is outstanding while parked, so a peer that hangs up is not
    /// noticed and `read_timeout` does not apply. The connection is released
    /// at shutdown.
    Park,
    Stop,
}

/// Owns one transport and one task, and runs exactly one cycle at a time.
///
/// The read half, the receive buffer and the task are touched only by the
/// future returned from [`Connection::run`]. Everything other connections may
/// do to this one goes through its [`ConnectionHandle`].
pub struct Connection<T: Task, IO> {
    reader: ReadHalf<IO>,
    task: T,
    ctx: ConnectionContext<T::State>,
    buffer: Vec<u8>,
    read_timeout: Option<Duration>,
    shutdown_rx: broadcast::Receiver<()>,
    writer: Option<JoinHandle<()>>,
    flush_timeout: Duration,
    guard: ConnectionGuard<T::State>,
}

impl<T, IO> Connection<T, IO>
where
    T: Task,
    IO: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Splits `io`, spawns its write pump, and registers the connection.
    ///
    /// Must be called from within a Tokio runtime. For encrypted transports
    /// the handshake has to be complete before `io` is handed over.
    pub fn new(
        io: IO,
        session_id: u64,
        addr: SocketAddr,
        state: Arc<ServerState<T::State>>,
        task: T,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Self {
        let (reader, write_half) = tokio::io::split(io);
        let (handle, outbound_rx) = ConnectionHandle::channel(session_id, addr);
        let write_pump = tokio::spawn(writer::run(write_half, outbound_rx, session_id));

        if !state.registry.add(handle.clone()) {
            warn!(
                "Session {} was already registered; the new connection will not receive fan-out.",
                session_id
            );
        }
        metrics::CONNECTED_CLIENTS.inc();

        let ctx = ConnectionContext::new(
            handle.clone(),
            state.registry.clone(),
            state.shared.clone(),
        );
        Self {
            reader,
            task,
            ctx,
            buffer: vec![0; state.config.read_buffer_size],
            read_timeout: state.config.read_timeout,
            shutdown_rx,
            flush_timeout: state.config.flush_timeout,
            guard: ConnectionGuard::new(handle, state, write_pump.abort_handle()),
            writer: Some(write_pump),
        }
    }

    pub fn handle(&self) -> &ConnectionHandle {
        self.ctx.handle()
    }

    /// Drives the connection, starting with the task's initial action.
    pub async fn run(self) -> Result<(), SpindleError> {
        let initial = self.task.initial_action();
        self.start(initial).await
    }

    /// Enters the cycle with `action` and drives it until the connection stops.
    ///
    /// Returns `Ok` for an orderly end (peer closed, `disconnect`, shutdown)
    /// and `Err` for a fatal transport error or timeout. Either way the
    /// connection has been stopped and its transport released when this
    /// returns.
    pub async fn start(mut self, action: Action) -> Result<(), SpindleError> {
        debug!(
            "Session {}: starting cycle for {} with {:?}.",
            self.handle().session_id(),
            self.handle().addr(),
            action
        );

        let mut step = Step::Next(action);
        let result = loop {
            step = match step {
                Step::Next(Action::Read) => match self.read_cycle().await {
                    Ok(next) => next,
                    Err(e) => break Err(e),
                },
                Step::Next(Action::Process) => self.process(),
                Step::Park => {
                    self.park().await;
                    Step::Stop
                }
                Step::Stop => break Ok(()),
            };
        };

        self.stop();
        self.finish_writes().await;
        result
    }

    /// Removes the connection from the registry and closes the transport.
    /// Idempotent; returns true only for the call that stopped it.
    pub fn stop(&self) -> bool {
        self.guard.stop()
    }

    /// Waits for the write pump to flush what was queued before the stop and
    /// shut the transport down. A peer that does not accept the data within
    /// `flush_timeout` gets its transport dropped instead.
    async fn finish_writes(&mut self) {
        let Some(writer) = self.writer.take() else {
            return;
        };
        let abort = writer.abort_handle();
        match tokio::time::timeout(self.flush_timeout, writer).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(
                "Session {}: write pump failed: {}",
                self.handle().session_id(),
                e
            ),
            Err(_) => {
                warn!(
                    "Session {}: peer {} did not accept pending writes within {:?}; dropping the transport.",
                    self.handle().session_id(),
                    self.handle().addr(),
                    self.flush_timeout
                );
                abort.abort();
            }
        }
    }

    /// Issues one read and hands the bytes to the task.
    async fn read_cycle(&mut self) -> Result<Step, SpindleError> {
        let read = tokio::select! {
            biased;
            _ = self.shutdown_rx.recv() => {
                info!(
                    "Connection from {} received shutdown signal.",
                    self.ctx.handle().addr()
                );
                return Ok(Step::Stop);
            }
            read = read_chunk(&mut self.reader, &mut self.buffer, self.read_timeout) => read,
        };

        let len = match read {
            Ok(0) => {
                debug!(
                    "Connection from {} closed by peer.",
                    self.ctx.handle().addr()
                );
                return Ok(Step::Stop);
            }
            Ok(len) => len,
            Err(e) if e.is_normal_disconnect() => {
                debug!(
                    "Connection from {} closed by peer: {}",
                    self.ctx.handle().addr(),
                    e
                );
                return Ok(Step::Stop);
            }
            Err(e) => return Err(e),
        };

        metrics::BYTES_READ_TOTAL.inc_by(len as f64);
        debug!(
            "Session {}: read {} bytes.",
            self.ctx.handle().session_id(),
            len
        );
        Ok(self.parse(len))
    }

    fn parse(&mut self, len: usize) -> Step {
        match self.task.parse(&mut self.ctx, &self.buffer[..len]) {
            Ok(next) => self.restart(next),
            Err(e) => {
                self.parse_error(&e);
                self.restart(Action::Read)
            }
        }
    }

    fn parse_error(&mut self, error: &SpindleError) {
        metrics::PARSE_ERRORS_TOTAL.inc();
        self.task.parse_error(&mut self.ctx, error);
    }

    fn process(&mut self) -> Step {
        self.task.process(&mut self.ctx);
        if self.ctx.is_disconnect_requested() {
            return Step::Stop;
        }
        if self.ctx.take_read_request() {
            Step::Next(Action::Read)
        } else {
            Step::Park
        }
    }

    /// Chooses the next step after parsing, honouring a pending disconnect.
    fn restart(&mut self, action: Action) -> Step {
        if self.ctx.is_disconnect_requested() {
            return Step::Stop;
        }
        match action {
            Action::Read => {
                // A read requested during parse is satisfied by this one.
                self.ctx.take_read_request();
                Step::Next(Action::Read)
            }
            Action::Process => Step::Next(Action::Process),
        }
    }

    async fn park(&mut self) {
        debug!(
            "Session {}: no further action requested, idling until shutdown.",
            self.ctx.handle().session_id()
        );
        let _ = self.shutdown_rx.recv().await;
    }
}

async fn read_chunk<R>(
    reader: &mut R,
    buffer: &mut [u8],
    deadline: Option<Duration>,
) -> Result<usize, SpindleError>
where
    R: AsyncRead + Unpin,
{
    let len = match deadline {
        Some(deadline) => tokio::time::timeout(deadline, reader.read(buffer)).await??,
        None => reader.read(buffer).await?,
    };
    Ok(len)
}
