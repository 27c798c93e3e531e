// src/server/context.rs

use crate::core::Task;
use crate::core::state::ServerState;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{Semaphore, broadcast};
use tokio::task::JoinSet;
use tokio_rustls::TlsAcceptor;

/// Builds a fresh task for every accepted connection.
pub type TaskFactory<T> = Arc<dyn Fn() -> T + Send + Sync>;

/// Holds all the initialized state required to run the server's main loop.
pub struct ServerContext<T: Task> {
    pub state: Arc<ServerState<T::State>>,
    pub listener: TcpListener,
    pub shutdown_tx: broadcast::Sender<()>,
    pub background_tasks: JoinSet<Result<(), anyhow::Error>>,
    pub acceptor: Option<TlsAcceptor>,
    pub connection_permits: Arc<Semaphore>,
    pub make_task: TaskFactory<T>,
}

impl<T: Task> ServerContext<T> {
    /// The address the listener is bound to; useful when binding port 0.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// A sender that stops the server when a message is sent on it.
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }
}
