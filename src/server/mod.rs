// src/server/mod.rs

//! The acceptor side: binds the listener, performs TLS handshakes, and hands
//! each accepted transport to a new `Connection`.

use crate::config::Config;
use crate::core::Task;
use anyhow::Result;

mod connection_loop;
mod context;
mod initialization;
mod metrics_server;
mod spawner;
mod stream;

pub use context::{ServerContext, TaskFactory};
pub use initialization::setup;
pub use stream::AnyStream;

/// Starts background tasks and runs the accept loop of an initialized server
/// until it shuts down.
pub async fn serve<T: Task>(mut server_context: ServerContext<T>) -> Result<()> {
    spawner::spawn_all(&mut server_context).await?;
    connection_loop::run(server_context).await
}

/// The main server startup function, orchestrating all setup phases.
pub async fn run<T, F>(config: Config, shared: T::State, make_task: F) -> Result<()>
where
    T: Task,
    F: Fn() -> T + Send + Sync + 'static,
{
    // 1. Bind the listener, load TLS material, create the registry.
    let server_context = initialization::setup(config, shared, make_task).await?;

    // 2. Spawn background tasks and accept connections until shutdown.
    serve(server_context).await
}
