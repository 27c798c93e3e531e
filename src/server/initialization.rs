// src/server/initialization.rs

//! Handles server initialization: TLS setup, shared state, and the listener.

use super::context::{ServerContext, TaskFactory};
use crate::config::Config;
use crate::core::Task;
use crate::core::state::ServerState;
use anyhow::{Result, anyhow};
use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{Semaphore, broadcast};
use tokio::task::JoinSet;
use tokio_rustls::{TlsAcceptor, rustls};
use tracing::info;

/// Initializes all server components before starting the main loop.
///
/// `shared` becomes the state every task can read through
/// `ConnectionContext::state`; `make_task` is called once per accepted
/// connection.
pub async fn setup<T, F>(config: Config, shared: T::State, make_task: F) -> Result<ServerContext<T>>
where
    T: Task,
    F: Fn() -> T + Send + Sync + 'static,
{
    log_startup_info(&config);
    let (shutdown_tx, _) = broadcast::channel(1);

    let acceptor = setup_tls(&config).await?;

    let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
    info!(
        "Spindle server listening on {}",
        listener.local_addr()?
    );
    let connection_permits = Arc::new(Semaphore::new(config.max_clients));

    let state = Arc::new(ServerState::new(config, shared));
    info!("Server state initialized.");

    let make_task: TaskFactory<T> = Arc::new(make_task);
    Ok(ServerContext {
        state,
        listener,
        shutdown_tx,
        background_tasks: JoinSet::new(),
        acceptor,
        connection_permits,
        make_task,
    })
}

/// Sets up the TLS acceptor if TLS is enabled in the configuration.
async fn setup_tls(config: &Config) -> Result<Option<TlsAcceptor>> {
    if config.tls.enabled {
        info!("TLS is enabled. Loading certificate and key.");
        let certs = load_certs(&config.tls.cert_path)?;
        let key = load_key(&config.tls.key_path)?;
        let server_config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)?;
        Ok(Some(TlsAcceptor::from(Arc::new(server_config))))
    } else {
        Ok(None)
    }
}

/// Loads TLS certificates from a PEM file.
fn load_certs(path: &str) -> Result<Vec<rustls::pki_types::CertificateDer<'static>>> {
    let cert_file = File::open(path)
        .map_err(|e| anyhow!("Failed to open certificate file '{}': {}", path, e))?;
    let mut cert_reader = BufReader::new(cert_file);
    let certs = rustls_pemfile::certs(&mut cert_reader).collect::<Result<Vec<_>, _>>()?;
    if certs.is_empty() {
        return Err(anyhow!("No certificates found in '{}'", path));
    }
    Ok(certs)
}

/// Loads a private key from a PEM file.
fn load_key(path: &str) -> Result<rustls::pki_types::PrivateKeyDer<'static>> {
    let key_file = File::open(path)
        .map_err(|e| anyhow!("Failed to open private key file '{}': {}", path, e))?;
    let mut key_reader = BufReader::new(key_file);
    rustls_pemfile::private_key(&mut key_reader)?
        .ok_or_else(|| anyhow!("No private key found in key file '{}'", path))
}

/// Logs key configuration parameters at startup.
fn log_startup_info(config: &Config) {
    info!(
        "Accepting up to {} concurrent clients, {} byte read buffer.",
        config.max_clients, config.read_buffer_size
    );
    match config.read_timeout {
        Some(timeout) => info!("Idle connections are dropped after {:?}.", timeout),
        None => info!("No read timeout configured; idle connections are kept open."),
    }
    info!(
        "Transport: {}.",
        if config.tls.enabled { "TLS" } else { "plain TCP" }
    );
}
