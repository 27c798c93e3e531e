// tests/integration/test_helpers.rs

//! Test helpers for running a real chat server on a loopback port.

use spindle::config::Config;
use spindle::core::state::ServerState;
use spindle::server;
use spindle::tasks::ChatTask;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

/// How long any single expectation may wait before the test fails.
pub const WAIT: Duration = Duration::from_secs(2);

/// A chat server bound to an ephemeral port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub state: Arc<ServerState<()>>,
    shutdown: broadcast::Sender<()>,
    server: JoinHandle<anyhow::Result<()>>,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(config: Config) -> Self {
        // Initialize tracing (ignore error if already initialized)
        let _ = tracing_subscriber::registry()
            .with(EnvFilter::new("warn"))
            .with(tracing_subscriber::fmt::layer().with_test_writer())
            .try_init();

        let ctx = server::setup(config, (), ChatTask::new)
            .await
            .expect("Failed to set up server");
        let addr = ctx.local_addr().expect("listener has no local address");
        let state = ctx.state.clone();
        let shutdown = ctx.shutdown_handle();
        let server = tokio::spawn(server::serve(ctx));

        Self {
            addr,
            state,
            shutdown,
            server,
        }
    }

    pub async fn connect(&self) -> TestClient {
        let stream = TcpStream::connect(self.addr)
            .await
            .expect("Failed to connect to test server");
        stream.set_nodelay(true).unwrap();
        TestClient { stream }
    }

    /// Connects and greets with `h <id>`, which also proves the connection is registered.
    pub async fn join(&self, id: &str) -> TestClient {
        let mut client = self.connect().await;
        client.send(&format!("h {id}")).await;
        client.expect(&format!("Hello '{id}'.")).await;
        client
    }

    /// Polls until the registry holds exactly `count` connections.
    pub async fn wait_for_registered(&self, count: usize) {
        let deadline = tokio::time::Instant::now() + WAIT;
        while self.state.registry.len() != count {
            assert!(
                tokio::time::Instant::now() < deadline,
                "expected {} registered connections, found {}",
                count,
                self.state.registry.len()
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Signals shutdown and waits for the accept loop to return.
    pub async fn stop(self) -> anyhow::Result<()> {
        let _ = self.shutdown.send(());
        tokio::time::timeout(Duration::from_secs(10), self.server)
            .await
            .expect("server did not shut down")
            .expect("server task panicked")
    }
}

/// Test configuration: ephemeral port, no TLS, no metrics exporter.
pub fn test_config() -> Config {
    Config {
        port: 0,
        ..Config::default()
    }
}

pub struct TestClient {
    stream: TcpStream,
}

impl TestClient {
    pub async fn send(&mut self, message: &str) {
        self.stream.write_all(message.as_bytes()).await.unwrap();
    }

    /// Sends without panicking if the server already dropped the socket.
    pub async fn try_send(&mut self, message: &str) -> bool {
        self.stream.write_all(message.as_bytes()).await.is_ok()
    }

    /// Reads exactly `expected.len()` bytes and compares them.
    pub async fn expect(&mut self, expected: &str) {
        let mut buf = vec![0u8; expected.len()];
        tokio::time::timeout(WAIT, self.stream.read_exact(&mut buf))
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for {expected:?}"))
            .unwrap();
        assert_eq!(String::from_utf8_lossy(&buf), expected);
    }

    /// Like `expect`, but returns false instead of panicking on a mismatch,
    /// a closed connection, or no reply within `window`.
    pub async fn try_expect(&mut self, expected: &str, window: Duration) -> bool {
        let mut buf = vec![0u8; expected.len()];
        matches!(
            tokio::time::timeout(window, self.stream.read_exact(&mut buf)).await,
            Ok(Ok(_))
        ) && buf == expected.as_bytes()
    }

    /// Asserts that nothing arrives within `window`.
    pub async fn expect_silence(&mut self, window: Duration) {
        let mut buf = [0u8; 64];
        if let Ok(read) = tokio::time::timeout(window, self.stream.read(&mut buf)).await {
            let len = read.unwrap();
            panic!(
                "expected silence, got {:?}",
                String::from_utf8_lossy(&buf[..len])
            );
        }
    }

    /// Asserts that the server closes the connection without sending more data.
    pub async fn expect_closed(&mut self) {
        let rest = self.read_until_closed().await;
        assert!(
            rest.is_empty(),
            "expected close, got {:?}",
            String::from_utf8_lossy(&rest)
        );
    }

    /// Collects everything sent until the server closes the connection.
    pub async fn read_until_closed(&mut self) -> Vec<u8> {
        let mut received = Vec::new();
        let mut buf = [0u8; 256];
        loop {
            let read = tokio::time::timeout(WAIT, self.stream.read(&mut buf))
                .await
                .expect("timed out waiting for the server to close the connection");
            match read {
                Ok(0) | Err(_) => return received,
                Ok(len) => received.extend_from_slice(&buf[..len]),
            }
        }
    }
}
