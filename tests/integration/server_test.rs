// tests/integration/server_test.rs

use super::test_helpers::{TestServer, WAIT, test_config};
use spindle::config::{Config, TlsConfig};
use spindle::server;
use spindle::tasks::ChatTask;
use std::time::Duration;

#[tokio::test]
async fn test_max_clients_rejects_excess_connections() {
    let config = Config {
        max_clients: 1,
        ..test_config()
    };
    let server = TestServer::with_config(config).await;

    let mut first = server.join("first").await;

    let mut second = server.connect().await;
    second.expect_closed().await;
    assert_eq!(server.state.stats.get_rejected_connections(), 1);
    assert_eq!(server.state.registry.len(), 1);

    // The slot frees up once the first client leaves.
    first.send("d").await;
    first.expect_closed().await;
    server.wait_for_registered(0).await;

    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        let mut third = server.connect().await;
        if third.try_send("e in").await
            && third.try_expect("in", Duration::from_millis(200)).await
        {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "no slot became free");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_closes_every_connection() {
    let server = TestServer::start().await;
    let mut alice = server.join("alice").await;
    let mut bob = server.join("bob").await;
    let state = server.state.clone();

    server.stop().await.unwrap();

    alice.expect_closed().await;
    bob.expect_closed().await;
    assert!(state.registry.is_empty());
    assert_eq!(state.stats.get_closed_connections(), 2);
}

#[tokio::test]
async fn test_read_timeout_drops_idle_clients() {
    let config = Config {
        read_timeout: Some(Duration::from_millis(100)),
        ..test_config()
    };
    let server = TestServer::with_config(config).await;

    let mut idle = server.connect().await;
    idle.expect_closed().await;
    server.wait_for_registered(0).await;

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_stats_count_accepted_connections() {
    let server = TestServer::start().await;

    for i in 0..3 {
        let mut client = server.join(&format!("n{i}")).await;
        client.send("d").await;
        client.expect_closed().await;
    }
    server.wait_for_registered(0).await;

    assert_eq!(server.state.stats.get_total_connections(), 3);
    assert_eq!(server.state.stats.get_rejected_connections(), 0);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_setup_fails_without_tls_material() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        tls: TlsConfig {
            enabled: true,
            cert_path: dir.path().join("missing.crt").display().to_string(),
            key_path: dir.path().join("missing.key").display().to_string(),
        },
        ..test_config()
    };

    let result = server::setup(config, (), ChatTask::new).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_setup_rejects_empty_certificate_file() {
    let dir = tempfile::tempdir().unwrap();
    let cert_path = dir.path().join("empty.crt");
    let key_path = dir.path().join("empty.key");
    std::fs::write(&cert_path, "").unwrap();
    std::fs::write(&key_path, "").unwrap();

    let config = Config {
        tls: TlsConfig {
            enabled: true,
            cert_path: cert_path.display().to_string(),
            key_path: key_path.display().to_string(),
        },
        ..test_config()
    };

    let error = server::setup(config, (), ChatTask::new)
        .await
        .err()
        .expect("setup should fail");
    assert!(error.to_string().contains("No certificates"));
}
