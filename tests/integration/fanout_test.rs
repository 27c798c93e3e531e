// tests/integration/fanout_test.rs

use super::test_helpers::TestServer;
use std::time::Duration;

#[tokio::test]
async fn test_broadcast_reaches_every_client_once() {
    let server = TestServer::start().await;

    let mut clients = Vec::new();
    for i in 0..5 {
        clients.push(server.join(&format!("c{i}")).await);
    }
    server.wait_for_registered(5).await;

    clients[0].send("b hello all").await;
    for client in clients.iter_mut() {
        client.expect("hello all").await;
        client.expect_silence(Duration::from_millis(50)).await;
    }

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_broadcast_with_concurrent_disconnect() {
    let server = TestServer::start().await;

    let mut sender = server.join("sender").await;
    let mut stay = server.join("stay").await;
    let mut leave = server.join("leave").await;
    server.wait_for_registered(3).await;

    leave.send("d").await;
    sender.send("b news").await;

    sender.expect("news").await;
    stay.expect("news").await;
    sender.expect_silence(Duration::from_millis(100)).await;
    stay.expect_silence(Duration::from_millis(50)).await;

    // The leaving client sees at most one copy before the close.
    let received = leave.read_until_closed().await;
    assert!(received.is_empty() || received == b"news");

    server.wait_for_registered(2).await;
    server.stop().await.unwrap();
}
