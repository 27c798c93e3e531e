// tests/integration/chat_test.rs

use super::test_helpers::TestServer;
use std::time::Duration;

#[tokio::test]
async fn test_chat_session_end_to_end() {
    let server = TestServer::start().await;

    let mut alice = server.join("alice").await;
    let mut bob = server.join("bob").await;
    server.wait_for_registered(2).await;

    alice.send("b hi").await;
    alice.expect("hi").await;
    bob.expect("hi").await;

    bob.send("u alice secret").await;
    alice.expect("secret").await;
    bob.expect_silence(Duration::from_millis(100)).await;

    alice.send("d").await;
    alice.expect_closed().await;
    server.wait_for_registered(1).await;

    // bob is still served after alice left
    bob.send("e still here").await;
    bob.expect("still here").await;

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_unicast_to_unknown_id_is_silent() {
    let server = TestServer::start().await;
    let mut alice = server.join("alice").await;

    alice.send("u nobody hello").await;
    alice.expect_silence(Duration::from_millis(100)).await;

    alice.send("e ok").await;
    alice.expect("ok").await;

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_unicast_with_duplicate_ids_reaches_first_joined() {
    let server = TestServer::start().await;
    let mut first = server.join("twin").await;
    let mut second = server.join("twin").await;
    let mut sender = server.join("sender").await;

    sender.send("u twin ping").await;
    first.expect("ping").await;
    second.expect_silence(Duration::from_millis(100)).await;
    sender.expect_silence(Duration::from_millis(50)).await;

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_malformed_input_keeps_connection_open() {
    let server = TestServer::start().await;
    let mut client = server.connect().await;
    server.wait_for_registered(1).await;

    client.send("   ").await;
    client.expect_silence(Duration::from_millis(100)).await;
    client.send("h").await;
    client.expect_silence(Duration::from_millis(100)).await;

    client.send("e back").await;
    client.expect("back").await;
    assert_eq!(server.state.registry.len(), 1);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_unknown_command() {
    let server = TestServer::start().await;
    let mut client = server.connect().await;

    client.send("x").await;
    client.expect("Unknown command 'x'.").await;

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_log_command_has_no_reply() {
    let server = TestServer::start().await;
    let mut client = server.join("logger").await;

    client.send("l something happened").await;
    client.expect_silence(Duration::from_millis(100)).await;

    client.send("e alive").await;
    client.expect("alive").await;

    server.stop().await.unwrap();
}
