//! Real WebSocket clients against the gateway.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use txelevator_broadcast::{BusMessage, LocalBus, MessageBus, MessageKind};
use txelevator_core::Network;
use txelevator_gateway::{serve_connection, Gateway, GatewayConfig, WorkerStreams, WELCOME};

async fn next_json<S>(client: &mut WebSocketStream<S>) -> Value
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("websocket error");
        if let Message::Text(text) = message {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn send<S>(client: &mut WebSocketStream<S>, text: &str)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    client.send(Message::Text(text.to_string())).await.unwrap();
}

async fn wait_for_listeners(streams: &WorkerStreams, kind: MessageKind, count: usize) {
    for _ in 0..500 {
        if streams.listener_count(kind) == count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "expected {count} {kind} listeners, have {}",
        streams.listener_count(kind)
    );
}

fn block_message(n: u64) -> BusMessage {
    BusMessage {
        network: Network::Testnet,
        kind: MessageKind::NewBlock,
        payload: Arc::new(json!({ "n": n })),
    }
}

async fn connect(
    streams: &WorkerStreams,
    conn: u64,
) -> (
    WebSocketStream<tokio::io::DuplexStream>,
    tokio::task::JoinHandle<Result<(), txelevator_gateway::GatewayError>>,
) {
    let (server_io, client_io) = tokio::io::duplex(64 * 1024);
    let server = tokio::spawn(serve_connection(server_io, streams.clone(), conn));
    let (mut client, _) = tokio_tungstenite::client_async("ws://localhost/", client_io)
        .await
        .unwrap();
    let welcome = next_json(&mut client).await;
    assert_eq!(welcome, json!({"type": "welcome", "data": WELCOME}));
    (client, server)
}

#[tokio::test]
async fn subscribed_client_receives_broadcasts() {
    let streams = WorkerStreams::new();
    let (mut client, _server) = connect(&streams, 1).await;

    send(&mut client, r#"{"type":"newBlock"}"#).await;
    send(&mut client, r#"{"type":"newBlock"}"#).await;
    wait_for_listeners(&streams, MessageKind::NewBlock, 1).await;

    streams.publish(&block_message(9));
    assert_eq!(
        next_json(&mut client).await,
        json!({"type": "newBlock", "data": {"n": 9}})
    );
}

#[tokio::test]
async fn malformed_message_only_affects_its_sender() {
    let streams = WorkerStreams::new();
    let (mut bad, _s1) = connect(&streams, 1).await;
    let (mut good, _s2) = connect(&streams, 2).await;

    send(&mut good, r#"{"type":"newBlock"}"#).await;
    wait_for_listeners(&streams, MessageKind::NewBlock, 1).await;

    send(&mut bad, "definitely not json").await;
    let reply = next_json(&mut bad).await;
    assert_eq!(reply["type"], "error");

    // the offending connection is still usable
    send(&mut bad, r#"{"type":"newBlock"}"#).await;
    wait_for_listeners(&streams, MessageKind::NewBlock, 2).await;

    streams.publish(&block_message(1));
    assert_eq!(next_json(&mut good).await["data"]["n"], 1);
    assert_eq!(next_json(&mut bad).await["data"]["n"], 1);
}

#[tokio::test]
async fn unsubscribe_and_disconnect_release_listeners() {
    let streams = WorkerStreams::new();
    let (mut client, server) = connect(&streams, 1).await;

    send(&mut client, r#"{"type":"newSnapshot"}"#).await;
    send(&mut client, r#"{"type":"newBlock"}"#).await;
    wait_for_listeners(&streams, MessageKind::NewSnapshot, 1).await;
    wait_for_listeners(&streams, MessageKind::NewBlock, 1).await;

    send(&mut client, r#"{"type":"unsubscribe","payload":"newSnapshot"}"#).await;
    wait_for_listeners(&streams, MessageKind::NewSnapshot, 0).await;
    assert_eq!(streams.listener_count(MessageKind::NewBlock), 1);

    client.close(None).await.unwrap();
    server.await.unwrap().unwrap();
    assert_eq!(streams.listener_count(MessageKind::NewSnapshot), 0);
    assert_eq!(streams.listener_count(MessageKind::NewBlock), 0);
}

#[tokio::test]
async fn nothing_reaches_the_socket_after_unsubscribe() {
    let streams = WorkerStreams::new();
    let (mut client, _server) = connect(&streams, 1).await;

    send(&mut client, r#"{"type":"newSnapshot"}"#).await;
    send(&mut client, r#"{"type":"newBlock"}"#).await;
    wait_for_listeners(&streams, MessageKind::NewSnapshot, 1).await;
    wait_for_listeners(&streams, MessageKind::NewBlock, 1).await;

    send(&mut client, r#"{"type":"unsubscribe","payload":"newSnapshot"}"#).await;
    wait_for_listeners(&streams, MessageKind::NewSnapshot, 0).await;

    let snapshot = BusMessage {
        kind: MessageKind::NewSnapshot,
        ..block_message(1)
    };
    assert_eq!(streams.publish(&snapshot), 0);
    streams.publish(&block_message(2));

    assert_eq!(
        next_json(&mut client).await,
        json!({"type": "newBlock", "data": {"n": 2}})
    );
    let quiet = tokio::time::timeout(Duration::from_millis(100), client.next()).await;
    assert!(quiet.is_err(), "unexpected frame: {quiet:?}");
}

#[tokio::test]
async fn dropped_socket_releases_listeners() {
    let streams = WorkerStreams::new();
    let (mut client, server) = connect(&streams, 1).await;

    send(&mut client, r#"{"type":"newBlock"}"#).await;
    wait_for_listeners(&streams, MessageKind::NewBlock, 1).await;

    drop(client);
    let _ = server.await.unwrap();
    assert_eq!(streams.listener_count(MessageKind::NewBlock), 0);
}

#[tokio::test]
async fn gateway_fans_bus_messages_out_across_workers() {
    let bus = LocalBus::new(64);
    let gateway = Gateway::spawn(
        GatewayConfig {
            network: Network::Testnet,
            workers: 2,
        },
        &bus,
    );
    assert_eq!(gateway.worker_count(), 2);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(gateway.serve(listener));

    let mut clients = Vec::new();
    for _ in 0..2 {
        let (mut client, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
            .await
            .unwrap();
        assert_eq!(next_json(&mut client).await["type"], "welcome");
        send(&mut client, r#"{"type":"newBlock"}"#).await;
        clients.push(client);
    }

    // subscription is best effort: keep publishing until both clients hear it
    for client in &mut clients {
        let frame = loop {
            bus.publish(block_message(42)).unwrap();
            match tokio::time::timeout(Duration::from_millis(50), client.next()).await {
                Ok(Some(Ok(Message::Text(text)))) => break serde_json::from_str::<Value>(&text).unwrap(),
                Ok(Some(Ok(_))) | Err(_) => continue,
                Ok(other) => panic!("connection ended: {other:?}"),
            }
        };
        assert_eq!(frame, json!({"type": "newBlock", "data": {"n": 42}}));
    }
}
