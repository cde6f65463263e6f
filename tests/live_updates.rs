//! End-to-end tests over real WebSocket connections

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use inventory_live::protocol::{CONNECTED_MESSAGE, INVENTORY_DELETED_MESSAGE};
use inventory_live::store::InventoryStore;
use inventory_live::{InventoryId, InventoryServer, ServerConfig};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const U1: &str = "0d8e7f6a-5b4c-4a3b-9c2d-1e0f9a8b7c6d";
const U2: &str = "a1b2c3d4-e5f6-4a7b-8c9d-0e1f2a3b4c5d";
const U3: &str = "c9d8e7f6-a5b4-4c3d-8e2f-1a0b9c8d7e6f";

const WAIT: Duration = Duration::from_secs(5);

struct Harness {
    addr: SocketAddr,
    server: Arc<InventoryServer>,
    store: Arc<InventoryStore>,
    _shutdown: oneshot::Sender<()>,
}

async fn start(config: ServerConfig) -> Harness {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = Arc::new(InventoryServer::new(config.bind(addr)));
    let store = Arc::new(InventoryStore::new(Arc::clone(server.publisher())));
    let (shutdown, shutdown_rx) = oneshot::channel::<()>();

    tokio::spawn({
        let server = Arc::clone(&server);
        async move {
            let _ = server
                .serve(listener, async {
                    let _ = shutdown_rx.await;
                })
                .await;
        }
    });

    Harness {
        addr,
        server,
        store,
        _shutdown: shutdown,
    }
}

async fn connect(addr: SocketAddr) -> Client {
    let (mut ws, _) = connect_async(format!("ws://{addr}")).await.unwrap();
    assert_eq!(
        recv_json(&mut ws).await,
        json!({ "type": "connected", "message": CONNECTED_MESSAGE })
    );
    ws
}

async fn recv_json(ws: &mut Client) -> Value {
    loop {
        let msg = tokio::time::timeout(WAIT, ws.next())
            .await
            .expect("timed out waiting for a message")
            .expect("stream ended")
            .expect("websocket error");
        match msg {
            Message::Text(text) => return serde_json::from_str(&text).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

async fn expect_silence(ws: &mut Client) {
    let result = tokio::time::timeout(Duration::from_millis(200), ws.next()).await;
    assert!(result.is_err(), "expected no message, got {result:?}");
}

async fn expect_closed(ws: &mut Client) {
    loop {
        match tokio::time::timeout(WAIT, ws.next()).await.unwrap() {
            Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
            Some(Ok(other)) => panic!("unexpected frame before close: {other:?}"),
        }
    }
}

async fn subscribe(ws: &mut Client, uuid: &str) {
    ws.send(Message::Text(
        json!({ "type": "subscribe", "uuid": uuid }).to_string(),
    ))
    .await
    .unwrap();
    assert_eq!(
        recv_json(ws).await,
        json!({ "type": "subscribed", "uuid": uuid })
    );
}

async fn wait_for<F: Fn() -> bool>(condition: F) {
    tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached");
}

#[tokio::test]
async fn test_rename_reaches_subscriber() {
    let harness = start(ServerConfig::default()).await;
    let mut client = connect(harness.addr).await;
    subscribe(&mut client, U1).await;

    harness.store.rename_inventory(U1, "Garage").unwrap();

    assert_eq!(
        recv_json(&mut client).await,
        json!({ "type": "inventory:name-changed", "data": { "name": "Garage" } })
    );
    expect_silence(&mut client).await;
}

#[tokio::test]
async fn test_uuid_case_does_not_split_viewers() {
    let harness = start(ServerConfig::default()).await;
    let mut upper_viewer = connect(harness.addr).await;
    let mut lower_viewer = connect(harness.addr).await;
    subscribe(&mut upper_viewer, &U1.to_uppercase()).await;
    subscribe(&mut lower_viewer, U1).await;

    harness.store.add_product(U1, "Saw", None).unwrap();
    harness
        .store
        .rename_inventory(&U1.to_uppercase(), "Workshop")
        .unwrap();

    for client in [&mut upper_viewer, &mut lower_viewer] {
        assert_eq!(recv_json(client).await["type"], "product:added");
        assert_eq!(recv_json(client).await["data"]["name"], "Workshop");
    }
    assert_eq!(
        harness
            .server
            .registry()
            .subscribers_of(&InventoryId::new(U1))
            .len(),
        2
    );
}

#[tokio::test]
async fn test_product_events_in_order() {
    let harness = start(ServerConfig::default()).await;
    let mut c1 = connect(harness.addr).await;
    let mut c2 = connect(harness.addr).await;
    subscribe(&mut c1, U1).await;
    subscribe(&mut c2, U1).await;

    let product = harness.store.add_product(U1, "Hammer", Some(2)).unwrap();
    harness.store.update_quantity(U1, product.id, 5).unwrap();
    harness.store.delete_product(U1, product.id).unwrap();

    for client in [&mut c1, &mut c2] {
        let added = recv_json(client).await;
        assert_eq!(added["type"], "product:added");
        assert_eq!(added["data"]["product"]["name"], "Hammer");
        assert_eq!(added["data"]["product"]["id"], product.id);

        let updated = recv_json(client).await;
        assert_eq!(updated["type"], "product:updated");
        assert_eq!(updated["data"]["product"]["quantity"], 5);

        let deleted = recv_json(client).await;
        assert_eq!(
            deleted,
            json!({ "type": "product:deleted", "data": { "productId": product.id } })
        );
    }
}

#[tokio::test]
async fn test_events_isolated_by_inventory() {
    let harness = start(ServerConfig::default()).await;
    let mut watcher_a = connect(harness.addr).await;
    let mut watcher_b = connect(harness.addr).await;
    subscribe(&mut watcher_a, U1).await;
    subscribe(&mut watcher_b, U2).await;

    harness.store.rename_inventory(U1, "Kitchen").unwrap();
    harness.store.rename_inventory(U2, "Cellar").unwrap();

    assert_eq!(recv_json(&mut watcher_a).await["data"]["name"], "Kitchen");
    assert_eq!(recv_json(&mut watcher_b).await["data"]["name"], "Cellar");
    expect_silence(&mut watcher_a).await;
}

#[tokio::test]
async fn test_switching_subscription() {
    let harness = start(ServerConfig::default()).await;
    let mut client = connect(harness.addr).await;
    subscribe(&mut client, U1).await;
    subscribe(&mut client, U2).await;

    harness.store.rename_inventory(U1, "Old").unwrap();
    harness.store.rename_inventory(U2, "New").unwrap();

    assert_eq!(recv_json(&mut client).await["data"]["name"], "New");
    assert!(harness
        .server
        .registry()
        .subscribers_of(&InventoryId::new(U1))
        .is_empty());
}

#[tokio::test]
async fn test_repeat_subscribe_not_confirmed_twice() {
    let harness = start(ServerConfig::default()).await;
    let mut client = connect(harness.addr).await;
    subscribe(&mut client, U1).await;

    client
        .send(Message::Text(
            json!({ "type": "subscribe", "uuid": U1 }).to_string(),
        ))
        .await
        .unwrap();
    expect_silence(&mut client).await;

    assert_eq!(
        harness
            .server
            .registry()
            .subscribers_of(&InventoryId::new(U1))
            .len(),
        1
    );
}

#[tokio::test]
async fn test_malformed_frame_keeps_connection() {
    let harness = start(ServerConfig::default()).await;
    let mut client = connect(harness.addr).await;

    client
        .send(Message::Text("{definitely not json".to_string()))
        .await
        .unwrap();
    client
        .send(Message::Text(r#"{"type":"launch"}"#.to_string()))
        .await
        .unwrap();
    expect_silence(&mut client).await;

    subscribe(&mut client, U1).await;
}

#[tokio::test]
async fn test_delete_inventory_evicts_viewers() {
    let harness = start(ServerConfig::default()).await;
    harness.store.add_product(U2, "Ladder", None).unwrap();
    let mut c1 = connect(harness.addr).await;
    let mut c2 = connect(harness.addr).await;
    let mut bystander = connect(harness.addr).await;
    subscribe(&mut c1, U2).await;
    subscribe(&mut c2, U2).await;
    subscribe(&mut bystander, U3).await;

    assert_eq!(harness.store.delete_inventory(U2).unwrap(), 2);

    for client in [&mut c1, &mut c2] {
        assert_eq!(
            recv_json(client).await,
            json!({ "type": "inventory:deleted", "message": INVENTORY_DELETED_MESSAGE })
        );
        expect_closed(client).await;
    }

    let registry = Arc::clone(harness.server.registry());
    assert!(registry.subscribers_of(&InventoryId::new(U2)).is_empty());
    wait_for(|| registry.connection_count() == 1).await;
    assert_eq!(registry.subscribers_of(&InventoryId::new(U3)).len(), 1);

    harness.store.rename_inventory(U3, "Still here").unwrap();
    assert_eq!(recv_json(&mut bystander).await["data"]["name"], "Still here");
}

#[tokio::test]
async fn test_disconnect_unsubscribes() {
    let harness = start(ServerConfig::default()).await;
    let mut client = connect(harness.addr).await;
    subscribe(&mut client, U1).await;

    let registry = Arc::clone(harness.server.registry());
    assert!(registry.has_subscribers(&InventoryId::new(U1)));

    client.close(None).await.unwrap();
    drop(client);

    wait_for(|| registry.connection_count() == 0).await;
    assert!(!registry.has_subscribers(&InventoryId::new(U1)));
    assert_eq!(registry.inventory_count(), 0);

    // Writes keep succeeding with nobody watching
    assert!(harness.store.add_product(U1, "Tape", None).is_ok());
}

#[tokio::test]
async fn test_dropped_socket_does_not_affect_others() {
    let harness = start(ServerConfig::default()).await;
    let mut gone = connect(harness.addr).await;
    let mut alive = connect(harness.addr).await;
    subscribe(&mut gone, U3).await;
    subscribe(&mut alive, U3).await;

    drop(gone);
    harness.store.add_product(U3, "Rope", Some(1)).unwrap();

    assert_eq!(recv_json(&mut alive).await["type"], "product:added");
}

#[tokio::test]
async fn test_connection_limit() {
    let harness = start(ServerConfig::default().max_connections(1)).await;
    let _first = connect(harness.addr).await;

    let second = connect_async(format!("ws://{}", harness.addr)).await;
    assert!(second.is_err());
}

#[tokio::test]
async fn test_idle_timeout_closes_connection() {
    let harness = start(
        ServerConfig::default()
            .ping_interval(Duration::from_millis(50))
            .idle_timeout(Duration::from_millis(10)),
    )
    .await;
    let (mut raw, _) = connect_async(format!("ws://{}", harness.addr))
        .await
        .unwrap();

    // Never read, so pongs are never sent back
    tokio::time::sleep(Duration::from_millis(300)).await;

    let registry = Arc::clone(harness.server.registry());
    wait_for(|| registry.connection_count() == 0).await;

    assert_eq!(recv_json(&mut raw).await["type"], "connected");
    expect_closed(&mut raw).await;
}
