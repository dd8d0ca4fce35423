//! Live update WebSocket tests

use std::time::Duration;

use dockhand::actions::executor::ExecuteRequest;
use dockhand::models::user::User;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use crate::common::{finish, fixture, serve_api, started};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn connect(addr: &str) -> Socket {
    let (socket, _) = connect_async(format!("ws://{}/ws/update", addr))
        .await
        .unwrap();
    socket
}

async fn send(socket: &mut Socket, value: Value) {
    socket
        .send(Message::text(value.to_string()))
        .await
        .unwrap();
}

/// Next JSON text frame, or `None` once the server closes
async fn next_json(socket: &mut Socket) -> Option<Value> {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("no message from the server");
        match message {
            Some(Ok(Message::Text(text))) => {
                return Some(serde_json::from_str(text.as_str()).unwrap());
            }
            Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return None,
            Some(Ok(_)) => {}
        }
    }
}

fn stop(id: &str) -> ExecuteRequest {
    ExecuteRequest::StopContainer {
        deployment_id: id.to_string(),
    }
}

#[tokio::test]
async fn test_login_is_acknowledged() {
    let fx = fixture().await;
    let (addr, _) = serve_api(&fx).await;
    let mut socket = connect(&addr).await;

    send(&mut socket, json!({ "token": fx.token(&fx.alice) })).await;
    assert_eq!(next_json(&mut socket).await, Some(json!({ "type": "LOGGED_IN" })));
}

#[tokio::test]
async fn test_bad_token_is_rejected_and_closed() {
    let fx = fixture().await;
    let (addr, _) = serve_api(&fx).await;
    let mut socket = connect(&addr).await;

    send(&mut socket, json!({ "token": "forged" })).await;
    let reply = next_json(&mut socket).await.unwrap();
    assert_eq!(reply["type"], "ERROR");
    assert!(next_json(&mut socket).await.is_none());
}

#[tokio::test]
async fn test_events_are_filtered_by_read_permission() {
    let fx = fixture().await;
    let (addr, _) = serve_api(&fx).await;
    fx.server("s1", &fx.admin).await;
    fx.deployment("hidden", "s1", &fx.admin).await;
    fx.deployment("mine", "s1", &fx.alice).await;

    let mut socket = connect(&addr).await;
    send(
        &mut socket,
        json!({ "token": fx.token(&fx.alice), "operations": ["StopContainer"] }),
    )
    .await;
    assert_eq!(next_json(&mut socket).await.unwrap()["type"], "LOGGED_IN");

    let handle = started(fx.state.executor.execute(&fx.admin, stop("hidden")).await.unwrap());
    finish(handle).await;
    let handle = started(fx.state.executor.execute(&fx.alice, stop("mine")).await.unwrap());
    finish(handle).await;

    // the first event alice sees is for her own deployment
    let event = next_json(&mut socket).await.unwrap();
    assert_eq!(event["target"], json!({ "type": "Deployment", "id": "mine" }));
    assert_eq!(event["operation"], "StopContainer");
    assert_eq!(event["operator"], "alice");
}

#[tokio::test]
async fn test_disabled_user_is_disconnected_on_the_next_event() {
    let fx = fixture().await;
    let (addr, _) = serve_api(&fx).await;
    fx.server("s1", &fx.admin).await;
    fx.deployment("mine", "s1", &fx.alice).await;

    let mut socket = connect(&addr).await;
    send(&mut socket, json!({ "token": fx.token(&fx.alice) })).await;
    assert_eq!(next_json(&mut socket).await.unwrap()["type"], "LOGGED_IN");

    fx.state
        .registry
        .users
        .update(
            &fx.alice.id,
            Box::new(|user: &mut User| {
                user.enabled = false;
                Ok(())
            }),
        )
        .await
        .unwrap();
    let handle = started(fx.state.executor.execute(&fx.admin, stop("mine")).await.unwrap());
    finish(handle).await;

    let reply = next_json(&mut socket).await.unwrap();
    assert_eq!(reply["type"], "ERROR");
    assert!(next_json(&mut socket).await.is_none());
}

#[tokio::test]
async fn test_shutdown_closes_live_connections() {
    let fx = fixture().await;
    let (addr, shutdown) = serve_api(&fx).await;
    let mut socket = connect(&addr).await;

    send(&mut socket, json!({ "token": fx.token(&fx.bob) })).await;
    assert_eq!(next_json(&mut socket).await.unwrap()["type"], "LOGGED_IN");

    shutdown.cancel();
    assert!(next_json(&mut socket).await.is_none());
}
