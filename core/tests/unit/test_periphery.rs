//! Periphery client tests against a stub agent

use std::time::{Duration, Instant};

use axum::{
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use dockhand::errors::CoreError;
use dockhand::models::server::{Server, ServerConfig};
use dockhand::periphery::client::{Options, PeripheryClient};
use dockhand::periphery::Periphery;
use periphery_api::{
    CommandResult, ContainerState, ContainerSummary, ContainerTarget, PeripheryRequest,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

const PASSKEY: &str = "stub-passkey";

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        == Some(PASSKEY)
}

async fn health(headers: HeaderMap) -> StatusCode {
    if authorized(&headers) {
        StatusCode::OK
    } else {
        StatusCode::UNAUTHORIZED
    }
}

async fn execute(
    headers: HeaderMap,
    Json(request): Json<PeripheryRequest>,
) -> Result<Json<CommandResult>, (StatusCode, String)> {
    if !authorized(&headers) {
        return Err((StatusCode::UNAUTHORIZED, "bad passkey".to_string()));
    }
    match request {
        PeripheryRequest::StartContainer(target) => Ok(Json(CommandResult::ok(
            format!("docker start {}", target.name),
            "started",
        ))),
        PeripheryRequest::StopContainer(_) => {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(Json(CommandResult::ok("docker stop", "stopped")))
        }
        _ => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            "docker daemon unavailable".to_string(),
        )),
    }
}

async fn containers(
    headers: HeaderMap,
) -> Result<Json<Vec<ContainerSummary>>, (StatusCode, String)> {
    if !authorized(&headers) {
        return Err((StatusCode::UNAUTHORIZED, "bad passkey".to_string()));
    }
    Ok(Json(vec![ContainerSummary {
        name: "api".to_string(),
        image: "api:0.0.3".to_string(),
        state: ContainerState::Running,
        status: Some("Up 2 hours".to_string()),
    }]))
}

/// Serve the stub agent on an ephemeral port
async fn stub_agent() -> String {
    let app = Router::new()
        .route("/health", get(health))
        .route("/execute", post(execute))
        .route("/containers", get(containers));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr.to_string()
}

/// Accept connections and never answer
async fn silent_agent() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    addr.to_string()
}

fn server(address: &str, passkey: &str) -> Server {
    ServerConfig {
        name: Some("edge".to_string()),
        address: Some(address.to_string()),
        passkey: Some(passkey.to_string()),
        ..Default::default()
    }
    .into_server("s1".to_string(), "admin")
    .unwrap()
}

fn client(health_timeout: Duration, operation_timeout: Duration) -> PeripheryClient {
    PeripheryClient::new(Options {
        health_timeout,
        operation_timeout,
    })
    .unwrap()
}

fn stop(name: &str) -> PeripheryRequest {
    PeripheryRequest::StopContainer(ContainerTarget {
        name: name.to_string(),
    })
}

#[tokio::test]
async fn test_health_check_sends_the_passkey() {
    let address = stub_agent().await;
    let client = client(Duration::from_secs(2), Duration::from_secs(5));

    assert!(client.check_health(&server(&address, PASSKEY)).await);
    assert!(!client.check_health(&server(&address, "wrong")).await);
}

#[tokio::test]
async fn test_health_check_is_bounded() {
    let address = silent_agent().await;
    let client = client(Duration::from_millis(200), Duration::from_secs(5));

    let started = Instant::now();
    assert!(!client.check_health(&server(&address, PASSKEY)).await);
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_health_check_of_disabled_and_core_servers() {
    let client = client(Duration::from_millis(200), Duration::from_secs(5));

    // nothing listens on port 1
    let mut core = server("127.0.0.1:1", PASSKEY);
    core.is_core = true;
    assert!(client.check_health(&core).await);

    let address = stub_agent().await;
    let mut disabled = server(&address, PASSKEY);
    disabled.enabled = false;
    assert!(!client.check_health(&disabled).await);
}

#[tokio::test]
async fn test_dispatch_returns_the_agent_result() {
    let address = stub_agent().await;
    let client = client(Duration::from_secs(2), Duration::from_secs(5));
    let request = PeripheryRequest::StartContainer(ContainerTarget {
        name: "api".to_string(),
    });

    let result = client
        .dispatch(&server(&address, PASSKEY), request, &CancellationToken::new())
        .await;
    assert!(!result.is_error);
    assert_eq!(result.command, "docker start api");
}

#[tokio::test]
async fn test_dispatch_maps_failures_to_error_results() {
    let address = stub_agent().await;
    let client = client(Duration::from_secs(2), Duration::from_secs(5));
    let request = PeripheryRequest::RemoveContainer(ContainerTarget {
        name: "api".to_string(),
    });

    let result = client
        .dispatch(
            &server(&address, PASSKEY),
            request.clone(),
            &CancellationToken::new(),
        )
        .await;
    assert!(result.is_error);
    assert!(result.output.contains("500"));

    let unreachable = client
        .dispatch(
            &server("127.0.0.1:1", PASSKEY),
            request,
            &CancellationToken::new(),
        )
        .await;
    assert!(unreachable.is_error);
}

#[tokio::test]
async fn test_dispatch_is_cancellable_and_bounded() {
    let address = stub_agent().await;

    let client_a = client(Duration::from_secs(2), Duration::from_secs(20));
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });
    let result = client_a
        .dispatch(&server(&address, PASSKEY), stop("api"), &cancel)
        .await;
    assert!(result.is_error);
    assert!(result.output.contains("cancelled"));

    let client_b = client(Duration::from_secs(2), Duration::from_millis(200));
    let result = client_b
        .dispatch(
            &server(&address, PASSKEY),
            stop("api"),
            &CancellationToken::new(),
        )
        .await;
    assert!(result.is_error);
    assert!(result.output.contains("timed out"));
}

#[tokio::test]
async fn test_container_list() {
    let address = stub_agent().await;
    let client = client(Duration::from_secs(2), Duration::from_secs(5));

    let containers = client
        .container_list(&server(&address, PASSKEY))
        .await
        .unwrap();
    assert_eq!(containers.len(), 1);
    assert_eq!(containers[0].state, ContainerState::Running);

    let mut disabled = server(&address, PASSKEY);
    disabled.enabled = false;
    assert!(matches!(
        client.container_list(&disabled).await,
        Err(CoreError::PeripheryUnreachable(_))
    ));
}

#[tokio::test]
async fn test_container_list_rejected_by_the_agent() {
    let address = stub_agent().await;
    let client = client(Duration::from_secs(2), Duration::from_secs(5));

    match client.container_list(&server(&address, "wrong")).await {
        Err(CoreError::RemoteCommandFailed(message)) => assert!(message.contains("401")),
        other => panic!("expected RemoteCommandFailed, got {:?}", other),
    }

    // nothing listens on port 1
    assert!(matches!(
        client.container_list(&server("127.0.0.1:1", PASSKEY)).await,
        Err(CoreError::PeripheryUnreachable(_))
    ));
}
