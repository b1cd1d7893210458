//! Server lifecycle over real sockets.

use std::time::Duration;

use katmon_dashboard::{run_server, DashboardConfig, DashboardError, DashboardState};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;

fn config_on(port: u16) -> DashboardConfig {
    DashboardConfig {
        bind: "127.0.0.1".to_string(),
        port,
        ..Default::default()
    }
}

fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

#[tokio::test]
async fn test_bind_failure_is_reported() {
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = taken.local_addr().unwrap().port();

    let result = run_server(DashboardState::new(), config_on(port), async {}).await;
    assert!(matches!(result, Err(DashboardError::Bind { .. })));
}

#[tokio::test]
async fn test_serves_until_shutdown() {
    let port = free_port();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(run_server(DashboardState::new(), config_on(port), async {
        let _ = stop_rx.await;
    }));

    let mut stream = None;
    for _ in 0..50 {
        if let Ok(s) = TcpStream::connect(("127.0.0.1", port)).await {
            stream = Some(s);
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let mut stream = stream.expect("dashboard never started listening");
    stream
        .write_all(b"GET /api/cmcs HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    assert!(response.starts_with("HTTP/1.1 200"));
    assert!(response.contains("\"cmcs\":[]"));

    stop_tx.send(()).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
}
