//! Shared utilities for integration tests.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use ecs_smart_client::discovery::ListDataNode;
use ecs_smart_client::health::ping::{PingItem, PingStatus, MAINTENANCE_MODE};
use ecs_smart_client::health::PingResponse;

/// Start a programmable mock backend on an ephemeral port.
///
/// The handler receives the request target (path and query) and returns
/// the status and body to answer with.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let Some(target) = read_request_target(&mut socket).await else {
                            return;
                        };
                        let (status, body) = f(target).await;
                        let status_text = match status {
                            200 => "200 OK",
                            403 => "403 Forbidden",
                            404 => "404 Not Found",
                            500 => "500 Internal Server Error",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };

                        let response_str = format!(
                            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Read request headers and return the target of the request line.
async fn read_request_target(socket: &mut tokio::net::TcpStream) -> Option<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let head = String::from_utf8_lossy(&buf);
    head.lines().next()?.split_whitespace().nth(1).map(str::to_string)
}

/// Knobs of a mock cluster node.
#[derive(Default)]
pub struct NodeState {
    pub down: AtomicBool,
    pub maintenance: AtomicBool,
}

/// Start a mock node answering `/?ping`, `/?endpoint` (listing
/// `data_nodes`) and anything else with `200 ok`. While `down` is set every
/// request gets a 503.
#[allow(dead_code)]
pub async fn start_node(data_nodes: Vec<String>) -> (SocketAddr, Arc<NodeState>) {
    let state = Arc::new(NodeState::default());
    let node = state.clone();
    let addr = start_programmable_backend(move |target| {
        let node = node.clone();
        let data_nodes = data_nodes.clone();
        async move {
            if node.down.load(Ordering::SeqCst) {
                return (503, "down".to_string());
            }
            match target.as_str() {
                "/?ping" => {
                    let status = if node.maintenance.load(Ordering::SeqCst) {
                        PingStatus::On
                    } else {
                        PingStatus::Off
                    };
                    let mut ping = PingResponse::new();
                    ping.insert(PingItem::new(MAINTENANCE_MODE, Some(status), None, None));
                    (200, ping.to_xml())
                }
                "/?endpoint" => (200, ListDataNode::new(data_nodes).to_xml()),
                _ => (200, "ok".to_string()),
            }
        }
    })
    .await;
    (addr, state)
}

/// An address nothing listens on.
#[allow(dead_code)]
pub fn closed_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}
