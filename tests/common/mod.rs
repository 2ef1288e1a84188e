//! Shared utilities for integration tests.

#![allow(dead_code)]

use axum::{
    body::Bytes,
    http::{header, HeaderMap},
    routing::{any, post},
    Router,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use traffic_capture::capture::CaptureRecord;
use traffic_capture::config::{CaptureConfig, ExporterConfig};
use traffic_capture::export::CAPTURE_PATH;

/// One export call as the collector saw it.
#[derive(Debug)]
pub struct Received {
    pub headers: HeaderMap,
    pub record: CaptureRecord,
}

async fn serve(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// Start a collector that decodes every export and forwards it over a channel.
/// Each call is answered after `delay`.
pub async fn start_collector(delay: Duration) -> (SocketAddr, mpsc::UnboundedReceiver<Received>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let router = Router::new().route(
        CAPTURE_PATH,
        post(move |headers: HeaderMap, body: Bytes| {
            let tx = tx.clone();
            async move {
                tokio::time::sleep(delay).await;
                let record: CaptureRecord = serde_json::from_slice(&body).unwrap();
                let _ = tx.send(Received { headers, record });
                "ok"
            }
        }),
    );
    (serve(router).await, rx)
}

/// Start an upstream that echoes the request body back as JSON.
pub async fn start_echo_upstream() -> SocketAddr {
    let router = Router::new().route(
        "/{*path}",
        any(|body: Bytes| async move { ([(header::CONTENT_TYPE, "application/json")], body) }),
    );
    serve(router).await
}

/// Start an upstream that answers after `delay`.
pub async fn start_slow_upstream(delay: Duration) -> SocketAddr {
    let router = Router::new().route(
        "/{*path}",
        any(move || async move {
            tokio::time::sleep(delay).await;
            "late"
        }),
    );
    serve(router).await
}

/// An address nothing is listening on.
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

pub fn capture_config(collector: SocketAddr) -> CaptureConfig {
    CaptureConfig {
        tpa_endpoint: format!("http://{collector}"),
        service_name: "integration".to_string(),
        ..CaptureConfig::default()
    }
}

pub fn exporter_config(workers: usize, queue_capacity: usize) -> ExporterConfig {
    ExporterConfig {
        workers,
        queue_capacity,
        connect_timeout_secs: 1,
        request_timeout_secs: 5,
        ..ExporterConfig::default()
    }
}

/// Wait for the next export, failing the test after a few seconds.
pub async fn next_export(rx: &mut mpsc::UnboundedReceiver<Received>) -> Received {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for export")
        .expect("collector channel closed")
}

/// Poll `check` until it holds or a few seconds pass.
pub async fn eventually<F: FnMut() -> bool>(mut check: F) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    check()
}
