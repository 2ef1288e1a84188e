//! Export pipeline behavior against live and failing collectors.

use axum::body::Body;
use axum::extract::Request;
use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::Response;
use bytes::Bytes;
use futures_util::{stream, StreamExt};
use http_body::Frame;
use http_body_util::{BodyExt, StreamBody};
use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use traffic_capture::capture::{CapturePolicy, CaptureRecord, Interceptor};
use traffic_capture::export::{EnqueueOutcome, Exporter};
use traffic_capture::http::RequestId;

mod common;

fn grpc_response() -> Response {
    let mut trailers = HeaderMap::new();
    trailers.insert("grpc-status", HeaderValue::from_static("5"));
    trailers.insert("grpc-message", HeaderValue::from_static("not found"));
    let frames = vec![
        Ok::<_, Infallible>(Frame::data(Bytes::from_static(&[0, 0, 0, 0, 2, 8, 1]))),
        Ok(Frame::trailers(trailers)),
    ];
    Response::builder()
        .header(header::CONTENT_TYPE, "application/grpc")
        .body(Body::new(StreamBody::new(stream::iter(frames))))
        .unwrap()
}

#[tokio::test]
async fn test_grpc_status_comes_from_trailers() {
    let (collector, mut exports) = common::start_collector(Duration::ZERO).await;
    let capture = common::capture_config(collector);
    let exporter = Exporter::start(&capture, &common::exporter_config(1, 10)).unwrap();
    let interceptor = Interceptor::new(CapturePolicy::from_config(&capture), exporter);

    let request = Request::builder()
        .method("POST")
        .uri("/pkg.Books/Get")
        .header(header::CONTENT_TYPE, "application/grpc")
        .body(Body::from(vec![0u8, 0, 0, 0, 0]))
        .unwrap();

    let mut calls = 0;
    let response = interceptor
        .intercept(request, |request| {
            calls += 1;
            async move {
                request.into_body().collect().await.unwrap();
                grpc_response()
            }
        })
        .await;
    assert_eq!(calls, 1);

    let collected = response.into_body().collect().await.unwrap();
    let trailers = collected.trailers().cloned();
    assert_eq!(collected.to_bytes(), Bytes::from_static(&[0, 0, 0, 0, 2, 8, 1]));
    assert_eq!(trailers.unwrap()["grpc-status"], "5");

    let record = common::next_export(&mut exports).await.record;
    assert_eq!(record.request.path, "/pkg.Books/Get");
    assert_eq!(record.request.body, Some(Bytes::from_static(&[0, 0, 0, 0, 0])));
    // No connection info outside a server.
    assert_eq!(record.request.source_address, "");
    assert_eq!(record.request.source_port, 0);

    assert_eq!(record.response.status_code, 0);
    assert_eq!(record.response.headers["grpc-status"], "5");
    assert_eq!(record.response.headers["trailer:grpc-message"], "not found");
    assert!(!record.response.headers.contains_key("trailer:grpc-status"));
}

fn interceptor_with_cap(collector: std::net::SocketAddr, cap: usize) -> Interceptor {
    let mut capture = common::capture_config(collector);
    capture.body_capture_size = cap;
    let exporter = Exporter::start(&capture, &common::exporter_config(1, 10)).unwrap();
    Interceptor::new(CapturePolicy::from_config(&capture), exporter)
}

#[tokio::test]
async fn test_request_body_clipped_for_record_but_forwarded_whole() {
    let (collector, mut exports) = common::start_collector(Duration::ZERO).await;
    let interceptor = interceptor_with_cap(collector, 4);

    let payload = r#"{"name":"a long enough document"}"#;
    let request = Request::builder()
        .method("POST")
        .uri("/documents")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::CONTENT_LENGTH, payload.len())
        .body(Body::from(payload))
        .unwrap();

    let response = interceptor
        .intercept(request, |request| async move {
            // Downstream sees the original length and every byte.
            assert_eq!(request.headers()[header::CONTENT_LENGTH], payload.len().to_string());
            let received = request.into_body().collect().await.unwrap().to_bytes();
            assert_eq!(&received[..], payload.as_bytes());
            Response::builder()
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(received))
                .unwrap()
        })
        .await;
    let echoed = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&echoed[..], payload.as_bytes());

    let record = common::next_export(&mut exports).await.record;
    assert_eq!(record.request.body, Some(Bytes::from_static(b"{\"na")));
    assert_eq!(record.response.body, Some(Bytes::from_static(b"{\"na")));
}

#[tokio::test]
async fn test_streaming_upload_reaches_downstream_before_it_ends() {
    let (collector, mut exports) = common::start_collector(Duration::ZERO).await;
    let interceptor = interceptor_with_cap(collector, 4);

    // First chunk arrives, then the client keeps the upload open.
    let chunks = stream::iter(vec![Ok::<_, Infallible>(Frame::data(Bytes::from_static(b"{\"a\":1}")))])
        .chain(stream::pending());
    let request = Request::builder()
        .method("POST")
        .uri("/upload")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::new(StreamBody::new(chunks)))
        .unwrap();

    let invoked = Arc::new(AtomicBool::new(false));
    let flag = invoked.clone();
    let response = tokio::time::timeout(
        Duration::from_millis(500),
        interceptor.intercept(request, |mut request| async move {
            flag.store(true, Ordering::SeqCst);
            request.body_mut().frame().await.unwrap().unwrap();
            Response::new(Body::from("accepted"))
        }),
    )
    .await
    .expect("downstream should run while the upload is still open");
    assert!(invoked.load(Ordering::SeqCst));
    response.into_body().collect().await.unwrap();

    let record = common::next_export(&mut exports).await.record;
    assert_eq!(record.request.body, Some(Bytes::from_static(b"{\"a\"")));
}

#[tokio::test]
async fn test_abandoned_response_still_exports() {
    let (collector, mut exports) = common::start_collector(Duration::ZERO).await;
    let capture = common::capture_config(collector);
    let exporter = Exporter::start(&capture, &common::exporter_config(1, 10)).unwrap();
    let interceptor = Interceptor::new(CapturePolicy::from_config(&capture), exporter);

    let response = interceptor
        .intercept(Request::new(Body::empty()), |_| async { grpc_response() })
        .await;
    // Client went away before reading anything.
    drop(response);

    let record = common::next_export(&mut exports).await.record;
    assert_eq!(record.response.body, Some(Bytes::new()));
    assert_eq!(record.response.status_code, 0);
}

#[tokio::test]
async fn test_full_queue_sheds_load_without_blocking() {
    let (collector, _exports) = common::start_collector(Duration::from_millis(500)).await;
    let capture = common::capture_config(collector);
    let exporter = Exporter::start(&capture, &common::exporter_config(1, 1)).unwrap();
    let record = CaptureRecord::started_now();

    let started = Instant::now();
    let outcomes: Vec<_> = (0..10)
        .map(|_| {
            exporter
                .submit(&record, Duration::from_millis(1), &RequestId::new())
                .unwrap()
        })
        .collect();
    assert!(started.elapsed() < Duration::from_millis(250));

    assert_eq!(outcomes[0], EnqueueOutcome::Enqueued);
    let full = outcomes.iter().filter(|o| **o == EnqueueOutcome::Full).count();
    assert!(full >= 8, "expected most submissions dropped, got {outcomes:?}");

    let stats = exporter.stats();
    assert_eq!(stats.enqueued + stats.dropped, 10);
    assert_eq!(stats.dropped as usize, full);
}

#[tokio::test]
async fn test_transport_failure_is_retried_once() {
    let refused = common::unused_addr().await;
    let capture = common::capture_config(refused);
    let exporter = Exporter::start(&capture, &common::exporter_config(1, 10)).unwrap();

    let outcome = exporter
        .submit(&CaptureRecord::started_now(), Duration::ZERO, &RequestId::new())
        .unwrap();
    assert_eq!(outcome, EnqueueOutcome::Enqueued);

    assert!(common::eventually(|| exporter.stats().dropped == 1).await);
    let stats = exporter.stats();
    assert_eq!(stats.enqueued, 1);
    assert_eq!(stats.failed, 2);
    assert_eq!(stats.requeued, 1);
    assert_eq!(stats.delivered, 0);
}

#[tokio::test]
async fn test_collector_error_status_is_not_retried() {
    use axum::{http::StatusCode, routing::post, Router};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let router = Router::new().route(
        traffic_capture::export::CAPTURE_PATH,
        post(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });

    let capture = common::capture_config(addr);
    let exporter = Exporter::start(&capture, &common::exporter_config(1, 10)).unwrap();
    exporter
        .submit(&CaptureRecord::started_now(), Duration::ZERO, &RequestId::new())
        .unwrap();

    assert!(common::eventually(|| exporter.stats().delivered == 1).await);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(exporter.stats().requeued, 0);
}
