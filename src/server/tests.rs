use super::push::handle_client_message;
use super::*;
use crate::config::ParkwatchConfig;
use crate::detector::{Detection, MockDetector};
use crate::notify::{NotificationBus, SUBSCRIBED};
use crate::source::{SourceAdapter, SyntheticBackend};
use crate::stats::{OccupancySnapshot, RevenueModel, StatsStore, SystemMetrics};
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use futures::StreamExt;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use uuid::Uuid;

struct Harness {
    _dir: TempDir,
    state: ServerState,
}

/// Feed 1 is a playable 4-frame synthetic clip, feed 2 does not exist
fn harness(configure: impl FnOnce(&mut ParkwatchConfig)) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let feed_1 = dir.path().join("cctv_1.mp4");
    let mut file = std::fs::File::create(&feed_1).unwrap();
    file.write_all(&vec![0u8; 12_000]).unwrap();

    let mut config = ParkwatchConfig::default();
    config.video.feed_1 = feed_1.to_string_lossy().into_owned();
    config.video.feed_2 = dir.path().join("missing.mp4").to_string_lossy().into_owned();
    config.server.ip = "127.0.0.1".to_string();
    config.server.port = 0;
    configure(&mut config);

    let backend = SyntheticBackend::new().with_sized_clip(&feed_1, 4, 160, 120);
    let adapter = SourceAdapter::new(Arc::new(backend), config.video.min_file_size);

    Harness {
        state: ServerState::new(
            Arc::new(config),
            Arc::new(StatsStore::default()),
            Arc::new(NotificationBus::default()),
            adapter,
            Arc::new(MockDetector::fixed(vec![Detection::free(10, 10, 90, 90)])),
        ),
        _dir: dir,
    }
}

async fn get(state: &ServerState, uri: &str) -> axum::response::Response {
    router(state.clone())
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_is_ok() {
    let harness = harness(|_| {});
    let response = get(&harness.state, "/health").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, serde_json::json!({ "status": "ok" }));
}

#[tokio::test]
async fn test_stats_endpoints_serve_defaults_before_first_cycle() {
    let harness = harness(|_| {});

    let slots = json_body(get(&harness.state, "/slot_stats").await).await;
    assert_eq!(
        slots,
        serde_json::json!({
            "totalSlots": 396,
            "occupiedSlots": 271,
            "freeSlots": 125,
            "occupancyRate": 68.4
        })
    );

    let metrics = json_body(get(&harness.state, "/system_metrics").await).await;
    assert_eq!(
        metrics,
        serde_json::json!({
            "dailyRevenue": 22400,
            "activeVehicles": 143,
            "violations": 3
        })
    );
}

#[tokio::test]
async fn test_stats_endpoints_follow_store() {
    let harness = harness(|_| {});
    let snapshot = OccupancySnapshot::from_counts(2, 1).unwrap();
    harness
        .state
        .store
        .write(snapshot, SystemMetrics::derive(2, &RevenueModel::default(), 1));

    let slots = json_body(get(&harness.state, "/slot_stats").await).await;
    assert_eq!(slots["occupancyRate"], 66.7);
    assert_eq!(slots["totalSlots"], 3);

    let metrics = json_body(get(&harness.state, "/system_metrics").await).await;
    assert_eq!(metrics["dailyRevenue"], 240);
    assert_eq!(metrics["violations"], 1);
}

#[tokio::test]
async fn test_missing_feed_streams_placeholder() {
    let harness = harness(|_| {});
    let response = get(&harness.state, "/video_feed_2").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "multipart/x-mixed-replace; boundary=frame"
    );
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-cache, private");

    let mut body = response.into_body().into_data_stream();
    for _ in 0..2 {
        let chunk = tokio::time::timeout(Duration::from_secs(5), body.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(chunk.starts_with(b"--frame\r\nContent-Type: image/jpeg\r\n"));
        assert!(chunk.ends_with(b"\xFF\xD9\r\n"));
    }
}

#[tokio::test]
async fn test_playable_feed_streams_annotated_frames() {
    let harness = harness(|_| {});
    let response = get(&harness.state, "/video_feed_1").await;
    assert_eq!(response.status(), StatusCode::OK);

    let mut body = response.into_body().into_data_stream();
    // Four-frame clip loops, so six chunks wrap around once
    for _ in 0..6 {
        let chunk = tokio::time::timeout(Duration::from_secs(5), body.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(chunk.starts_with(b"--frame\r\n"));

        let header_end = chunk.windows(4).position(|w| w == b"\r\n\r\n").unwrap();
        let payload = &chunk[header_end + 4..chunk.len() - 2];
        let image = image::load_from_memory(payload).unwrap();
        assert_eq!((image.width(), image.height()), (640, 480));
    }
}

#[tokio::test]
async fn test_concurrent_feeds_progress_independently() {
    // Both endpoints point at the same clip but must hold separate handles
    let harness = harness(|config| config.video.feed_2 = config.video.feed_1.clone());

    let (first, second) = tokio::join!(
        get(&harness.state, "/video_feed_1"),
        get(&harness.state, "/video_feed_2")
    );
    let mut first = first.into_body().into_data_stream();
    let mut second = second.into_body().into_data_stream();

    let next_payload = |chunk: bytes::Bytes| {
        let header_end = chunk.windows(4).position(|w| w == b"\r\n\r\n").unwrap();
        image::load_from_memory(&chunk[header_end + 4..chunk.len() - 2]).unwrap()
    };

    // Drain one stream well past its loop point before touching the other
    for _ in 0..5 {
        let chunk = tokio::time::timeout(Duration::from_secs(5), first.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(next_payload(chunk).width(), 640);
    }
    for _ in 0..2 {
        let chunk = tokio::time::timeout(Duration::from_secs(5), second.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(next_payload(chunk).height(), 480);
    }
    let chunk = tokio::time::timeout(Duration::from_secs(5), first.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(chunk.starts_with(b"--frame\r\n"));
}

#[tokio::test]
async fn test_placeholders_are_paced() {
    let harness = harness(|config| config.stream.placeholder_fps = 20);
    let response = get(&harness.state, "/video_feed_2").await;
    let mut body = response.into_body().into_data_stream();

    let started = std::time::Instant::now();
    for _ in 0..4 {
        body.next().await.unwrap().unwrap();
    }

    // First chunk is immediate, the next three wait one 50ms tick each
    assert!(started.elapsed() >= Duration::from_millis(140));
}

#[tokio::test]
async fn test_cors_allows_dev_origins() {
    let harness = harness(|config| config.server.allowed_origin = "https://lot.example".to_string());

    for origin in ["https://lot.example", "http://localhost:3007"] {
        let response = router(harness.state.clone())
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/slot_stats")
                    .header(header::ORIGIN, origin)
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            origin
        );
    }

    let response = router(harness.state.clone())
        .oneshot(
            Request::builder()
                .uri("/slot_stats")
                .header(header::ORIGIN, "http://evil.example")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert!(response
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        .is_none());
}

#[tokio::test]
async fn test_wildcard_cors() {
    let harness = harness(|_| {});
    let response = router(harness.state.clone())
        .oneshot(
            Request::builder()
                .uri("/health")
                .header(header::ORIGIN, "http://anything.example")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
}

#[test]
fn test_subscribe_is_acknowledged() {
    let reply = handle_client_message(
        Uuid::new_v4(),
        r#"{"event":"subscribe","channel":"parking"}"#,
    )
    .unwrap();

    assert_eq!(reply.event, SUBSCRIBED);
    assert_eq!(reply.data, serde_json::json!({ "channel": "parking" }));
}

#[test]
fn test_other_client_messages_are_ignored() {
    let id = Uuid::new_v4();
    assert!(handle_client_message(id, r#"{"event":"ping"}"#).is_none());
    assert!(handle_client_message(id, "not json").is_none());
}

#[tokio::test]
async fn test_builder_validation() {
    let harness = harness(|_| {});

    let result = ApiServerBuilder::new()
        .store(Arc::clone(&harness.state.store))
        .bus(Arc::clone(&harness.state.bus))
        .build();
    assert!(result.is_err());

    let server = ApiServerBuilder::new()
        .config(Arc::clone(&harness.state.config))
        .store(Arc::clone(&harness.state.store))
        .bus(Arc::clone(&harness.state.bus))
        .adapter(harness.state.adapter.clone())
        .detector(Arc::clone(&harness.state.detector))
        .build()
        .unwrap();
    assert_eq!(server.address(), "127.0.0.1:0");
}

#[tokio::test]
async fn test_server_binds_and_stops_on_cancel() {
    let harness = harness(|_| {});
    let server = ApiServer::new(harness.state.clone());
    let token = CancellationToken::new();

    let running = server.start(token.clone()).await.unwrap();
    assert_ne!(running.local_addr.port(), 0);

    token.cancel();
    tokio::time::timeout(Duration::from_secs(5), running.handle)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_bind_failure_is_reported() {
    let blocker = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = blocker.local_addr().unwrap().port();
    let harness = harness(|config| config.server.port = port);

    let result = ApiServer::new(harness.state.clone())
        .start(CancellationToken::new())
        .await;

    assert!(matches!(
        result,
        Err(crate::error::ParkwatchError::Stream(
            crate::error::StreamError::BindFailed { .. }
        ))
    ));
}
