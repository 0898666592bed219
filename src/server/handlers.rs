use crate::config::Feed;
use crate::render::{RenderSettings, RenderedChunk, StreamRenderer, BOUNDARY};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use std::time::Instant;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, trace};
use uuid::Uuid;

use super::api::ServerState;

/// Liveness probe; never depends on feeds or the model
pub async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

pub async fn slot_stats_handler(State(state): State<ServerState>) -> impl IntoResponse {
    Json(state.store.snapshot())
}

pub async fn system_metrics_handler(State(state): State<ServerState>) -> impl IntoResponse {
    Json(state.store.metrics())
}

pub async fn video_feed_1_handler(State(state): State<ServerState>) -> Response {
    mjpeg_stream(state, Feed::Primary).await
}

pub async fn video_feed_2_handler(State(state): State<ServerState>) -> Response {
    mjpeg_stream(state, Feed::Secondary).await
}

/// Logs the end of a stream when the client goes away
struct StreamSession {
    client_id: Uuid,
    started: Instant,
    frames: u64,
    bytes: u64,
}

impl StreamSession {
    fn record(&mut self, chunk: &RenderedChunk) {
        self.frames += 1;
        self.bytes += chunk.data.len() as u64;
    }

    fn log_throughput(&self) {
        let elapsed = self.started.elapsed().as_secs_f64().max(f64::EPSILON);
        info!(
            "Client {} stream stats: {} frames, {:.1} FPS, {:.2} MB/s, {:.1} total MB",
            self.client_id,
            self.frames,
            self.frames as f64 / elapsed,
            (self.bytes as f64 / elapsed) / 1_048_576.0,
            self.bytes as f64 / 1_048_576.0
        );
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        info!(
            "MJPEG client {} disconnected after {} frames ({:.1}s)",
            self.client_id,
            self.frames,
            self.started.elapsed().as_secs_f64()
        );
    }
}

/// Serve one feed as `multipart/x-mixed-replace` until the client disconnects
async fn mjpeg_stream(state: ServerState, feed: Feed) -> Response {
    let client_id = Uuid::new_v4();
    let path = state.config.feed_path(feed);
    info!("MJPEG client {} connected to {}", client_id, path.display());

    let adapter = state.adapter.clone();
    let detector = state.detector.clone();
    let settings = RenderSettings::from(state.config.as_ref());
    let opened = tokio::task::spawn_blocking(move || {
        StreamRenderer::open(&path, &adapter, detector, settings)
    })
    .await;

    let renderer = match opened {
        Ok(Ok(renderer)) => renderer,
        Ok(Err(e)) => {
            error!("Failed to start stream for client {}: {}", client_id, e);
            return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
        }
        Err(e) => {
            error!("Stream setup task for client {} failed: {}", client_id, e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let placeholder_interval = state.placeholder_interval;
    let log_interval = state.config.stream.stats_log_interval.max(1);

    let stream = async_stream::stream! {
        let mut session = StreamSession {
            client_id,
            started: Instant::now(),
            frames: 0,
            bytes: 0,
        };
        let mut placeholder_tick = interval(placeholder_interval);
        placeholder_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut renderer = Some(renderer);

        loop {
            let Some(mut current) = renderer.take() else {
                break;
            };

            let chunk = if current.is_placeholder() {
                let chunk = current.poll_chunk();
                renderer = Some(current);
                chunk
            } else {
                // Decoding and inference block; run one frame at a time off the runtime
                match tokio::task::spawn_blocking(move || {
                    let chunk = current.poll_chunk();
                    (current, chunk)
                })
                .await
                {
                    Ok((current, chunk)) => {
                        renderer = Some(current);
                        chunk
                    }
                    Err(e) => {
                        error!("Renderer for client {} aborted: {}", client_id, e);
                        break;
                    }
                }
            };

            let Some(chunk) = chunk else {
                continue;
            };

            if chunk.is_placeholder() {
                placeholder_tick.tick().await;
            } else {
                trace!("Client {} <- {:?} ({} bytes)", client_id, chunk.kind, chunk.data.len());
            }

            session.record(&chunk);
            if session.frames % log_interval == 0 {
                session.log_throughput();
            }

            yield Ok::<Bytes, std::io::Error>(chunk.data);
        }

        debug!("Stream loop for client {} ended", client_id);
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/x-mixed-replace; boundary={}", BOUNDARY),
        )
        .header(header::CACHE_CONTROL, "no-cache, private")
        .header(header::PRAGMA, "no-cache")
        .body(axum::body::Body::from_stream(stream))
        .unwrap_or_else(|e| {
            error!("Failed to build stream response: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        })
}
