use super::*;
use crate::detector::{Detection, MockDetector};
use crate::source::SyntheticBackend;
use std::io::Write;
use tempfile::TempDir;

struct Feed {
    _dir: TempDir,
    path: PathBuf,
    backend: SyntheticBackend,
}

fn feed(frame_count: u64) -> Feed {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lot.mp4");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(&vec![0u8; 16_000]).unwrap();

    Feed {
        backend: SyntheticBackend::new().with_sized_clip(&path, frame_count, 320, 240),
        path,
        _dir: dir,
    }
}

fn settings() -> RenderSettings {
    RenderSettings::from(&ParkwatchConfig::default())
}

fn renderer(feed: &Feed, detector: MockDetector) -> StreamRenderer {
    let adapter = SourceAdapter::new(Arc::new(feed.backend.clone()), 10_000);
    StreamRenderer::open(&feed.path, &adapter, Arc::new(detector), settings()).unwrap()
}

/// Split a multipart part into its header block and JPEG payload
fn split_part(data: &[u8]) -> (String, &[u8]) {
    assert!(data.starts_with(b"--frame\r\n"), "missing boundary");
    let header_end = data
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("missing header terminator");
    let header = String::from_utf8(data[..header_end].to_vec()).unwrap();
    assert!(data.ends_with(b"\r\n"));

    let payload = &data[header_end + 4..data.len() - 2];
    (header, payload)
}

fn frame_indices(chunks: &[RenderedChunk]) -> Vec<u64> {
    chunks
        .iter()
        .filter_map(|chunk| match chunk.kind {
            ChunkKind::Frame { index, .. } => Some(index),
            ChunkKind::Placeholder => None,
        })
        .collect()
}

#[test]
fn test_missing_feed_streams_wellformed_placeholders() {
    let adapter = SourceAdapter::new(Arc::new(SyntheticBackend::new()), 10_000);
    let mut renderer = StreamRenderer::open(
        Path::new("/nonexistent/feed.mp4"),
        &adapter,
        Arc::new(MockDetector::empty()),
        settings(),
    )
    .unwrap();

    assert!(renderer.is_placeholder());

    for chunk in renderer.by_ref().take(3) {
        assert!(chunk.is_placeholder());

        let (header, payload) = split_part(&chunk.data);
        assert!(header.contains("Content-Type: image/jpeg"));
        assert!(header.contains(&format!("Content-Length: {}", payload.len())));
        assert_eq!(&payload[..2], &[0xFF, 0xD8]);
        assert_eq!(&payload[payload.len() - 2..], &[0xFF, 0xD9]);

        let image = image::load_from_memory(payload).unwrap();
        assert_eq!((image.width(), image.height()), (640, 480));
    }

    assert_eq!(renderer.frames_rendered(), 0);
}

#[test]
fn test_playable_feed_loops_forever() {
    let feed = feed(3);
    let renderer = renderer(&feed, MockDetector::empty());

    let chunks: Vec<_> = renderer.take(7).collect();

    assert_eq!(frame_indices(&chunks), vec![0, 1, 2, 0, 1, 2, 0]);
}

#[test]
fn test_frames_resized_and_annotated() {
    let feed = feed(4);
    let renderer = renderer(
        &feed,
        MockDetector::fixed(vec![Detection::occupied(100, 100, 300, 300)]),
    );

    let chunk = renderer.into_iter().next().unwrap();
    assert_eq!(
        chunk.kind,
        ChunkKind::Frame {
            index: 0,
            detections: 1
        }
    );

    let (_, payload) = split_part(&chunk.data);
    let image = image::load_from_memory(payload).unwrap().to_rgb8();
    assert_eq!(image.dimensions(), (640, 480));

    // Corner bracket survives JPEG as a strongly red patch
    let corner = image.get_pixel(110, 100);
    assert!(corner[0] > 120 && corner[0] > corner[1] + 60, "{:?}", corner);

    // Box interior keeps the dark synthetic background
    let inside = image.get_pixel(200, 200);
    assert!(inside[0] < 60, "{:?}", inside);
}

#[test]
fn test_detector_failure_drops_only_that_frame() {
    let feed = feed(5);
    let mut renderer = renderer(
        &feed,
        MockDetector::empty().then(Err("inference blew up".to_string())),
    );

    let chunks: Vec<_> = renderer.by_ref().take(2).collect();

    assert_eq!(frame_indices(&chunks), vec![1, 2]);
    assert_eq!(renderer.frames_dropped(), 1);
    assert_eq!(renderer.frames_rendered(), 2);
}

#[test]
fn test_poll_chunk_reports_loop_point() {
    let feed = feed(1);
    let mut renderer = renderer(&feed, MockDetector::empty());

    assert!(renderer.poll_chunk().is_some());
    assert!(renderer.poll_chunk().is_none());
    assert!(!renderer.is_placeholder());
    assert!(renderer.poll_chunk().is_some());
}

#[test]
fn test_concurrent_streams_are_independent() {
    let feed = feed(6);
    let mut first = renderer(&feed, MockDetector::empty());
    let mut second = renderer(&feed, MockDetector::empty());
    assert_eq!(feed.backend.open_handles(), 2);

    let a: Vec<_> = first.by_ref().take(4).collect();
    let b: Vec<_> = second.by_ref().take(2).collect();
    let a_more: Vec<_> = first.by_ref().take(1).collect();

    assert_eq!(frame_indices(&a), vec![0, 1, 2, 3]);
    assert_eq!(frame_indices(&b), vec![0, 1]);
    assert_eq!(frame_indices(&a_more), vec![4]);

    drop(first);
    assert_eq!(feed.backend.open_handles(), 1);
    drop(second);
    assert_eq!(feed.backend.open_handles(), 0);
}
