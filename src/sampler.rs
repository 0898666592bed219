use crate::config::ParkwatchConfig;
use crate::detector::{count_slots, Detector};
use crate::error::Result;
use crate::notify::NotificationSink;
use crate::source::SourceAdapter;
use crate::stats::{OccupancySnapshot, RevenueModel, StatsStore, SystemMetrics};
use rand::Rng;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// What a single sampler cycle did
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// The primary feed is missing, a stub, or unplayable
    SourceInvalid,
    /// The feed ended before a frame could be read
    NoFrame,
    /// The model saw no slots; the store was left as is
    NoDetections,
    /// The store was replaced with this snapshot
    Updated(OccupancySnapshot),
}

/// Periodically samples one random frame of the primary feed and publishes occupancy
pub struct StatsSampler {
    source_path: PathBuf,
    adapter: SourceAdapter,
    detector: Arc<dyn Detector>,
    store: Arc<StatsStore>,
    sink: Arc<dyn NotificationSink>,
    frame_size: (u32, u32),
    revenue: RevenueModel,
    max_violations: u32,
    interval: Duration,
}

impl StatsSampler {
    pub fn new(
        config: &ParkwatchConfig,
        adapter: SourceAdapter,
        detector: Arc<dyn Detector>,
        store: Arc<StatsStore>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            source_path: PathBuf::from(&config.video.feed_1),
            adapter,
            detector,
            store,
            sink,
            frame_size: config.frame_size(),
            revenue: RevenueModel {
                per_vehicle: config.sampler.revenue_per_vehicle,
                factor: config.sampler.revenue_factor,
            },
            max_violations: config.sampler.max_violations,
            interval: Duration::from_secs(config.sampler.interval_seconds),
        }
    }

    /// Override the pause between cycles
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run one cycle synchronously. Blocks on decoding and inference.
    pub fn run_cycle<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<CycleOutcome> {
        // The decoder is released before inference
        let frame = match self.adapter.sample_random(&self.source_path, rng) {
            Ok(frame) => frame,
            Err(e) if e.is_invalid_source() => {
                debug!("Skipping sampler cycle: {}", e);
                return Ok(CycleOutcome::SourceInvalid);
            }
            Err(e) => return Err(e.into()),
        };

        let Some(frame) = frame else {
            return Ok(CycleOutcome::NoFrame);
        };

        let frame = frame.resized(self.frame_size.0, self.frame_size.1);
        let detections = self.detector.detect(&frame.image)?;
        let (occupied, free) = count_slots(&detections);

        let Some(snapshot) = OccupancySnapshot::from_counts(occupied, free) else {
            return Ok(CycleOutcome::NoDetections);
        };

        let violations = rng.gen_range(0..=self.max_violations);
        let metrics = SystemMetrics::derive(occupied, &self.revenue, violations);
        self.store.write(snapshot, metrics);

        self.sink.publish(&snapshot);

        Ok(CycleOutcome::Updated(snapshot))
    }

    /// Run cycles on a background task until `token` is cancelled
    pub fn spawn(self, token: CancellationToken) -> JoinHandle<()> {
        let sampler = Arc::new(self);

        tokio::spawn(async move {
            info!(
                "Stats sampler started for {} (every {:?})",
                sampler.source_path.display(),
                sampler.interval
            );

            loop {
                let cycle_sampler = Arc::clone(&sampler);
                let cycle = tokio::task::spawn_blocking(move || {
                    cycle_sampler.run_cycle(&mut rand::thread_rng())
                });

                match cycle.await {
                    Ok(Ok(CycleOutcome::Updated(snapshot))) => {
                        info!(
                            "Occupancy updated: {}/{} slots occupied ({:.1}%)",
                            snapshot.occupied_slots, snapshot.total_slots, snapshot.occupancy_rate
                        );
                    }
                    Ok(Ok(outcome)) => {
                        debug!("Sampler cycle left stats unchanged: {:?}", outcome);
                    }
                    Ok(Err(e)) => {
                        error!("Stats sampler cycle failed: {}", e);
                    }
                    Err(e) => {
                        warn!("Stats sampler cycle aborted: {}", e);
                    }
                }

                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(sampler.interval) => {}
                }
            }

            info!("Stats sampler stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::{Detection, MockDetector};
    use crate::notify::RecordingSink;
    use crate::source::SyntheticBackend;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::io::Write;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        config: ParkwatchConfig,
        backend: SyntheticBackend,
    }

    /// A 20 KB stand-in file at feed_1, backed by a 12-frame synthetic clip
    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lot.mp4");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(&vec![0u8; 20_000]).unwrap();

        let mut config = ParkwatchConfig::default();
        config.video.feed_1 = path.to_string_lossy().into_owned();

        Fixture {
            backend: SyntheticBackend::new().with_sized_clip(&path, 12, 1280, 720),
            config,
            _dir: dir,
        }
    }

    fn sampler(
        fixture: &Fixture,
        detector: Arc<dyn Detector>,
        store: Arc<StatsStore>,
        sink: Arc<RecordingSink>,
    ) -> StatsSampler {
        let adapter = SourceAdapter::new(
            Arc::new(fixture.backend.clone()),
            fixture.config.video.min_file_size,
        );
        StatsSampler::new(&fixture.config, adapter, detector, store, sink)
    }

    #[test]
    fn test_cycle_updates_store_from_detections() {
        let fixture = fixture();
        let store = Arc::new(StatsStore::default());
        let sink = Arc::new(RecordingSink::new());
        let detector = Arc::new(MockDetector::fixed(vec![
            Detection::occupied(0, 0, 50, 50),
            Detection::occupied(60, 0, 110, 50),
            Detection::free(120, 0, 170, 50),
        ]));
        let sampler = sampler(&fixture, detector, Arc::clone(&store), Arc::clone(&sink));

        let outcome = sampler.run_cycle(&mut StdRng::seed_from_u64(7)).unwrap();

        let (snapshot, metrics) = store.read();
        assert_eq!(outcome, CycleOutcome::Updated(snapshot));
        assert_eq!(snapshot.occupied_slots, 2);
        assert_eq!(snapshot.free_slots, 1);
        assert_eq!(snapshot.total_slots, 3);
        assert_eq!(snapshot.occupancy_rate, 66.7);
        assert_eq!(metrics.active_vehicles, 2);
        assert_eq!(metrics.daily_revenue, 240);
        assert!(metrics.violations <= 5);
        assert_eq!(sink.published(), vec![snapshot]);
    }

    #[test]
    fn test_cycle_without_detections_leaves_store_unchanged() {
        let fixture = fixture();
        let store = Arc::new(StatsStore::default());
        let before = store.read();
        let sink = Arc::new(RecordingSink::new());
        let sampler = sampler(
            &fixture,
            Arc::new(MockDetector::empty()),
            Arc::clone(&store),
            Arc::clone(&sink),
        );

        let outcome = sampler.run_cycle(&mut StdRng::seed_from_u64(1)).unwrap();

        assert_eq!(outcome, CycleOutcome::NoDetections);
        assert_eq!(store.read(), before);
        assert!(sink.published().is_empty());
    }

    #[test]
    fn test_cycle_skips_invalid_source() {
        let mut fixture = fixture();
        fixture.config.video.feed_1 = "/nonexistent/lot.mp4".to_string();
        let store = Arc::new(StatsStore::default());
        let before = store.read();
        let detector = Arc::new(MockDetector::fixed(vec![Detection::free(0, 0, 5, 5)]));
        let sampler = sampler(
            &fixture,
            Arc::clone(&detector) as Arc<dyn Detector>,
            Arc::clone(&store),
            Arc::new(RecordingSink::new()),
        );

        let outcome = sampler.run_cycle(&mut StdRng::seed_from_u64(1)).unwrap();

        assert_eq!(outcome, CycleOutcome::SourceInvalid);
        assert_eq!(store.read(), before);
        assert_eq!(detector.calls(), 0);
    }

    #[test]
    fn test_cycle_surfaces_detector_failure_without_mutation() {
        let fixture = fixture();
        let store = Arc::new(StatsStore::default());
        let before = store.read();
        let sampler = sampler(
            &fixture,
            Arc::new(MockDetector::failing("model crashed")),
            Arc::clone(&store),
            Arc::new(RecordingSink::new()),
        );

        assert!(sampler.run_cycle(&mut StdRng::seed_from_u64(1)).is_err());
        assert_eq!(store.read(), before);
    }

    #[test]
    fn test_cycle_releases_decoder_handle() {
        let fixture = fixture();
        let sampler = sampler(
            &fixture,
            Arc::new(MockDetector::empty()),
            Arc::new(StatsStore::default()),
            Arc::new(RecordingSink::new()),
        );

        for seed in 0..3 {
            sampler.run_cycle(&mut StdRng::seed_from_u64(seed)).unwrap();
        }

        assert_eq!(fixture.backend.opened(), 3);
        assert_eq!(fixture.backend.open_handles(), 0);
    }

    #[tokio::test]
    async fn test_spawned_sampler_survives_failures_and_stops_on_cancel() {
        let fixture = fixture();
        let store = Arc::new(StatsStore::default());
        let sink = Arc::new(RecordingSink::new());
        let detector = Arc::new(
            MockDetector::fixed(vec![Detection::occupied(0, 0, 10, 10)])
                .then(Err("transient".to_string())),
        );
        let sampler = sampler(
            &fixture,
            Arc::clone(&detector) as Arc<dyn Detector>,
            Arc::clone(&store),
            Arc::clone(&sink),
        )
        .with_interval(Duration::from_millis(10));

        let token = CancellationToken::new();
        let handle = sampler.spawn(token.clone());

        tokio::time::timeout(Duration::from_secs(5), async {
            while sink.published().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("sampler never recovered from the failed cycle");

        token.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("sampler did not stop")
            .unwrap();

        assert!(detector.calls() >= 2);
        assert_eq!(store.snapshot().occupancy_rate, 100.0);
    }
}
