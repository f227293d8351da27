//! Scrape/publish scheduler
//!
//! One cycle per tick: scrape, filter, transform, batch and publish. Cycles
//! never overlap and shutdown is observed between ticks.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::error::{FetchError, ScrapeError};
use super::filter::MetricFilter;
use super::publish::{Batcher, MetricSink, PublishSummary};
use super::scrape::{ScrapeClient, expand_family};
use super::transform::Transformer;
use crate::core::config::PipelineConfig;
use crate::core::constants::PUBLISH_BATCH_SIZE;
use crate::utils::time::now_millis;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Stopped,
}

/// Counters for one completed cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub families: usize,
    pub skipped_families: usize,
    pub samples: usize,
    pub filtered: usize,
    pub points: usize,
    pub publish: PublishSummary,
}

pub struct BridgePipeline {
    config: Arc<PipelineConfig>,
    scraper: ScrapeClient,
    sink: Arc<dyn MetricSink>,
    batch_size: usize,
    state_tx: watch::Sender<SchedulerState>,
}

impl BridgePipeline {
    pub fn new(config: Arc<PipelineConfig>, scraper: ScrapeClient, sink: Arc<dyn MetricSink>) -> Self {
        let (state_tx, _) = watch::channel(SchedulerState::Idle);
        Self {
            config,
            scraper,
            sink,
            batch_size: PUBLISH_BATCH_SIZE,
            state_tx,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Observe scheduler state changes
    pub fn state(&self) -> watch::Receiver<SchedulerState> {
        self.state_tx.subscribe()
    }

    /// Run one full cycle.
    ///
    /// Undecodable families are skipped. A fetch failure, including one in the
    /// middle of the body, abandons the cycle before anything is published.
    pub async fn run_cycle(&self) -> Result<CycleReport, FetchError> {
        let scraped_at = now_millis();
        let selection = &self.config.selection;
        let filter = MetricFilter::new(selection);
        let transformer = Transformer::new(selection);

        let mut report = CycleReport::default();
        let mut points = Vec::new();
        let mut families = self.scraper.scrape().await?;

        while let Some(item) = families.next().await {
            let family = match item {
                Ok(family) => family,
                Err(ScrapeError::Decode(e)) => {
                    report.skipped_families += 1;
                    tracing::warn!(error = %e, "Skipping undecodable metric family");
                    continue;
                }
                Err(ScrapeError::Fetch(e)) => return Err(e),
            };

            report.families += 1;
            for sample in expand_family(&family, scraped_at) {
                report.samples += 1;
                if !filter.should_publish(&sample.name) {
                    report.filtered += 1;
                    continue;
                }
                points.extend(transformer.transform(&sample));
            }
        }

        report.points = points.len();
        let mut batcher = Batcher::new(self.sink.as_ref(), self.batch_size);
        for point in points {
            batcher.push(point).await;
        }
        report.publish = batcher.finish().await;

        Ok(report)
    }

    async fn tick(&self) {
        self.state_tx.send_replace(SchedulerState::Running);
        match self.run_cycle().await {
            Ok(report) => tracing::info!(
                families = report.families,
                skipped_families = report.skipped_families,
                samples = report.samples,
                points = report.points,
                published = report.publish.published,
                failed = report.publish.failed,
                "Scrape cycle complete"
            ),
            Err(e) => tracing::error!(url = %self.scraper.url(), error = %e, "Scrape cycle failed"),
        }
        self.state_tx.send_replace(SchedulerState::Idle);
    }

    /// Spawn the periodic task. The first cycle runs one interval after start.
    pub fn start(self, mut shutdown_rx: watch::Receiver<bool>) -> JoinHandle<()> {
        let interval = self.config.scrape.interval;

        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
            timer.tick().await; // Skip immediate first tick

            tracing::debug!(interval = ?interval, url = %self.scraper.url(), "BridgePipeline started");

            loop {
                if *shutdown_rx.borrow_and_update() {
                    break;
                }
                tokio::select! {
                    biased;
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = timer.tick() => self.tick().await,
                }
            }

            self.state_tx.send_replace(SchedulerState::Stopped);
            tracing::debug!("BridgePipeline shutdown complete");
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use httpmock::prelude::*;
    use parking_lot::Mutex;

    use super::*;
    use crate::core::config::{CloudWatchConfig, ScrapeConfig, SelectionConfig};
    use crate::domain::error::PublishError;
    use crate::domain::types::{DataPoint, Dimension, Resolution};
    use crate::utils::glob::compile_list;

    #[derive(Default)]
    struct RecordingSink {
        batches: Mutex<Vec<Vec<DataPoint>>>,
    }

    impl RecordingSink {
        fn points(&self) -> Vec<DataPoint> {
            self.batches.lock().iter().flatten().cloned().collect()
        }
    }

    #[async_trait]
    impl MetricSink for RecordingSink {
        async fn put_batch(&self, batch: &[DataPoint]) -> Result<(), PublishError> {
            self.batches.lock().push(batch.to_vec());
            Ok(())
        }
    }

    /// Holds each batch for `delay` and records the highest concurrency seen
    struct SlowSink {
        delay: Duration,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        batches: AtomicUsize,
    }

    impl SlowSink {
        fn new(delay: Duration) -> Self {
            Self {
                delay,
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                batches: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl MetricSink for SlowSink {
        async fn put_batch(&self, _batch: &[DataPoint]) -> Result<(), PublishError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.batches.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn pipeline_config(url: String, interval: Duration, selection: SelectionConfig) -> PipelineConfig {
        PipelineConfig {
            cloudwatch: CloudWatchConfig {
                namespace: "Test/App".to_string(),
                region: "us-east-1".to_string(),
                publish_timeout: Duration::from_secs(5),
                endpoint: None,
                credentials: None,
            },
            scrape: ScrapeConfig {
                url,
                interval,
                timeout: Duration::from_secs(5),
                client_tls: None,
                accept_invalid_certs: false,
            },
            selection,
        }
    }

    fn pipeline(config: PipelineConfig, sink: Arc<dyn MetricSink>) -> BridgePipeline {
        let scraper = ScrapeClient::new(&config.scrape).unwrap();
        BridgePipeline::new(Arc::new(config), scraper, sink)
    }

    async fn serve(server: &MockServer, body: &str) {
        let body = body.to_string();
        server
            .mock_async(move |when, then| {
                when.method(GET).path("/metrics");
                then.status(200)
                    .header("content-type", "text/plain; version=0.0.4")
                    .body(body);
            })
            .await;
    }

    const EXPOSITION: &str = "# TYPE http_requests_total counter\n\
        http_requests_total{host=\"h1\",method=\"GET\"} 10 1700000000000\n\
        http_requests_total{host=\"h2\",method=\"POST\"} 3 1700000000000\n\
        # TYPE go_goroutines gauge\n\
        go_goroutines 42\n\
        # TYPE temperature gauge\n\
        temperature{__cw_high_res=\"\",__cw_unit=\"Count\"} +Inf\n";

    #[tokio::test]
    async fn test_run_cycle_end_to_end() {
        let server = MockServer::start_async().await;
        serve(&server, EXPOSITION).await;

        let selection = SelectionConfig {
            exclude_metrics: compile_list("go_*").unwrap(),
            extra_dimensions: vec![Dimension::new("cluster", "prod")],
            ..Default::default()
        };
        let sink = Arc::new(RecordingSink::default());
        let bridge = pipeline(
            pipeline_config(server.url("/metrics"), Duration::from_secs(30), selection),
            sink.clone(),
        );

        let report = bridge.run_cycle().await.unwrap();

        assert_eq!(report.families, 3);
        assert_eq!(report.samples, 4);
        assert_eq!(report.filtered, 1);
        assert_eq!(report.points, 2);
        assert_eq!(report.publish.published, 2);

        let points = sink.points();
        assert_eq!(points[0].metric_name, "http_requests_total");
        assert_eq!(points[0].timestamp_ms, 1_700_000_000_000);
        assert_eq!(points[0].resolution, Resolution::Standard);
        let dims: Vec<(&str, &str)> = points[0]
            .dimensions
            .iter()
            .map(|d| (d.name.as_str(), d.value.as_str()))
            .collect();
        assert_eq!(dims, vec![("host", "h1"), ("method", "GET"), ("cluster", "prod")]);
    }

    #[tokio::test]
    async fn test_run_cycle_substitution_doubles_points() {
        let server = MockServer::start_async().await;
        serve(&server, "up{host=\"h1\"} 1\n").await;

        let selection = SelectionConfig {
            dimension_substitutions: BTreeMap::from([("host".to_string(), "ALL".to_string())]),
            ..Default::default()
        };
        let sink = Arc::new(RecordingSink::default());
        let bridge = pipeline(
            pipeline_config(server.url("/metrics"), Duration::from_secs(30), selection),
            sink.clone(),
        );

        let report = bridge.run_cycle().await.unwrap();
        assert_eq!(report.points, 2);
        let hosts: Vec<String> = sink
            .points()
            .iter()
            .map(|p| p.dimensions[0].value.clone())
            .collect();
        assert_eq!(hosts, vec!["h1", "ALL"]);
    }

    #[tokio::test]
    async fn test_run_cycle_batches_points() {
        let body: String = (0..25).map(|i| format!("m{} {}\n", i, i)).collect();
        let server = MockServer::start_async().await;
        serve(&server, &body).await;

        let sink = Arc::new(RecordingSink::default());
        let bridge = pipeline(
            pipeline_config(server.url("/metrics"), Duration::from_secs(30), SelectionConfig::default()),
            sink.clone(),
        );

        let report = bridge.run_cycle().await.unwrap();
        assert_eq!(report.publish.batches, 3);
        let sizes: Vec<usize> = sink.batches.lock().iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![10, 10, 5]);
    }

    #[tokio::test]
    async fn test_run_cycle_skips_broken_family() {
        let server = MockServer::start_async().await;
        serve(&server, "# TYPE bad gauge\nbad{x=\"1} 1\ngood 1\n").await;

        let sink = Arc::new(RecordingSink::default());
        let bridge = pipeline(
            pipeline_config(server.url("/metrics"), Duration::from_secs(30), SelectionConfig::default()),
            sink.clone(),
        );

        let report = bridge.run_cycle().await.unwrap();
        assert_eq!(report.skipped_families, 1);
        assert_eq!(report.families, 1);
        assert_eq!(sink.points()[0].metric_name, "good");
    }

    #[tokio::test]
    async fn test_run_cycle_fetch_failure_publishes_nothing() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/metrics");
                then.status(500);
            })
            .await;

        let sink = Arc::new(RecordingSink::default());
        let bridge = pipeline(
            pipeline_config(server.url("/metrics"), Duration::from_secs(30), SelectionConfig::default()),
            sink.clone(),
        );

        assert!(matches!(
            bridge.run_cycle().await,
            Err(FetchError::Status { .. })
        ));
        assert!(sink.batches.lock().is_empty());
    }

    #[tokio::test]
    async fn test_start_runs_cycles_until_shutdown() {
        let server = MockServer::start_async().await;
        serve(&server, "up 1\n").await;

        let sink = Arc::new(RecordingSink::default());
        let bridge = pipeline(
            pipeline_config(
                server.url("/metrics"),
                Duration::from_millis(50),
                SelectionConfig::default(),
            ),
            sink.clone(),
        );
        let mut state = bridge.state();
        assert_eq!(*state.borrow(), SchedulerState::Idle);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = bridge.start(shutdown_rx);

        tokio::time::timeout(Duration::from_secs(5), async {
            while sink.batches.lock().is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("a cycle should publish");

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("pipeline should stop")
            .unwrap();

        assert_eq!(*state.borrow_and_update(), SchedulerState::Stopped);
    }

    #[tokio::test]
    async fn test_start_stops_when_shutdown_sender_dropped() {
        let sink = Arc::new(RecordingSink::default());
        let bridge = pipeline(
            pipeline_config(
                "http://127.0.0.1:1/metrics".to_string(),
                Duration::from_secs(3600),
                SelectionConfig::default(),
            ),
            sink,
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = bridge.start(shutdown_rx);
        drop(shutdown_tx);

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("pipeline should stop")
            .unwrap();
    }

    #[tokio::test]
    async fn test_slow_cycles_never_overlap() {
        let server = MockServer::start_async().await;
        let scrapes = server
            .mock_async(|when, then| {
                when.method(GET).path("/metrics");
                then.status(200)
                    .header("content-type", "text/plain; version=0.0.4")
                    .body("up 1\n")
                    .delay(Duration::from_millis(300));
            })
            .await;

        let sink = Arc::new(SlowSink::new(Duration::from_millis(100)));
        let bridge = pipeline(
            pipeline_config(
                server.url("/metrics"),
                Duration::from_millis(50),
                SelectionConfig::default(),
            ),
            sink.clone(),
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = bridge.start(shutdown_rx);
        tokio::time::sleep(Duration::from_secs(1)).await;
        let started = scrapes.calls_async().await;

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("pipeline should stop")
            .unwrap();

        // Each cycle takes ~400ms, so a 50ms interval must skip ticks
        assert!((1..=3).contains(&started), "scrapes started: {}", started);
        assert_eq!(sink.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(sink.batches.load(Ordering::SeqCst), scrapes.calls_async().await);
    }

    #[tokio::test]
    async fn test_shutdown_during_cycle_lets_it_publish() {
        let server = MockServer::start_async().await;
        let scrapes = server
            .mock_async(|when, then| {
                when.method(GET).path("/metrics");
                then.status(200)
                    .header("content-type", "text/plain; version=0.0.4")
                    .body("up 1\n")
                    .delay(Duration::from_millis(300));
            })
            .await;

        let sink = Arc::new(RecordingSink::default());
        let bridge = pipeline(
            pipeline_config(
                server.url("/metrics"),
                Duration::from_millis(50),
                SelectionConfig::default(),
            ),
            sink.clone(),
        );
        let mut state = bridge.state();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = bridge.start(shutdown_rx);

        tokio::time::timeout(
            Duration::from_secs(5),
            state.wait_for(|s| *s == SchedulerState::Running),
        )
        .await
        .expect("a cycle should start")
        .unwrap();
        shutdown_tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("pipeline should stop")
            .unwrap();

        assert_eq!(scrapes.calls_async().await, 1);
        assert_eq!(sink.batches.lock().len(), 1);
        assert_eq!(sink.points()[0].metric_name, "up");
        assert_eq!(*state.borrow_and_update(), SchedulerState::Stopped);
    }
}
