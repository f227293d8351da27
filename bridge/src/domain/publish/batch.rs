use super::MetricSink;
use crate::domain::types::DataPoint;

/// Outcome of one cycle's publishing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishSummary {
    pub published: usize,
    pub failed: usize,
    pub batches: usize,
    pub failed_batches: usize,
}

/// Groups points into batches of `batch_size` and sends each as soon as it fills.
///
/// Points reach the sink in push order. A failed batch is logged and counted;
/// later batches are still sent.
pub struct Batcher<'a> {
    sink: &'a dyn MetricSink,
    batch_size: usize,
    pending: Vec<DataPoint>,
    summary: PublishSummary,
}

impl<'a> Batcher<'a> {
    pub fn new(sink: &'a dyn MetricSink, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            sink,
            batch_size,
            pending: Vec::with_capacity(batch_size),
            summary: PublishSummary::default(),
        }
    }

    pub async fn push(&mut self, point: DataPoint) {
        self.pending.push(point);
        if self.pending.len() >= self.batch_size {
            self.flush().await;
        }
    }

    /// Send the partial batch, if any, and report totals
    pub async fn finish(mut self) -> PublishSummary {
        self.flush().await;
        self.summary
    }

    async fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }

        let count = self.pending.len();
        self.summary.batches += 1;
        match self.sink.put_batch(&self.pending).await {
            Ok(()) => {
                self.summary.published += count;
                tracing::trace!(points = count, "Batch published");
            }
            Err(e) => {
                self.summary.failed += count;
                self.summary.failed_batches += 1;
                tracing::warn!(points = count, error = %e, "Failed to publish batch");
            }
        }
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;
    use crate::domain::error::PublishError;
    use crate::domain::types::Resolution;

    #[derive(Default)]
    struct RecordingSink {
        batches: Mutex<Vec<Vec<DataPoint>>>,
        fail_on: Option<usize>,
    }

    #[async_trait]
    impl MetricSink for RecordingSink {
        async fn put_batch(&self, batch: &[DataPoint]) -> Result<(), PublishError> {
            let mut batches = self.batches.lock();
            let index = batches.len();
            batches.push(batch.to_vec());
            if self.fail_on == Some(index) {
                return Err(PublishError::Rejected {
                    namespace: "Test".to_string(),
                    message: "throttled".to_string(),
                });
            }
            Ok(())
        }
    }

    fn point(i: usize) -> DataPoint {
        DataPoint {
            metric_name: format!("m{}", i),
            value: i as f64,
            timestamp_ms: 0,
            dimensions: Vec::new(),
            resolution: Resolution::Standard,
            unit: "None".to_string(),
        }
    }

    #[tokio::test]
    async fn test_25_points_make_three_batches() {
        let sink = RecordingSink::default();
        let mut batcher = Batcher::new(&sink, 10);
        for i in 0..25 {
            batcher.push(point(i)).await;
        }
        let summary = batcher.finish().await;

        let sizes: Vec<usize> = sink.batches.lock().iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![10, 10, 5]);
        assert_eq!(
            summary,
            PublishSummary {
                published: 25,
                failed: 0,
                batches: 3,
                failed_batches: 0,
            }
        );
    }

    #[tokio::test]
    async fn test_order_preserved() {
        let sink = RecordingSink::default();
        let mut batcher = Batcher::new(&sink, 3);
        for i in 0..7 {
            batcher.push(point(i)).await;
        }
        batcher.finish().await;

        let names: Vec<String> = sink
            .batches
            .lock()
            .iter()
            .flatten()
            .map(|p| p.metric_name.clone())
            .collect();
        let expected: Vec<String> = (0..7).map(|i| format!("m{}", i)).collect();
        assert_eq!(names, expected);
    }

    #[tokio::test]
    async fn test_failed_batch_does_not_stop_later_batches() {
        let sink = RecordingSink {
            fail_on: Some(0),
            ..Default::default()
        };
        let mut batcher = Batcher::new(&sink, 10);
        for i in 0..15 {
            batcher.push(point(i)).await;
        }
        let summary = batcher.finish().await;

        assert_eq!(sink.batches.lock().len(), 2);
        assert_eq!(summary.published, 5);
        assert_eq!(summary.failed, 10);
        assert_eq!(summary.failed_batches, 1);
    }

    #[tokio::test]
    async fn test_nothing_pushed_sends_nothing() {
        let sink = RecordingSink::default();
        let summary = Batcher::new(&sink, 10).finish().await;
        assert!(sink.batches.lock().is_empty());
        assert_eq!(summary, PublishSummary::default());
    }

    #[tokio::test]
    async fn test_exact_multiple_has_no_trailing_batch() {
        let sink = RecordingSink::default();
        let mut batcher = Batcher::new(&sink, 10);
        for i in 0..20 {
            batcher.push(point(i)).await;
        }
        assert_eq!(batcher.finish().await.batches, 2);
    }
}
