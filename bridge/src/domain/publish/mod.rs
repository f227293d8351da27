//! Batched delivery of data points
//!
//! `MetricSink` is the seam between the pipeline and the metrics provider.
//! `CloudWatchSink` is the production implementation.

mod batch;
mod cloudwatch;

pub use batch::{Batcher, PublishSummary};
pub use cloudwatch::CloudWatchSink;

use async_trait::async_trait;

use crate::domain::error::PublishError;
use crate::domain::types::DataPoint;

#[async_trait]
pub trait MetricSink: Send + Sync {
    /// Deliver one batch. A failure loses only this batch.
    async fn put_batch(&self, batch: &[DataPoint]) -> Result<(), PublishError>;
}
