//! Scrape-to-CloudWatch pipeline
//!
//! - `scrape` - exposition fetch and decoding
//! - `filter` - metric and label eligibility
//! - `transform` - sample to data point conversion
//! - `publish` - batching and the CloudWatch sink
//! - `pipeline` - periodic scheduler

pub mod error;
pub mod filter;
pub mod pipeline;
pub mod publish;
pub mod scrape;
pub mod transform;
pub mod types;

pub use error::{DecodeError, FetchError, PublishError, ScrapeError};
pub use pipeline::{BridgePipeline, CycleReport, SchedulerState};
pub use types::{DataPoint, Dimension, Resolution, Sample};
