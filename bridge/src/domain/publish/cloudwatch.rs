//! CloudWatch `PutMetricData` sink

use async_trait::async_trait;
use aws_sdk_cloudwatch::Client;
use aws_sdk_cloudwatch::error::DisplayErrorContext;
use aws_sdk_cloudwatch::primitives::DateTime;
use aws_sdk_cloudwatch::types::{Dimension as CwDimension, MetricDatum, StandardUnit};

use super::MetricSink;
use crate::core::config::CloudWatchConfig;
use crate::core::constants::REQUEST_MIN_COMPRESSION_SIZE_BYTES;
use crate::domain::error::PublishError;
use crate::domain::types::DataPoint;

const STATIC_CREDENTIALS_PROVIDER: &str = "promwatch-static";

#[derive(Debug, Clone)]
pub struct CloudWatchSink {
    client: Client,
    namespace: String,
}

impl CloudWatchSink {
    /// Build the client once; requests are gzip-compressed and bounded by the publish timeout
    pub async fn new(config: &CloudWatchConfig) -> Self {
        let timeouts = aws_config::timeout::TimeoutConfig::builder()
            .operation_timeout(config.publish_timeout)
            .build();

        let mut config_loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_sdk_cloudwatch::config::Region::new(config.region.clone()))
            .timeout_config(timeouts);

        if let Some(creds) = &config.credentials {
            config_loader =
                config_loader.credentials_provider(aws_credential_types::Credentials::new(
                    creds.access_key_id.clone(),
                    creds.secret_access_key.clone(),
                    creds.session_token.clone(),
                    None,
                    STATIC_CREDENTIALS_PROVIDER,
                ));
        }

        let sdk_config = config_loader.load().await;
        let mut cw_config = aws_sdk_cloudwatch::config::Builder::from(&sdk_config)
            .disable_request_compression(false)
            .request_min_compression_size_bytes(REQUEST_MIN_COMPRESSION_SIZE_BYTES);
        if let Some(endpoint_url) = &config.endpoint {
            cw_config = cw_config.endpoint_url(endpoint_url);
        }

        tracing::debug!(
            namespace = %config.namespace,
            region = %config.region,
            endpoint = ?config.endpoint,
            static_credentials = config.credentials.is_some(),
            "CloudWatch client initialized"
        );

        Self {
            client: Client::from_conf(cw_config.build()),
            namespace: config.namespace.clone(),
        }
    }
}

#[async_trait]
impl MetricSink for CloudWatchSink {
    async fn put_batch(&self, batch: &[DataPoint]) -> Result<(), PublishError> {
        let data = batch.iter().map(to_datum).collect();

        self.client
            .put_metric_data()
            .namespace(&self.namespace)
            .set_metric_data(Some(data))
            .send()
            .await
            .map_err(|e| PublishError::Rejected {
                namespace: self.namespace.clone(),
                message: DisplayErrorContext(&e).to_string(),
            })?;

        Ok(())
    }
}

fn to_datum(point: &DataPoint) -> MetricDatum {
    let dimensions = point
        .dimensions
        .iter()
        .map(|d| CwDimension::builder().name(&d.name).value(&d.value).build())
        .collect();

    MetricDatum::builder()
        .metric_name(&point.metric_name)
        .value(point.value)
        .timestamp(DateTime::from_millis(point.timestamp_ms))
        .set_dimensions(Some(dimensions))
        .storage_resolution(point.resolution.seconds())
        .unit(StandardUnit::from(point.unit.as_str()))
        .build()
}
