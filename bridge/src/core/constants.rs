// =============================================================================
// Application Identity
// =============================================================================

/// Application name in lowercase (for log targets and identifiers)
pub const APP_NAME_LOWER: &str = "promwatch";

/// Environment variable for config file path
pub const ENV_CONFIG: &str = "PROMWATCH_CONFIG";

/// Environment variable for log level/filter
pub const ENV_LOG: &str = "PROMWATCH_LOG";

// =============================================================================
// Environment Variables - CloudWatch
// =============================================================================

pub const ENV_CLOUDWATCH_NAMESPACE: &str = "CLOUDWATCH_NAMESPACE";
pub const ENV_CLOUDWATCH_REGION: &str = "CLOUDWATCH_REGION";

/// Publish timeout in seconds
pub const ENV_CLOUDWATCH_PUBLISH_TIMEOUT: &str = "CLOUDWATCH_PUBLISH_TIMEOUT";

/// Custom endpoint URL (LocalStack, VPC endpoints)
pub const ENV_CLOUDWATCH_ENDPOINT: &str = "CLOUDWATCH_ENDPOINT";

pub const ENV_AWS_ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
pub const ENV_AWS_SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
pub const ENV_AWS_SESSION_TOKEN: &str = "AWS_SESSION_TOKEN";

// =============================================================================
// Environment Variables - Prometheus Scrape
// =============================================================================

pub const ENV_SCRAPE_URL: &str = "PROMETHEUS_SCRAPE_URL";

/// Scrape interval in seconds
pub const ENV_SCRAPE_INTERVAL: &str = "PROMETHEUS_SCRAPE_INTERVAL";

/// Scrape request timeout in seconds
pub const ENV_SCRAPE_TIMEOUT: &str = "PROMETHEUS_SCRAPE_TIMEOUT";

pub const ENV_CERT_PATH: &str = "CERT_PATH";
pub const ENV_KEY_PATH: &str = "KEY_PATH";

/// Accept any server certificate during the TLS handshake (insecure)
pub const ENV_ACCEPT_INVALID_CERT: &str = "ACCEPT_INVALID_CERT";

// =============================================================================
// Environment Variables - Selection and Dimensions
// =============================================================================

pub const ENV_ADDITIONAL_DIMENSION: &str = "ADDITIONAL_DIMENSION";
pub const ENV_REPLACE_DIMENSIONS: &str = "REPLACE_DIMENSIONS";
pub const ENV_INCLUDE_METRICS: &str = "INCLUDE_METRICS";
pub const ENV_EXCLUDE_METRICS: &str = "EXCLUDE_METRICS";
pub const ENV_INCLUDE_DIMENSIONS_FOR_METRICS: &str = "INCLUDE_DIMENSIONS_FOR_METRICS";
pub const ENV_EXCLUDE_DIMENSIONS_FOR_METRICS: &str = "EXCLUDE_DIMENSIONS_FOR_METRICS";
pub const ENV_FORCE_HIGH_RES: &str = "FORCE_HIGH_RES";

// =============================================================================
// Defaults
// =============================================================================

/// Default scrape/publish interval in seconds
pub const DEFAULT_SCRAPE_INTERVAL_SECS: u64 = 30;

/// Default scrape request timeout in seconds
pub const DEFAULT_SCRAPE_TIMEOUT_SECS: u64 = 10;

/// Default CloudWatch publish timeout in seconds
pub const DEFAULT_PUBLISH_TIMEOUT_SECS: u64 = 5;

/// Timeout for background tasks during graceful shutdown
pub const SHUTDOWN_TIMEOUT_SECS: u64 = 30;

// =============================================================================
// Prometheus Exposition
// =============================================================================

/// Accept header preferring the delimited protobuf format over text 0.0.4
pub const SCRAPE_ACCEPT_HEADER: &str = "application/vnd.google.protobuf;proto=io.prometheus.client.MetricFamily;encoding=delimited;q=0.7,text/plain;version=0.0.4;q=0.3";

pub const PROTOBUF_MEDIA_TYPE: &str = "application/vnd.google.protobuf";
pub const PROTOBUF_PROTO_PARAM: &str = "io.prometheus.client.MetricFamily";
pub const PROTOBUF_ENCODING_PARAM: &str = "delimited";

/// Capacity of the handoff queue between the scrape decoder and the cycle
pub const SCRAPE_CHANNEL_CAPACITY: usize = 1024;

/// Label carrying the metric name
pub const METRIC_NAME_LABEL: &str = "__name__";

/// Presence of this label requests 1-second storage resolution
pub const HIGH_RES_LABEL: &str = "__cw_high_res";

/// Value of this label overrides the CloudWatch unit
pub const UNIT_LABEL: &str = "__cw_unit";

// =============================================================================
// CloudWatch Limits
// =============================================================================

/// Maximum dimensions per datum
pub const MAX_DIMENSIONS: usize = 10;

/// Data points per PutMetricData call
pub const PUBLISH_BATCH_SIZE: usize = 10;

pub const HIGH_RESOLUTION_SECS: i32 = 1;
pub const STANDARD_RESOLUTION_SECS: i32 = 60;

/// Unit used when a sample carries no unit label
pub const DEFAULT_UNIT: &str = "None";

/// Non-zero magnitudes must lie strictly between 2^-260 and 2^260
pub const VALUE_MIN_EXPONENT: i32 = -260;
pub const VALUE_MAX_EXPONENT: i32 = 260;

/// Request compression threshold; zero compresses every request
pub const REQUEST_MIN_COMPRESSION_SIZE_BYTES: u32 = 0;
