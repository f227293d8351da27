use clap::Parser;

use std::path::PathBuf;

use super::constants::{
    ENV_ACCEPT_INVALID_CERT, ENV_ADDITIONAL_DIMENSION, ENV_AWS_ACCESS_KEY_ID,
    ENV_AWS_SECRET_ACCESS_KEY, ENV_AWS_SESSION_TOKEN, ENV_CERT_PATH,
    ENV_CLOUDWATCH_ENDPOINT, ENV_CLOUDWATCH_NAMESPACE, ENV_CLOUDWATCH_PUBLISH_TIMEOUT, ENV_CLOUDWATCH_REGION, ENV_CONFIG,
    ENV_EXCLUDE_DIMENSIONS_FOR_METRICS, ENV_EXCLUDE_METRICS, ENV_FORCE_HIGH_RES,
    ENV_INCLUDE_DIMENSIONS_FOR_METRICS, ENV_INCLUDE_METRICS, ENV_KEY_PATH, ENV_REPLACE_DIMENSIONS,
    ENV_SCRAPE_INTERVAL, ENV_SCRAPE_TIMEOUT, ENV_SCRAPE_URL,
};

#[derive(Parser)]
#[command(name = "promwatch")]
#[command(version, about = "Publish Prometheus metrics to AWS CloudWatch", long_about = None)]
pub struct Cli {
    /// Path to JSON config file
    #[arg(long, short = 'c', env = ENV_CONFIG)]
    pub config: Option<PathBuf>,

    /// CloudWatch namespace under which metrics are published
    #[arg(long, env = ENV_CLOUDWATCH_NAMESPACE)]
    pub cloudwatch_namespace: Option<String>,

    /// CloudWatch region
    #[arg(long, env = ENV_CLOUDWATCH_REGION)]
    pub cloudwatch_region: Option<String>,

    /// CloudWatch publish timeout in seconds
    #[arg(long, env = ENV_CLOUDWATCH_PUBLISH_TIMEOUT)]
    pub cloudwatch_publish_timeout: Option<u64>,

    /// Custom CloudWatch endpoint URL
    #[arg(long, env = ENV_CLOUDWATCH_ENDPOINT)]
    pub cloudwatch_endpoint: Option<String>,

    /// AWS access key id (falls back to the SDK credential chain when unset)
    #[arg(long, env = ENV_AWS_ACCESS_KEY_ID, hide_env_values = true)]
    pub aws_access_key_id: Option<String>,

    /// AWS secret access key
    #[arg(long, env = ENV_AWS_SECRET_ACCESS_KEY, hide_env_values = true)]
    pub aws_secret_access_key: Option<String>,

    /// AWS session token for temporary credentials
    #[arg(long, env = ENV_AWS_SESSION_TOKEN, hide_env_values = true)]
    pub aws_session_token: Option<String>,

    /// Prometheus scrape URL
    #[arg(long, env = ENV_SCRAPE_URL)]
    pub prometheus_scrape_url: Option<String>,

    /// Scrape interval in seconds
    #[arg(long, env = ENV_SCRAPE_INTERVAL)]
    pub prometheus_scrape_interval: Option<u64>,

    /// Scrape request timeout in seconds
    #[arg(long, env = ENV_SCRAPE_TIMEOUT)]
    pub prometheus_scrape_timeout: Option<u64>,

    /// Client certificate (PEM) for mutual TLS against the scrape URL
    #[arg(long, env = ENV_CERT_PATH)]
    pub cert_path: Option<PathBuf>,

    /// Client key (PEM) for mutual TLS against the scrape URL
    #[arg(long, env = ENV_KEY_PATH)]
    pub key_path: Option<PathBuf>,

    /// Accept any server certificate. Insecure, use only for testing
    #[arg(long, env = ENV_ACCEPT_INVALID_CERT)]
    pub accept_invalid_cert: Option<bool>,

    /// Dimensions added to every metric (NAME=VALUE[,NAME=VALUE])
    #[arg(long, env = ENV_ADDITIONAL_DIMENSION)]
    pub additional_dimension: Option<String>,

    /// Also publish each metric with these dimension values substituted (NAME=VALUE,...)
    #[arg(long, env = ENV_REPLACE_DIMENSIONS)]
    pub replace_dimensions: Option<String>,

    /// Only publish matching metrics (comma-separated globs, e.g. 'up,http_*')
    #[arg(long, env = ENV_INCLUDE_METRICS)]
    pub include_metrics: Option<String>,

    /// Never publish matching metrics (comma-separated globs, e.g. 'tomcat_*')
    #[arg(long, env = ENV_EXCLUDE_METRICS)]
    pub exclude_metrics: Option<String>,

    /// Only publish listed dimensions for matching metrics (GLOB=dim1,dim2;GLOB2=dim3)
    #[arg(long, env = ENV_INCLUDE_DIMENSIONS_FOR_METRICS)]
    pub include_dimensions_for_metrics: Option<String>,

    /// Never publish listed dimensions for matching metrics (GLOB=dim1,dim2;GLOB2=dim3)
    #[arg(long, env = ENV_EXCLUDE_DIMENSIONS_FOR_METRICS)]
    pub exclude_dimensions_for_metrics: Option<String>,

    /// Publish every metric at 1-second resolution
    #[arg(long, env = ENV_FORCE_HIGH_RES)]
    pub force_high_res: Option<bool>,
}

/// Configuration derived from CLI arguments
#[derive(Clone, Default)]
pub struct CliConfig {
    pub config: Option<PathBuf>,
    pub cloudwatch_namespace: Option<String>,
    pub cloudwatch_region: Option<String>,
    pub cloudwatch_publish_timeout: Option<u64>,
    pub cloudwatch_endpoint: Option<String>,
    pub aws_access_key_id: Option<String>,
    pub aws_secret_access_key: Option<String>,
    pub aws_session_token: Option<String>,
    pub prometheus_scrape_url: Option<String>,
    pub prometheus_scrape_interval: Option<u64>,
    pub prometheus_scrape_timeout: Option<u64>,
    pub cert_path: Option<PathBuf>,
    pub key_path: Option<PathBuf>,
    pub accept_invalid_cert: Option<bool>,
    pub additional_dimension: Option<String>,
    pub replace_dimensions: Option<String>,
    pub include_metrics: Option<String>,
    pub exclude_metrics: Option<String>,
    pub include_dimensions_for_metrics: Option<String>,
    pub exclude_dimensions_for_metrics: Option<String>,
    pub force_high_res: Option<bool>,
}

impl std::fmt::Debug for CliConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CliConfig")
            .field("config", &self.config)
            .field("cloudwatch_namespace", &self.cloudwatch_namespace)
            .field("cloudwatch_region", &self.cloudwatch_region)
            .field("cloudwatch_endpoint", &self.cloudwatch_endpoint)
            .field("prometheus_scrape_url", &self.prometheus_scrape_url)
            .field("aws_access_key_id", &self.aws_access_key_id.as_ref().map(|_| "***"))
            .finish_non_exhaustive()
    }
}

/// Parse CLI arguments
pub fn parse() -> CliConfig {
    let cli = Cli::parse();
    CliConfig {
        config: cli.config,
        cloudwatch_namespace: cli.cloudwatch_namespace,
        cloudwatch_region: cli.cloudwatch_region,
        cloudwatch_publish_timeout: cli.cloudwatch_publish_timeout,
        cloudwatch_endpoint: cli.cloudwatch_endpoint,
        aws_access_key_id: cli.aws_access_key_id,
        aws_secret_access_key: cli.aws_secret_access_key,
        aws_session_token: cli.aws_session_token,
        prometheus_scrape_url: cli.prometheus_scrape_url,
        prometheus_scrape_interval: cli.prometheus_scrape_interval,
        prometheus_scrape_timeout: cli.prometheus_scrape_timeout,
        cert_path: cli.cert_path,
        key_path: cli.key_path,
        accept_invalid_cert: cli.accept_invalid_cert,
        additional_dimension: cli.additional_dimension,
        replace_dimensions: cli.replace_dimensions,
        include_metrics: cli.include_metrics,
        exclude_metrics: cli.exclude_metrics,
        include_dimensions_for_metrics: cli.include_dimensions_for_metrics,
        exclude_dimensions_for_metrics: cli.exclude_dimensions_for_metrics,
        force_high_res: cli.force_high_res,
    }
}
