use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use super::cli::CliConfig;
use super::constants::{
    DEFAULT_PUBLISH_TIMEOUT_SECS, DEFAULT_SCRAPE_INTERVAL_SECS, DEFAULT_SCRAPE_TIMEOUT_SECS,
    MAX_DIMENSIONS,
};
use crate::domain::filter::MatcherRule;
use crate::domain::types::Dimension;
use crate::utils::glob::{GlobPattern, compile_list};
use crate::utils::string::{split_key_value, split_top_level};

/// Namespace prefix reserved for AWS service metrics
const RESERVED_NAMESPACE_PREFIX: &str = "AWS/";

// =============================================================================
// File Configuration (JSON)
// =============================================================================

/// CloudWatch section (from JSON config file)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct CloudWatchFileConfig {
    pub namespace: Option<String>,
    pub region: Option<String>,
    pub publish_timeout_secs: Option<u64>,
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
}

/// Prometheus scrape section (from JSON config file)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct PrometheusFileConfig {
    pub scrape_url: Option<String>,
    pub scrape_interval_secs: Option<u64>,
    pub scrape_timeout_secs: Option<u64>,
    pub cert_path: Option<PathBuf>,
    pub key_path: Option<PathBuf>,
    pub accept_invalid_cert: Option<bool>,
}

/// Metric name selection (from JSON config file)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct MetricsFileConfig {
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// One `metrics` glob with the dimensions it selects
#[derive(Debug, Clone, Deserialize)]
pub struct MatcherRuleFileConfig {
    pub metrics: String,
    #[serde(default)]
    pub dimensions: Vec<String>,
}

/// Dimension handling (from JSON config file)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct DimensionsFileConfig {
    #[serde(default)]
    pub additional: BTreeMap<String, String>,
    #[serde(default)]
    pub replace: BTreeMap<String, String>,
    #[serde(default)]
    pub include_for_metrics: Vec<MatcherRuleFileConfig>,
    #[serde(default)]
    pub exclude_for_metrics: Vec<MatcherRuleFileConfig>,
    pub force_high_res: Option<bool>,
}

/// File-based configuration (JSON)
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub cloudwatch: Option<CloudWatchFileConfig>,
    pub prometheus: Option<PrometheusFileConfig>,
    pub metrics: Option<MetricsFileConfig>,
    pub dimensions: Option<DimensionsFileConfig>,
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

impl FileConfig {
    /// Load configuration from a JSON file
    fn load_from_file(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "Loading config file");
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Warn about unknown fields in the config
    fn warn_unknown_fields(&self) {
        if let serde_json::Value::Object(map) = &self.extra
            && !map.is_empty()
        {
            let keys_str: String = map
                .keys()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            tracing::warn!(
                fields = %keys_str,
                "Unknown fields in config file (possible typos)"
            );
        }
    }
}

// =============================================================================
// Resolved Configuration
// =============================================================================

#[derive(Clone, PartialEq, Eq)]
pub struct StaticCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"***")
            .field("session_token", &self.session_token.as_ref().map(|_| "***"))
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct CloudWatchConfig {
    pub namespace: String,
    pub region: String,
    pub publish_timeout: Duration,
    /// Overrides the regional endpoint
    pub endpoint: Option<String>,
    /// `None` uses the SDK default credential chain
    pub credentials: Option<StaticCredentials>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsIdentityPaths {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    pub url: String,
    pub interval: Duration,
    pub timeout: Duration,
    pub client_tls: Option<TlsIdentityPaths>,
    pub accept_invalid_certs: bool,
}

/// What gets published and with which dimensions
#[derive(Debug, Clone, Default)]
pub struct SelectionConfig {
    pub include_metrics: Vec<GlobPattern>,
    pub exclude_metrics: Vec<GlobPattern>,
    pub include_dimensions: Vec<MatcherRule>,
    pub exclude_dimensions: Vec<MatcherRule>,
    /// Appended to every data point, sorted by name
    pub extra_dimensions: Vec<Dimension>,
    pub dimension_substitutions: BTreeMap<String, String>,
    pub force_high_res: bool,
}

/// Resolved configuration, built once at startup
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub cloudwatch: CloudWatchConfig,
    pub scrape: ScrapeConfig,
    pub selection: SelectionConfig,
}

impl PipelineConfig {
    /// Load configuration from all sources
    ///
    /// Priority (lowest to highest):
    /// 1. Defaults
    /// 2. JSON config file given by `--config`
    /// 3. CLI arguments (which include env var fallbacks via clap)
    pub fn load(cli: &CliConfig) -> Result<Self> {
        tracing::debug!("Loading pipeline configuration");
        tracing::trace!(cli = ?cli, "CLI config");

        let file_config = match &cli.config {
            Some(path) => {
                if !path.exists() {
                    anyhow::bail!("Config file not found: {}", path.display());
                }
                let config = FileConfig::load_from_file(path)?;
                config.warn_unknown_fields();
                config
            }
            None => FileConfig::default(),
        };

        let file_cw = file_config.cloudwatch.unwrap_or_default();
        let file_prom = file_config.prometheus.unwrap_or_default();
        let file_metrics = file_config.metrics.unwrap_or_default();
        let file_dims = file_config.dimensions.unwrap_or_default();

        // CloudWatch
        let namespace = cli
            .cloudwatch_namespace
            .clone()
            .or(file_cw.namespace)
            .unwrap_or_default();
        let region = cli
            .cloudwatch_region
            .clone()
            .or(file_cw.region)
            .unwrap_or_default();
        let publish_timeout_secs = cli
            .cloudwatch_publish_timeout
            .or(file_cw.publish_timeout_secs)
            .unwrap_or(DEFAULT_PUBLISH_TIMEOUT_SECS);
        let endpoint = cli.cloudwatch_endpoint.clone().or(file_cw.endpoint);
        let credentials = resolve_credentials(
            cli.aws_access_key_id.clone().or(file_cw.access_key_id),
            cli.aws_secret_access_key
                .clone()
                .or(file_cw.secret_access_key),
            cli.aws_session_token.clone().or(file_cw.session_token),
        );

        // Scrape
        let url = cli
            .prometheus_scrape_url
            .clone()
            .or(file_prom.scrape_url)
            .unwrap_or_default();
        let interval_secs = cli
            .prometheus_scrape_interval
            .or(file_prom.scrape_interval_secs)
            .unwrap_or(DEFAULT_SCRAPE_INTERVAL_SECS);
        let timeout_secs = cli
            .prometheus_scrape_timeout
            .or(file_prom.scrape_timeout_secs)
            .unwrap_or(DEFAULT_SCRAPE_TIMEOUT_SECS);
        let cert_path = cli.cert_path.clone().or(file_prom.cert_path);
        let key_path = cli.key_path.clone().or(file_prom.key_path);
        let client_tls = match (cert_path, key_path) {
            (Some(cert_path), Some(key_path)) => Some(TlsIdentityPaths {
                cert_path,
                key_path,
            }),
            (None, None) => None,
            (Some(_), None) => {
                anyhow::bail!("Configuration error: a client certificate requires a key path")
            }
            (None, Some(_)) => {
                anyhow::bail!("Configuration error: a client key requires a certificate path")
            }
        };
        let accept_invalid_certs = cli
            .accept_invalid_cert
            .or(file_prom.accept_invalid_cert)
            .unwrap_or(false);

        // Selection
        let include_metrics = match &cli.include_metrics {
            Some(list) => compile_list(list)?,
            None => compile_each(&file_metrics.include)?,
        };
        let exclude_metrics = match &cli.exclude_metrics {
            Some(list) => compile_list(list)?,
            None => compile_each(&file_metrics.exclude)?,
        };
        let include_dimensions = match &cli.include_dimensions_for_metrics {
            Some(rules) => parse_matcher_rules(rules)?,
            None => file_rules(file_dims.include_for_metrics)?,
        };
        let exclude_dimensions = match &cli.exclude_dimensions_for_metrics {
            Some(rules) => parse_matcher_rules(rules)?,
            None => file_rules(file_dims.exclude_for_metrics)?,
        };
        let additional = match &cli.additional_dimension {
            Some(pairs) => parse_dimension_pairs(pairs)?,
            None => file_dims.additional.into_iter().collect(),
        };
        let dimension_substitutions = match &cli.replace_dimensions {
            Some(pairs) => parse_dimension_pairs(pairs)?.into_iter().collect(),
            None => file_dims.replace,
        };
        let force_high_res = cli
            .force_high_res
            .or(file_dims.force_high_res)
            .unwrap_or(false);

        let mut extra_dimensions: Vec<Dimension> = additional
            .into_iter()
            .map(|(name, value)| Dimension::new(name, value))
            .collect();
        extra_dimensions.sort();

        let config = Self {
            cloudwatch: CloudWatchConfig {
                namespace,
                region,
                publish_timeout: Duration::from_secs(publish_timeout_secs),
                endpoint,
                credentials,
            },
            scrape: ScrapeConfig {
                url,
                interval: Duration::from_secs(interval_secs),
                timeout: Duration::from_secs(timeout_secs),
                client_tls,
                accept_invalid_certs,
            },
            selection: SelectionConfig {
                include_metrics,
                exclude_metrics,
                include_dimensions,
                exclude_dimensions,
                extra_dimensions,
                dimension_substitutions,
                force_high_res,
            },
        };

        config.validate()?;

        tracing::debug!(
            namespace = %config.cloudwatch.namespace,
            region = %config.cloudwatch.region,
            url = %config.scrape.url,
            interval = ?config.scrape.interval,
            "Configuration loaded"
        );

        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let cw = &self.cloudwatch;
        if cw.namespace.trim().is_empty() {
            anyhow::bail!("Configuration error: CloudWatch namespace is required");
        }
        if cw.namespace.starts_with(RESERVED_NAMESPACE_PREFIX) {
            anyhow::bail!(
                "Configuration error: CloudWatch namespace '{}' uses the reserved '{}' prefix",
                cw.namespace,
                RESERVED_NAMESPACE_PREFIX
            );
        }
        if cw.region.trim().is_empty() {
            anyhow::bail!("Configuration error: CloudWatch region is required");
        }
        if cw.publish_timeout.is_zero() {
            anyhow::bail!("Configuration error: publish timeout must be greater than 0");
        }
        if let Some(endpoint) = &cw.endpoint {
            reqwest::Url::parse(endpoint).with_context(|| {
                format!("Configuration error: invalid CloudWatch endpoint '{}'", endpoint)
            })?;
        }

        let scrape = &self.scrape;
        if scrape.url.trim().is_empty() {
            anyhow::bail!("Configuration error: Prometheus scrape URL is required");
        }
        let url = reqwest::Url::parse(&scrape.url).with_context(|| {
            format!("Configuration error: invalid scrape URL '{}'", scrape.url)
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            anyhow::bail!(
                "Configuration error: scrape URL must use http or https, got '{}'",
                url.scheme()
            );
        }
        if scrape.interval.is_zero() {
            anyhow::bail!("Configuration error: scrape interval must be greater than 0");
        }
        if scrape.timeout.is_zero() {
            anyhow::bail!("Configuration error: scrape timeout must be greater than 0");
        }

        let extras = &self.selection.extra_dimensions;
        if extras.len() > MAX_DIMENSIONS {
            anyhow::bail!(
                "Configuration error: {} additional dimensions configured, at most {} allowed",
                extras.len(),
                MAX_DIMENSIONS
            );
        }
        if let Some(pair) = extras.windows(2).find(|w| w[0].name == w[1].name) {
            anyhow::bail!(
                "Configuration error: additional dimension '{}' given more than once",
                pair[0].name
            );
        }
        if let Some(dim) = extras.iter().find(|d| d.name.is_empty() || d.value.is_empty()) {
            anyhow::bail!(
                "Configuration error: additional dimension '{}' needs a non-empty name and value",
                dim.name
            );
        }

        Ok(())
    }
}

/// Static keys need both halves; otherwise the SDK chain is used
fn resolve_credentials(
    access_key_id: Option<String>,
    secret_access_key: Option<String>,
    session_token: Option<String>,
) -> Option<StaticCredentials> {
    match (access_key_id, secret_access_key) {
        (Some(access_key_id), Some(secret_access_key)) => Some(StaticCredentials {
            access_key_id,
            secret_access_key,
            session_token,
        }),
        (None, None) => None,
        _ => {
            tracing::warn!(
                "Only one of access key id and secret access key given, using default credential chain"
            );
            None
        }
    }
}

/// Parse `NAME=VALUE[,NAME=VALUE]`
pub fn parse_dimension_pairs(value: &str) -> Result<Vec<(String, String)>> {
    split_top_level(value, ',')
        .into_iter()
        .map(|entry| -> Result<(String, String)> {
            let (name, value) = split_key_value(entry).with_context(|| {
                format!(
                    "Configuration error: invalid dimension '{}', expected NAME=VALUE",
                    entry
                )
            })?;
            Ok((name.to_string(), value.to_string()))
        })
        .collect()
}

/// Parse `GLOB=dim1,dim2;GLOB2=dim3`. Blank `;` segments are ignored.
pub fn parse_matcher_rules(value: &str) -> Result<Vec<MatcherRule>> {
    split_top_level(value, ';')
        .into_iter()
        .map(|entry| -> Result<MatcherRule> {
            let (pattern, labels) = split_key_value(entry).with_context(|| {
                format!(
                    "Configuration error: invalid rule '{}', expected GLOB=dim1,dim2",
                    entry
                )
            })?;
            let pattern = GlobPattern::compile(pattern)?;
            let labels = split_top_level(labels, ',').into_iter().map(String::from);
            Ok(MatcherRule::new(pattern, labels))
        })
        .collect()
}

fn compile_each(patterns: &[String]) -> Result<Vec<GlobPattern>> {
    patterns
        .iter()
        .map(|p| -> Result<GlobPattern> { Ok(GlobPattern::compile(p)?) })
        .collect()
}

fn file_rules(rules: Vec<MatcherRuleFileConfig>) -> Result<Vec<MatcherRule>> {
    rules
        .into_iter()
        .map(|rule| -> Result<MatcherRule> {
            Ok(MatcherRule::new(
                GlobPattern::compile(&rule.metrics)?,
                rule.dimensions,
            ))
        })
        .collect()
}
