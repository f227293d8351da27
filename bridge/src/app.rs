//! Core application

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::core::cli;
use crate::core::config::PipelineConfig;
use crate::core::constants::{APP_NAME_LOWER, ENV_LOG};
use crate::core::shutdown::ShutdownService;
use crate::domain::BridgePipeline;
use crate::domain::publish::CloudWatchSink;
use crate::domain::scrape::ScrapeClient;

pub struct CoreApp {
    pub shutdown: ShutdownService,
    pub config: Arc<PipelineConfig>,
}

impl CoreApp {
    /// Run the application with CLI argument parsing
    pub async fn run() -> Result<()> {
        dotenvy::dotenv().ok();
        Self::init_logging();

        tracing::debug!("Application starting");

        let cli_config = cli::parse();
        let config = PipelineConfig::load(&cli_config)?;
        let app = Self {
            shutdown: ShutdownService::new(),
            config: Arc::new(config),
        };
        app.start().await
    }

    fn init_logging() {
        let default_filter = format!("info,{}=info", APP_NAME_LOWER);

        let filter = std::env::var(ENV_LOG)
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or(default_filter);

        tracing_subscriber::fmt()
            .with_target(false)
            .with_thread_ids(false)
            .with_level(true)
            .with_ansi(true)
            .compact()
            .with_env_filter(filter)
            .init();
    }

    async fn start(self) -> Result<()> {
        // Install signal handlers FIRST (before any blocking calls)
        self.shutdown.install_signal_handlers();

        let scraper = ScrapeClient::new(&self.config.scrape)
            .context("Failed to initialize scrape client")?;
        let sink = Arc::new(CloudWatchSink::new(&self.config.cloudwatch).await);

        let pipeline = BridgePipeline::new(self.config.clone(), scraper, sink);
        let handle = pipeline.start(self.shutdown.subscribe());
        self.shutdown.register(handle).await;

        tracing::info!(
            url = %self.config.scrape.url,
            namespace = %self.config.cloudwatch.namespace,
            region = %self.config.cloudwatch.region,
            interval_secs = self.config.scrape.interval.as_secs(),
            "Publishing Prometheus metrics to CloudWatch"
        );

        self.shutdown.wait().await;
        self.shutdown.shutdown().await;

        Ok(())
    }
}
