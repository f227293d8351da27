//! HTTP scrape client
//!
//! One GET per cycle. The body is decoded on a spawned task and families are
//! handed over through a bounded channel, so transformation can start before
//! the body has been fully read.

use std::path::Path;

use futures::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::delimited::{DelimitedDecoder, Frame};
use super::proto::MetricFamily;
use super::text::parse_text;
use crate::core::config::ScrapeConfig;
use crate::core::constants::{
    APP_NAME_LOWER, PROTOBUF_ENCODING_PARAM, PROTOBUF_MEDIA_TYPE, PROTOBUF_PROTO_PARAM,
    SCRAPE_ACCEPT_HEADER, SCRAPE_CHANNEL_CAPACITY,
};
use crate::domain::error::{FetchError, ScrapeError};
use crate::utils::mime::parse_media_type;

type FamilyResult = Result<MetricFamily, ScrapeError>;

/// Wire format chosen from the response `Content-Type`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpositionFormat {
    ProtobufDelimited,
    Text,
}

impl ExpositionFormat {
    /// Anything that is not exactly delimited protobuf is read as text
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        let Some(media) = content_type.and_then(parse_media_type) else {
            return Self::Text;
        };
        if media.essence == PROTOBUF_MEDIA_TYPE
            && media.param("proto") == Some(PROTOBUF_PROTO_PARAM)
            && media.param("encoding") == Some(PROTOBUF_ENCODING_PARAM)
        {
            Self::ProtobufDelimited
        } else {
            Self::Text
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScrapeClient {
    client: reqwest::Client,
    url: String,
}

impl ScrapeClient {
    pub fn new(config: &ScrapeConfig) -> Result<Self, FetchError> {
        let mut builder = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(format!("{}/{}", APP_NAME_LOWER, env!("CARGO_PKG_VERSION")));

        if let Some(tls) = &config.client_tls {
            let mut pem = read_pem(&tls.cert_path)?;
            pem.push(b'\n');
            pem.extend(read_pem(&tls.key_path)?);
            let identity = reqwest::Identity::from_pem(&pem)
                .map_err(|e| FetchError::Tls(format!("invalid client certificate: {}", e)))?;
            builder = builder.identity(identity);
        }

        if config.accept_invalid_certs {
            tracing::warn!("TLS certificate verification disabled for scrape endpoint");
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder.build().map_err(FetchError::Client)?;

        tracing::debug!(url = %config.url, timeout = ?config.timeout, "Scrape client initialized");
        Ok(Self {
            client,
            url: config.url.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Start one scrape.
    ///
    /// Fails immediately on connection errors and non-success statuses;
    /// otherwise returns a stream of decoded families.
    pub async fn scrape(&self) -> Result<FamilyStream, FetchError> {
        let response = self
            .client
            .get(&self.url)
            .header(ACCEPT, SCRAPE_ACCEPT_HEADER)
            .send()
            .await
            .map_err(|source| FetchError::Request {
                url: self.url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: self.url.clone(),
                status,
            });
        }

        let format = ExpositionFormat::from_content_type(
            response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok()),
        );
        tracing::trace!(url = %self.url, ?format, "Scrape response received");

        let (tx, rx) = mpsc::channel(SCRAPE_CHANNEL_CAPACITY);
        let url = self.url.clone();
        let task = tokio::spawn(async move {
            match format {
                ExpositionFormat::ProtobufDelimited => decode_delimited(response, url, tx).await,
                ExpositionFormat::Text => decode_text(response, url, tx).await,
            }
        });

        Ok(FamilyStream {
            rx,
            task: Some(task),
        })
    }
}

fn read_pem(path: &Path) -> Result<Vec<u8>, FetchError> {
    std::fs::read(path)
        .map_err(|e| FetchError::Tls(format!("failed to read {}: {}", path.display(), e)))
}

async fn decode_delimited(response: reqwest::Response, url: String, tx: mpsc::Sender<FamilyResult>) {
    let mut body = response.bytes_stream();
    let mut decoder = DelimitedDecoder::new();

    while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(source) => {
                let _ = tx.send(Err(FetchError::Body { url, source }.into())).await;
                return;
            }
        };
        decoder.extend(&chunk);

        loop {
            let item = match decoder.next_frame() {
                Ok(Frame::Family(family)) => Ok(family),
                Ok(Frame::Invalid(e)) => Err(e.into()),
                Ok(Frame::Incomplete) => break,
                Err(e) => {
                    let _ = tx.send(Err(e.into())).await;
                    return;
                }
            };
            if tx.send(item).await.is_err() {
                return;
            }
        }
    }

    if let Err(e) = decoder.finish() {
        let _ = tx.send(Err(e.into())).await;
    }
}

async fn decode_text(response: reqwest::Response, url: String, tx: mpsc::Sender<FamilyResult>) {
    let body = match response.text().await {
        Ok(body) => body,
        Err(source) => {
            let _ = tx.send(Err(FetchError::Body { url, source }.into())).await;
            return;
        }
    };

    for item in parse_text(&body) {
        if tx.send(item.map_err(ScrapeError::from)).await.is_err() {
            return;
        }
    }
}

/// Families of one scrape, in exposition order
#[derive(Debug)]
pub struct FamilyStream {
    rx: mpsc::Receiver<FamilyResult>,
    task: Option<JoinHandle<()>>,
}

impl FamilyStream {
    /// Next family, `None` once the body is exhausted
    pub async fn next(&mut self) -> Option<FamilyResult> {
        if let Some(item) = self.rx.recv().await {
            return Some(item);
        }

        let task = self.task.take()?;
        match task.await {
            Ok(()) => None,
            Err(e) => {
                tracing::error!(error = %e, "Scrape decoder task failed");
                Some(Err(FetchError::DecoderStopped.into()))
            }
        }
    }
}

impl Drop for FamilyStream {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use httpmock::prelude::*;
    use prost::Message;

    use super::*;
    use crate::core::config::TlsIdentityPaths;
    use crate::domain::scrape::proto::{Gauge, Metric, MetricType};

    fn config(url: String) -> ScrapeConfig {
        ScrapeConfig {
            url,
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(5),
            client_tls: None,
            accept_invalid_certs: false,
        }
    }

    async fn collect(mut stream: FamilyStream) -> Vec<FamilyResult> {
        let mut out = Vec::new();
        while let Some(item) = stream.next().await {
            out.push(item);
        }
        out
    }

    fn gauge_family(name: &str, value: f64) -> MetricFamily {
        MetricFamily {
            name: Some(name.to_string()),
            r#type: Some(MetricType::Gauge as i32),
            metric: vec![Metric {
                gauge: Some(Gauge { value: Some(value) }),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_format_from_content_type() {
        let proto = "application/vnd.google.protobuf; proto=io.prometheus.client.MetricFamily; encoding=delimited";
        assert_eq!(
            ExpositionFormat::from_content_type(Some(proto)),
            ExpositionFormat::ProtobufDelimited
        );
        assert_eq!(
            ExpositionFormat::from_content_type(Some(
                "application/vnd.google.protobuf; proto=io.prometheus.client.MetricFamily; encoding=text"
            )),
            ExpositionFormat::Text
        );
        assert_eq!(
            ExpositionFormat::from_content_type(Some("text/plain; version=0.0.4")),
            ExpositionFormat::Text
        );
        assert_eq!(
            ExpositionFormat::from_content_type(None),
            ExpositionFormat::Text
        );
    }

    #[tokio::test]
    async fn test_scrape_text_body() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/metrics")
                    .header("accept", SCRAPE_ACCEPT_HEADER);
                then.status(200)
                    .header("content-type", "text/plain; version=0.0.4")
                    .body("# TYPE up gauge\nup 1\n# TYPE down gauge\ndown 0\n");
            })
            .await;

        let client = ScrapeClient::new(&config(server.url("/metrics"))).unwrap();
        let items = collect(client.scrape().await.unwrap()).await;

        mock.assert_async().await;
        let names: Vec<String> = items
            .into_iter()
            .map(|r| r.unwrap().family_name().to_string())
            .collect();
        assert_eq!(names, vec!["up", "down"]);
    }

    #[tokio::test]
    async fn test_scrape_protobuf_body() {
        let mut body = Vec::new();
        gauge_family("a", 1.0).encode_length_delimited(&mut body).unwrap();
        gauge_family("b", 2.0).encode_length_delimited(&mut body).unwrap();

        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/metrics");
                then.status(200)
                    .header(
                        "content-type",
                        "application/vnd.google.protobuf; proto=io.prometheus.client.MetricFamily; encoding=delimited",
                    )
                    .body(body);
            })
            .await;

        let client = ScrapeClient::new(&config(server.url("/metrics"))).unwrap();
        let items = collect(client.scrape().await.unwrap()).await;

        assert_eq!(items.len(), 2);
        let b = items[1].as_ref().unwrap();
        assert_eq!(b.family_name(), "b");
        assert_eq!(b.metric[0].gauge.unwrap().value, Some(2.0));
    }

    #[tokio::test]
    async fn test_truncated_protobuf_body_ends_with_fetch_error() {
        let mut body = Vec::new();
        gauge_family("a", 1.0).encode_length_delimited(&mut body).unwrap();
        gauge_family("b", 2.0).encode_length_delimited(&mut body).unwrap();
        body.truncate(body.len() - 3);

        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/metrics");
                then.status(200)
                    .header(
                        "content-type",
                        "application/vnd.google.protobuf; proto=io.prometheus.client.MetricFamily; encoding=delimited",
                    )
                    .body(body);
            })
            .await;

        let client = ScrapeClient::new(&config(server.url("/metrics"))).unwrap();
        let items = collect(client.scrape().await.unwrap()).await;

        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(matches!(
            items[1],
            Err(ScrapeError::Fetch(FetchError::Framing(_)))
        ));
    }

    #[tokio::test]
    async fn test_broken_text_family_does_not_stop_stream() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/metrics");
                then.status(200).body("bad{x=} 1\ngood 2\n");
            })
            .await;

        let client = ScrapeClient::new(&config(server.url("/metrics"))).unwrap();
        let items = collect(client.scrape().await.unwrap()).await;

        assert_eq!(items.len(), 2);
        assert!(matches!(items[0], Err(ScrapeError::Decode(_))));
        assert_eq!(items[1].as_ref().unwrap().family_name(), "good");
    }

    #[tokio::test]
    async fn test_non_success_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/metrics");
                then.status(503);
            })
            .await;

        let client = ScrapeClient::new(&config(server.url("/metrics"))).unwrap();
        match client.scrape().await {
            Err(FetchError::Status { status, .. }) => assert_eq!(status.as_u16(), 503),
            other => panic!("expected status error, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let client = ScrapeClient::new(&config("http://127.0.0.1:1/metrics".to_string())).unwrap();
        assert!(matches!(
            client.scrape().await,
            Err(FetchError::Request { .. })
        ));
    }

    #[tokio::test]
    async fn test_empty_body_is_not_an_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/metrics");
                then.status(200).body("");
            })
            .await;

        let client = ScrapeClient::new(&config(server.url("/metrics"))).unwrap();
        assert!(collect(client.scrape().await.unwrap()).await.is_empty());
    }

    #[test]
    fn test_missing_client_certificate_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config("https://localhost/metrics".to_string());
        cfg.client_tls = Some(TlsIdentityPaths {
            cert_path: dir.path().join("missing.crt"),
            key_path: dir.path().join("missing.key"),
        });

        assert!(matches!(ScrapeClient::new(&cfg), Err(FetchError::Tls(_))));
    }

    #[test]
    fn test_garbage_client_certificate() {
        let dir = tempfile::tempdir().unwrap();
        let cert_path = dir.path().join("client.crt");
        let key_path = dir.path().join("client.key");
        std::fs::write(&cert_path, "not a certificate").unwrap();
        std::fs::write(&key_path, "not a key").unwrap();

        let mut cfg = config("https://localhost/metrics".to_string());
        cfg.client_tls = Some(TlsIdentityPaths {
            cert_path,
            key_path,
        });

        assert!(matches!(ScrapeClient::new(&cfg), Err(FetchError::Tls(_))));
    }
}
