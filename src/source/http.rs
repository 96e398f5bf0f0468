//! HTTP batch source.

use super::{decode_batch, FetchFuture, RecordFields, SourceFetcher};
use crate::core::config::SourceConfig;
use crate::core::error::{ProbeError, ProbeResult};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Fetches one batch with `GET {base_url}{path}?{count_param}={count}`.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::Client,
    name: String,
    url: String,
    count_param: String,
    fields: RecordFields,
}

impl HttpSource {
    /// Build a source from configuration.
    pub fn new(config: &SourceConfig) -> ProbeResult<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(ms) = config.timeout_ms {
            builder = builder.timeout(Duration::from_millis(ms));
        }
        let client = builder.build().map_err(|e| ProbeError::SourceFetch {
            message: format!("failed to build HTTP client: {}", e),
        })?;

        Ok(Self {
            client,
            name: config.name.clone(),
            url: format!("{}{}", config.base_url.trim_end_matches('/'), config.path),
            count_param: config.count_param.clone(),
            fields: RecordFields::new(&config.id_field, &config.text_field),
        })
    }

    /// Endpoint URL without the query string.
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn fetch_batch(&self, count: usize) -> ProbeResult<Vec<super::RawRecord>> {
        debug!(url = %self.url, count, "fetching records");

        let response = self
            .client
            .get(&self.url)
            .query(&[(self.count_param.as_str(), count.to_string())])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ProbeError::SourceFetch {
                message: e.to_string(),
            })?;

        let body: Value = response.json().await.map_err(|e| ProbeError::SourceDecode {
            message: e.to_string(),
        })?;

        decode_batch(body, &self.fields)
    }
}

impl SourceFetcher for HttpSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&self, count: usize) -> FetchFuture<'_> {
        Box::pin(self.fetch_batch(count))
    }
}
