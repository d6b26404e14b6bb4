//! Metrics provider
//!
//! Answers "what is this service's utilisation right now". Every failure
//! collapses to `None`: the autoscaler treats a missing sample as "no data"
//! and skips the service for the sweep.

use crate::config::{PrometheusConfig, SERVICE_PLACEHOLDER};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

/// Source of instant metric values
#[async_trait]
pub trait MetricsProvider: Send + Sync {
    /// Evaluate a query, returning its first sample or `None` when unavailable
    async fn query(&self, query: &str) -> Option<f64>;
}

/// Substitute the service name into a query template
pub fn render_query(template: &str, service: &str) -> String {
    template.replace(SERVICE_PLACEHOLDER, service)
}

/// Instant-query response body
#[derive(Debug, Deserialize)]
struct QueryResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
}

#[derive(Debug, Deserialize)]
struct QueryData {
    #[serde(default)]
    result: Vec<QueryResult>,
}

#[derive(Debug, Deserialize)]
struct QueryResult {
    /// `[timestamp, "value"]`
    value: (serde_json::Value, String),
}

/// Prometheus HTTP API client
pub struct PrometheusClient {
    client: Client,
    base_url: String,
}

impl PrometheusClient {
    pub fn new(config: &PrometheusConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(config.timeout()).build()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
        })
    }

    async fn fetch(&self, query: &str) -> Result<Option<f64>, String> {
        let url = format!("{}/api/v1/query", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[("query", query)])
            .send()
            .await
            .map_err(|e| format!("request failed: {}", e))?;

        if !response.status().is_success() {
            return Err(format!("unexpected status {}", response.status()));
        }

        let body: QueryResponse = response
            .json()
            .await
            .map_err(|e| format!("invalid response body: {}", e))?;

        if body.status != "success" {
            return Err(format!("query status '{}'", body.status));
        }

        let Some(first) = body.data.and_then(|d| d.result.into_iter().next()) else {
            return Ok(None);
        };

        first
            .value
            .1
            .parse::<f64>()
            .map(Some)
            .map_err(|e| format!("non-numeric sample '{}': {}", first.value.1, e))
    }
}

#[async_trait]
impl MetricsProvider for PrometheusClient {
    async fn query(&self, query: &str) -> Option<f64> {
        match self.fetch(query).await {
            Ok(Some(value)) => {
                debug!(query, value, "Metric sample");
                Some(value)
            }
            Ok(None) => {
                debug!(query, "Query returned no samples");
                None
            }
            Err(error) => {
                warn!(query, error = %error, "Metric query failed");
                None
            }
        }
    }
}
