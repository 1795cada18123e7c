//! Price API REST client

use anyhow::{Context, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::request::{BatchRequest, FilterRequest, SampleRequest};
use super::PriceDataSource;
use crate::config::BrowserConfig;
use crate::models::{BatchBinsResponse, FilterParams, PriceRanges, RowsResponse, TopToken};

#[derive(Clone)]
pub struct PriceApiClient {
    client: Client,
    base_url: String,
}

#[derive(Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

impl PriceApiClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .context("Failed to build PriceApiClient")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(cfg: &BrowserConfig) -> Result<Self> {
        Self::new(cfg.api_base.clone(), cfg.request_timeout)
    }

    #[inline]
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        qp: &[(String, String)],
    ) -> Result<T> {
        let started = Instant::now();
        let resp = self
            .client
            .get(self.url(path))
            .query(qp)
            .send()
            .await
            .with_context(|| format!("GET {} failed", path))?;

        let status = resp.status();
        let latency_ms = started.elapsed().as_millis() as u64;
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(path, status = status.as_u16(), latency_ms, "Request failed");
            return Err(anyhow::anyhow!("GET {} {}: {}", path, status, text));
        }

        let body = resp
            .json::<serde_json::Value>()
            .await
            .with_context(|| format!("Failed to read {} response", path))?;

        // The server reports bad parameters as a 200 with an `error` field.
        if let Some(err) = body.get("error").and_then(|e| e.as_str()) {
            warn!(path, latency_ms, error = err, "Server rejected request");
            return Err(anyhow::anyhow!("GET {} rejected: {}", path, err));
        }

        debug!(path, status = status.as_u16(), latency_ms, "Request completed");
        serde_json::from_value(body).with_context(|| format!("Failed to parse {} response", path))
    }
}

#[async_trait::async_trait]
impl PriceDataSource for PriceApiClient {
    async fn fetch_batch_bins(&self, req: &BatchRequest) -> Result<BatchBinsResponse> {
        info!(
            bins = ?req.bins,
            selector = ?req.selector,
            page_size = req.page_size,
            "Fetching batch bins"
        );
        self.get_json("/batch_bins_data", &req.query()).await
    }

    async fn fetch_random_sample(&self, req: &SampleRequest) -> Result<RowsResponse> {
        self.get_json("/random_sample", &req.query()).await
    }

    async fn fetch_filter_data(&self, req: &FilterRequest) -> Result<RowsResponse> {
        self.get_json("/filter_data", &req.query()).await
    }

    async fn fetch_top_tokens(&self, limit: u32) -> Result<Vec<TopToken>> {
        let qp = [("top".to_string(), limit.to_string())];
        let env: DataEnvelope<Vec<TopToken>> = self.get_json("/top_tokens", &qp).await?;
        Ok(env.data)
    }

    async fn fetch_price_ranges(&self, params: &FilterParams) -> Result<PriceRanges> {
        let qp = [
            ("price_type".to_string(), params.price_type.as_str().to_string()),
            ("price_unit".to_string(), params.price_unit.as_str().to_string()),
            ("sol_price".to_string(), params.sol_price.to_string()),
        ];
        let env: DataEnvelope<PriceRanges> = self.get_json("/price_ranges", &qp).await?;
        Ok(env.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash() {
        let client = PriceApiClient::new("http://localhost:8000/api/", Duration::from_secs(5)).unwrap();
        assert_eq!(client.url("/top_tokens"), "http://localhost:8000/api/top_tokens");
    }

    #[test]
    fn test_envelope_parse() {
        let body = r#"{"data": [{"token_mint_address": "abc", "count": 12}], "message": "ok"}"#;
        let env: DataEnvelope<Vec<TopToken>> = serde_json::from_str(body).unwrap();
        assert_eq!(
            env.data,
            vec![TopToken {
                token: "abc".to_string(),
                count: 12
            }]
        );
    }
}
