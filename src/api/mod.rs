//! Price API collaborator.
//!
//! The browsing engine only talks to the server through [`PriceDataSource`];
//! [`PriceApiClient`] is the HTTP implementation.

pub mod client;
pub mod request;

use anyhow::Result;

use crate::models::{BatchBinsResponse, FilterParams, PriceRanges, RowsResponse, TopToken};

pub use client::PriceApiClient;
pub use request::{BatchRequest, FilterRequest, PageSelector, SampleRequest};

#[async_trait::async_trait]
pub trait PriceDataSource: Send + Sync {
    async fn fetch_batch_bins(&self, req: &BatchRequest) -> Result<BatchBinsResponse>;

    async fn fetch_random_sample(&self, req: &SampleRequest) -> Result<RowsResponse>;

    async fn fetch_filter_data(&self, req: &FilterRequest) -> Result<RowsResponse>;

    async fn fetch_top_tokens(&self, limit: u32) -> Result<Vec<TopToken>>;

    async fn fetch_price_ranges(&self, params: &FilterParams) -> Result<PriceRanges>;
}
