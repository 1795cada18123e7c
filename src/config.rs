//! Browser configuration.
//!
//! Defaults match the reference deployment; every field can be overridden from
//! the environment (and again from the command line in the binary).

use std::time::Duration;

use crate::models::{parse_bin_list, BinId, FilterParams, PriceType, PriceUnit, DEFAULT_TAB_ORDER};

/// Largest page size the server accepts.
pub const MAX_PAGE_SIZE: u32 = 200;

#[derive(Debug, Clone)]
pub struct BrowserConfig {
    /// Base URL of the price API, without trailing slash
    pub api_base: String,
    pub request_timeout: Duration,
    /// Pages fetched together per bin window
    pub window_size: u32,
    pub page_size: u32,
    pub filters: FilterParams,
    /// Rows requested by a random sample query
    pub sample_rows: u32,
    /// Distinct tokens requested by a random sample query
    pub sample_tokens: u32,
    pub top_tokens: u32,
    /// Bins in tab order; the first one is active on startup
    pub tab_order: Vec<BinId>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            api_base: "http://localhost:8000/api".to_string(),
            request_timeout: Duration::from_secs(30),
            window_size: 5,
            page_size: 20,
            filters: FilterParams::default(),
            sample_rows: 100,
            sample_tokens: 10,
            top_tokens: 20,
            tab_order: DEFAULT_TAB_ORDER.to_vec(),
        }
    }
}

impl BrowserConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("PRICECHECK_API_BASE") {
            if !v.trim().is_empty() {
                cfg.api_base = v.trim().trim_end_matches('/').to_string();
            }
        }
        if let Ok(v) = std::env::var("PRICECHECK_TIMEOUT_SECS") {
            if let Ok(secs) = v.parse::<u64>() {
                if secs > 0 {
                    cfg.request_timeout = Duration::from_secs(secs);
                }
            }
        }
        if let Ok(v) = std::env::var("PRICECHECK_WINDOW_SIZE") {
            if let Ok(w) = v.parse::<u32>() {
                if w > 0 {
                    cfg.window_size = w;
                }
            }
        }
        if let Ok(v) = std::env::var("PRICECHECK_PAGE_SIZE") {
            if let Ok(size) = v.parse::<u32>() {
                if (1..=MAX_PAGE_SIZE).contains(&size) {
                    cfg.page_size = size;
                }
            }
        }
        if let Ok(v) = std::env::var("PRICECHECK_SOL_PRICE") {
            if let Ok(p) = v.parse::<f64>() {
                if p.is_finite() && p > 0.0 {
                    cfg.filters.sol_price = p;
                }
            }
        }
        if let Ok(v) = std::env::var("PRICECHECK_PRICE_TYPE") {
            if let Ok(t) = v.parse::<PriceType>() {
                cfg.filters.price_type = t;
            }
        }
        if let Ok(v) = std::env::var("PRICECHECK_PRICE_UNIT") {
            if let Ok(u) = v.parse::<PriceUnit>() {
                cfg.filters.price_unit = u;
            }
        }
        if let Ok(v) = std::env::var("PRICECHECK_SAMPLE_ROWS") {
            if let Ok(n) = v.parse::<u32>() {
                if (1..=10_000).contains(&n) {
                    cfg.sample_rows = n;
                }
            }
        }
        if let Ok(v) = std::env::var("PRICECHECK_SAMPLE_TOKENS") {
            if let Ok(n) = v.parse::<u32>() {
                if (1..=1_000).contains(&n) {
                    cfg.sample_tokens = n;
                }
            }
        }
        if let Ok(v) = std::env::var("PRICECHECK_TOP_TOKENS") {
            if let Ok(n) = v.parse::<u32>() {
                if n > 0 {
                    cfg.top_tokens = n;
                }
            }
        }
        if let Ok(v) = std::env::var("PRICECHECK_TAB_ORDER") {
            if let Ok(bins) = parse_bin_list(&v) {
                cfg.tab_order = bins;
            }
        }

        cfg
    }

    /// Bin shown when the browser starts.
    pub fn default_bin(&self) -> BinId {
        self.tab_order.first().copied().unwrap_or(BinId(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = BrowserConfig::default();
        assert_eq!(cfg.window_size, 5);
        assert_eq!(cfg.page_size, 20);
        assert_eq!(cfg.default_bin(), BinId(4));
        assert_eq!(cfg.tab_order.len(), BinId::COUNT);
        assert_eq!(cfg.filters.sol_price, 133.0);
    }

    #[test]
    fn test_empty_tab_order_falls_back_to_first_bin() {
        let cfg = BrowserConfig {
            tab_order: vec![],
            ..Default::default()
        };
        assert_eq!(cfg.default_bin(), BinId(0));
    }
}
