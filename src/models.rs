use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// One transaction record. The cache never looks inside it.
pub type Row = serde_json::Value;

const BIN_LABELS: [&str; 6] = [
    "0-10 USD",
    "10-100 USD",
    "100-1K USD",
    "1K-10K USD",
    "10K-100K USD",
    "100K+ USD",
];

/// Tab and preload order used when nothing else is configured.
pub const DEFAULT_TAB_ORDER: [BinId; 6] = [
    BinId(4),
    BinId(3),
    BinId(2),
    BinId(5),
    BinId(1),
    BinId(0),
];

/// Identifier of a fixed USD price bin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BinId(pub u8);

impl BinId {
    pub const COUNT: usize = BIN_LABELS.len();

    pub fn new(idx: u8) -> Option<Self> {
        ((idx as usize) < Self::COUNT).then_some(Self(idx))
    }

    pub fn all() -> impl Iterator<Item = BinId> {
        (0..Self::COUNT as u8).map(BinId)
    }

    pub fn index(&self) -> usize {
        self.0 as usize
    }

    pub fn label(&self) -> &'static str {
        BIN_LABELS.get(self.index()).copied().unwrap_or("unknown bin")
    }
}

impl fmt::Display for BinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BinId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let idx: u8 = s
            .trim()
            .parse()
            .map_err(|e| format!("invalid bin '{}': {}", s, e))?;
        BinId::new(idx).ok_or_else(|| format!("bin {} out of range (0..{})", idx, BinId::COUNT))
    }
}

/// Parse a comma-separated bin list such as `4,3,2,5,1,0`.
pub fn parse_bin_list(s: &str) -> Result<Vec<BinId>, String> {
    let bins = s
        .split(',')
        .filter(|p| !p.trim().is_empty())
        .map(BinId::from_str)
        .collect::<Result<Vec<_>, _>>()?;
    if bins.is_empty() {
        return Err("bin list is empty".to_string());
    }
    Ok(bins)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceType {
    BuyPrice,
    SellPrice,
}

impl PriceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriceType::BuyPrice => "buy_price",
            PriceType::SellPrice => "sell_price",
        }
    }
}

impl FromStr for PriceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buy" | "buy_price" => Ok(PriceType::BuyPrice),
            "sell" | "sell_price" => Ok(PriceType::SellPrice),
            other => Err(format!("unknown price type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PriceUnit {
    #[serde(rename = "SOL")]
    Sol,
    #[serde(rename = "USD")]
    Usd,
}

impl PriceUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriceUnit::Sol => "SOL",
            PriceUnit::Usd => "USD",
        }
    }
}

impl FromStr for PriceUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SOL" => Ok(PriceUnit::Sol),
            "USD" => Ok(PriceUnit::Usd),
            other => Err(format!("unknown price unit '{}'", other)),
        }
    }
}

/// Global filter parameters. Any change invalidates every cached bin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterParams {
    pub price_type: PriceType,
    pub price_unit: PriceUnit,
    /// SOL/USD conversion rate
    pub sol_price: f64,
}

impl Default for FilterParams {
    fn default() -> Self {
        Self {
            price_type: PriceType::BuyPrice,
            price_unit: PriceUnit::Usd,
            sol_price: 133.0,
        }
    }
}

/// Bin statistics computed by the server over the whole filtered set.
///
/// Every statistic is optional: the server maps NaN and infinities to null,
/// and older endpoints only send the single-currency `avg`/`min`/`max`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub avg_usd: Option<f64>,
    #[serde(default)]
    pub avg_sol: Option<f64>,
    #[serde(default)]
    pub min_usd: Option<f64>,
    #[serde(default)]
    pub min_sol: Option<f64>,
    #[serde(default)]
    pub max_usd: Option<f64>,
    #[serde(default)]
    pub max_sol: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

/// Per-bin payload of the batch bins endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BinPayload {
    #[serde(default)]
    pub pages: HashMap<u32, Vec<Row>>,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub summary: Option<Summary>,
    #[serde(default)]
    pub low: Option<f64>,
    #[serde(default)]
    pub high: Option<f64>,
}

pub type BatchBinsResponse = HashMap<BinId, BinPayload>;

/// Response shape shared by the random sample and filter endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RowsResponse {
    #[serde(default)]
    pub data: Vec<Row>,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub summary: Option<Summary>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub page_size: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopToken {
    #[serde(rename = "token_mint_address")]
    pub token: String,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceRange {
    pub label: String,
    pub low: Option<f64>,
    pub high: Option<f64>,
    pub count: u64,
    pub percent: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceRanges {
    pub bins: Vec<PriceRange>,
    pub unit: String,
    pub total: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bin_labels() {
        let b = BinId::new(2).unwrap();
        assert_eq!(b.label(), "100-1K USD");
        assert_eq!(BinId(5).label(), "100K+ USD");
        assert_eq!(BinId(9).label(), "unknown bin");
        assert!(BinId::new(6).is_none());
    }

    #[test]
    fn test_parse_bin_list() {
        assert_eq!(parse_bin_list("4, 3,2").unwrap(), vec![BinId(4), BinId(3), BinId(2)]);
        assert!(parse_bin_list("4,9").is_err());
        assert!(parse_bin_list("").is_err());
    }

    #[test]
    fn test_batch_response_with_string_keys() {
        let body = r#"{
            "4": {"pages": {"1": [{"id": 1}], "2": []}, "total": 41, "low": 10000.0, "high": 100000.0,
                  "summary": {"count": 41, "avg_usd": 12.5, "avg_sol": null}}
        }"#;
        let parsed: BatchBinsResponse = serde_json::from_str(body).unwrap();
        let bin = &parsed[&BinId(4)];
        assert_eq!(bin.total, 41);
        assert_eq!(bin.pages[&1].len(), 1);
        assert!(bin.pages[&2].is_empty());
        let summary = bin.summary.as_ref().unwrap();
        assert_eq!(summary.count, 41);
        assert_eq!(summary.avg_sol, None);
    }

    #[test]
    fn test_price_type_parse() {
        assert_eq!("sell".parse::<PriceType>().unwrap(), PriceType::SellPrice);
        assert_eq!("buy_price".parse::<PriceType>().unwrap(), PriceType::BuyPrice);
        assert!("mid".parse::<PriceType>().is_err());
        assert_eq!("sol".parse::<PriceUnit>().unwrap(), PriceUnit::Sol);
    }
}
