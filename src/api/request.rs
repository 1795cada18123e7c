//! Request shapes for the price API.
//!
//! Each request validates itself before anything reaches the network and
//! encodes to the query pairs the server expects.

use crate::cache::PageWindow;
use crate::config::MAX_PAGE_SIZE;
use crate::error::{BrowseError, BrowseResult};
use crate::models::{BinId, FilterParams};

/// Which pages a batch bins request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSelector {
    /// First page of every requested bin
    Init,
    SinglePage(u32),
    PageRange { start: u32, end: u32 },
}

impl PageSelector {
    pub fn single(page: u32) -> BrowseResult<Self> {
        if page == 0 {
            return Err(BrowseError::invalid("page numbers start at 1"));
        }
        Ok(Self::SinglePage(page))
    }

    pub fn range(start: u32, end: u32) -> BrowseResult<Self> {
        PageWindow::new(start, end)
            .map(Self::from)
            .ok_or_else(|| BrowseError::invalid(format!("invalid page range {}..{}", start, end)))
    }

    /// Window of pages the response will cover for each bin.
    pub fn window(&self) -> Option<PageWindow> {
        match *self {
            Self::Init => PageWindow::single(1),
            Self::SinglePage(page) => PageWindow::single(page),
            Self::PageRange { start, end } => PageWindow::new(start, end),
        }
    }

    fn push_query(&self, qp: &mut Vec<(String, String)>) {
        match *self {
            Self::Init => qp.push(("mode".to_string(), "init".to_string())),
            Self::SinglePage(page) => qp.push(("page".to_string(), page.to_string())),
            Self::PageRange { start, end } => {
                qp.push(("page_start".to_string(), start.to_string()));
                qp.push(("page_end".to_string(), end.to_string()));
            }
        }
    }
}

impl From<PageWindow> for PageSelector {
    fn from(window: PageWindow) -> Self {
        if window.start == window.end {
            Self::SinglePage(window.start)
        } else {
            Self::PageRange {
                start: window.start,
                end: window.end,
            }
        }
    }
}

pub fn validate_page_size(page_size: u32) -> BrowseResult<()> {
    if page_size == 0 || page_size > MAX_PAGE_SIZE {
        return Err(BrowseError::invalid(format!(
            "page size {} outside 1..={}",
            page_size, MAX_PAGE_SIZE
        )));
    }
    Ok(())
}

fn validate_filters(params: &FilterParams) -> BrowseResult<()> {
    if !(params.sol_price.is_finite() && params.sol_price > 0.0) {
        return Err(BrowseError::invalid(format!(
            "SOL/USD rate must be positive, got {}",
            params.sol_price
        )));
    }
    Ok(())
}

fn push_filters(params: &FilterParams, qp: &mut Vec<(String, String)>) {
    qp.push(("price_type".to_string(), params.price_type.as_str().to_string()));
    qp.push(("price_unit".to_string(), params.price_unit.as_str().to_string()));
    qp.push(("sol_price".to_string(), params.sol_price.to_string()));
}

/// `GET /batch_bins_data`
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRequest {
    pub params: FilterParams,
    pub bins: Vec<BinId>,
    pub page_size: u32,
    pub selector: PageSelector,
}

impl BatchRequest {
    pub fn validate(&self) -> BrowseResult<()> {
        validate_filters(&self.params)?;
        validate_page_size(self.page_size)?;
        if self.bins.is_empty() {
            return Err(BrowseError::invalid("batch request names no bins"));
        }
        if let Some(bin) = self.bins.iter().find(|b| BinId::new(b.0).is_none()) {
            return Err(BrowseError::invalid(format!("unknown bin {}", bin)));
        }
        if matches!(self.selector, PageSelector::PageRange { .. }) && self.bins.len() != 1 {
            return Err(BrowseError::invalid("page ranges are fetched one bin at a time"));
        }
        if self.selector.window().is_none() {
            return Err(BrowseError::invalid(format!("bad page selector {:?}", self.selector)));
        }
        Ok(())
    }

    pub fn query(&self) -> Vec<(String, String)> {
        let mut qp: Vec<(String, String)> = Vec::with_capacity(8);
        push_filters(&self.params, &mut qp);
        let bins: Vec<String> = self.bins.iter().map(|b| b.to_string()).collect();
        qp.push(("bins".to_string(), bins.join(",")));
        qp.push(("page_size".to_string(), self.page_size.to_string()));
        self.selector.push_query(&mut qp);
        qp
    }
}

/// `GET /random_sample`
#[derive(Debug, Clone, PartialEq)]
pub struct SampleRequest {
    pub rows: u32,
    pub tokens: u32,
    pub params: FilterParams,
    pub token: Option<String>,
    pub price_bin: Option<BinId>,
}

impl SampleRequest {
    pub fn validate(&self) -> BrowseResult<()> {
        validate_filters(&self.params)?;
        if !(1..=10_000).contains(&self.rows) {
            return Err(BrowseError::invalid(format!("sample rows {} outside 1..=10000", self.rows)));
        }
        if !(1..=1_000).contains(&self.tokens) {
            return Err(BrowseError::invalid(format!(
                "sample tokens {} outside 1..=1000",
                self.tokens
            )));
        }
        Ok(())
    }

    pub fn query(&self) -> Vec<(String, String)> {
        let mut qp: Vec<(String, String)> = Vec::with_capacity(7);
        qp.push(("rows".to_string(), self.rows.to_string()));
        qp.push(("tokens".to_string(), self.tokens.to_string()));
        push_filters(&self.params, &mut qp);
        if let Some(token) = &self.token {
            qp.push(("token_list".to_string(), token.clone()));
        }
        if let Some(bin) = self.price_bin {
            qp.push(("price_bin".to_string(), bin.to_string()));
        }
        qp
    }
}

/// `GET /filter_data`
#[derive(Debug, Clone, PartialEq)]
pub struct FilterRequest {
    pub params: FilterParams,
    pub token: Option<String>,
    pub page: u32,
    pub page_size: u32,
    pub abnormal_only: bool,
}

impl FilterRequest {
    pub fn validate(&self) -> BrowseResult<()> {
        validate_filters(&self.params)?;
        validate_page_size(self.page_size)?;
        if self.page == 0 {
            return Err(BrowseError::invalid("page numbers start at 1"));
        }
        Ok(())
    }

    pub fn query(&self) -> Vec<(String, String)> {
        let mut qp: Vec<(String, String)> = Vec::with_capacity(7);
        push_filters(&self.params, &mut qp);
        qp.push(("page".to_string(), self.page.to_string()));
        qp.push(("page_size".to_string(), self.page_size.to_string()));
        if let Some(token) = &self.token {
            qp.push(("token_list".to_string(), token.clone()));
        }
        if self.abnormal_only {
            qp.push(("abnormal_only".to_string(), "true".to_string()));
        }
        qp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(selector: PageSelector) -> BatchRequest {
        BatchRequest {
            params: FilterParams::default(),
            bins: vec![BinId(2)],
            page_size: 20,
            selector,
        }
    }

    fn value<'a>(qp: &'a [(String, String)], key: &str) -> Option<&'a str> {
        qp.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_selector_constructors_reject_bad_pages() {
        assert!(PageSelector::single(0).is_err());
        assert!(PageSelector::range(0, 5).is_err());
        assert!(PageSelector::range(6, 5).is_err());
        assert_eq!(PageSelector::range(3, 3).unwrap(), PageSelector::SinglePage(3));
        assert_eq!(
            PageSelector::range(1, 5).unwrap(),
            PageSelector::PageRange { start: 1, end: 5 }
        );
    }

    #[test]
    fn test_selector_windows() {
        assert_eq!(PageSelector::Init.window(), PageWindow::single(1));
        assert_eq!(PageSelector::SinglePage(4).window(), PageWindow::single(4));
        assert_eq!(
            PageSelector::PageRange { start: 6, end: 10 }.window(),
            PageWindow::new(6, 10)
        );
    }

    #[test]
    fn test_batch_query_encodes_exactly_one_mode() {
        let init = batch(PageSelector::Init).query();
        assert_eq!(value(&init, "mode"), Some("init"));
        assert_eq!(value(&init, "page"), None);
        assert_eq!(value(&init, "page_start"), None);

        let range = batch(PageSelector::PageRange { start: 6, end: 10 }).query();
        assert_eq!(value(&range, "page_start"), Some("6"));
        assert_eq!(value(&range, "page_end"), Some("10"));
        assert_eq!(value(&range, "mode"), None);
        assert_eq!(value(&range, "bins"), Some("2"));
        assert_eq!(value(&range, "price_type"), Some("buy_price"));
        assert_eq!(value(&range, "price_unit"), Some("USD"));
        assert_eq!(value(&range, "sol_price"), Some("133"));
    }

    #[test]
    fn test_batch_validation() {
        assert!(batch(PageSelector::Init).validate().is_ok());
        assert!(batch(PageSelector::SinglePage(0)).validate().is_err());
        assert!(batch(PageSelector::PageRange { start: 5, end: 1 }).validate().is_err());

        let mut req = batch(PageSelector::Init);
        req.page_size = 0;
        assert!(req.validate().is_err());
        req.page_size = 201;
        assert!(req.validate().is_err());

        let mut req = batch(PageSelector::PageRange { start: 1, end: 5 });
        req.bins = vec![BinId(1), BinId(2)];
        assert!(req.validate().is_err());

        let mut req = batch(PageSelector::Init);
        req.bins.clear();
        assert!(req.validate().is_err());

        let mut req = batch(PageSelector::Init);
        req.params.sol_price = f64::NAN;
        assert!(matches!(req.validate(), Err(BrowseError::InvalidRequestShape(_))));
    }

    #[test]
    fn test_filter_query_optional_fields() {
        let mut req = FilterRequest {
            params: FilterParams::default(),
            token: None,
            page: 2,
            page_size: 20,
            abnormal_only: false,
        };
        let qp = req.query();
        assert_eq!(value(&qp, "abnormal_only"), None);
        assert_eq!(value(&qp, "token_list"), None);

        req.abnormal_only = true;
        req.token = Some("So11111111111111111111111111111111111111112".to_string());
        let qp = req.query();
        assert_eq!(value(&qp, "abnormal_only"), Some("true"));
        assert!(value(&qp, "token_list").is_some());
    }
}
