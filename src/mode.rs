//! Browsing modes and the controller switching between them.
//!
//! Exactly one mode is active. `Browse` pages through the bin cache, `Sample`
//! holds a one-shot random sample and pages it locally, and `Abnormal` pages
//! the server-filtered anomalous subset with no local cache.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::api::request::validate_page_size;
use crate::api::{FilterRequest, PriceDataSource, SampleRequest};
use crate::cache::{BinStoreSet, PageRows};
use crate::config::BrowserConfig;
use crate::coordinator::{FetchCoordinator, FetchOutcome, FetchTask};
use crate::error::{BrowseError, BrowseResult};
use crate::models::{BinId, FilterParams, PriceType, PriceUnit, Row, Summary, TopToken};
use crate::pagination::{PageContent, PageRequest, PageView, PaginationAdapter, PaginationMeta};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeKind {
    Browse,
    Sample,
    Abnormal,
}

impl fmt::Display for ModeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ModeKind::Browse => "browse",
            ModeKind::Sample => "sample",
            ModeKind::Abnormal => "abnormal",
        };
        f.write_str(s)
    }
}

/// Random sample held entirely client-side.
#[derive(Debug, Clone)]
pub struct SampleView {
    pub rows: Arc<Vec<Row>>,
    /// Size of the population the sample was drawn from
    pub population: u64,
    pub summary: Option<Summary>,
    pub page: u32,
    pub page_size: u32,
}

impl SampleView {
    /// A fresh sample always starts on page 1.
    pub fn new(rows: Vec<Row>, population: u64, summary: Option<Summary>, page_size: u32) -> Self {
        Self {
            rows: Arc::new(rows),
            population,
            summary,
            page: 1,
            page_size,
        }
    }

    pub fn page_view(&self) -> PageView {
        let len = self.rows.len();
        let start = (self.page.saturating_sub(1) as usize)
            .saturating_mul(self.page_size as usize)
            .min(len);
        let end = start.saturating_add(self.page_size as usize).min(len);
        PageView {
            mode: ModeKind::Sample,
            content: PageContent::Ready(Arc::new(self.rows[start..end].to_vec())),
            meta: PaginationMeta {
                current: self.page,
                page_size: self.page_size,
                total: len as u64,
            },
            summary: self.summary.clone(),
        }
    }
}

/// Current page of the anomalous subset.
#[derive(Debug, Clone)]
pub struct AbnormalView {
    pub rows: PageRows,
    pub total: u64,
    pub summary: Option<Summary>,
    pub page: u32,
    pub page_size: u32,
}

impl AbnormalView {
    pub fn page_view(&self) -> PageView {
        PageView {
            mode: ModeKind::Abnormal,
            content: PageContent::Ready(Arc::clone(&self.rows)),
            meta: PaginationMeta {
                current: self.page,
                page_size: self.page_size,
                total: self.total,
            },
            summary: self.summary.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Mode {
    Browse,
    Sample(SampleView),
    Abnormal(AbnormalView),
}

impl Mode {
    pub fn kind(&self) -> ModeKind {
        match self {
            Mode::Browse => ModeKind::Browse,
            Mode::Sample(_) => ModeKind::Sample,
            Mode::Abnormal(_) => ModeKind::Abnormal,
        }
    }
}

/// Owns the browsing state and runs every user action.
///
/// Background prefetches are kept as tasks; [`ModeController::settle`] waits
/// for them and hands back their failures.
pub struct ModeController {
    coordinator: Arc<FetchCoordinator>,
    adapter: PaginationAdapter,
    mode: Mode,
    filters: FilterParams,
    token: Option<String>,
    tab_order: Vec<BinId>,
    active_bin: BinId,
    /// Browse page; the cache generation carries the browse page size
    page: u32,
    sample_page_size: u32,
    sample_rows: u32,
    sample_tokens: u32,
    top_tokens_limit: u32,
    top_tokens: Vec<TopToken>,
    background: Vec<FetchTask>,
}

impl ModeController {
    pub fn new(source: Arc<dyn PriceDataSource>, cfg: &BrowserConfig) -> Self {
        let stores = BinStoreSet::shared(cfg.filters, cfg.page_size);
        let coordinator = Arc::new(FetchCoordinator::new(source, stores, cfg.window_size));
        let tab_order = if cfg.tab_order.is_empty() {
            BinId::all().collect()
        } else {
            cfg.tab_order.clone()
        };

        Self {
            adapter: PaginationAdapter::new(Arc::clone(&coordinator)),
            coordinator,
            mode: Mode::Browse,
            filters: cfg.filters,
            token: None,
            active_bin: cfg.default_bin(),
            tab_order,
            page: 1,
            sample_page_size: cfg.page_size,
            sample_rows: cfg.sample_rows,
            sample_tokens: cfg.sample_tokens,
            top_tokens_limit: cfg.top_tokens,
            top_tokens: Vec::new(),
            background: Vec::new(),
        }
    }

    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    pub fn mode_kind(&self) -> ModeKind {
        self.mode.kind()
    }

    pub fn coordinator(&self) -> &Arc<FetchCoordinator> {
        &self.coordinator
    }

    pub fn filters(&self) -> &FilterParams {
        &self.filters
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn tab_order(&self) -> &[BinId] {
        &self.tab_order
    }

    pub fn active_bin(&self) -> BinId {
        self.active_bin
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.coordinator.generation().page_size
    }

    pub fn top_tokens(&self) -> &[TopToken] {
        &self.top_tokens
    }

    pub fn pending_fetches(&self) -> usize {
        self.background.iter().filter(|t| !t.is_finished()).count()
    }

    /// Initial fetch of every tab's first page, then warm the active bin.
    pub async fn start(&mut self) -> BrowseResult<()> {
        info!(bins = ?self.tab_order, active = self.active_bin.0, "Starting browser");
        self.load_initial().await
    }

    /// Draw a random sample and switch to `Sample`.
    pub async fn query(&mut self) -> BrowseResult<usize> {
        let req = SampleRequest {
            rows: self.sample_rows,
            tokens: self.sample_tokens,
            params: self.filters,
            token: self.token.clone(),
            price_bin: Some(self.active_bin),
        };
        if let Err(e) = req.validate() {
            warn!(error = %e, "Rejected sample query");
            return Err(e);
        }

        let resp = self
            .coordinator
            .source()
            .fetch_random_sample(&req)
            .await
            .map_err(|e| {
                warn!(error = %e, "Random sample fetch failed");
                BrowseError::NetworkFailure(e)
            })?;

        let count = resp.data.len();
        self.mode = Mode::Sample(SampleView::new(
            resp.data,
            resp.total,
            resp.summary,
            self.sample_page_size,
        ));
        info!(rows = count, bin = self.active_bin.0, "Entered sample mode");
        Ok(count)
    }

    /// Enter `Abnormal` on the current browse page, or leave it for `Browse`
    /// and refetch the current page.
    ///
    /// Leaving always succeeds in switching modes; a failed refetch is
    /// returned but the cached pages stay as they were.
    pub async fn toggle_abnormal(&mut self) -> BrowseResult<ModeKind> {
        if matches!(self.mode, Mode::Abnormal(_)) {
            self.mode = Mode::Browse;
            info!("Left abnormal mode");
            self.refresh_current_page().await?;
            return Ok(ModeKind::Browse);
        }

        let req = FilterRequest {
            params: self.filters,
            token: self.token.clone(),
            page: self.page,
            page_size: self.page_size(),
            abnormal_only: true,
        };
        if let Err(e) = req.validate() {
            warn!(error = %e, "Rejected abnormal request");
            return Err(e);
        }
        let resp = self
            .coordinator
            .source()
            .fetch_filter_data(&req)
            .await
            .map_err(|e| {
                warn!(error = %e, "Abnormal fetch failed");
                BrowseError::NetworkFailure(e)
            })?;

        info!(rows = resp.data.len(), total = resp.total, "Entered abnormal mode");
        self.mode = Mode::Abnormal(AbnormalView {
            rows: Arc::new(resp.data),
            total: resp.total,
            summary: resp.summary,
            page: req.page,
            page_size: req.page_size,
        });
        Ok(ModeKind::Abnormal)
    }

    /// Back to `Browse`, refreshing the current page under current filters.
    pub async fn reset(&mut self) -> BrowseResult<()> {
        if !matches!(self.mode, Mode::Browse) {
            info!(from = %self.mode.kind(), "Reset to browse mode");
        }
        self.mode = Mode::Browse;
        self.refresh_current_page().await
    }

    /// Activate another bin tab. In `Browse` the bin is fetched and warmed;
    /// other modes only remember it for the next sample query.
    pub async fn switch_bin(&mut self, bin: BinId) -> BrowseResult<()> {
        if BinId::new(bin.0).is_none() {
            return Err(BrowseError::invalid(format!("unknown bin {}", bin)));
        }
        self.active_bin = bin;
        self.page = 1;
        debug!(bin = bin.0, mode = %self.mode.kind(), "Switched bin");

        if matches!(self.mode, Mode::Browse) {
            let page_size = self.page_size();
            if let Some(task) = self.coordinator.switch_bin(bin, page_size).await? {
                self.background.push(task);
            }
        }
        Ok(())
    }

    pub async fn set_price_type(&mut self, price_type: PriceType) -> BrowseResult<()> {
        let filters = FilterParams {
            price_type,
            ..self.filters
        };
        self.set_filters(filters).await
    }

    pub async fn set_price_unit(&mut self, price_unit: PriceUnit) -> BrowseResult<()> {
        let filters = FilterParams {
            price_unit,
            ..self.filters
        };
        self.set_filters(filters).await
    }

    pub async fn set_sol_price(&mut self, sol_price: f64) -> BrowseResult<()> {
        let filters = FilterParams {
            sol_price,
            ..self.filters
        };
        self.set_filters(filters).await
    }

    /// Filter changes invalidate every bin. Only `Browse` refetches; sample
    /// and abnormal results stay until their action is repeated.
    async fn set_filters(&mut self, filters: FilterParams) -> BrowseResult<()> {
        if !(filters.sol_price.is_finite() && filters.sol_price > 0.0) {
            let e = BrowseError::invalid(format!("SOL/USD rate must be positive, got {}", filters.sol_price));
            warn!(error = %e, "Rejected filter change");
            return Err(e);
        }
        if filters == self.filters {
            return Ok(());
        }

        self.filters = filters;
        self.page = 1;
        let page_size = self.page_size();
        self.coordinator.rekey(filters, page_size);

        if matches!(self.mode, Mode::Browse) {
            self.load_initial().await?;
        }
        Ok(())
    }

    /// Cached pages were sized under the old page size, so every bin is
    /// dropped and reloaded from its first page.
    pub async fn set_page_size(&mut self, page_size: u32) -> BrowseResult<()> {
        if let Err(e) = validate_page_size(page_size) {
            warn!(error = %e, "Rejected page size change");
            return Err(e);
        }
        if page_size == self.page_size() {
            return Ok(());
        }

        info!(page_size, "Page size changed, reloading bins");
        self.page = 1;
        self.coordinator.rekey(self.filters, page_size);
        self.load_initial().await
    }

    pub fn set_token(&mut self, token: Option<String>) {
        self.token = token.filter(|t| !t.trim().is_empty());
    }

    pub async fn load_top_tokens(&mut self) -> BrowseResult<&[TopToken]> {
        let tokens = self
            .coordinator
            .source()
            .fetch_top_tokens(self.top_tokens_limit)
            .await
            .map_err(|e| {
                warn!(error = %e, "Top tokens fetch failed");
                BrowseError::NetworkFailure(e)
            })?;
        self.top_tokens = tokens;
        Ok(&self.top_tokens)
    }

    /// Page `page` at `page_size` from the active mode.
    pub async fn request_page(&mut self, page: u32, page_size: u32) -> BrowseResult<PageView> {
        if page == 0 {
            let e = BrowseError::invalid("page numbers start at 1");
            warn!(error = %e, "Rejected page request");
            return Err(e);
        }
        validate_page_size(page_size)?;

        if matches!(self.mode, Mode::Browse) {
            if page_size != self.page_size() {
                self.set_page_size(page_size).await?;
            }
            self.page = page;
        }

        let req = PageRequest {
            bin: self.active_bin,
            page,
            page_size,
            filters: &self.filters,
            token: self.token.as_deref(),
        };
        let (view, task) = self.adapter.request_page(&mut self.mode, &req).await?;
        if let Some(task) = task {
            self.background.push(task);
        }
        Ok(view)
    }

    /// Wait for every background fetch and return the failures.
    pub async fn settle(&mut self) -> Vec<BrowseError> {
        let mut errors = Vec::new();
        for task in self.background.drain(..) {
            match task.await {
                Ok(Ok(FetchOutcome::Stale)) => debug!("Background fetch went stale"),
                Ok(Ok(outcome)) => debug!(?outcome, "Background fetch finished"),
                Ok(Err(e)) => {
                    warn!(error = %e, kind = e.kind(), "Background fetch failed");
                    errors.push(e);
                }
                Err(e) => {
                    warn!(error = %e, "Background fetch task aborted");
                    errors.push(BrowseError::NetworkFailure(anyhow::Error::new(e)));
                }
            }
        }
        errors
    }

    async fn load_initial(&mut self) -> BrowseResult<()> {
        let page_size = self.page_size();
        self.coordinator
            .initial_fetch(&self.tab_order, page_size)
            .await?;
        if let Some(task) = self.coordinator.switch_bin(self.active_bin, page_size).await? {
            self.background.push(task);
        }
        Ok(())
    }

    async fn refresh_current_page(&mut self) -> BrowseResult<()> {
        let page_size = self.page_size();
        self.coordinator
            .refresh_window(self.active_bin, self.page, page_size)
            .await?;
        Ok(())
    }
}
