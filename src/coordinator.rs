//! Fetch coordination for the bin page cache.
//!
//! Every page request is widened to the aligned window containing it, so a
//! bin is fetched at most once per window. Requests snapshot the cache
//! generation when issued; a response is merged only if that generation is
//! still current when it arrives.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::request::validate_page_size;
use crate::api::{BatchRequest, PageSelector, PriceDataSource};
use crate::cache::{Generation, PageWindow, SharedStores};
use crate::error::{BrowseError, BrowseResult};
use crate::models::{BinId, FilterParams};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Already covered; nothing was requested
    Cached,
    Loaded(PageWindow),
    /// The cache was invalidated while the request was in flight; the
    /// response was dropped
    Stale,
}

pub type FetchTask = JoinHandle<BrowseResult<FetchOutcome>>;

pub struct FetchCoordinator {
    source: Arc<dyn PriceDataSource>,
    stores: SharedStores,
    window_size: u32,
}

impl FetchCoordinator {
    pub fn new(source: Arc<dyn PriceDataSource>, stores: SharedStores, window_size: u32) -> Self {
        Self {
            source,
            stores,
            window_size: window_size.max(1),
        }
    }

    pub fn source(&self) -> &Arc<dyn PriceDataSource> {
        &self.source
    }

    pub fn stores(&self) -> &SharedStores {
        &self.stores
    }

    pub fn window_size(&self) -> u32 {
        self.window_size
    }

    pub fn generation(&self) -> Generation {
        self.stores.read().generation()
    }

    /// Aligned window holding `page`.
    pub fn window_for(&self, page: u32) -> BrowseResult<PageWindow> {
        PageWindow::aligned(page, self.window_size)
            .ok_or_else(|| BrowseError::invalid(format!("page {} is not a valid page number", page)))
    }

    /// Start a new cache generation. In-flight fetches become stale.
    pub fn rekey(&self, params: FilterParams, page_size: u32) -> Generation {
        self.stores.write().rekey(params, page_size)
    }

    /// Make sure the window holding `page` is cached for `bin`, fetching it
    /// in one request if it is not.
    pub async fn ensure_window_loaded(
        &self,
        bin: BinId,
        page: u32,
        page_size: u32,
    ) -> BrowseResult<FetchOutcome> {
        let generation = self.current_generation(page_size)?;
        self.ensure_window_loaded_in(generation, bin, page).await
    }

    /// [`Self::ensure_window_loaded`] under a generation captured earlier,
    /// typically before the calling task was spawned.
    pub async fn ensure_window_loaded_in(
        &self,
        generation: Generation,
        bin: BinId,
        page: u32,
    ) -> BrowseResult<FetchOutcome> {
        let window = self.window_for(page)?;
        {
            let stores = self.stores.read();
            if stores.epoch() != generation.epoch {
                return Ok(FetchOutcome::Stale);
            }
            if stores.covers_window(bin, &window) {
                debug!(bin = bin.0, page, window = %window, "Window cached");
                return Ok(FetchOutcome::Cached);
            }
        }
        self.fetch(generation, vec![bin], PageSelector::from(window))
            .await
    }

    /// Fetch the window holding `page` even if it is cached, overwriting the
    /// cached pages.
    pub async fn refresh_window(
        &self,
        bin: BinId,
        page: u32,
        page_size: u32,
    ) -> BrowseResult<FetchOutcome> {
        let window = self.window_for(page)?;
        let generation = self.current_generation(page_size)?;
        self.fetch(generation, vec![bin], PageSelector::from(window))
            .await
    }

    /// First page of every bin in one request.
    pub async fn initial_fetch(&self, bins: &[BinId], page_size: u32) -> BrowseResult<FetchOutcome> {
        let generation = self.current_generation(page_size)?;
        self.fetch(generation, bins.to_vec(), PageSelector::Init)
            .await
    }

    /// First page of a single bin.
    pub async fn fetch_first_page(&self, bin: BinId, page_size: u32) -> BrowseResult<FetchOutcome> {
        let generation = self.current_generation(page_size)?;
        self.fetch(generation, vec![bin], PageSelector::SinglePage(1))
            .await
    }

    /// Pages `2..=W` of the first window, the part the initial and
    /// single-page fetches leave out.
    pub async fn prefetch_window_tail(
        &self,
        generation: Generation,
        bin: BinId,
    ) -> BrowseResult<FetchOutcome> {
        let tail = match PageWindow::new(2, self.window_size) {
            Some(tail) => tail,
            None => return Ok(FetchOutcome::Cached),
        };
        {
            let stores = self.stores.read();
            if stores.epoch() != generation.epoch {
                return Ok(FetchOutcome::Stale);
            }
            if stores.covers_window(bin, &tail) {
                return Ok(FetchOutcome::Cached);
            }
        }
        self.fetch(generation, vec![bin], PageSelector::from(tail))
            .await
    }

    /// Run [`Self::prefetch_window_tail`] in the background under the
    /// generation current at spawn time.
    pub fn spawn_prefetch(self: &Arc<Self>, bin: BinId, page_size: u32) -> BrowseResult<FetchTask> {
        let generation = self.current_generation(page_size)?;
        let this = Arc::clone(self);
        Ok(tokio::spawn(async move {
            this.prefetch_window_tail(generation, bin).await
        }))
    }

    /// Run [`Self::ensure_window_loaded`] in the background under the
    /// generation current at spawn time.
    pub fn spawn_window_load(self: &Arc<Self>, bin: BinId, page: u32, page_size: u32) -> BrowseResult<FetchTask> {
        let generation = self.current_generation(page_size)?;
        let this = Arc::clone(self);
        Ok(tokio::spawn(async move {
            this.ensure_window_loaded_in(generation, bin, page).await
        }))
    }

    /// Activate `bin`: fetch its first page if missing, then prefetch the rest
    /// of the first window in the background unless already cached.
    pub async fn switch_bin(self: &Arc<Self>, bin: BinId, page_size: u32) -> BrowseResult<Option<FetchTask>> {
        let has_first_page = self.stores.read().get_page(bin, 1).is_some();
        if !has_first_page {
            self.fetch_first_page(bin, page_size).await?;
        }

        let tail_cached = PageWindow::new(2, self.window_size)
            .map_or(true, |tail| self.stores.read().covers_window(bin, &tail));
        if tail_cached {
            debug!(bin = bin.0, "Bin already warm");
            return Ok(None);
        }
        self.spawn_prefetch(bin, page_size).map(Some)
    }

    fn current_generation(&self, page_size: u32) -> BrowseResult<Generation> {
        validate_page_size(page_size)?;
        let generation = self.generation();
        if generation.page_size != page_size {
            return Err(BrowseError::invalid(format!(
                "page size {} does not match the cached page size {}",
                page_size, generation.page_size
            )));
        }
        Ok(generation)
    }

    async fn fetch(
        &self,
        generation: Generation,
        bins: Vec<BinId>,
        selector: PageSelector,
    ) -> BrowseResult<FetchOutcome> {
        let req = BatchRequest {
            params: generation.params,
            bins,
            page_size: generation.page_size,
            selector,
        };
        if let Err(e) = req.validate() {
            warn!(error = %e, bins = ?req.bins, "Rejected batch request");
            return Err(e);
        }
        let window = req
            .selector
            .window()
            .ok_or_else(|| BrowseError::invalid(format!("bad page selector {:?}", req.selector)))?;

        if self.stores.read().epoch() != generation.epoch {
            debug!(bins = ?req.bins, window = %window, "Cache generation moved on before the fetch was issued");
            return Ok(FetchOutcome::Stale);
        }
        info!(
            bins = ?req.bins,
            window = %window,
            epoch = generation.epoch,
            "Issuing bin fetch"
        );
        let mut resp = self.source.fetch_batch_bins(&req).await.map_err(|e| {
            warn!(bins = ?req.bins, window = %window, error = %e, "Bin fetch failed");
            BrowseError::NetworkFailure(e)
        })?;

        let mut stores = self.stores.write();
        if stores.epoch() != generation.epoch {
            warn!(
                bins = ?req.bins,
                window = %window,
                fetch_epoch = generation.epoch,
                current_epoch = stores.epoch(),
                "Discarding fetch for an invalidated cache generation"
            );
            return Ok(FetchOutcome::Stale);
        }
        if let Some(&bin) = req.bins.iter().find(|b| !resp.contains_key(b)) {
            warn!(bin = bin.0, window = %window, "Response missing bin data");
            return Err(BrowseError::MissingBinData { bin });
        }
        for bin in &req.bins {
            if let Some(payload) = resp.remove(bin) {
                stores.apply_fetch_result(
                    generation.epoch,
                    *bin,
                    window,
                    payload.pages,
                    payload.total,
                    payload.summary,
                );
            }
        }
        debug!(bins = ?req.bins, window = %window, "Bin fetch merged");
        Ok(FetchOutcome::Loaded(window))
    }
}
