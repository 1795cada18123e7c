//! Per-bin page storage.
//!
//! `BinPageStore` holds what has been fetched for one bin. `BinStoreSet` holds
//! every bin under one cache generation: the filter parameters and page size
//! the pages were fetched with, plus an epoch bumped on every invalidation.
//! Fetch results carry the epoch they were issued under and are dropped when
//! it no longer matches.

use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

use super::ranges::{LoadedRanges, PageWindow};
use crate::models::{BinId, FilterParams, Row, Summary};

pub type PageRows = Arc<Vec<Row>>;

/// Pages, coverage and statistics loaded for one bin.
#[derive(Debug, Clone, Default)]
pub struct BinPageStore {
    pages: BTreeMap<u32, PageRows>,
    total: u64,
    summary: Option<Summary>,
    loaded: LoadedRanges,
}

impl BinPageStore {
    /// Rows of `page`, or `None` (a miss) when no loaded window covers it.
    pub fn get_page(&self, page: u32) -> Option<PageRows> {
        if !self.loaded.contains(page) {
            return None;
        }
        self.pages.get(&page).cloned()
    }

    pub fn covers_window(&self, window: &PageWindow) -> bool {
        self.loaded.covers(window)
    }

    /// Fold a fetched window into the store.
    ///
    /// Pages of the window absent from `pages` lie past the end of the bin and
    /// are stored empty. Pages outside the window are ignored. `total` and
    /// `summary` describe the whole bin, so the latest result wins.
    pub fn apply_fetch_result(
        &mut self,
        window: PageWindow,
        mut pages: HashMap<u32, Vec<Row>>,
        total: u64,
        summary: Option<Summary>,
    ) {
        for page in window.pages() {
            let rows = pages.remove(&page).unwrap_or_default();
            self.pages.insert(page, Arc::new(rows));
        }
        if !pages.is_empty() {
            debug!(
                window = %window,
                extra = pages.len(),
                "Ignoring pages outside the fetched window"
            );
        }
        self.total = total;
        self.summary = summary;
        self.loaded.insert(window);
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn summary(&self) -> Option<&Summary> {
        self.summary.as_ref()
    }

    pub fn loaded_ranges(&self) -> &LoadedRanges {
        &self.loaded
    }
}

/// Key every cached page was fetched under.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Generation {
    pub epoch: u64,
    pub params: FilterParams,
    pub page_size: u32,
}

/// All bin stores of the current generation.
#[derive(Debug)]
pub struct BinStoreSet {
    generation: Generation,
    bins: HashMap<BinId, BinPageStore>,
}

pub type SharedStores = Arc<RwLock<BinStoreSet>>;

impl BinStoreSet {
    pub fn new(params: FilterParams, page_size: u32) -> Self {
        Self {
            generation: Generation {
                epoch: 0,
                params,
                page_size,
            },
            bins: HashMap::new(),
        }
    }

    pub fn shared(params: FilterParams, page_size: u32) -> SharedStores {
        Arc::new(RwLock::new(Self::new(params, page_size)))
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn epoch(&self) -> u64 {
        self.generation.epoch
    }

    pub fn bin(&self, bin: BinId) -> Option<&BinPageStore> {
        self.bins.get(&bin)
    }

    pub fn get_page(&self, bin: BinId, page: u32) -> Option<PageRows> {
        self.bins.get(&bin).and_then(|s| s.get_page(page))
    }

    pub fn covers_window(&self, bin: BinId, window: &PageWindow) -> bool {
        self.bins
            .get(&bin)
            .map_or(false, |s| s.covers_window(window))
    }

    pub fn total(&self, bin: BinId) -> u64 {
        self.bins.get(&bin).map_or(0, |s| s.total())
    }

    pub fn summary(&self, bin: BinId) -> Option<Summary> {
        self.bins.get(&bin).and_then(|s| s.summary().cloned())
    }

    /// Apply a fetch issued under `epoch`. Returns `false` (and leaves the
    /// store untouched) when the generation has moved on since.
    pub fn apply_fetch_result(
        &mut self,
        epoch: u64,
        bin: BinId,
        window: PageWindow,
        pages: HashMap<u32, Vec<Row>>,
        total: u64,
        summary: Option<Summary>,
    ) -> bool {
        if epoch != self.generation.epoch {
            warn!(
                bin = bin.0,
                window = %window,
                fetch_epoch = epoch,
                current_epoch = self.generation.epoch,
                "Dropping stale fetch result"
            );
            return false;
        }
        self.bins
            .entry(bin)
            .or_default()
            .apply_fetch_result(window, pages, total, summary);
        true
    }

    /// Drop every bin's store, keeping the current key.
    pub fn invalidate_all(&mut self) -> Generation {
        let (params, page_size) = (self.generation.params, self.generation.page_size);
        self.rekey(params, page_size)
    }

    /// Start a new generation under a new key. Every bin is dropped and every
    /// fetch still in flight becomes stale.
    pub fn rekey(&mut self, params: FilterParams, page_size: u32) -> Generation {
        self.bins.clear();
        self.generation = Generation {
            epoch: self.generation.epoch + 1,
            params,
            page_size,
        };
        debug!(
            epoch = self.generation.epoch,
            sol_price = params.sol_price,
            price_type = params.price_type.as_str(),
            price_unit = params.price_unit.as_str(),
            page_size,
            "Bin caches invalidated"
        );
        self.generation
    }
}
