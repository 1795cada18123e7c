//! Page requests from the UI, answered according to the active mode.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::api::request::validate_page_size;
use crate::api::FilterRequest;
use crate::cache::PageRows;
use crate::coordinator::{FetchCoordinator, FetchTask};
use crate::error::{BrowseError, BrowseResult};
use crate::mode::{AbnormalView, Mode, ModeKind, SampleView};
use crate::models::{BinId, FilterParams, Summary};

#[derive(Debug, Clone, PartialEq)]
pub enum PageContent {
    Ready(PageRows),
    /// Not cached yet; a fetch for its window is running in the background
    Miss,
}

impl PageContent {
    pub fn rows(&self) -> Option<&PageRows> {
        match self {
            PageContent::Ready(rows) => Some(rows),
            PageContent::Miss => None,
        }
    }

    pub fn is_miss(&self) -> bool {
        matches!(self, PageContent::Miss)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PaginationMeta {
    pub current: u32,
    pub page_size: u32,
    pub total: u64,
}

impl PaginationMeta {
    pub fn page_count(&self) -> u64 {
        if self.page_size == 0 {
            return 0;
        }
        self.total.div_ceil(self.page_size as u64)
    }
}

#[derive(Debug, Clone)]
pub struct PageView {
    pub mode: ModeKind,
    pub content: PageContent,
    pub meta: PaginationMeta,
    pub summary: Option<Summary>,
}

/// What the UI asks for.
#[derive(Debug, Clone, Copy)]
pub struct PageRequest<'a> {
    pub bin: BinId,
    pub page: u32,
    pub page_size: u32,
    pub filters: &'a FilterParams,
    pub token: Option<&'a str>,
}

impl PageRequest<'_> {
    fn validate(&self) -> BrowseResult<()> {
        if self.page == 0 {
            return Err(BrowseError::invalid("page numbers start at 1"));
        }
        validate_page_size(self.page_size)
    }
}

pub struct PaginationAdapter {
    coordinator: Arc<FetchCoordinator>,
}

impl PaginationAdapter {
    pub fn new(coordinator: Arc<FetchCoordinator>) -> Self {
        Self { coordinator }
    }

    /// Answer a page request through the path of the active mode only.
    ///
    /// Browse misses return [`PageContent::Miss`] together with the task
    /// fetching the page's window.
    pub async fn request_page(
        &self,
        mode: &mut Mode,
        req: &PageRequest<'_>,
    ) -> BrowseResult<(PageView, Option<FetchTask>)> {
        if let Err(e) = req.validate() {
            warn!(error = %e, page = req.page, page_size = req.page_size, "Rejected page request");
            return Err(e);
        }
        match mode {
            Mode::Browse => self.browse_page(req),
            Mode::Sample(view) => Ok((sample_page(view, req), None)),
            Mode::Abnormal(view) => {
                let page = self.abnormal_page(view, req).await?;
                Ok((page, None))
            }
        }
    }

    fn browse_page(&self, req: &PageRequest<'_>) -> BrowseResult<(PageView, Option<FetchTask>)> {
        let (cached, total, summary, page_size) = {
            let stores = self.coordinator.stores().read();
            (
                stores.get_page(req.bin, req.page),
                stores.total(req.bin),
                stores.summary(req.bin),
                stores.generation().page_size,
            )
        };
        if page_size != req.page_size {
            return Err(BrowseError::invalid(format!(
                "page size {} does not match the cached page size {}",
                req.page_size, page_size
            )));
        }

        let meta = PaginationMeta {
            current: req.page,
            page_size: req.page_size,
            total,
        };
        let (content, task) = match cached {
            Some(rows) => {
                debug!(bin = req.bin.0, page = req.page, "Page served from cache");
                (PageContent::Ready(rows), None)
            }
            None => {
                debug!(bin = req.bin.0, page = req.page, "Page miss, loading window");
                let task = self
                    .coordinator
                    .spawn_window_load(req.bin, req.page, req.page_size)?;
                (PageContent::Miss, Some(task))
            }
        };

        Ok((
            PageView {
                mode: ModeKind::Browse,
                content,
                meta,
                summary,
            },
            task,
        ))
    }

    async fn abnormal_page(&self, view: &mut AbnormalView, req: &PageRequest<'_>) -> BrowseResult<PageView> {
        let filter = FilterRequest {
            params: *req.filters,
            token: req.token.map(str::to_string),
            page: req.page,
            page_size: req.page_size,
            abnormal_only: true,
        };
        filter.validate()?;

        let resp = self
            .coordinator
            .source()
            .fetch_filter_data(&filter)
            .await
            .map_err(|e| {
                warn!(page = req.page, error = %e, "Abnormal page fetch failed");
                BrowseError::NetworkFailure(e)
            })?;

        info!(page = req.page, rows = resp.data.len(), total = resp.total, "Abnormal page loaded");
        *view = AbnormalView {
            rows: Arc::new(resp.data),
            total: resp.total,
            summary: resp.summary,
            page: req.page,
            page_size: req.page_size,
        };
        Ok(view.page_view())
    }
}

/// Slice the locally held sample; never touches the network.
fn sample_page(view: &mut SampleView, req: &PageRequest<'_>) -> PageView {
    view.page = req.page;
    view.page_size = req.page_size;
    view.page_view()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_page_count() {
        let meta = PaginationMeta {
            current: 1,
            page_size: 20,
            total: 41,
        };
        assert_eq!(meta.page_count(), 3);
        let empty = PaginationMeta { total: 0, ..meta };
        assert_eq!(empty.page_count(), 0);
    }

    #[test]
    fn test_sample_slicing() {
        let rows: Vec<_> = (0..45).map(|i| json!({ "i": i })).collect();
        let mut view = SampleView::new(rows, 45, None, 20);
        let filters = FilterParams::default();
        let req = PageRequest {
            bin: BinId(4),
            page: 3,
            page_size: 20,
            filters: &filters,
            token: None,
        };

        let page = sample_page(&mut view, &req);
        let rows = page.content.rows().unwrap();
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[0], json!({ "i": 40 }));
        assert_eq!(page.meta.total, 45);
        assert_eq!(view.page, 3);

        let past_end = PageRequest { page: 9, ..req };
        assert!(sample_page(&mut view, &past_end).content.rows().unwrap().is_empty());
    }
}
