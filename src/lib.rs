//! Price Checker browsing engine
//!
//! Pages through large server-held transaction sets split into fixed USD price
//! bins. Loaded page windows are cached per bin, so revisiting a page never
//! goes back to the network until the filters change.

pub mod api;
pub mod cache;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod mode;
pub mod models;
pub mod pagination;

pub use api::{PriceApiClient, PriceDataSource};
pub use config::BrowserConfig;
pub use coordinator::{FetchCoordinator, FetchOutcome};
pub use error::{BrowseError, BrowseResult};
pub use mode::{Mode, ModeController, ModeKind};
pub use pagination::{PageContent, PageView, PaginationMeta};
