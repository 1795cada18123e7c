pub mod ranges;
pub mod store;

pub use ranges::{merge, LoadedRanges, PageWindow};
pub use store::{BinPageStore, BinStoreSet, Generation, PageRows, SharedStores};
