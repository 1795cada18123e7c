//! Page windows and range merging.
//!
//! A bin's loaded pages are tracked as closed intervals of 1-based page
//! numbers. After every insert the set is kept merged: sorted by start,
//! pairwise disjoint, and with no two windows touching (`[1,5]` and `[6,10]`
//! fold into `[1,10]`).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed interval `[start, end]` of 1-based page numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PageWindow {
    pub start: u32,
    pub end: u32,
}

impl PageWindow {
    /// `None` unless `1 <= start <= end`.
    pub fn new(start: u32, end: u32) -> Option<Self> {
        (start >= 1 && start <= end).then_some(Self { start, end })
    }

    pub fn single(page: u32) -> Option<Self> {
        Self::new(page, page)
    }

    /// Window of `size` pages containing `page`, aligned so that
    /// `start = 1 + k * size`.
    pub fn aligned(page: u32, size: u32) -> Option<Self> {
        if page == 0 || size == 0 {
            return None;
        }
        let start = (page - 1) / size * size + 1;
        Self::new(start, start.saturating_add(size - 1))
    }

    #[inline]
    pub fn contains(&self, page: u32) -> bool {
        self.start <= page && page <= self.end
    }

    #[inline]
    pub fn contains_window(&self, other: &PageWindow) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn len(&self) -> u32 {
        self.end - self.start + 1
    }

    pub fn pages(&self) -> impl Iterator<Item = u32> {
        self.start..=self.end
    }
}

impl fmt::Display for PageWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{},{}]", self.start, self.end)
    }
}

/// Merge windows into sorted, disjoint, non-adjacent form.
///
/// The output covers exactly the same pages as the input, and merging an
/// already merged set returns it unchanged.
pub fn merge(ranges: impl IntoIterator<Item = PageWindow>) -> Vec<PageWindow> {
    let mut sorted: Vec<PageWindow> = ranges.into_iter().collect();
    sorted.sort_unstable_by_key(|w| (w.start, w.end));

    let mut merged: Vec<PageWindow> = Vec::with_capacity(sorted.len());
    for next in sorted {
        match merged.last_mut() {
            Some(current) if next.start <= current.end.saturating_add(1) => {
                current.end = current.end.max(next.end);
            }
            _ => merged.push(next),
        }
    }
    merged
}

/// Merged set of windows loaded for one bin.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadedRanges(Vec<PageWindow>);

impl LoadedRanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, window: PageWindow) {
        let ranges = std::mem::take(&mut self.0);
        self.0 = merge(ranges.into_iter().chain(std::iter::once(window)));
    }

    /// Window holding `page`, if any.
    fn find(&self, page: u32) -> Option<&PageWindow> {
        // Windows are sorted and disjoint: the candidate is the last one
        // starting at or before `page`.
        let idx = self.0.partition_point(|w| w.start <= page);
        idx.checked_sub(1)
            .and_then(|i| self.0.get(i))
            .filter(|w| w.contains(page))
    }

    pub fn contains(&self, page: u32) -> bool {
        self.find(page).is_some()
    }

    /// True iff every page of `window` is loaded. Since loaded windows never
    /// touch, a covered window always sits inside a single one of them.
    pub fn covers(&self, window: &PageWindow) -> bool {
        self.find(window.start)
            .map_or(false, |w| w.contains_window(window))
    }

    pub fn as_slice(&self) -> &[PageWindow] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn page_count(&self) -> u64 {
        self.0.iter().map(|w| w.len() as u64).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::BTreeSet;

    fn w(start: u32, end: u32) -> PageWindow {
        PageWindow::new(start, end).unwrap()
    }

    fn points(ranges: &[PageWindow]) -> BTreeSet<u32> {
        ranges.iter().flat_map(|r| r.pages()).collect()
    }

    #[test]
    fn test_window_construction() {
        assert!(PageWindow::new(0, 3).is_none());
        assert!(PageWindow::new(4, 3).is_none());
        assert_eq!(PageWindow::single(7), Some(w(7, 7)));
        assert_eq!(w(2, 5).len(), 4);
    }

    #[test]
    fn test_aligned_windows() {
        assert_eq!(PageWindow::aligned(1, 5), Some(w(1, 5)));
        assert_eq!(PageWindow::aligned(5, 5), Some(w(1, 5)));
        assert_eq!(PageWindow::aligned(6, 5), Some(w(6, 10)));
        assert_eq!(PageWindow::aligned(7, 5), Some(w(6, 10)));
        assert_eq!(PageWindow::aligned(11, 5), Some(w(11, 15)));
        assert_eq!(PageWindow::aligned(3, 1), Some(w(3, 3)));
        assert_eq!(PageWindow::aligned(0, 5), None);
        assert_eq!(PageWindow::aligned(3, 0), None);
    }

    #[test]
    fn test_merge_folds_overlapping_and_adjacent() {
        let merged = merge(vec![w(6, 10), w(1, 5), w(12, 12), w(3, 4), w(13, 20)]);
        assert_eq!(merged, vec![w(1, 10), w(12, 20)]);
    }

    #[test]
    fn test_merge_keeps_gaps() {
        let merged = merge(vec![w(1, 1), w(3, 3)]);
        assert_eq!(merged, vec![w(1, 1), w(3, 3)]);
        assert!(merge(Vec::new()).is_empty());
    }

    #[test]
    fn test_merge_near_u32_max() {
        let merged = merge(vec![w(u32::MAX - 1, u32::MAX), w(1, 2), w(u32::MAX, u32::MAX)]);
        assert_eq!(merged, vec![w(1, 2), w(u32::MAX - 1, u32::MAX)]);
    }

    #[test]
    fn test_merge_randomized_properties() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            let n = rng.gen_range(0..12);
            let input: Vec<PageWindow> = (0..n)
                .map(|_| {
                    let start = rng.gen_range(1..60);
                    w(start, start + rng.gen_range(0..6))
                })
                .collect();

            let merged = merge(input.clone());
            for pair in merged.windows(2) {
                assert!(pair[0].end + 1 < pair[1].start, "not merged: {:?}", merged);
            }
            assert_eq!(points(&merged), points(&input));
            assert_eq!(merge(merged.clone()), merged);
        }
    }

    #[test]
    fn test_loaded_ranges_lookup() {
        let mut loaded = LoadedRanges::new();
        assert!(!loaded.contains(1));

        loaded.insert(w(1, 1));
        loaded.insert(w(2, 5));
        loaded.insert(w(11, 15));
        assert_eq!(loaded.as_slice(), &[w(1, 5), w(11, 15)]);

        assert!(loaded.contains(3));
        assert!(!loaded.contains(6));
        assert!(loaded.contains(15));
        assert!(!loaded.contains(16));

        assert!(loaded.covers(&w(2, 5)));
        assert!(!loaded.covers(&w(1, 6)));
        assert!(!loaded.covers(&w(5, 11)));
        assert!(loaded.covers(&w(12, 12)));
        assert_eq!(loaded.page_count(), 10);
    }

    #[test]
    fn test_loaded_ranges_cover_iff_points_present() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..200 {
            let mut loaded = LoadedRanges::new();
            let mut seen = BTreeSet::new();
            for _ in 0..rng.gen_range(1..8) {
                let start = rng.gen_range(1..40);
                let win = w(start, start + rng.gen_range(0..5));
                seen.extend(win.pages());
                loaded.insert(win);
            }
            for page in 1..50 {
                assert_eq!(loaded.contains(page), seen.contains(&page));
            }
            let probe = w(rng.gen_range(1..40), 45);
            assert_eq!(loaded.covers(&probe), probe.pages().all(|p| seen.contains(&p)));
        }
    }
}
