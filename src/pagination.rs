//! Pagination over fully loaded, ordered collections.
//!
//! Page `p` (1-based) of size `s` over `n` items is the slice
//! `[(p-1)*s, min(p*s, n))`. Out-of-range requests are clamped rather than
//! rejected: page numbers below 1 become 1, page sizes below 1 fall back to
//! the default, and page sizes above the maximum are capped.

use serde::Serialize;
use utoipa::ToSchema;

pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const MAX_PAGE_SIZE: usize = 100;

/// One page of a collection plus the counts a caller needs to render
/// navigation without re-deriving them.
#[derive(Debug)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub page_size: usize,
    pub total_count: usize,
}

/// Serialized pagination metadata.
#[derive(Debug, Serialize, ToSchema)]
pub struct PageInfo {
    pub current_page: usize,
    pub total_pages: usize,
    pub total_items: usize,
    pub page_size: usize,
    pub has_previous: bool,
    pub has_next: bool,
}

/// Clamp a requested page number; zero and negative values mean page 1.
#[must_use]
pub fn clamp_page(page: Option<i64>) -> usize {
    match page {
        Some(page) if page >= 1 => usize::try_from(page).unwrap_or(usize::MAX),
        _ => 1,
    }
}

/// Clamp a requested page size into `[1, MAX_PAGE_SIZE]`; zero, negative and
/// missing values mean the default.
#[must_use]
pub fn clamp_page_size(page_size: Option<i64>) -> usize {
    match page_size {
        Some(size) if size >= 1 => usize::try_from(size)
            .unwrap_or(MAX_PAGE_SIZE)
            .min(MAX_PAGE_SIZE),
        _ => DEFAULT_PAGE_SIZE,
    }
}

impl<T> Paginated<T> {
    /// Slice one page out of the full collection. `page` and `page_size` are
    /// expected to be already clamped.
    #[must_use]
    pub fn create(items: Vec<T>, page: usize, page_size: usize) -> Self {
        let total_count = items.len();
        let items = items
            .into_iter()
            .skip((page - 1).saturating_mul(page_size))
            .take(page_size)
            .collect();

        Self {
            items,
            page,
            page_size,
            total_count,
        }
    }

    #[must_use]
    pub fn total_pages(&self) -> usize {
        self.total_count.div_ceil(self.page_size)
    }

    #[must_use]
    pub fn has_previous(&self) -> bool {
        self.page > 1
    }

    #[must_use]
    pub fn has_next(&self) -> bool {
        self.page * self.page_size < self.total_count
    }

    #[must_use]
    pub fn page_info(&self) -> PageInfo {
        PageInfo {
            current_page: self.page,
            total_pages: self.total_pages(),
            total_items: self.total_count,
            page_size: self.page_size,
            has_previous: self.has_previous(),
            has_next: self.has_next(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_page_treats_zero_and_negative_as_first() {
        assert_eq!(clamp_page(None), 1);
        assert_eq!(clamp_page(Some(0)), 1);
        assert_eq!(clamp_page(Some(-5)), 1);
        assert_eq!(clamp_page(Some(3)), 3);
    }

    #[test]
    fn clamp_page_size_bounds() {
        assert_eq!(clamp_page_size(None), DEFAULT_PAGE_SIZE);
        assert_eq!(clamp_page_size(Some(0)), DEFAULT_PAGE_SIZE);
        assert_eq!(clamp_page_size(Some(-1)), DEFAULT_PAGE_SIZE);
        assert_eq!(clamp_page_size(Some(100)), 100);
        assert_eq!(clamp_page_size(Some(101)), MAX_PAGE_SIZE);
        assert_eq!(clamp_page_size(Some(7)), 7);
    }

    #[test]
    fn create_slices_requested_page() {
        let page = Paginated::create((1..=23).collect::<Vec<_>>(), 2, 10);
        assert_eq!(page.items, (11..=20).collect::<Vec<_>>());
        assert_eq!(page.total_count, 23);
        assert_eq!(page.total_pages(), 3);
        assert!(page.has_previous());
        assert!(page.has_next());
    }

    #[test]
    fn last_page_is_short_and_has_no_next() {
        let page = Paginated::create((1..=23).collect::<Vec<_>>(), 3, 10);
        assert_eq!(page.items, vec![21, 22, 23]);
        assert!(page.has_previous());
        assert!(!page.has_next());
    }

    #[test]
    fn page_past_the_end_is_empty() {
        let page = Paginated::create((1..=5).collect::<Vec<_>>(), 4, 10);
        assert!(page.items.is_empty());
        assert_eq!(page.total_pages(), 1);
        assert!(!page.has_next());
        assert!(page.has_previous());
    }

    #[test]
    fn empty_collection_has_zero_pages() {
        let page = Paginated::create(Vec::<u8>::new(), 1, 10);
        assert!(page.items.is_empty());
        assert_eq!(page.total_pages(), 0);
        assert!(!page.has_previous());
        assert!(!page.has_next());
    }

    #[test]
    fn page_lengths_sum_to_total_and_never_exceed_size() {
        for &(n, s) in &[(0usize, 1usize), (1, 1), (23, 10), (100, 100), (42, 7)] {
            let items: Vec<usize> = (0..n).collect();
            let total_pages = n.div_ceil(s);
            let mut seen = 0;
            for page in 1..=total_pages.max(1) {
                let paged = Paginated::create(items.clone(), page, s);
                assert!(paged.items.len() <= s);
                seen += paged.items.len();
            }
            assert_eq!(seen, n);
        }
    }

    #[test]
    fn page_info_carries_counts() {
        let info = Paginated::create((1..=12).collect::<Vec<_>>(), 2, 10).page_info();
        assert_eq!(info.current_page, 2);
        assert_eq!(info.total_pages, 2);
        assert_eq!(info.total_items, 12);
        assert_eq!(info.page_size, 10);
        assert!(info.has_previous);
        assert!(!info.has_next);
    }
}
