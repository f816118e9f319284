//! Page-oriented access over the range queries.
//!
//! # Responsibility
//! - Turn a filtered row count into a page count.
//! - Fetch page `n` of a [`PagedRepository`] with fixed page size.
//!
//! # Invariants
//! - Pages are zero-based and follow the repository's key order.
//! - A failed count (`-1`) yields zero pages.

use crate::repo::PagedRepository;
use log::debug;

/// Number of pages needed for `total` rows. Non-positive totals give zero.
pub fn page_count(total: i64, page_size: usize) -> usize {
    let Ok(total) = usize::try_from(total) else {
        return 0;
    };
    let page_size = page_size.max(1);
    total.div_ceil(page_size)
}

pub struct Pager<'r, R: PagedRepository> {
    repo: &'r R,
    page_size: usize,
    filters: Option<R::Filters>,
}

impl<'r, R: PagedRepository> Pager<'r, R> {
    /// Pager over `repo`; a zero page size is treated as one.
    pub fn new(repo: &'r R, page_size: usize) -> Self {
        Self {
            repo,
            page_size: page_size.max(1),
            filters: None,
        }
    }

    pub fn with_filters(mut self, filters: R::Filters) -> Self {
        self.filters = Some(filters);
        self
    }

    pub fn set_filters(&mut self, filters: Option<R::Filters>) {
        self.filters = filters;
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Rows matching the current filters, `-1` when the count failed.
    pub fn total(&self) -> i64 {
        self.repo.count(self.filters.as_ref())
    }

    pub fn page_count(&self) -> usize {
        page_count(self.total(), self.page_size)
    }

    /// Rows of page `index`; empty past the last page.
    pub fn page(&self, index: usize) -> Vec<R::Item> {
        let begin = index.saturating_mul(self.page_size);
        let end = begin.saturating_add(self.page_size);
        let items = self.repo.fetch_range(begin, end, self.filters.as_ref());
        debug!(
            "event=page_fetch module=service status=ok page={} page_size={} rows={}",
            index,
            self.page_size,
            items.len()
        );
        items
    }
}

#[cfg(test)]
mod tests {
    use super::{page_count, Pager};
    use crate::repo::PagedRepository;

    struct Numbers(Vec<u32>);

    impl PagedRepository for Numbers {
        type Item = u32;
        type Filters = u32;

        fn fetch_range(&self, begin: usize, end: usize, min: Option<&u32>) -> Vec<u32> {
            self.0
                .iter()
                .copied()
                .filter(|n| min.map_or(true, |min| n >= min))
                .skip(begin)
                .take(end.saturating_sub(begin))
                .collect()
        }

        fn count(&self, min: Option<&u32>) -> i64 {
            self.fetch_range(0, usize::MAX, min).len() as i64
        }
    }

    #[test]
    fn page_count_rounds_up() {
        assert_eq!(page_count(25, 10), 3);
        assert_eq!(page_count(20, 10), 2);
        assert_eq!(page_count(0, 10), 0);
        assert_eq!(page_count(-1, 10), 0);
        assert_eq!(page_count(3, 0), 3);
    }

    #[test]
    fn pager_walks_pages_with_filters() {
        let repo = Numbers((1..=25).collect());
        let pager = Pager::new(&repo, 10);
        assert_eq!(pager.page_count(), 3);
        assert_eq!(pager.page(2), vec![21, 22, 23, 24, 25]);
        assert!(pager.page(3).is_empty());

        let filtered = Pager::new(&repo, 10).with_filters(20);
        assert_eq!(filtered.total(), 6);
        assert_eq!(filtered.page(0), vec![20, 21, 22, 23, 24, 25]);
    }
}
