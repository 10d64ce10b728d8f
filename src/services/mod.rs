//! Service layer: each component exposes typed operations over the
//! store; HTTP handlers stay thin adapters.

pub mod activity;
pub mod orders;
pub mod payments;
pub mod products;
pub mod refunds;
pub mod reviews;
pub mod tenants;

use serde::Serialize;

pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Validated pagination window (1-based pages).
#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub page: i64,
    pub page_size: i64,
}

impl Page {
    pub fn new(page: Option<i64>, page_size: Option<i64>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            page_size: page_size
                .unwrap_or(DEFAULT_PAGE_SIZE)
                .clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn limit(&self) -> i64 {
        self.page_size
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.page_size
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Paginated<T> {
    pub count: i64,
    pub next: Option<i64>,
    pub previous: Option<i64>,
    pub results: Vec<T>,
}

impl<T> Paginated<T> {
    pub fn new(count: i64, page: Page, results: Vec<T>) -> Self {
        let last_page = (count + page.page_size - 1) / page.page_size;
        Self {
            count,
            next: (page.page < last_page).then_some(page.page + 1),
            previous: (page.page > 1 && count > 0).then_some(page.page - 1),
            results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_defaults_and_clamps() {
        let p = Page::new(None, None);
        assert_eq!((p.page, p.page_size), (1, 10));
        let p = Page::new(Some(0), Some(500));
        assert_eq!((p.page, p.page_size), (1, 100));
        let p = Page::new(Some(3), Some(25));
        assert_eq!(p.offset(), 50);
    }

    #[test]
    fn envelope_links() {
        let p = Paginated::new(25, Page::new(Some(2), Some(10)), vec![1, 2, 3]);
        assert_eq!(p.next, Some(3));
        assert_eq!(p.previous, Some(1));
        let p = Paginated::<i32>::new(25, Page::new(Some(3), Some(10)), vec![]);
        assert_eq!(p.next, None);
        assert_eq!(p.previous, Some(2));
        let p = Paginated::<i32>::new(0, Page::new(None, None), vec![]);
        assert_eq!(p.next, None);
        assert_eq!(p.previous, None);
    }
}
