//! Page-based pagination envelope shared by every list operation.

use serde::{Deserialize, Serialize};

/// Default page size when the caller does not specify one.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Upper bound on page size; larger requests are clamped.
pub const MAX_PAGE_SIZE: u32 = 100;

/// A validated page request. `page` is 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    page: u32,
    page_size: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageRequest {
    /// Creates a request, clamping `page` to at least 1 and `page_size`
    /// into `1..=MAX_PAGE_SIZE`.
    pub fn new(page: u32, page_size: u32) -> Self {
        Self {
            page: page.max(1),
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    /// The 1-based page number.
    pub fn page(&self) -> u32 {
        self.page
    }

    /// Items per page.
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// SQL `LIMIT` value.
    pub fn limit(&self) -> i64 {
        i64::from(self.page_size)
    }

    /// SQL `OFFSET` value.
    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.page_size)
    }
}

/// One page of results plus totals.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    /// Items on this page
    pub items: Vec<T>,
    /// 1-based page number
    pub page: u32,
    /// Requested page size
    pub page_size: u32,
    /// Total matching items across all pages
    pub total_items: u64,
    /// Total pages at this page size
    pub total_pages: u64,
}

impl<T> Page<T> {
    /// Wraps items and a total count into the envelope.
    pub fn new(items: Vec<T>, total_items: u64, request: PageRequest) -> Self {
        let page_size = u64::from(request.page_size());
        let total_pages = total_items.div_ceil(page_size);
        Self {
            items,
            page: request.page(),
            page_size: request.page_size(),
            total_items,
            total_pages,
        }
    }

    /// Maps the items while preserving the envelope.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            page_size: self.page_size,
            total_items: self.total_items,
            total_pages: self.total_pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_request() {
        let request = PageRequest::default();
        assert_eq!(request.page(), 1);
        assert_eq!(request.page_size(), 20);
        assert_eq!(request.limit(), 20);
        assert_eq!(request.offset(), 0);
    }

    #[test]
    fn test_clamping() {
        let request = PageRequest::new(0, 500);
        assert_eq!(request.page(), 1);
        assert_eq!(request.page_size(), MAX_PAGE_SIZE);

        let request = PageRequest::new(3, 0);
        assert_eq!(request.page_size(), 1);
    }

    #[test]
    fn test_offset_math() {
        let request = PageRequest::new(3, 25);
        assert_eq!(request.offset(), 50);
        assert_eq!(request.limit(), 25);
    }

    #[test]
    fn test_total_pages_rounds_up() {
        let page = Page::new(vec![1, 2, 3], 41, PageRequest::new(1, 20));
        assert_eq!(page.total_pages, 3);

        let page = Page::new(Vec::<i32>::new(), 0, PageRequest::default());
        assert_eq!(page.total_pages, 0);

        let page = Page::new(vec![1], 20, PageRequest::default());
        assert_eq!(page.total_pages, 1);
    }

    #[test]
    fn test_map_preserves_envelope() {
        let page = Page::new(vec![1, 2], 2, PageRequest::default()).map(|n| n.to_string());
        assert_eq!(page.items, vec!["1", "2"]);
        assert_eq!(page.total_items, 2);
    }
}
