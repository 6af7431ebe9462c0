use serde::{Deserialize, Serialize};

pub const MAX_PER_PAGE: u32 = 100;

/// Raw `?page=&per_page=` query parameters.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct PageParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

/// Normalized pagination window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub per_page: u32,
}

impl PageParams {
    pub fn normalize(&self, default_per_page: u32) -> Page {
        Page {
            page: self.page.unwrap_or(1).max(1),
            per_page: self
                .per_page
                .unwrap_or(default_per_page)
                .clamp(1, MAX_PER_PAGE),
        }
    }
}

impl Page {
    pub fn limit(&self) -> i64 {
        self.per_page as i64
    }

    pub fn offset(&self) -> i64 {
        (self.page as i64 - 1) * self.per_page as i64
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
    pub total_pages: i64,
}

impl<T> Paginated<T> {
    pub fn new(items: Vec<T>, page: Page, total: i64) -> Self {
        let per_page = page.per_page as i64;
        let total = total.max(0);
        Self {
            items,
            page: page.page,
            per_page: page.per_page,
            total,
            total_pages: (total + per_page - 1) / per_page,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let p = PageParams::default().normalize(20);
        assert_eq!(p, Page { page: 1, per_page: 20 });
        assert_eq!(p.offset(), 0);
    }

    #[test]
    fn test_page_zero_becomes_one() {
        let p = PageParams {
            page: Some(0),
            per_page: Some(10),
        }
        .normalize(20);
        assert_eq!(p.page, 1);
        assert_eq!(p.offset(), 0);
    }

    #[test]
    fn test_per_page_clamped() {
        let high = PageParams {
            page: None,
            per_page: Some(10_000),
        }
        .normalize(20);
        assert_eq!(high.per_page, MAX_PER_PAGE);

        let zero = PageParams {
            page: None,
            per_page: Some(0),
        }
        .normalize(20);
        assert_eq!(zero.per_page, 1);
    }

    #[test]
    fn test_offset_third_page() {
        let p = PageParams {
            page: Some(3),
            per_page: Some(25),
        }
        .normalize(20);
        assert_eq!(p.offset(), 50);
        assert_eq!(p.limit(), 25);
    }

    #[test]
    fn test_total_pages() {
        let page = Page { page: 1, per_page: 10 };
        assert_eq!(Paginated::<u8>::new(vec![], page, 0).total_pages, 0);
        assert_eq!(Paginated::<u8>::new(vec![], page, 1).total_pages, 1);
        assert_eq!(Paginated::<u8>::new(vec![], page, 10).total_pages, 1);
        assert_eq!(Paginated::<u8>::new(vec![], page, 11).total_pages, 2);
    }
}
