use serde::{Deserialize, Serialize};

/// Requested page of a listing. `page` is 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: i64,
    pub per_page: i64,
}

impl Default for PageRequest {
    fn default() -> Self {
        PageRequest { page: 1, per_page: 20 }
    }
}

impl PageRequest {
    pub fn new(page: i64, per_page: i64) -> Self {
        PageRequest { page, per_page }.normalized()
    }

    pub fn normalized(self) -> Self {
        PageRequest {
            page: self.page.max(1),
            per_page: self.per_page.clamp(1, 100),
        }
    }

    pub fn offset(&self) -> i64 {
        let p = self.normalized();
        (p.page - 1) * p.per_page
    }

    pub fn limit(&self) -> i64 {
        self.normalized().per_page
    }
}

/// One page of results plus the totals needed to render pagination.
#[derive(Debug, Clone, Serialize)]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub per_page: i64,
    pub total_count: i64,
    pub total_pages: i64,
}

impl<T> Paged<T> {
    pub fn new(items: Vec<T>, request: PageRequest, total_count: i64) -> Self {
        let request = request.normalized();
        let total_pages = (total_count + request.per_page - 1) / request.per_page;
        Paged {
            items,
            page: request.page,
            per_page: request.per_page,
            total_count,
            total_pages,
        }
    }

    /// Slice an already sorted, fully materialized list.
    pub fn from_sorted(all: Vec<T>, request: PageRequest) -> Self {
        let total_count = all.len() as i64;
        let items = all
            .into_iter()
            .skip(request.offset() as usize)
            .take(request.limit() as usize)
            .collect();
        Paged::new(items, request, total_count)
    }
}
