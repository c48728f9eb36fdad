//! Pagination utilities

use serde::Serialize;

/// Page size for race listings
pub const RACE_PAGE_SIZE: i64 = 50;

/// Pagination metadata calculated from total results
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Pagination {
    /// Current page number (1-indexed)
    pub page: i64,
    pub page_size: i64,
    /// Total number of pages
    pub total_pages: i64,
    pub total: i64,
    /// Offset for SQL LIMIT/OFFSET query
    #[serde(skip)]
    pub offset: i64,
}

/// Calculate pagination metadata from total results and requested page
///
/// Ensures page is within valid bounds [1, total_pages]
///
/// # Examples
/// ```
/// use uc_server::pagination::calculate_pagination;
///
/// // 120 races at 50 per page = 3 pages (50 + 50 + 20)
/// let p = calculate_pagination(120, 2, 50);
/// assert_eq!(p.page, 2);
/// assert_eq!(p.total_pages, 3);
/// assert_eq!(p.offset, 50);
///
/// // Requesting out-of-bounds page gets clamped
/// let p = calculate_pagination(120, 99, 50);
/// assert_eq!(p.page, 3);
/// assert_eq!(p.offset, 100);
/// ```
pub fn calculate_pagination(total_results: i64, requested_page: i64, page_size: i64) -> Pagination {
    let page_size = page_size.max(1);
    let total_pages = (total_results + page_size - 1) / page_size;
    let page = requested_page.max(1).min(total_pages.max(1));
    let offset = (page - 1) * page_size;

    Pagination {
        page,
        page_size,
        total_pages,
        total: total_results,
        offset,
    }
}
