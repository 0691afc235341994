//! Sentinel-record pagination
//!
//! A page request fetches up to two records beyond the page itself: one
//! before it (when `page > 1`) and one after it. Whether those sentinels come
//! back tells us if a previous or next page exists, so a page costs one
//! count query and one fetch and nothing else.
//!
//! Worked example, 25 matching records and `per_page = 10`:
//!
//! | page | skip | limit | fetched | slice    | has_previous | has_next |
//! |------|------|-------|---------|----------|--------------|----------|
//! | 1    | 0    | 11    | 11      | `[0,10)` | false        | true     |
//! | 2    | 9    | 12    | 12      | `[1,11)` | true         | true     |
//! | 3    | 19   | 12    | 6       | `[1,6)`  | true         | false    |

use serde::{Deserialize, Serialize};

use crate::error::RepositoryError;

/// The skip/limit to fetch for one page, sentinels included
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub page: u64,
    pub per_page: u64,
    pub skip: u64,
    pub limit: u64,
}

impl PageWindow {
    /// Computes the fetch window for a page
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` when `page` or `per_page` is zero
    pub fn new(page: u64, per_page: u64) -> Result<Self, RepositoryError> {
        if page < 1 {
            return Err(RepositoryError::invalid_argument("Page cannot be smaller than 1"));
        }
        if per_page < 1 {
            return Err(RepositoryError::invalid_argument("perPage cannot be smaller than 1"));
        }

        let mut skip = (page - 1).saturating_mul(per_page);
        let limit = if page > 1 {
            skip -= 1;
            per_page.saturating_add(2)
        } else {
            per_page.saturating_add(1)
        };

        Ok(Self {
            page,
            per_page,
            skip,
            limit,
        })
    }

    /// Strips the sentinel records from a fetch and builds the page
    pub fn into_page<R>(self, mut fetched: Vec<R>, total_count: u64) -> PageResult<R> {
        let fetched_count = fetched.len();
        let per_page = usize::try_from(self.per_page).unwrap_or(usize::MAX);

        let has_previous = self.page > 1 && fetched_count > 0;
        let lower = usize::from(has_previous);

        let has_next = fetched_count > per_page.saturating_add(lower);
        let upper = if has_next { per_page + lower } else { fetched_count };

        fetched.truncate(upper);
        let data = fetched.split_off(lower.min(upper));

        PageResult {
            data,
            pagination: Pagination {
                page: self.page,
                per_page: self.per_page,
                total_count,
                has_next,
                has_previous,
            },
        }
    }
}

/// Pagination metadata returned alongside a page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u64,
    pub per_page: u64,
    pub total_count: u64,
    pub has_next: bool,
    pub has_previous: bool,
}

/// One page of results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageResult<R> {
    pub data: Vec<R>,
    pub pagination: Pagination,
}

impl<R> PageResult<R> {
    pub fn map<U, F>(self, f: F) -> PageResult<U>
    where
        F: FnMut(R) -> U,
    {
        PageResult {
            data: self.data.into_iter().map(f).collect(),
            pagination: self.pagination,
        }
    }

    /// Converts every item, keeping the pagination metadata
    pub fn try_map<U, E, F>(self, f: F) -> Result<PageResult<U>, E>
    where
        F: FnMut(R) -> Result<U, E>,
    {
        Ok(PageResult {
            data: self.data.into_iter().map(f).collect::<Result<Vec<_>, E>>()?,
            pagination: self.pagination,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetch(total: u64, window: PageWindow) -> Vec<u64> {
        (0..total).skip(window.skip as usize).take(window.limit as usize).collect()
    }

    #[test]
    fn test_rejects_zero_page_and_per_page() {
        assert!(PageWindow::new(0, 10).unwrap_err().is_invalid_argument());
        assert!(PageWindow::new(1, 0).unwrap_err().is_invalid_argument());
    }

    #[test]
    fn test_worked_example() {
        let first = PageWindow::new(1, 10).unwrap();
        assert_eq!((first.skip, first.limit), (0, 11));
        let page = first.into_page(fetch(25, first), 25);
        assert_eq!(page.data, (0..10).collect::<Vec<_>>());
        assert!(!page.pagination.has_previous);
        assert!(page.pagination.has_next);

        let second = PageWindow::new(2, 10).unwrap();
        assert_eq!((second.skip, second.limit), (9, 12));
        let page = second.into_page(fetch(25, second), 25);
        assert_eq!(page.data, (10..20).collect::<Vec<_>>());
        assert!(page.pagination.has_previous);
        assert!(page.pagination.has_next);

        let third = PageWindow::new(3, 10).unwrap();
        assert_eq!((third.skip, third.limit), (19, 12));
        let fetched = fetch(25, third);
        assert_eq!(fetched.len(), 6);
        let page = third.into_page(fetched, 25);
        assert_eq!(page.data, (20..25).collect::<Vec<_>>());
        assert!(page.pagination.has_previous);
        assert!(!page.pagination.has_next);
        assert_eq!(page.pagination.total_count, 25);
    }

    #[test]
    fn test_page_past_the_end_is_empty() {
        let window = PageWindow::new(5, 10).unwrap();
        let page = window.into_page(fetch(25, window), 25);
        assert!(page.data.is_empty());
        assert!(!page.pagination.has_previous);
        assert!(!page.pagination.has_next);
    }

    #[test]
    fn test_exact_multiple_has_no_next() {
        let window = PageWindow::new(2, 10).unwrap();
        let page = window.into_page(fetch(20, window), 20);
        assert_eq!(page.data, (10..20).collect::<Vec<_>>());
        assert!(!page.pagination.has_next);
    }

    #[test]
    fn test_pagination_serializes_camel_case() {
        let window = PageWindow::new(1, 5).unwrap();
        let page = window.into_page(vec![1, 2], 2);
        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(json["pagination"]["perPage"], 5);
        assert_eq!(json["pagination"]["totalCount"], 2);
        assert_eq!(json["pagination"]["hasNext"], false);
    }
}
