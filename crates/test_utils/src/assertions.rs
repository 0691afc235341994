//! Custom Test Assertions
//!
//! Provides specialized assertion helpers for pages and reports that give
//! more meaningful error messages than standard assertions.

use rust_decimal::Decimal;

use domain_sales::Sale;
use infra_db::{PageResult, Record};

/// Asserts the page-shape invariant against the full ordered result set
///
/// `expected_all` is every matching item in query order; the page must hold
/// exactly the `per_page` slice for its page number, and the flags must
/// agree with what lies outside the slice.
///
/// # Panics
///
/// Panics if the page data or flags disagree with the full result set
pub fn assert_page_matches<R, T>(page: &PageResult<R>, expected_all: &[T])
where
    R: PartialEq<T> + std::fmt::Debug,
    T: std::fmt::Debug,
{
    let p = page.pagination;
    let start = usize::try_from((p.page - 1).saturating_mul(p.per_page)).unwrap_or(usize::MAX);
    let per_page = usize::try_from(p.per_page).unwrap_or(usize::MAX);
    let end = start.saturating_add(per_page).min(expected_all.len());
    let expected = expected_all.get(start..end).unwrap_or(&[]);

    assert_eq!(
        page.data.len(),
        expected.len(),
        "page {} of size {} has {} items, expected {}",
        p.page,
        p.per_page,
        page.data.len(),
        expected.len()
    );
    for (actual, wanted) in page.data.iter().zip(expected) {
        assert!(actual == wanted, "page item {actual:?} != {wanted:?}");
    }

    assert_eq!(p.total_count, expected_all.len() as u64, "total count mismatch");
    assert_eq!(
        p.has_next,
        start.saturating_add(per_page) < expected_all.len(),
        "has_next mismatch on page {}",
        p.page
    );
    assert_eq!(
        p.has_previous,
        p.page > 1 && start <= expected_all.len(),
        "has_previous mismatch on page {}",
        p.page
    );
}

/// Asserts that records are ordered newest first by sale date
pub fn assert_newest_first(records: &[Record<Sale>]) {
    for pair in records.windows(2) {
        assert!(
            pair[0].data.date >= pair[1].data.date,
            "records out of order: {} before {}",
            pair[0].data.date,
            pair[1].data.date
        );
    }
}

/// Asserts that two decimal values are equal within a tolerance
pub fn assert_decimal_approx_eq(actual: Decimal, expected: Decimal, tolerance: Decimal) {
    let diff = (actual - expected).abs();
    assert!(
        diff <= tolerance,
        "Decimal values differ by more than tolerance: actual={}, expected={}, diff={}, tolerance={}",
        actual,
        expected,
        diff,
        tolerance
    );
}
