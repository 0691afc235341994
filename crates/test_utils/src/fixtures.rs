//! Pre-built Test Fixtures
//!
//! Provides ready-to-use test data for sales and stores.
//! These fixtures are consistent and predictable for unit tests.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};

use domain_sales::{Sale, SalesRepository};
use infra_db::{DocumentStore, InMemoryDocumentStore};

/// Fixture for temporal test data
pub struct TemporalFixtures;

impl TemporalFixtures {
    /// Mid-morning on a fixed reference day (Mar 15, 2024 10:30 UTC)
    pub fn reference_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 10, 30, 0).unwrap()
    }

    /// Start of the reference day
    pub fn reference_day_start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap()
    }

    /// Same day and month, one year earlier
    pub fn previous_year() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 3, 15, 10, 30, 0).unwrap()
    }

    /// Last millisecond of the month before the reference month
    pub fn end_of_previous_month() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 29, 23, 59, 59).unwrap() + chrono::Duration::milliseconds(999)
    }
}

/// Fixture for sale test data
pub struct SaleFixtures;

impl SaleFixtures {
    /// A typical sale on the reference day
    pub fn standard() -> Sale {
        Sale::new("Ashish", dec!(4521.75), TemporalFixtures::reference_now())
    }

    /// A zero-amount sale
    pub fn zero_amount() -> Sale {
        Sale::new("Rahul", Decimal::ZERO, TemporalFixtures::reference_now())
    }

    /// The wire form of a create request
    pub fn create_request() -> Value {
        json!({ "userName": "Ashish", "amount": 4521.75 })
    }
}

/// Fixture for stores and repositories
pub struct StoreFixtures;

impl StoreFixtures {
    /// A fresh in-memory store
    pub fn memory() -> InMemoryDocumentStore {
        InMemoryDocumentStore::new()
    }

    /// A sales repository over a fresh in-memory store, returning the store
    /// handle for call-count and availability assertions
    pub fn sales() -> (InMemoryDocumentStore, SalesRepository) {
        let store = Self::memory();
        let repository = SalesRepository::new(Arc::new(store.clone()) as Arc<dyn DocumentStore>);
        (store, repository)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_times_are_ordered() {
        assert!(TemporalFixtures::end_of_previous_month() < TemporalFixtures::reference_day_start());
        assert!(TemporalFixtures::reference_day_start() < TemporalFixtures::reference_now());
        assert!(TemporalFixtures::previous_year() < TemporalFixtures::reference_now());
    }

    #[test]
    fn test_standard_sale_is_valid() {
        use validator::Validate;
        assert!(SaleFixtures::standard().validate().is_ok());
        assert!(SaleFixtures::zero_amount().validate().is_ok());
    }
}
