//! Test Data Builders
//!
//! Provides builder patterns for constructing test data with sensible defaults.
//! These builders allow tests to specify only the relevant fields while using
//! defaults for everything else.

use chrono::{DateTime, Duration, Utc};
use fake::faker::name::en::FirstName;
use fake::Fake;
use rust_decimal::Decimal;
use serde_json::{Map, Value};

use domain_sales::Sale;

use crate::fixtures::TemporalFixtures;

/// Builder for constructing test sales
pub struct TestSaleBuilder {
    user_name: String,
    amount: Decimal,
    date: DateTime<Utc>,
}

impl Default for TestSaleBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestSaleBuilder {
    /// Creates a new builder with a random name and amount, dated at the
    /// reference time
    pub fn new() -> Self {
        let cents: i64 = (0..1_000_000i64).fake();
        Self {
            user_name: FirstName().fake(),
            amount: Decimal::new(cents, 2),
            date: TemporalFixtures::reference_now(),
        }
    }

    /// Sets the user name
    pub fn with_user_name(mut self, name: impl Into<String>) -> Self {
        self.user_name = name.into();
        self
    }

    /// Sets the amount
    pub fn with_amount(mut self, amount: Decimal) -> Self {
        self.amount = amount;
        self
    }

    /// Sets the date
    pub fn with_date(mut self, date: DateTime<Utc>) -> Self {
        self.date = date;
        self
    }

    /// Moves the date by `minutes`
    pub fn offset_minutes(mut self, minutes: i64) -> Self {
        self.date += Duration::minutes(minutes);
        self
    }

    pub fn build(self) -> Sale {
        Sale::new(self.user_name, self.amount, self.date)
    }

    /// Builds `count` sales, each `step_minutes` after the previous one
    pub fn build_series(self, count: usize, step_minutes: i64) -> Vec<Sale> {
        (0..count)
            .map(|i| Sale::new(
                self.user_name.clone(),
                self.amount,
                self.date + Duration::minutes(step_minutes * i as i64),
            ))
            .collect()
    }
}

/// Builder for nested JSON payloads
#[derive(Debug, Default)]
pub struct TestPayloadBuilder {
    body: Map<String, Value>,
}

impl TestPayloadBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a top-level field
    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.body.insert(key.into(), value.into());
        self
    }

    /// Sets a nested object under `key`
    pub fn nested(mut self, key: impl Into<String>, inner: TestPayloadBuilder) -> Self {
        self.body.insert(key.into(), Value::Object(inner.body));
        self
    }

    pub fn build(self) -> Value {
        Value::Object(self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_sale_builder_overrides() {
        let sale = TestSaleBuilder::new()
            .with_user_name("Pankaj")
            .with_amount(dec!(12.50))
            .offset_minutes(15)
            .build();
        assert_eq!(sale.user_name, "Pankaj");
        assert_eq!(sale.amount, dec!(12.50));
        assert_eq!(sale.date, TemporalFixtures::reference_now() + Duration::minutes(15));
    }

    #[test]
    fn test_random_defaults_are_valid() {
        use validator::Validate;
        for _ in 0..20 {
            let sale = TestSaleBuilder::new().build();
            assert!(sale.validate().is_ok(), "{sale:?}");
        }
    }

    #[test]
    fn test_series_is_spaced() {
        let series = TestSaleBuilder::new().build_series(3, -15);
        assert_eq!(series.len(), 3);
        assert_eq!(series[0].date - series[2].date, Duration::minutes(30));
    }

    #[test]
    fn test_payload_builder_nests() {
        let payload = TestPayloadBuilder::new()
            .field("name", "Ada")
            .nested("address", TestPayloadBuilder::new().field("city", "Pune"))
            .build();
        assert_eq!(payload, json!({ "name": "Ada", "address": { "city": "Pune" } }));
    }
}
