//! Property-Based Test Generators
//!
//! Provides proptest strategies for generating random test data
//! that maintains domain invariants.

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use serde_json::{Map, Value};

use domain_sales::{Sale, USER_NAMES};

/// Strategy for non-negative amounts with two decimal places
pub fn amount_strategy() -> impl Strategy<Value = Decimal> {
    (0i64..100_000_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

/// Strategy for millisecond-precision timestamps within 2024
pub fn timestamp_strategy() -> impl Strategy<Value = DateTime<Utc>> {
    (0i64..366 * 24 * 3600 * 1000).prop_map(|offset| {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::milliseconds(offset)
    })
}

/// Strategy for valid sales
pub fn sale_strategy() -> impl Strategy<Value = Sale> {
    (
        prop::sample::select(USER_NAMES.to_vec()),
        amount_strategy(),
        timestamp_strategy(),
    )
        .prop_map(|(name, amount, date)| Sale::new(name, amount, date))
}

/// Strategy for object keys that are valid field path segments
pub fn field_key_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-zA-Z0-9]{0,7}"
}

/// Strategy for JSON leaves: scalars, arrays and empty objects
pub fn leaf_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i32>().prop_map(Value::from),
        "[a-zA-Z ]{0,12}".prop_map(Value::String),
        prop::collection::vec(any::<i32>().prop_map(Value::from), 0..3).prop_map(Value::Array),
        Just(Value::Object(Map::new())),
    ]
}

/// Strategy for nested JSON objects up to `depth` levels deep
pub fn nested_object_strategy(depth: u32) -> impl Strategy<Value = Map<String, Value>> {
    let leaf = leaf_strategy();
    let value = leaf.prop_recursive(depth, 32, 4, |inner| {
        prop::collection::btree_map(field_key_strategy(), inner, 1..4)
            .prop_map(|entries| Value::Object(entries.into_iter().collect()))
    });
    prop::collection::btree_map(field_key_strategy(), value, 0..5)
        .prop_map(|entries| entries.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    proptest! {
        #[test]
        fn test_generated_sales_are_valid(sale in sale_strategy()) {
            prop_assert!(sale.validate().is_ok());
            prop_assert!(!sale.amount.is_sign_negative());
        }

        #[test]
        fn test_generated_keys_have_no_dots(body in nested_object_strategy(3)) {
            prop_assert!(body.keys().all(|k| !k.contains('.') && !k.is_empty()));
        }
    }
}
