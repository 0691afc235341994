//! Sale records

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use core_kernel::temporal::{optional_timestamp, timestamp};
use infra_db::Model;

/// Collection sales are stored in
pub const SALES_COLLECTION: &str = "sales";

/// One recorded sale
///
/// Stored as `{ "userName": ..., "amount": <number>, "date": <timestamp> }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Sale {
    #[validate(length(min = 1, message = "userName is required"))]
    pub user_name: String,
    #[serde(with = "rust_decimal::serde::float")]
    #[validate(custom(function = "non_negative_amount"))]
    pub amount: Decimal,
    #[serde(with = "timestamp")]
    pub date: DateTime<Utc>,
}

impl Sale {
    pub fn new(user_name: impl Into<String>, amount: Decimal, date: DateTime<Utc>) -> Self {
        Self {
            user_name: user_name.into(),
            amount,
            date,
        }
    }
}

impl Model for Sale {
    const COLLECTION: &'static str = SALES_COLLECTION;
}

fn non_negative_amount(amount: &Decimal) -> Result<(), ValidationError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        let mut error = ValidationError::new("non_negative");
        error.message = Some("amount cannot be negative".into());
        return Err(error);
    }
    Ok(())
}

/// Partial update of a sale; only the fields that are set are written
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SalePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "rust_decimal::serde::float_option"
    )]
    pub amount: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "optional_timestamp")]
    pub date: Option<DateTime<Utc>>,
}

impl SalePatch {
    pub fn is_empty(&self) -> bool {
        self.user_name.is_none() && self.amount.is_none() && self.date.is_none()
    }
}
