//! Sales DTOs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use core_kernel::temporal::{optional_timestamp, timestamp};
use core_kernel::RecordId;
use domain_sales::{Sale, SalePatch};
use infra_db::Record;

/// Default page size for listings
pub const DEFAULT_PER_PAGE: u64 = 10;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateSaleRequest {
    #[validate(length(min = 1, message = "userName is required"))]
    pub user_name: String,
    /// Numbers and numeric strings are accepted
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
}

impl CreateSaleRequest {
    /// The sale to record, dated `now`
    pub fn into_sale(self, now: DateTime<Utc>) -> Sale {
        Sale::new(self.user_name, self.amount, now)
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSaleRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "userName cannot be empty"))]
    pub user_name: Option<String>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub amount: Option<Decimal>,
    #[serde(default, with = "optional_timestamp")]
    pub date: Option<DateTime<Utc>>,
}

impl From<UpdateSaleRequest> for SalePatch {
    fn from(request: UpdateSaleRequest) -> Self {
        SalePatch {
            user_name: request.user_name,
            amount: request.amount,
            date: request.date,
        }
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ListSalesQuery {
    #[validate(range(min = 1, message = "page must be an integer greater than 0"))]
    pub page: Option<u64>,
    #[validate(range(min = 1, message = "perPage must be an integer greater than 0"))]
    pub per_page: Option<u64>,
}

impl ListSalesQuery {
    pub fn page(&self) -> u64 {
        self.page.unwrap_or(1)
    }

    pub fn per_page(&self) -> u64 {
        self.per_page.unwrap_or(DEFAULT_PER_PAGE)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportQuery {
    pub stats_type: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleResponse {
    pub id: RecordId,
    pub user_name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    #[serde(with = "timestamp")]
    pub date: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl From<Record<Sale>> for SaleResponse {
    fn from(record: Record<Sale>) -> Self {
        Self {
            id: record.id,
            user_name: record.data.user_name,
            amount: record.data.amount,
            date: record.data.date,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub created: usize,
}
