//! Sales Domain
//!
//! Sale records stored through the generic repository engine, daily and
//! monthly sales reports, and demo data seeding.
//!
//! # Example
//!
//! ```rust,ignore
//! use domain_sales::{Sale, SalesRepository, StatsType};
//!
//! let sales = SalesRepository::new(store);
//! sales.create(&Sale::new("Jyoti", dec!(4200), Utc::now())).await?;
//! let report = sales.sales_report(StatsType::Daily, Utc::now()).await?;
//! ```

pub mod error;
pub mod generator;
pub mod report;
pub mod repository;
pub mod sale;

pub use error::SalesError;
pub use generator::{random_sales, DEFAULT_SEED_COUNT, USER_NAMES};
pub use report::{ReportBucket, ReportEntry, StatsType};
pub use repository::SalesRepository;
pub use sale::{Sale, SalePatch, SALES_COLLECTION};
