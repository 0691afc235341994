//! Sales repository
//!
//! Wraps the generic engine for [`Sale`] records and adds the sales-only
//! queries: reports and demo data seeding.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use infra_db::{
    DeleteResult, DocumentStore, Filter, FindOptions, PageResult, Record, Repository,
    RepositoryError, SortField, WriteOptions,
};

use crate::error::SalesError;
use crate::generator::random_sales;
use crate::report::{ReportEntry, StatsType};
use crate::sale::{Sale, SalePatch};

/// Data access for sales
#[derive(Debug, Clone)]
pub struct SalesRepository {
    records: Repository<Sale>,
}

impl SalesRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            records: Repository::new(store),
        }
    }

    /// The generic engine underneath
    pub fn records(&self) -> &Repository<Sale> {
        &self.records
    }

    /// Lists sales, newest first
    pub async fn list(&self, page: u64, per_page: u64) -> Result<PageResult<Record<Sale>>, RepositoryError> {
        let options = FindOptions::default().sort(vec![SortField::desc("date")]);
        self.records.find(Filter::All, page, per_page, &options).await
    }

    pub async fn find(
        &self,
        filter: Filter,
        page: u64,
        per_page: u64,
        options: &FindOptions,
    ) -> Result<PageResult<Record<Sale>>, RepositoryError> {
        self.records.find(filter, page, per_page, options).await
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Record<Sale>, RepositoryError> {
        self.records.find_by_id(id, &[]).await
    }

    pub async fn create(&self, sale: &Sale) -> Result<Record<Sale>, RepositoryError> {
        self.records.create(sale, &WriteOptions::default()).await
    }

    pub async fn update(&self, id: &str, patch: &SalePatch) -> Result<Record<Sale>, RepositoryError> {
        self.records.update(id, patch, None, &WriteOptions::default()).await
    }

    pub async fn delete(&self, id: &str) -> Result<Record<Sale>, RepositoryError> {
        self.records.delete(id, None, &WriteOptions::default()).await
    }

    /// Removes every sale matching `filter`; `Filter::All` removes them all
    pub async fn delete_by_cond(&self, filter: Filter) -> Result<DeleteResult, RepositoryError> {
        self.records.delete_by_cond(filter).await
    }

    /// Totals sale amounts per bucket for the window around `now`
    #[instrument(skip(self), fields(stats_type = %stats_type))]
    pub async fn sales_report(
        &self,
        stats_type: StatsType,
        now: DateTime<Utc>,
    ) -> Result<Vec<ReportEntry>, SalesError> {
        let pipeline = stats_type.pipeline(now)?;
        pipeline.validate()?;

        let rows = self
            .records
            .store()
            .aggregate(self.records.collection(), &pipeline)
            .await
            .map_err(RepositoryError::from)?;

        let entries = rows
            .into_iter()
            .map(|row| {
                serde_json::from_value(row).map_err(|e| SalesError::MalformedReport(e.to_string()))
            })
            .collect::<Result<Vec<ReportEntry>, _>>()?;
        info!(buckets = entries.len(), "Built sales report");
        Ok(entries)
    }

    /// Seeds `count` random sales dated back from `now` at 15 minute steps
    #[instrument(skip(self))]
    pub async fn generate_random(&self, count: usize, now: DateTime<Utc>) -> Result<usize, RepositoryError> {
        let sales = random_sales(&mut rand::thread_rng(), count, now);
        let options = WriteOptions::default().comment("generated sales");
        for sale in &sales {
            self.records.create(sale, &options).await?;
        }
        info!(created = sales.len(), "Generated random sales");
        Ok(sales.len())
    }

    /// Declares the index report and list queries rely on
    pub async fn ensure_indexes(&self) -> Result<(), RepositoryError> {
        self.records
            .store()
            .ensure_index(self.records.collection(), "date")
            .await?;
        Ok(())
    }
}
