//! Sales handlers

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use validator::Validate;

use core_kernel::temporal::now_millis;
use domain_sales::{ReportEntry, SalePatch, StatsType};
use infra_db::PageResult;

use crate::dto::sales::*;
use crate::{error::ApiError, AppState};

/// Records a sale dated now
pub async fn create_sale(
    State(state): State<AppState>,
    payload: Result<Json<CreateSaleRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SaleResponse>), ApiError> {
    let Json(request) = payload?;
    request.validate()?;

    let created = state.sales.create(&request.into_sale(now_millis())).await?;
    Ok((StatusCode::CREATED, Json(created.into())))
}

/// Lists sales, newest first
pub async fn list_sales(
    State(state): State<AppState>,
    query: Result<Query<ListSalesQuery>, QueryRejection>,
) -> Result<Json<PageResult<SaleResponse>>, ApiError> {
    let Query(query) = query?;
    query
        .validate()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let page = state.sales.list(query.page(), query.per_page()).await?;
    Ok(Json(page.map(SaleResponse::from)))
}

/// Daily or monthly sales totals
pub async fn get_sales_report(
    State(state): State<AppState>,
    query: Result<Query<ReportQuery>, QueryRejection>,
) -> Result<Json<Vec<ReportEntry>>, ApiError> {
    let Query(query) = query?;
    let stats_type: StatsType = query.stats_type.as_deref().unwrap_or_default().parse()?;

    let report = state.sales.sales_report(stats_type, now_millis()).await?;
    Ok(Json(report))
}

/// Gets a sale by ID
pub async fn get_sale(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
) -> Result<Json<SaleResponse>, ApiError> {
    let Path(id) = path?;
    let sale = state.sales.find_by_id(&id).await?;
    Ok(Json(sale.into()))
}

/// Partially updates a sale
pub async fn update_sale(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
    payload: Result<Json<UpdateSaleRequest>, JsonRejection>,
) -> Result<Json<SaleResponse>, ApiError> {
    let Path(id) = path?;
    let Json(request) = payload?;
    request.validate()?;

    let patch = SalePatch::from(request);
    if patch.is_empty() {
        return Err(ApiError::BadRequest("no fields to update".to_string()));
    }

    let updated = state.sales.update(&id, &patch).await?;
    Ok(Json(updated.into()))
}

/// Deletes a sale, returning it
pub async fn delete_sale(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
) -> Result<Json<SaleResponse>, ApiError> {
    let Path(id) = path?;
    let removed = state.sales.delete(&id).await?;
    Ok(Json(removed.into()))
}

/// Seeds random demo sales
pub async fn generate_random_data(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<GenerateResponse>), ApiError> {
    let created = state
        .sales
        .generate_random(state.config.seed_count, now_millis())
        .await?;
    Ok((StatusCode::CREATED, Json(GenerateResponse { created })))
}
