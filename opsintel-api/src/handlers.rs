use crate::{state::AppState, ApiError, ApiResponse, ApiResult, Overview};
use axum::{extract::State, Json};
use opsintel_anomaly::{AlertFeed, AlertSummary, DetectionReport};
use opsintel_core::model::{DailyMetrics, ProductBreakdown, TpvComparison};
use tracing::debug;

pub async fn health_check() -> ApiResult<String> {
    Ok(Json(ApiResponse::success("OK".to_string())))
}

pub async fn get_alerts(State(state): State<AppState>) -> ApiResult<AlertFeed> {
    let feed = state.run_checks().await.feed();
    debug!(
        alerts = feed.alerts.len(),
        unavailable = feed.unavailable.len(),
        "Serving alert feed"
    );
    Ok(Json(ApiResponse::success(feed)))
}

pub async fn get_report(State(state): State<AppState>) -> ApiResult<DetectionReport> {
    Ok(Json(ApiResponse::success(state.run_checks().await)))
}

pub async fn get_summary(State(state): State<AppState>) -> ApiResult<AlertSummary> {
    Ok(Json(ApiResponse::success(state.run_checks().await.summary)))
}

pub async fn get_overview(State(state): State<AppState>) -> ApiResult<Overview> {
    let overview = Overview {
        date_range: state.storage.date_range().await?,
        total_tpv: state.storage.total_tpv().await?,
    };
    Ok(Json(ApiResponse::success(overview)))
}

pub async fn get_daily_metrics(State(state): State<AppState>) -> ApiResult<Vec<DailyMetrics>> {
    Ok(Json(ApiResponse::success(state.storage.daily_metrics().await?)))
}

pub async fn get_products(State(state): State<AppState>) -> ApiResult<Vec<ProductBreakdown>> {
    Ok(Json(ApiResponse::success(
        state.storage.tpv_by_product().await?,
    )))
}

pub async fn get_comparison(State(state): State<AppState>) -> ApiResult<TpvComparison> {
    let comparison = state
        .storage
        .tpv_comparison()
        .await?
        .ok_or_else(|| ApiError::not_found("No data loaded"))?;
    Ok(Json(ApiResponse::success(comparison)))
}

pub async fn get_metrics(State(state): State<AppState>) -> Result<String, ApiError> {
    Ok(state.metrics.export()?)
}
