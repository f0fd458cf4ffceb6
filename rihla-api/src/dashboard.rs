use axum::{
    extract::{Path, State},
    routing::get,
    Extension, Json, Router,
};
use rihla_booking::{DashboardScope, DashboardSnapshot, ProviderStats};
use rihla_core::Principal;
use rihla_shared::ProviderId;

use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/providers/{id}/dashboard", get(provider_dashboard))
        .route("/v1/dashboard", get(dashboard))
}

/// GET /v1/providers/{id}/dashboard
async fn provider_dashboard(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(provider_id): Path<ProviderId>,
) -> Result<Json<ProviderStats>, AppError> {
    let stats = state.dashboard.provider_stats(&principal, provider_id).await?;
    Ok(Json(stats))
}

/// GET /v1/dashboard
/// Admins see every provider, providers their own.
async fn dashboard(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<DashboardSnapshot>, AppError> {
    let scope = DashboardScope::for_principal(&principal)?;
    let snapshot = state.dashboard.get_snapshot(&principal, scope).await?;
    Ok(Json(snapshot))
}
