use axum::{
    extract::{Path, State},
    routing::{get, put},
    Extension, Json, Router,
};
use axum_extra::extract::WithRejection;
use rihla_core::{InventoryItem, ItemKind, Principal};
use rihla_shared::ItemId;
use serde::Deserialize;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct Activation {
    pub active: bool,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/inventory", put(upsert_item))
        .route("/v1/inventory/{kind}/{id}", get(get_item))
        .route("/v1/inventory/{kind}/{id}/active", put(set_active))
}

/// PUT /v1/inventory
async fn upsert_item(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    WithRejection(Json(item), _): WithRejection<Json<InventoryItem>, AppError>,
) -> Result<Json<InventoryItem>, AppError> {
    let item = state.catalog.upsert_item(&principal, item).await?;
    Ok(Json(item))
}

/// GET /v1/inventory/{kind}/{id}
/// Listings are public.
async fn get_item(
    State(state): State<AppState>,
    Path((kind, id)): Path<(ItemKind, ItemId)>,
) -> Result<Json<InventoryItem>, AppError> {
    let item = state.catalog.get_item(kind, id).await?;
    Ok(Json(item))
}

/// PUT /v1/inventory/{kind}/{id}/active
async fn set_active(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path((kind, id)): Path<(ItemKind, ItemId)>,
    WithRejection(Json(body), _): WithRejection<Json<Activation>, AppError>,
) -> Result<Json<InventoryItem>, AppError> {
    state.catalog.set_active(&principal, kind, id, body.active).await?;
    let item = state.catalog.get_item(kind, id).await?;
    Ok(Json(item))
}
