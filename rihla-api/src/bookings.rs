use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use axum_extra::extract::WithRejection;
use rihla_core::{
    Booking, BookingError, BookingRequest, BookingStatus, BookingTarget, DateRange, ItemKind,
    Principal,
};
use rihla_shared::{BookingId, ItemId};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::metrics::BookingOutcome;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateBookingBody {
    pub item_type: ItemKind,
    pub item_id: ItemId,
    /// `{ "start": .., "end": .. }`, required for hotels and car rentals.
    pub date_range: Option<DateRange>,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    pub room_tier: Option<String>,
}

fn default_quantity() -> u32 {
    1
}

impl TryFrom<CreateBookingBody> for BookingRequest {
    type Error = BookingError;

    fn try_from(body: CreateBookingBody) -> Result<Self, Self::Error> {
        BookingRequest::new(
            BookingTarget::new(body.item_type, body.item_id),
            body.date_range,
            body.quantity,
            body.room_tier,
        )
    }
}

#[derive(Debug, Serialize)]
pub struct BookingCreated {
    pub booking_id: BookingId,
    pub status: BookingStatus,
    pub total_price: i64,
}

#[derive(Debug, Serialize)]
pub struct Ack {
    pub ack: bool,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/bookings", post(create_booking))
        .route("/v1/bookings/{id}", get(get_booking))
        .route("/v1/bookings/{id}/cancel", post(cancel_booking))
}

/// POST /v1/bookings
async fn create_booking(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    WithRejection(Json(body), _): WithRejection<Json<CreateBookingBody>, AppError>,
) -> Result<(StatusCode, Json<BookingCreated>), AppError> {
    let result = match BookingRequest::try_from(body) {
        Ok(request) => state.orchestrator.create_booking(&principal, request).await,
        Err(e) => Err(e),
    };
    state.metrics.record_booking(BookingOutcome::of(&result));

    let booking = result?;
    Ok((
        StatusCode::CREATED,
        Json(BookingCreated {
            booking_id: booking.id,
            status: booking.status,
            total_price: booking.total_price,
        }),
    ))
}

/// GET /v1/bookings/{id}
async fn get_booking(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<BookingId>,
) -> Result<Json<Booking>, AppError> {
    let booking = state.orchestrator.get_booking(&principal, id).await?;
    Ok(Json(booking))
}

/// POST /v1/bookings/{id}/cancel
async fn cancel_booking(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<BookingId>,
) -> Result<Json<Ack>, AppError> {
    state.orchestrator.cancel_booking(&principal, id).await?;
    Ok(Json(Ack { ack: true }))
}
