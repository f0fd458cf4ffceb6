use axum::{
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use axum_extra::extract::WithRejection;
use constant_time_eq::constant_time_eq;
use rihla_core::payment::PaymentNotification;
use rihla_core::{BookingStatus, PaymentStatus, Principal};
use rihla_shared::BookingId;
use serde::Serialize;

use crate::error::AppError;
use crate::state::AppState;

pub const WEBHOOK_SECRET_HEADER: &str = "x-webhook-secret";

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    pub booking_id: BookingId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<BookingStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_status: Option<PaymentStatus>,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/webhooks/payments", post(handle_payment_webhook))
}

/// An empty configured secret never matches, so a missing header cannot
/// pass against it.
fn secret_matches(given: &[u8], expected: &[u8]) -> bool {
    !expected.is_empty() && constant_time_eq(given, expected)
}

/// POST /v1/webhooks/payments
/// Payment processor callback. Runs as the system principal once the
/// shared secret checks out.
async fn handle_payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    WithRejection(Json(notification), _): WithRejection<Json<PaymentNotification>, AppError>,
) -> Result<Json<WebhookAck>, AppError> {
    let given = headers
        .get(WEBHOOK_SECRET_HEADER)
        .map(|v| v.as_bytes())
        .unwrap_or_default();
    if !secret_matches(given, state.webhook_secret.as_bytes()) {
        tracing::warn!(intent_id = %notification.intent_id, "Rejected payment webhook with bad secret");
        return Err(AppError::WebhookSecret);
    }

    tracing::info!(
        intent_id = %notification.intent_id,
        booking_id = %notification.booking_id,
        status = ?notification.status,
        "Received payment webhook"
    );

    let booking = state
        .orchestrator
        .apply_payment_notification(&Principal::system(), &notification)
        .await?;

    Ok(Json(WebhookAck {
        received: true,
        booking_id: notification.booking_id,
        status: booking.as_ref().map(|b| b.status),
        payment_status: booking.as_ref().map(|b| b.payment_status),
    }))
}
