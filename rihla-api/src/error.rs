use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rihla_core::BookingError;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Booking(#[from] BookingError),

    #[error("Webhook secret missing or invalid")]
    WebhookSecret,

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::Booking(err) => match err {
                BookingError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
                BookingError::NotFound { .. } => {
                    (StatusCode::NOT_FOUND, "NOT_FOUND", err.to_string())
                }
                BookingError::AvailabilityConflict {
                    requested,
                    available,
                    day,
                } => {
                    let mut msg = format!(
                        "requested {} unit(s), only {} unit(s) remain",
                        requested, available
                    );
                    if let Some(day) = day {
                        msg.push_str(&format!(" on {}", day));
                    }
                    (StatusCode::CONFLICT, "AVAILABILITY_CONFLICT", msg)
                }
                BookingError::AlreadyTerminal(_) => {
                    (StatusCode::CONFLICT, "ALREADY_TERMINAL", err.to_string())
                }
                BookingError::Authorization(msg) => {
                    (StatusCode::FORBIDDEN, "AUTHORIZATION_ERROR", msg.clone())
                }
                BookingError::Authentication(msg) => {
                    (StatusCode::UNAUTHORIZED, "AUTHENTICATION_ERROR", msg.clone())
                }
                BookingError::TransientStorage(msg) => {
                    tracing::warn!("Storage unavailable after retries: {}", msg);
                    (
                        StatusCode::SERVICE_UNAVAILABLE,
                        "TRY_AGAIN",
                        "Storage is temporarily unavailable, try again".to_string(),
                    )
                }
                BookingError::Persistence(msg) => {
                    tracing::error!("Persistence failure: {}", msg);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "PERSISTENCE_ERROR",
                        "Internal Server Error".to_string(),
                    )
                }
            },
            AppError::WebhookSecret => (
                StatusCode::UNAUTHORIZED,
                "AUTHENTICATION_ERROR",
                self.to_string(),
            ),
            AppError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "Internal Server Error".to_string(),
                )
            }
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Booking(BookingError::Validation(rejection.body_text()))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();

        let body = Json(json!({
            "error": code,
            "message": message,
        }));

        (status, body).into_response()
    }
}
