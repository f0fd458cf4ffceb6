use axum::{extract::State, http::header, response::IntoResponse};
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use rihla_booking::Subscription;
use rihla_core::BookingError;
use rihla_shared::BookingEventKind;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::error::AppError;
use crate::state::AppState;

/// Outcome label of `rihla_bookings_total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingOutcome {
    Created,
    Conflict,
    Rejected,
    Failed,
}

impl BookingOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingOutcome::Created => "created",
            BookingOutcome::Conflict => "conflict",
            BookingOutcome::Rejected => "rejected",
            BookingOutcome::Failed => "failed",
        }
    }

    pub fn of(result: &Result<impl Sized, BookingError>) -> Self {
        match result {
            Ok(_) => BookingOutcome::Created,
            Err(BookingError::AvailabilityConflict { .. }) => BookingOutcome::Conflict,
            Err(
                BookingError::Validation(_)
                | BookingError::NotFound { .. }
                | BookingError::Authorization(_)
                | BookingError::Authentication(_),
            ) => BookingOutcome::Rejected,
            Err(_) => BookingOutcome::Failed,
        }
    }
}

/// Counters on a registry owned by one app instance.
pub struct ApiMetrics {
    registry: Registry,
    bookings: IntCounterVec,
    cancellations: IntCounter,
    payments_confirmed: IntCounter,
}

impl ApiMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let bookings = IntCounterVec::new(
            Opts::new("rihla_bookings_total", "Booking attempts by outcome"),
            &["outcome"],
        )?;
        let cancellations =
            IntCounter::new("rihla_cancellations_total", "Bookings cancelled")?;
        let payments_confirmed =
            IntCounter::new("rihla_payments_confirmed_total", "Payments confirmed")?;

        registry.register(Box::new(bookings.clone()))?;
        registry.register(Box::new(cancellations.clone()))?;
        registry.register(Box::new(payments_confirmed.clone()))?;

        Ok(Self {
            registry,
            bookings,
            cancellations,
            payments_confirmed,
        })
    }

    pub fn record_booking(&self, outcome: BookingOutcome) {
        self.bookings.with_label_values(&[outcome.as_str()]).inc();
    }

    pub fn bookings(&self, outcome: BookingOutcome) -> u64 {
        self.bookings.with_label_values(&[outcome.as_str()]).get()
    }

    pub fn cancellations(&self) -> u64 {
        self.cancellations.get()
    }

    pub fn payments_confirmed(&self) -> u64 {
        self.payments_confirmed.get()
    }

    /// Count lifecycle transitions as they are dispatched, so repeated
    /// idempotent calls are not counted twice.
    pub fn track(self: Arc<Self>, mut subscription: Subscription) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = subscription.recv().await {
                match event.kind {
                    BookingEventKind::BookingCancelled => self.cancellations.inc(),
                    BookingEventKind::PaymentConfirmed => self.payments_confirmed.inc(),
                    BookingEventKind::BookingCreated => {}
                }
            }
        })
    }

    pub fn render(&self) -> Result<String, AppError> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(anyhow::Error::from)?;
        String::from_utf8(buffer).map_err(|e| AppError::Anyhow(e.into()))
    }
}

/// GET /metrics
pub async fn metrics_handler(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let body = state.metrics.render()?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body))
}
