use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle transitions published for every booking.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingEventKind {
    BookingCreated,
    BookingCancelled,
    PaymentConfirmed,
}

impl BookingEventKind {
    /// Topic name used by downstream message brokers.
    pub fn topic(&self) -> &'static str {
        match self {
            BookingEventKind::BookingCreated => "booking.created",
            BookingEventKind::BookingCancelled => "booking.cancelled",
            BookingEventKind::PaymentConfirmed => "booking.payment_confirmed",
        }
    }

    /// Name of the event as shown on SSE streams.
    pub fn name(&self) -> &'static str {
        match self {
            BookingEventKind::BookingCreated => "booking_created",
            BookingEventKind::BookingCancelled => "booking_cancelled",
            BookingEventKind::PaymentConfirmed => "payment_confirmed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BookingEvent {
    pub kind: BookingEventKind,
    pub booking_id: Uuid,
    /// Owner of the booked item; subscribers are scoped by this field.
    pub provider_id: Uuid,
    pub customer_id: String,
    pub item_type: String,
    pub item_id: Uuid,
    pub quantity: u32,
    pub total_price: i64,
    pub timestamp: i64,
}

impl BookingEvent {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
