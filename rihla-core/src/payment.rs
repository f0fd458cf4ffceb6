use rihla_shared::BookingId;
use serde::{Deserialize, Serialize};

use crate::booking::Booking;
use crate::BookingError;

/// Intent status as reported by the payment processor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessorStatus {
    Processing,
    Succeeded,
    Canceled,
    Failed,
}

/// Payment confirmation delivered by the processor webhook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentNotification {
    pub intent_id: String,
    pub booking_id: BookingId,
    /// Captured amount in minor units.
    pub amount: i64,
    pub status: ProcessorStatus,
}

impl PaymentNotification {
    pub fn confirms_payment(&self) -> bool {
        self.status == ProcessorStatus::Succeeded
    }

    /// The captured amount must match the frozen booking total.
    pub fn check_amount(&self, booking: &Booking) -> Result<(), BookingError> {
        if self.amount != booking.total_price {
            return Err(BookingError::Validation(format!(
                "payment {} captured {} but booking {} totals {}",
                self.intent_id, self.amount, booking.id, booking.total_price
            )));
        }
        Ok(())
    }
}
