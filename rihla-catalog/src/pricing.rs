use rihla_core::{BookingError, BookingRequest, InventoryItem};
use serde::{Deserialize, Serialize};

/// Deterministic price for one booking request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Quote {
    /// Listing price plus any tier surcharge, per night or per seat.
    pub unit_price: i64,
    /// Nights for date-ranged items, seats for seat items.
    pub billable_units: u32,
    pub total: i64,
}

#[derive(Debug, Clone, Default)]
pub struct PricingEngine;

impl PricingEngine {
    pub fn new() -> Self {
        Self
    }

    /// `total = (unit_price + surcharge) * max(1, billable_units)`.
    pub fn quote(&self, item: &InventoryItem, request: &BookingRequest) -> Result<Quote, BookingError> {
        let surcharge = match request.room_tier() {
            None => 0,
            Some(code) => {
                let tiers = item.room_tiers();
                if tiers.is_empty() {
                    return Err(BookingError::Validation(format!(
                        "room tiers are not offered for {} bookings",
                        item.kind()
                    )));
                }
                tiers
                    .iter()
                    .find(|tier| tier.code == code)
                    .map(|tier| tier.surcharge)
                    .ok_or_else(|| BookingError::Validation(format!("unknown room tier: {}", code)))?
            }
        };

        let unit_price = item
            .listing()
            .unit_price
            .checked_add(surcharge)
            .ok_or_else(|| BookingError::Validation("unit price overflow".to_string()))?;

        if unit_price < 0 {
            return Err(BookingError::Validation(format!(
                "listing {} has a negative price",
                item.id()
            )));
        }

        let billable_units = request.billable_units().max(1);
        let total = unit_price
            .checked_mul(billable_units as i64)
            .ok_or_else(|| BookingError::Validation("total price overflow".to_string()))?;

        Ok(Quote {
            unit_price,
            billable_units,
            total,
        })
    }
}
