use chrono::{DateTime, Duration, NaiveDate, Utc};
use rihla_shared::{BookingEvent, BookingEventKind, BookingId, ItemId, ProviderId, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::inventory::ItemKind;
use crate::BookingError;

/// Tagged reference to exactly one inventory item.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "item_type", content = "item_id", rename_all = "snake_case")]
pub enum BookingTarget {
    Hotel(ItemId),
    Package(ItemId),
    Flight(ItemId),
    Transport(ItemId),
}

impl BookingTarget {
    pub fn new(kind: ItemKind, id: ItemId) -> Self {
        match kind {
            ItemKind::Hotel => BookingTarget::Hotel(id),
            ItemKind::Package => BookingTarget::Package(id),
            ItemKind::Flight => BookingTarget::Flight(id),
            ItemKind::Transport => BookingTarget::Transport(id),
        }
    }

    pub fn kind(&self) -> ItemKind {
        match self {
            BookingTarget::Hotel(_) => ItemKind::Hotel,
            BookingTarget::Package(_) => ItemKind::Package,
            BookingTarget::Flight(_) => ItemKind::Flight,
            BookingTarget::Transport(_) => ItemKind::Transport,
        }
    }

    pub fn item_id(&self) -> ItemId {
        match *self {
            BookingTarget::Hotel(id)
            | BookingTarget::Package(id)
            | BookingTarget::Flight(id)
            | BookingTarget::Transport(id) => id,
        }
    }

    pub fn is_date_ranged(&self) -> bool {
        self.kind().is_date_ranged()
    }
}

impl fmt::Display for BookingTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.item_id())
    }
}

/// Half-open interval of calendar days `[start, end)`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Equal or inverted ranges collapse to a single night starting at `start`.
    /// Fails when that night would end past the last representable date.
    pub fn normalized(self) -> Result<Self, BookingError> {
        if self.end > self.start {
            return Ok(self);
        }
        let end = self.start.checked_add_signed(Duration::days(1)).ok_or_else(|| {
            BookingError::Validation(format!("start date {} is out of range", self.start))
        })?;
        Ok(Self {
            start: self.start,
            end,
        })
    }

    /// Number of nights, never less than one.
    pub fn nights(&self) -> u32 {
        let days = (self.end - self.start).num_days();
        days.clamp(1, u32::MAX as i64) as u32
    }

    /// Every calendar day the range occupies.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let start = self.start;
        (0..self.nights()).map(move |offset| start + Duration::days(offset as i64))
    }

    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day < self.end
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BookingStatus::Pending),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            other => Err(format!("unknown booking status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Unpaid,
    Paid,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unpaid" => Ok(PaymentStatus::Unpaid),
            "paid" => Ok(PaymentStatus::Paid),
            "refunded" => Ok(PaymentStatus::Refunded),
            other => Err(format!("unknown payment status: {}", other)),
        }
    }
}

/// Status pair written atomically by every lifecycle transition.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct BookingState {
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
}

impl BookingState {
    pub const PENDING: BookingState = BookingState {
        status: BookingStatus::Pending,
        payment_status: PaymentStatus::Unpaid,
    };

    pub const CONFIRMED: BookingState = BookingState {
        status: BookingStatus::Confirmed,
        payment_status: PaymentStatus::Paid,
    };

    /// State reached by cancelling from `self`; paid bookings are refunded.
    pub fn cancelled(&self) -> BookingState {
        let payment_status = match self.payment_status {
            PaymentStatus::Paid | PaymentStatus::Refunded => PaymentStatus::Refunded,
            PaymentStatus::Unpaid => PaymentStatus::Unpaid,
        };
        BookingState {
            status: BookingStatus::Cancelled,
            payment_status,
        }
    }
}

// ============================================================================
// Booking Request
// ============================================================================

/// A booking request validated once at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingRequest {
    target: BookingTarget,
    date_range: Option<DateRange>,
    quantity: u32,
    room_tier: Option<String>,
}

impl BookingRequest {
    pub fn new(
        target: BookingTarget,
        date_range: Option<DateRange>,
        quantity: u32,
        room_tier: Option<String>,
    ) -> Result<Self, BookingError> {
        if quantity < 1 {
            return Err(BookingError::Validation(
                "quantity must be at least 1".to_string(),
            ));
        }

        let date_range = match (target.is_date_ranged(), date_range) {
            (true, Some(range)) => Some(range.normalized()?),
            (true, None) => {
                return Err(BookingError::Validation(format!(
                    "a date range is required to book a {}",
                    target.kind()
                )))
            }
            (false, Some(_)) => {
                return Err(BookingError::Validation(format!(
                    "a {} booking does not take a date range",
                    target.kind()
                )))
            }
            (false, None) => None,
        };

        let room_tier = room_tier.filter(|tier| !tier.trim().is_empty());

        Ok(Self {
            target,
            date_range,
            quantity,
            room_tier,
        })
    }

    pub fn target(&self) -> BookingTarget {
        self.target
    }

    pub fn date_range(&self) -> Option<DateRange> {
        self.date_range
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    pub fn room_tier(&self) -> Option<&str> {
        self.room_tier.as_deref()
    }

    /// Rejects stays longer than `max_nights`.
    pub fn ensure_stay_within(&self, max_nights: u32) -> Result<(), BookingError> {
        match self.date_range {
            Some(range) if range.nights() > max_nights => Err(BookingError::Validation(format!(
                "a stay of {} nights exceeds the limit of {}",
                range.nights(),
                max_nights
            ))),
            _ => Ok(()),
        }
    }

    /// Nights for date-ranged targets, the requested quantity otherwise.
    pub fn billable_units(&self) -> u32 {
        match self.date_range {
            Some(range) => range.nights(),
            None => self.quantity,
        }
    }
}

// ============================================================================
// Booking
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Booking {
    pub id: BookingId,
    pub customer_id: UserId,
    pub provider_id: ProviderId,
    pub target: BookingTarget,
    pub date_range: Option<DateRange>,
    pub quantity: u32,
    pub room_tier: Option<String>,
    /// Unit price including any tier surcharge, frozen at creation.
    pub unit_price_snapshot: i64,
    pub total_price: i64,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// Start a pending, unpaid booking for an already reserved request.
    pub fn pending(
        id: BookingId,
        customer_id: UserId,
        provider_id: ProviderId,
        request: &BookingRequest,
        unit_price_snapshot: i64,
        total_price: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            customer_id,
            provider_id,
            target: request.target(),
            date_range: request.date_range(),
            quantity: request.quantity(),
            room_tier: request.room_tier().map(str::to_string),
            unit_price_snapshot,
            total_price,
            status: BookingStatus::Pending,
            payment_status: PaymentStatus::Unpaid,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn state(&self) -> BookingState {
        BookingState {
            status: self.status,
            payment_status: self.payment_status,
        }
    }

    pub fn apply(&mut self, state: BookingState) {
        self.status = state.status;
        self.payment_status = state.payment_status;
        self.updated_at = Utc::now();
    }

    pub fn is_terminal(&self) -> bool {
        self.status == BookingStatus::Cancelled
    }

    pub fn billable_units(&self) -> u32 {
        match self.date_range {
            Some(range) => range.nights(),
            None => self.quantity,
        }
    }

    pub fn event(&self, kind: BookingEventKind) -> BookingEvent {
        BookingEvent {
            kind,
            booking_id: self.id,
            provider_id: self.provider_id,
            customer_id: self.customer_id.clone(),
            item_type: self.target.kind().to_string(),
            item_id: self.target.item_id(),
            quantity: self.quantity,
            total_price: self.total_price,
            timestamp: Utc::now().timestamp(),
        }
    }
}
