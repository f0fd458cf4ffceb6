use async_trait::async_trait;
use chrono::NaiveDate;
use rihla_shared::{BookingEvent, BookingId, ItemId, ProviderId};
use serde::{Deserialize, Serialize};

use crate::booking::{Booking, BookingState, BookingTarget, DateRange};
use crate::inventory::{InventoryItem, ItemKind};
use crate::BookingError;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum StorageError {
    /// Lock contention or backend unavailability; eligible for a bounded retry.
    #[error("transient storage error: {0}")]
    Transient(String),

    #[error("storage error: {0}")]
    Persistence(String),

    /// A value the backend cannot represent; nothing was written.
    #[error("value out of range: {0}")]
    OutOfRange(String),
}

impl StorageError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Transient(_))
    }
}

impl From<StorageError> for BookingError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Transient(msg) => BookingError::TransientStorage(msg),
            StorageError::Persistence(msg) => BookingError::Persistence(msg),
            StorageError::OutOfRange(msg) => BookingError::Validation(msg),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Insufficient capacity: requested {requested}, available {available}")]
    InsufficientCapacity {
        requested: u32,
        available: u32,
        /// First day without enough capacity, for date-ranged targets.
        day: Option<NaiveDate>,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl LedgerError {
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::Storage(e) if e.is_transient())
    }
}

impl From<LedgerError> for BookingError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientCapacity {
                requested,
                available,
                day,
            } => BookingError::AvailabilityConflict {
                requested,
                available,
                day,
            },
            LedgerError::Storage(e) => e.into(),
        }
    }
}

// ============================================================================
// Availability Ledger
// ============================================================================

/// A capacity hold, recorded by the ledger under the booking's id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reservation {
    pub booking_id: BookingId,
    pub target: BookingTarget,
    pub date_range: Option<DateRange>,
    pub quantity: u32,
    /// Item capacity, used to seed the item's record on first touch.
    pub capacity: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reserved {
    Created,
    /// The booking already held this reservation; nothing changed.
    Existing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Released {
    Restored { quantity: u32 },
    AlreadyReleased,
}

/// Authoritative remaining-capacity store. The only writer of availability.
#[async_trait]
pub trait AvailabilityLedger: Send + Sync {
    /// Check-and-decrement capacity for the reservation as one atomic step.
    async fn reserve(&self, reservation: &Reservation) -> Result<Reserved, LedgerError>;

    /// Restore exactly what `booking_id` reserved. Repeated calls are no-ops.
    async fn release(
        &self,
        booking_id: BookingId,
        target: &BookingTarget,
    ) -> Result<Released, LedgerError>;

    /// Remaining capacity (minimum over the range for date-ranged targets),
    /// or `None` if the item has never been reserved against.
    async fn availability(
        &self,
        target: &BookingTarget,
        date_range: Option<&DateRange>,
    ) -> Result<Option<u32>, LedgerError>;
}

// ============================================================================
// Catalog & Bookings
// ============================================================================

#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn get_item(
        &self,
        kind: ItemKind,
        id: ItemId,
    ) -> Result<Option<InventoryItem>, StorageError>;

    /// Item ids are unique across kinds.
    async fn get_item_by_id(&self, id: ItemId) -> Result<Option<InventoryItem>, StorageError>;

    /// Insert, or replace an item of the same kind and provider. Returns
    /// `false` without writing when the id is taken by another provider or
    /// another kind.
    async fn upsert_item(&self, item: &InventoryItem) -> Result<bool, StorageError>;

    async fn set_active(
        &self,
        kind: ItemKind,
        id: ItemId,
        active: bool,
    ) -> Result<bool, StorageError>;

    /// Active listings, optionally restricted to one provider.
    async fn count_active(&self, provider_id: Option<ProviderId>) -> Result<u64, StorageError>;
}

#[async_trait]
pub trait BookingRepository: Send + Sync {
    async fn insert(&self, booking: &Booking) -> Result<(), StorageError>;

    async fn get(&self, id: BookingId) -> Result<Option<Booking>, StorageError>;

    /// Compare-and-set the status pair. Returns `false` when the stored state
    /// no longer equals `from`.
    async fn transition(
        &self,
        id: BookingId,
        from: BookingState,
        to: BookingState,
    ) -> Result<bool, StorageError>;

    /// Bookings for one provider, or for every provider when `None`.
    async fn list_for_provider(
        &self,
        provider_id: Option<ProviderId>,
    ) -> Result<Vec<Booking>, StorageError>;
}

// ============================================================================
// Events
// ============================================================================

#[derive(Debug, thiserror::Error)]
#[error("event publish failed: {0}")]
pub struct PublishError(pub String);

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &BookingEvent) -> Result<(), PublishError>;
}
