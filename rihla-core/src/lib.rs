pub mod booking;
pub mod identity;
pub mod inventory;
pub mod payment;
pub mod repository;

use chrono::NaiveDate;
use rihla_shared::BookingId;

pub use booking::{
    Booking, BookingRequest, BookingState, BookingStatus, BookingTarget, DateRange, PaymentStatus,
};
pub use identity::{
    authorize, ensure, Capability, Principal, PrincipalResolver, ResourceOwner, Role, RoleDirectory,
    RoleGrant, StaticRoleDirectory, TokenVerifier,
};
pub use inventory::{CapacityModel, InventoryItem, ItemKind, Listing, RoomTier};
pub use repository::{
    AvailabilityLedger, BookingRepository, CatalogRepository, EventPublisher, LedgerError,
    PublishError, Released, Reservation, Reserved, StorageError,
};

/// Failure taxonomy shared by every booking operation.
#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Availability conflict: requested {requested}, only {available} remaining")]
    AvailabilityConflict {
        requested: u32,
        available: u32,
        day: Option<NaiveDate>,
    },

    #[error("Not authorized: {0}")]
    Authorization(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Booking {0} is already cancelled")]
    AlreadyTerminal(BookingId),

    #[error("Transient storage failure: {0}")]
    TransientStorage(String),

    #[error("Persistence failure: {0}")]
    Persistence(String),
}

impl BookingError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        BookingError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, BookingError::TransientStorage(_))
    }
}

pub type CoreResult<T> = Result<T, BookingError>;
