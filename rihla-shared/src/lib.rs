pub mod models;

pub use models::events::{BookingEvent, BookingEventKind};

/// Identifier of a bookable inventory item.
pub type ItemId = uuid::Uuid;
/// Identifier of the provider owning a set of inventory items.
pub type ProviderId = uuid::Uuid;
/// Identifier of a booking record.
pub type BookingId = uuid::Uuid;
/// Subject of an authenticated principal, as issued by the identity provider.
pub type UserId = String;
