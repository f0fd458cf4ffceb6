use async_trait::async_trait;
use rihla_core::{Booking, BookingRepository, BookingState, StorageError};
use rihla_shared::{BookingId, ProviderId};
use std::collections::HashMap;
use std::sync::RwLock;

/// Manages booking records in process memory. Records are never deleted.
#[derive(Default)]
pub struct InMemoryBookingRepository {
    bookings: RwLock<HashMap<BookingId, Booking>>,
}

impl InMemoryBookingRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.bookings.read().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> StorageError {
    StorageError::Persistence("booking store lock poisoned".to_string())
}

#[async_trait]
impl BookingRepository for InMemoryBookingRepository {
    async fn insert(&self, booking: &Booking) -> Result<(), StorageError> {
        let mut bookings = self.bookings.write().map_err(|_| poisoned())?;
        if bookings.contains_key(&booking.id) {
            return Err(StorageError::Persistence(format!(
                "booking {} already exists",
                booking.id
            )));
        }
        bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn get(&self, id: BookingId) -> Result<Option<Booking>, StorageError> {
        let bookings = self.bookings.read().map_err(|_| poisoned())?;
        Ok(bookings.get(&id).cloned())
    }

    async fn transition(
        &self,
        id: BookingId,
        from: BookingState,
        to: BookingState,
    ) -> Result<bool, StorageError> {
        let mut bookings = self.bookings.write().map_err(|_| poisoned())?;
        match bookings.get_mut(&id) {
            Some(booking) if booking.state() == from => {
                booking.apply(to);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_for_provider(
        &self,
        provider_id: Option<ProviderId>,
    ) -> Result<Vec<Booking>, StorageError> {
        let bookings = self.bookings.read().map_err(|_| poisoned())?;
        let mut matching: Vec<Booking> = bookings
            .values()
            .filter(|b| provider_id.map_or(true, |p| b.provider_id == p))
            .cloned()
            .collect();
        matching.sort_by_key(|b| b.created_at);
        Ok(matching)
    }
}
