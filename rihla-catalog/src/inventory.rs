use async_trait::async_trait;
use chrono::NaiveDate;
use rihla_core::repository::{AvailabilityLedger, Released, Reservation, Reserved};
use rihla_core::{BookingTarget, DateRange, LedgerError, StorageError};
use rihla_shared::BookingId;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock};

/// Remaining capacity for one item.
#[derive(Debug)]
enum Occupancy {
    /// Seats left on a single departure.
    Seats { available: u32 },
    /// Units already reserved per calendar day; absent days are empty.
    Days { reserved: BTreeMap<NaiveDate, u32> },
}

#[derive(Debug, Clone)]
struct Hold {
    date_range: Option<DateRange>,
    quantity: u32,
}

#[derive(Debug)]
struct ItemAvailability {
    capacity: u32,
    occupancy: Occupancy,
    holds: HashMap<BookingId, Hold>,
}

impl ItemAvailability {
    fn seed(target: &BookingTarget, capacity: u32) -> Self {
        let occupancy = if target.is_date_ranged() {
            Occupancy::Days {
                reserved: BTreeMap::new(),
            }
        } else {
            Occupancy::Seats {
                available: capacity,
            }
        };

        Self {
            capacity,
            occupancy,
            holds: HashMap::new(),
        }
    }

    fn remaining(&self, date_range: Option<&DateRange>) -> u32 {
        match (&self.occupancy, date_range) {
            (Occupancy::Seats { available }, _) => *available,
            (Occupancy::Days { reserved }, Some(range)) => range
                .days()
                .map(|day| self.capacity.saturating_sub(reserved.get(&day).copied().unwrap_or(0)))
                .min()
                .unwrap_or(self.capacity),
            (Occupancy::Days { reserved }, None) => {
                let peak = reserved.values().copied().max().unwrap_or(0);
                self.capacity.saturating_sub(peak)
            }
        }
    }
}

/// In-process Availability Ledger. Each item is guarded by its own mutex, so
/// check-and-decrement for one item is serialized while other items proceed.
#[derive(Default)]
pub struct InMemoryLedger {
    items: RwLock<HashMap<BookingTarget, Arc<Mutex<ItemAvailability>>>>,
}

fn poisoned() -> LedgerError {
    LedgerError::Storage(StorageError::Persistence(
        "availability lock poisoned".to_string(),
    ))
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn existing(&self, target: &BookingTarget) -> Result<Option<Arc<Mutex<ItemAvailability>>>, LedgerError> {
        let items = self.items.read().map_err(|_| poisoned())?;
        Ok(items.get(target).cloned())
    }

    fn seeded(&self, target: &BookingTarget, capacity: u32) -> Result<Arc<Mutex<ItemAvailability>>, LedgerError> {
        if let Some(item) = self.existing(target)? {
            return Ok(item);
        }

        let mut items = self.items.write().map_err(|_| poisoned())?;
        let item = items
            .entry(*target)
            .or_insert_with(|| Arc::new(Mutex::new(ItemAvailability::seed(target, capacity))));
        Ok(item.clone())
    }

    pub fn reserve_now(&self, reservation: &Reservation) -> Result<Reserved, LedgerError> {
        let item = self.seeded(&reservation.target, reservation.capacity)?;
        let mut item = item.lock().map_err(|_| poisoned())?;

        if item.holds.contains_key(&reservation.booking_id) {
            return Ok(Reserved::Existing);
        }

        let quantity = reservation.quantity;
        let capacity = item.capacity;

        match &mut item.occupancy {
            Occupancy::Seats { available } => {
                if *available < quantity {
                    return Err(LedgerError::InsufficientCapacity {
                        requested: quantity,
                        available: *available,
                        day: None,
                    });
                }
                *available -= quantity;
            }
            Occupancy::Days { reserved } => {
                let range = reservation.date_range.ok_or_else(|| {
                    LedgerError::Storage(StorageError::Persistence(format!(
                        "reservation {} for {} has no date range",
                        reservation.booking_id, reservation.target
                    )))
                })?;

                // Every day must fit before any day is touched.
                for day in range.days() {
                    let taken = reserved.get(&day).copied().unwrap_or(0);
                    if taken.saturating_add(quantity) > capacity {
                        return Err(LedgerError::InsufficientCapacity {
                            requested: quantity,
                            available: capacity.saturating_sub(taken),
                            day: Some(day),
                        });
                    }
                }
                for day in range.days() {
                    *reserved.entry(day).or_insert(0) += quantity;
                }
            }
        }

        item.holds.insert(
            reservation.booking_id,
            Hold {
                date_range: reservation.date_range,
                quantity,
            },
        );

        tracing::debug!(
            booking_id = %reservation.booking_id,
            target = %reservation.target,
            quantity,
            "Capacity reserved"
        );
        Ok(Reserved::Created)
    }

    pub fn release_now(&self, booking_id: BookingId, target: &BookingTarget) -> Result<Released, LedgerError> {
        let Some(item) = self.existing(target)? else {
            return Ok(Released::AlreadyReleased);
        };
        let mut item = item.lock().map_err(|_| poisoned())?;

        let Some(hold) = item.holds.remove(&booking_id) else {
            return Ok(Released::AlreadyReleased);
        };

        let capacity = item.capacity;
        match &mut item.occupancy {
            Occupancy::Seats { available } => {
                *available = available.saturating_add(hold.quantity).min(capacity);
            }
            Occupancy::Days { reserved } => {
                if let Some(range) = hold.date_range {
                    for day in range.days() {
                        if let Some(taken) = reserved.get_mut(&day) {
                            *taken = taken.saturating_sub(hold.quantity);
                            if *taken == 0 {
                                reserved.remove(&day);
                            }
                        }
                    }
                }
            }
        }

        tracing::debug!(%booking_id, %target, quantity = hold.quantity, "Capacity released");
        Ok(Released::Restored {
            quantity: hold.quantity,
        })
    }

    pub fn availability_now(
        &self,
        target: &BookingTarget,
        date_range: Option<&DateRange>,
    ) -> Result<Option<u32>, LedgerError> {
        let Some(item) = self.existing(target)? else {
            return Ok(None);
        };
        let item = item.lock().map_err(|_| poisoned())?;
        Ok(Some(item.remaining(date_range)))
    }
}

#[async_trait]
impl AvailabilityLedger for InMemoryLedger {
    async fn reserve(&self, reservation: &Reservation) -> Result<Reserved, LedgerError> {
        self.reserve_now(reservation)
    }

    async fn release(&self, booking_id: BookingId, target: &BookingTarget) -> Result<Released, LedgerError> {
        self.release_now(booking_id, target)
    }

    async fn availability(
        &self,
        target: &BookingTarget,
        date_range: Option<&DateRange>,
    ) -> Result<Option<u32>, LedgerError> {
        self.availability_now(target, date_range)
    }
}
