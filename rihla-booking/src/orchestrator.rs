use crate::retry::RetryPolicy;
use rihla_catalog::{InventoryCatalog, PricingEngine};
use rihla_core::payment::PaymentNotification;
use rihla_core::{
    ensure, AvailabilityLedger, Booking, BookingError, BookingRepository, BookingRequest,
    BookingState, BookingStatus, Capability, EventPublisher, LedgerError, Principal, Released,
    Reservation, Reserved, ResourceOwner,
};
use rihla_shared::{BookingEventKind, BookingId};
use std::sync::Arc;
use uuid::Uuid;

/// Compare-and-set attempts before a status write is reported as contended.
const MAX_TRANSITION_ATTEMPTS: usize = 3;

/// Longest stay accepted unless overridden with `with_max_nights`.
pub const DEFAULT_MAX_NIGHTS: u32 = 90;

/// Drives the booking lifecycle: create (reserve then persist), cancel
/// (release then persist) and payment confirmation.
pub struct BookingOrchestrator {
    catalog: Arc<InventoryCatalog>,
    ledger: Arc<dyn AvailabilityLedger>,
    bookings: Arc<dyn BookingRepository>,
    publisher: Arc<dyn EventPublisher>,
    pricing: PricingEngine,
    retry: RetryPolicy,
    max_nights: u32,
}

impl BookingOrchestrator {
    pub fn new(
        catalog: Arc<InventoryCatalog>,
        ledger: Arc<dyn AvailabilityLedger>,
        bookings: Arc<dyn BookingRepository>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            catalog,
            ledger,
            bookings,
            publisher,
            pricing: PricingEngine::new(),
            retry: RetryPolicy::default(),
            max_nights: DEFAULT_MAX_NIGHTS,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_max_nights(mut self, max_nights: u32) -> Self {
        self.max_nights = max_nights.max(1);
        self
    }

    // ========================================================================
    // Create
    // ========================================================================

    pub async fn create_booking(
        &self,
        principal: &Principal,
        request: BookingRequest,
    ) -> Result<Booking, BookingError> {
        ensure(principal, Capability::CreateBooking, None)?;
        request.ensure_stay_within(self.max_nights)?;

        // 1. Resolve the item
        let target = request.target();
        let item = self.catalog.get_item(target.kind(), target.item_id()).await?;
        if !item.listing().active {
            return Err(BookingError::Validation(format!(
                "{} {} is not available for booking",
                target.kind(),
                target.item_id()
            )));
        }

        // 2. Price it before touching capacity
        let quote = self.pricing.quote(&item, &request)?;

        // 3. Reserve capacity (the only atomic step)
        let booking_id = Uuid::new_v4();
        let reservation = Reservation {
            booking_id,
            target,
            date_range: request.date_range(),
            quantity: request.quantity(),
            capacity: item.capacity_model().capacity(),
        };

        match self.retry.run("reserve", || self.ledger.reserve(&reservation)).await {
            Ok(Reserved::Created) => {}
            Ok(Reserved::Existing) => {
                tracing::warn!("Reservation for fresh booking {} already existed", booking_id);
            }
            Err(e @ LedgerError::InsufficientCapacity { .. }) => {
                tracing::info!(%target, quantity = request.quantity(), "Booking rejected: {}", e);
                return Err(e.into());
            }
            Err(e) => {
                tracing::error!(%target, "Reserve failed: {}", e);
                return Err(e.into());
            }
        }

        // 4. Persist; compensate on failure so no capacity leaks
        let booking = Booking::pending(
            booking_id,
            principal.id.clone(),
            item.provider_id(),
            &request,
            quote.unit_price,
            quote.total,
        );

        if let Err(e) = self.bookings.insert(&booking).await {
            tracing::error!("Failed to persist booking {}: {}", booking_id, e);
            self.compensate(&reservation).await;
            return Err(e.into());
        }

        tracing::info!(
            %booking_id,
            %target,
            customer = %booking.customer_id,
            total_price = booking.total_price,
            "Booking created"
        );

        // 5. Notify (fire-and-forget)
        self.notify(&booking, BookingEventKind::BookingCreated).await;
        Ok(booking)
    }

    async fn compensate(&self, reservation: &Reservation) {
        let released = self
            .retry
            .run("compensating release", || {
                self.ledger.release(reservation.booking_id, &reservation.target)
            })
            .await;

        match released {
            Ok(_) => tracing::warn!(
                booking_id = %reservation.booking_id,
                "Released capacity after failed booking persistence"
            ),
            Err(e) => tracing::error!(
                booking_id = %reservation.booking_id,
                target = %reservation.target,
                quantity = reservation.quantity,
                "Compensating release failed; capacity is held by an unpersisted booking: {}",
                e
            ),
        }
    }

    // ========================================================================
    // Cancel
    // ========================================================================

    /// Release the booking's capacity, then mark it cancelled. A paid
    /// booking is refunded. Safe to repeat after a partial failure.
    pub async fn cancel_booking(
        &self,
        principal: &Principal,
        booking_id: BookingId,
    ) -> Result<Booking, BookingError> {
        let mut booking = self.load(booking_id).await?;
        ensure(principal, Capability::CancelBooking, Some(&owner_of(&booking)))?;

        if booking.is_terminal() {
            return Err(BookingError::AlreadyTerminal(booking_id));
        }

        // 1. Release first
        let released = self
            .retry
            .run("release", || self.ledger.release(booking.id, &booking.target))
            .await
            .map_err(|e| {
                tracing::error!("Release failed for booking {}: {}", booking_id, e);
                BookingError::from(e)
            })?;

        match released {
            Released::Restored { quantity } => {
                tracing::info!(%booking_id, quantity, "Capacity restored")
            }
            Released::AlreadyReleased => {
                tracing::debug!(%booking_id, "Capacity was already released")
            }
        }

        // 2. Persist the cancellation. If this fails the booking stays live
        // with its capacity already back in the ledger; nothing retries it
        // later. Repeating the cancel converges because release is a no-op
        // the second time.
        let cancelled = self
            .transition_with(&mut booking, principal, |state| {
                if state.status == BookingStatus::Cancelled {
                    None
                } else {
                    Some(state.cancelled())
                }
            })
            .await
            .map_err(|e| {
                if !matches!(e, BookingError::AlreadyTerminal(_)) {
                    tracing::error!(
                        "Capacity for booking {} released but cancellation not persisted; \
                         repeat the cancel to converge: {}",
                        booking_id,
                        e
                    );
                }
                e
            })?;

        if !cancelled {
            return Err(BookingError::AlreadyTerminal(booking_id));
        }

        tracing::info!(%booking_id, by = %principal.id, payment_status = %booking.payment_status, "Booking cancelled");
        self.notify(&booking, BookingEventKind::BookingCancelled).await;
        Ok(booking)
    }

    // ========================================================================
    // Payment
    // ========================================================================

    /// pending/unpaid → confirmed/paid. Repeating it for an already
    /// confirmed booking is a no-op.
    pub async fn confirm_payment(
        &self,
        principal: &Principal,
        booking_id: BookingId,
    ) -> Result<Booking, BookingError> {
        ensure(principal, Capability::ConfirmPayment, None)?;
        let mut booking = self.load(booking_id).await?;

        if booking.is_terminal() {
            return Err(BookingError::AlreadyTerminal(booking_id));
        }

        let changed = self
            .transition_with(&mut booking, principal, |state| {
                if state == BookingState::PENDING {
                    Some(BookingState::CONFIRMED)
                } else {
                    None
                }
            })
            .await?;

        if booking.is_terminal() {
            return Err(BookingError::AlreadyTerminal(booking_id));
        }

        if changed {
            tracing::info!(%booking_id, "Payment confirmed");
            self.notify(&booking, BookingEventKind::PaymentConfirmed).await;
        } else {
            tracing::debug!(%booking_id, "Payment already confirmed");
        }
        Ok(booking)
    }

    /// Apply a processor notification. Non-success statuses are ignored.
    pub async fn apply_payment_notification(
        &self,
        principal: &Principal,
        notification: &PaymentNotification,
    ) -> Result<Option<Booking>, BookingError> {
        if !notification.confirms_payment() {
            tracing::info!(
                intent_id = %notification.intent_id,
                status = ?notification.status,
                "Ignoring non-final payment notification"
            );
            return Ok(None);
        }

        let booking = self.load(notification.booking_id).await?;
        notification.check_amount(&booking)?;
        self.confirm_payment(principal, booking.id).await.map(Some)
    }

    // ========================================================================
    // Read
    // ========================================================================

    pub async fn get_booking(
        &self,
        principal: &Principal,
        booking_id: BookingId,
    ) -> Result<Booking, BookingError> {
        let booking = self.load(booking_id).await?;
        ensure(principal, Capability::ViewBooking, Some(&owner_of(&booking)))?;
        Ok(booking)
    }

    async fn load(&self, booking_id: BookingId) -> Result<Booking, BookingError> {
        self.retry
            .run("load booking", || self.bookings.get(booking_id))
            .await?
            .ok_or_else(|| BookingError::not_found("Booking", booking_id))
    }

    /// Compare-and-set loop. `next` maps the current state to the desired
    /// one, or `None` when no write is needed. Returns whether a write
    /// happened; `booking` always holds the latest known state.
    async fn transition_with<F>(
        &self,
        booking: &mut Booking,
        principal: &Principal,
        next: F,
    ) -> Result<bool, BookingError>
    where
        F: Fn(BookingState) -> Option<BookingState>,
    {
        for _ in 0..MAX_TRANSITION_ATTEMPTS {
            let from = booking.state();
            let Some(to) = next(from) else {
                return Ok(false);
            };

            let id = booking.id;
            if self
                .retry
                .run("status transition", || self.bookings.transition(id, from, to))
                .await?
            {
                booking.apply(to);
                return Ok(true);
            }

            // Lost a race; re-read and decide again.
            *booking = self.load(id).await?;
            tracing::debug!(
                booking_id = %id,
                actor = %principal.id,
                status = %booking.status,
                "Status changed concurrently; retrying transition"
            );
        }

        Err(BookingError::TransientStorage(format!(
            "booking {} is being modified concurrently",
            booking.id
        )))
    }

    async fn notify(&self, booking: &Booking, kind: BookingEventKind) {
        if let Err(e) = self.publisher.publish(&booking.event(kind)).await {
            tracing::warn!("Notification {:?} for booking {} dropped: {}", kind, booking.id, e);
        }
    }
}

fn owner_of(booking: &Booking) -> ResourceOwner {
    ResourceOwner::booking(booking.provider_id, booking.customer_id.clone())
}
