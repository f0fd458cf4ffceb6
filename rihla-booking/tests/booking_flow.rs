use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rihla_booking::{
    BookingOrchestrator, DashboardAggregator, DashboardScope, InMemoryBookingRepository,
    NotificationDispatcher, RetryPolicy, SubscriberScope,
};
use rihla_catalog::{InMemoryCatalogRepository, InMemoryLedger, InventoryCatalog};
use rihla_core::payment::{PaymentNotification, ProcessorStatus};
use rihla_core::repository::{Released, Reservation, Reserved};
use rihla_core::{
    AvailabilityLedger, Booking, BookingError, BookingRepository, BookingRequest, BookingState,
    BookingStatus, BookingTarget, DateRange, InventoryItem, LedgerError, Listing, PaymentStatus,
    Principal, StorageError,
};
use rihla_shared::{BookingEventKind, BookingId, ProviderId};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

// ============================================================================
// Harness
// ============================================================================

struct Harness {
    orchestrator: Arc<BookingOrchestrator>,
    dashboard: Arc<DashboardAggregator>,
    dispatcher: Arc<NotificationDispatcher>,
    ledger: Arc<InMemoryLedger>,
    catalog: Arc<InventoryCatalog>,
    provider_id: ProviderId,
}

impl Harness {
    fn new() -> Self {
        Self::build(|ledger| ledger, |bookings| bookings)
    }

    fn build(
        wrap_ledger: impl FnOnce(Arc<dyn AvailabilityLedger>) -> Arc<dyn AvailabilityLedger>,
        wrap_bookings: impl FnOnce(Arc<dyn BookingRepository>) -> Arc<dyn BookingRepository>,
    ) -> Self {
        let catalog = Arc::new(InventoryCatalog::new(Arc::new(InMemoryCatalogRepository::new())));
        let ledger = Arc::new(InMemoryLedger::new());
        let bookings: Arc<dyn BookingRepository> = Arc::new(InMemoryBookingRepository::new());
        let dispatcher = Arc::new(NotificationDispatcher::new(64));

        let orchestrator = BookingOrchestrator::new(
            catalog.clone(),
            wrap_ledger(ledger.clone() as Arc<dyn AvailabilityLedger>),
            wrap_bookings(bookings.clone()),
            dispatcher.clone(),
        )
        .with_retry(RetryPolicy::from_millis(1, 50));

        let dashboard = Arc::new(DashboardAggregator::new(
            bookings,
            catalog.clone(),
            Duration::ZERO,
            6,
        ));

        Self {
            orchestrator: Arc::new(orchestrator),
            dashboard,
            dispatcher,
            ledger,
            catalog,
            provider_id: Uuid::new_v4(),
        }
    }

    fn provider(&self) -> Principal {
        Principal::provider("provider-1", self.provider_id)
    }

    fn listing(&self, unit_price: i64) -> Listing {
        Listing {
            id: Uuid::new_v4(),
            provider_id: self.provider_id,
            name: "Listing".to_string(),
            unit_price,
            active: true,
        }
    }

    async fn hotel(&self, rooms: u32, unit_price: i64) -> BookingTarget {
        let item = InventoryItem::Hotel {
            listing: self.listing(unit_price),
            rooms,
            city: "Makkah".to_string(),
            room_tiers: vec![],
        };
        let target = item.target();
        self.catalog.upsert_item(&self.provider(), item).await.unwrap();
        target
    }

    async fn flight(&self, seats: u32, unit_price: i64) -> BookingTarget {
        let item = InventoryItem::Flight {
            listing: self.listing(unit_price),
            seats,
            origin: "CGK".to_string(),
            destination: "JED".to_string(),
            departure: Utc::now(),
        };
        let target = item.target();
        self.catalog.upsert_item(&self.provider(), item).await.unwrap();
        target
    }
}

fn dec(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 12, day).unwrap()
}

fn stay(target: BookingTarget, from: u32, to: u32, rooms: u32) -> BookingRequest {
    BookingRequest::new(target, Some(DateRange::new(dec(from), dec(to))), rooms, None).unwrap()
}

fn seats(target: BookingTarget, quantity: u32) -> BookingRequest {
    BookingRequest::new(target, None, quantity, None).unwrap()
}

fn customer() -> Principal {
    Principal::customer("customer-1")
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_overlapping_hotel_stays() {
    let h = Harness::new();
    let hotel = h.hotel(5, 10_000).await;

    h.orchestrator.create_booking(&customer(), stay(hotel, 10, 15, 3)).await.unwrap();

    let err = h
        .orchestrator
        .create_booking(&customer(), stay(hotel, 12, 14, 3))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BookingError::AvailabilityConflict { requested: 3, available: 2, .. }
    ));

    let ok = h
        .orchestrator
        .create_booking(&customer(), stay(hotel, 12, 14, 2))
        .await
        .unwrap();
    assert_eq!(ok.status, BookingStatus::Pending);
    assert_eq!(ok.payment_status, PaymentStatus::Unpaid);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_last_seat() {
    let h = Harness::new();
    let flight = h.flight(1, 45_000).await;

    let attempts: Vec<_> = (0..8)
        .map(|i| {
            let orchestrator = h.orchestrator.clone();
            tokio::spawn(async move {
                let who = Principal::customer(format!("customer-{}", i));
                orchestrator.create_booking(&who, seats(flight, 1)).await
            })
        })
        .collect();

    let mut booked = 0;
    let mut conflicts = 0;
    for attempt in attempts {
        match attempt.await.unwrap() {
            Ok(_) => booked += 1,
            Err(BookingError::AvailabilityConflict { .. }) => conflicts += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(booked, 1);
    assert_eq!(conflicts, 7);
    assert_eq!(h.ledger.availability(&flight, None).await.unwrap(), Some(0));
}

#[tokio::test]
async fn test_same_day_stay_is_one_night() {
    let h = Harness::new();
    let hotel = h.hotel(2, 8_000).await;

    let booking = h
        .orchestrator
        .create_booking(&customer(), stay(hotel, 10, 10, 1))
        .await
        .unwrap();

    assert_eq!(booking.date_range, Some(DateRange::new(dec(10), dec(11))));
    assert_eq!(booking.unit_price_snapshot, 8_000);
    assert_eq!(booking.total_price, 8_000);
}

#[tokio::test]
async fn test_cancel_paid_booking_restores_rooms_and_revenue() {
    let h = Harness::new();
    let hotel = h.hotel(5, 10_000).await;
    let admin = Principal::admin("admin-1");
    let window = DateRange::new(dec(10), dec(13));

    let booking = h
        .orchestrator
        .create_booking(&customer(), stay(hotel, 10, 13, 2))
        .await
        .unwrap();
    assert_eq!(booking.total_price, 30_000);

    h.orchestrator.confirm_payment(&Principal::system(), booking.id).await.unwrap();
    let before = h
        .dashboard
        .provider_stats(&h.provider(), h.provider_id)
        .await
        .unwrap();
    assert_eq!(before.total_revenue, 30_000);
    assert_eq!(h.ledger.availability(&hotel, Some(&window)).await.unwrap(), Some(3));

    let cancelled = h.orchestrator.cancel_booking(&admin, booking.id).await.unwrap();
    assert_eq!(cancelled.status, BookingStatus::Cancelled);
    assert_eq!(cancelled.payment_status, PaymentStatus::Refunded);
    assert_eq!(h.ledger.availability(&hotel, Some(&window)).await.unwrap(), Some(5));

    let after = h
        .dashboard
        .provider_stats(&h.provider(), h.provider_id)
        .await
        .unwrap();
    assert_eq!(after.total_revenue, before.total_revenue - booking.total_price);
    assert_eq!(after.total_bookings, 1);
}

// ============================================================================
// Properties
// ============================================================================

#[tokio::test]
async fn test_cancel_twice_has_single_ledger_effect() {
    let h = Harness::new();
    let flight = h.flight(4, 1_000).await;

    let booking = h.orchestrator.create_booking(&customer(), seats(flight, 3)).await.unwrap();
    h.orchestrator.cancel_booking(&customer(), booking.id).await.unwrap();

    let again = h.orchestrator.cancel_booking(&customer(), booking.id).await;
    assert!(matches!(again, Err(BookingError::AlreadyTerminal(id)) if id == booking.id));
    assert_eq!(h.ledger.availability(&flight, None).await.unwrap(), Some(4));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_cancellations_release_once() {
    let h = Harness::new();
    let flight = h.flight(4, 1_000).await;
    let booking = h.orchestrator.create_booking(&customer(), seats(flight, 2)).await.unwrap();
    // A second booking keeps the item busy so over-release would be visible.
    h.orchestrator.create_booking(&customer(), seats(flight, 1)).await.unwrap();

    let racers: Vec<_> = (0..4)
        .map(|_| {
            let orchestrator = h.orchestrator.clone();
            tokio::spawn(async move { orchestrator.cancel_booking(&customer(), booking.id).await })
        })
        .collect();

    let mut acks = 0;
    for racer in racers {
        match racer.await.unwrap() {
            Ok(_) => acks += 1,
            Err(BookingError::AlreadyTerminal(_)) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(acks, 1);
    assert_eq!(h.ledger.availability(&flight, None).await.unwrap(), Some(3));
}

#[tokio::test]
async fn test_total_price_matches_snapshot_times_units() {
    let h = Harness::new();
    let hotel = h.hotel(10, 7_500).await;
    let flight = h.flight(10, 12_000).await;

    for request in [
        stay(hotel, 1, 4, 2),
        stay(hotel, 5, 5, 1),
        seats(flight, 3),
        seats(flight, 1),
    ] {
        let b = h.orchestrator.create_booking(&customer(), request).await.unwrap();
        let b = h.orchestrator.confirm_payment(&Principal::system(), b.id).await.unwrap();
        assert_eq!(
            b.total_price,
            b.unit_price_snapshot * b.billable_units().max(1) as i64
        );
    }
}

#[tokio::test]
async fn test_price_change_does_not_touch_existing_bookings() {
    let h = Harness::new();
    let flight = h.flight(5, 10_000).await;
    let booking = h.orchestrator.create_booking(&customer(), seats(flight, 2)).await.unwrap();

    let mut item = h.catalog.get_item(flight.kind(), flight.item_id()).await.unwrap();
    item.listing_mut().unit_price = 99_000;
    h.catalog.upsert_item(&h.provider(), item).await.unwrap();

    let stored = h.orchestrator.get_booking(&customer(), booking.id).await.unwrap();
    assert_eq!(stored.total_price, 20_000);
}

#[tokio::test]
async fn test_dashboard_counts_every_provider_booking() {
    let h = Harness::new();
    let hotel = h.hotel(20, 1_000).await;
    let other = Harness::new();

    for day in 1..=4 {
        h.orchestrator
            .create_booking(&customer(), stay(hotel, day, day + 1, 1))
            .await
            .unwrap();
    }
    let first = h
        .orchestrator
        .create_booking(&customer(), stay(hotel, 20, 22, 1))
        .await
        .unwrap();
    h.orchestrator.cancel_booking(&customer(), first.id).await.unwrap();

    let stats = h
        .dashboard
        .provider_stats(&h.provider(), h.provider_id)
        .await
        .unwrap();
    assert_eq!(stats.total_bookings, 5);
    assert_eq!(stats.pending_bookings, 4);
    assert_eq!(stats.total_revenue, 0);
    assert_eq!(stats.active_listings, 1);

    // Providers only see their own dashboard.
    let err = h
        .dashboard
        .provider_stats(&other.provider(), h.provider_id)
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Authorization(_)));

    let admin = h
        .dashboard
        .get_snapshot(&Principal::admin("admin-1"), DashboardScope::All)
        .await
        .unwrap();
    assert_eq!(admin.total_bookings, 5);
    assert_eq!(admin.monthly_buckets.len(), 6);
}

#[tokio::test]
async fn test_cached_dashboard_is_invalidated_by_events() {
    let h = Harness::new();
    let flight = h.flight(10, 1_000).await;
    let dashboard = Arc::new(DashboardAggregator::new(
        Arc::new(InMemoryBookingRepository::new()),
        h.catalog.clone(),
        Duration::from_secs(3600),
        6,
    ));
    // Shares nothing with the orchestrator's store, so only invalidation
    // can be observed here: the cached value must be dropped.
    let tracker = dashboard.clone().track(h.dispatcher.subscribe(SubscriberScope::Admin));

    let admin = Principal::admin("admin-1");
    let cached = dashboard.get_snapshot(&admin, DashboardScope::All).await.unwrap();
    let again = dashboard.get_snapshot(&admin, DashboardScope::All).await.unwrap();
    assert_eq!(cached.computed_at, again.computed_at);

    h.orchestrator.create_booking(&customer(), seats(flight, 1)).await.unwrap();

    let mut refreshed = again.clone();
    for _ in 0..50 {
        refreshed = dashboard.get_snapshot(&admin, DashboardScope::All).await.unwrap();
        if refreshed.computed_at != cached.computed_at {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_ne!(refreshed.computed_at, cached.computed_at);
    tracker.abort();
}

#[tokio::test]
async fn test_dashboard_served_from_cache_until_stale() {
    let h = Harness::new();
    let flight = h.flight(10, 1_000).await;
    let bookings = Arc::new(InMemoryBookingRepository::new());
    // No event tracking: only the staleness bound refreshes this one
    let dashboard = DashboardAggregator::new(
        bookings.clone(),
        h.catalog.clone(),
        Duration::from_millis(100),
        6,
    );
    let admin = Principal::admin("admin-1");

    let first = dashboard.get_snapshot(&admin, DashboardScope::All).await.unwrap();
    assert_eq!(first.total_bookings, 0);

    let request = seats(flight, 2);
    let booking = Booking::pending(Uuid::new_v4(), "customer-1".to_string(), h.provider_id, &request, 1_000, 2_000);
    bookings.insert(&booking).await.unwrap();

    let cached = dashboard.get_snapshot(&admin, DashboardScope::All).await.unwrap();
    assert_eq!(cached.computed_at, first.computed_at);
    assert_eq!(cached.total_bookings, 0);

    tokio::time::sleep(Duration::from_millis(150)).await;

    let fresh = dashboard.get_snapshot(&admin, DashboardScope::All).await.unwrap();
    assert!(fresh.computed_at > first.computed_at);
    assert_eq!(fresh.total_bookings, 1);
}

// ============================================================================
// Authorization & validation
// ============================================================================

#[tokio::test]
async fn test_customer_cannot_manage_inventory() {
    let h = Harness::new();
    let hotel = h.hotel(3, 1_000).await;

    let item = h.catalog.get_item(hotel.kind(), hotel.item_id()).await.unwrap();
    let err = h.catalog.upsert_item(&customer(), item).await.unwrap_err();
    assert!(matches!(err, BookingError::Authorization(_)));

    let err = h
        .catalog
        .set_active(&customer(), hotel.kind(), hotel.item_id(), false)
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Authorization(_)));
}

#[tokio::test]
async fn test_guest_and_strangers_are_denied() {
    let h = Harness::new();
    let flight = h.flight(3, 1_000).await;

    let err = h
        .orchestrator
        .create_booking(&Principal::guest(), seats(flight, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Authorization(_)));

    let booking = h.orchestrator.create_booking(&customer(), seats(flight, 1)).await.unwrap();
    let stranger = Principal::customer("customer-2");
    assert!(matches!(
        h.orchestrator.cancel_booking(&stranger, booking.id).await,
        Err(BookingError::Authorization(_))
    ));
    assert!(matches!(
        h.orchestrator.confirm_payment(&customer(), booking.id).await,
        Err(BookingError::Authorization(_))
    ));

    // The owning provider may read and cancel.
    h.orchestrator.get_booking(&h.provider(), booking.id).await.unwrap();
    h.orchestrator.cancel_booking(&h.provider(), booking.id).await.unwrap();
}

#[tokio::test]
async fn test_unknown_and_inactive_items() {
    let h = Harness::new();
    let missing = BookingTarget::Package(Uuid::new_v4());
    let request =
        BookingRequest::new(missing, Some(DateRange::new(dec(1), dec(3))), 1, None).unwrap();
    assert!(matches!(
        h.orchestrator.create_booking(&customer(), request).await,
        Err(BookingError::NotFound { .. })
    ));

    let flight = h.flight(3, 1_000).await;
    h.catalog
        .set_active(&h.provider(), flight.kind(), flight.item_id(), false)
        .await
        .unwrap();
    assert!(matches!(
        h.orchestrator.create_booking(&customer(), seats(flight, 1)).await,
        Err(BookingError::Validation(_))
    ));
    assert_eq!(h.ledger.availability(&flight, None).await.unwrap(), None);
}

// ============================================================================
// Payment
// ============================================================================

#[tokio::test]
async fn test_payment_confirmation_is_idempotent_and_notifies() {
    let h = Harness::new();
    let flight = h.flight(3, 2_500).await;
    let mut events = h.dispatcher.subscribe(SubscriberScope::Provider(h.provider_id));

    let booking = h.orchestrator.create_booking(&customer(), seats(flight, 2)).await.unwrap();
    let notification = PaymentNotification {
        intent_id: "pi_1".to_string(),
        booking_id: booking.id,
        amount: 5_000,
        status: ProcessorStatus::Succeeded,
    };

    let confirmed = h
        .orchestrator
        .apply_payment_notification(&Principal::system(), &notification)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(confirmed.state(), BookingState::CONFIRMED);

    let replay = h
        .orchestrator
        .apply_payment_notification(&Principal::system(), &notification)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(replay.state(), BookingState::CONFIRMED);

    assert_eq!(events.recv().await.unwrap().kind, BookingEventKind::BookingCreated);
    assert_eq!(events.recv().await.unwrap().kind, BookingEventKind::PaymentConfirmed);
    assert!(tokio::time::timeout(Duration::from_millis(50), events.recv())
        .await
        .is_err());
}

#[tokio::test]
async fn test_payment_amount_mismatch_and_cancelled_booking() {
    let h = Harness::new();
    let flight = h.flight(3, 2_500).await;
    let booking = h.orchestrator.create_booking(&customer(), seats(flight, 1)).await.unwrap();

    let short = PaymentNotification {
        intent_id: "pi_2".to_string(),
        booking_id: booking.id,
        amount: 1,
        status: ProcessorStatus::Succeeded,
    };
    assert!(matches!(
        h.orchestrator
            .apply_payment_notification(&Principal::system(), &short)
            .await,
        Err(BookingError::Validation(_))
    ));

    let pending = PaymentNotification {
        status: ProcessorStatus::Processing,
        ..short.clone()
    };
    assert!(h
        .orchestrator
        .apply_payment_notification(&Principal::system(), &pending)
        .await
        .unwrap()
        .is_none());

    h.orchestrator.cancel_booking(&customer(), booking.id).await.unwrap();
    assert!(matches!(
        h.orchestrator.confirm_payment(&Principal::system(), booking.id).await,
        Err(BookingError::AlreadyTerminal(_))
    ));
}

// ============================================================================
// Storage faults
// ============================================================================

/// Fails the first `failures` reserve calls with a transient error.
struct FlakyLedger {
    inner: Arc<dyn AvailabilityLedger>,
    failures: AtomicUsize,
    calls: AtomicUsize,
}

#[async_trait]
impl AvailabilityLedger for FlakyLedger {
    async fn reserve(&self, reservation: &Reservation) -> Result<Reserved, LedgerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(LedgerError::Storage(StorageError::Transient(
                "lock not available".to_string(),
            )));
        }
        self.inner.reserve(reservation).await
    }

    async fn release(&self, booking_id: BookingId, target: &BookingTarget) -> Result<Released, LedgerError> {
        self.inner.release(booking_id, target).await
    }

    async fn availability(
        &self,
        target: &BookingTarget,
        date_range: Option<&DateRange>,
    ) -> Result<Option<u32>, LedgerError> {
        self.inner.availability(target, date_range).await
    }
}

#[tokio::test]
async fn test_reserve_retried_once_on_transient_fault() {
    let flaky = Arc::new(std::sync::Mutex::new(None::<Arc<FlakyLedger>>));
    let slot = flaky.clone();
    let h = Harness::build(
        move |inner| {
            let ledger = Arc::new(FlakyLedger {
                inner,
                failures: AtomicUsize::new(1),
                calls: AtomicUsize::new(0),
            });
            *slot.lock().unwrap() = Some(ledger.clone());
            ledger as Arc<dyn AvailabilityLedger>
        },
        |bookings| bookings,
    );
    let flight = h.flight(2, 1_000).await;

    h.orchestrator.create_booking(&customer(), seats(flight, 1)).await.unwrap();
    let ledger = flaky.lock().unwrap().clone().unwrap();
    assert_eq!(ledger.calls.load(Ordering::SeqCst), 2);

    // Two consecutive faults exhaust the single retry.
    ledger.failures.store(2, Ordering::SeqCst);
    let err = h
        .orchestrator
        .create_booking(&customer(), seats(flight, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::TransientStorage(_)));
    assert_eq!(h.ledger.availability(&flight, None).await.unwrap(), Some(1));
}

/// Booking store whose inserts always fail.
struct BrokenInserts(Arc<dyn BookingRepository>);

#[async_trait]
impl BookingRepository for BrokenInserts {
    async fn insert(&self, _booking: &Booking) -> Result<(), StorageError> {
        Err(StorageError::Persistence("disk full".to_string()))
    }

    async fn get(&self, id: BookingId) -> Result<Option<Booking>, StorageError> {
        self.0.get(id).await
    }

    async fn transition(
        &self,
        id: BookingId,
        from: BookingState,
        to: BookingState,
    ) -> Result<bool, StorageError> {
        self.0.transition(id, from, to).await
    }

    async fn list_for_provider(
        &self,
        provider_id: Option<ProviderId>,
    ) -> Result<Vec<Booking>, StorageError> {
        self.0.list_for_provider(provider_id).await
    }
}

#[tokio::test]
async fn test_failed_persistence_releases_reservation() {
    let h = Harness::build(|ledger| ledger, |bookings| {
        Arc::new(BrokenInserts(bookings)) as Arc<dyn BookingRepository>
    });
    let hotel = h.hotel(1, 5_000).await;

    let err = h
        .orchestrator
        .create_booking(&customer(), stay(hotel, 1, 3, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Persistence(_)));

    let window = DateRange::new(dec(1), dec(3));
    assert_eq!(h.ledger.availability(&hotel, Some(&window)).await.unwrap(), Some(1));
}

/// Booking store whose status writes fail while `failing` is set.
struct FailingTransitions {
    inner: Arc<dyn BookingRepository>,
    failing: AtomicBool,
}

#[async_trait]
impl BookingRepository for FailingTransitions {
    async fn insert(&self, booking: &Booking) -> Result<(), StorageError> {
        self.inner.insert(booking).await
    }

    async fn get(&self, id: BookingId) -> Result<Option<Booking>, StorageError> {
        self.inner.get(id).await
    }

    async fn transition(
        &self,
        id: BookingId,
        from: BookingState,
        to: BookingState,
    ) -> Result<bool, StorageError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::Persistence("connection reset".to_string()));
        }
        self.inner.transition(id, from, to).await
    }

    async fn list_for_provider(
        &self,
        provider_id: Option<ProviderId>,
    ) -> Result<Vec<Booking>, StorageError> {
        self.inner.list_for_provider(provider_id).await
    }
}

#[tokio::test]
async fn test_cancel_after_failed_status_write_converges() {
    let slot = Arc::new(std::sync::Mutex::new(None::<Arc<FailingTransitions>>));
    let handle = slot.clone();
    let h = Harness::build(|ledger| ledger, move |inner| {
        let bookings = Arc::new(FailingTransitions {
            inner,
            failing: AtomicBool::new(false),
        });
        *handle.lock().unwrap() = Some(bookings.clone());
        bookings as Arc<dyn BookingRepository>
    });
    let bookings = slot.lock().unwrap().clone().unwrap();
    let hotel = h.hotel(2, 5_000).await;
    let window = DateRange::new(dec(1), dec(3));

    let booking = h
        .orchestrator
        .create_booking(&customer(), stay(hotel, 1, 3, 1))
        .await
        .unwrap();
    assert_eq!(h.ledger.availability(&hotel, Some(&window)).await.unwrap(), Some(1));

    bookings.failing.store(true, Ordering::SeqCst);
    let err = h
        .orchestrator
        .cancel_booking(&customer(), booking.id)
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Persistence(_)));

    // Capacity is back but the booking is still live
    assert_eq!(h.ledger.availability(&hotel, Some(&window)).await.unwrap(), Some(2));
    let live = h.orchestrator.get_booking(&customer(), booking.id).await.unwrap();
    assert_eq!(live.status, BookingStatus::Pending);

    bookings.failing.store(false, Ordering::SeqCst);
    let cancelled = h
        .orchestrator
        .cancel_booking(&customer(), booking.id)
        .await
        .unwrap();
    assert_eq!(cancelled.status, BookingStatus::Cancelled);
    assert_eq!(h.ledger.availability(&hotel, Some(&window)).await.unwrap(), Some(2));
}

#[tokio::test]
async fn test_oversized_and_unrepresentable_stays_rejected() {
    let h = Harness::new();
    let hotel = h.hotel(5, 10_000).await;

    let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
    let end = NaiveDate::from_ymd_opt(4025, 1, 1).unwrap();
    let forever = BookingRequest::new(hotel, Some(DateRange::new(start, end)), 1, None).unwrap();
    let err = h
        .orchestrator
        .create_booking(&customer(), forever)
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Validation(_)));
    assert_eq!(h.ledger.availability(&hotel, None).await.unwrap(), None);

    // Exactly at the limit is fine
    let limit = start + chrono::Duration::days(rihla_booking::DEFAULT_MAX_NIGHTS as i64);
    let longest = BookingRequest::new(hotel, Some(DateRange::new(start, limit)), 1, None).unwrap();
    let booking = h.orchestrator.create_booking(&customer(), longest).await.unwrap();
    assert_eq!(booking.billable_units(), rihla_booking::DEFAULT_MAX_NIGHTS);

    let last = NaiveDate::MAX;
    let err = BookingRequest::new(hotel, Some(DateRange::new(last, last)), 1, None).unwrap_err();
    assert!(matches!(err, BookingError::Validation(_)));
}
