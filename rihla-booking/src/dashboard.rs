use crate::notify::Subscription;
use chrono::{DateTime, Datelike, Utc};
use rihla_catalog::InventoryCatalog;
use rihla_core::{
    ensure, Booking, BookingError, BookingRepository, BookingStatus, Capability, PaymentStatus,
    Principal, ResourceOwner, Role,
};
use rihla_shared::ProviderId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", content = "provider_id", rename_all = "snake_case")]
pub enum DashboardScope {
    Provider(ProviderId),
    All,
}

impl DashboardScope {
    pub fn provider_id(&self) -> Option<ProviderId> {
        match self {
            DashboardScope::Provider(id) => Some(*id),
            DashboardScope::All => None,
        }
    }

    /// Widest scope the principal may read.
    pub fn for_principal(principal: &Principal) -> Result<Self, BookingError> {
        match (principal.role, principal.provider_id) {
            (Role::Admin, _) => Ok(DashboardScope::All),
            (Role::Provider, Some(id)) => Ok(DashboardScope::Provider(id)),
            _ => Err(BookingError::Authorization(format!(
                "{} '{}' has no dashboard",
                principal.role, principal.id
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MonthlyBucket {
    /// Calendar month as `YYYY-MM`.
    pub month: String,
    pub bookings: u64,
    pub revenue: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DashboardSnapshot {
    #[serde(flatten)]
    pub scope: DashboardScope,
    pub total_bookings: u64,
    pub pending_bookings: u64,
    pub total_revenue: i64,
    pub active_listings: u64,
    pub monthly_buckets: Vec<MonthlyBucket>,
    pub computed_at: DateTime<Utc>,
}

/// `get_provider_dashboard_stats` response.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderStats {
    pub total_bookings: u64,
    pub pending_bookings: u64,
    pub total_revenue: i64,
    pub active_listings: u64,
}

impl From<&DashboardSnapshot> for ProviderStats {
    fn from(s: &DashboardSnapshot) -> Self {
        Self {
            total_bookings: s.total_bookings,
            pending_bookings: s.pending_bookings,
            total_revenue: s.total_revenue,
            active_listings: s.active_listings,
        }
    }
}

/// Roll bookings up into a snapshot.
///
/// Every booking counts towards `total_bookings`, cancelled ones included.
/// Revenue only counts bookings currently paid, so refunds drop out.
pub fn compute_snapshot(
    scope: DashboardScope,
    bookings: &[Booking],
    active_listings: u64,
    now: DateTime<Utc>,
    trailing_months: u32,
) -> DashboardSnapshot {
    let months = trailing_month_keys(now, trailing_months);
    let mut buckets: Vec<MonthlyBucket> = months
        .iter()
        .map(|&(year, month)| MonthlyBucket {
            month: format!("{:04}-{:02}", year, month),
            bookings: 0,
            revenue: 0,
        })
        .collect();

    let mut total_bookings = 0u64;
    let mut pending_bookings = 0u64;
    let mut total_revenue = 0i64;

    for booking in bookings
        .iter()
        .filter(|b| scope.provider_id().map_or(true, |p| b.provider_id == p))
    {
        total_bookings += 1;
        if booking.status == BookingStatus::Pending {
            pending_bookings += 1;
        }
        let paid = booking.payment_status == PaymentStatus::Paid;
        if paid {
            total_revenue = total_revenue.saturating_add(booking.total_price);
        }

        let key = (booking.created_at.year(), booking.created_at.month());
        if let Some(i) = months.iter().position(|m| *m == key) {
            buckets[i].bookings += 1;
            if paid {
                buckets[i].revenue = buckets[i].revenue.saturating_add(booking.total_price);
            }
        }
    }

    DashboardSnapshot {
        scope,
        total_bookings,
        pending_bookings,
        total_revenue,
        active_listings,
        monthly_buckets: buckets,
        computed_at: now,
    }
}

/// `(year, month)` for the trailing `n` months including `now`'s, oldest first.
fn trailing_month_keys(now: DateTime<Utc>, n: u32) -> Vec<(i32, u32)> {
    let current = now.year() * 12 + now.month0() as i32;
    (0..n as i32)
        .rev()
        .map(|back| {
            let index = current - back;
            (index.div_euclid(12), index.rem_euclid(12) as u32 + 1)
        })
        .collect()
}

/// Serves dashboard snapshots, recomputed lazily once a cached one is
/// older than the staleness bound or was invalidated by a booking event.
pub struct DashboardAggregator {
    bookings: Arc<dyn BookingRepository>,
    catalog: Arc<InventoryCatalog>,
    staleness: Duration,
    trailing_months: u32,
    cache: RwLock<HashMap<DashboardScope, DashboardSnapshot>>,
}

impl DashboardAggregator {
    pub fn new(
        bookings: Arc<dyn BookingRepository>,
        catalog: Arc<InventoryCatalog>,
        staleness: Duration,
        trailing_months: u32,
    ) -> Self {
        Self {
            bookings,
            catalog,
            staleness,
            trailing_months: trailing_months.max(1),
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn staleness(&self) -> Duration {
        self.staleness
    }

    pub async fn get_snapshot(
        &self,
        principal: &Principal,
        scope: DashboardScope,
    ) -> Result<DashboardSnapshot, BookingError> {
        let owner = scope.provider_id().map(ResourceOwner::provider);
        ensure(principal, Capability::ViewProviderBookings, owner.as_ref())?;

        let now = Utc::now();
        if let Some(cached) = self.cached(scope, now) {
            return Ok(cached);
        }

        let bookings = self.bookings.list_for_provider(scope.provider_id()).await?;
        let active = self.catalog.count_active(scope.provider_id()).await?;
        let snapshot = compute_snapshot(scope, &bookings, active, now, self.trailing_months);

        if let Ok(mut cache) = self.cache.write() {
            cache.insert(scope, snapshot.clone());
        }
        tracing::debug!(?scope, total = snapshot.total_bookings, "Dashboard snapshot computed");
        Ok(snapshot)
    }

    pub async fn provider_stats(
        &self,
        principal: &Principal,
        provider_id: ProviderId,
    ) -> Result<ProviderStats, BookingError> {
        let snapshot = self
            .get_snapshot(principal, DashboardScope::Provider(provider_id))
            .await?;
        Ok(ProviderStats::from(&snapshot))
    }

    fn cached(&self, scope: DashboardScope, now: DateTime<Utc>) -> Option<DashboardSnapshot> {
        let cache = self.cache.read().ok()?;
        let snapshot = cache.get(&scope)?;
        let age = (now - snapshot.computed_at).to_std().unwrap_or(Duration::ZERO);
        (age < self.staleness).then(|| snapshot.clone())
    }

    /// Drop cached snapshots that include `provider_id`.
    pub fn invalidate(&self, provider_id: ProviderId) {
        if let Ok(mut cache) = self.cache.write() {
            cache.remove(&DashboardScope::Provider(provider_id));
            cache.remove(&DashboardScope::All);
        }
    }

    /// Invalidate on every event seen by `subscription` until the bus closes.
    pub fn track(self: Arc<Self>, mut subscription: Subscription) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = subscription.recv().await {
                self.invalidate(event.provider_id);
            }
            tracing::debug!("Dashboard event tracking stopped");
        })
    }
}
