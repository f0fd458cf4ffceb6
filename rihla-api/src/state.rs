use rihla_booking::{
    BookingOrchestrator, DashboardAggregator, InMemoryBookingRepository, NotificationDispatcher,
    RetryPolicy, SubscriberScope,
};
use rihla_catalog::{InMemoryCatalogRepository, InMemoryLedger, InventoryCatalog};
use rihla_core::{
    AvailabilityLedger, BookingRepository, CatalogRepository, EventPublisher, PrincipalResolver,
    RoleDirectory,
};
use rihla_store::{AuthConfig, BusinessRules, RedisClient};
use std::sync::Arc;
use std::time::Duration;

use crate::metrics::ApiMetrics;
use crate::middleware::JwtVerifier;

/// Storage adapters the services are built on.
pub struct Backends {
    pub catalog: Arc<dyn CatalogRepository>,
    pub ledger: Arc<dyn AvailabilityLedger>,
    pub bookings: Arc<dyn BookingRepository>,
    pub roles: Arc<dyn RoleDirectory>,
}

impl Backends {
    pub fn in_memory(roles: Arc<dyn RoleDirectory>) -> Self {
        Self {
            catalog: Arc::new(InMemoryCatalogRepository::new()),
            ledger: Arc::new(InMemoryLedger::new()),
            bookings: Arc::new(InMemoryBookingRepository::new()),
            roles,
        }
    }
}

#[derive(Clone)]
pub struct RateLimit {
    pub redis: Arc<RedisClient>,
    pub per_minute: i64,
}

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<BookingOrchestrator>,
    pub dashboard: Arc<DashboardAggregator>,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub catalog: Arc<InventoryCatalog>,
    pub resolver: Arc<PrincipalResolver>,
    pub webhook_secret: Arc<str>,
    pub rate_limit: Option<RateLimit>,
    pub metrics: Arc<ApiMetrics>,
}

impl AppState {
    /// Wire the services together and start the background consumers of the
    /// event bus. Must run inside a Tokio runtime.
    pub fn new(
        backends: Backends,
        auth: &AuthConfig,
        rules: &BusinessRules,
        dispatcher: NotificationDispatcher,
    ) -> Result<Self, prometheus::Error> {
        let dispatcher = Arc::new(dispatcher);
        let catalog = Arc::new(InventoryCatalog::new(backends.catalog));

        let orchestrator = BookingOrchestrator::new(
            catalog.clone(),
            backends.ledger,
            backends.bookings.clone(),
            dispatcher.clone() as Arc<dyn EventPublisher>,
        )
        .with_retry(RetryPolicy::from_millis(
            rules.reserve_max_retries,
            rules.reserve_retry_backoff_ms,
        ))
        .with_max_nights(rules.max_nights);

        let dashboard = Arc::new(DashboardAggregator::new(
            backends.bookings,
            catalog.clone(),
            Duration::from_secs(rules.dashboard_staleness_seconds),
            rules.dashboard_trailing_months,
        ));
        dashboard
            .clone()
            .track(dispatcher.subscribe(SubscriberScope::Admin));

        let metrics = Arc::new(ApiMetrics::new()?);
        metrics
            .clone()
            .track(dispatcher.subscribe(SubscriberScope::Admin));

        let resolver = PrincipalResolver::new(
            Arc::new(JwtVerifier::new(&auth.jwt_secret)),
            backends.roles,
        );

        Ok(Self {
            orchestrator: Arc::new(orchestrator),
            dashboard,
            dispatcher,
            catalog,
            resolver: Arc::new(resolver),
            webhook_secret: Arc::from(auth.webhook_secret.as_str()),
            rate_limit: None,
            metrics,
        })
    }

    pub fn with_rate_limit(mut self, redis: Arc<RedisClient>, per_minute: i64) -> Self {
        self.rate_limit = Some(RateLimit { redis, per_minute });
        self
    }
}
