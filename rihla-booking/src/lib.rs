pub mod dashboard;
pub mod notify;
pub mod orchestrator;
pub mod retry;
pub mod store;

pub use dashboard::{DashboardAggregator, DashboardScope, DashboardSnapshot, MonthlyBucket, ProviderStats};
pub use notify::{NotificationDispatcher, SubscriberScope, Subscription};
pub use orchestrator::{BookingOrchestrator, DEFAULT_MAX_NIGHTS};
pub use retry::RetryPolicy;
pub use store::InMemoryBookingRepository;
