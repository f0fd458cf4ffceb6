pub mod app_config;
pub mod booking_repo;
pub mod catalog_repo;
pub mod database;
#[cfg(feature = "kafka")]
pub mod events;
pub mod ledger_repo;
pub mod redis_repo;
pub mod role_repo;

pub use app_config::{AuthConfig, BusinessRules, Config, LedgerBackend, StaticRole};
pub use booking_repo::PgBookingRepository;
pub use catalog_repo::PgCatalogRepository;
pub use database::DbClient;
#[cfg(feature = "kafka")]
pub use events::EventProducer;
pub use ledger_repo::PgAvailabilityLedger;
pub use redis_repo::{RedisClient, RedisLedger};
pub use role_repo::PgRoleDirectory;

use rihla_core::StorageError;

/// Serialization failures, deadlocks and lock timeouts are worth one more try.
const TRANSIENT_SQLSTATES: [&str; 3] = ["40001", "40P01", "55P03"];

pub(crate) fn map_sqlx(err: sqlx::Error) -> StorageError {
    let transient = match &err {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => true,
        sqlx::Error::Database(db) => db
            .code()
            .is_some_and(|code| TRANSIENT_SQLSTATES.contains(&&*code)),
        _ => false,
    };

    if transient {
        tracing::warn!("Transient database error: {}", err);
        StorageError::Transient(err.to_string())
    } else {
        tracing::error!("Database error: {}", err);
        StorageError::Persistence(err.to_string())
    }
}

/// Postgres stores counts as INTEGER.
pub(crate) fn to_i32(value: u32, field: &str) -> Result<i32, StorageError> {
    i32::try_from(value)
        .map_err(|_| StorageError::OutOfRange(format!("{} {} exceeds {}", field, value, i32::MAX)))
}

pub(crate) fn map_redis(err: redis::RedisError) -> StorageError {
    if err.is_io_error() || err.is_timeout() || err.is_connection_dropped() || err.is_connection_refusal() {
        tracing::warn!("Transient redis error: {}", err);
        StorageError::Transient(err.to_string())
    } else {
        tracing::error!("Redis error: {}", err);
        StorageError::Persistence(err.to_string())
    }
}
