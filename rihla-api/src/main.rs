use anyhow::Context;
use rihla_api::{app, AppState, Backends};
use rihla_booking::NotificationDispatcher;
use rihla_catalog::InMemoryLedger;
use rihla_core::{AvailabilityLedger, StaticRoleDirectory};
use rihla_store::{
    Config, DbClient, LedgerBackend, PgAvailabilityLedger, PgBookingRepository,
    PgCatalogRepository, PgRoleDirectory, RedisClient, RedisLedger,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rihla_api=debug,rihla_booking=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Rihla API on port {}", config.server.port);

    // Redis Connection
    let redis = match &config.redis.url {
        Some(url) => Some(Arc::new(
            RedisClient::new(url).await.context("Failed to connect to Redis")?,
        )),
        None => None,
    };

    // Postgres Connection
    let db = match &config.database.url {
        Some(url) => {
            let db = DbClient::new(url, config.database.max_connections)
                .await
                .context("Failed to connect to Postgres")?;
            db.migrate().await.context("Failed to run migrations")?;
            Some(db)
        }
        None => None,
    };

    let ledger: Arc<dyn AvailabilityLedger> = match config.ledger.backend {
        LedgerBackend::Memory => Arc::new(InMemoryLedger::new()),
        LedgerBackend::Postgres => {
            let db = db
                .as_ref()
                .context("ledger.backend = \"postgres\" requires database.url")?;
            Arc::new(PgAvailabilityLedger::new(db.pool.clone()))
        }
        LedgerBackend::Redis => {
            let redis = redis
                .as_ref()
                .context("ledger.backend = \"redis\" requires redis.url")?;
            Arc::new(RedisLedger::new((**redis).clone()))
        }
    };
    tracing::info!("Availability ledger backend: {:?}", config.ledger.backend);

    let backends = match &db {
        Some(db) => Backends {
            catalog: Arc::new(PgCatalogRepository::new(db.pool.clone())),
            ledger,
            bookings: Arc::new(PgBookingRepository::new(db.pool.clone())),
            roles: Arc::new(PgRoleDirectory::new(db.pool.clone())),
        },
        None => {
            tracing::warn!("No database configured; catalog and bookings are kept in memory");
            let roles = StaticRoleDirectory::new();
            for grant in &config.auth.static_roles {
                roles.grant(grant.user_id.clone(), grant.role, grant.provider_id);
            }
            Backends {
                ledger,
                ..Backends::in_memory(Arc::new(roles))
            }
        }
    };

    let dispatcher = NotificationDispatcher::new(config.business_rules.event_buffer);

    // Kafka Connection
    #[cfg(feature = "kafka")]
    let dispatcher = match &config.kafka.brokers {
        Some(brokers) => {
            let producer = rihla_store::EventProducer::new(brokers)
                .context("Failed to create Kafka producer")?;
            dispatcher.with_sink(Arc::new(producer))
        }
        None => dispatcher,
    };

    let mut state = AppState::new(backends, &config.auth, &config.business_rules, dispatcher)
        .context("Failed to register metrics")?;
    if let Some(redis) = redis {
        state = state.with_rate_limit(redis, config.business_rules.rate_limit_per_minute);
    }

    let app = app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
