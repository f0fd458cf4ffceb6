use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rihla_core::{
    Booking, BookingRepository, BookingState, BookingStatus, BookingTarget, DateRange, ItemKind,
    PaymentStatus, StorageError,
};
use rihla_shared::{BookingId, ProviderId};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{map_sqlx, to_i32};

pub struct PgBookingRepository {
    pool: PgPool,
}

impl PgBookingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// Internal struct for type-safe querying
#[derive(Debug, sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    customer_id: String,
    provider_id: Uuid,
    item_type: String,
    item_id: Uuid,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    quantity: i32,
    room_tier: Option<String>,
    unit_price_snapshot: i64,
    total_price: i64,
    status: String,
    payment_status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

const SELECT_BOOKING: &str = r#"
    SELECT id, customer_id, provider_id, item_type, item_id, start_date, end_date,
           quantity, room_tier, unit_price_snapshot, total_price, status, payment_status,
           created_at, updated_at
    FROM bookings
"#;

impl TryFrom<BookingRow> for Booking {
    type Error = StorageError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        let corrupt = |what: String| {
            StorageError::Persistence(format!("booking {} has {}", row.id, what))
        };

        let kind: ItemKind = row.item_type.parse().map_err(corrupt)?;
        let status: BookingStatus = row.status.parse().map_err(corrupt)?;
        let payment_status: PaymentStatus = row.payment_status.parse().map_err(corrupt)?;
        let quantity = u32::try_from(row.quantity)
            .map_err(|_| corrupt(format!("invalid quantity {}", row.quantity)))?;
        let date_range = match (row.start_date, row.end_date) {
            (Some(start), Some(end)) => Some(DateRange::new(start, end)),
            (None, None) => None,
            _ => return Err(corrupt("a half-open date range".to_string())),
        };

        Ok(Booking {
            id: row.id,
            customer_id: row.customer_id,
            provider_id: row.provider_id,
            target: BookingTarget::new(kind, row.item_id),
            date_range,
            quantity,
            room_tier: row.room_tier,
            unit_price_snapshot: row.unit_price_snapshot,
            total_price: row.total_price,
            status,
            payment_status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl BookingRepository for PgBookingRepository {
    async fn insert(&self, booking: &Booking) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO bookings (
                id, customer_id, provider_id, item_type, item_id, start_date, end_date,
                quantity, room_tier, unit_price_snapshot, total_price, status, payment_status,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(booking.id)
        .bind(&booking.customer_id)
        .bind(booking.provider_id)
        .bind(booking.target.kind().as_str())
        .bind(booking.target.item_id())
        .bind(booking.date_range.map(|r| r.start))
        .bind(booking.date_range.map(|r| r.end))
        .bind(to_i32(booking.quantity, "quantity")?)
        .bind(&booking.room_tier)
        .bind(booking.unit_price_snapshot)
        .bind(booking.total_price)
        .bind(booking.status.as_str())
        .bind(booking.payment_status.as_str())
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(())
    }

    async fn get(&self, id: BookingId) -> Result<Option<Booking>, StorageError> {
        let row: Option<BookingRow> = sqlx::query_as(&format!("{} WHERE id = $1", SELECT_BOOKING))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;

        row.map(Booking::try_from).transpose()
    }

    async fn transition(
        &self,
        id: BookingId,
        from: BookingState,
        to: BookingState,
    ) -> Result<bool, StorageError> {
        let result = sqlx::query(
            r#"
            UPDATE bookings
            SET status = $4, payment_status = $5, updated_at = NOW()
            WHERE id = $1 AND status = $2 AND payment_status = $3
            "#,
        )
        .bind(id)
        .bind(from.status.as_str())
        .bind(from.payment_status.as_str())
        .bind(to.status.as_str())
        .bind(to.payment_status.as_str())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_for_provider(
        &self,
        provider_id: Option<ProviderId>,
    ) -> Result<Vec<Booking>, StorageError> {
        let rows: Vec<BookingRow> = sqlx::query_as(&format!(
            "{} WHERE ($1::uuid IS NULL OR provider_id = $1) ORDER BY created_at",
            SELECT_BOOKING
        ))
        .bind(provider_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        rows.into_iter().map(Booking::try_from).collect()
    }
}
