use async_trait::async_trait;
use chrono::NaiveDate;
use rihla_core::repository::{AvailabilityLedger, Released, Reservation, Reserved};
use rihla_core::{BookingTarget, DateRange, LedgerError, StorageError};
use rihla_shared::BookingId;
use sqlx::{PgPool, Postgres, Transaction};

use crate::{map_sqlx, to_i32};

/// Availability Ledger on Postgres. Each call is one transaction; seat items
/// use a conditional decrement, date-ranged items lock their day rows in
/// date order so overlapping reservations serialize without deadlocking.
pub struct PgAvailabilityLedger {
    pool: PgPool,
    lock_timeout_ms: u64,
}

impl PgAvailabilityLedger {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lock_timeout_ms: 2_000,
        }
    }

    pub fn with_lock_timeout(mut self, lock_timeout_ms: u64) -> Self {
        self.lock_timeout_ms = lock_timeout_ms;
        self
    }

    async fn begin(&self) -> Result<Transaction<'_, Postgres>, LedgerError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;
        // Lock waits beyond this surface as SQLSTATE 55P03, which is transient.
        sqlx::query(&format!("SET LOCAL lock_timeout = '{}ms'", self.lock_timeout_ms))
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;
        Ok(tx)
    }
}

fn db(err: sqlx::Error) -> LedgerError {
    LedgerError::Storage(map_sqlx(err))
}

#[derive(sqlx::FromRow)]
struct HoldRow {
    item_kind: String,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    quantity: i32,
    released_at: Option<chrono::DateTime<chrono::Utc>>,
}

async fn reserve_seats(
    tx: &mut Transaction<'_, Postgres>,
    reservation: &Reservation,
) -> Result<(), LedgerError> {
    let kind = reservation.target.kind().as_str();
    let item_id = reservation.target.item_id();
    let quantity = to_i32(reservation.quantity, "quantity")?;
    let capacity = to_i32(reservation.capacity, "capacity")?;

    sqlx::query(
        r#"
        INSERT INTO seat_availability (item_kind, item_id, capacity, available)
        VALUES ($1, $2, $3, $3)
        ON CONFLICT (item_kind, item_id) DO NOTHING
        "#,
    )
    .bind(kind)
    .bind(item_id)
    .bind(capacity)
    .execute(&mut **tx)
    .await
    .map_err(db)?;

    // Single conditional write: decrements only if enough seats remain.
    let updated: Option<(i32,)> = sqlx::query_as(
        r#"
        UPDATE seat_availability
        SET available = available - $3
        WHERE item_kind = $1 AND item_id = $2 AND available >= $3
        RETURNING available
        "#,
    )
    .bind(kind)
    .bind(item_id)
    .bind(quantity)
    .fetch_optional(&mut **tx)
    .await
    .map_err(db)?;

    if updated.is_none() {
        let (available,): (i32,) = sqlx::query_as(
            "SELECT available FROM seat_availability WHERE item_kind = $1 AND item_id = $2",
        )
        .bind(kind)
        .bind(item_id)
        .fetch_one(&mut **tx)
        .await
        .map_err(db)?;

        return Err(LedgerError::InsufficientCapacity {
            requested: reservation.quantity,
            available: available.max(0) as u32,
            day: None,
        });
    }
    Ok(())
}

async fn reserve_days(
    tx: &mut Transaction<'_, Postgres>,
    reservation: &Reservation,
    range: DateRange,
) -> Result<(), LedgerError> {
    let kind = reservation.target.kind().as_str();
    let item_id = reservation.target.item_id();
    let quantity = to_i32(reservation.quantity, "quantity")?;
    let capacity = to_i32(reservation.capacity, "capacity")?;

    sqlx::query(
        r#"
        INSERT INTO daily_availability (item_kind, item_id, day, capacity, reserved)
        SELECT $1, $2, d::date, $3, 0
        FROM generate_series($4::date, $5::date - 1, INTERVAL '1 day') AS d
        ON CONFLICT (item_kind, item_id, day) DO NOTHING
        "#,
    )
    .bind(kind)
    .bind(item_id)
    .bind(capacity)
    .bind(range.start)
    .bind(range.end)
    .execute(&mut **tx)
    .await
    .map_err(db)?;

    let days: Vec<(NaiveDate, i32, i32)> = sqlx::query_as(
        r#"
        SELECT day, capacity, reserved
        FROM daily_availability
        WHERE item_kind = $1 AND item_id = $2 AND day >= $3 AND day < $4
        ORDER BY day
        FOR UPDATE
        "#,
    )
    .bind(kind)
    .bind(item_id)
    .bind(range.start)
    .bind(range.end)
    .fetch_all(&mut **tx)
    .await
    .map_err(db)?;

    if let Some((day, capacity, reserved)) =
        days.iter().find(|(_, capacity, reserved)| reserved + quantity > *capacity)
    {
        return Err(LedgerError::InsufficientCapacity {
            requested: reservation.quantity,
            available: (capacity - reserved).max(0) as u32,
            day: Some(*day),
        });
    }

    sqlx::query(
        r#"
        UPDATE daily_availability
        SET reserved = reserved + $3
        WHERE item_kind = $1 AND item_id = $2 AND day >= $4 AND day < $5
        "#,
    )
    .bind(kind)
    .bind(item_id)
    .bind(quantity)
    .bind(range.start)
    .bind(range.end)
    .execute(&mut **tx)
    .await
    .map_err(db)?;

    Ok(())
}

#[async_trait]
impl AvailabilityLedger for PgAvailabilityLedger {
    async fn reserve(&self, reservation: &Reservation) -> Result<Reserved, LedgerError> {
        let mut tx = self.begin().await?;

        // 1. Idempotency: the booking may already hold this reservation
        let existing: Option<(BookingId,)> =
            sqlx::query_as("SELECT booking_id FROM reservations WHERE booking_id = $1")
                .bind(reservation.booking_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(db)?;
        if existing.is_some() {
            return Ok(Reserved::Existing);
        }

        // 2. Check-and-decrement under row locks
        match (reservation.target.is_date_ranged(), reservation.date_range) {
            (false, _) => reserve_seats(&mut tx, reservation).await?,
            (true, Some(range)) => reserve_days(&mut tx, reservation, range).await?,
            (true, None) => {
                return Err(LedgerError::Storage(StorageError::Persistence(format!(
                    "reservation {} for {} has no date range",
                    reservation.booking_id, reservation.target
                ))))
            }
        }

        // 3. Record the hold so release restores exactly this quantity
        sqlx::query(
            r#"
            INSERT INTO reservations (booking_id, item_kind, item_id, start_date, end_date, quantity)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(reservation.booking_id)
        .bind(reservation.target.kind().as_str())
        .bind(reservation.target.item_id())
        .bind(reservation.date_range.map(|r| r.start))
        .bind(reservation.date_range.map(|r| r.end))
        .bind(to_i32(reservation.quantity, "quantity")?)
        .execute(&mut *tx)
        .await
        .map_err(db)?;

        tx.commit().await.map_err(db)?;
        tracing::debug!(
            booking_id = %reservation.booking_id,
            target = %reservation.target,
            quantity = reservation.quantity,
            "Capacity reserved"
        );
        Ok(Reserved::Created)
    }

    async fn release(
        &self,
        booking_id: BookingId,
        target: &BookingTarget,
    ) -> Result<Released, LedgerError> {
        let mut tx = self.begin().await?;

        let hold: Option<HoldRow> = sqlx::query_as(
            r#"
            SELECT item_kind, start_date, end_date, quantity, released_at
            FROM reservations
            WHERE booking_id = $1 AND item_id = $2
            FOR UPDATE
            "#,
        )
        .bind(booking_id)
        .bind(target.item_id())
        .fetch_optional(&mut *tx)
        .await
        .map_err(db)?;

        let hold = match hold {
            Some(hold) if hold.released_at.is_none() => hold,
            _ => return Ok(Released::AlreadyReleased),
        };

        match (hold.start_date, hold.end_date) {
            (Some(start), Some(end)) => {
                sqlx::query(
                    r#"
                    UPDATE daily_availability
                    SET reserved = GREATEST(0, reserved - $3)
                    WHERE item_kind = $1 AND item_id = $2 AND day >= $4 AND day < $5
                    "#,
                )
                .bind(&hold.item_kind)
                .bind(target.item_id())
                .bind(hold.quantity)
                .bind(start)
                .bind(end)
                .execute(&mut *tx)
                .await
                .map_err(db)?;
            }
            _ => {
                sqlx::query(
                    r#"
                    UPDATE seat_availability
                    SET available = LEAST(capacity, available + $3)
                    WHERE item_kind = $1 AND item_id = $2
                    "#,
                )
                .bind(&hold.item_kind)
                .bind(target.item_id())
                .bind(hold.quantity)
                .execute(&mut *tx)
                .await
                .map_err(db)?;
            }
        }

        sqlx::query("UPDATE reservations SET released_at = NOW() WHERE booking_id = $1")
            .bind(booking_id)
            .execute(&mut *tx)
            .await
            .map_err(db)?;

        tx.commit().await.map_err(db)?;
        tracing::debug!(%booking_id, %target, quantity = hold.quantity, "Capacity released");
        Ok(Released::Restored {
            quantity: hold.quantity.max(0) as u32,
        })
    }

    async fn availability(
        &self,
        target: &BookingTarget,
        date_range: Option<&DateRange>,
    ) -> Result<Option<u32>, LedgerError> {
        let kind = target.kind().as_str();

        if !target.is_date_ranged() {
            let row: Option<(i32,)> = sqlx::query_as(
                "SELECT available FROM seat_availability WHERE item_kind = $1 AND item_id = $2",
            )
            .bind(kind)
            .bind(target.item_id())
            .fetch_optional(&self.pool)
            .await
            .map_err(db)?;
            return Ok(row.map(|(available,)| available.max(0) as u32));
        }

        let (capacity, peak): (Option<i32>, Option<i32>) = sqlx::query_as(
            r#"
            SELECT MAX(capacity),
                   MAX(reserved) FILTER (WHERE $3::date IS NULL OR (day >= $3 AND day < $4))
            FROM daily_availability
            WHERE item_kind = $1 AND item_id = $2
            "#,
        )
        .bind(kind)
        .bind(target.item_id())
        .bind(date_range.map(|r| r.start))
        .bind(date_range.map(|r| r.end))
        .fetch_one(&self.pool)
        .await
        .map_err(db)?;

        Ok(capacity.map(|capacity| (capacity - peak.unwrap_or(0)).max(0) as u32))
    }
}
