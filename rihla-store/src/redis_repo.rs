use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, RedisResult};
use rihla_core::repository::{AvailabilityLedger, Released, Reservation, Reserved};
use rihla_core::{BookingTarget, DateRange, LedgerError, StorageError};
use rihla_shared::BookingId;
use tracing::info;

use crate::map_redis;

#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        info!("Redis client configured");
        Ok(Self { client })
    }

    pub async fn connection(&self) -> RedisResult<MultiplexedConnection> {
        self.client.get_multiplexed_async_connection().await
    }

    /// Fixed-window counter. Returns `true` while `key` is within `limit`.
    pub async fn check_rate_limit(&self, key: &str, limit: i64, window_seconds: i64) -> RedisResult<bool> {
        let mut conn = self.connection().await?;

        let (count,): (i64,) = redis::pipe()
            .atomic()
            .incr(key, 1)
            .expire(key, window_seconds)
            .ignore()
            .query_async(&mut conn)
            .await?;

        Ok(count <= limit)
    }
}

// ============================================================================
// Ledger
// ============================================================================

// Returns {status, available, failing_day_index}; status 1 = created,
// 2 = already held, 0 = insufficient.
const RESERVE_SEATS: &str = r#"
if redis.call("HEXISTS", KEYS[2], ARGV[1]) == 1 then
    return {2, 0, -1}
end
redis.call("SET", KEYS[1], ARGV[3], "NX")
local available = tonumber(redis.call("GET", KEYS[1]))
local quantity = tonumber(ARGV[2])
if available < quantity then
    return {0, available, -1}
end
redis.call("DECRBY", KEYS[1], quantity)
redis.call("HSET", KEYS[2], ARGV[1], ARGV[4])
return {1, available - quantity, -1}
"#;

const RESERVE_DAYS: &str = r#"
if redis.call("HEXISTS", KEYS[3], ARGV[1]) == 1 then
    return {2, 0, -1}
end
redis.call("SET", KEYS[2], ARGV[3], "NX")
local capacity = tonumber(redis.call("GET", KEYS[2]))
local quantity = tonumber(ARGV[2])
for i = 5, #ARGV do
    local reserved = tonumber(redis.call("HGET", KEYS[1], ARGV[i]) or "0")
    if reserved + quantity > capacity then
        return {0, capacity - reserved, i - 5}
    end
end
for i = 5, #ARGV do
    redis.call("HINCRBY", KEYS[1], ARGV[i], quantity)
end
redis.call("HSET", KEYS[3], ARGV[1], ARGV[4])
return {1, 0, -1}
"#;

// Returns the restored quantity, or -1 when nothing was held.
const RELEASE: &str = r#"
local payload = redis.call("HGET", KEYS[1], ARGV[1])
if not payload then
    return -1
end
local hold = cjson.decode(payload)
if #hold.days == 0 then
    local available = redis.call("INCRBY", KEYS[2], hold.quantity)
    if available > hold.capacity then
        redis.call("SET", KEYS[2], hold.capacity)
    end
else
    for _, day in ipairs(hold.days) do
        local reserved = redis.call("HINCRBY", KEYS[3], day, -hold.quantity)
        if reserved <= 0 then
            redis.call("HDEL", KEYS[3], day)
        end
    end
end
redis.call("HDEL", KEYS[1], ARGV[1])
return hold.quantity
"#;

/// Availability Ledger on Redis. Every check-and-write runs as one Lua
/// script, so it is atomic against concurrent callers. Keys for one item
/// share a hash tag.
pub struct RedisLedger {
    client: RedisClient,
}

struct ItemKeys {
    seats: String,
    days: String,
    capacity: String,
    holds: String,
}

impl ItemKeys {
    fn new(target: &BookingTarget) -> Self {
        let tag = format!("ledger:{{{}:{}}}", target.kind(), target.item_id());
        Self {
            seats: format!("{}:seats", tag),
            days: format!("{}:days", tag),
            capacity: format!("{}:capacity", tag),
            holds: format!("{}:holds", tag),
        }
    }
}

fn hold_payload(reservation: &Reservation) -> String {
    let days: Vec<String> = reservation
        .date_range
        .map(|r| r.days().map(|d| d.to_string()).collect())
        .unwrap_or_default();
    serde_json::json!({
        "quantity": reservation.quantity,
        "capacity": reservation.capacity,
        "days": days,
    })
    .to_string()
}

fn redis_err(err: redis::RedisError) -> LedgerError {
    LedgerError::Storage(map_redis(err))
}

impl RedisLedger {
    pub fn new(client: RedisClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AvailabilityLedger for RedisLedger {
    async fn reserve(&self, reservation: &Reservation) -> Result<Reserved, LedgerError> {
        let mut conn = self.client.connection().await.map_err(redis_err)?;
        let keys = ItemKeys::new(&reservation.target);
        let payload = hold_payload(reservation);

        let (status, available, day_index): (i64, i64, i64) = match (
            reservation.target.is_date_ranged(),
            reservation.date_range,
        ) {
            (false, _) => {
                let script = redis::Script::new(RESERVE_SEATS);
                let result = script
                    .key(&keys.seats)
                    .key(&keys.holds)
                    .arg(reservation.booking_id.to_string())
                    .arg(reservation.quantity)
                    .arg(reservation.capacity)
                    .arg(&payload)
                    .invoke_async(&mut conn)
                    .await
                    .map_err(redis_err)?;
                result
            }
            (true, Some(range)) => {
                let script = redis::Script::new(RESERVE_DAYS);
                let mut invocation = script.prepare_invoke();
                invocation
                    .key(&keys.days)
                    .key(&keys.capacity)
                    .key(&keys.holds)
                    .arg(reservation.booking_id.to_string())
                    .arg(reservation.quantity)
                    .arg(reservation.capacity)
                    .arg(&payload);
                for day in range.days() {
                    invocation.arg(day.to_string());
                }
                let result = invocation.invoke_async(&mut conn).await.map_err(redis_err)?;
                result
            }
            (true, None) => {
                return Err(LedgerError::Storage(StorageError::Persistence(format!(
                    "reservation {} for {} has no date range",
                    reservation.booking_id, reservation.target
                ))))
            }
        };

        match status {
            1 => Ok(Reserved::Created),
            2 => Ok(Reserved::Existing),
            _ => Err(LedgerError::InsufficientCapacity {
                requested: reservation.quantity,
                available: available.max(0) as u32,
                day: reservation
                    .date_range
                    .zip(usize::try_from(day_index).ok())
                    .and_then(|(range, i)| range.days().nth(i)),
            }),
        }
    }

    async fn release(
        &self,
        booking_id: BookingId,
        target: &BookingTarget,
    ) -> Result<Released, LedgerError> {
        let mut conn = self.client.connection().await.map_err(redis_err)?;
        let keys = ItemKeys::new(target);

        let script = redis::Script::new(RELEASE);
        let restored: i64 = script
            .key(&keys.holds)
            .key(&keys.seats)
            .key(&keys.days)
            .arg(booking_id.to_string())
            .invoke_async(&mut conn)
            .await
            .map_err(redis_err)?;

        if restored < 0 {
            return Ok(Released::AlreadyReleased);
        }
        Ok(Released::Restored {
            quantity: restored as u32,
        })
    }

    async fn availability(
        &self,
        target: &BookingTarget,
        date_range: Option<&DateRange>,
    ) -> Result<Option<u32>, LedgerError> {
        let mut conn = self.client.connection().await.map_err(redis_err)?;
        let keys = ItemKeys::new(target);

        if !target.is_date_ranged() {
            let available: Option<i64> = conn.get(&keys.seats).await.map_err(redis_err)?;
            return Ok(available.map(|a| a.max(0) as u32));
        }

        let capacity: Option<i64> = conn.get(&keys.capacity).await.map_err(redis_err)?;
        let Some(capacity) = capacity else {
            return Ok(None);
        };

        let reserved: Vec<Option<i64>> = match date_range {
            Some(range) => {
                let days: Vec<String> = range.days().map(|d| d.to_string()).collect();
                redis::cmd("HMGET")
                    .arg(&keys.days)
                    .arg(days)
                    .query_async(&mut conn)
                    .await
                    .map_err(redis_err)?
            }
            None => {
                let all: Vec<i64> = conn.hvals(&keys.days).await.map_err(redis_err)?;
                all.into_iter().map(Some).collect()
            }
        };

        let peak = reserved.into_iter().flatten().max().unwrap_or(0);
        Ok(Some((capacity - peak).max(0) as u32))
    }
}
