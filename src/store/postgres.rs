use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::{ReviewEntry, Settlement, Store, StoreError, StoreResult};
use crate::domain::edition::{ArtworkEdition, EditionKey, EditionListing};
use crate::domain::order::{Order, OrderEvent, OrderStatus};
use crate::event_log::{deserialize_event, serialize_event, EventEnvelope};

// ============================================================================
// PostgreSQL Store
// ============================================================================
//
// Settlements run in one transaction. Edition rows are taken with
// SELECT ... FOR UPDATE, and the increment itself is conditional on the
// limit so the table can never record more sales than editions exist.
//
// ============================================================================

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("Failed to run migrations")?;

        tracing::info!(max_connections, "Connected to PostgreSQL");
        Ok(Self { pool })
    }
}

// ============================================================================
// Row Mapping
// ============================================================================

#[derive(sqlx::FromRow)]
struct EditionRow {
    artwork_id: String,
    size: String,
    price_minor: i64,
    edition_limit: i32,
    editions_sold: i32,
}

impl TryFrom<EditionRow> for ArtworkEdition {
    type Error = StoreError;

    fn try_from(row: EditionRow) -> Result<Self, Self::Error> {
        let corrupt = |field: &str| StoreError::Corrupt(format!("{}/{} {}", row.artwork_id, row.size, field));
        let price = u64::try_from(row.price_minor).map_err(|_| corrupt("price_minor"))?;
        let limit = u32::try_from(row.edition_limit).map_err(|_| corrupt("edition_limit"))?;
        let sold = u32::try_from(row.editions_sold).map_err(|_| corrupt("editions_sold"))?;

        ArtworkEdition::new(row.artwork_id.clone(), row.size.clone(), price, limit, sold)
            .map_err(|e| StoreError::Corrupt(e.to_string()))
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    payment_reference: String,
    customer: String,
    items: String,
    total_minor: i64,
    status: String,
    version: i64,
    tracking_number: Option<String>,
    carrier: Option<String>,
    cancelled_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = StoreError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let status: OrderStatus = row
            .status
            .parse()
            .map_err(|_| StoreError::Corrupt(format!("order {} status {}", row.id, row.status)))?;
        let total_minor_units = u64::try_from(row.total_minor)
            .map_err(|_| StoreError::Corrupt(format!("order {} total", row.id)))?;

        Ok(Order {
            id: row.id,
            version: row.version,
            payment_reference: row.payment_reference,
            customer: serde_json::from_str(&row.customer)?,
            items: serde_json::from_str(&row.items)?,
            total_minor_units,
            status,
            tracking_number: row.tracking_number,
            carrier: row.carrier,
            cancelled_reason: row.cancelled_reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct EventRow {
    order_id: Uuid,
    sequence_number: i64,
    event_id: Uuid,
    event_type: String,
    event_data: String,
    correlation_id: Uuid,
    timestamp: DateTime<Utc>,
}

impl TryFrom<EventRow> for EventEnvelope<OrderEvent> {
    type Error = StoreError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        Ok(EventEnvelope {
            event_id: row.event_id,
            aggregate_id: row.order_id,
            sequence_number: row.sequence_number,
            event_type: row.event_type,
            event_data: deserialize_event(&row.event_data)?,
            correlation_id: row.correlation_id,
            timestamp: row.timestamp,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ReviewRow {
    payment_reference: String,
    customer: String,
    items: String,
    reason: String,
    delivery_count: i32,
    first_seen_at: DateTime<Utc>,
    last_seen_at: DateTime<Utc>,
}

impl TryFrom<ReviewRow> for ReviewEntry {
    type Error = StoreError;

    fn try_from(row: ReviewRow) -> Result<Self, Self::Error> {
        Ok(ReviewEntry {
            payment_reference: row.payment_reference,
            customer: serde_json::from_str(&row.customer)?,
            items: serde_json::from_str(&row.items)?,
            reason: row.reason,
            delivery_count: row.delivery_count,
            first_seen_at: row.first_seen_at,
            last_seen_at: row.last_seen_at,
        })
    }
}

fn to_i64(value: u64, what: &str) -> StoreResult<i64> {
    i64::try_from(value).map_err(|_| StoreError::Constraint(format!("{} out of range: {}", what, value)))
}

fn to_i32(value: u32, what: &str) -> StoreResult<i32> {
    i32::try_from(value).map_err(|_| StoreError::Constraint(format!("{} out of range: {}", what, value)))
}

const EDITION_COLUMNS: &str = "artwork_id, size, price_minor, edition_limit, editions_sold";

const ORDER_COLUMNS: &str = "id, payment_reference, customer, items, total_minor, status, version, \
     tracking_number, carrier, cancelled_reason, created_at, updated_at";

async fn insert_event(
    tx: &mut Transaction<'static, Postgres>,
    envelope: &EventEnvelope<OrderEvent>,
) -> StoreResult<()> {
    sqlx::query(
        "INSERT INTO order_events (
            order_id, sequence_number, event_id, event_type, event_data, correlation_id, timestamp
        ) VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(envelope.aggregate_id)
    .bind(envelope.sequence_number)
    .bind(envelope.event_id)
    .bind(&envelope.event_type)
    .bind(serialize_event(&envelope.event_data)?)
    .bind(envelope.correlation_id)
    .bind(envelope.timestamp)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

// ============================================================================
// Store
// ============================================================================

#[async_trait]
impl Store for PgStore {
    async fn edition(&self, key: &EditionKey) -> StoreResult<Option<ArtworkEdition>> {
        let row = sqlx::query_as::<_, EditionRow>(&format!(
            "SELECT {} FROM artwork_editions WHERE artwork_id = $1 AND size = $2",
            EDITION_COLUMNS
        ))
        .bind(&key.artwork_id)
        .bind(&key.size)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ArtworkEdition::try_from).transpose()
    }

    async fn editions_for_artwork(&self, artwork_id: &str) -> StoreResult<Vec<ArtworkEdition>> {
        let rows = sqlx::query_as::<_, EditionRow>(&format!(
            "SELECT {} FROM artwork_editions WHERE artwork_id = $1 ORDER BY size",
            EDITION_COLUMNS
        ))
        .bind(artwork_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ArtworkEdition::try_from).collect()
    }

    async fn publish_edition(&self, listing: &EditionListing) -> StoreResult<ArtworkEdition> {
        let mut tx = self.pool.begin().await?;

        let current = sqlx::query_as::<_, EditionRow>(&format!(
            "SELECT {} FROM artwork_editions WHERE artwork_id = $1 AND size = $2 FOR UPDATE",
            EDITION_COLUMNS
        ))
        .bind(&listing.artwork_id)
        .bind(&listing.size)
        .fetch_optional(&mut *tx)
        .await?
        .map(ArtworkEdition::try_from)
        .transpose()?;

        let updated = listing.apply_to(current.as_ref())?;

        sqlx::query(
            "INSERT INTO artwork_editions (artwork_id, size, price_minor, edition_limit, editions_sold, updated_at)
             VALUES ($1, $2, $3, $4, 0, now())
             ON CONFLICT (artwork_id, size) DO UPDATE
             SET price_minor = EXCLUDED.price_minor,
                 edition_limit = EXCLUDED.edition_limit,
                 updated_at = now()",
        )
        .bind(&updated.artwork_id)
        .bind(&updated.size)
        .bind(to_i64(updated.price_minor_units, "price")?)
        .bind(to_i32(updated.edition_limit, "edition_limit")?)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(updated)
    }

    async fn order(&self, order_id: Uuid) -> StoreResult<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(&format!("SELECT {} FROM orders WHERE id = $1", ORDER_COLUMNS))
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Order::try_from).transpose()
    }

    async fn order_by_payment_reference(&self, reference: &str) -> StoreResult<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {} FROM orders WHERE payment_reference = $1",
            ORDER_COLUMNS
        ))
        .bind(reference)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Order::try_from).transpose()
    }

    async fn list_orders(&self, status: Option<OrderStatus>, limit: u32) -> StoreResult<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {} FROM orders
             WHERE ($1::TEXT IS NULL OR status = $1)
             ORDER BY created_at DESC, id DESC
             LIMIT $2",
            ORDER_COLUMNS
        ))
        .bind(status.map(|s| s.as_str()))
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Order::try_from).collect()
    }

    async fn order_history(&self, order_id: Uuid) -> StoreResult<Vec<EventEnvelope<OrderEvent>>> {
        let rows = sqlx::query_as::<_, EventRow>(
            "SELECT order_id, sequence_number, event_id, event_type, event_data, correlation_id, timestamp
             FROM order_events
             WHERE order_id = $1
             ORDER BY sequence_number ASC",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(EventEnvelope::try_from).collect()
    }

    async fn record_order_transition(
        &self,
        expected_version: i64,
        order: &Order,
        envelope: &EventEnvelope<OrderEvent>,
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE orders
             SET status = $1, version = $2, tracking_number = $3, carrier = $4,
                 cancelled_reason = $5, updated_at = $6
             WHERE id = $7 AND version = $8",
        )
        .bind(order.status.as_str())
        .bind(order.version)
        .bind(&order.tracking_number)
        .bind(&order.carrier)
        .bind(&order.cancelled_reason)
        .bind(order.updated_at)
        .bind(order.id)
        .bind(expected_version)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            let exists: Option<(i64,)> = sqlx::query_as("SELECT version FROM orders WHERE id = $1")
                .bind(order.id)
                .fetch_optional(&mut *tx)
                .await?;
            return Err(match exists {
                Some(_) => StoreError::VersionConflict {
                    order_id: order.id,
                    expected_version,
                },
                None => StoreError::OrderNotFound(order.id),
            });
        }

        insert_event(&mut tx, envelope).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn review_queue(&self, limit: u32) -> StoreResult<Vec<ReviewEntry>> {
        let rows = sqlx::query_as::<_, ReviewRow>(
            "SELECT payment_reference, customer, items, reason, delivery_count, first_seen_at, last_seen_at
             FROM payment_review_queue
             ORDER BY last_seen_at DESC
             LIMIT $1",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ReviewEntry::try_from).collect()
    }

    async fn begin_settlement(&self) -> StoreResult<Box<dyn Settlement>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgSettlement {
            tx,
            locked: BTreeMap::new(),
        }))
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// ============================================================================
// Settlement
// ============================================================================

struct PgSettlement {
    tx: Transaction<'static, Postgres>,
    /// Locked rows with this transaction's sales applied
    locked: BTreeMap<EditionKey, ArtworkEdition>,
}

#[async_trait]
impl Settlement for PgSettlement {
    async fn order_by_payment_reference(&mut self, reference: &str) -> StoreResult<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {} FROM orders WHERE payment_reference = $1",
            ORDER_COLUMNS
        ))
        .bind(reference)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(Order::try_from).transpose()
    }

    async fn lock_edition(&mut self, key: &EditionKey) -> StoreResult<Option<ArtworkEdition>> {
        if let Some(edition) = self.locked.get(key) {
            return Ok(Some(edition.clone()));
        }

        let edition = sqlx::query_as::<_, EditionRow>(&format!(
            "SELECT {} FROM artwork_editions WHERE artwork_id = $1 AND size = $2 FOR UPDATE",
            EDITION_COLUMNS
        ))
        .bind(&key.artwork_id)
        .bind(&key.size)
        .fetch_optional(&mut *self.tx)
        .await?
        .map(ArtworkEdition::try_from)
        .transpose()?;

        if let Some(edition) = &edition {
            self.locked.insert(key.clone(), edition.clone());
        }
        Ok(edition)
    }

    async fn record_sale(&mut self, key: &EditionKey, quantity: u32) -> StoreResult<()> {
        if !self.locked.contains_key(key) {
            return Err(StoreError::EditionNotLocked(key.clone()));
        }

        let result = sqlx::query(
            "UPDATE artwork_editions
             SET editions_sold = editions_sold + $3, updated_at = now()
             WHERE artwork_id = $1 AND size = $2 AND editions_sold + $3 <= edition_limit",
        )
        .bind(&key.artwork_id)
        .bind(&key.size)
        .bind(to_i32(quantity, "quantity")?)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Constraint(format!(
                "{} cannot take {} more sales",
                key, quantity
            )));
        }

        if let Some(edition) = self.locked.get_mut(key) {
            edition.editions_sold += quantity;
        }
        Ok(())
    }

    async fn insert_order(&mut self, order: &Order, placed: &EventEnvelope<OrderEvent>) -> StoreResult<()> {
        // ON CONFLICT keeps the transaction usable when another delivery of
        // the same payment committed first
        let result = sqlx::query(
            "INSERT INTO orders (
                id, payment_reference, customer, items, total_minor, status, version,
                tracking_number, carrier, cancelled_reason, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (payment_reference) DO NOTHING",
        )
        .bind(order.id)
        .bind(&order.payment_reference)
        .bind(serde_json::to_string(&order.customer)?)
        .bind(serde_json::to_string(&order.items)?)
        .bind(to_i64(order.total_minor_units, "total")?)
        .bind(order.status.as_str())
        .bind(order.version)
        .bind(&order.tracking_number)
        .bind(&order.carrier)
        .bind(&order.cancelled_reason)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::DuplicatePaymentReference(order.payment_reference.clone()));
        }

        insert_event(&mut self.tx, placed).await
    }

    async fn hold_for_review(&mut self, entry: &ReviewEntry) -> StoreResult<()> {
        // Runs after the edition locks, so an order committed by a concurrent
        // delivery of the same payment is visible here
        let result = sqlx::query(
            "INSERT INTO payment_review_queue (
                payment_reference, customer, items, reason, delivery_count, first_seen_at, last_seen_at
            )
            SELECT $1, $2, $3, $4, 1, $5, $6
            WHERE NOT EXISTS (SELECT 1 FROM orders WHERE payment_reference = $1)
            ON CONFLICT (payment_reference) DO UPDATE
            SET delivery_count = payment_review_queue.delivery_count + 1,
                reason = EXCLUDED.reason,
                last_seen_at = EXCLUDED.last_seen_at",
        )
        .bind(&entry.payment_reference)
        .bind(serde_json::to_string(&entry.customer)?)
        .bind(serde_json::to_string(&entry.items)?)
        .bind(&entry.reason)
        .bind(entry.first_seen_at)
        .bind(entry.last_seen_at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::DuplicatePaymentReference(entry.payment_reference.clone()));
        }
        Ok(())
    }

    async fn resolve_review(&mut self, reference: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM payment_review_queue WHERE payment_reference = $1")
            .bind(reference)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
