// ============================================================================
// Store - Persistence for the edition ledger, orders and review queue
// ============================================================================
//
// `Store` is the read side plus admin writes. Everything the payment event
// processor does happens inside one `Settlement`: edition rows are locked,
// increments and the order insert are staged, and `commit` applies them all
// at once. Dropping a settlement without committing rolls it back.
//
// Implementations:
// - PgStore      (PostgreSQL via sqlx, SELECT ... FOR UPDATE)
// - MemoryStore  (per-edition tokio mutexes; development and tests)
//
// ============================================================================

mod error;
mod memory;
mod postgres;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::edition::{ArtworkEdition, EditionKey, EditionListing};
use crate::domain::order::{Customer, Order, OrderEvent, OrderLineItem, OrderStatus};
use crate::event_log::EventEnvelope;

/// A paid confirmation that could not be fulfilled and awaits an operator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewEntry {
    pub payment_reference: String,
    pub customer: Customer,
    pub items: Vec<OrderLineItem>,
    pub reason: String,
    pub delivery_count: i32,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn edition(&self, key: &EditionKey) -> StoreResult<Option<ArtworkEdition>>;

    async fn editions_for_artwork(&self, artwork_id: &str) -> StoreResult<Vec<ArtworkEdition>>;

    /// Create or update price and limit; the sold count is left untouched
    async fn publish_edition(&self, listing: &EditionListing) -> StoreResult<ArtworkEdition>;

    async fn order(&self, order_id: Uuid) -> StoreResult<Option<Order>>;

    async fn order_by_payment_reference(&self, reference: &str) -> StoreResult<Option<Order>>;

    /// Newest first
    async fn list_orders(&self, status: Option<OrderStatus>, limit: u32) -> StoreResult<Vec<Order>>;

    async fn order_history(&self, order_id: Uuid) -> StoreResult<Vec<EventEnvelope<OrderEvent>>>;

    /// Persist `order` (already at its new version) and append `envelope`,
    /// provided the stored order is still at `expected_version`
    async fn record_order_transition(
        &self,
        expected_version: i64,
        order: &Order,
        envelope: &EventEnvelope<OrderEvent>,
    ) -> StoreResult<()>;

    async fn review_queue(&self, limit: u32) -> StoreResult<Vec<ReviewEntry>>;

    async fn begin_settlement(&self) -> StoreResult<Box<dyn Settlement>>;

    async fn ping(&self) -> StoreResult<()>;
}

/// One all-or-nothing unit of ledger increments plus order insert
#[async_trait]
pub trait Settlement: Send {
    async fn order_by_payment_reference(&mut self, reference: &str) -> StoreResult<Option<Order>>;

    /// Lock the edition row until commit or drop and return its current value.
    /// Locking the same key twice returns the row with this settlement's
    /// staged sales applied.
    async fn lock_edition(&mut self, key: &EditionKey) -> StoreResult<Option<ArtworkEdition>>;

    /// Stage `editions_sold += quantity` on a locked edition. Fails with
    /// `Constraint` rather than exceed the limit.
    async fn record_sale(&mut self, key: &EditionKey, quantity: u32) -> StoreResult<()>;

    /// Fails with `DuplicatePaymentReference` if the reference is taken
    async fn insert_order(&mut self, order: &Order, placed: &EventEnvelope<OrderEvent>) -> StoreResult<()>;

    /// Upsert into the review queue, bumping the delivery count on repeats.
    /// Fails with `DuplicatePaymentReference` if the reference has an order.
    async fn hold_for_review(&mut self, entry: &ReviewEntry) -> StoreResult<()>;

    /// Take the reference off the review queue once it has an order.
    /// Returns whether an entry was held for it.
    async fn resolve_review(&mut self, reference: &str) -> StoreResult<bool>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
}
