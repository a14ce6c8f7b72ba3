use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use uuid::Uuid;

use super::{ReviewEntry, Settlement, Store, StoreError, StoreResult};
use crate::domain::edition::{ArtworkEdition, EditionKey, EditionListing};
use crate::domain::order::{Order, OrderEvent, OrderStatus};
use crate::event_log::EventEnvelope;

// ============================================================================
// In-Memory Store
// ============================================================================
//
// Each edition lives behind its own mutex. A settlement holds the owned
// guards of every edition it locked, so two settlements touching the same
// edition run one after the other while unrelated editions stay parallel.
//
// The map lock is only ever held long enough to clone an edition cell; it is
// never held while waiting on an edition mutex.
//
// ============================================================================

type EditionCell = Arc<Mutex<ArtworkEdition>>;

#[derive(Default)]
struct OrderBook {
    orders: HashMap<Uuid, Order>,
    by_reference: HashMap<String, Uuid>,
    history: HashMap<Uuid, Vec<EventEnvelope<OrderEvent>>>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    editions: Arc<RwLock<HashMap<EditionKey, EditionCell>>>,
    orders: Arc<Mutex<OrderBook>>,
    reviews: Arc<Mutex<HashMap<String, ReviewEntry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn cell(&self, key: &EditionKey) -> Option<EditionCell> {
        self.editions.read().await.get(key).cloned()
    }

    /// Seed ledger rows as-is, sold counts included
    #[cfg(test)]
    pub async fn with_editions(editions: impl IntoIterator<Item = ArtworkEdition>) -> Self {
        let store = Self::new();
        {
            let mut map = store.editions.write().await;
            for edition in editions {
                map.insert(edition.key(), Arc::new(Mutex::new(edition)));
            }
        }
        store
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn edition(&self, key: &EditionKey) -> StoreResult<Option<ArtworkEdition>> {
        let Some(cell) = self.cell(key).await else {
            return Ok(None);
        };
        let edition = cell.lock().await.clone();
        Ok(Some(edition))
    }

    async fn editions_for_artwork(&self, artwork_id: &str) -> StoreResult<Vec<ArtworkEdition>> {
        let cells: Vec<EditionCell> = {
            let map = self.editions.read().await;
            map.iter()
                .filter(|(key, _)| key.artwork_id == artwork_id)
                .map(|(_, cell)| cell.clone())
                .collect()
        };

        let mut editions = Vec::with_capacity(cells.len());
        for cell in cells {
            editions.push(cell.lock().await.clone());
        }
        editions.sort_by(|a, b| a.size.cmp(&b.size));
        Ok(editions)
    }

    async fn publish_edition(&self, listing: &EditionListing) -> StoreResult<ArtworkEdition> {
        let key = listing.key();

        let cell = match self.cell(&key).await {
            Some(cell) => cell,
            None => {
                let mut map = self.editions.write().await;
                match map.get(&key) {
                    Some(cell) => cell.clone(),
                    None => {
                        let edition = listing.apply_to(None)?;
                        map.insert(key, Arc::new(Mutex::new(edition.clone())));
                        return Ok(edition);
                    }
                }
            }
        };

        let mut current = cell.lock().await;
        let updated = listing.apply_to(Some(&current))?;
        *current = updated.clone();
        Ok(updated)
    }

    async fn order(&self, order_id: Uuid) -> StoreResult<Option<Order>> {
        Ok(self.orders.lock().await.orders.get(&order_id).cloned())
    }

    async fn order_by_payment_reference(&self, reference: &str) -> StoreResult<Option<Order>> {
        let book = self.orders.lock().await;
        Ok(book
            .by_reference
            .get(reference)
            .and_then(|id| book.orders.get(id))
            .cloned())
    }

    async fn list_orders(&self, status: Option<OrderStatus>, limit: u32) -> StoreResult<Vec<Order>> {
        let book = self.orders.lock().await;
        let mut orders: Vec<Order> = book
            .orders
            .values()
            .filter(|order| status.map_or(true, |s| order.status == s))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        orders.truncate(limit as usize);
        Ok(orders)
    }

    async fn order_history(&self, order_id: Uuid) -> StoreResult<Vec<EventEnvelope<OrderEvent>>> {
        let book = self.orders.lock().await;
        Ok(book.history.get(&order_id).cloned().unwrap_or_default())
    }

    async fn record_order_transition(
        &self,
        expected_version: i64,
        order: &Order,
        envelope: &EventEnvelope<OrderEvent>,
    ) -> StoreResult<()> {
        let mut book = self.orders.lock().await;

        let stored = book
            .orders
            .get_mut(&order.id)
            .ok_or(StoreError::OrderNotFound(order.id))?;
        if stored.version != expected_version {
            return Err(StoreError::VersionConflict {
                order_id: order.id,
                expected_version,
            });
        }
        *stored = order.clone();

        book.history.entry(order.id).or_default().push(envelope.clone());
        Ok(())
    }

    async fn review_queue(&self, limit: u32) -> StoreResult<Vec<ReviewEntry>> {
        let reviews = self.reviews.lock().await;
        let mut entries: Vec<ReviewEntry> = reviews.values().cloned().collect();
        entries.sort_by(|a, b| b.last_seen_at.cmp(&a.last_seen_at));
        entries.truncate(limit as usize);
        Ok(entries)
    }

    async fn begin_settlement(&self) -> StoreResult<Box<dyn Settlement>> {
        Ok(Box::new(MemorySettlement {
            store: self.clone(),
            locked: BTreeMap::new(),
            staged_orders: Vec::new(),
            staged_reviews: Vec::new(),
            staged_resolutions: Vec::new(),
        }))
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

// ============================================================================
// Settlement
// ============================================================================

struct LockedEdition {
    guard: OwnedMutexGuard<ArtworkEdition>,
    pending: u32,
}

impl LockedEdition {
    fn current(&self) -> ArtworkEdition {
        let mut edition = self.guard.clone();
        edition.editions_sold += self.pending;
        edition
    }
}

struct MemorySettlement {
    store: MemoryStore,
    locked: BTreeMap<EditionKey, LockedEdition>,
    staged_orders: Vec<(Order, EventEnvelope<OrderEvent>)>,
    staged_reviews: Vec<ReviewEntry>,
    staged_resolutions: Vec<String>,
}

#[async_trait]
impl Settlement for MemorySettlement {
    async fn order_by_payment_reference(&mut self, reference: &str) -> StoreResult<Option<Order>> {
        if let Some((order, _)) = self
            .staged_orders
            .iter()
            .find(|(order, _)| order.payment_reference == reference)
        {
            return Ok(Some(order.clone()));
        }
        self.store.order_by_payment_reference(reference).await
    }

    async fn lock_edition(&mut self, key: &EditionKey) -> StoreResult<Option<ArtworkEdition>> {
        if let Some(locked) = self.locked.get(key) {
            return Ok(Some(locked.current()));
        }

        let Some(cell) = self.store.cell(key).await else {
            return Ok(None);
        };
        let guard = cell.lock_owned().await;
        let edition = guard.clone();
        self.locked.insert(key.clone(), LockedEdition { guard, pending: 0 });
        Ok(Some(edition))
    }

    async fn record_sale(&mut self, key: &EditionKey, quantity: u32) -> StoreResult<()> {
        let locked = self
            .locked
            .get_mut(key)
            .ok_or_else(|| StoreError::EditionNotLocked(key.clone()))?;

        let sold = u64::from(locked.guard.editions_sold) + u64::from(locked.pending) + u64::from(quantity);
        if sold > u64::from(locked.guard.edition_limit) {
            return Err(StoreError::Constraint(format!(
                "{} would reach {} sold of {}",
                key, sold, locked.guard.edition_limit
            )));
        }
        locked.pending += quantity;
        Ok(())
    }

    async fn insert_order(&mut self, order: &Order, placed: &EventEnvelope<OrderEvent>) -> StoreResult<()> {
        if self.order_by_payment_reference(&order.payment_reference).await?.is_some() {
            return Err(StoreError::DuplicatePaymentReference(order.payment_reference.clone()));
        }
        self.staged_orders.push((order.clone(), placed.clone()));
        Ok(())
    }

    async fn hold_for_review(&mut self, entry: &ReviewEntry) -> StoreResult<()> {
        if self.order_by_payment_reference(&entry.payment_reference).await?.is_some() {
            return Err(StoreError::DuplicatePaymentReference(entry.payment_reference.clone()));
        }
        self.staged_reviews.push(entry.clone());
        Ok(())
    }

    async fn resolve_review(&mut self, reference: &str) -> StoreResult<bool> {
        let held = self.store.reviews.lock().await.contains_key(reference);
        self.staged_reviews.retain(|entry| entry.payment_reference != reference);
        self.staged_resolutions.push(reference.to_string());
        Ok(held)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemorySettlement {
            store,
            mut locked,
            staged_orders,
            staged_reviews,
            staged_resolutions,
        } = *self;

        let mut book = store.orders.lock().await;

        // Re-check under the book lock; a concurrent settlement may have
        // committed the same reference after our insert was staged
        for (order, _) in &staged_orders {
            if book.by_reference.contains_key(&order.payment_reference) {
                return Err(StoreError::DuplicatePaymentReference(order.payment_reference.clone()));
            }
        }
        for entry in &staged_reviews {
            if book.by_reference.contains_key(&entry.payment_reference) {
                return Err(StoreError::DuplicatePaymentReference(entry.payment_reference.clone()));
            }
        }

        for (order, placed) in staged_orders {
            book.by_reference.insert(order.payment_reference.clone(), order.id);
            book.history.entry(order.id).or_default().push(placed);
            book.orders.insert(order.id, order);
        }

        if !staged_reviews.is_empty() || !staged_resolutions.is_empty() {
            let mut reviews = store.reviews.lock().await;
            for reference in &staged_resolutions {
                reviews.remove(reference);
            }
            for entry in staged_reviews {
                reviews
                    .entry(entry.payment_reference.clone())
                    .and_modify(|existing| {
                        existing.delivery_count += 1;
                        existing.last_seen_at = entry.last_seen_at;
                        existing.reason = entry.reason.clone();
                    })
                    .or_insert(entry);
            }
        }

        for locked in locked.values_mut() {
            locked.guard.editions_sold += locked.pending;
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::aggregate::tests::test_customer;
    use crate::domain::order::{OrderDraft, OrderLineItem};
    use chrono::Utc;
    use std::time::Duration;

    fn edition(sold: u32, limit: u32) -> ArtworkEdition {
        ArtworkEdition::new("wave", "small", 5000, limit, sold).unwrap()
    }

    fn key() -> EditionKey {
        EditionKey::new("wave", "small")
    }

    fn paid_order(reference: &str) -> (Order, EventEnvelope<OrderEvent>) {
        let (order, event) = Order::place(OrderDraft {
            payment_reference: reference.to_string(),
            customer: test_customer(),
            items: vec![OrderLineItem {
                artwork_id: "wave".to_string(),
                size: "small".to_string(),
                title: "The Wave".to_string(),
                unit_price_minor_units: 5000,
                quantity: 1,
                edition_number_start: Some(1),
                unfulfillable: false,
            }],
            status: OrderStatus::Paid,
            cancelled_reason: None,
        })
        .unwrap();
        let envelope = EventEnvelope::new(order.id, 1, event, Uuid::new_v4());
        (order, envelope)
    }

    #[tokio::test]
    async fn test_commit_applies_sale_and_order_together() {
        let store = MemoryStore::with_editions([edition(3, 5)]).await;
        let (order, placed) = paid_order("pi_1");

        let mut settlement = store.begin_settlement().await.unwrap();
        settlement.lock_edition(&key()).await.unwrap();
        settlement.record_sale(&key(), 2).await.unwrap();
        settlement.insert_order(&order, &placed).await.unwrap();
        settlement.commit().await.unwrap();

        assert_eq!(store.edition(&key()).await.unwrap().unwrap().editions_sold, 5);
        assert!(store.order_by_payment_reference("pi_1").await.unwrap().is_some());
        assert_eq!(store.order_history(order.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_dropped_settlement_changes_nothing() {
        let store = MemoryStore::with_editions([edition(3, 5)]).await;
        let (order, placed) = paid_order("pi_1");

        {
            let mut settlement = store.begin_settlement().await.unwrap();
            settlement.lock_edition(&key()).await.unwrap();
            settlement.record_sale(&key(), 1).await.unwrap();
            settlement.insert_order(&order, &placed).await.unwrap();
        }

        assert_eq!(store.edition(&key()).await.unwrap().unwrap().editions_sold, 3);
        assert!(store.order_by_payment_reference("pi_1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_record_sale_refuses_to_pass_limit() {
        let store = MemoryStore::with_editions([edition(4, 5)]).await;

        let mut settlement = store.begin_settlement().await.unwrap();
        let locked = settlement.lock_edition(&key()).await.unwrap().unwrap();
        assert_eq!(locked.editions_sold, 4);

        settlement.record_sale(&key(), 1).await.unwrap();
        let result = settlement.record_sale(&key(), 1).await;
        assert!(matches!(result, Err(StoreError::Constraint(_))));

        // relocking shows the staged sale
        let relocked = settlement.lock_edition(&key()).await.unwrap().unwrap();
        assert_eq!(relocked.editions_sold, 5);
    }

    #[tokio::test]
    async fn test_record_sale_requires_lock() {
        let store = MemoryStore::with_editions([edition(0, 5)]).await;
        let mut settlement = store.begin_settlement().await.unwrap();
        let result = settlement.record_sale(&key(), 1).await;
        assert!(matches!(result, Err(StoreError::EditionNotLocked(_))));
    }

    #[tokio::test]
    async fn test_duplicate_reference_is_rejected_at_commit() {
        let store = MemoryStore::with_editions([edition(0, 5)]).await;
        let (first, first_placed) = paid_order("pi_dup");
        let (second, second_placed) = paid_order("pi_dup");

        let mut a = store.begin_settlement().await.unwrap();
        let mut b = store.begin_settlement().await.unwrap();
        a.insert_order(&first, &first_placed).await.unwrap();
        b.insert_order(&second, &second_placed).await.unwrap();

        a.commit().await.unwrap();
        assert!(matches!(
            b.commit().await,
            Err(StoreError::DuplicatePaymentReference(_))
        ));

        let stored = store.order_by_payment_reference("pi_dup").await.unwrap().unwrap();
        assert_eq!(stored.id, first.id);
    }

    #[tokio::test]
    async fn test_second_settlement_waits_for_edition_lock() {
        let store = MemoryStore::with_editions([edition(0, 1)]).await;

        let mut first = store.begin_settlement().await.unwrap();
        first.lock_edition(&key()).await.unwrap();

        let contender = store.clone();
        let waiter = tokio::spawn(async move {
            let mut second = contender.begin_settlement().await.unwrap();
            second.lock_edition(&key()).await.unwrap().unwrap().editions_sold
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        first.record_sale(&key(), 1).await.unwrap();
        first.commit().await.unwrap();

        assert_eq!(waiter.await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_publish_keeps_sold_count_and_rejects_low_limit() {
        let store = MemoryStore::with_editions([edition(3, 50)]).await;

        let updated = store
            .publish_edition(&EditionListing {
                artwork_id: "wave".to_string(),
                size: "small".to_string(),
                price_minor_units: 6000,
                edition_limit: 25,
            })
            .await
            .unwrap();
        assert_eq!(updated.editions_sold, 3);
        assert_eq!(updated.price_minor_units, 6000);

        let result = store
            .publish_edition(&EditionListing {
                artwork_id: "wave".to_string(),
                size: "small".to_string(),
                price_minor_units: 6000,
                edition_limit: 2,
            })
            .await;
        assert!(matches!(result, Err(StoreError::Edition(_))));

        let created = store
            .publish_edition(&EditionListing {
                artwork_id: "wave".to_string(),
                size: "large".to_string(),
                price_minor_units: 9000,
                edition_limit: 10,
            })
            .await
            .unwrap();
        assert_eq!(created.editions_sold, 0);
        assert_eq!(store.editions_for_artwork("wave").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_transition_checks_version() {
        let store = MemoryStore::new();
        let (order, placed) = paid_order("pi_v");
        let mut settlement = store.begin_settlement().await.unwrap();
        settlement.insert_order(&order, &placed).await.unwrap();
        settlement.commit().await.unwrap();

        let mut next = order.clone();
        next.status = OrderStatus::Processing;
        next.version = 2;
        let envelope = EventEnvelope::new(
            order.id,
            2,
            OrderEvent::ProcessingStarted(crate::domain::order::OrderProcessingStarted {
                started_at: Utc::now(),
            }),
            Uuid::new_v4(),
        );

        store.record_order_transition(1, &next, &envelope).await.unwrap();
        assert!(matches!(
            store.record_order_transition(1, &next, &envelope).await,
            Err(StoreError::VersionConflict { expected_version: 1, .. })
        ));
        assert_eq!(store.order_history(order.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_repeated_review_bumps_delivery_count() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let entry = ReviewEntry {
            payment_reference: "pi_r".to_string(),
            customer: test_customer(),
            items: vec![],
            reason: "sold out".to_string(),
            delivery_count: 1,
            first_seen_at: now,
            last_seen_at: now,
        };

        for _ in 0..2 {
            let mut settlement = store.begin_settlement().await.unwrap();
            settlement.hold_for_review(&entry).await.unwrap();
            settlement.commit().await.unwrap();
        }

        let queue = store.review_queue(10).await.unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].delivery_count, 2);
    }

    #[tokio::test]
    async fn test_review_is_refused_once_reference_has_order() {
        let store = MemoryStore::with_editions([edition(0, 5)]).await;
        let (order, placed) = paid_order("pi_r");
        let now = Utc::now();
        let entry = ReviewEntry {
            payment_reference: "pi_r".to_string(),
            customer: test_customer(),
            items: vec![],
            reason: "sold out".to_string(),
            delivery_count: 1,
            first_seen_at: now,
            last_seen_at: now,
        };

        // staged before the order commits, caught at commit
        let mut late = store.begin_settlement().await.unwrap();
        late.hold_for_review(&entry).await.unwrap();

        let mut settlement = store.begin_settlement().await.unwrap();
        settlement.insert_order(&order, &placed).await.unwrap();
        settlement.commit().await.unwrap();

        assert!(matches!(
            late.commit().await,
            Err(StoreError::DuplicatePaymentReference(_))
        ));

        let mut after = store.begin_settlement().await.unwrap();
        assert!(matches!(
            after.hold_for_review(&entry).await,
            Err(StoreError::DuplicatePaymentReference(_))
        ));
        assert!(store.review_queue(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_resolve_review_applies_on_commit() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let mut hold = store.begin_settlement().await.unwrap();
        hold.hold_for_review(&ReviewEntry {
            payment_reference: "pi_r".to_string(),
            customer: test_customer(),
            items: vec![],
            reason: "sold out".to_string(),
            delivery_count: 1,
            first_seen_at: now,
            last_seen_at: now,
        })
        .await
        .unwrap();
        hold.commit().await.unwrap();

        {
            let mut dropped = store.begin_settlement().await.unwrap();
            assert!(dropped.resolve_review("pi_r").await.unwrap());
        }
        assert_eq!(store.review_queue(10).await.unwrap().len(), 1);

        let mut settlement = store.begin_settlement().await.unwrap();
        assert!(!settlement.resolve_review("pi_other").await.unwrap());
        assert!(settlement.resolve_review("pi_r").await.unwrap());
        settlement.commit().await.unwrap();
        assert!(store.review_queue(10).await.unwrap().is_empty());
    }
}
