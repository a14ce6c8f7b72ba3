use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use super::{order_writer, FulfillmentError};
use crate::domain::edition::{ArtworkEdition, EditionKey};
use crate::domain::order::{Order, OrderDraft, OrderError, OrderLineItem, OrderStatus};
use crate::metrics::Metrics;
use crate::payments::PaymentConfirmation;
use crate::store::{ReviewEntry, Store, StoreError};

// ============================================================================
// Payment Event Processor
// ============================================================================
//
// At-least-once safe: the payment reference is the idempotency key, checked
// before and again once the settlement holds the edition locks, and enforced
// by the store's unique constraint when two deliveries race.
//
// Editions are locked in key order so two settlements sharing editions can
// never wait on each other in a cycle.
//
// ============================================================================

/// What to do with a paid confirmation when an edition sold out after checkout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OversellPolicy {
    /// Write the order as cancelled, flag the lost lines, take nothing off
    /// the ledger
    #[default]
    CancelAndFlag,
    /// Write no order; park the confirmation in the review queue
    HoldForReview,
}

impl OversellPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            OversellPolicy::CancelAndFlag => "cancel",
            OversellPolicy::HoldForReview => "review",
        }
    }
}

impl fmt::Display for OversellPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OversellPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cancel" => Ok(OversellPolicy::CancelAndFlag),
            "review" => Ok(OversellPolicy::HoldForReview),
            other => Err(format!("unknown oversell policy: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProcessingOutcome {
    /// Every line was allocated edition numbers
    Fulfilled(Order),
    /// An order for this payment reference already existed
    AlreadyProcessed(Order),
    /// Lines lost the race to sell out; the order was written as cancelled
    Cancelled { order: Order, unfulfillable: Vec<EditionKey> },
    /// Lines lost the race to sell out; the confirmation awaits an operator
    HeldForReview {
        payment_reference: String,
        unfulfillable: Vec<EditionKey>,
    },
}

impl ProcessingOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ProcessingOutcome::Fulfilled(_) => "fulfilled",
            ProcessingOutcome::AlreadyProcessed(_) => "duplicate",
            ProcessingOutcome::Cancelled { .. } => "cancelled",
            ProcessingOutcome::HeldForReview { .. } => "held_for_review",
        }
    }
}

pub struct PaymentEventProcessor {
    store: Arc<dyn Store>,
    policy: OversellPolicy,
    metrics: Arc<Metrics>,
}

impl PaymentEventProcessor {
    pub fn new(store: Arc<dyn Store>, policy: OversellPolicy, metrics: Arc<Metrics>) -> Self {
        Self { store, policy, metrics }
    }

    pub async fn process(&self, confirmation: &PaymentConfirmation) -> Result<ProcessingOutcome, FulfillmentError> {
        let started = Instant::now();
        let result = self.settle(confirmation).await;
        let elapsed = started.elapsed().as_secs_f64();

        match &result {
            Ok(outcome) => {
                self.metrics.record_payment_event(outcome.label(), elapsed);
                tracing::info!(
                    payment_reference = %confirmation.payment_reference,
                    outcome = outcome.label(),
                    duration_ms = (elapsed * 1000.0) as u64,
                    "Payment confirmation processed"
                );
            }
            Err(e) => {
                self.metrics.record_payment_event("error", elapsed);
                tracing::error!(
                    payment_reference = %confirmation.payment_reference,
                    error = %e,
                    "Payment confirmation failed"
                );
            }
        }

        result
    }

    async fn settle(&self, confirmation: &PaymentConfirmation) -> Result<ProcessingOutcome, FulfillmentError> {
        let reference = &confirmation.payment_reference;

        if let Some(existing) = self.store.order_by_payment_reference(reference).await? {
            tracing::debug!(payment_reference = %reference, order_id = %existing.id, "Duplicate delivery");
            return Ok(ProcessingOutcome::AlreadyProcessed(existing));
        }

        let items = paid_lines(confirmation)?;

        match self.settle_once(confirmation, items).await {
            // Another delivery of the same payment committed first
            Err(FulfillmentError::Store(StoreError::DuplicatePaymentReference(reference))) => {
                let existing = self
                    .store
                    .order_by_payment_reference(&reference)
                    .await?
                    .ok_or_else(|| StoreError::DuplicatePaymentReference(reference.clone()))?;
                tracing::debug!(payment_reference = %reference, order_id = %existing.id, "Lost race to concurrent delivery");
                Ok(ProcessingOutcome::AlreadyProcessed(existing))
            }
            other => other,
        }
    }

    async fn settle_once(
        &self,
        confirmation: &PaymentConfirmation,
        mut items: Vec<OrderLineItem>,
    ) -> Result<ProcessingOutcome, FulfillmentError> {
        let reference = &confirmation.payment_reference;
        let correlation_id = Uuid::new_v4();
        let mut settlement = self.store.begin_settlement().await?;

        // BTreeSet iterates in key order
        let keys: BTreeSet<EditionKey> = items.iter().map(OrderLineItem::key).collect();
        let mut ledger: BTreeMap<EditionKey, ArtworkEdition> = BTreeMap::new();
        for key in keys {
            if let Some(edition) = settlement.lock_edition(&key).await? {
                ledger.insert(key, edition);
            }
        }

        // Checked under the locks: a delivery we waited on may have settled
        // this payment while we queued
        if let Some(existing) = settlement.order_by_payment_reference(reference).await? {
            tracing::debug!(
                order_id = %existing.id,
                payment_reference = %reference,
                "Payment settled by a concurrent delivery"
            );
            return Ok(ProcessingOutcome::AlreadyProcessed(existing));
        }

        let lost = allocate(&mut items, &mut ledger);

        if lost.is_empty() {
            let mut sold: BTreeMap<EditionKey, u32> = BTreeMap::new();
            for item in &items {
                *sold.entry(item.key()).or_default() += item.quantity;
            }
            for (key, quantity) in &sold {
                settlement.record_sale(key, *quantity).await?;
            }

            let order = order_writer::create_order(
                settlement.as_mut(),
                OrderDraft {
                    payment_reference: reference.clone(),
                    customer: confirmation.customer.clone(),
                    items,
                    status: OrderStatus::Paid,
                    cancelled_reason: None,
                },
                correlation_id,
            )
            .await?;
            settlement.commit().await?;

            for item in &order.items {
                tracing::info!(
                    order_id = %order.id,
                    artwork_id = %item.artwork_id,
                    size = %item.size,
                    edition_start = item.edition_number_start.unwrap_or_default(),
                    edition_end = item.edition_number_end().unwrap_or_default(),
                    "🖼️ Editions sold"
                );
            }
            return Ok(ProcessingOutcome::Fulfilled(order));
        }

        // Oversell: nothing from this payment comes off the ledger
        let unfulfillable: Vec<EditionKey> = lost.iter().map(|&i| items[i].key()).collect();
        for item in items.iter_mut() {
            item.edition_number_start = None;
        }
        for &i in &lost {
            items[i].unfulfillable = true;
            tracing::warn!(
                artwork_id = %items[i].artwork_id,
                size = %items[i].size,
                quantity = items[i].quantity,
                payment_reference = %reference,
                policy = %self.policy,
                "⚠️ Edition sold out between checkout and payment"
            );
        }
        self.metrics.record_oversell(self.policy.as_str(), lost.len());

        let reason = format!(
            "sold out before payment was confirmed: {}",
            unfulfillable.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
        );

        match self.policy {
            OversellPolicy::CancelAndFlag => {
                let order = order_writer::create_order(
                    settlement.as_mut(),
                    OrderDraft {
                        payment_reference: reference.clone(),
                        customer: confirmation.customer.clone(),
                        items,
                        status: OrderStatus::Cancelled,
                        cancelled_reason: Some(reason),
                    },
                    correlation_id,
                )
                .await?;
                settlement.commit().await?;
                Ok(ProcessingOutcome::Cancelled { order, unfulfillable })
            }
            OversellPolicy::HoldForReview => {
                let now = Utc::now();
                settlement
                    .hold_for_review(&ReviewEntry {
                        payment_reference: reference.clone(),
                        customer: confirmation.customer.clone(),
                        items,
                        reason,
                        delivery_count: 1,
                        first_seen_at: now,
                        last_seen_at: now,
                    })
                    .await?;
                settlement.commit().await?;
                Ok(ProcessingOutcome::HeldForReview {
                    payment_reference: reference.clone(),
                    unfulfillable,
                })
            }
        }
    }
}

/// Lines as paid, checked before any lock is taken
fn paid_lines(confirmation: &PaymentConfirmation) -> Result<Vec<OrderLineItem>, OrderError> {
    if confirmation.lines.is_empty() {
        return Err(OrderError::EmptyItems);
    }
    confirmation.customer.validate()?;

    let items: Vec<OrderLineItem> = confirmation.lines.iter().map(|line| line.to_line_item()).collect();
    if let Some(item) = items.iter().find(|item| item.quantity == 0) {
        return Err(OrderError::InvalidQuantity {
            artwork_id: item.artwork_id.clone(),
            size: item.size.clone(),
            quantity: 0,
        });
    }
    Ok(items)
}

/// Assign edition numbers line by line against the locked rows. Lines naming
/// the same edition draw from it in order. Returns the indexes of lines that
/// could not be fulfilled.
fn allocate(items: &mut [OrderLineItem], ledger: &mut BTreeMap<EditionKey, ArtworkEdition>) -> Vec<usize> {
    let mut lost = Vec::new();
    for (i, item) in items.iter_mut().enumerate() {
        let assigned = ledger
            .get_mut(&item.key())
            .and_then(|edition| edition.record_sale(item.quantity).ok());
        match assigned {
            Some(range) => item.edition_number_start = Some(range.start),
            None => lost.push(i),
        }
    }
    lost
}

// ============================================================================
// Tests
// ============================================================================
