use std::sync::Arc;
use uuid::Uuid;

use crate::event_log::{Aggregate, EventEnvelope};
use crate::store::{Store, StoreError};

use super::aggregate::Order;
use super::commands::OrderCommand;
use super::errors::OrderError;

// ============================================================================
// Order Status Handler
// ============================================================================
//
// Orchestrates: Command → Aggregate → Event → Store (version-checked)
//
// Only admin status changes come through here. Placement is done by the
// order writer inside a payment settlement.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum OrderCommandError {
    #[error("Order {0} not found")]
    NotFound(Uuid),

    #[error(transparent)]
    Rejected(#[from] OrderError),

    #[error("Order {order_id} was modified concurrently, reload and retry")]
    Conflict { order_id: Uuid },

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for OrderCommandError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::OrderNotFound(id) => OrderCommandError::NotFound(id),
            StoreError::VersionConflict { order_id, .. } => OrderCommandError::Conflict { order_id },
            other => OrderCommandError::Store(other),
        }
    }
}

pub struct OrderStatusHandler {
    store: Arc<dyn Store>,
}

impl OrderStatusHandler {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Apply `command` to the order and persist the result
    pub async fn handle(
        &self,
        order_id: Uuid,
        command: OrderCommand,
        correlation_id: Uuid,
    ) -> Result<Order, OrderCommandError> {
        let mut order = self
            .store
            .order(order_id)
            .await?
            .ok_or(OrderCommandError::NotFound(order_id))?;

        let events = order.handle_command(&command)?;

        for event in events {
            let expected_version = order.version();
            order.apply_event(&event)?;

            let envelope = EventEnvelope::new(order_id, order.version(), event, correlation_id);
            self.store
                .record_order_transition(expected_version, &order, &envelope)
                .await?;

            tracing::info!(
                order_id = %order_id,
                event_type = %envelope.event_type,
                status = %order.status,
                version = order.version(),
                "Order status changed"
            );
        }

        Ok(order)
    }
}
