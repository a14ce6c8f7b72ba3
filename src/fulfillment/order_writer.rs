use uuid::Uuid;

use super::FulfillmentError;
use crate::domain::order::{Order, OrderDraft};
use crate::event_log::EventEnvelope;
use crate::store::Settlement;

// ============================================================================
// Order Writer
// ============================================================================

/// Place the order inside `settlement`, together with its first history event.
/// Nothing is visible until the settlement commits; a payment reference that
/// already has an order fails with `DuplicatePaymentReference`. A review
/// queue entry held for the same reference is cleared in the same settlement.
pub async fn create_order(
    settlement: &mut dyn Settlement,
    draft: OrderDraft,
    correlation_id: Uuid,
) -> Result<Order, FulfillmentError> {
    let (order, placed) = Order::place(draft)?;
    let envelope = EventEnvelope::new(order.id, order.version, placed, correlation_id);

    settlement.insert_order(&order, &envelope).await?;

    if settlement.resolve_review(&order.payment_reference).await? {
        tracing::info!(
            order_id = %order.id,
            payment_reference = %order.payment_reference,
            "Held payment settled, review entry cleared"
        );
    }

    tracing::debug!(
        order_id = %order.id,
        payment_reference = %order.payment_reference,
        status = %order.status,
        total_minor_units = order.total_minor_units,
        "Order staged"
    );

    Ok(order)
}
