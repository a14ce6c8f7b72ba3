use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::event_log::Aggregate;
use super::commands::OrderCommand;
use super::errors::OrderError;
use super::events::*;
use super::value_objects::{Customer, OrderLineItem, OrderStatus};

// ============================================================================
// Order Aggregate
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    // Identity
    pub id: Uuid,
    pub version: i64,
    pub payment_reference: String,

    // Immutable after placement
    pub customer: Customer,
    pub items: Vec<OrderLineItem>,
    pub total_minor_units: u64,

    // Mutable by admin transitions only
    pub status: OrderStatus,
    pub tracking_number: Option<String>,
    pub carrier: Option<String>,
    pub cancelled_reason: Option<String>,

    // Audit Trail
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Everything the order writer needs to place an order
#[derive(Debug, Clone)]
pub struct OrderDraft {
    pub payment_reference: String,
    pub customer: Customer,
    pub items: Vec<OrderLineItem>,
    pub status: OrderStatus,
    pub cancelled_reason: Option<String>,
}

/// Sum of `unit_price * quantity`; never taken from the client
pub fn compute_total(items: &[OrderLineItem]) -> Result<u64, OrderError> {
    items.iter().try_fold(0u64, |total, item| {
        item.line_total()
            .and_then(|line| total.checked_add(line))
            .ok_or(OrderError::TotalOverflow)
    })
}

impl Order {
    /// Build a new order (version 1) and the event recording its placement
    pub fn place(draft: OrderDraft) -> Result<(Self, OrderEvent), OrderError> {
        if draft.payment_reference.trim().is_empty() {
            return Err(OrderError::MissingPaymentReference);
        }
        if draft.items.is_empty() {
            return Err(OrderError::EmptyItems);
        }
        if let Some(item) = draft.items.iter().find(|item| item.quantity == 0) {
            return Err(OrderError::InvalidQuantity {
                artwork_id: item.artwork_id.clone(),
                size: item.size.clone(),
                quantity: item.quantity,
            });
        }
        match draft.status {
            OrderStatus::Paid | OrderStatus::Cancelled => {}
            other => return Err(OrderError::InvalidInitialStatus(other)),
        }

        let total_minor_units = compute_total(&draft.items)?;
        let now = Utc::now();

        let event = OrderEvent::Placed(OrderPlaced {
            payment_reference: draft.payment_reference.clone(),
            status: draft.status,
            total_minor_units,
            item_count: draft.items.len(),
        });

        let order = Self {
            id: Uuid::now_v7(),
            version: 1,
            payment_reference: draft.payment_reference,
            customer: draft.customer,
            items: draft.items,
            total_minor_units,
            status: draft.status,
            tracking_number: None,
            carrier: None,
            cancelled_reason: draft.cancelled_reason,
            created_at: now,
            updated_at: now,
        };

        Ok((order, event))
    }

    fn transition(&self, to: OrderStatus) -> Result<(), OrderError> {
        if self.status == OrderStatus::Cancelled {
            return Err(OrderError::AlreadyCancelled);
        }
        if !self.status.can_transition_to(to) {
            return Err(OrderError::InvalidStatusTransition { from: self.status, to });
        }
        Ok(())
    }
}

// ============================================================================
// Aggregate Trait Implementation
// ============================================================================

impl Aggregate for Order {
    type Event = OrderEvent;
    type Command = OrderCommand;
    type Error = OrderError;

    fn apply_event(&mut self, event: &Self::Event) -> Result<(), Self::Error> {
        match event {
            OrderEvent::Placed(_) => {
                // Placement builds the aggregate; nothing to replay
                return Ok(());
            }
            OrderEvent::ProcessingStarted(e) => {
                self.transition(OrderStatus::Processing)?;
                self.updated_at = e.started_at;
            }
            OrderEvent::Shipped(e) => {
                self.transition(OrderStatus::Shipped)?;
                self.tracking_number = e.tracking_number.clone();
                self.carrier = e.carrier.clone();
                self.updated_at = e.shipped_at;
            }
            OrderEvent::Delivered(e) => {
                self.transition(OrderStatus::Delivered)?;
                self.updated_at = e.delivered_at;
            }
            OrderEvent::Cancelled(e) => {
                self.transition(OrderStatus::Cancelled)?;
                self.cancelled_reason = e.reason.clone();
                self.updated_at = e.cancelled_at;
            }
        }
        self.status = event.resulting_status();
        self.version += 1;
        Ok(())
    }

    fn handle_command(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        let now = Utc::now();

        let event = match command {
            OrderCommand::StartProcessing => {
                self.transition(OrderStatus::Processing)?;
                OrderEvent::ProcessingStarted(OrderProcessingStarted { started_at: now })
            }
            OrderCommand::Ship { tracking_number, carrier } => {
                self.transition(OrderStatus::Shipped)?;
                OrderEvent::Shipped(OrderShipped {
                    tracking_number: tracking_number.clone(),
                    carrier: carrier.clone(),
                    shipped_at: now,
                })
            }
            OrderCommand::Deliver => {
                self.transition(OrderStatus::Delivered)?;
                OrderEvent::Delivered(OrderDelivered { delivered_at: now })
            }
            OrderCommand::Cancel { reason } => {
                self.transition(OrderStatus::Cancelled)?;
                OrderEvent::Cancelled(OrderCancelled {
                    reason: reason.clone(),
                    cancelled_at: now,
                })
            }
        };

        Ok(vec![event])
    }

    fn version(&self) -> i64 {
        self.version
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::order::ShippingAddress;

    pub(crate) fn test_customer() -> Customer {
        Customer {
            name: "Hokusai Katsushika".to_string(),
            email: "hokusai@example.com".to_string(),
            address: ShippingAddress {
                line1: "1 Sumida".to_string(),
                line2: None,
                city: "Tokyo".to_string(),
                state: None,
                postal_code: "130-0014".to_string(),
                country: "JP".to_string(),
            },
        }
    }

    fn line(artwork_id: &str, price: u64, quantity: u32) -> OrderLineItem {
        OrderLineItem {
            artwork_id: artwork_id.to_string(),
            size: "small".to_string(),
            title: artwork_id.to_string(),
            unit_price_minor_units: price,
            quantity,
            edition_number_start: Some(1),
            unfulfillable: false,
        }
    }

    fn draft(items: Vec<OrderLineItem>) -> OrderDraft {
        OrderDraft {
            payment_reference: "pi_123".to_string(),
            customer: test_customer(),
            items,
            status: OrderStatus::Paid,
            cancelled_reason: None,
        }
    }

    fn placed_order() -> Order {
        Order::place(draft(vec![line("wave", 5000, 1)])).unwrap().0
    }

    #[test]
    fn test_total_is_computed_from_lines() {
        let (order, event) =
            Order::place(draft(vec![line("wave", 5000, 1), line("fuji", 7500, 2)])).unwrap();

        assert_eq!(order.total_minor_units, 20000);
        assert_eq!(order.version, 1);
        assert_eq!(order.status, OrderStatus::Paid);
        match event {
            OrderEvent::Placed(placed) => {
                assert_eq!(placed.total_minor_units, 20000);
                assert_eq!(placed.item_count, 2);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_total_overflow_is_rejected() {
        let result = Order::place(draft(vec![line("wave", u64::MAX, 2)]));
        assert!(matches!(result, Err(OrderError::TotalOverflow)));
    }

    #[test]
    fn test_place_rejects_empty_and_zero_quantity() {
        assert!(matches!(Order::place(draft(vec![])), Err(OrderError::EmptyItems)));
        assert!(matches!(
            Order::place(draft(vec![line("wave", 5000, 0)])),
            Err(OrderError::InvalidQuantity { quantity: 0, .. })
        ));
    }

    #[test]
    fn test_place_only_starts_paid_or_cancelled() {
        let mut shipped = draft(vec![line("wave", 5000, 1)]);
        shipped.status = OrderStatus::Shipped;
        assert!(matches!(
            Order::place(shipped),
            Err(OrderError::InvalidInitialStatus(OrderStatus::Shipped))
        ));
    }

    #[test]
    fn test_full_lifecycle_through_commands() {
        let mut order = placed_order();

        for command in [
            OrderCommand::StartProcessing,
            OrderCommand::Ship {
                tracking_number: Some("JP123".to_string()),
                carrier: Some("Yamato".to_string()),
            },
            OrderCommand::Deliver,
        ] {
            let events = order.handle_command(&command).unwrap();
            for event in &events {
                order.apply_event(event).unwrap();
            }
        }

        assert_eq!(order.status, OrderStatus::Delivered);
        assert_eq!(order.version, 4);
        assert_eq!(order.tracking_number.as_deref(), Some("JP123"));
    }

    #[test]
    fn test_cannot_skip_processing() {
        let order = placed_order();
        let result = order.handle_command(&OrderCommand::Deliver);
        assert!(matches!(
            result,
            Err(OrderError::InvalidStatusTransition {
                from: OrderStatus::Paid,
                to: OrderStatus::Delivered
            })
        ));
    }

    #[test]
    fn test_delivered_order_cannot_be_cancelled() {
        let mut order = placed_order();
        order.status = OrderStatus::Delivered;
        let result = order.handle_command(&OrderCommand::Cancel { reason: None });
        assert!(matches!(result, Err(OrderError::InvalidStatusTransition { .. })));
    }

    #[test]
    fn test_cancelled_order_rejects_everything() {
        let mut order = placed_order();
        let events = order
            .handle_command(&OrderCommand::Cancel {
                reason: Some("customer request".to_string()),
            })
            .unwrap();
        order.apply_event(&events[0]).unwrap();

        assert_eq!(order.status, OrderStatus::Cancelled);
        assert_eq!(order.cancelled_reason.as_deref(), Some("customer request"));
        assert!(matches!(
            order.handle_command(&OrderCommand::StartProcessing),
            Err(OrderError::AlreadyCancelled)
        ));
    }
}
