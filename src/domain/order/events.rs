use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event_log::DomainEvent;
use super::value_objects::OrderStatus;

// ============================================================================
// Order Events
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    Placed(OrderPlaced),
    ProcessingStarted(OrderProcessingStarted),
    Shipped(OrderShipped),
    Delivered(OrderDelivered),
    Cancelled(OrderCancelled),
}

impl OrderEvent {
    /// Status the order is in once this event is applied
    pub fn resulting_status(&self) -> OrderStatus {
        match self {
            OrderEvent::Placed(e) => e.status,
            OrderEvent::ProcessingStarted(_) => OrderStatus::Processing,
            OrderEvent::Shipped(_) => OrderStatus::Shipped,
            OrderEvent::Delivered(_) => OrderStatus::Delivered,
            OrderEvent::Cancelled(_) => OrderStatus::Cancelled,
        }
    }
}

impl DomainEvent for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::Placed(_) => "OrderPlaced",
            OrderEvent::ProcessingStarted(_) => "OrderProcessingStarted",
            OrderEvent::Shipped(_) => "OrderShipped",
            OrderEvent::Delivered(_) => "OrderDelivered",
            OrderEvent::Cancelled(_) => "OrderCancelled",
        }
    }
}

// ============================================================================
// Individual Event Types
// ============================================================================

/// Written by the order writer together with the ledger increments
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OrderPlaced {
    pub payment_reference: String,
    pub status: OrderStatus,
    pub total_minor_units: u64,
    pub item_count: usize,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OrderProcessingStarted {
    pub started_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OrderShipped {
    pub tracking_number: Option<String>,
    pub carrier: Option<String>,
    pub shipped_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OrderDelivered {
    pub delivered_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OrderCancelled {
    pub reason: Option<String>,
    pub cancelled_at: DateTime<Utc>,
}
