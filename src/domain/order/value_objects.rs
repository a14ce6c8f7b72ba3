use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::edition::EditionKey;
use super::errors::OrderError;

// ============================================================================
// Order Value Objects
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct OrderLineItem {
    pub artwork_id: String,
    pub size: String,
    pub title: String,
    pub unit_price_minor_units: u64,
    pub quantity: u32,
    /// First edition number sold on this line; `None` when nothing was
    /// taken off the ledger for it
    pub edition_number_start: Option<u32>,
    /// Set when the edition sold out between checkout and payment
    #[serde(default)]
    pub unfulfillable: bool,
}

impl OrderLineItem {
    pub fn key(&self) -> EditionKey {
        EditionKey::new(self.artwork_id.clone(), self.size.clone())
    }

    pub fn line_total(&self) -> Option<u64> {
        self.unit_price_minor_units.checked_mul(u64::from(self.quantity))
    }

    /// Last edition number on this line, if numbers were assigned
    pub fn edition_number_end(&self) -> Option<u32> {
        self.edition_number_start
            .map(|start| start + self.quantity.saturating_sub(1))
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ShippingAddress {
    pub line1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line2: Option<String>,
    pub city: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(alias = "postalCode")]
    pub postal_code: String,
    pub country: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Customer {
    pub name: String,
    pub email: String,
    pub address: ShippingAddress,
}

impl Customer {
    pub fn validate(&self) -> Result<(), OrderError> {
        if self.name.trim().is_empty() {
            return Err(OrderError::InvalidCustomer("name is required".to_string()));
        }
        let email = self.email.trim();
        match email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && domain.contains('.') => {}
            _ => {
                return Err(OrderError::InvalidCustomer(format!(
                    "invalid email address: {}",
                    self.email
                )))
            }
        }
        if self.address.line1.trim().is_empty()
            || self.address.city.trim().is_empty()
            || self.address.country.trim().is_empty()
        {
            return Err(OrderError::InvalidCustomer(
                "shipping address is incomplete".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Paid,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Paid => "paid",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// paid → processing → shipped → delivered; anything not yet delivered
    /// may be cancelled
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::Paid, OrderStatus::Processing)
                | (OrderStatus::Processing, OrderStatus::Shipped)
                | (OrderStatus::Shipped, OrderStatus::Delivered)
                | (OrderStatus::Paid, OrderStatus::Cancelled)
                | (OrderStatus::Processing, OrderStatus::Cancelled)
                | (OrderStatus::Shipped, OrderStatus::Cancelled)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "paid" => Ok(OrderStatus::Paid),
            "processing" => Ok(OrderStatus::Processing),
            "shipped" => Ok(OrderStatus::Shipped),
            "delivered" => Ok(OrderStatus::Delivered),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(OrderError::UnknownStatus(other.to_string())),
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn customer(email: &str) -> Customer {
        Customer {
            name: "Ada Lovelace".to_string(),
            email: email.to_string(),
            address: ShippingAddress {
                line1: "12 St James's Square".to_string(),
                line2: None,
                city: "London".to_string(),
                state: None,
                postal_code: "SW1Y 4JH".to_string(),
                country: "GB".to_string(),
            },
        }
    }

    #[test]
    fn test_status_machine_forward_path() {
        assert!(OrderStatus::Paid.can_transition_to(OrderStatus::Processing));
        assert!(OrderStatus::Processing.can_transition_to(OrderStatus::Shipped));
        assert!(OrderStatus::Shipped.can_transition_to(OrderStatus::Delivered));
        assert!(!OrderStatus::Paid.can_transition_to(OrderStatus::Shipped));
        assert!(!OrderStatus::Delivered.can_transition_to(OrderStatus::Processing));
    }

    #[test]
    fn test_everything_but_delivered_can_cancel() {
        assert!(OrderStatus::Paid.can_transition_to(OrderStatus::Cancelled));
        assert!(OrderStatus::Processing.can_transition_to(OrderStatus::Cancelled));
        assert!(OrderStatus::Shipped.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Delivered.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Cancelled.can_transition_to(OrderStatus::Cancelled));
    }

    #[test]
    fn test_status_storage_names() {
        for status in [
            OrderStatus::Paid,
            OrderStatus::Processing,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
            OrderStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
            assert_eq!(serde_json::to_string(&status).unwrap(), format!("\"{}\"", status));
        }
        assert!(matches!("refunded".parse::<OrderStatus>(), Err(OrderError::UnknownStatus(_))));
    }

    #[test]
    fn test_line_item_edition_range() {
        let item = OrderLineItem {
            artwork_id: "dusk".to_string(),
            size: "small".to_string(),
            title: "Dusk".to_string(),
            unit_price_minor_units: 5000,
            quantity: 3,
            edition_number_start: Some(8),
            unfulfillable: false,
        };
        assert_eq!(item.edition_number_end(), Some(10));
        assert_eq!(item.line_total(), Some(15000));
    }

    #[test]
    fn test_customer_validation() {
        assert!(customer("ada@example.com").validate().is_ok());
        assert!(customer("ada.example.com").validate().is_err());
        assert!(customer("@example.com").validate().is_err());

        let mut nameless = customer("ada@example.com");
        nameless.name = "  ".to_string();
        assert!(matches!(nameless.validate(), Err(OrderError::InvalidCustomer(_))));
    }
}
