use serde::{Deserialize, Serialize};

use super::reservation::CheckoutLine;
use crate::domain::order::Customer;

// ============================================================================
// Checkout Wire Types
// ============================================================================
//
// Body posted by the storefront cart. `price` is what the buyer was shown,
// in minor currency units; it is compared against the ledger, never charged.
//
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub items: Vec<CartItem>,
    pub customer_info: Customer,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    /// Artwork id
    pub id: String,
    pub title: String,
    pub price: u64,
    pub quantity: u32,
    pub size: String,
    #[serde(default)]
    pub size_display: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl From<CartItem> for CheckoutLine {
    fn from(item: CartItem) -> Self {
        let title = match item.size_display {
            Some(display) if !display.trim().is_empty() => format!("{} - {}", item.title, display),
            _ => item.title,
        };
        CheckoutLine {
            artwork_id: item.id,
            size: item.size,
            title,
            quantity: item.quantity,
            expected_unit_price: item.price,
            image_url: item.image_url,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub session_id: String,
    pub url: String,
}
