use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::order::{Customer, OrderLineItem};

// ============================================================================
// Session Metadata
// ============================================================================
//
// Everything the webhook needs to build an order travels in the session's
// metadata, one compact JSON value per key:
//
//   metadata[line_0]   = {"artwork_id":..,"size":..,"title":..,"quantity":..,
//                         "unit_price":..,"edition_start":..}
//   metadata[customer] = {"name":..,"email":..,"address":{..}}
//
// `edition_start` is provisional: the webhook re-assigns numbers under lock.
//
// ============================================================================

pub const CUSTOMER_KEY: &str = "customer";
const LINE_PREFIX: &str = "line_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineMetadata {
    pub artwork_id: String,
    pub size: String,
    pub title: String,
    pub quantity: u32,
    /// Minor units
    pub unit_price: u64,
    pub edition_start: u32,
}

impl LineMetadata {
    /// Line as the buyer paid for it, before edition numbers are assigned
    pub fn to_line_item(&self) -> OrderLineItem {
        OrderLineItem {
            artwork_id: self.artwork_id.clone(),
            size: self.size.clone(),
            title: self.title.clone(),
            unit_price_minor_units: self.unit_price,
            quantity: self.quantity,
            edition_number_start: None,
            unfulfillable: false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("Metadata has no {0}")]
    Missing(String),

    #[error("Metadata key {key} is not valid: {source}")]
    Invalid {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Metadata line keys are not contiguous")]
    Gap,
}

/// Key/value pairs for `metadata[...]`
pub fn encode(lines: &[LineMetadata], customer: &Customer) -> serde_json::Result<Vec<(String, String)>> {
    let mut pairs = Vec::with_capacity(lines.len() + 1);
    for (index, line) in lines.iter().enumerate() {
        pairs.push((format!("{}{}", LINE_PREFIX, index), serde_json::to_string(line)?));
    }
    pairs.push((CUSTOMER_KEY.to_string(), serde_json::to_string(customer)?));
    Ok(pairs)
}

pub fn decode(metadata: &HashMap<String, String>) -> Result<(Vec<LineMetadata>, Customer), MetadataError> {
    let mut indexed: Vec<(usize, &String, &String)> = metadata
        .iter()
        .filter_map(|(key, value)| {
            key.strip_prefix(LINE_PREFIX)
                .and_then(|index| index.parse::<usize>().ok())
                .map(|index| (index, key, value))
        })
        .collect();
    indexed.sort_by_key(|(index, _, _)| *index);

    if indexed.is_empty() {
        return Err(MetadataError::Missing("line items".to_string()));
    }
    if indexed.iter().enumerate().any(|(position, (index, _, _))| position != *index) {
        return Err(MetadataError::Gap);
    }

    let lines = indexed
        .into_iter()
        .map(|(_, key, value)| {
            serde_json::from_str(value).map_err(|source| MetadataError::Invalid {
                key: key.clone(),
                source,
            })
        })
        .collect::<Result<Vec<LineMetadata>, _>>()?;

    let customer_json = metadata
        .get(CUSTOMER_KEY)
        .ok_or_else(|| MetadataError::Missing(CUSTOMER_KEY.to_string()))?;
    let customer = serde_json::from_str(customer_json).map_err(|source| MetadataError::Invalid {
        key: CUSTOMER_KEY.to_string(),
        source,
    })?;

    Ok((lines, customer))
}
