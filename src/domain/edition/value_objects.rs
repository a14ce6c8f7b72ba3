use serde::{Deserialize, Serialize};
use std::fmt;

use super::errors::EditionError;

// ============================================================================
// Edition Value Objects
// ============================================================================

/// Identity of one size-variant of an artwork
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EditionKey {
    pub artwork_id: String,
    pub size: String,
}

impl EditionKey {
    pub fn new(artwork_id: impl Into<String>, size: impl Into<String>) -> Self {
        Self {
            artwork_id: artwork_id.into(),
            size: size.into(),
        }
    }
}

impl fmt::Display for EditionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.artwork_id, self.size)
    }
}

/// Ledger row for one edition.
///
/// `editions_sold <= edition_limit` holds for every value this type hands out;
/// the only mutator is [`ArtworkEdition::record_sale`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtworkEdition {
    pub artwork_id: String,
    pub size: String,
    pub price_minor_units: u64,
    pub edition_limit: u32,
    pub editions_sold: u32,
}

impl ArtworkEdition {
    pub fn new(
        artwork_id: impl Into<String>,
        size: impl Into<String>,
        price_minor_units: u64,
        edition_limit: u32,
        editions_sold: u32,
    ) -> Result<Self, EditionError> {
        let edition = Self {
            artwork_id: artwork_id.into(),
            size: size.into(),
            price_minor_units,
            edition_limit,
            editions_sold,
        };
        edition.validate()?;
        Ok(edition)
    }

    pub fn validate(&self) -> Result<(), EditionError> {
        if self.artwork_id.trim().is_empty() || self.size.trim().is_empty() {
            return Err(EditionError::MissingIdentity);
        }
        if self.edition_limit == 0 {
            return Err(EditionError::InvalidLimit(self.edition_limit));
        }
        if self.editions_sold > self.edition_limit {
            return Err(EditionError::SoldExceedsLimit {
                key: self.key(),
                sold: self.editions_sold,
                limit: self.edition_limit,
            });
        }
        Ok(())
    }

    pub fn key(&self) -> EditionKey {
        EditionKey::new(self.artwork_id.clone(), self.size.clone())
    }

    pub fn remaining(&self) -> u32 {
        self.edition_limit.saturating_sub(self.editions_sold)
    }

    pub fn is_sold_out(&self) -> bool {
        self.remaining() == 0
    }

    /// Edition numbers the next `quantity` units would receive.
    /// Provisional unless taken under the edition's lock.
    pub fn next_range(&self, quantity: u32) -> EditionRange {
        let start = self.editions_sold + 1;
        EditionRange {
            start,
            end: start + quantity.saturating_sub(1),
        }
    }

    /// Take `quantity` units off the ledger and return the numbers assigned.
    pub fn record_sale(&mut self, quantity: u32) -> Result<EditionRange, EditionError> {
        if !super::is_available(self, quantity) {
            return Err(EditionError::SoldOut {
                key: self.key(),
                requested: quantity,
                remaining: self.remaining(),
            });
        }
        let range = self.next_range(quantity);
        self.editions_sold += quantity;
        Ok(range)
    }
}

/// Size option as published by the admin; the sold count is never part of it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditionListing {
    pub artwork_id: String,
    pub size: String,
    pub price_minor_units: u64,
    pub edition_limit: u32,
}

impl EditionListing {
    pub fn key(&self) -> EditionKey {
        EditionKey::new(self.artwork_id.clone(), self.size.clone())
    }

    /// Apply this listing on top of the current ledger row, if any
    pub fn apply_to(&self, current: Option<&ArtworkEdition>) -> Result<ArtworkEdition, EditionError> {
        let sold = current.map(|e| e.editions_sold).unwrap_or(0);
        if self.edition_limit > 0 && sold > self.edition_limit {
            return Err(EditionError::LimitBelowSold {
                key: self.key(),
                limit: self.edition_limit,
                sold,
            });
        }
        ArtworkEdition::new(
            self.artwork_id.clone(),
            self.size.clone(),
            self.price_minor_units,
            self.edition_limit,
            sold,
        )
    }
}

/// Inclusive range of edition numbers, e.g. 4..=5 for "4/50 and 5/50"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditionRange {
    pub start: u32,
    pub end: u32,
}

// ============================================================================
// Unit Tests
// ============================================================================
