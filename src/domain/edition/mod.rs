// ============================================================================
// Edition Domain - Limited-edition ledger rules
// ============================================================================
//
// - Value objects (EditionKey, ArtworkEdition, EditionRange)
// - Availability check (pure)
// - Errors (EditionError enum)
//
// ============================================================================

pub mod value_objects;
pub mod availability;
pub mod errors;

pub use value_objects::*;
pub use availability::is_available;
pub use errors::*;
