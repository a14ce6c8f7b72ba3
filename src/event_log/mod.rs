// ============================================================================
// Event Log - Generic aggregate + envelope abstractions
// ============================================================================
//
// Domain-specific events live in src/domain/; this module knows nothing
// about orders or editions.
//
// ============================================================================

pub mod aggregate;
pub mod event;

pub use aggregate::Aggregate;
pub use event::{deserialize_event, serialize_event, DomainEvent, EventEnvelope};
