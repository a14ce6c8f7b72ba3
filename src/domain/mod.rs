// ============================================================================
// Domain Layer - Business Logic
// ============================================================================
//
// - edition: the limited-edition ledger and availability rule
// - order:   orders, their line items and the status machine
//
// Nothing in here talks to a database or the payment provider.
//
// ============================================================================

pub mod edition;
pub mod order;
