// ============================================================================
// Order Domain
// ============================================================================
//
// - Value objects (OrderLineItem, Customer, OrderStatus)
// - Events (OrderPlaced, OrderShipped, ...)
// - Commands (admin status transitions)
// - Errors (OrderError enum)
// - Aggregate (Order with the status machine)
// - Status handler (OrderStatusHandler)
//
// ============================================================================

pub mod value_objects;
pub mod events;
pub mod commands;
pub mod errors;
pub mod aggregate;
pub mod command_handler;

pub use value_objects::*;
pub use events::*;
pub use commands::*;
pub use errors::*;
pub use aggregate::*;
pub use command_handler::*;
