// ============================================================================
// Aggregate Root Pattern
// ============================================================================
//
// Key Principles:
// 1. Commands are validated against current state before any event exists
// 2. Events represent facts that have already happened
// 3. State changes only by applying events
// 4. `version` is the sequence number of the last applied event and is the
//    optimistic-concurrency token when persisting
//
// ============================================================================

pub trait Aggregate: Sized + Send + Sync {
    type Event;
    type Command;
    type Error;

    /// Apply an event to update state
    fn apply_event(&mut self, event: &Self::Event) -> Result<(), Self::Error>;

    /// Handle command and emit events (business logic)
    fn handle_command(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;

    fn version(&self) -> i64;
}
