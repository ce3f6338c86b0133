//! Event handling.

use crate::event::Event;

/// Trait for consuming events in simulation components.
///
/// Components usually process events with a single exhaustive `match` on `event.data`.
pub trait EventHandler<E> {
    /// Processes event.
    fn on(&mut self, event: Event<E>);
}
