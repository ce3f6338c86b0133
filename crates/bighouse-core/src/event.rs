//! Simulation events.

use std::cmp::Ordering;

use serde::Serialize;

use crate::component::Id;

/// Identifier of an event, unique within a simulation and increasing in creation order.
pub type EventId = u64;

/// Payload of simulation events.
///
/// A simulation uses a single payload type, usually an enum with one variant per event kind.
pub trait EventData: Serialize + Clone + 'static {}

impl<T: Serialize + Clone + 'static> EventData for T {}

/// Event scheduled for delivery to a component at a given time.
#[derive(Clone, Serialize)]
pub struct Event<E> {
    /// Event identifier.
    pub id: EventId,
    /// Delivery time.
    pub time: f64,
    /// Component that emitted the event.
    pub src: Id,
    /// Component the event is delivered to.
    pub dest: Id,
    /// Event payload.
    pub data: E,
}

impl<E> Eq for Event<E> {}

impl<E> PartialEq for Event<E> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

// Reversed so that BinaryHeap pops the earliest event, ties are resolved by creation order.
impl<E> Ord for Event<E> {
    fn cmp(&self, other: &Self) -> Ordering {
        other.time.total_cmp(&self.time).then_with(|| other.id.cmp(&self.id))
    }
}

impl<E> PartialOrd for Event<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
