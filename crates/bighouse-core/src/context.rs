//! Accessing simulation from components.

use std::cell::RefCell;
use std::rc::Rc;

use crate::component::{ComponentNames, Id};
use crate::event::{EventData, EventId};
use crate::state::SimulationState;

/// A component's handle to the shared simulation state: reads the clock, schedules and cancels events.
///
/// Components keep their context and log through it with [`log_info!`](crate::log_info!) and friends.
pub struct SimulationContext<E: EventData> {
    id: Id,
    name: String,
    state: Rc<RefCell<SimulationState<E>>>,
    names: ComponentNames,
}

impl<E: EventData> SimulationContext<E> {
    pub(crate) fn new(id: Id, name: &str, state: Rc<RefCell<SimulationState<E>>>, names: ComponentNames) -> Self {
        Self {
            id,
            name: name.to_owned(),
            state,
            names,
        }
    }

    /// Returns the identifier of the component owning this context.
    pub fn id(&self) -> Id {
        self.id
    }

    /// Returns the name of the component owning this context.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the current simulation time.
    pub fn time(&self) -> f64 {
        self.state.borrow().time()
    }

    /// Returns a random float in `[0, 1)` from the simulation-wide generator.
    pub fn rand(&mut self) -> f64 {
        self.state.borrow_mut().rand()
    }

    /// Schedules an event for component `dest` after `delay`.
    ///
    /// Panics if the delay is negative.
    pub fn emit(&mut self, data: E, dest: Id, delay: f64) -> EventId {
        self.state.borrow_mut().add_event(data, self.id, dest, delay)
    }

    /// Schedules an event for the owner of this context after `delay`.
    ///
    /// Panics if the delay is negative.
    pub fn emit_self(&mut self, data: E, delay: f64) -> EventId {
        self.emit(data, self.id, delay)
    }

    /// Cancels a pending event.
    ///
    /// Canceling the event that is being delivered right now is a no-op.
    /// Panics if the event was already delivered or canceled.
    pub fn cancel_event(&mut self, id: EventId) {
        self.state.borrow_mut().cancel_event(id);
    }

    /// Returns true if the event is scheduled and was neither delivered nor canceled.
    pub fn is_pending(&self, id: EventId) -> bool {
        self.state.borrow().is_pending(id)
    }

    /// Returns the name of the component with the given identifier.
    pub fn lookup_name(&self, id: Id) -> String {
        self.names.borrow()[id as usize].clone()
    }
}
