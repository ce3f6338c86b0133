//! Simulation configuration and execution.

use std::cell::RefCell;
use std::rc::Rc;

use log::Level::Trace;
use log::{debug, log_enabled, trace};
use serde_json::json;

use crate::component::{ComponentRegistry, Id};
use crate::context::SimulationContext;
use crate::event::{Event, EventData};
use crate::handler::EventHandler;
use crate::log::{get_colored, log_undelivered_event};
use crate::state::SimulationState;

/// Owns the event queue and the components of a simulation and dispatches events to them.
///
/// All events of a simulation share the payload type `E`.
pub struct Simulation<E: EventData> {
    state: Rc<RefCell<SimulationState<E>>>,
    components: ComponentRegistry<E>,
}

impl<E: EventData> Simulation<E> {
    /// Creates a simulation whose random number generator is seeded with `seed`.
    pub fn new(seed: u64) -> Self {
        Self {
            state: Rc::new(RefCell::new(SimulationState::new(seed))),
            components: ComponentRegistry::new(),
        }
    }

    /// Returns the identifier of the component with the given name.
    ///
    /// Panics if there is no such component.
    pub fn lookup_id(&self, name: &str) -> Id {
        self.components
            .id(name)
            .unwrap_or_else(|| panic!("Unknown component {}", name))
    }

    /// Returns the name of the component with the given identifier.
    pub fn lookup_name(&self, id: Id) -> String {
        self.components.name(id)
    }

    /// Creates a context for the component with the given name, registering the component if needed.
    pub fn create_context<S: AsRef<str>>(&mut self, name: S) -> SimulationContext<E> {
        let id = self.components.id_or_register(name.as_ref());
        debug!(
            target: "simulation",
            "[{:.3} {} simulation] Created context: {}",
            self.time(),
            get_colored("DEBUG", colored::Color::Blue),
            json!({"name": name.as_ref(), "id": id})
        );
        SimulationContext::new(id, name.as_ref(), self.state.clone(), self.components.names())
    }

    /// Makes `handler` receive the events addressed to the component with the given name.
    pub fn add_handler<S: AsRef<str>>(&mut self, name: S, handler: Rc<RefCell<dyn EventHandler<E>>>) -> Id {
        let id = self.components.id_or_register(name.as_ref());
        self.components.set_handler(id, handler);
        debug!(
            target: "simulation",
            "[{:.3} {} simulation] Added handler: {}",
            self.time(),
            get_colored("DEBUG", colored::Color::Blue),
            json!({"name": name.as_ref(), "id": id})
        );
        id
    }

    /// Returns the current simulation time, which is the time of the last delivered event.
    pub fn time(&self) -> f64 {
        self.state.borrow().time()
    }

    /// Delivers the earliest pending event.
    ///
    /// Events addressed to components without a handler are logged and dropped.
    /// Returns `false` if there was no pending event.
    pub fn step(&mut self) -> bool {
        let event = match self.state.borrow_mut().next_event() {
            Some(event) => event,
            None => return false,
        };
        if log_enabled!(Trace) {
            self.trace_event(&event);
        }
        match self.components.handler(event.dest) {
            Some(handler) => handler.borrow_mut().on(event),
            None => log_undelivered_event(&event),
        }
        self.state.borrow_mut().finish_dispatch();
        true
    }

    fn trace_event(&self, event: &Event<E>) {
        let dest = self.lookup_name(event.dest);
        trace!(
            target: &dest,
            "[{:.3} {} {}] {}",
            event.time,
            get_colored("EVENT", colored::Color::BrightBlack),
            dest,
            json!({"id": event.id, "data": event.data, "src": self.lookup_name(event.src)})
        );
    }

    /// Delivers events until the queue is empty.
    pub fn step_until_no_events(&mut self) {
        while self.step() {}
    }

    /// Delivers all events scheduled at or before `time`.
    ///
    /// Returns `true` if some events remain in the queue.
    pub fn step_until_time(&mut self, time: f64) -> bool {
        loop {
            match self.next_event_time() {
                Some(next) if next > time => return true,
                Some(_) => {
                    self.step();
                }
                None => return false,
            }
        }
    }

    /// Delivers all events scheduled within `duration` after the current time.
    ///
    /// Returns `true` if some events remain in the queue.
    pub fn step_for_duration(&mut self, duration: f64) -> bool {
        self.step_until_time(self.time() + duration)
    }

    /// Returns the time of the earliest pending event.
    pub fn next_event_time(&self) -> Option<f64> {
        self.state.borrow_mut().peek_event().map(|e| e.time)
    }

    /// Returns a random float in `[0, 1)` from the simulation-wide generator.
    pub fn rand(&mut self) -> f64 {
        self.state.borrow_mut().rand()
    }

    /// Returns the number of events created so far, including canceled ones.
    pub fn event_count(&self) -> u64 {
        self.state.borrow().event_count()
    }

    /// Returns the number of events that are scheduled and not yet delivered or canceled.
    pub fn pending_event_count(&self) -> usize {
        self.state.borrow().pending_event_count()
    }

    /// Returns the pending events in delivery order.
    pub fn dump_events(&self) -> Vec<Event<E>> {
        self.state.borrow().dump_events()
    }
}
