use std::collections::{BinaryHeap, HashSet};

use log::debug;
use rand::prelude::*;
use rand_pcg::Pcg64;

use crate::component::Id;
use crate::event::{Event, EventData, EventId};
use crate::log::{get_colored, log_incorrect_event, log_missing_cancel};

/// Epsilon to compare floating point values for equality.
pub const EPSILON: f64 = 1e-12;

// Canceled events stay in the heap and are skipped when they reach the top.
pub(crate) struct SimulationState<E: EventData> {
    clock: f64,
    rand: Pcg64,
    queue: BinaryHeap<Event<E>>,
    pending: HashSet<EventId>,
    canceled: HashSet<EventId>,
    // event whose handler is currently running
    in_flight: Option<EventId>,
    next_id: EventId,
}

impl<E: EventData> SimulationState<E> {
    pub fn new(seed: u64) -> Self {
        Self {
            clock: 0.,
            rand: Pcg64::seed_from_u64(seed),
            queue: BinaryHeap::new(),
            pending: HashSet::new(),
            canceled: HashSet::new(),
            in_flight: None,
            next_id: 0,
        }
    }

    pub fn time(&self) -> f64 {
        self.clock
    }

    pub fn rand(&mut self) -> f64 {
        self.rand.gen_range(0.0..1.0)
    }

    pub fn add_event(&mut self, data: E, src: Id, dest: Id, delay: f64) -> EventId {
        let event = Event {
            id: self.next_id,
            time: self.clock + delay.max(0.),
            src,
            dest,
            data,
        };
        if delay < -EPSILON {
            log_incorrect_event(&event, &format!("negative delay {}", delay));
            panic!("Event delay is negative! It is not allowed to add events from the past.");
        }
        self.next_id += 1;
        self.pending.insert(event.id);
        let id = event.id;
        self.queue.push(event);
        id
    }

    fn drop_canceled_head(&mut self) {
        while let Some(head) = self.queue.peek() {
            if !self.canceled.remove(&head.id) {
                break;
            }
            self.queue.pop();
        }
    }

    pub fn next_event(&mut self) -> Option<Event<E>> {
        self.drop_canceled_head();
        let event = self.queue.pop()?;
        self.pending.remove(&event.id);
        assert!(
            event.time >= self.clock,
            "Event {} at {} is older than the current time {}",
            event.id,
            event.time,
            self.clock
        );
        self.clock = event.time;
        self.in_flight = Some(event.id);
        Some(event)
    }

    pub fn peek_event(&mut self) -> Option<&Event<E>> {
        self.drop_canceled_head();
        self.queue.peek()
    }

    pub fn finish_dispatch(&mut self) {
        self.in_flight = None;
    }

    pub fn is_pending(&self, id: EventId) -> bool {
        self.pending.contains(&id)
    }

    pub fn cancel_event(&mut self, id: EventId) {
        if self.in_flight == Some(id) {
            debug!(
                target: "simulation",
                "[{:.3} {} simulation] Ignored cancellation of event {} from its own handler",
                self.clock,
                get_colored("DEBUG", colored::Color::Blue),
                id
            );
            return;
        }
        if !self.pending.remove(&id) {
            log_missing_cancel(self.clock, id);
            panic!("Cannot cancel event {}: it is not pending", id);
        }
        self.canceled.insert(id);
    }

    pub fn pending_event_count(&self) -> usize {
        self.pending.len()
    }

    pub fn event_count(&self) -> u64 {
        self.next_id
    }

    pub fn dump_events(&self) -> Vec<Event<E>> {
        let mut events: Vec<Event<E>> = self
            .queue
            .iter()
            .filter(|e| self.pending.contains(&e.id))
            .cloned()
            .collect();
        // event ordering is reversed for the max-heap
        events.sort_by(|a, b| b.cmp(a));
        events
    }
}
