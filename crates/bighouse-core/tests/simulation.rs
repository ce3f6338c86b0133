use std::cell::RefCell;
use std::rc::Rc;

use serde::Serialize;

use bighouse_core::{Event, EventHandler, EventId, Simulation, SimulationContext};

#[derive(Clone, Serialize)]
enum TestEvent {
    Ping { tag: u32 },
    CancelSelf,
    CancelOther { id: EventId },
}

struct Recorder {
    ctx: SimulationContext<TestEvent>,
    delivered: Rc<RefCell<Vec<(f64, u32)>>>,
}

impl EventHandler<TestEvent> for Recorder {
    fn on(&mut self, event: Event<TestEvent>) {
        match event.data {
            TestEvent::Ping { tag } => self.delivered.borrow_mut().push((event.time, tag)),
            TestEvent::CancelSelf => self.ctx.cancel_event(event.id),
            TestEvent::CancelOther { id } => self.ctx.cancel_event(id),
        }
    }
}

fn prepare_test() -> (Simulation<TestEvent>, SimulationContext<TestEvent>, Rc<RefCell<Vec<(f64, u32)>>>) {
    let mut sim = Simulation::new(123);
    let delivered = Rc::new(RefCell::new(Vec::new()));
    let recorder = Rc::new(RefCell::new(Recorder {
        ctx: sim.create_context("recorder"),
        delivered: delivered.clone(),
    }));
    sim.add_handler("recorder", recorder);
    let ctx = sim.create_context("main");
    (sim, ctx, delivered)
}

#[test]
fn test_events_are_delivered_in_time_order() {
    let (mut sim, mut ctx, delivered) = prepare_test();
    let dest = sim.lookup_id("recorder");
    ctx.emit(TestEvent::Ping { tag: 3 }, dest, 3.);
    ctx.emit(TestEvent::Ping { tag: 1 }, dest, 1.);
    ctx.emit(TestEvent::Ping { tag: 2 }, dest, 2.);

    sim.step_until_no_events();

    assert_eq!(*delivered.borrow(), vec![(1., 1), (2., 2), (3., 3)]);
    assert_eq!(sim.time(), 3.);
}

#[test]
fn test_simultaneous_events_keep_creation_order() {
    let (mut sim, mut ctx, delivered) = prepare_test();
    let dest = sim.lookup_id("recorder");
    for tag in 0..5 {
        ctx.emit(TestEvent::Ping { tag }, dest, 1.);
    }

    sim.step_until_no_events();

    let tags: Vec<u32> = delivered.borrow().iter().map(|(_, tag)| *tag).collect();
    assert_eq!(tags, vec![0, 1, 2, 3, 4]);
}

#[test]
fn test_canceled_event_is_not_delivered() {
    let (mut sim, mut ctx, delivered) = prepare_test();
    let dest = sim.lookup_id("recorder");
    ctx.emit(TestEvent::Ping { tag: 1 }, dest, 1.);
    let canceled = ctx.emit(TestEvent::Ping { tag: 2 }, dest, 2.);
    assert!(ctx.is_pending(canceled));
    assert_eq!(sim.pending_event_count(), 2);

    ctx.cancel_event(canceled);
    assert!(!ctx.is_pending(canceled));
    assert_eq!(sim.dump_events().len(), 1);

    sim.step_until_no_events();
    assert_eq!(*delivered.borrow(), vec![(1., 1)]);
    assert_eq!(sim.event_count(), 2);
}

#[test]
#[should_panic(expected = "not pending")]
fn test_cancel_delivered_event() {
    let (mut sim, mut ctx, _) = prepare_test();
    let dest = sim.lookup_id("recorder");
    let id = ctx.emit(TestEvent::Ping { tag: 1 }, dest, 1.);
    sim.step_until_no_events();
    ctx.cancel_event(id);
}

#[test]
#[should_panic(expected = "not pending")]
fn test_cancel_twice() {
    let (sim, mut ctx, _) = prepare_test();
    let dest = sim.lookup_id("recorder");
    let id = ctx.emit(TestEvent::Ping { tag: 1 }, dest, 1.);
    ctx.cancel_event(id);
    ctx.cancel_event(id);
}

#[test]
fn test_cancel_from_own_handler_is_ignored() {
    let (mut sim, mut ctx, delivered) = prepare_test();
    let dest = sim.lookup_id("recorder");
    ctx.emit(TestEvent::CancelSelf, dest, 1.);
    ctx.emit(TestEvent::Ping { tag: 1 }, dest, 2.);

    sim.step_until_no_events();

    assert_eq!(*delivered.borrow(), vec![(2., 1)]);
}

#[test]
fn test_cancel_from_other_handler() {
    let (mut sim, mut ctx, delivered) = prepare_test();
    let dest = sim.lookup_id("recorder");
    let id = ctx.emit(TestEvent::Ping { tag: 1 }, dest, 2.);
    ctx.emit(TestEvent::CancelOther { id }, dest, 1.);

    sim.step_until_no_events();

    assert!(delivered.borrow().is_empty());
    assert_eq!(sim.time(), 1.);
}

#[test]
#[should_panic(expected = "Event delay is negative")]
fn test_negative_delay() {
    let (sim, mut ctx, _) = prepare_test();
    let dest = sim.lookup_id("recorder");
    ctx.emit(TestEvent::Ping { tag: 1 }, dest, -1.);
}

#[test]
fn test_step_for_duration() {
    let (mut sim, mut ctx, delivered) = prepare_test();
    let dest = sim.lookup_id("recorder");
    for tag in 1..=5 {
        ctx.emit(TestEvent::Ping { tag }, dest, tag as f64);
    }

    assert!(sim.step_for_duration(2.5));
    assert_eq!(delivered.borrow().len(), 2);
    assert_eq!(sim.next_event_time(), Some(3.));

    assert!(!sim.step_for_duration(10.));
    assert_eq!(delivered.borrow().len(), 5);
    assert_eq!(sim.next_event_time(), None);
}

#[test]
fn test_step_until_time() {
    let (mut sim, mut ctx, delivered) = prepare_test();
    let dest = sim.lookup_id("recorder");
    for tag in 1..=3 {
        ctx.emit(TestEvent::Ping { tag }, dest, tag as f64);
    }

    // the bound is inclusive
    assert!(sim.step_until_time(2.));
    assert_eq!(*delivered.borrow(), vec![(1., 1), (2., 2)]);
    assert!(sim.step_until_time(2.5));
    assert_eq!(sim.time(), 2.);
    assert!(!sim.step_until_time(3.));
    assert_eq!(sim.time(), 3.);
}

#[test]
fn test_undelivered_event_is_dropped() {
    let (mut sim, mut ctx, delivered) = prepare_test();
    let nobody = sim.create_context("nobody").id();
    ctx.emit(TestEvent::Ping { tag: 1 }, nobody, 1.);

    assert!(sim.step());
    assert!(!sim.step());
    assert!(delivered.borrow().is_empty());
}

#[test]
fn test_component_lookup() {
    let (sim, ctx, _) = prepare_test();
    let id = sim.lookup_id("recorder");
    assert_eq!(sim.lookup_name(id), "recorder");
    assert_eq!(ctx.lookup_name(id), "recorder");
    assert_eq!(ctx.name(), "main");
}

#[test]
fn test_same_seed_same_random_stream() {
    let mut first: Simulation<TestEvent> = Simulation::new(42);
    let mut second: Simulation<TestEvent> = Simulation::new(42);
    for _ in 0..10 {
        assert_eq!(first.rand(), second.rand());
    }
}
