use approx::assert_abs_diff_eq;

use bighouse_core::{Simulation, SimulationContext};
use bighouse_datacenter::cpu_core::{processing_rate, Core, CorePolicy, CoreState};
use bighouse_datacenter::power::{CorePowerConfig, SocketPowerConfig};
use bighouse_datacenter::socket::{Socket, SocketPolicy, SocketState};
use bighouse_datacenter::{DcEvent, Job, JobIdGenerator};

fn setup() -> (Simulation<DcEvent>, SimulationContext<DcEvent>) {
    let mut sim = Simulation::new(123);
    let ctx = sim.create_context("node");
    (sim, ctx)
}

// Moves the clock forward by processing a marker event, which must be the earliest pending event.
fn advance(sim: &mut Simulation<DcEvent>, ctx: &mut SimulationContext<DcEvent>, delay: f64) {
    ctx.emit_self(DcEvent::RecalculateCaps, delay);
    let before = sim.time();
    sim.step();
    assert_abs_diff_eq!(sim.time(), before + delay, epsilon = 1e-12);
}

fn core(policy: CorePolicy) -> Core {
    Core::new(0, 0, 0, policy, CorePowerConfig::default())
}

#[test]
fn test_job_ids() {
    let mut ids = JobIdGenerator::new();
    assert_eq!(ids.next_id(), 0);
    assert_eq!(ids.next_id(), 1);
    assert_eq!(ids.next_id(), 2);
}

#[test]
fn test_job_times() {
    let mut job = Job::new(0, 2.);
    assert_eq!(job.sojourn_time(), None);
    job.mark_arrival(1.);
    job.mark_start(1.5);
    assert_eq!(job.wait_time(), Some(0.5));
    assert_eq!(job.sojourn_time(), None);
    job.mark_finish(3.5);
    assert_eq!(job.sojourn_time(), Some(2.5));
    assert_eq!(job.remaining(), 2.);
}

#[test]
#[should_panic(expected = "arrival marked twice")]
fn test_job_arrival_twice() {
    let mut job = Job::new(0, 1.);
    job.mark_arrival(1.);
    job.mark_arrival(2.);
}

#[test]
#[should_panic(expected = "start marked twice")]
fn test_job_start_twice() {
    let mut job = Job::new(0, 1.);
    job.mark_start(1.);
    job.mark_start(1.);
}

#[test]
#[should_panic(expected = "finish marked twice")]
fn test_job_finish_twice() {
    let mut job = Job::new(0, 1.);
    job.mark_finish(1.);
    job.mark_finish(2.);
}

#[test]
fn test_core_schedules_finish() {
    let (mut sim, mut ctx) = setup();
    let mut core = core(CorePolicy::NoManagement);
    assert_eq!(core.state(), CoreState::Halt);
    core.insert_job(Job::new(0, 10.), &mut ctx);
    assert_eq!(core.state(), CoreState::Active);
    assert!(core.job().unwrap().finish_event().is_some());
    assert_eq!(sim.next_event_time(), Some(10.));
}

#[test]
fn test_dvfs_conserves_work() {
    let (mut sim, mut ctx) = setup();
    let mut core = core(CorePolicy::NoManagement);
    core.insert_job(Job::new(0, 10.), &mut ctx);

    advance(&mut sim, &mut ctx, 2.);
    core.set_dvfs_speed(0.5, &mut ctx);
    let slow = processing_rate(0.5);
    assert_abs_diff_eq!(core.job().unwrap().amount_completed(), 2., epsilon = 1e-12);
    assert_abs_diff_eq!(sim.next_event_time().unwrap(), 2. + 8. / slow, epsilon = 1e-9);
    assert_eq!(sim.pending_event_count(), 1);

    advance(&mut sim, &mut ctx, 1.);
    core.set_dvfs_speed(1., &mut ctx);
    let completed = core.job().unwrap().amount_completed();
    assert_abs_diff_eq!(completed, 2. + slow, epsilon = 1e-12);
    assert_abs_diff_eq!(sim.next_event_time().unwrap(), 3. + 10. - completed, epsilon = 1e-9);
}

#[test]
fn test_dvfs_on_idle_core() {
    let (sim, mut ctx) = setup();
    let mut core = core(CorePolicy::NoManagement);
    core.set_dvfs_speed(0.7, &mut ctx);
    assert_eq!(core.speed(), 0.7);
    assert_eq!(sim.pending_event_count(), 0);
}

#[test]
fn test_pause_and_resume() {
    let (mut sim, mut ctx) = setup();
    let mut core = core(CorePolicy::NoManagement);
    core.insert_job(Job::new(0, 4.), &mut ctx);

    advance(&mut sim, &mut ctx, 1.);
    core.pause(&mut ctx);
    assert!(core.is_paused());
    assert_abs_diff_eq!(core.job().unwrap().amount_completed(), 1., epsilon = 1e-12);
    assert_eq!(sim.next_event_time(), None);

    advance(&mut sim, &mut ctx, 5.);
    core.resume(&mut ctx);
    assert_abs_diff_eq!(sim.next_event_time().unwrap(), 9., epsilon = 1e-12);
}

#[test]
fn test_insert_into_paused_core() {
    let (mut sim, mut ctx) = setup();
    let mut core = core(CorePolicy::NoManagement);
    core.pause(&mut ctx);
    core.insert_job(Job::new(0, 1.), &mut ctx);
    assert_eq!(sim.pending_event_count(), 0);
    advance(&mut sim, &mut ctx, 2.);
    core.resume(&mut ctx);
    assert_abs_diff_eq!(sim.next_event_time().unwrap(), 3., epsilon = 1e-12);
}

#[test]
#[should_panic(expected = "already paused")]
fn test_pause_twice() {
    let (_sim, mut ctx) = setup();
    let mut core = core(CorePolicy::NoManagement);
    core.pause(&mut ctx);
    core.pause(&mut ctx);
}

#[test]
#[should_panic(expected = "which is busy")]
fn test_core_single_job() {
    let (_sim, mut ctx) = setup();
    let mut core = core(CorePolicy::NoManagement);
    core.insert_job(Job::new(0, 1.), &mut ctx);
    core.insert_job(Job::new(1, 1.), &mut ctx);
}

#[test]
#[should_panic(expected = "but it runs job 0")]
fn test_remove_wrong_job() {
    let (_sim, mut ctx) = setup();
    let mut core = core(CorePolicy::NoManagement);
    core.insert_job(Job::new(0, 1.), &mut ctx);
    core.remove_job(1, false, &mut ctx);
}

#[test]
fn test_core_power() {
    let (mut sim, mut ctx) = setup();
    let mut core = core(CorePolicy::NoManagement);
    assert_abs_diff_eq!(core.power(), 3.2, epsilon = 1e-12);
    core.insert_job(Job::new(0, 1.), &mut ctx);
    assert_abs_diff_eq!(core.power(), 16., epsilon = 1e-12);
    core.set_dvfs_speed(0.5, &mut ctx);
    assert_abs_diff_eq!(core.power(), 3.2 + 12.8 / 8., epsilon = 1e-12);
    assert_abs_diff_eq!(core.dynamic_power(), 1.6, epsilon = 1e-12);

    sim.step();
    core.remove_job(0, false, &mut ctx);
    assert_eq!(core.state(), CoreState::Halt);
    assert_abs_diff_eq!(core.power(), 3.2, epsilon = 1e-12);
}

#[test]
fn test_core_parking() {
    let (mut sim, mut ctx) = setup();
    let mut core = core(CorePolicy::CoreParking);
    core.insert_job(Job::new(0, 1.), &mut ctx);
    sim.step();
    core.remove_job(0, false, &mut ctx);
    assert_eq!(core.state(), CoreState::TransitioningToLowPower);
    assert_abs_diff_eq!(core.power(), 16., epsilon = 1e-12);
    let events = sim.dump_events();
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0].data, DcEvent::CoreEnteredPark { core: 0, .. }));
    assert_abs_diff_eq!(events[0].time, 1. + 100e-6, epsilon = 1e-12);

    sim.step();
    core.enter_park();
    assert_eq!(core.state(), CoreState::LowPowerIdle);
    assert_eq!(core.power(), 0.);

    advance(&mut sim, &mut ctx, 1.);
    core.insert_job(Job::new(1, 1.), &mut ctx);
    assert_eq!(core.state(), CoreState::TransitioningToActive);
    let events = sim.dump_events();
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0].data, DcEvent::CoreExitedPark { .. }));

    sim.step();
    core.exit_park(&mut ctx);
    assert_eq!(core.state(), CoreState::Active);
    assert_abs_diff_eq!(sim.next_event_time().unwrap(), sim.time() + 1., epsilon = 1e-12);
}

#[test]
fn test_arrival_cancels_park() {
    let (mut sim, mut ctx) = setup();
    let mut core = core(CorePolicy::CoreParking);
    core.insert_job(Job::new(0, 1.), &mut ctx);
    sim.step();
    core.remove_job(0, false, &mut ctx);
    core.insert_job(Job::new(1, 1.), &mut ctx);
    assert_eq!(core.state(), CoreState::TransitioningToActive);
    let events = sim.dump_events();
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0].data, DcEvent::CoreExitedPark { .. }));
}

#[test]
fn test_no_parking_with_waiting_job() {
    let (mut sim, mut ctx) = setup();
    let mut core = core(CorePolicy::CoreParking);
    core.insert_job(Job::new(0, 1.), &mut ctx);
    sim.step();
    core.remove_job(0, true, &mut ctx);
    assert_eq!(core.state(), CoreState::Halt);
    assert_eq!(sim.pending_event_count(), 0);
}

fn socket(cores: usize, policy: SocketPolicy) -> Socket {
    Socket::new(
        0,
        0,
        cores,
        CorePolicy::NoManagement,
        CorePowerConfig::default(),
        policy,
        SocketPowerConfig::default(),
    )
}

#[test]
fn test_socket_placement() {
    let (_sim, mut ctx) = setup();
    let mut socket = socket(2, SocketPolicy::NoManagement);
    assert_eq!(socket.remaining_capacity(), 2);
    socket.insert_job(Job::new(0, 1.), &mut ctx);
    assert_eq!(socket.remaining_capacity(), 1);
    assert_eq!(socket.utilization(), 0.5);
    assert_eq!(socket.core(0).job().unwrap().id(), 0);
    socket.insert_job(Job::new(1, 2.), &mut ctx);
    assert_eq!(socket.jobs_in_service(), 2);
    assert_eq!(socket.remaining_capacity(), 0);

    let job = socket.remove_job(0, false, &mut ctx);
    assert_eq!(job.id(), 0);
    assert_eq!(socket.jobs_in_service(), 1);
    assert_eq!(socket.core(1).job().unwrap().id(), 1);
}

#[test]
fn test_socket_power() {
    let (_sim, mut ctx) = setup();
    let mut socket = socket(2, SocketPolicy::NoManagement);
    assert_abs_diff_eq!(socket.power(), 8. + 2. * 3.2, epsilon = 1e-12);
    socket.insert_job(Job::new(0, 1.), &mut ctx);
    assert_abs_diff_eq!(socket.power(), 8. + 3.2 + 16., epsilon = 1e-12);
}

#[test]
fn test_socket_parking() {
    let (mut sim, mut ctx) = setup();
    let mut socket = socket(2, SocketPolicy::SocketParking);
    socket.insert_job(Job::new(0, 1.), &mut ctx);
    sim.step();
    socket.remove_job(0, false, &mut ctx);
    assert_eq!(socket.state(), SocketState::TransitioningToLowPowerIdle);
    assert_eq!(socket.idle_power(), 8.);
    let events = sim.dump_events();
    assert!(matches!(events[0].data, DcEvent::SocketEnteredPark { socket: 0, .. }));
    assert_abs_diff_eq!(events[0].time, 1. + 500e-6, epsilon = 1e-12);

    sim.step();
    socket.enter_park();
    assert_eq!(socket.state(), SocketState::LowPowerIdle);
    assert_eq!(socket.power(), 0.);

    // arrivals during the exit transition are buffered
    socket.insert_job(Job::new(1, 1.), &mut ctx);
    socket.insert_job(Job::new(2, 1.), &mut ctx);
    assert_eq!(socket.state(), SocketState::TransitioningToActive);
    assert_eq!(socket.jobs_in_transition(), 2);
    assert_eq!(socket.jobs_in_service(), 0);
    assert_eq!(socket.remaining_capacity(), 0);
    assert_eq!(socket.utilization(), 1.);
    assert_eq!(sim.pending_event_count(), 1);

    sim.step();
    socket.exit_park(&mut ctx);
    assert_eq!(socket.state(), SocketState::Active);
    assert_eq!(socket.jobs_in_transition(), 0);
    assert_eq!(socket.jobs_in_service(), 2);
}

#[test]
fn test_arrival_cancels_socket_park() {
    let (mut sim, mut ctx) = setup();
    let mut socket = socket(1, SocketPolicy::SocketParking);
    socket.insert_job(Job::new(0, 1.), &mut ctx);
    sim.step();
    socket.remove_job(0, false, &mut ctx);
    socket.insert_job(Job::new(1, 1.), &mut ctx);
    assert_eq!(socket.state(), SocketState::TransitioningToActive);
    let events = sim.dump_events();
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0].data, DcEvent::SocketExitedPark { .. }));
}

#[test]
#[should_panic(expected = "tried to enter park with busy cores")]
fn test_socket_park_when_busy() {
    let (_sim, mut ctx) = setup();
    let mut socket = socket(1, SocketPolicy::SocketParking);
    socket.insert_job(Job::new(0, 1.), &mut ctx);
    socket.enter_park();
}
