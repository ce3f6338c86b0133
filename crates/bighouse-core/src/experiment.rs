//! Running a simulation until its statistics converge.

use std::cell::{Ref, RefCell};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::info;
use serde::Serialize;

use bighouse_stats::StatsCollection;

use crate::event::EventData;
use crate::simulation::Simulation;

/// First number of processed events at which the progress is reported, as a power of ten.
const FIRST_PROGRESS_ORDER: i32 = 5;

/// Reason why an experiment run has finished.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Termination {
    /// All registered metrics have converged.
    Converged,
    /// All registered metrics have reached steady state and the run was asked to stop there.
    SteadyState,
    /// The number of processed events exceeded the limit.
    EventLimit,
    /// The experiment was stopped through [`Experiment::stop`] or a [`StopHandle`].
    Stopped,
    /// The event queue became empty.
    NoEvents,
}

/// Outcome of [`Experiment::run`].
#[derive(Clone, Copy, Debug, Serialize)]
pub struct RunSummary {
    /// Reason why the run has finished.
    pub termination: Termination,
    /// Number of events processed by the experiment so far.
    pub events_processed: u64,
    /// Simulation time of the last processed event.
    pub end_time: f64,
}

/// Thread-safe handle that stops a running experiment before its next event.
#[derive(Clone, Debug, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    /// Requests the experiment to stop.
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns true if the stop was requested.
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Drives a simulation and checks the statistics of its metrics after every event.
pub struct Experiment<E: EventData> {
    name: String,
    sim: Simulation<E>,
    stats: Rc<RefCell<StatsCollection>>,
    event_limit: u64,
    stop_at_steady_state: bool,
    stop: StopHandle,
    events_processed: u64,
}

impl<E: EventData> Experiment<E> {
    /// Creates an experiment over a configured simulation.
    ///
    /// The statistics collection must be the one the simulation components feed samples into.
    pub fn new<S: AsRef<str>>(name: S, sim: Simulation<E>, stats: Rc<RefCell<StatsCollection>>) -> Self {
        Self {
            name: name.as_ref().to_owned(),
            sim,
            stats,
            event_limit: 0,
            stop_at_steady_state: false,
            stop: StopHandle::default(),
            events_processed: 0,
        }
    }

    /// Sets the maximum number of processed events, 0 means no limit.
    ///
    /// The run ends as soon as the number of processed events exceeds the limit.
    pub fn set_event_limit(&mut self, event_limit: u64) {
        self.event_limit = event_limit;
    }

    /// Makes the run end once every metric is in steady state.
    pub fn set_stop_at_steady_state(&mut self, stop_at_steady_state: bool) {
        self.stop_at_steady_state = stop_at_steady_state;
    }

    /// Returns a handle which can stop the experiment from another thread.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Stops the experiment before its next event.
    pub fn stop(&self) {
        self.stop.stop();
    }

    /// Processes events until one of the termination conditions holds.
    ///
    /// Convergence and steady state are only checked when the collection has registered metrics.
    pub fn run(&mut self) -> RunSummary {
        info!(target: "experiment", "Starting experiment {}", self.name);
        let mut progress_order = FIRST_PROGRESS_ORDER;
        let mut progress_at = 10u64.pow(progress_order as u32);
        let termination = loop {
            if self.stop.is_stopped() {
                break Termination::Stopped;
            }
            if !self.sim.step() {
                break Termination::NoEvents;
            }
            self.events_processed += 1;
            if self.events_processed > progress_at {
                self.log_progress();
                progress_order += 1;
                progress_at = 10u64.pow(progress_order as u32);
            }
            let stats = self.stats.borrow();
            if !stats.is_empty() {
                if stats.all_converged() {
                    break Termination::Converged;
                }
                if self.stop_at_steady_state && stats.all_steady_state() {
                    break Termination::SteadyState;
                }
            }
            if self.event_limit > 0 && self.events_processed > self.event_limit {
                break Termination::EventLimit;
            }
        };
        let summary = RunSummary {
            termination,
            events_processed: self.events_processed,
            end_time: self.end_time(),
        };
        info!(
            target: "experiment",
            "Experiment {} finished: {:?} after {} events at time {:.3}",
            self.name,
            summary.termination,
            summary.events_processed,
            summary.end_time
        );
        summary
    }

    /// Runs only until every metric has found its histogram range and reached steady state.
    ///
    /// Used by pilot runs which compute the histogram bins shared by replicas.
    pub fn run_to_steady_state(&mut self) -> RunSummary {
        self.stats.borrow_mut().set_just_bins(true);
        self.stop_at_steady_state = true;
        self.run()
    }

    fn log_progress(&self) {
        info!(target: "experiment", "Processed {} events", self.events_processed);
        for stat in self.stats.borrow().statistics().filter(|s| !s.is_converged()) {
            info!(
                target: "experiment",
                "Still waiting for {} at mean accuracy {} and quantile accuracy {}: {}",
                stat.name(),
                stat.mean_accuracy(),
                stat.quantile_accuracy(),
                stat.summary()
            );
        }
    }

    /// Returns the experiment name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the statistics collection of the experiment.
    pub fn stats(&self) -> Ref<StatsCollection> {
        self.stats.borrow()
    }

    /// Returns the number of processed events.
    pub fn events_processed(&self) -> u64 {
        self.events_processed
    }

    /// Returns the simulation time of the last processed event.
    pub fn end_time(&self) -> f64 {
        self.sim.time()
    }

    /// Returns the underlying simulation.
    pub fn simulation(&self) -> &Simulation<E> {
        &self.sim
    }

    /// Returns the underlying simulation.
    pub fn simulation_mut(&mut self) -> &mut Simulation<E> {
        &mut self.sim
    }
}
