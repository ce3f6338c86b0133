//! Assembling a datacenter experiment from its configuration.

use std::cell::{Ref, RefCell};
use std::rc::Rc;

use indexmap::IndexMap;

use bighouse_core::{Experiment, RunSummary, Simulation, StopHandle};
use bighouse_stats::{MetricName, StatsCollection};

use crate::capping::PowerCappingEnforcer;
use crate::config::ExperimentConfig;
use crate::datacenter::DataCenter;
use crate::events::DcEvent;
use crate::server::Server;

/// An experiment over a simulated datacenter.
pub struct DataCenterExperiment {
    experiment: Experiment<DcEvent>,
    datacenter: Rc<RefCell<DataCenter>>,
    stats: Rc<RefCell<StatsCollection>>,
}

impl DataCenterExperiment {
    pub fn run(&mut self) -> RunSummary {
        self.experiment.run()
    }

    pub fn run_to_steady_state(&mut self) -> RunSummary {
        self.experiment.run_to_steady_state()
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.experiment.stop_handle()
    }

    pub fn stats(&self) -> Ref<StatsCollection> {
        self.stats.borrow()
    }

    /// Takes the statistics out of a finished experiment.
    pub fn into_stats(self) -> StatsCollection {
        self.stats.borrow().clone()
    }

    /// Presets the histogram bins of the metrics, e.g. with the ones found by a pilot run.
    pub fn set_histogram_x_values(&mut self, x_values: &IndexMap<MetricName, Vec<f64>>) {
        self.stats.borrow_mut().set_histogram_x_values(x_values);
    }

    pub fn datacenter(&self) -> Ref<DataCenter> {
        self.datacenter.borrow()
    }

    pub fn experiment(&self) -> &Experiment<DcEvent> {
        &self.experiment
    }

    pub fn experiment_mut(&mut self) -> &mut Experiment<DcEvent> {
        &mut self.experiment
    }
}

/// Returns the random seeds used by an experiment built from the config.
///
/// The simulation itself uses `seed`, while server `i` draws arrivals and job sizes
/// from generators seeded with `seed + 2i + 1` and `seed + 2i + 2`.
/// So an experiment occupies the block of `2 * server_count + 1` consecutive seeds starting at `seed`.
pub fn stream_seeds(config: &ExperimentConfig) -> Vec<u64> {
    (0..2 * config.server_count() as u64 + 1)
        .map(|offset| config.seed.wrapping_add(offset))
        .collect()
}

/// Builds the datacenter described by the config and an experiment tracking the configured metrics.
///
/// See [`stream_seeds`] for how the random streams are seeded.
pub fn build_experiment(config: &ExperimentConfig) -> DataCenterExperiment {
    let stats = Rc::new(RefCell::new(StatsCollection::new()));
    {
        let mut stats = stats.borrow_mut();
        for output in config.outputs.iter() {
            stats.add_statistic(output.metric, output.settings.clone());
        }
        for output in config.time_weighted_outputs.iter() {
            stats.add_time_weighted_statistic(output.metric, output.settings.clone(), output.window);
        }
        for metric in config.warmup_metrics.iter() {
            stats.set_warmup_metric(*metric);
        }
    }

    let seeds = stream_seeds(config);
    let mut sim = Simulation::new(seeds[0]);
    let mut servers = Vec::new();
    for server_config in config.servers.iter() {
        for _ in 0..server_config.count {
            let index = servers.len();
            servers.push(Server::new(
                index,
                server_config,
                server_config.arrival.build(seeds[2 * index + 1]),
                server_config.service.build(seeds[2 * index + 2]),
                stats.clone(),
            ));
        }
    }
    let capping = config
        .capping
        .as_ref()
        .map(|c| PowerCappingEnforcer::new(c, stats.clone()));

    let datacenter = Rc::new(RefCell::new(DataCenter::new(
        sim.create_context("datacenter"),
        servers,
        capping,
        stats.clone(),
    )));
    sim.add_handler("datacenter", datacenter.clone());
    datacenter.borrow_mut().start();

    let mut experiment = Experiment::new("datacenter", sim, stats.clone());
    experiment.set_event_limit(config.event_limit);
    experiment.set_stop_at_steady_state(config.stop_at_steady_state);
    DataCenterExperiment {
        experiment,
        datacenter,
        stats,
    }
}
