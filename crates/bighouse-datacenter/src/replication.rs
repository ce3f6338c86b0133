//! Running independent replicas of an experiment in parallel.

use std::sync::{Arc, Mutex};

use log::info;
use serde::Serialize;
use threadpool::ThreadPool;

use bighouse_core::RunSummary;
use bighouse_stats::StatsCollection;

use crate::config::ExperimentConfig;
use crate::experiment::build_experiment;

/// Merged results of experiment replicas.
#[derive(Serialize)]
pub struct ReplicaResults {
    /// Statistics of all replicas combined.
    pub stats: StatsCollection,
    /// Run summaries ordered by replica number.
    pub runs: Vec<RunSummary>,
}

/// Returns the config of the given replica of the experiment.
///
/// Each replica gets its own block of `2 * server_count + 1` seeds, so that no random stream
/// is shared between replicas.
pub fn replica_config(config: &ExperimentConfig, replica: usize) -> ExperimentConfig {
    let block = 2 * config.server_count() as u64 + 1;
    let mut replica_config = config.clone();
    replica_config.seed = config.seed.wrapping_add(replica as u64 * block);
    replica_config
}

/// Runs `replicas` copies of the experiment using the specified number of threads
/// and combines their statistics.
///
/// Replica configs are produced by [`replica_config`]. A pilot run of the experiment is first run to steady state
/// to find the histogram bins, which are then shared by all replicas so that their histograms can be merged.
pub fn run_replicas(config: &ExperimentConfig, replicas: usize, num_threads: usize) -> ReplicaResults {
    assert!(replicas > 0, "At least one replica is required");

    let mut pilot = build_experiment(config);
    let pilot_summary = pilot.run_to_steady_state();
    let x_values = pilot.stats().histogram_x_values();
    info!(
        target: "replication",
        "Pilot run found bins of {} metrics in {} events",
        x_values.len(),
        pilot_summary.events_processed
    );
    drop(pilot);

    let results = Arc::new(Mutex::new(Vec::new()));
    let pool = ThreadPool::new(num_threads);
    for replica in 0..replicas {
        let replica_config = replica_config(config, replica);
        let x_values = x_values.clone();
        let results = results.clone();

        pool.execute(move || {
            let mut experiment = build_experiment(&replica_config);
            experiment.set_histogram_x_values(&x_values);
            let summary = experiment.run();
            info!(
                target: "replication",
                "Replica {} finished: {:?} after {} events",
                replica,
                summary.termination,
                summary.events_processed
            );
            let stats = experiment.into_stats();
            results.lock().unwrap().push((replica, summary, stats));
        });
    }

    pool.join();
    let mut results = Arc::try_unwrap(results).unwrap().into_inner().unwrap();
    if results.len() != replicas {
        panic!("{} of {} replicas failed", replicas - results.len(), replicas);
    }
    results.sort_by_key(|(replica, _, _)| *replica);

    let mut runs = Vec::with_capacity(replicas);
    let mut combined: Option<StatsCollection> = None;
    for (_, summary, stats) in results {
        runs.push(summary);
        combined = Some(match combined {
            None => stats,
            Some(acc) => acc.combine(&stats),
        });
    }
    ReplicaResults {
        stats: combined.unwrap_or_default(),
        runs,
    }
}
