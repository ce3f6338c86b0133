use std::collections::HashSet;

use bighouse_core::Termination;
use bighouse_datacenter::{build_experiment, replica_config, run_replicas, stream_seeds, ExperimentConfig};
use bighouse_stats::{MetricName, StatName};
use bighouse_workload::Generator;

// A lightly loaded M/M/1 server with the mean sojourn time of 1 / (10 - 1).
fn mm1_config(extra: &str) -> ExperimentConfig {
    let yaml = format!(
        "outputs:
  - metric: SOJOURN_TIME
    calibration_samples: 1000
servers:
  - arrival:
      type: exponential
      rate: 1.0
    service:
      type: exponential
      rate: 10.0
{}",
        extra
    );
    ExperimentConfig::from_str(&yaml)
}

#[test]
fn test_run_converges() {
    let mut exp = build_experiment(&mm1_config("event_limit: 10000000\n"));
    let summary = exp.run();
    assert_eq!(summary.termination, Termination::Converged);
    assert!(summary.end_time > 0.);
    let stats = exp.stats();
    let sojourn = stats.get(StatName::SojournTime).unwrap();
    assert!(sojourn.is_converged());
    assert!((sojourn.average() - 1. / 9.).abs() < 0.02, "average {}", sojourn.average());
}

#[test]
fn test_event_limit() {
    let mut exp = build_experiment(&mm1_config("event_limit: 100\n"));
    let summary = exp.run();
    assert_eq!(summary.termination, Termination::EventLimit);
    assert_eq!(summary.events_processed, 101);
}

#[test]
fn test_stop_handle() {
    let mut exp = build_experiment(&mm1_config(""));
    exp.stop_handle().stop();
    let summary = exp.run();
    assert_eq!(summary.termination, Termination::Stopped);
    assert_eq!(summary.events_processed, 0);
}

#[test]
fn test_no_metrics_runs_until_limit() {
    let yaml = "
outputs: []
event_limit: 500
";
    let mut exp = build_experiment(&ExperimentConfig::from_str(yaml));
    let summary = exp.run();
    assert_eq!(summary.termination, Termination::EventLimit);
    exp.datacenter().server(0).check_bookkeeping();
}

#[test]
fn test_run_to_steady_state() {
    let mut exp = build_experiment(&mm1_config("event_limit: 10000000\n"));
    let summary = exp.run_to_steady_state();
    assert_eq!(summary.termination, Termination::SteadyState);
    let stats = exp.stats();
    let sojourn = stats.get(StatName::SojournTime).unwrap();
    assert!(sojourn.is_steady_state());
    // only the histogram range is calibrated
    assert_eq!(sojourn.calibration_samples(), 100);
    let x_values = stats.histogram_x_values();
    assert_eq!(x_values[&MetricName::Stat(StatName::SojournTime)].len(), 10000);
}

#[test]
fn test_replicas() {
    let config = mm1_config("event_limit: 10000000\n");
    let results = run_replicas(&config, 3, 2);
    assert_eq!(results.runs.len(), 3);
    for run in results.runs.iter() {
        assert_eq!(run.termination, Termination::Converged);
    }
    let sojourn = results.stats.get(StatName::SojournTime).unwrap();
    assert!(sojourn.is_combined());
    assert!(sojourn.good_samples() >= 3 * bighouse_stats::MIN_CONVERGE_SAMPLES);
    assert!((sojourn.average() - 1. / 9.).abs() < 0.02, "average {}", sojourn.average());
}

#[test]
fn test_replica_seeds_are_disjoint() {
    for config in [
        mm1_config(""),
        ExperimentConfig::from_file("test-configs/experiment.yaml"),
    ] {
        let seeds_per_replica = 2 * config.server_count() + 1;
        let mut seen = HashSet::new();
        for replica in 0..10 {
            let seeds = stream_seeds(&replica_config(&config, replica));
            assert_eq!(seeds.len(), seeds_per_replica);
            for seed in seeds {
                assert!(seen.insert(seed), "seed {} is used by more than one stream", seed);
            }
        }
    }
}

#[test]
fn test_replica_streams_differ() {
    let config = mm1_config("");
    let first = stream_seeds(&replica_config(&config, 0));
    let second = stream_seeds(&replica_config(&config, 1));
    let server = &config.servers[0];

    // both generators are exponential, so equal seeds would give draws equal up to the rate
    let mut service = server.service.build(first[2]);
    let mut arrival = server.arrival.build(second[1]);
    let mut same = 0;
    for _ in 0..1000 {
        if (service.next() * 10. - arrival.next()).abs() < 1e-9 {
            same += 1;
        }
    }
    assert!(same < 10, "{} of 1000 draws coincide", same);
}
