use rstest::rstest;

use bighouse_datacenter::config::{GeneratorConfig, ServerConfig};
use bighouse_datacenter::cpu_core::CorePolicy;
use bighouse_datacenter::socket::SocketPolicy;
use bighouse_datacenter::{ExperimentConfig, PowerPolicy, Scheduler};
use bighouse_stats::{MetricName, StatName, StatisticSettings, TimeWeightedStatName};
use bighouse_workload::Generator;

fn name_wrapper(file_name: &str) -> String {
    format!("test-configs/{}", file_name)
}

#[test]
fn test_default_config() {
    let config = ExperimentConfig::from_str("{}");
    assert_eq!(config.seed, 123);
    assert_eq!(config.event_limit, 0);
    assert!(!config.stop_at_steady_state);
    assert_eq!(config.servers, vec![ServerConfig::default()]);
    assert_eq!(config.server_count(), 1);
    assert!(config.capping.is_none());
    assert_eq!(config.outputs.len(), 1);
    assert_eq!(config.outputs[0].metric, StatName::SojournTime);
    assert_eq!(config.outputs[0].settings, StatisticSettings::default());
    assert!(config.time_weighted_outputs.is_empty());
    assert!(config.warmup_metrics.is_empty());
}

#[test]
fn test_config_from_file() {
    let config = ExperimentConfig::from_file(&name_wrapper("experiment.yaml"));
    assert_eq!(config.seed, 42);
    assert_eq!(config.event_limit, 1000000);
    assert!(config.stop_at_steady_state);
    assert_eq!(config.server_count(), 5);

    assert_eq!(config.outputs.len(), 2);
    let sojourn = &config.outputs[0].settings;
    assert_eq!(sojourn.mean_accuracy, 0.02);
    assert_eq!(sojourn.quantile, 0.99);
    assert_eq!(sojourn.quantile_accuracy, 0.05);
    assert_eq!(sojourn.warmup_samples, 0);
    assert_eq!(config.outputs[1].metric, StatName::WaitTime);
    assert_eq!(config.outputs[1].settings.warmup_samples, 100);

    assert_eq!(config.time_weighted_outputs[0].metric, TimeWeightedStatName::ServerPower);
    assert_eq!(config.time_weighted_outputs[0].window, 0.1);
    assert_eq!(
        config.warmup_metrics,
        vec![
            MetricName::Stat(StatName::SojournTime),
            MetricName::TimeWeighted(TimeWeightedStatName::ServerPower)
        ]
    );

    let capping = config.capping.as_ref().unwrap();
    assert_eq!(capping.period, 1.);
    assert_eq!(capping.global_cap, 600.);

    let first = &config.servers[0];
    assert_eq!(first.count, 4);
    assert_eq!(first.sockets, 2);
    assert_eq!(first.cores_per_socket, 4);
    assert_eq!(first.scheduler, Scheduler::BinPack);
    assert_eq!(first.core_policy, CorePolicy::CoreParking);
    assert_eq!(first.socket_policy, SocketPolicy::NoManagement);
    assert_eq!(first.power_policy, PowerPolicy::DelayBoundedNap { max_delay: 0.05 });
    assert_eq!(first.arrival, GeneratorConfig::Exponential { rate: 40. });
    assert_eq!(
        first.service,
        GeneratorConfig::Empirical {
            xs: vec![0., 0.1, 0.2],
            ys: vec![0., 0.5, 1.],
            scale: 2.
        }
    );

    let second = &config.servers[1];
    assert_eq!(second.count, 1);
    assert_eq!(second.scheduler, Scheduler::LoadBalance);
    assert_eq!(second.socket_policy, SocketPolicy::SocketParking);
    assert_eq!(second.power_policy, PowerPolicy::Batch { interval: 0.5 });
    assert_eq!(second.nap_power, 7.5);
    assert_eq!(second.nap_transition_time, 1e-3);
    assert_eq!(second.core.active, 20.);
    assert_eq!(second.core.idle, 3.2);
    assert_eq!(second.arrival, GeneratorConfig::Constant { value: 0.25 });
    assert_eq!(second.service, GeneratorConfig::Exponential { rate: 2. });
}

#[rstest]
#[case("{type: no_management}", PowerPolicy::NoManagement)]
#[case("{type: nap}", PowerPolicy::Nap)]
#[case("{type: delay_bounded_nap, max_delay: 0.1}", PowerPolicy::DelayBoundedNap { max_delay: 0.1 })]
#[case("{type: batch, interval: 2.0}", PowerPolicy::Batch { interval: 2. })]
fn test_power_policy(#[case] yaml: &str, #[case] expected: PowerPolicy) {
    let config = ExperimentConfig::from_str(&format!("servers:\n  - power_policy: {}\n", yaml));
    assert_eq!(config.servers[0].power_policy, expected);
}

#[test]
fn test_generator_build() {
    let mut constant = GeneratorConfig::Constant { value: 0.3 }.build(1);
    assert_eq!(constant.next(), 0.3);
    assert_eq!(constant.next(), 0.3);

    let mut first = GeneratorConfig::Exponential { rate: 5. }.build(7);
    let mut second = GeneratorConfig::Exponential { rate: 5. }.build(7);
    for _ in 0..10 {
        let value = first.next();
        assert!(value >= 0.);
        assert_eq!(value, second.next());
    }
}

#[test]
#[should_panic(expected = "Can't read file")]
fn test_missing_file() {
    ExperimentConfig::from_file(&name_wrapper("missing.yaml"));
}

#[test]
#[should_panic(expected = "Can't parse YAML config")]
fn test_unknown_policy() {
    ExperimentConfig::from_str("servers:\n  - power_policy:\n      type: sleep\n");
}
