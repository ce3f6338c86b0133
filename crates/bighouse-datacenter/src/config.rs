//! Experiment configuration.

use serde::{Deserialize, Serialize};

use bighouse_stats::{MetricName, StatName, StatisticSettings, TimeWeightedStatName};
use bighouse_workload::{ConstantGenerator, EmpiricalDistribution, EmpiricalGenerator, ExponentialGenerator, Generator};

use crate::cpu_core::CorePolicy;
use crate::power::{CorePowerConfig, PlatformPowerConfig, SocketPowerConfig};
use crate::server::{PowerPolicy, Scheduler};
use crate::socket::SocketPolicy;

/// Holds raw experiment config parsed from YAML file.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
struct RawExperimentConfig {
    pub seed: Option<u64>,
    pub event_limit: Option<u64>,
    pub stop_at_steady_state: Option<bool>,
    pub servers: Option<Vec<ServerConfig>>,
    pub capping: Option<CappingConfig>,
    pub outputs: Option<Vec<OutputConfig>>,
    pub time_weighted_outputs: Option<Vec<TimeWeightedOutputConfig>>,
    pub warmup_metrics: Option<Vec<MetricName>>,
}

/// Source of inter-arrival or service times.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GeneratorConfig {
    /// Always returns the same value.
    Constant { value: f64 },
    /// Exponentially distributed values with the given rate.
    Exponential { rate: f64 },
    /// Inverse-CDF sampling of an empirical distribution, values are multiplied by `scale`.
    Empirical {
        xs: Vec<f64>,
        ys: Vec<f64>,
        #[serde(default = "default_scale")]
        scale: f64,
    },
}

fn default_scale() -> f64 {
    1.
}

impl GeneratorConfig {
    /// Creates the configured generator. Random generators are seeded with `seed`.
    pub fn build(&self, seed: u64) -> Box<dyn Generator> {
        match self {
            GeneratorConfig::Constant { value } => Box::new(ConstantGenerator::new(*value)),
            GeneratorConfig::Exponential { rate } => Box::new(ExponentialGenerator::new(*rate, seed)),
            GeneratorConfig::Empirical { xs, ys, scale } => Box::new(EmpiricalGenerator::new(
                EmpiricalDistribution::new(xs.clone(), ys.clone()),
                *scale,
                seed,
            )),
        }
    }
}

/// Holds configuration of a single server or a set of identical servers.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    /// Number of such servers.
    pub count: usize,
    pub sockets: usize,
    pub cores_per_socket: usize,
    /// Placement of jobs across sockets.
    pub scheduler: Scheduler,
    pub core_policy: CorePolicy,
    pub socket_policy: SocketPolicy,
    /// Server-level low-power policy.
    pub power_policy: PowerPolicy,
    /// Time to enter or leave the nap state.
    pub nap_transition_time: f64,
    /// Server power while napping.
    pub nap_power: f64,
    pub core: CorePowerConfig,
    pub socket: SocketPowerConfig,
    pub platform: PlatformPowerConfig,
    /// Inter-arrival times of jobs.
    pub arrival: GeneratorConfig,
    /// Sizes of jobs.
    pub service: GeneratorConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            count: 1,
            sockets: 1,
            cores_per_socket: 1,
            scheduler: Scheduler::default(),
            core_policy: CorePolicy::default(),
            socket_policy: SocketPolicy::default(),
            power_policy: PowerPolicy::default(),
            nap_transition_time: 1e-3,
            nap_power: 5.,
            core: CorePowerConfig::default(),
            socket: SocketPowerConfig::default(),
            platform: PlatformPowerConfig::default(),
            arrival: GeneratorConfig::Exponential { rate: 1. },
            service: GeneratorConfig::Exponential { rate: 2. },
        }
    }
}

/// Holds configuration of the datacenter power capping loop.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct CappingConfig {
    /// Period of budget recalculation in seconds.
    pub period: f64,
    /// Power budget of the whole datacenter.
    pub global_cap: f64,
    pub max_power: f64,
    /// Power which is never redistributed (sum of server idle powers).
    pub min_power: f64,
}

/// Holds configuration of a tracked sampled metric.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct OutputConfig {
    pub metric: StatName,
    #[serde(flatten)]
    pub settings: StatisticSettings,
}

/// Holds configuration of a tracked time-weighted metric.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct TimeWeightedOutputConfig {
    pub metric: TimeWeightedStatName,
    /// Length of the averaging window in seconds.
    #[serde(default = "default_window")]
    pub window: f64,
    #[serde(flatten)]
    pub settings: StatisticSettings,
}

fn default_window() -> f64 {
    bighouse_stats::time_weighted::DEFAULT_WINDOW
}

/// Represents experiment configuration.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct ExperimentConfig {
    /// Seed of the simulation, generator seeds are derived from it.
    pub seed: u64,
    /// Maximal number of processed events, 0 means no limit.
    pub event_limit: u64,
    /// Whether to stop as soon as every metric is in steady state instead of waiting for convergence.
    pub stop_at_steady_state: bool,
    /// Configurations of servers.
    pub servers: Vec<ServerConfig>,
    /// Power capping, disabled if absent.
    pub capping: Option<CappingConfig>,
    /// Sampled metrics which must converge.
    pub outputs: Vec<OutputConfig>,
    /// Time-weighted metrics which must converge.
    pub time_weighted_outputs: Vec<TimeWeightedOutputConfig>,
    /// Metrics taking part in the warm-up barrier.
    pub warmup_metrics: Vec<MetricName>,
}

impl ExperimentConfig {
    /// Creates experiment config by reading parameter values from YAML file
    /// (uses default values if some parameters are absent).
    pub fn from_file(file_name: &str) -> Self {
        let raw: RawExperimentConfig = serde_yaml::from_str(
            &std::fs::read_to_string(file_name).unwrap_or_else(|_| panic!("Can't read file {}", file_name)),
        )
        .unwrap_or_else(|e| panic!("Can't parse YAML from file {}: {}", file_name, e));
        Self::from_raw(raw)
    }

    /// Creates experiment config from YAML string.
    pub fn from_str(yaml: &str) -> Self {
        let raw: RawExperimentConfig =
            serde_yaml::from_str(yaml).unwrap_or_else(|e| panic!("Can't parse YAML config: {}", e));
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawExperimentConfig) -> Self {
        Self {
            seed: raw.seed.unwrap_or(123),
            event_limit: raw.event_limit.unwrap_or(0),
            stop_at_steady_state: raw.stop_at_steady_state.unwrap_or(false),
            servers: raw.servers.unwrap_or_else(|| vec![ServerConfig::default()]),
            capping: raw.capping,
            outputs: raw.outputs.unwrap_or_else(|| {
                vec![OutputConfig {
                    metric: StatName::SojournTime,
                    settings: StatisticSettings::default(),
                }]
            }),
            time_weighted_outputs: raw.time_weighted_outputs.unwrap_or_default(),
            warmup_metrics: raw.warmup_metrics.unwrap_or_default(),
        }
    }

    /// Total number of servers.
    pub fn server_count(&self) -> usize {
        self.servers.iter().map(|s| s.count).sum()
    }
}
