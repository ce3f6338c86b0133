//! Names of the metrics produced by datacenter simulations.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Metrics sampled at discrete points (one value per job, period, etc).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatName {
    /// Length of a period during which a server had no jobs.
    IdlePeriodTime,
    /// Length of a period during which a server had at least one job.
    BusyPeriodTime,
    /// Time between job arrival and job completion.
    SojournTime,
    /// Time between job arrival and start of its service.
    WaitTime,
    /// Inter-arrival times drawn from the arrival generators.
    GeneratedArrivalTime,
    /// Job sizes drawn from the service generators.
    GeneratedServiceTime,
    /// Power removed from a single server by power capping.
    ServerLevelCap,
    /// Power removed from all servers by power capping during one period.
    TotalCapping,
}

/// Metrics that are continuously observed and integrated over time windows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeWeightedStatName {
    /// Average server power in W.
    ServerPower,
    /// Average server utilization.
    ServerUtilization,
    /// Fraction of servers without jobs.
    ServerIdleFraction,
}

/// Name of any tracked metric.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricName {
    /// Sampled metric.
    Stat(StatName),
    /// Time-weighted metric.
    TimeWeighted(TimeWeightedStatName),
}

impl From<StatName> for MetricName {
    fn from(name: StatName) -> Self {
        MetricName::Stat(name)
    }
}

impl From<TimeWeightedStatName> for MetricName {
    fn from(name: TimeWeightedStatName) -> Self {
        MetricName::TimeWeighted(name)
    }
}

impl Display for StatName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StatName::IdlePeriodTime => "IDLE_PERIOD_TIME",
            StatName::BusyPeriodTime => "BUSY_PERIOD_TIME",
            StatName::SojournTime => "SOJOURN_TIME",
            StatName::WaitTime => "WAIT_TIME",
            StatName::GeneratedArrivalTime => "GENERATED_ARRIVAL_TIME",
            StatName::GeneratedServiceTime => "GENERATED_SERVICE_TIME",
            StatName::ServerLevelCap => "SERVER_LEVEL_CAP",
            StatName::TotalCapping => "TOTAL_CAPPING",
        };
        write!(f, "{}", name)
    }
}

impl Display for TimeWeightedStatName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TimeWeightedStatName::ServerPower => "SERVER_POWER",
            TimeWeightedStatName::ServerUtilization => "SERVER_UTILIZATION",
            TimeWeightedStatName::ServerIdleFraction => "SERVER_IDLE_FRACTION",
        };
        write!(f, "{}", name)
    }
}

impl Display for MetricName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricName::Stat(name) => name.fmt(f),
            MetricName::TimeWeighted(name) => name.fmt(f),
        }
    }
}
