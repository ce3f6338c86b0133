//! Power consumption models of server components.

use dyn_clone::{clone_trait_object, DynClone};
use serde::{Deserialize, Serialize};

/// Minimal DVFS speed which can be assigned by a power budget.
pub const MIN_DVFS_SPEED: f64 = 0.5;

/// A model for estimating the power consumption of a server component based on the server utilization.
pub trait PowerModel: DynClone {
    /// Returns power consumption in W.
    ///
    /// Utilization should be passed as a float in 0.0-1.0 range.
    fn get_power(&self, utilization: f64) -> f64;
}

clone_trait_object!(PowerModel);

/// A power model based on linear interpolation between idle and full-load consumption.
#[derive(Clone)]
pub struct LinearPowerModel {
    idle_power: f64,
    dynamic_power: f64,
}

impl LinearPowerModel {
    /// Creates a linear power model.
    ///
    /// * `idle_power` - The power consumption in Watts at 0% utilization.
    /// * `dynamic_power` - The power added at 100% utilization.
    pub fn new(idle_power: f64, dynamic_power: f64) -> Self {
        Self {
            idle_power,
            dynamic_power,
        }
    }
}

impl PowerModel for LinearPowerModel {
    fn get_power(&self, utilization: f64) -> f64 {
        self.idle_power + self.dynamic_power * utilization
    }
}

/// Power of a core in each of its states.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorePowerConfig {
    /// Power of a busy core at full speed.
    pub active: f64,
    /// Power of an idle (halted) core.
    pub idle: f64,
    /// Power of a parked core.
    pub park: f64,
    /// Time to enter or leave the parked state.
    pub park_transition_time: f64,
}

impl Default for CorePowerConfig {
    fn default() -> Self {
        Self {
            active: 16.,
            idle: 16. / 5.,
            park: 0.,
            park_transition_time: 100e-6,
        }
    }
}

/// Power of the uncore part of a socket.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SocketPowerConfig {
    /// Power of an active socket in addition to its cores.
    pub active_idle: f64,
    /// Power of a parked socket including its cores.
    pub park: f64,
    /// Time to enter or leave the parked state.
    pub park_transition_time: f64,
}

impl Default for SocketPowerConfig {
    fn default() -> Self {
        Self {
            active_idle: 8.,
            park: 0.,
            park_transition_time: 500e-6,
        }
    }
}

/// Power of the non-CPU server components, each modeled linearly in the server utilization.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformPowerConfig {
    pub memory_idle: f64,
    pub memory_dynamic: f64,
    pub disk_idle: f64,
    pub disk_dynamic: f64,
    pub other_idle: f64,
    pub other_dynamic: f64,
    /// Peak server power, used for power budgeting.
    pub max_power: f64,
    /// Peak CPU dynamic power, the only part scalable with DVFS.
    pub max_cpu_dynamic_power: f64,
}

impl Default for PlatformPowerConfig {
    fn default() -> Self {
        Self {
            memory_idle: 25.,
            memory_dynamic: 10.,
            disk_idle: 9.,
            disk_dynamic: 1.,
            other_idle: 10.,
            other_dynamic: 5.,
            max_power: 100.,
            max_cpu_dynamic_power: 25.,
        }
    }
}

/// Computes the power of memory, disk and other server components.
#[derive(Clone)]
pub struct PlatformPowerModel {
    memory: Box<dyn PowerModel>,
    disk: Box<dyn PowerModel>,
    other: Box<dyn PowerModel>,
    max_power: f64,
    max_cpu_dynamic_power: f64,
}

impl PlatformPowerModel {
    pub fn new(
        memory: Box<dyn PowerModel>,
        disk: Box<dyn PowerModel>,
        other: Box<dyn PowerModel>,
        max_power: f64,
        max_cpu_dynamic_power: f64,
    ) -> Self {
        Self {
            memory,
            disk,
            other,
            max_power,
            max_cpu_dynamic_power,
        }
    }

    pub fn from_config(config: &PlatformPowerConfig) -> Self {
        Self::new(
            Box::new(LinearPowerModel::new(config.memory_idle, config.memory_dynamic)),
            Box::new(LinearPowerModel::new(config.disk_idle, config.disk_dynamic)),
            Box::new(LinearPowerModel::new(config.other_idle, config.other_dynamic)),
            config.max_power,
            config.max_cpu_dynamic_power,
        )
    }

    pub fn idle_power(&self) -> f64 {
        self.memory.get_power(0.) + self.disk.get_power(0.) + self.other.get_power(0.)
    }

    pub fn dynamic_power(&self, utilization: f64) -> f64 {
        self.memory.get_power(utilization) + self.disk.get_power(utilization) + self.other.get_power(utilization)
            - self.idle_power()
    }

    pub fn max_power(&self) -> f64 {
        self.max_power
    }

    pub fn max_cpu_dynamic_power(&self) -> f64 {
        self.max_cpu_dynamic_power
    }

    /// Returns the DVFS speed which keeps the server within the allocated power.
    ///
    /// CPU dynamic power is cubic in the speed, the result is clamped to `[MIN_DVFS_SPEED, 1]`.
    pub fn dvfs_speed_for_budget(&self, allocated_power: f64) -> f64 {
        let non_scalable_power = self.max_power - self.max_cpu_dynamic_power;
        if allocated_power < non_scalable_power {
            MIN_DVFS_SPEED
        } else if allocated_power > self.max_power {
            1.
        } else {
            ((allocated_power - non_scalable_power) / self.max_cpu_dynamic_power)
                .cbrt()
                .max(MIN_DVFS_SPEED)
        }
    }
}

impl Default for PlatformPowerModel {
    fn default() -> Self {
        Self::from_config(&PlatformPowerConfig::default())
    }
}
