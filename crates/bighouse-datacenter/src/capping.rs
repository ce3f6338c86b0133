//! Datacenter-wide power capping.

use std::cell::RefCell;
use std::rc::Rc;

use bighouse_core::{log_trace, SimulationContext};
use bighouse_stats::{SimpleStatistic, StatName, StatsCollection};

use crate::config::CappingConfig;
use crate::events::DcEvent;
use crate::server::Server;

/// Periodically splits the global power budget between servers proportionally to their utilization
/// and enforces the budgets via DVFS.
pub struct PowerCappingEnforcer {
    period: f64,
    global_cap: f64,
    max_power: f64,
    min_power: f64,
    stats: Rc<RefCell<StatsCollection>>,
}

impl PowerCappingEnforcer {
    pub fn new(config: &CappingConfig, stats: Rc<RefCell<StatsCollection>>) -> Self {
        assert!(config.period > 0., "Capping period must be positive");
        Self {
            period: config.period,
            global_cap: config.global_cap,
            max_power: config.max_power,
            min_power: config.min_power,
            stats,
        }
    }

    pub fn period(&self) -> f64 {
        self.period
    }

    pub fn global_cap(&self) -> f64 {
        self.global_cap
    }

    pub fn max_power(&self) -> f64 {
        self.max_power
    }

    /// Schedules the first recalculation.
    pub fn start(&self, ctx: &mut SimulationContext<DcEvent>) {
        ctx.emit_self(DcEvent::RecalculateCaps, self.period);
    }

    pub fn recalculate_caps(&mut self, servers: &mut [Server], ctx: &mut SimulationContext<DcEvent>) {
        let total_power: f64 = servers.iter().map(|s| s.power()).sum();
        let total_util: f64 = servers.iter().map(|s| s.utilization()).sum();
        let fungible_power = self.global_cap - self.min_power;
        let power_rate = if total_util == 0. {
            1.
        } else {
            fungible_power / total_util
        };
        log_trace!(
            ctx,
            "recalculating caps: total power {:.3}, over limit {:.3}, power rate {:.3}",
            total_power,
            total_power - self.global_cap,
            power_rate
        );

        let mut server_cap = SimpleStatistic::new();
        for server in servers.iter_mut() {
            let allocated_power = power_rate * server.utilization() + server.idle_power();
            if allocated_power.is_nan() {
                panic!(
                    "Allocated power of server {} is NaN: power rate {}, total util {}",
                    server.index(),
                    power_rate,
                    total_util
                );
            }
            let ideal_power = server.power();
            server_cap.add_sample((ideal_power - allocated_power).max(0.));
            server.assign_power_budget(allocated_power, ctx);
        }

        {
            let mut stats = self.stats.borrow_mut();
            stats.add_sample(StatName::ServerLevelCap, server_cap.average().max(0.));
            stats.add_sample(StatName::TotalCapping, server_cap.total_accumulation());
        }
        ctx.emit_self(DcEvent::RecalculateCaps, self.period);
    }
}
