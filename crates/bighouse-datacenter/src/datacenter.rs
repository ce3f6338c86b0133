//! Datacenter component dispatching simulation events to servers.

use std::cell::RefCell;
use std::rc::Rc;

use bighouse_core::{log_info, Event, EventHandler, SimulationContext};
use bighouse_stats::{StatsCollection, TimeWeightedStatName};

use crate::capping::PowerCappingEnforcer;
use crate::events::DcEvent;
use crate::job::JobIdGenerator;
use crate::server::Server;

/// Owns all servers and the power capping loop, processes every [`DcEvent`]
/// and feeds the datacenter-wide time-weighted metrics.
pub struct DataCenter {
    ctx: SimulationContext<DcEvent>,
    servers: Vec<Server>,
    capping: Option<PowerCappingEnforcer>,
    job_ids: JobIdGenerator,
    stats: Rc<RefCell<StatsCollection>>,
    // last observed values of every server
    power: Vec<f64>,
    utilization: Vec<f64>,
    idle_fraction: Vec<f64>,
}

impl DataCenter {
    pub fn new(
        ctx: SimulationContext<DcEvent>,
        servers: Vec<Server>,
        capping: Option<PowerCappingEnforcer>,
        stats: Rc<RefCell<StatsCollection>>,
    ) -> Self {
        assert!(!servers.is_empty(), "Datacenter must have at least one server");
        let n = servers.len();
        Self {
            ctx,
            servers,
            capping,
            job_ids: JobIdGenerator::new(),
            stats,
            power: vec![0.; n],
            utilization: vec![0.; n],
            idle_fraction: vec![0.; n],
        }
    }

    /// Schedules the first arrivals of all servers and the first capping round.
    pub fn start(&mut self) {
        log_info!(self.ctx, "starting {} servers", self.servers.len());
        for server in self.servers.iter_mut() {
            server.start(&mut self.ctx, &mut self.job_ids);
        }
        if let Some(capping) = self.capping.as_ref() {
            capping.start(&mut self.ctx);
        }
        for i in 0..self.servers.len() {
            self.refresh_server(i);
        }
        self.update_metrics();
    }

    pub fn servers(&self) -> &[Server] {
        &self.servers
    }

    pub fn server(&self, index: usize) -> &Server {
        &self.servers[index]
    }

    /// Average server power.
    pub fn average_power(&self) -> f64 {
        self.power.iter().sum::<f64>() / self.servers.len() as f64
    }

    /// Average server utilization.
    pub fn average_utilization(&self) -> f64 {
        self.utilization.iter().sum::<f64>() / self.servers.len() as f64
    }

    /// Fraction of servers holding no job.
    pub fn idle_fraction(&self) -> f64 {
        self.idle_fraction.iter().sum::<f64>() / self.servers.len() as f64
    }

    fn refresh_server(&mut self, index: usize) {
        let server = &self.servers[index];
        self.power[index] = server.power();
        self.utilization[index] = server.utilization();
        self.idle_fraction[index] = server.idle_fraction();
    }

    fn update_metrics(&mut self) {
        let mut stats = self.stats.borrow_mut();
        if !stats.has_time_weighted() {
            return;
        }
        let time = self.ctx.time();
        stats.add_time_weighted_sample(TimeWeightedStatName::ServerPower, self.average_power(), time);
        stats.add_time_weighted_sample(TimeWeightedStatName::ServerUtilization, self.average_utilization(), time);
        stats.add_time_weighted_sample(TimeWeightedStatName::ServerIdleFraction, self.idle_fraction(), time);
    }
}

impl EventHandler<DcEvent> for DataCenter {
    fn on(&mut self, event: Event<DcEvent>) {
        let affected = event.data.server();
        match event.data {
            DcEvent::JobArrival { server, job } => {
                self.servers[server].handle_arrival(job, &mut self.ctx, &mut self.job_ids);
            }
            DcEvent::JobFinish { server, job_id } => {
                self.servers[server].finish_job(job_id, &mut self.ctx);
            }
            DcEvent::CoreEnteredPark { server, socket, core } => {
                self.servers[server].core_entered_park(socket, core);
            }
            DcEvent::CoreExitedPark { server, socket, core } => {
                self.servers[server].core_exited_park(socket, core, &mut self.ctx);
            }
            DcEvent::SocketEnteredPark { server, socket } => {
                self.servers[server].socket_entered_park(socket);
            }
            DcEvent::SocketExitedPark { server, socket } => {
                self.servers[server].socket_exited_park(socket, &mut self.ctx);
            }
            DcEvent::NapTransitionedToActive { server } => {
                self.servers[server].set_to_active(&mut self.ctx);
            }
            DcEvent::NapTransitionedToNap { server } => {
                self.servers[server].set_to_nap();
            }
            DcEvent::JobTimeout { server, job_id } => {
                self.servers[server].handle_timeout(job_id, &mut self.ctx);
            }
            DcEvent::StartBatch { server } => {
                self.servers[server].start_batch(&mut self.ctx);
            }
            DcEvent::RecalculateCaps => {
                let capping = self
                    .capping
                    .as_mut()
                    .unwrap_or_else(|| panic!("Received RecalculateCaps without power capping"));
                capping.recalculate_caps(&mut self.servers, &mut self.ctx);
            }
        }
        match affected {
            Some(server) => self.refresh_server(server),
            None => {
                for i in 0..self.servers.len() {
                    self.refresh_server(i);
                }
            }
        }
        self.update_metrics();
    }
}
