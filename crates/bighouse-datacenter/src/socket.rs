//! Processor socket grouping several cores.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use bighouse_core::{log_debug, EventId, SimulationContext};

use crate::cpu_core::{Core, CorePolicy};
use crate::events::DcEvent;
use crate::job::{Job, JobId};
use crate::power::{CorePowerConfig, SocketPowerConfig};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum SocketState {
    Active,
    TransitioningToLowPowerIdle,
    TransitioningToActive,
    LowPowerIdle,
}

/// What a socket does when all of its cores become idle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SocketPolicy {
    NoManagement,
    SocketParking,
}

impl Default for SocketPolicy {
    fn default() -> Self {
        SocketPolicy::NoManagement
    }
}

/// A socket runs jobs on its cores and can be parked as a whole when it has nothing to do.
///
/// Jobs arriving while the socket is parked or changing state wait in a transition buffer
/// and are placed on cores once the socket is active again.
pub struct Socket {
    server: usize,
    index: usize,
    cores: Vec<Core>,
    available: Vec<usize>,
    busy: Vec<usize>,
    job_to_core: HashMap<JobId, usize>,
    state: SocketState,
    policy: SocketPolicy,
    transition_buffer: Vec<Job>,
    transition_event: Option<EventId>,
    power: SocketPowerConfig,
}

impl Socket {
    pub fn new(
        server: usize,
        index: usize,
        core_count: usize,
        core_policy: CorePolicy,
        core_power: CorePowerConfig,
        policy: SocketPolicy,
        power: SocketPowerConfig,
    ) -> Self {
        assert!(core_count > 0, "Socket must have at least one core");
        let cores = (0..core_count)
            .map(|i| Core::new(server, index, i, core_policy, core_power))
            .collect();
        Self {
            server,
            index,
            cores,
            available: (0..core_count).collect(),
            busy: Vec::new(),
            job_to_core: HashMap::new(),
            state: SocketState::Active,
            policy,
            transition_buffer: Vec::new(),
            transition_event: None,
            power,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn state(&self) -> SocketState {
        self.state
    }

    pub fn cores(&self) -> &[Core] {
        &self.cores
    }

    pub fn core(&self, index: usize) -> &Core {
        &self.cores[index]
    }

    pub fn insert_job(&mut self, job: Job, ctx: &mut SimulationContext<DcEvent>) {
        match self.state {
            SocketState::Active => {
                if self.available.is_empty() {
                    panic!("Socket {}/{} has no available core for job {}", self.server, self.index, job.id());
                }
                let core = self.available.remove(0);
                self.job_to_core.insert(job.id(), core);
                self.busy.push(core);
                self.cores[core].insert_job(job, ctx);
            }
            SocketState::TransitioningToLowPowerIdle => {
                self.transition_buffer.push(job);
                if let Some(event) = self.transition_event.take() {
                    ctx.cancel_event(event);
                }
                self.begin_exit_park(ctx);
            }
            SocketState::TransitioningToActive => {
                self.transition_buffer.push(job);
            }
            SocketState::LowPowerIdle => {
                self.transition_buffer.push(job);
                self.begin_exit_park(ctx);
            }
        }
    }

    fn begin_exit_park(&mut self, ctx: &mut SimulationContext<DcEvent>) {
        self.state = SocketState::TransitioningToActive;
        let event = ctx.emit_self(
            DcEvent::SocketExitedPark {
                server: self.server,
                socket: self.index,
            },
            self.power.park_transition_time,
        );
        self.transition_event = Some(event);
    }

    /// Removes a finished job from its core.
    pub fn remove_job(&mut self, job_id: JobId, job_waiting: bool, ctx: &mut SimulationContext<DcEvent>) -> Job {
        let core = self
            .job_to_core
            .remove(&job_id)
            .unwrap_or_else(|| panic!("Job {} does not run on socket {}/{}", job_id, self.server, self.index));
        let job = self.cores[core].remove_job(job_id, job_waiting, ctx);
        let pos = self
            .busy
            .iter()
            .position(|c| *c == core)
            .unwrap_or_else(|| panic!("Core {} of socket {} is not on the busy list", core, self.index));
        self.busy.remove(pos);
        self.available.push(core);

        if self.busy.is_empty() && !job_waiting && self.policy == SocketPolicy::SocketParking {
            self.state = SocketState::TransitioningToLowPowerIdle;
            let event = ctx.emit_self(
                DcEvent::SocketEnteredPark {
                    server: self.server,
                    socket: self.index,
                },
                self.power.park_transition_time,
            );
            self.transition_event = Some(event);
            log_debug!(ctx, "socket {}/{} is entering park", self.server, self.index);
        }
        job
    }

    /// Jobs placed on cores or waiting in the transition buffer.
    pub(crate) fn held_jobs_mut(&mut self) -> impl Iterator<Item = &mut Job> {
        self.cores
            .iter_mut()
            .filter_map(|c| c.job_mut())
            .chain(self.transition_buffer.iter_mut())
    }

    pub fn running_jobs(&self) -> impl Iterator<Item = &Job> {
        self.cores.iter().filter_map(|c| c.job())
    }

    pub fn enter_park(&mut self) {
        if !self.busy.is_empty() {
            panic!("Socket {}/{} tried to enter park with busy cores", self.server, self.index);
        }
        self.transition_event = None;
        self.state = SocketState::LowPowerIdle;
    }

    pub fn exit_park(&mut self, ctx: &mut SimulationContext<DcEvent>) {
        self.transition_event = None;
        self.state = SocketState::Active;
        for job in std::mem::take(&mut self.transition_buffer) {
            self.insert_job(job, ctx);
        }
    }

    pub fn core_entered_park(&mut self, core: usize) {
        self.cores[core].enter_park();
    }

    pub fn core_exited_park(&mut self, core: usize, ctx: &mut SimulationContext<DcEvent>) {
        self.cores[core].exit_park(ctx);
    }

    /// Number of jobs this socket can still accept.
    pub fn remaining_capacity(&self) -> usize {
        self.available.len().saturating_sub(self.transition_buffer.len())
    }

    pub fn total_capacity(&self) -> usize {
        self.cores.len()
    }

    pub fn jobs_in_service(&self) -> usize {
        self.busy.len()
    }

    pub fn jobs_in_transition(&self) -> usize {
        self.transition_buffer.len()
    }

    /// Fraction of cores that are busy or reserved by buffered jobs.
    pub fn utilization(&self) -> f64 {
        (self.busy.len() + self.transition_buffer.len()) as f64 / self.cores.len() as f64
    }

    pub fn pause(&mut self, ctx: &mut SimulationContext<DcEvent>) {
        for core in self.cores.iter_mut() {
            core.pause(ctx);
        }
    }

    pub fn resume(&mut self, ctx: &mut SimulationContext<DcEvent>) {
        for core in self.cores.iter_mut() {
            core.resume(ctx);
        }
    }

    pub fn set_dvfs_speed(&mut self, speed: f64, ctx: &mut SimulationContext<DcEvent>) {
        for core in self.cores.iter_mut() {
            core.set_dvfs_speed(speed, ctx);
        }
    }

    pub fn power(&self) -> f64 {
        self.dynamic_power() + self.idle_power()
    }

    /// Idle power of the socket and its cores.
    ///
    /// While the socket enters or leaves the parked state, its cores are already halted,
    /// so only the socket's own active idle power is counted.
    pub fn idle_power(&self) -> f64 {
        match self.state {
            SocketState::Active => self.cores.iter().map(|c| c.idle_power()).sum::<f64>() + self.power.active_idle,
            SocketState::TransitioningToActive | SocketState::TransitioningToLowPowerIdle => self.power.active_idle,
            SocketState::LowPowerIdle => self.power.park,
        }
    }

    pub fn dynamic_power(&self) -> f64 {
        self.cores.iter().map(|c| c.dynamic_power()).sum()
    }
}
