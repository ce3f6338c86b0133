//! Server with its job queue, socket placement and server-level power policies.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use bighouse_core::{log_debug, log_warn, EventId, SimulationContext};
use bighouse_stats::{StatName, StatsCollection};
use bighouse_workload::Generator;

use crate::config::ServerConfig;
use crate::events::DcEvent;
use crate::job::{Job, JobId, JobIdGenerator};
use crate::power::PlatformPowerModel;
use crate::socket::Socket;

/// Placement of jobs across sockets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scheduler {
    /// The least utilized socket with a free core.
    LoadBalance,
    /// The most utilized socket with a free core.
    BinPack,
}

impl Default for Scheduler {
    fn default() -> Self {
        Scheduler::LoadBalance
    }
}

/// Server-level low-power policy.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PowerPolicy {
    /// The server is always active.
    NoManagement,
    /// The server naps whenever it has no job in service and wakes up on the first arrival.
    Nap,
    /// The server naps whenever it cannot fill all of its cores and holds arriving jobs
    /// on paused cores, waking up when a held job has waited for `max_delay` seconds
    /// or when there are enough jobs to fill every core.
    DelayBoundedNap { max_delay: f64 },
    /// Arrivals are buffered and admitted every `interval` seconds, the server naps in between.
    Batch { interval: f64 },
}

impl Default for PowerPolicy {
    fn default() -> Self {
        PowerPolicy::NoManagement
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum NapState {
    Active,
    TransitioningToActive,
    TransitioningToNap,
    Nap,
}

pub struct Server {
    index: usize,
    sockets: Vec<Socket>,
    queue: VecDeque<Job>,
    job_to_socket: HashMap<JobId, usize>,
    scheduler: Scheduler,
    // jobs in the queue, in service and in socket transition buffers
    jobs_in_server: usize,
    paused: bool,
    arrival: Box<dyn Generator>,
    service: Box<dyn Generator>,
    platform: PlatformPowerModel,
    power_policy: PowerPolicy,
    nap_state: NapState,
    nap_transition_time: f64,
    nap_power: f64,
    // pending transition to nap and its time
    nap_event: Option<(EventId, f64)>,
    timeouts: HashMap<JobId, EventId>,
    timed_out: Vec<JobId>,
    batch_buffer: Vec<Job>,
    // start of the current idle or busy period
    period_start: f64,
    stats: Rc<RefCell<StatsCollection>>,
}

impl Server {
    pub fn new(
        index: usize,
        config: &ServerConfig,
        arrival: Box<dyn Generator>,
        service: Box<dyn Generator>,
        stats: Rc<RefCell<StatsCollection>>,
    ) -> Self {
        assert!(config.sockets > 0, "Server must have at least one socket");
        let sockets = (0..config.sockets)
            .map(|i| {
                Socket::new(
                    index,
                    i,
                    config.cores_per_socket,
                    config.core_policy,
                    config.core,
                    config.socket_policy,
                    config.socket,
                )
            })
            .collect();
        Self {
            index,
            sockets,
            queue: VecDeque::new(),
            job_to_socket: HashMap::new(),
            scheduler: config.scheduler,
            jobs_in_server: 0,
            paused: false,
            arrival,
            service,
            platform: PlatformPowerModel::from_config(&config.platform),
            power_policy: config.power_policy,
            nap_state: NapState::Active,
            nap_transition_time: config.nap_transition_time,
            nap_power: config.nap_power,
            nap_event: None,
            timeouts: HashMap::new(),
            timed_out: Vec::new(),
            batch_buffer: Vec::new(),
            period_start: 0.,
            stats,
        }
    }

    /// Schedules the first arrival and puts napping servers to sleep.
    pub fn start(&mut self, ctx: &mut SimulationContext<DcEvent>, job_ids: &mut JobIdGenerator) {
        self.period_start = ctx.time();
        if self.power_policy != PowerPolicy::NoManagement {
            self.nap_state = NapState::Nap;
            self.pause(ctx);
        }
        if let PowerPolicy::Batch { interval } = self.power_policy {
            ctx.emit_self(DcEvent::StartBatch { server: self.index }, interval);
        }
        self.create_new_arrival(ctx, job_ids);
    }

    fn create_new_arrival(&mut self, ctx: &mut SimulationContext<DcEvent>, job_ids: &mut JobIdGenerator) {
        let interarrival_time = self.arrival.next();
        let service_time = self.service.next();
        {
            let mut stats = self.stats.borrow_mut();
            stats.add_sample(StatName::GeneratedArrivalTime, interarrival_time);
            stats.add_sample(StatName::GeneratedServiceTime, service_time);
        }
        let job = Job::new(job_ids.next_id(), service_time);
        ctx.emit_self(
            DcEvent::JobArrival {
                server: self.index,
                job,
            },
            interarrival_time,
        );
    }

    /// Admits an arrived job and schedules the next arrival.
    pub fn handle_arrival(&mut self, mut job: Job, ctx: &mut SimulationContext<DcEvent>, job_ids: &mut JobIdGenerator) {
        job.mark_arrival(ctx.time());
        self.create_new_arrival(ctx, job_ids);
        self.insert_job(job, ctx);
    }

    pub fn insert_job(&mut self, job: Job, ctx: &mut SimulationContext<DcEvent>) {
        match self.power_policy {
            PowerPolicy::NoManagement => self.admit(job, ctx),
            PowerPolicy::Nap => self.nap_insert(job, ctx),
            PowerPolicy::DelayBoundedNap { max_delay } => self.delay_bounded_insert(job, max_delay, ctx),
            PowerPolicy::Batch { .. } => self.batch_buffer.push(job),
        }
    }

    /// Starts the job if there is a free core, otherwise puts it in the queue.
    fn admit(&mut self, job: Job, ctx: &mut SimulationContext<DcEvent>) {
        if self.remaining_capacity() == 0 {
            self.queue.push_back(job);
        } else {
            self.start_job_service(job, ctx);
        }
        self.job_entered(ctx.time());
        self.check_bookkeeping();
    }

    fn enqueue(&mut self, job: Job, ctx: &mut SimulationContext<DcEvent>) {
        self.queue.push_back(job);
        self.job_entered(ctx.time());
        self.check_bookkeeping();
    }

    fn nap_insert(&mut self, job: Job, ctx: &mut SimulationContext<DcEvent>) {
        match self.nap_state {
            NapState::Active => self.admit(job, ctx),
            NapState::Nap | NapState::TransitioningToNap => {
                self.transition_to_active(ctx);
                self.enqueue(job, ctx);
            }
            NapState::TransitioningToActive => self.enqueue(job, ctx),
        }
    }

    fn delay_bounded_insert(&mut self, job: Job, max_delay: f64, ctx: &mut SimulationContext<DcEvent>) {
        if !self.is_napping() && !self.paused {
            self.nap_insert(job, ctx);
        } else if self.jobs_in_service() + self.queue.len() + 1 >= self.total_capacity() {
            // enough work to fill every core
            if self.nap_state != NapState::TransitioningToActive {
                self.transition_to_active(ctx);
            }
            self.nap_insert(job, ctx);
        } else if self.nap_state == NapState::TransitioningToActive {
            self.nap_insert(job, ctx);
        } else if self.remaining_capacity() > 0 {
            // hold the job on a paused core
            let job_id = job.id();
            self.admit(job, ctx);
            let event = ctx.emit_self(
                DcEvent::JobTimeout {
                    server: self.index,
                    job_id,
                },
                max_delay,
            );
            self.timeouts.insert(job_id, event);
        } else {
            self.enqueue(job, ctx);
        }
    }

    fn start_job_service(&mut self, mut job: Job, ctx: &mut SimulationContext<DcEvent>) {
        let mut target: Option<(usize, f64)> = None;
        for (i, socket) in self.sockets.iter().enumerate() {
            if socket.remaining_capacity() == 0 {
                continue;
            }
            let utilization = socket.utilization();
            let better = match (target, self.scheduler) {
                (None, _) => true,
                (Some((_, best)), Scheduler::LoadBalance) => utilization < best,
                (Some((_, best)), Scheduler::BinPack) => utilization > best,
            };
            if better {
                target = Some((i, utilization));
            }
        }
        let socket = match target {
            Some((socket, _)) => socket,
            None => panic!("Server {} has no socket with a free core for job {}", self.index, job.id()),
        };
        job.mark_start(ctx.time());
        self.job_to_socket.insert(job.id(), socket);
        self.sockets[socket].insert_job(job, ctx);
    }

    /// Removes the finished job, records its metrics and applies the power policy.
    pub fn finish_job(&mut self, job_id: JobId, ctx: &mut SimulationContext<DcEvent>) {
        if let PowerPolicy::DelayBoundedNap { .. } = self.power_policy {
            if self.paused {
                panic!(
                    "Server {} finished job {} while paused at time {}",
                    self.index,
                    job_id,
                    ctx.time()
                );
            }
            if self.is_napping() {
                panic!(
                    "Server {} finished job {} while napping at time {}",
                    self.index,
                    job_id,
                    ctx.time()
                );
            }
        }

        let mut job = self.remove_job(job_id, ctx);
        job.mark_finish(ctx.time());
        self.record_job_metrics(&job);

        match self.power_policy {
            PowerPolicy::NoManagement => {}
            PowerPolicy::Nap | PowerPolicy::Batch { .. } => {
                if self.jobs_in_service() == 0 {
                    self.transition_to_nap(ctx);
                }
            }
            PowerPolicy::DelayBoundedNap { .. } => {
                self.timed_out.retain(|id| *id != job_id);
                if self.jobs_in_service() + self.queue.len() < self.total_capacity()
                    && self.timed_out.is_empty()
                    && self.nap_state != NapState::TransitioningToNap
                {
                    self.transition_to_nap(ctx);
                }
            }
        }
    }

    fn remove_job(&mut self, job_id: JobId, ctx: &mut SimulationContext<DcEvent>) -> Job {
        let socket = self
            .job_to_socket
            .remove(&job_id)
            .unwrap_or_else(|| panic!("Job {} is not mapped to a socket of server {}", job_id, self.index));
        let job_waiting = !self.queue.is_empty();
        let job = self.sockets[socket].remove_job(job_id, job_waiting, ctx);
        if let Some(next) = self.queue.pop_front() {
            self.start_job_service(next, ctx);
        }
        self.job_left(ctx.time());
        self.check_bookkeeping();
        job
    }

    fn record_job_metrics(&self, job: &Job) {
        let sojourn_time = job
            .sojourn_time()
            .unwrap_or_else(|| panic!("Job {} finished without arrival time", job.id()));
        if sojourn_time < 0. {
            panic!("Job {} has negative sojourn time {}", job.id(), sojourn_time);
        }
        let wait_time = job
            .wait_time()
            .unwrap_or_else(|| panic!("Job {} finished without start time", job.id()));
        if wait_time < 0. {
            panic!("Job {} has negative wait time {}", job.id(), wait_time);
        }
        let mut stats = self.stats.borrow_mut();
        stats.add_sample(StatName::SojournTime, sojourn_time);
        stats.add_sample(StatName::WaitTime, wait_time);
    }

    fn job_entered(&mut self, time: f64) {
        if self.jobs_in_server == 0 {
            self.stats
                .borrow_mut()
                .add_sample(StatName::IdlePeriodTime, time - self.period_start);
            self.period_start = time;
        }
        self.jobs_in_server += 1;
    }

    fn job_left(&mut self, time: f64) {
        self.jobs_in_server -= 1;
        if self.jobs_in_server == 0 {
            self.stats
                .borrow_mut()
                .add_sample(StatName::BusyPeriodTime, time - self.period_start);
            self.period_start = time;
        }
    }

    /// Panics if the job counter does not match the jobs held by the server.
    pub fn check_bookkeeping(&self) {
        let jobs_in_system = self.queue.len() + self.jobs_in_service() + self.jobs_in_transition();
        if jobs_in_system != self.jobs_in_server {
            panic!(
                "Job balance is off on server {}: counted {} jobs but holds {} (queue {}, in service {}, in transition {})",
                self.index,
                self.jobs_in_server,
                jobs_in_system,
                self.queue.len(),
                self.jobs_in_service(),
                self.jobs_in_transition()
            );
        }
    }

    /// Starts waking up from nap. A pending transition to nap is canceled,
    /// its remaining time is added to the wake-up delay.
    pub fn transition_to_active(&mut self, ctx: &mut SimulationContext<DcEvent>) {
        if !self.is_napping() {
            panic!("Server {} is transitioning to active when not napping", self.index);
        }
        if !self.paused {
            panic!("Server {} is transitioning to active when not paused", self.index);
        }
        let mut extra_delay = 0.;
        if let Some((event, nap_time)) = self.nap_event.take() {
            extra_delay = nap_time - ctx.time();
            ctx.cancel_event(event);
        }
        self.nap_state = NapState::TransitioningToActive;
        ctx.emit_self(
            DcEvent::NapTransitionedToActive { server: self.index },
            extra_delay + self.nap_transition_time,
        );
        log_debug!(ctx, "server {} is waking up", self.index);
    }

    /// Pauses all cores and starts entering nap.
    pub fn transition_to_nap(&mut self, ctx: &mut SimulationContext<DcEvent>) {
        if self.is_napping() {
            panic!("Server {} is transitioning to nap when napping", self.index);
        }
        if self.paused {
            panic!("Server {} is transitioning to nap when paused", self.index);
        }
        self.nap_state = NapState::TransitioningToNap;
        let event = ctx.emit_self(
            DcEvent::NapTransitionedToNap { server: self.index },
            self.nap_transition_time,
        );
        self.nap_event = Some((event, ctx.time() + self.nap_transition_time));
        self.pause(ctx);
        log_debug!(ctx, "server {} is entering nap", self.index);

        if let PowerPolicy::DelayBoundedNap { max_delay } = self.power_policy {
            let time = ctx.time();
            for socket in self.sockets.iter_mut() {
                for job in socket.held_jobs_mut() {
                    let start_time = job
                        .start_time()
                        .unwrap_or_else(|| panic!("Job {} runs without start time", job.id()));
                    let amount_delayed = time - start_time - job.amount_completed();
                    if amount_delayed < -1e-9 {
                        panic!("Job {} has negative delay {}", job.id(), amount_delayed);
                    }
                    let amount_delayed = amount_delayed.max(0.);
                    let mut budget = max_delay - amount_delayed;
                    if budget < 0. {
                        log_warn!(
                            ctx,
                            "job {} is already delayed by {} which exceeds max delay {}",
                            job.id(),
                            amount_delayed,
                            max_delay
                        );
                        budget = 0.;
                    }
                    job.set_amount_delayed(amount_delayed);
                    let event = ctx.emit_self(
                        DcEvent::JobTimeout {
                            server: self.index,
                            job_id: job.id(),
                        },
                        budget,
                    );
                    if self.timeouts.insert(job.id(), event).is_some() {
                        panic!("Job {} already has a timeout", job.id());
                    }
                }
            }
        }
    }

    /// Completes the wake-up and starts queued jobs.
    pub fn set_to_active(&mut self, ctx: &mut SimulationContext<DcEvent>) {
        if let PowerPolicy::DelayBoundedNap { .. } = self.power_policy {
            self.cancel_timeouts(ctx);
        }
        self.nap_state = NapState::Active;
        self.resume(ctx);
    }

    fn cancel_timeouts(&mut self, ctx: &mut SimulationContext<DcEvent>) {
        for socket in self.sockets.iter() {
            for job in socket.running_jobs() {
                if !self.timeouts.contains_key(&job.id()) && !self.timed_out.contains(&job.id()) {
                    panic!(
                        "Job {} on server {} has neither a timeout nor timed out",
                        job.id(),
                        self.index
                    );
                }
            }
        }
        // held jobs still buffered by a parked socket have timeouts too
        for (_, event) in self.timeouts.drain() {
            ctx.cancel_event(event);
        }
    }

    pub fn set_to_nap(&mut self) {
        self.nap_state = NapState::Nap;
        self.nap_event = None;
    }

    pub fn handle_timeout(&mut self, job_id: JobId, ctx: &mut SimulationContext<DcEvent>) {
        if self.timeouts.remove(&job_id).is_none() {
            panic!("Unexpected timeout of job {} on server {}", job_id, self.index);
        }
        self.timed_out.push(job_id);
        log_debug!(ctx, "job {} on server {} timed out", job_id, self.index);
        if self.nap_state != NapState::TransitioningToActive {
            self.transition_to_active(ctx);
        }
    }

    /// Admits the buffered jobs and schedules the next batch.
    pub fn start_batch(&mut self, ctx: &mut SimulationContext<DcEvent>) {
        let interval = match self.power_policy {
            PowerPolicy::Batch { interval } => interval,
            policy => panic!("Server {} with policy {:?} received batch start", self.index, policy),
        };
        for job in std::mem::take(&mut self.batch_buffer) {
            self.nap_insert(job, ctx);
        }
        ctx.emit_self(DcEvent::StartBatch { server: self.index }, interval);
    }

    pub fn pause(&mut self, ctx: &mut SimulationContext<DcEvent>) {
        self.paused = true;
        for socket in self.sockets.iter_mut() {
            socket.pause(ctx);
        }
    }

    pub fn resume(&mut self, ctx: &mut SimulationContext<DcEvent>) {
        self.paused = false;
        for socket in self.sockets.iter_mut() {
            socket.resume(ctx);
        }
        while self.remaining_capacity() > 0 {
            match self.queue.pop_front() {
                Some(job) => self.start_job_service(job, ctx),
                None => break,
            }
        }
    }

    pub fn core_entered_park(&mut self, socket: usize, core: usize) {
        self.sockets[socket].core_entered_park(core);
    }

    pub fn core_exited_park(&mut self, socket: usize, core: usize, ctx: &mut SimulationContext<DcEvent>) {
        self.sockets[socket].core_exited_park(core, ctx);
    }

    pub fn socket_entered_park(&mut self, socket: usize) {
        self.sockets[socket].enter_park();
    }

    pub fn socket_exited_park(&mut self, socket: usize, ctx: &mut SimulationContext<DcEvent>) {
        self.sockets[socket].exit_park(ctx);
        self.check_bookkeeping();
    }

    /// Sets the DVFS speed of all cores according to the allocated power.
    pub fn assign_power_budget(&mut self, allocated_power: f64, ctx: &mut SimulationContext<DcEvent>) {
        let speed = self.platform.dvfs_speed_for_budget(allocated_power);
        for socket in self.sockets.iter_mut() {
            socket.set_dvfs_speed(speed, ctx);
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn sockets(&self) -> &[Socket] {
        &self.sockets
    }

    pub fn power_policy(&self) -> PowerPolicy {
        self.power_policy
    }

    pub fn nap_state(&self) -> NapState {
        self.nap_state
    }

    /// Returns true if the server is in nap or entering it.
    pub fn is_napping(&self) -> bool {
        matches!(self.nap_state, NapState::Nap | NapState::TransitioningToNap)
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn queue_length(&self) -> usize {
        self.queue.len()
    }

    pub fn jobs_in_server(&self) -> usize {
        self.jobs_in_server
    }

    pub fn jobs_in_service(&self) -> usize {
        self.sockets.iter().map(|s| s.jobs_in_service()).sum()
    }

    pub fn jobs_in_transition(&self) -> usize {
        self.sockets.iter().map(|s| s.jobs_in_transition()).sum()
    }

    /// Jobs waiting for the next batch.
    pub fn batched_jobs(&self) -> usize {
        self.batch_buffer.len()
    }

    /// Held jobs whose timeout is pending.
    pub fn pending_timeouts(&self) -> usize {
        self.timeouts.len()
    }

    pub fn remaining_capacity(&self) -> usize {
        self.sockets.iter().map(|s| s.remaining_capacity()).sum()
    }

    pub fn total_capacity(&self) -> usize {
        self.sockets.iter().map(|s| s.total_capacity()).sum()
    }

    /// Average utilization of sockets.
    pub fn utilization(&self) -> f64 {
        self.sockets.iter().map(|s| s.utilization()).sum::<f64>() / self.sockets.len() as f64
    }

    /// 1 if the server holds no job, 0 otherwise.
    pub fn idle_fraction(&self) -> f64 {
        if self.jobs_in_server == 0 {
            1.
        } else {
            0.
        }
    }

    pub fn power(&self) -> f64 {
        match self.nap_state {
            NapState::Nap => self.nap_power,
            _ => self.dynamic_power() + self.idle_power(),
        }
    }

    pub fn dynamic_power(&self) -> f64 {
        self.sockets.iter().map(|s| s.dynamic_power()).sum::<f64>() + self.platform.dynamic_power(self.utilization())
    }

    pub fn idle_power(&self) -> f64 {
        self.sockets.iter().map(|s| s.idle_power()).sum::<f64>() + self.platform.idle_power()
    }
}
