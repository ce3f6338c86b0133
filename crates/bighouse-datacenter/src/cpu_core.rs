//! Processor core executing at most one job at a time.

use serde::{Deserialize, Serialize};

use bighouse_core::{log_debug, EventId, SimulationContext};

use crate::events::DcEvent;
use crate::job::{Job, JobId};
use crate::power::CorePowerConfig;

/// Fraction of the job work which scales with the core frequency.
pub const DVFS_SCALABLE_FRACTION: f64 = 0.9;

/// Returns the speed at which job work is done by a core running at the given DVFS speed.
pub fn processing_rate(speed: f64) -> f64 {
    (1. - DVFS_SCALABLE_FRACTION) + DVFS_SCALABLE_FRACTION * speed
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum CoreState {
    Active,
    TransitioningToLowPower,
    TransitioningToActive,
    LowPowerIdle,
    Halt,
}

/// What an idle core does.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorePolicy {
    /// Idle cores halt.
    NoManagement,
    /// Idle cores with no waiting work enter the parked state.
    CoreParking,
}

impl Default for CorePolicy {
    fn default() -> Self {
        CorePolicy::NoManagement
    }
}

pub struct Core {
    server: usize,
    socket: usize,
    index: usize,
    job: Option<Job>,
    state: CoreState,
    policy: CorePolicy,
    speed: f64,
    power: CorePowerConfig,
    transition_event: Option<EventId>,
    paused: bool,
}

impl Core {
    pub fn new(server: usize, socket: usize, index: usize, policy: CorePolicy, power: CorePowerConfig) -> Self {
        Self {
            server,
            socket,
            index,
            job: None,
            state: CoreState::Halt,
            policy,
            speed: 1.,
            power,
            transition_event: None,
            paused: false,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn state(&self) -> CoreState {
        self.state
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn job(&self) -> Option<&Job> {
        self.job.as_ref()
    }

    pub(crate) fn job_mut(&mut self) -> Option<&mut Job> {
        self.job.as_mut()
    }

    /// Places a job on the core and starts processing it, possibly after leaving the parked state.
    ///
    /// No completion is scheduled while the core is paused.
    pub fn insert_job(&mut self, job: Job, ctx: &mut SimulationContext<DcEvent>) {
        if let Some(current) = &self.job {
            panic!(
                "Tried to insert job {} into core {} which is busy with job {}",
                job.id(),
                self.index,
                current.id()
            );
        }
        self.job = Some(job);
        match self.state {
            CoreState::TransitioningToLowPower | CoreState::LowPowerIdle => {
                if self.state == CoreState::TransitioningToLowPower {
                    let event = self
                        .transition_event
                        .take()
                        .unwrap_or_else(|| panic!("Core {} is entering park without a transition event", self.index));
                    ctx.cancel_event(event);
                }
                self.state = CoreState::TransitioningToActive;
                let event = ctx.emit_self(
                    DcEvent::CoreExitedPark {
                        server: self.server,
                        socket: self.socket,
                        core: self.index,
                    },
                    self.power.park_transition_time,
                );
                self.transition_event = Some(event);
            }
            CoreState::TransitioningToActive => {
                panic!("Core {} received a job while leaving park", self.index);
            }
            CoreState::Active | CoreState::Halt => {
                self.state = CoreState::Active;
                self.start_processing(ctx);
            }
        }
    }

    fn start_processing(&mut self, ctx: &mut SimulationContext<DcEvent>) {
        let time = ctx.time();
        let rate = processing_rate(self.speed);
        let paused = self.paused;
        let server = self.server;
        let job = self
            .job
            .as_mut()
            .unwrap_or_else(|| panic!("Core {} has no job to process", self.index));
        job.set_last_resume_time(time);
        if !paused {
            let event = ctx.emit_self(
                DcEvent::JobFinish {
                    server,
                    job_id: job.id(),
                },
                job.remaining() / rate,
            );
            job.set_finish_event(event, rate);
        }
    }

    /// Credits the work done so far and cancels the pending completion.
    fn stop_processing(&mut self, ctx: &mut SimulationContext<DcEvent>) {
        if let Some(job) = self.job.as_mut() {
            if let Some((event, rate)) = job.take_finish_event() {
                job.credit_work(ctx.time(), rate);
                ctx.cancel_event(event);
            }
        }
    }

    /// Takes the finished job off the core.
    ///
    /// If no other job is waiting the core becomes idle according to its policy.
    pub fn remove_job(&mut self, job_id: JobId, job_waiting: bool, ctx: &mut SimulationContext<DcEvent>) -> Job {
        let mut job = match self.job.take() {
            Some(job) if job.id() == job_id => job,
            Some(job) => panic!(
                "Tried to remove job {} from core {} but it runs job {}",
                job_id,
                self.index,
                job.id()
            ),
            None => panic!("Tried to remove job {} from idle core {}", job_id, self.index),
        };
        // the finish event is the one being processed
        job.take_finish_event();
        if !job_waiting && self.policy == CorePolicy::CoreParking {
            self.state = CoreState::TransitioningToLowPower;
            let event = ctx.emit_self(
                DcEvent::CoreEnteredPark {
                    server: self.server,
                    socket: self.socket,
                    core: self.index,
                },
                self.power.park_transition_time,
            );
            self.transition_event = Some(event);
            log_debug!(ctx, "core {}/{}/{} is entering park", self.server, self.socket, self.index);
        } else {
            self.state = CoreState::Halt;
        }
        job
    }

    pub fn enter_park(&mut self) {
        if self.state != CoreState::TransitioningToLowPower || self.job.is_some() {
            panic!("Core {} entered park in state {:?}", self.index, self.state);
        }
        self.transition_event = None;
        self.state = CoreState::LowPowerIdle;
    }

    pub fn exit_park(&mut self, ctx: &mut SimulationContext<DcEvent>) {
        if self.job.is_none() {
            panic!("Core {} left park without a job", self.index);
        }
        self.transition_event = None;
        self.state = CoreState::Active;
        self.start_processing(ctx);
    }

    /// Changes the core frequency, rescheduling the completion of the running job.
    pub fn set_dvfs_speed(&mut self, speed: f64, ctx: &mut SimulationContext<DcEvent>) {
        let running = self.job.as_ref().map_or(false, |job| job.finish_event().is_some());
        if running {
            self.stop_processing(ctx);
            self.speed = speed;
            self.start_processing(ctx);
        } else {
            self.speed = speed;
        }
    }

    pub fn pause(&mut self, ctx: &mut SimulationContext<DcEvent>) {
        if self.paused {
            panic!("Core {} paused when it was already paused", self.index);
        }
        self.paused = true;
        self.stop_processing(ctx);
    }

    pub fn resume(&mut self, ctx: &mut SimulationContext<DcEvent>) {
        if !self.paused {
            panic!("Core {} resumed when it was already running", self.index);
        }
        self.paused = false;
        if self.job.is_some() && self.state == CoreState::Active {
            self.start_processing(ctx);
        }
    }

    pub fn power(&self) -> f64 {
        self.dynamic_power() + self.idle_power()
    }

    /// Power above the idle level, which grows cubically with the speed.
    pub fn dynamic_power(&self) -> f64 {
        match self.state {
            CoreState::Active => (self.power.active - self.power.idle) * self.speed.powi(3),
            _ => 0.,
        }
    }

    pub fn idle_power(&self) -> f64 {
        match self.state {
            CoreState::Active | CoreState::Halt => self.power.idle,
            CoreState::LowPowerIdle => self.power.park,
            CoreState::TransitioningToActive | CoreState::TransitioningToLowPower => self.power.active,
        }
    }
}
