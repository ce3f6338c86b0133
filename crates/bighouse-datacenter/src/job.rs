//! Jobs processed by servers.

use serde::Serialize;

use bighouse_core::EventId;

/// Job identifier, unique within a simulation.
pub type JobId = u64;

/// Issues increasing job identifiers.
#[derive(Debug, Default)]
pub struct JobIdGenerator {
    next: JobId,
}

impl JobIdGenerator {
    /// Creates a generator starting from 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a fresh identifier.
    pub fn next_id(&mut self) -> JobId {
        let id = self.next;
        self.next += 1;
        id
    }
}

/// A unit of work of a fixed size (in seconds of work at full speed).
///
/// Arrival, start and finish times can be set only once.
#[derive(Clone, Debug, Serialize)]
pub struct Job {
    id: JobId,
    size: f64,
    arrival_time: Option<f64>,
    start_time: Option<f64>,
    finish_time: Option<f64>,
    amount_completed: f64,
    amount_delayed: f64,
    last_resume_time: f64,
    // pending completion of the job and the processing rate it was computed for
    finish_event: Option<EventId>,
    finish_rate: f64,
}

impl Job {
    pub fn new(id: JobId, size: f64) -> Self {
        assert!(size >= 0., "Job {} has negative size {}", id, size);
        Self {
            id,
            size,
            arrival_time: None,
            start_time: None,
            finish_time: None,
            amount_completed: 0.,
            amount_delayed: 0.,
            last_resume_time: 0.,
            finish_event: None,
            finish_rate: 1.,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn size(&self) -> f64 {
        self.size
    }

    pub fn mark_arrival(&mut self, time: f64) {
        if self.arrival_time.replace(time).is_some() {
            panic!("Job {} arrival marked twice", self.id);
        }
    }

    pub fn mark_start(&mut self, time: f64) {
        if self.start_time.replace(time).is_some() {
            panic!("Job {} start marked twice", self.id);
        }
    }

    pub fn mark_finish(&mut self, time: f64) {
        if self.finish_time.replace(time).is_some() {
            panic!("Job {} finish marked twice", self.id);
        }
    }

    pub fn arrival_time(&self) -> Option<f64> {
        self.arrival_time
    }

    pub fn start_time(&self) -> Option<f64> {
        self.start_time
    }

    pub fn finish_time(&self) -> Option<f64> {
        self.finish_time
    }

    /// Time from arrival to finish, if both happened.
    pub fn sojourn_time(&self) -> Option<f64> {
        Some(self.finish_time? - self.arrival_time?)
    }

    /// Time from arrival to start of service, if both happened.
    pub fn wait_time(&self) -> Option<f64> {
        Some(self.start_time? - self.arrival_time?)
    }

    pub fn amount_completed(&self) -> f64 {
        self.amount_completed
    }

    /// Work left to do.
    pub fn remaining(&self) -> f64 {
        self.size - self.amount_completed
    }

    /// Credits work done since the last resume at the given processing rate.
    ///
    /// Panics if the completed amount leaves `[0, size]`.
    pub(crate) fn credit_work(&mut self, time: f64, rate: f64) {
        let completed = self.amount_completed + (time - self.last_resume_time) * rate;
        if completed < -1e-9 || completed > self.size + 1e-5 {
            panic!(
                "Job {} completed amount {} is outside [0, {}] at time {} (last resume {}, rate {})",
                self.id, completed, self.size, time, self.last_resume_time, rate
            );
        }
        self.amount_completed = completed.clamp(0., self.size);
        self.last_resume_time = time;
    }

    pub fn amount_delayed(&self) -> f64 {
        self.amount_delayed
    }

    pub(crate) fn set_amount_delayed(&mut self, amount: f64) {
        self.amount_delayed = amount;
    }

    pub fn last_resume_time(&self) -> f64 {
        self.last_resume_time
    }

    pub(crate) fn set_last_resume_time(&mut self, time: f64) {
        self.last_resume_time = time;
    }

    /// Handle of the pending finish event.
    pub fn finish_event(&self) -> Option<EventId> {
        self.finish_event
    }

    pub(crate) fn set_finish_event(&mut self, event: EventId, rate: f64) {
        if let Some(previous) = self.finish_event {
            panic!("Job {} already has a pending finish event {}", self.id, previous);
        }
        self.finish_event = Some(event);
        self.finish_rate = rate;
    }

    pub(crate) fn take_finish_event(&mut self) -> Option<(EventId, f64)> {
        self.finish_event.take().map(|e| (e, self.finish_rate))
    }
}
