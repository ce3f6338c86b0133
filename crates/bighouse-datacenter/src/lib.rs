#![doc = include_str!("../readme.md")]

pub mod capping;
pub mod config;
pub mod cpu_core;
pub mod datacenter;
pub mod events;
pub mod experiment;
pub mod job;
pub mod power;
pub mod replication;
pub mod server;
pub mod socket;

pub use capping::PowerCappingEnforcer;
pub use config::ExperimentConfig;
pub use datacenter::DataCenter;
pub use events::DcEvent;
pub use experiment::{build_experiment, stream_seeds, DataCenterExperiment};
pub use job::{Job, JobId, JobIdGenerator};
pub use replication::{replica_config, run_replicas, ReplicaResults};
pub use server::{PowerPolicy, Scheduler, Server};
