//! Stochastic streams of inter-arrival and service times.

#![warn(missing_docs)]

pub mod empirical;
pub mod generator;

pub use empirical::EmpiricalDistribution;
pub use generator::{ConstantGenerator, EmpiricalGenerator, ExponentialGenerator, Generator};
