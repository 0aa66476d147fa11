//! # Runnel Parallel
//!
//! Parallel execution support for the routing solver.
//!
//! This crate provides:
//! - `ProcessingMode`: sequential or rayon-backed execution
//! - Watershed partitioning: splits a routing graph into independent
//!   weakly-connected sub-networks that can be stepped concurrently

pub mod partition;
pub mod strategy;

pub use partition::{partition_watersheds, Partition};
pub use strategy::{num_cpus, ParallelStrategy, ProcessingMode};
