//! Memory streaming benchmark (`mstream`)
//!
//! Measures the throughput of several storage backends under identical access
//! patterns, across a group of ranks.

// Modules
pub mod backend;
pub mod bench;
pub mod config;
pub mod exec;
pub mod mapping;
pub mod pager;
pub mod pattern;
pub mod probe;
pub mod report;
pub mod runtime;
pub mod timer;

// Exports
pub use self::{
	backend::{AcquireRequest, Backend, RunStats},
	bench::RunContext,
	config::{BackendKind, Config, EvictionPolicy, Mode, Tuning},
	exec::Executor,
	pattern::{AccessKind, AccessOp, Pattern},
	probe::{ProbeConfig, ProbeReport},
	report::RankReport,
	runtime::{local::LocalGroup, Group},
	timer::PhaseTimer,
};
