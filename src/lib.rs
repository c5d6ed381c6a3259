//! Core workload manager for a slot-based reconfigurable accelerator.
//!
//! The runtime admits a paced stream of compute kernels, dispatches them
//! onto a fixed pool of hardware slots through a bounded worker pool, and
//! captures periodic monitoring windows into shared-memory ring buffers
//! that feed an external online-model service.
//!
//! ## Example
//!
//! Run two workloads against the synthetic accelerator and probe:
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use fpga_sched::config::RuntimeOpts;
//! use fpga_sched::hal::SyntheticAccelerator;
//! use fpga_sched::monitor::probe::SyntheticProbe;
//!
//! let opts = RuntimeOpts::default();
//! let hal = Arc::new(SyntheticAccelerator::default());
//! let probe = Box::new(SyntheticProbe::default());
//! fpga_sched::runtime::run(opts, 2, hal, probe).unwrap();
//! ```
//!
//! The accelerator driver, the physical monitor registers and the model
//! service itself live outside this crate, behind the [`hal::Accelerator`]
//! and [`monitor::probe::MonitorProbe`] seams and the two
//! [`model::ModelClient`] sockets.

pub mod config;
pub mod error;
pub mod exec;
pub mod ffi;
pub mod hal;
pub mod model;
pub mod monitor;
pub mod record;
pub mod runtime;
pub mod workload;
