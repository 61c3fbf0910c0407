//! # mu-sched
//!
//! Concurrent job scheduler behind the `parallel` utility.
//!
//! Runs a command template once per batch of an argument stream, keeping
//! several jobs in flight at a time, and folds every job's exit status into
//! a single exit code.
//!
//! ## Components
//!
//! - **Template builder** ([`template`]): turns a batch into an owned argv
//! - **Batching** ([`batch`]): partitions the argument stream
//! - **Admission** ([`admission`]): concurrency limit and load ceiling
//! - **Host** ([`host`]): launch, reap, load sampling
//! - **Status** ([`status`]): normalization and OR-aggregation
//! - **Scheduler** ([`scheduler`]): the FILLING / WAITING / DRAINING loop
//!
//! Jobs are independent OS processes. The scheduler itself is a single
//! sequential loop and never kills its children.

pub mod admission;
pub mod batch;
pub mod config;
pub mod error;
pub mod host;
pub mod resources;
pub mod scheduler;
pub mod status;
pub mod template;

pub use admission::{Admission, AdmissionPolicy};
pub use config::SchedulerConfig;
pub use error::{LaunchError, SchedError};
pub use host::{ProcessHost, ReapMode, ScriptedHost, SystemHost};
pub use scheduler::{RunReport, Scheduler, LOAD_POLL_INTERVAL};
pub use status::{Termination, LAUNCH_FAILED, SIGNALED};
pub use template::{CommandTemplate, Invocation, PLACEHOLDER};
