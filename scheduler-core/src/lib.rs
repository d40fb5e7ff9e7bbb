//! Standalone scheduler backend: the component between an in-process
//! cluster scheduler and a fleet of remote executor processes. Keeps a live
//! registry of executors, delivers resource offers when slots open up,
//! ships launch commands to the right executor, and reclaims slots on
//! executor crash or partition.
//!
//! Transport-agnostic: this crate knows nothing about gRPC or any other
//! wire format. `scheduler-server` bridges the wire protocol in this crate
//! to an actual network transport.

pub mod backend;
pub mod cluster_scheduler;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod launch_pump;
pub mod registry;
pub mod types;
pub mod wire;

pub use backend::SchedulerBackend;
pub use cluster_scheduler::ClusterScheduler;
pub use config::Config;
pub use error::{Result, SchedulerError};
pub use types::{ExecutorId, ExecutorRecord, HostPort, PeerHandle, SlaveLost, TaskDescription, TaskId, TaskState, WorkerOffer};
