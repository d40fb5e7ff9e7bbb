//! The wire protocol: messages exchanged between backend and executors.
//!
//! These types are transport-agnostic — `scheduler-server` converts them
//! to/from protobuf at the gRPC boundary. Keeping them separate from the
//! proto-generated types means the Coordinator and Registry never depend on
//! `tonic`.

use std::collections::HashMap;

use bytes::Bytes;

use crate::types::{HostPort, TaskDescription, TaskId, TaskState};

/// A message sent by an executor to the backend.
#[derive(Clone, Debug)]
pub enum ExecutorInbound {
    /// Executor announces itself and offers `cores` compute slots.
    RegisterExecutor {
        executor_id: String,
        host_port: HostPort,
        cores: u32,
    },
    /// Progress report for a previously-launched task. `data` is opaque
    /// bytes surfaced to the cluster scheduler.
    StatusUpdate {
        task_id: TaskId,
        state: TaskState,
        data: Bytes,
    },
}

/// A message sent by the backend to an executor.
#[derive(Clone, Debug)]
pub enum ExecutorOutbound {
    /// Registration accepted; carries process-wide configuration the
    /// executor should adopt.
    RegisteredExecutor { properties: HashMap<String, String> },
    /// Registration rejected.
    RegisterExecutorFailed { reason: String },
    /// Fire-and-forget launch command.
    LaunchTask(TaskDescription),
}
