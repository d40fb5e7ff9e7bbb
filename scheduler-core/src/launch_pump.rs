//! An unbounded FIFO queue plus a worker that drains it and sends launch
//! messages to the appropriate executor.
//!
//! The cluster scheduler may call `launch_task` from within a critical
//! section, and sending involves network I/O; decoupling the two prevents
//! scheduler latency from coupling to per-peer RPC latency.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, warn};

use crate::registry::Registry;
use crate::types::{TaskDescription, TaskState};
use crate::wire::ExecutorOutbound;

#[derive(Clone)]
pub struct LaunchPumpHandle {
    tx: mpsc::UnboundedSender<TaskDescription>,
}

impl LaunchPumpHandle {
    /// Non-blocking enqueue onto the Launch Pump.
    pub fn launch_task(&self, task: TaskDescription) {
        if self.tx.send(task).is_err() {
            warn!("launch pump worker gone, dropping task");
        }
    }
}

/// Emitted when a launch send fails, so a caller can synthesize a
/// `TaskState::Lost` status update for the affected task. The source left
/// this unhandled (spec.md §4.4/§9 "known gap"); surfacing it this way is an
/// explicit design decision documented in DESIGN.md, not a reproduction of
/// source behavior.
pub struct LaunchFailure {
    pub task_id: crate::types::TaskId,
    pub state: TaskState,
    /// `None` when the failure was a missing executor id at send time (no
    /// executor to attribute the synthetic status update to); `Some` when
    /// the executor was registered but the send itself failed.
    pub executor_id: Option<crate::types::ExecutorId>,
}

/// Spawn the Launch Pump worker. `on_failure` is invoked (without blocking
/// the drain loop) whenever a send could not be completed; pass a no-op
/// closure to reproduce the source's silent-drop behavior exactly.
pub fn spawn<F>(registry: Arc<Registry>, mut on_failure: F) -> LaunchPumpHandle
where
    F: FnMut(LaunchFailure) + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<TaskDescription>();

    tokio::spawn(async move {
        while let Some(task) = rx.recv().await {
            let record = registry.lookup(&task.executor_id).await;
            let Some(record) = record else {
                error!(executor_id = %task.executor_id, task_id = %task.task_id, "launch send error: unknown executor");
                on_failure(LaunchFailure { task_id: task.task_id, state: TaskState::Lost, executor_id: None });
                continue;
            };
            let task_id = task.task_id;
            let executor_id = record.executor_id.clone();
            if let Err(e) = record.peer.send(ExecutorOutbound::LaunchTask(task)).await {
                error!(executor_id = %executor_id, task_id = %task_id, error = %e, "launch send error");
                on_failure(LaunchFailure { task_id, state: TaskState::Lost, executor_id: Some(executor_id) });
            }
        }
    });

    LaunchPumpHandle { tx }
}
