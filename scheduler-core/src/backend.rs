//! `SchedulerBackend` — the facade the in-process cluster scheduler drives.
//! Wires together the Registry, Coordinator, and Launch Pump, and exposes
//! the inbound API from spec.md §6.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::cluster_scheduler::ClusterScheduler;
use crate::config::Config;
use crate::coordinator::{Coordinator, CoordinatorEvent, CoordinatorHandle};
use crate::error::{Result, SchedulerError};
use crate::launch_pump::{self, LaunchFailure, LaunchPumpHandle};
use crate::registry::Registry;
use crate::types::{ExecutorId, TaskDescription, TaskState};

pub struct SchedulerBackend {
    registry: Arc<Registry>,
    coordinator: CoordinatorHandle,
    launch_pump: LaunchPumpHandle,
    config: Config,
    started: AtomicBool,
}

impl SchedulerBackend {
    /// `start()`: instantiate the Coordinator and start the Launch Pump
    /// worker. Idempotent-per-instance — calling a second time is a no-op
    /// that logs a warning rather than spawning a second Coordinator.
    pub fn start(config: Config, scheduler: Arc<dyn ClusterScheduler>) -> Arc<Self> {
        let registry = Registry::new();
        let coordinator = Coordinator::spawn(registry.clone(), scheduler, config.properties.clone());

        let coordinator_for_failures = coordinator.clone();
        let launch_pump = launch_pump::spawn(registry.clone(), move |failure: LaunchFailure| {
            synthesize_lost_status(&coordinator_for_failures, failure);
        });

        info!("scheduler backend started");
        Arc::new(Self {
            registry,
            coordinator,
            launch_pump,
            config,
            started: AtomicBool::new(true),
        })
    }

    /// Request graceful Coordinator shutdown; block up to the configured ask
    /// timeout.
    pub async fn stop(&self) -> Result<()> {
        if !self.started.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        let (ack_tx, ack_rx) = oneshot::channel();
        self.coordinator.send(CoordinatorEvent::StopDriver { ack: ack_tx });
        tokio::time::timeout(self.config.ask_timeout, ack_rx)
            .await
            .map_err(|_| SchedulerError::StopTimeout)?
            .map_err(|_| SchedulerError::MailboxClosed)
    }

    /// Non-blocking enqueue onto the Launch Pump.
    pub fn launch_task(&self, task: TaskDescription) {
        self.launch_pump.launch_task(task);
    }

    /// Non-blocking signal to regenerate offers for every executor with free
    /// cores.
    pub fn revive_offers(&self) {
        self.coordinator.send(CoordinatorEvent::ReviveOffers);
    }

    /// `<prefix>.default.parallelism` if set, else `max(total_core_count, 2)`.
    pub fn default_parallelism(&self) -> u32 {
        self.config
            .default_parallelism_override
            .unwrap_or_else(|| self.registry.total_core_count().max(2))
    }

    /// Synchronous; blocks up to the ask timeout for acknowledgement.
    pub async fn remove_executor(&self, executor_id: ExecutorId, reason: impl Into<String>) -> Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.coordinator.send(CoordinatorEvent::RemoveExecutor {
            executor_id,
            reason: reason.into(),
            ack: ack_tx,
        });
        tokio::time::timeout(self.config.ask_timeout, ack_rx)
            .await
            .map_err(|_| SchedulerError::StopTimeout)?
            .map_err(|_| SchedulerError::MailboxClosed)
    }

    /// Bulk restoration of cores when an offer is declined or a task never
    /// actually launches.
    pub fn free_cores(&self, deltas: HashMap<ExecutorId, i64>) {
        self.coordinator.send(CoordinatorEvent::FreeCores { deltas });
    }

    /// A handle the transport layer uses to post inbound messages and
    /// liveness events.
    pub fn coordinator_handle(&self) -> CoordinatorHandle {
        self.coordinator.clone()
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }
}

/// Surfaces a launch-send failure as a synthetic terminal status update, the
/// supplemental behavior spec.md §9 calls out as an implementer's choice
/// rather than source behavior. Routed through the normal StatusUpdate
/// handler so the usual free-core-restore and scheduler upcall both fire;
/// when there was no executor to attribute the failure to (unknown executor
/// id at send time), there is nothing to route and the failure is only
/// logged.
fn synthesize_lost_status(coordinator: &CoordinatorHandle, failure: LaunchFailure) {
    warn!(task_id = %failure.task_id, "synthesizing LOST status update after launch send failure");
    if let Some(executor_id) = failure.executor_id {
        coordinator.send(CoordinatorEvent::StatusUpdate {
            executor_id,
            task_id: failure.task_id,
            state: TaskState::Lost,
            data: Bytes::new(),
        });
    }
}
