//! The Driver Coordinator: a single-consumer event handler that owns the
//! Registry, processes inbound messages, generates offers, and handles
//! disconnect/terminate events.
//!
//! All inbound messages, liveness events, and local requests are serialized
//! through one mpsc channel and handled one at a time; no handler here ever
//! suspends except on the Registry's mutex (briefly) and on the upcall into
//! the cluster scheduler, which is treated as synchronous.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::cluster_scheduler::ClusterScheduler;
use crate::registry::Registry;
use crate::types::{ExecutorId, ExecutorRecord, HostPort, PeerHandle, SlaveLost, TaskId, TaskState, WorkerOffer};
use crate::wire::ExecutorOutbound;

/// Sum type carrying every inbound message, transport liveness event, and
/// local request the Coordinator processes.
pub enum CoordinatorEvent {
    RegisterExecutor {
        executor_id: ExecutorId,
        host_port: HostPort,
        cores: u32,
        remote_addr: SocketAddr,
        peer: PeerHandle,
        reply: oneshot::Sender<Result<HashMap<String, String>, String>>,
    },
    StatusUpdate {
        executor_id: ExecutorId,
        task_id: TaskId,
        state: TaskState,
        data: Bytes,
    },
    ReviveOffers,
    RemoveExecutor {
        executor_id: ExecutorId,
        reason: String,
        ack: oneshot::Sender<()>,
    },
    StopDriver {
        ack: oneshot::Sender<()>,
    },
    PeerTerminated {
        conn_id: u64,
    },
    PeerDisconnected {
        addr: SocketAddr,
    },
    PeerShutdown {
        addr: SocketAddr,
    },
    FreeCores {
        deltas: HashMap<ExecutorId, i64>,
    },
}

/// A cloneable sender onto the Coordinator's mailbox. Held by the transport
/// layer (to post inbound wire messages and liveness events) and by
/// `SchedulerBackend` (to post local requests).
#[derive(Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::UnboundedSender<CoordinatorEvent>,
}

impl CoordinatorHandle {
    pub fn send(&self, event: CoordinatorEvent) {
        // An unbounded send only fails once the Coordinator task has exited
        // (e.g. after StopDriver); there is nowhere further to report the
        // drop, so it is logged and swallowed, matching the Coordinator's
        // own "never let an error propagate past a handler" policy.
        if self.tx.send(event).is_err() {
            warn!("coordinator mailbox closed; dropping event");
        }
    }
}

fn validate_host_port(hp: &HostPort) -> Result<(), String> {
    if hp.host.is_empty() {
        return Err(format!("invalid hostPort: empty host in '{}'", hp));
    }
    if hp.port == 0 {
        return Err(format!("invalid hostPort: non-numeric/zero port in '{}'", hp));
    }
    Ok(())
}

pub struct Coordinator {
    registry: Arc<Registry>,
    scheduler: Arc<dyn ClusterScheduler>,
    properties: Arc<HashMap<String, String>>,
}

impl Coordinator {
    /// Spawn the Coordinator's event loop and return a handle to its
    /// mailbox. `properties` is the immutable `<prefix>.*` configuration
    /// snapshot forwarded to every registering executor.
    pub fn spawn(
        registry: Arc<Registry>,
        scheduler: Arc<dyn ClusterScheduler>,
        properties: HashMap<String, String>,
    ) -> CoordinatorHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let coordinator = Coordinator {
            registry,
            scheduler,
            properties: Arc::new(properties),
        };
        tokio::spawn(coordinator.run(rx));
        CoordinatorHandle { tx }
    }

    async fn run(self, mut rx: mpsc::UnboundedReceiver<CoordinatorEvent>) {
        while let Some(event) = rx.recv().await {
            match event {
                CoordinatorEvent::RegisterExecutor {
                    executor_id,
                    host_port,
                    cores,
                    remote_addr,
                    peer,
                    reply,
                } => {
                    self.handle_register_executor(executor_id, host_port, cores, remote_addr, peer, reply)
                        .await;
                }
                CoordinatorEvent::StatusUpdate { executor_id, task_id, state, data } => {
                    self.handle_status_update(executor_id, task_id, state, data).await;
                }
                CoordinatorEvent::ReviveOffers => {
                    self.generate_all_offers().await;
                }
                CoordinatorEvent::RemoveExecutor { executor_id, reason, ack } => {
                    self.remove_executor(&executor_id, &reason).await;
                    let _ = ack.send(());
                }
                CoordinatorEvent::StopDriver { ack } => {
                    let _ = ack.send(());
                    info!("coordinator stopping");
                    break;
                }
                CoordinatorEvent::PeerTerminated { conn_id } => {
                    if let Some(id) = self.registry.lookup_by_peer(conn_id).await {
                        self.remove_executor(&id, "peer terminated").await;
                    }
                }
                CoordinatorEvent::PeerDisconnected { addr } => {
                    if let Some(id) = self.registry.lookup_by_address(&addr).await {
                        self.remove_executor(&id, "peer disconnected/shutdown").await;
                    }
                }
                CoordinatorEvent::PeerShutdown { addr } => {
                    if let Some(id) = self.registry.lookup_by_address(&addr).await {
                        self.remove_executor(&id, "peer disconnected/shutdown").await;
                    }
                }
                CoordinatorEvent::FreeCores { deltas } => {
                    for (id, delta) in deltas {
                        if let Err(e) = self.registry.adjust_free(&id, delta).await {
                            warn!(executor_id = %id, error = %e, "freeCores for unknown executor");
                        }
                    }
                }
            }
        }
        debug!("coordinator mailbox drained, task exiting");
    }

    async fn handle_register_executor(
        &self,
        executor_id: ExecutorId,
        host_port: HostPort,
        cores: u32,
        remote_addr: SocketAddr,
        peer: PeerHandle,
        reply: oneshot::Sender<Result<HashMap<String, String>, String>>,
    ) {
        if let Err(reason) = validate_host_port(&host_port) {
            let _ = reply.send(Err(reason));
            return;
        }

        let record = ExecutorRecord {
            executor_id: executor_id.clone(),
            host_port,
            remote_addr,
            initial_cores: cores,
            free_cores: cores,
            peer,
        };

        match self.registry.insert(record).await {
            Ok(()) => {
                let _ = reply.send(Ok((*self.properties).clone()));
                self.generate_all_offers().await;
            }
            Err(_) => {
                let _ = reply.send(Err(format!("Duplicate executor ID: {executor_id}")));
            }
        }
    }

    async fn handle_status_update(&self, executor_id: ExecutorId, task_id: TaskId, state: TaskState, data: Bytes) {
        self.scheduler.status_update(task_id, state, data).await;

        if state.is_finished() {
            if let Err(e) = self.registry.adjust_free(&executor_id, 1).await {
                // Unknown executorId is the scheduler's problem, not ours
                // (spec.md §4.3: "the scheduler owns the task↔executor map").
                debug!(executor_id = %executor_id, error = %e, "status update for unknown executor");
                return;
            }
            self.generate_offer(&executor_id).await;
        }
    }

    /// For every executor, atomically snapshot its free cores and zero
    /// them; hand the full list — including zero-core entries — to the
    /// scheduler. From this moment until `FreeCores` restores them, these
    /// cores are invisible to further offer rounds.
    async fn generate_all_offers(&self) {
        let ids = self.registry.all_ids().await;
        let mut offers = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(cores) = self.registry.take_all_free(&id).await {
                if let Some(record) = self.registry.lookup(&id).await {
                    offers.push(WorkerOffer {
                        executor_id: id,
                        host_port: record.host_port,
                        cores,
                    });
                }
            }
        }
        self.scheduler.add_resource_offers(offers).await;
    }

    async fn generate_offer(&self, executor_id: &ExecutorId) {
        let Some(cores) = self.registry.take_all_free(executor_id).await else {
            return;
        };
        let Some(record) = self.registry.lookup(executor_id).await else {
            return;
        };
        self.scheduler
            .add_resource_offer(WorkerOffer {
                executor_id: executor_id.clone(),
                host_port: record.host_port,
                cores,
            })
            .await;
    }

    /// Idempotent: a terminate event may race with an explicit removal, so
    /// a second removal of an already-gone executor is a silent no-op —
    /// `executor_lost` fires exactly once.
    async fn remove_executor(&self, executor_id: &ExecutorId, reason: &str) {
        if self.registry.remove(executor_id).await.is_some() {
            self.scheduler
                .executor_lost(executor_id.clone(), SlaveLost(reason.to_string()))
                .await;
        }
    }
}

/// Sends the synchronous `RegisteredExecutor`/`RegisterExecutorFailed`
/// response on an executor's stream. Called by the transport layer's
/// connection task once it has the Coordinator's oneshot reply in hand —
/// the Coordinator itself never writes to a peer's stream directly except
/// via the Launch Pump's `LaunchTask` sends.
pub async fn reply_registration(
    peer: &PeerHandle,
    result: Result<HashMap<String, String>, String>,
) {
    let msg = match result {
        Ok(properties) => ExecutorOutbound::RegisteredExecutor { properties },
        Err(reason) => ExecutorOutbound::RegisterExecutorFailed { reason },
    };
    if peer.send(msg).await.is_err() {
        warn!(conn_id = peer.conn_id(), "failed to send registration reply, peer gone");
    }
}
