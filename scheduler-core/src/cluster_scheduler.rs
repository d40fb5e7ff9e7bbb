//! The upcalls the backend performs on the in-process cluster scheduler.
//!
//! The cluster scheduler itself is out of scope (spec.md §1): this module
//! specifies only the boundary trait, mirroring how the teacher crate's
//! `ProcessStore` trait specifies a pluggable persistence boundary without
//! implementing any particular backend in the same module.

use async_trait::async_trait;
use bytes::Bytes;

use crate::types::{ExecutorId, SlaveLost, TaskId, TaskState, WorkerOffer};

/// Upcalls the Coordinator performs on the cluster scheduler. Invoked from
/// the Coordinator's own task; implementations must not block it — treat
/// these as synchronous with respect to Coordinator progress (spec.md §5).
#[async_trait]
pub trait ClusterScheduler: Send + Sync {
    async fn status_update(&self, task_id: TaskId, state: TaskState, data: Bytes);

    async fn add_resource_offer(&self, offer: WorkerOffer);

    async fn add_resource_offers(&self, offers: Vec<WorkerOffer>);

    async fn executor_lost(&self, executor_id: ExecutorId, reason: SlaveLost);
}

/// Records every upcall into an in-memory log, for assertions in tests that
/// exercise the Coordinator end-to-end without a real scheduler.
#[derive(Default)]
pub struct RecordingClusterScheduler {
    calls: tokio::sync::Mutex<Vec<UpcallRecord>>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum UpcallRecord {
    StatusUpdate { task_id: TaskId, state: TaskState, data: Bytes },
    AddResourceOffer(WorkerOffer),
    AddResourceOffers(Vec<WorkerOffer>),
    ExecutorLost { executor_id: ExecutorId, reason: SlaveLost },
}

impl RecordingClusterScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn calls(&self) -> Vec<UpcallRecord> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl ClusterScheduler for RecordingClusterScheduler {
    async fn status_update(&self, task_id: TaskId, state: TaskState, data: Bytes) {
        self.calls.lock().await.push(UpcallRecord::StatusUpdate { task_id, state, data });
    }

    async fn add_resource_offer(&self, offer: WorkerOffer) {
        self.calls.lock().await.push(UpcallRecord::AddResourceOffer(offer));
    }

    async fn add_resource_offers(&self, offers: Vec<WorkerOffer>) {
        self.calls.lock().await.push(UpcallRecord::AddResourceOffers(offers));
    }

    async fn executor_lost(&self, executor_id: ExecutorId, reason: SlaveLost) {
        self.calls.lock().await.push(UpcallRecord::ExecutorLost { executor_id, reason });
    }
}
