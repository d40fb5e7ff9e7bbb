//! The in-memory map of connected executors.
//!
//! Four associative structures behind one mutex: by executor id, by peer
//! handle's connection id, by remote address, plus a per-executor free-core
//! counter. The peer-handle and address indices exist so that transport
//! events — which carry one or the other but not the executor id — resolve
//! to an executor id in O(1).

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{Result, SchedulerError};
use crate::types::{ExecutorId, ExecutorRecord, PeerHandle};

struct Inner {
    by_id: HashMap<ExecutorId, ExecutorRecord>,
    by_peer: HashMap<u64, ExecutorId>,
    by_addr: HashMap<SocketAddr, ExecutorId>,
}

/// The executor registry. Owned exclusively by the Coordinator for writes;
/// the Launch Pump worker takes read-only lookups under the same lock.
pub struct Registry {
    inner: Mutex<Inner>,
    /// Readable lock-free so `default_parallelism()` can be called from any
    /// thread.
    total_core_count: AtomicU32,
}

impl Registry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                by_id: HashMap::new(),
                by_peer: HashMap::new(),
                by_addr: HashMap::new(),
            }),
            total_core_count: AtomicU32::new(0),
        })
    }

    pub fn total_core_count(&self) -> u32 {
        self.total_core_count.load(Ordering::SeqCst)
    }

    /// Fails with `DuplicateExecutor` if `executor_id` is already present;
    /// otherwise installs all three index entries and increments the
    /// total-core counter by the record's cores.
    pub async fn insert(&self, record: ExecutorRecord) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.by_id.contains_key(&record.executor_id) {
            return Err(SchedulerError::DuplicateExecutor(record.executor_id));
        }
        inner.by_peer.insert(record.peer.conn_id(), record.executor_id.clone());
        inner.by_addr.insert(record.remote_addr, record.executor_id.clone());
        self.total_core_count.fetch_add(record.initial_cores, Ordering::SeqCst);
        debug!(executor_id = %record.executor_id, cores = record.initial_cores, "registered executor");
        inner.by_id.insert(record.executor_id.clone(), record);
        Ok(())
    }

    pub async fn lookup(&self, id: &ExecutorId) -> Option<ExecutorRecord> {
        self.inner.lock().await.by_id.get(id).cloned()
    }

    pub async fn lookup_by_peer(&self, conn_id: u64) -> Option<ExecutorId> {
        self.inner.lock().await.by_peer.get(&conn_id).cloned()
    }

    pub async fn lookup_by_address(&self, addr: &SocketAddr) -> Option<ExecutorId> {
        self.inner.lock().await.by_addr.get(addr).cloned()
    }

    /// Drops all index entries; decrements the total-core counter by the
    /// record's *current* free-core count, not its original cores — cores
    /// currently out on tasks never return to the aggregate when their
    /// executor dies. This is preserved faithfully; see DESIGN.md.
    pub async fn remove(&self, id: &ExecutorId) -> Option<ExecutorRecord> {
        let mut inner = self.inner.lock().await;
        let record = inner.by_id.remove(id)?;
        inner.by_peer.remove(&record.peer.conn_id());
        inner.by_addr.remove(&record.remote_addr);
        self.total_core_count.fetch_sub(record.free_cores, Ordering::SeqCst);
        debug!(executor_id = %id, "removed executor");
        Some(record)
    }

    pub async fn adjust_free(&self, id: &ExecutorId, delta: i64) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let record = inner
            .by_id
            .get_mut(id)
            .ok_or_else(|| SchedulerError::UnknownExecutor(id.clone()))?;
        let updated = (record.free_cores as i64 + delta).clamp(0, record.initial_cores as i64);
        record.free_cores = updated as u32;
        Ok(())
    }

    /// Snapshot the free-core count and zero it in one step. Returns `None`
    /// if the executor is not present (it may have disconnected between the
    /// caller reading its id and this call).
    pub async fn take_all_free(&self, id: &ExecutorId) -> Option<u32> {
        let mut inner = self.inner.lock().await;
        let record = inner.by_id.get_mut(id)?;
        let prev = record.free_cores;
        record.free_cores = 0;
        Some(prev)
    }

    /// All executor ids currently registered, in no particular order.
    pub async fn all_ids(&self) -> Vec<ExecutorId> {
        self.inner.lock().await.by_id.keys().cloned().collect()
    }

    #[cfg(test)]
    pub async fn free_cores(&self, id: &ExecutorId) -> Option<u32> {
        self.inner.lock().await.by_id.get(id).map(|r| r.free_cores)
    }
}
