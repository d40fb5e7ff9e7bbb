use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::wire::ExecutorOutbound;

/// Opaque executor identifier, unique for the lifetime of one registration.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExecutorId(pub String);

impl fmt::Display for ExecutorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ExecutorId {
    fn from(s: String) -> Self {
        ExecutorId(s)
    }
}

impl From<&str> for ExecutorId {
    fn from(s: &str) -> Self {
        ExecutorId(s.to_string())
    }
}

/// Task identifier. Spark's task ids are JVM longs; a signed 64-bit integer
/// is the direct analogue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub i64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// host:port as announced by the executor at registration time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostPort {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for HostPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Opaque identifier the transport hands the backend to address a connected
/// executor. Equality and hashing are keyed on the connection id only — two
/// handles are the same peer iff they share a connection id, regardless of
/// whether their senders have since been dropped.
#[derive(Clone)]
pub struct PeerHandle {
    conn_id: u64,
    sender: mpsc::Sender<ExecutorOutbound>,
}

impl PeerHandle {
    pub fn new(conn_id: u64, sender: mpsc::Sender<ExecutorOutbound>) -> Self {
        Self { conn_id, sender }
    }

    pub fn conn_id(&self) -> u64 {
        self.conn_id
    }

    /// Fire-and-forget send to this executor. Fails if the stream task's
    /// receiver has already been dropped (peer gone).
    pub async fn send(&self, msg: ExecutorOutbound) -> Result<(), mpsc::error::SendError<ExecutorOutbound>> {
        self.sender.send(msg).await
    }
}

impl fmt::Debug for PeerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerHandle").field("conn_id", &self.conn_id).finish()
    }
}

impl PartialEq for PeerHandle {
    fn eq(&self, other: &Self) -> bool {
        self.conn_id == other.conn_id
    }
}
impl Eq for PeerHandle {}

impl std::hash::Hash for PeerHandle {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.conn_id.hash(state)
    }
}

/// Monotonic source of connection ids for `PeerHandle`s, owned by the
/// transport layer.
#[derive(Default)]
pub struct ConnIdGenerator(AtomicU64);

impl ConnIdGenerator {
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

/// A live executor, as tracked by the Registry.
#[derive(Clone, Debug)]
pub struct ExecutorRecord {
    pub executor_id: ExecutorId,
    pub host_port: HostPort,
    pub remote_addr: SocketAddr,
    pub initial_cores: u32,
    pub free_cores: u32,
    pub peer: PeerHandle,
}

/// A declaration to the cluster scheduler that specific cores on a specific
/// executor are available.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkerOffer {
    pub executor_id: ExecutorId,
    pub host_port: HostPort,
    pub cores: u32,
}

/// A task ready to be launched on a specific, previously-registered executor.
#[derive(Clone, Debug)]
pub struct TaskDescription {
    pub task_id: TaskId,
    pub executor_id: ExecutorId,
    pub payload: Bytes,
}

/// Progress states for a launched task. FINISHED/FAILED/KILLED/LOST are
/// terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    Launching,
    Running,
    Finished,
    Failed,
    Killed,
    Lost,
}

impl TaskState {
    /// FINISHED, FAILED, KILLED, LOST are terminal; one terminal status
    /// update restores exactly one core (spec's "one core per task" policy).
    pub fn is_finished(self) -> bool {
        matches!(
            self,
            TaskState::Finished | TaskState::Failed | TaskState::Killed | TaskState::Lost
        )
    }
}

/// Reason wrapper passed to the `executor_lost` upcall, named after the
/// source's `executorLost(id, SlaveLost(reason))`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlaveLost(pub String);

impl fmt::Display for SlaveLost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
