use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use scheduler_core::backend::SchedulerBackend;
use scheduler_core::coordinator::{self, CoordinatorEvent};
use scheduler_core::types::{ConnIdGenerator, ExecutorId, HostPort, PeerHandle, TaskDescription, TaskId, TaskState};
use scheduler_core::wire::ExecutorOutbound as WireOutbound;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status, Streaming};
use tracing::{info, warn};

pub mod proto {
    tonic::include_proto!("scheduler.v1");
}

use proto::executor_inbound::Kind as InboundKind;
use proto::executor_outbound::Kind as OutboundKind;
use proto::scheduler_backend_server::SchedulerBackend as SchedulerBackendRpc;
use proto::{ExecutorInbound, ExecutorOutbound, LaunchTask, RegisterExecutorFailed, RegisteredExecutor};

pub struct SchedulerBackendService {
    pub backend: Arc<SchedulerBackend>,
    pub conn_ids: Arc<ConnIdGenerator>,
}

fn proto_state_to_domain(state: i32) -> TaskState {
    match proto::TaskState::try_from(state).unwrap_or(proto::TaskState::Lost) {
        proto::TaskState::Launching => TaskState::Launching,
        proto::TaskState::Running => TaskState::Running,
        proto::TaskState::Finished => TaskState::Finished,
        proto::TaskState::Failed => TaskState::Failed,
        proto::TaskState::Killed => TaskState::Killed,
        proto::TaskState::Lost => TaskState::Lost,
    }
}

fn wire_outbound_to_proto(msg: WireOutbound) -> ExecutorOutbound {
    let kind = match msg {
        WireOutbound::RegisteredExecutor { properties } => {
            OutboundKind::RegisteredExecutor(RegisteredExecutor { properties })
        }
        WireOutbound::RegisterExecutorFailed { reason } => {
            OutboundKind::RegisterExecutorFailed(RegisterExecutorFailed { reason })
        }
        WireOutbound::LaunchTask(TaskDescription { task_id, payload, .. }) => {
            OutboundKind::LaunchTask(LaunchTask { task_id: task_id.0, payload: payload.to_vec() })
        }
    };
    ExecutorOutbound { kind: Some(kind) }
}

/// Forwards every message sent to a `PeerHandle` onto the gRPC response
/// stream, converting domain wire types to protobuf as it goes. Exits when
/// the stream task's channel closes.
fn spawn_outbound_relay(
    mut wire_rx: mpsc::Receiver<WireOutbound>,
    grpc_tx: mpsc::Sender<Result<ExecutorOutbound, Status>>,
) {
    tokio::spawn(async move {
        while let Some(msg) = wire_rx.recv().await {
            if grpc_tx.send(Ok(wire_outbound_to_proto(msg))).await.is_err() {
                break;
            }
        }
    });
}

#[tonic::async_trait]
impl SchedulerBackendRpc for SchedulerBackendService {
    type ConnectStream = ReceiverStream<Result<ExecutorOutbound, Status>>;

    async fn connect(
        &self,
        request: Request<Streaming<ExecutorInbound>>,
    ) -> Result<Response<Self::ConnectStream>, Status> {
        let remote_addr = request
            .remote_addr()
            .ok_or_else(|| Status::internal("no remote address on connection"))?;
        let mut inbound = request.into_inner();

        let first = inbound
            .message()
            .await?
            .ok_or_else(|| Status::invalid_argument("connection closed before registering"))?;
        let (executor_id, host_port, cores) = match first.kind {
            Some(InboundKind::RegisterExecutor(reg)) => (
                reg.executor_id,
                HostPort { host: reg.host, port: reg.port as u16 },
                reg.cores,
            ),
            _ => return Err(Status::invalid_argument("first message on stream must be RegisterExecutor")),
        };

        let conn_id = self.conn_ids.next();
        let (wire_tx, wire_rx) = mpsc::channel::<WireOutbound>(64);
        let (grpc_tx, grpc_rx) = mpsc::channel::<Result<ExecutorOutbound, Status>>(64);
        spawn_outbound_relay(wire_rx, grpc_tx.clone());

        let peer = PeerHandle::new(conn_id, wire_tx);
        let (reply_tx, reply_rx) = oneshot::channel();
        self.backend.coordinator_handle().send(CoordinatorEvent::RegisterExecutor {
            executor_id: ExecutorId::from(executor_id.clone()),
            host_port,
            cores,
            remote_addr,
            peer: peer.clone(),
            reply: reply_tx,
        });

        let result = reply_rx.await.map_err(|_| Status::internal("coordinator mailbox closed"))?;
        let accepted = result.is_ok();
        coordinator::reply_registration(&peer, result).await;
        info!(executor_id = %executor_id, accepted, %remote_addr, "executor connected");

        let backend = self.backend.clone();
        tokio::spawn(async move {
            run_connection(backend, inbound, conn_id, remote_addr).await;
        });

        Ok(Response::new(ReceiverStream::new(grpc_rx)))
    }
}

/// Reads further inbound frames until the stream ends or errors, posting
/// each as a `CoordinatorEvent` and emitting exactly one liveness event when
/// the connection goes away.
async fn run_connection(
    backend: Arc<SchedulerBackend>,
    mut inbound: Streaming<ExecutorInbound>,
    conn_id: u64,
    remote_addr: SocketAddr,
) {
    loop {
        match inbound.message().await {
            Ok(Some(msg)) => match msg.kind {
                Some(InboundKind::StatusUpdate(su)) => {
                    if let Some(executor_id) = backend.registry().lookup_by_peer(conn_id).await {
                        backend.coordinator_handle().send(CoordinatorEvent::StatusUpdate {
                            executor_id,
                            task_id: TaskId(su.task_id),
                            state: proto_state_to_domain(su.state),
                            data: Bytes::from(su.data),
                        });
                    }
                }
                Some(InboundKind::RegisterExecutor(_)) => {
                    warn!(conn_id, "ignoring re-registration on an already-registered stream");
                }
                None => {}
            },
            Ok(None) => {
                backend.coordinator_handle().send(CoordinatorEvent::PeerTerminated { conn_id });
                return;
            }
            Err(status) => {
                warn!(conn_id, error = %status, "executor stream error");
                backend.coordinator_handle().send(CoordinatorEvent::PeerDisconnected { addr: remote_addr });
                return;
            }
        }
    }
}
