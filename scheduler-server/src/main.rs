use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use scheduler_core::backend::SchedulerBackend;
use scheduler_core::cluster_scheduler::ClusterScheduler;
use scheduler_core::config::Config;
use scheduler_core::coordinator::CoordinatorEvent;
use scheduler_core::types::{ConnIdGenerator, ExecutorId, SlaveLost, TaskId, TaskState, WorkerOffer};
use scheduler_server::grpc::proto::scheduler_backend_server::SchedulerBackendServer;
use scheduler_server::grpc::SchedulerBackendService;
use tonic::transport::Server;
use tracing_subscriber::EnvFilter;

/// The real cluster scheduler is out of scope for this crate (spec.md §1):
/// it decides placement and owns the task↔executor map. This stand-in only
/// logs every upcall, so the backend can be run and exercised standalone.
struct LoggingClusterScheduler;

#[async_trait]
impl ClusterScheduler for LoggingClusterScheduler {
    async fn status_update(&self, task_id: TaskId, state: TaskState, data: Bytes) {
        tracing::info!(%task_id, ?state, bytes = data.len(), "statusUpdate");
    }

    async fn add_resource_offer(&self, offer: WorkerOffer) {
        tracing::info!(executor_id = %offer.executor_id, cores = offer.cores, "addResourceOffer");
    }

    async fn add_resource_offers(&self, offers: Vec<WorkerOffer>) {
        tracing::info!(count = offers.len(), "addResourceOffers");
    }

    async fn executor_lost(&self, executor_id: ExecutorId, reason: SlaveLost) {
        tracing::warn!(%executor_id, %reason, "executorLost");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let addr = std::env::var("SCHEDULER_BIND_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:50100".to_string())
        .parse()?;

    let config = Config::from_env("spark");
    let backend = SchedulerBackend::start(config, Arc::new(LoggingClusterScheduler));

    let service = SchedulerBackendService {
        backend: backend.clone(),
        conn_ids: Arc::new(ConnIdGenerator::default()),
    };

    tracing::info!(%addr, "scheduler backend gRPC server listening");

    Server::builder()
        .add_service(SchedulerBackendServer::new(service))
        .serve_with_shutdown(addr, shutdown_signal(backend.clone()))
        .await?;

    Ok(())
}

/// Waits for Ctrl+C, tells every still-connected executor the peer is
/// shutting down, then requests graceful Coordinator shutdown.
async fn shutdown_signal(backend: Arc<SchedulerBackend>) {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown requested");

    for id in backend.registry().all_ids().await {
        if let Some(record) = backend.registry().lookup(&id).await {
            backend
                .coordinator_handle()
                .send(CoordinatorEvent::PeerShutdown { addr: record.remote_addr });
        }
    }

    if let Err(e) = backend.stop().await {
        tracing::error!(error = %e, "error stopping scheduler backend");
    }
}
