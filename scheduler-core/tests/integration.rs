//! End-to-end scenarios against `SchedulerBackend`, driven the way the
//! transport layer would: by posting `CoordinatorEvent`s onto the mailbox
//! and reading upcalls off a `RecordingClusterScheduler`. No network is
//! involved — `scheduler-server`'s own tests cover the gRPC bridge.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use scheduler_core::backend::SchedulerBackend;
use scheduler_core::cluster_scheduler::{RecordingClusterScheduler, UpcallRecord};
use scheduler_core::config::Config;
use scheduler_core::coordinator::CoordinatorEvent;
use scheduler_core::types::{ExecutorId, HostPort, PeerHandle, TaskDescription, TaskId, TaskState};
use scheduler_core::wire::ExecutorOutbound;
use tokio::sync::{mpsc, oneshot};

struct FakeExecutor {
    rx: mpsc::Receiver<ExecutorOutbound>,
    peer: PeerHandle,
    addr: std::net::SocketAddr,
}

fn fake_executor(conn_id: u64, port: u16) -> FakeExecutor {
    let (tx, rx) = mpsc::channel(16);
    let addr = format!("127.0.0.1:{port}").parse().unwrap();
    FakeExecutor { rx, peer: PeerHandle::new(conn_id, tx), addr }
}

async fn register(
    backend: &Arc<SchedulerBackend>,
    exec: &FakeExecutor,
    id: &str,
    host: &str,
    port: u16,
    cores: u32,
) -> Result<HashMap<String, String>, String> {
    let (reply_tx, reply_rx) = oneshot::channel();
    backend.coordinator_handle().send(CoordinatorEvent::RegisterExecutor {
        executor_id: ExecutorId::from(id),
        host_port: HostPort { host: host.to_string(), port },
        cores,
        remote_addr: exec.addr,
        peer: exec.peer.clone(),
        reply: reply_tx,
    });
    reply_rx.await.unwrap()
}

fn new_backend() -> (Arc<SchedulerBackend>, Arc<RecordingClusterScheduler>) {
    let scheduler = Arc::new(RecordingClusterScheduler::new());
    let backend = SchedulerBackend::start(Config::for_test(), scheduler.clone());
    (backend, scheduler)
}

/// Scenario 1: registration + offer.
#[tokio::test]
async fn registration_produces_offer() {
    let (backend, scheduler) = new_backend();
    let exec_a = fake_executor(1, 9001);

    let result = register(&backend, &exec_a, "A", "h", 1, 4).await;
    assert!(result.is_ok());

    tokio::time::sleep(Duration::from_millis(20)).await;
    let calls = scheduler.calls().await;
    assert!(matches!(
        calls.last(),
        Some(UpcallRecord::AddResourceOffers(offers)) if offers.len() == 1 && offers[0].cores == 4
    ));
    assert_eq!(backend.registry().total_core_count(), 4);
}

/// Scenario 2: task completion restores one core.
#[tokio::test]
async fn terminal_status_update_restores_one_core() {
    let (backend, scheduler) = new_backend();
    let exec_a = fake_executor(1, 9002);
    register(&backend, &exec_a, "A", "h", 1, 4).await.unwrap();

    backend.coordinator_handle().send(CoordinatorEvent::StatusUpdate {
        executor_id: ExecutorId::from("A"),
        task_id: TaskId(7),
        state: TaskState::Finished,
        data: Bytes::from_static(b"done"),
    });

    tokio::time::sleep(Duration::from_millis(20)).await;
    let calls = scheduler.calls().await;
    assert!(calls.iter().any(|c| matches!(
        c,
        UpcallRecord::StatusUpdate { task_id, state: TaskState::Finished, .. } if task_id.0 == 7
    )));
    assert!(matches!(
        calls.last(),
        Some(UpcallRecord::AddResourceOffer(offer)) if offer.cores == 1
    ));
}

/// Scenario 3: duplicate registration rejected.
#[tokio::test]
async fn duplicate_registration_rejected() {
    let (backend, _scheduler) = new_backend();
    let exec_a = fake_executor(1, 9003);
    register(&backend, &exec_a, "A", "h", 1, 4).await.unwrap();

    let exec_a2 = fake_executor(2, 9004);
    let result = register(&backend, &exec_a2, "A", "h2", 2, 2).await;
    assert_eq!(result, Err("Duplicate executor ID: A".to_string()));
    assert_eq!(backend.registry().total_core_count(), 4);
}

/// Scenario 4: disconnect reclaims cores.
#[tokio::test]
async fn disconnect_reclaims_cores() {
    let (backend, scheduler) = new_backend();
    let exec_a = fake_executor(1, 9005);
    register(&backend, &exec_a, "A", "h", 1, 4).await.unwrap();

    backend.coordinator_handle().send(CoordinatorEvent::PeerDisconnected { addr: exec_a.addr });
    tokio::time::sleep(Duration::from_millis(20)).await;

    let calls = scheduler.calls().await;
    assert!(calls.iter().any(|c| matches!(
        c,
        UpcallRecord::ExecutorLost { executor_id, reason }
            if executor_id.0 == "A" && reason.0 == "peer disconnected/shutdown"
    )));
    assert_eq!(backend.registry().total_core_count(), 0);

    let before = scheduler.calls().await.len();
    backend.revive_offers();
    tokio::time::sleep(Duration::from_millis(20)).await;
    let after = scheduler.calls().await;
    // ReviveOffers with no executors produces an empty offer list, not a
    // per-executor offer for A.
    assert!(matches!(after[before..].last(), Some(UpcallRecord::AddResourceOffers(offers)) if offers.is_empty()));
}

/// Scenario 5: launch pump ordering.
#[tokio::test]
async fn launch_pump_preserves_order() {
    let (backend, _scheduler) = new_backend();
    let mut exec_a = fake_executor(1, 9006);
    register(&backend, &exec_a, "A", "h", 1, 4).await.unwrap();

    backend.launch_task(TaskDescription { task_id: TaskId(1), executor_id: ExecutorId::from("A"), payload: Bytes::new() });
    backend.launch_task(TaskDescription { task_id: TaskId(2), executor_id: ExecutorId::from("A"), payload: Bytes::new() });

    let first = exec_a.rx.recv().await.unwrap();
    let second = exec_a.rx.recv().await.unwrap();
    let ExecutorOutbound::LaunchTask(t1) = first else { panic!("expected LaunchTask") };
    let ExecutorOutbound::LaunchTask(t2) = second else { panic!("expected LaunchTask") };
    assert_eq!(t1.task_id.0, 1);
    assert_eq!(t2.task_id.0, 2);
}

/// Scenario 6: default parallelism fallback.
#[tokio::test]
async fn default_parallelism_fallback() {
    let (backend, _scheduler) = new_backend();
    assert_eq!(backend.default_parallelism(), 2);

    let mut config = Config::for_test();
    config.default_parallelism_override = Some(7);
    let scheduler = Arc::new(RecordingClusterScheduler::new());
    let backend_with_override = SchedulerBackend::start(config, scheduler);
    assert_eq!(backend_with_override.default_parallelism(), 7);
}

/// Idempotent removal: an explicit remove followed by a peer-terminate for
/// the same id produces exactly one `executor_lost` upcall.
#[tokio::test]
async fn idempotent_removal() {
    let (backend, scheduler) = new_backend();
    let exec_a = fake_executor(1, 9007);
    register(&backend, &exec_a, "A", "h", 1, 4).await.unwrap();

    backend.remove_executor(ExecutorId::from("A"), "explicit removal").await.unwrap();
    backend
        .coordinator_handle()
        .send(CoordinatorEvent::PeerTerminated { conn_id: exec_a.peer.conn_id() });
    tokio::time::sleep(Duration::from_millis(20)).await;

    let lost_count = scheduler
        .calls()
        .await
        .iter()
        .filter(|c| matches!(c, UpcallRecord::ExecutorLost { .. }))
        .count();
    assert_eq!(lost_count, 1);
}

/// `stop()` acknowledges and the mailbox no longer accepts further offers.
#[tokio::test]
async fn stop_acknowledges_within_timeout() {
    let (backend, _scheduler) = new_backend();
    backend.stop().await.unwrap();
}

/// Round-trip law: `FreeCores({id: k})` followed by `ReviveOffers` with no
/// other activity offers exactly `k` cores for `id`.
#[tokio::test]
async fn free_cores_then_revive_offers_k_cores() {
    let (backend, scheduler) = new_backend();
    let exec_a = fake_executor(1, 9008);
    // Registration itself triggers generate_all_offers(), which zeroes A's
    // free cores; nothing else touches them afterward.
    register(&backend, &exec_a, "A", "h", 1, 4).await.unwrap();

    let mut deltas = HashMap::new();
    deltas.insert(ExecutorId::from("A"), 3);
    backend.free_cores(deltas);
    tokio::time::sleep(Duration::from_millis(20)).await;

    let before = scheduler.calls().await.len();
    backend.revive_offers();
    tokio::time::sleep(Duration::from_millis(20)).await;
    let after = scheduler.calls().await;

    assert!(matches!(
        after[before..].last(),
        Some(UpcallRecord::AddResourceOffers(offers))
            if offers.len() == 1 && offers[0].executor_id.0 == "A" && offers[0].cores == 3
    ));
}

/// `Config::from_env` reads the documented `<prefix>_*` variables, maps
/// `AKKA_ASK_TIMEOUT_SECS`/`DEFAULT_PARALLELISM` to their typed fields,
/// excludes `HOST_PORT` from the forwarded properties, and forwards any
/// other `<prefix>_*` variable verbatim.
#[test]
fn config_from_env_reads_prefixed_vars_and_excludes_host_port() {
    let prefix = "SCHEDCFGTEST";
    std::env::set_var(format!("{prefix}_AKKA_ASK_TIMEOUT_SECS"), "42");
    std::env::set_var(format!("{prefix}_DEFAULT_PARALLELISM"), "7");
    std::env::set_var(format!("{prefix}_HOST_PORT"), "host:1");
    std::env::set_var(format!("{prefix}_CUSTOM_PROP"), "value");

    let config = Config::from_env(prefix);

    std::env::remove_var(format!("{prefix}_AKKA_ASK_TIMEOUT_SECS"));
    std::env::remove_var(format!("{prefix}_DEFAULT_PARALLELISM"));
    std::env::remove_var(format!("{prefix}_HOST_PORT"));
    std::env::remove_var(format!("{prefix}_CUSTOM_PROP"));

    assert_eq!(config.ask_timeout, Duration::from_secs(42));
    assert_eq!(config.default_parallelism_override, Some(7));
    assert!(!config.properties.contains_key("HOST_PORT"));
    assert_eq!(config.properties.get("CUSTOM_PROP"), Some(&"value".to_string()));
}
