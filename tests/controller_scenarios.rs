//! End-to-end scenarios from spec.md §8, driven against a real [`Controller`]
//! wired up with in-memory collaborators rather than one unit at a time.

use cluster_ctl::bus::{LogDatabase, WorkerHandler, null_forwarding_proxy};
use cluster_ctl::config::TimerConfig;
use cluster_ctl::fatal::ProcessTerminator;
use cluster_ctl::ids::{Id, new_id};
use cluster_ctl::message::{
    ClientReply, ClientRequest, DenyReason, Message, OutboundMessage, ReplyEnvelope, RequestKind,
};
use cluster_ctl::node_info::{AdvertisedInfo, Endpoint, MemberInfo};
use cluster_ctl::{Collaborators, Controller, ControllerConfig, ControllerError, FatalReason, NodeInfo, Role};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// Short enough to keep the suite fast, long enough that a `drain` comfortably
// spans one of the scheduled timers below.
fn fast_timers() -> TimerConfig {
    TimerConfig {
        leader_discovery_timeout: Duration::from_millis(40),
        leader_reconnection_delay: Duration::from_millis(20),
        leader_subscription_retry_delay: Duration::from_millis(20),
        leader_subscription_timeout: Duration::from_millis(30),
        shutdown_timeout: Duration::from_millis(60),
    }
}

fn config(cluster_size: usize, read_only: bool) -> ControllerConfig {
    ControllerConfig {
        timers: fast_timers(),
        cluster_size,
        read_only,
        ..Default::default()
    }
}

/// Past every timer above, short of the test timing out.
const SETTLE: Duration = Duration::from_millis(120);
/// For steps that don't involve a scheduled timer at all.
const QUICK: Duration = Duration::from_millis(25);

struct RecordingLogDatabase(Arc<AtomicBool>);

#[async_trait::async_trait]
impl LogDatabase for RecordingLogDatabase {
    async fn close(&self) -> Result<(), ControllerError> {
        self.0.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct RecordingWorkerHandler(Arc<AtomicBool>);

impl WorkerHandler for RecordingWorkerHandler {
    fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Records what a fatal/exit path asked for instead of actually ending the
/// test process. Diverges via `panic!`, which a caller observes as an `Err`
/// from the `JoinHandle` of the task the controller was driven in — see
/// `step`.
struct RecordingTerminator {
    fatal_reason: Arc<Mutex<Option<String>>>,
    exited_success: Arc<AtomicBool>,
}

impl ProcessTerminator for RecordingTerminator {
    fn exit_fatal(&self, reason: &FatalReason) -> ! {
        *self.fatal_reason.lock().unwrap() = Some(reason.to_string());
        panic!("test terminator: fatal exit requested: {reason}");
    }

    fn exit_success(&self) -> ! {
        self.exited_success.store(true, Ordering::SeqCst);
        panic!("test terminator: success exit requested");
    }
}

struct Harness {
    controller: Controller,
    queue: cluster_ctl::bus::MainQueue,
    output: tokio::sync::broadcast::Receiver<OutboundMessage>,
    self_id: Id,
    log_closed: Arc<AtomicBool>,
    worker_stopped: Arc<AtomicBool>,
    exited_success: Arc<AtomicBool>,
    fatal_reason: Arc<Mutex<Option<String>>>,
}

fn harness(cfg: ControllerConfig) -> Harness {
    let self_id = new_id();
    let node_info = NodeInfo {
        instance_id: self_id,
        http_endpoint: Endpoint::new("127.0.0.1", 2113),
        tcp_endpoint: Endpoint::new("127.0.0.1", 1112),
        secure_tcp_endpoint: None,
        is_read_only_replica: cfg.read_only,
    };
    let log_closed = Arc::new(AtomicBool::new(false));
    let worker_stopped = Arc::new(AtomicBool::new(false));
    let exited_success = Arc::new(AtomicBool::new(false));
    let fatal_reason = Arc::new(Mutex::new(None));
    let collaborators = Collaborators {
        forwarding_proxy: null_forwarding_proxy(),
        log_database: Arc::new(RecordingLogDatabase(log_closed.clone())),
        worker_handler: Arc::new(RecordingWorkerHandler(worker_stopped.clone())),
        terminator: Arc::new(RecordingTerminator {
            fatal_reason: fatal_reason.clone(),
            exited_success: exited_success.clone(),
        }),
    };
    let (controller, handles) = Controller::new(node_info, cfg, collaborators);
    let output = controller.subscribe_output();
    Harness {
        controller,
        queue: handles.queue,
        output,
        self_id,
        log_closed,
        worker_stopped,
        exited_success,
        fatal_reason,
    }
}

fn peer(instance_id: Id, role: Role, alive: bool) -> MemberInfo {
    MemberInfo {
        instance_id,
        http_endpoint: Endpoint::new("10.0.0.1", 2113),
        internal_tcp_endpoint: Endpoint::new("10.0.0.1", 1112),
        internal_secure_tcp_endpoint: None,
        external_tcp_endpoint: Endpoint::new("10.0.0.1", 1113),
        external_secure_tcp_endpoint: None,
        advertised: AdvertisedInfo::default(),
        is_alive: alive,
        role,
    }
}

async fn post(harness: &Harness, message: Message) {
    harness.queue.post(message).await.expect("main queue open");
}

/// Drives `controller` on a spawned task so a fatal/exit path's panic
/// surfaces as a `JoinError` instead of tearing down the whole test binary.
async fn step(mut controller: Controller, idle: Duration) -> Result<Controller, tokio::task::JoinError> {
    tokio::spawn(async move {
        controller.drain(idle).await;
        controller
    })
    .await
}

fn drain_outbound(rx: &mut tokio::sync::broadcast::Receiver<OutboundMessage>) -> Vec<OutboundMessage> {
    let mut out = Vec::new();
    while let Ok(message) = rx.try_recv() {
        out.push(message);
    }
    out
}

#[tokio::test]
async fn scenario_1_cold_start_cluster_leader_wins_election() {
    let mut h = harness(config(3, false));

    for service in ["chaser", "reader", "writer"] {
        post(&h, Message::ServiceInitialized { service }).await;
    }
    h.controller.drain(QUICK).await;
    assert_eq!(h.controller.role(), Role::DiscoverLeader);

    // Gossip with no alive leader is a no-op while discovering.
    post(&h, Message::GossipUpdated { members: vec![] }).await;
    h.controller.drain(QUICK).await;
    assert_eq!(h.controller.role(), Role::DiscoverLeader);

    // Let the discovery timer fire.
    h.controller.drain(SETTLE).await;
    assert_eq!(h.controller.role(), Role::Unknown);

    let leader = peer(h.self_id, Role::Leader, true);
    post(
        &h,
        Message::ElectionsDone {
            leader,
            proposal_number: 1,
            elected_self: true,
        },
    )
    .await;
    h.controller.drain(QUICK).await;
    assert_eq!(h.controller.role(), Role::PreLeader);

    let correlation_id = h.controller.state_correlation_id();
    post(&h, Message::ChaserCaughtUp { correlation_id }).await;
    h.controller.drain(QUICK).await;
    assert_eq!(h.controller.role(), Role::Leader);
}

#[tokio::test]
async fn scenario_2_cold_start_join_existing_leader_via_discovery() {
    let mut h = harness(config(3, false));

    for service in ["chaser", "reader", "writer"] {
        post(&h, Message::ServiceInitialized { service }).await;
    }
    h.controller.drain(QUICK).await;
    assert_eq!(h.controller.role(), Role::DiscoverLeader);

    let leader_id = new_id();
    post(
        &h,
        Message::GossipUpdated {
            members: vec![peer(leader_id, Role::Leader, true)],
        },
    )
    .await;
    h.controller.drain(QUICK).await;
    assert_eq!(h.controller.role(), Role::PreReplica);

    let correlation_id = h.controller.state_correlation_id();
    post(&h, Message::ChaserCaughtUp { correlation_id }).await;
    h.controller.drain(QUICK).await;
    // Still staging: ChaserCaughtUp only kicks off the subscribe handshake.
    assert_eq!(h.controller.role(), Role::PreReplica);
    let subscription_id = h
        .controller
        .subscription_id()
        .expect("subscribe handshake recorded a subscriptionId");

    post(
        &h,
        Message::ReplicaSubscribed {
            subscription_id,
            leader_id,
        },
    )
    .await;
    h.controller.drain(QUICK).await;
    assert_eq!(h.controller.role(), Role::CatchingUp);

    post(
        &h,
        Message::FollowerAssignment {
            subscription_id,
            leader_id,
        },
    )
    .await;
    h.controller.drain(QUICK).await;
    assert_eq!(h.controller.role(), Role::Follower);
}

#[tokio::test]
async fn scenario_3_leader_loses_quorum() {
    let mut h = harness(config(3, false));
    for service in ["chaser", "reader", "writer"] {
        post(&h, Message::ServiceInitialized { service }).await;
    }
    h.controller.drain(SETTLE).await; // through DiscoverLeader -> Unknown
    assert_eq!(h.controller.role(), Role::Unknown);
    post(
        &h,
        Message::ElectionsDone {
            leader: peer(h.self_id, Role::Leader, true),
            proposal_number: 1,
            elected_self: true,
        },
    )
    .await;
    h.controller.drain(QUICK).await;
    let correlation_id = h.controller.state_correlation_id();
    post(&h, Message::ChaserCaughtUp { correlation_id }).await;
    h.controller.drain(QUICK).await;
    assert_eq!(h.controller.role(), Role::Leader);

    drain_outbound(&mut h.output);
    post(&h, Message::NoQuorumMessage).await;
    h.controller.drain(QUICK).await;

    assert_eq!(h.controller.role(), Role::Unknown);
    let outbound = drain_outbound(&mut h.output);
    assert!(
        outbound
            .iter()
            .any(|m| matches!(m, OutboundMessage::StartElections)),
        "NoQuorumMessage must re-arm elections: got {outbound:?}"
    );
}

#[tokio::test]
async fn scenario_4_stale_chaser_caught_up_is_dropped() {
    let mut h = harness(config(3, false));
    for service in ["chaser", "reader", "writer"] {
        post(&h, Message::ServiceInitialized { service }).await;
    }
    h.controller.drain(QUICK).await;
    let leader_id = new_id();
    post(
        &h,
        Message::GossipUpdated {
            members: vec![peer(leader_id, Role::Leader, true)],
        },
    )
    .await;
    h.controller.drain(QUICK).await;
    assert_eq!(h.controller.role(), Role::PreReplica);

    drain_outbound(&mut h.output);
    post(
        &h,
        Message::ChaserCaughtUp {
            correlation_id: new_id(), // deliberately stale
        },
    )
    .await;
    h.controller.drain(QUICK).await;

    assert_eq!(h.controller.role(), Role::PreReplica);
    assert!(
        drain_outbound(&mut h.output).is_empty(),
        "a stale ChaserCaughtUp must produce no outbound message"
    );
    assert!(h.controller.subscription_id().is_none());
}

#[tokio::test]
async fn scenario_5_resignation_drain() {
    let mut h = harness(config(3, false));
    for service in ["chaser", "reader", "writer"] {
        post(&h, Message::ServiceInitialized { service }).await;
    }
    h.controller.drain(SETTLE).await;
    post(
        &h,
        Message::ElectionsDone {
            leader: peer(h.self_id, Role::Leader, true),
            proposal_number: 1,
            elected_self: true,
        },
    )
    .await;
    h.controller.drain(QUICK).await;
    let correlation_id = h.controller.state_correlation_id();
    post(&h, Message::ChaserCaughtUp { correlation_id }).await;
    h.controller.drain(QUICK).await;
    assert_eq!(h.controller.role(), Role::Leader);

    post(&h, Message::InitiateLeaderResignation).await;
    h.controller.drain(QUICK).await;
    assert_eq!(h.controller.role(), Role::ResigningLeader);

    let (tx, rx) = tokio::sync::oneshot::channel();
    post(
        &h,
        Message::ClientRequest(ClientRequest {
            correlation_id: new_id(),
            reply_to: ReplyEnvelope(tx),
            kind: RequestKind::Write,
            require_leader: false,
            write_timeouts: None,
            is_system_account: false,
        }),
    )
    .await;
    h.controller.drain(QUICK).await;
    let reply = rx.await.expect("admission replies directly on deny");
    match reply {
        ClientReply::NotHandled(not_handled) => {
            assert_eq!(not_handled.reason, DenyReason::NotReady);
        }
    }

    post(&h, Message::RequestQueueDrained).await;
    h.controller.drain(QUICK).await;
    assert_eq!(h.controller.role(), Role::Unknown);
}

#[tokio::test]
async fn scenario_6_shutdown_with_service_timeout() {
    let mut h = harness(config(3, false));
    for service in ["chaser", "reader", "writer"] {
        post(&h, Message::ServiceInitialized { service }).await;
    }
    h.controller.drain(SETTLE).await;
    post(
        &h,
        Message::ElectionsDone {
            leader: peer(h.self_id, Role::Leader, true),
            proposal_number: 1,
            elected_self: true,
        },
    )
    .await;
    h.controller.drain(QUICK).await;
    let correlation_id = h.controller.state_correlation_id();
    post(&h, Message::ChaserCaughtUp { correlation_id }).await;
    h.controller.drain(QUICK).await;
    assert_eq!(h.controller.role(), Role::Leader);

    post(
        &h,
        Message::RequestShutdown {
            exit_process: true,
            shutdown_http: true,
        },
    )
    .await;
    h.controller.drain(QUICK).await;
    assert_eq!(h.controller.role(), Role::ShuttingDown);

    // Only 3 of the 6 expected acknowledgements arrive.
    for service in ["chaser", "reader", "writer"] {
        post(&h, Message::ServiceShutdown { service }).await;
    }
    h.controller.drain(QUICK).await;
    assert_eq!(
        h.controller.role(),
        Role::ShuttingDown,
        "shutdown must not complete until all expected services ack, or the timeout fires"
    );

    let Harness {
        controller,
        log_closed,
        worker_stopped,
        exited_success,
        ..
    } = h;

    // Past `shutdown_timeout`; the forced path must run `Shutdown()` and
    // then invoke the terminator because `exitProcessOnShutdown` was true.
    let result = step(controller, SETTLE).await;
    assert!(result.is_err(), "forced shutdown must invoke process exit");
    assert!(log_closed.load(Ordering::SeqCst), "log database must be closed");
    assert!(worker_stopped.load(Ordering::SeqCst), "workers must be stopped");
    assert!(exited_success.load(Ordering::SeqCst), "exitProcessOnShutdown=true must exit successfully");
}

#[tokio::test]
async fn single_node_cluster_reaches_leader_with_five_shutdown_acks_expected() {
    let mut h = harness(config(1, false));
    for service in ["chaser", "reader", "writer"] {
        post(&h, Message::ServiceInitialized { service }).await;
    }
    h.controller.drain(QUICK).await;
    assert_eq!(h.controller.role(), Role::Unknown);

    post(
        &h,
        Message::ElectionsDone {
            leader: peer(h.self_id, Role::Leader, true),
            proposal_number: 1,
            elected_self: true,
        },
    )
    .await;
    h.controller.drain(QUICK).await;
    let correlation_id = h.controller.state_correlation_id();
    post(&h, Message::ChaserCaughtUp { correlation_id }).await;
    h.controller.drain(QUICK).await;
    assert_eq!(h.controller.role(), Role::Leader);

    assert_eq!(
        ControllerConfig {
            cluster_size: 1,
            ..Default::default()
        }
        .expected_service_shutdowns(),
        5
    );
}

#[tokio::test]
async fn system_core_ready_with_zero_subsystems_fires_system_ready_immediately() {
    let mut h = harness(config(1, false));
    post(&h, Message::SystemCoreReady).await;
    h.controller.drain(QUICK).await;
    let events = drain_outbound(&mut h.output);
    assert!(
        events.iter().any(|m| matches!(m, OutboundMessage::SystemReady)),
        "zero subsystems must fire SystemReady immediately: got {events:?}"
    );
}

#[tokio::test]
async fn system_ready_waits_for_every_subsystem_with_a_nonzero_plugin_count() {
    let mut h = harness(ControllerConfig {
        subsystem_count: 2,
        ..config(1, false)
    });
    post(&h, Message::SystemCoreReady).await;
    h.controller.drain(QUICK).await;
    assert!(
        drain_outbound(&mut h.output)
            .iter()
            .all(|m| !matches!(m, OutboundMessage::SystemReady)),
        "SystemReady must not fire before every subsystem has reported in"
    );

    post(&h, Message::SubSystemInitialized { subsystem: "wal-compactor" }).await;
    h.controller.drain(QUICK).await;
    assert!(
        drain_outbound(&mut h.output)
            .iter()
            .all(|m| !matches!(m, OutboundMessage::SystemReady)),
        "one of two subsystems reporting in must not yet fire SystemReady"
    );

    post(&h, Message::SubSystemInitialized { subsystem: "metrics-exporter" }).await;
    h.controller.drain(QUICK).await;
    let events = drain_outbound(&mut h.output);
    assert!(
        events.iter().any(|m| matches!(m, OutboundMessage::SystemReady)),
        "the last subsystem reporting in must fire SystemReady: got {events:?}"
    );
}

#[tokio::test]
async fn elections_done_announcing_same_leader_is_a_no_op_for_a_non_leader() {
    let mut h = harness(config(3, false));
    for service in ["chaser", "reader", "writer"] {
        post(&h, Message::ServiceInitialized { service }).await;
    }
    h.controller.drain(QUICK).await;

    let leader_id = new_id();
    post(
        &h,
        Message::GossipUpdated {
            members: vec![peer(leader_id, Role::Leader, true)],
        },
    )
    .await;
    h.controller.drain(QUICK).await;
    assert_eq!(h.controller.role(), Role::PreReplica);
    let correlation_id = h.controller.state_correlation_id();

    // Announcing the very same leader again while not ourselves that
    // leader must not rotate ids or move the role.
    post(
        &h,
        Message::ElectionsDone {
            leader: peer(leader_id, Role::Leader, true),
            proposal_number: 2,
            elected_self: false,
        },
    )
    .await;
    h.controller.drain(QUICK).await;
    assert_eq!(h.controller.role(), Role::PreReplica);
    assert_eq!(h.controller.state_correlation_id(), correlation_id);
}

#[tokio::test]
async fn vnode_connection_lost_on_non_leader_member_produces_no_retry() {
    let mut h = harness(config(3, false));
    for service in ["chaser", "reader", "writer"] {
        post(&h, Message::ServiceInitialized { service }).await;
    }
    h.controller.drain(QUICK).await;
    let leader_id = new_id();
    post(
        &h,
        Message::GossipUpdated {
            members: vec![peer(leader_id, Role::Leader, true)],
        },
    )
    .await;
    h.controller.drain(QUICK).await;
    assert_eq!(h.controller.role(), Role::PreReplica);

    let connection_id_before = h.controller.state_correlation_id();
    post(
        &h,
        Message::VNodeConnectionLost {
            member_id: new_id(), // some other peer, not the believed leader
        },
    )
    .await;
    h.controller.drain(SETTLE).await;
    assert_eq!(h.controller.role(), Role::PreReplica);
    assert_eq!(h.controller.state_correlation_id(), connection_id_before);
}

#[tokio::test]
async fn become_leader_while_already_leader_is_fatal() {
    let mut h = harness(config(3, false));
    for service in ["chaser", "reader", "writer"] {
        post(&h, Message::ServiceInitialized { service }).await;
    }
    h.controller.drain(SETTLE).await;
    post(
        &h,
        Message::ElectionsDone {
            leader: peer(h.self_id, Role::Leader, true),
            proposal_number: 1,
            elected_self: true,
        },
    )
    .await;
    h.controller.drain(QUICK).await;
    let correlation_id = h.controller.state_correlation_id();
    post(&h, Message::ChaserCaughtUp { correlation_id }).await;
    h.controller.drain(QUICK).await;
    assert_eq!(h.controller.role(), Role::Leader);

    // Re-issuing BecomeLeader with the still-current correlation id while
    // already Leader is the named fatal round-trip case (spec.md §8).
    post(&h, Message::BecomeLeader { correlation_id }).await;

    let Harness {
        controller,
        fatal_reason,
        ..
    } = h;
    let result = step(controller, QUICK).await;
    assert!(result.is_err(), "duplicate BecomeLeader must be fatal");
    assert!(
        fatal_reason.lock().unwrap().is_some(),
        "the terminator must have recorded an invariant violation"
    );
}

#[tokio::test]
async fn gossip_while_pre_leader_does_not_restart_elections() {
    let mut h = harness(config(3, false));
    for service in ["chaser", "reader", "writer"] {
        post(&h, Message::ServiceInitialized { service }).await;
    }
    h.controller.drain(SETTLE).await; // through DiscoverLeader -> Unknown
    post(
        &h,
        Message::ElectionsDone {
            leader: peer(h.self_id, Role::Leader, true),
            proposal_number: 1,
            elected_self: true,
        },
    )
    .await;
    h.controller.drain(QUICK).await;
    assert_eq!(h.controller.role(), Role::PreLeader);

    drain_outbound(&mut h.output);
    // Gossip hasn't yet propagated self as an alive Leader, the normal case
    // right after election; this must not look like a lost/demoted leader
    // and must not re-trigger elections out from under the promotion.
    post(
        &h,
        Message::GossipUpdated {
            members: vec![peer(h.self_id, Role::Unknown, true)],
        },
    )
    .await;
    h.controller.drain(QUICK).await;

    assert_eq!(h.controller.role(), Role::PreLeader);
    let outbound = drain_outbound(&mut h.output);
    assert!(
        outbound
            .iter()
            .all(|m| !matches!(m, OutboundMessage::StartElections)),
        "gossip while PreLeader must not restart elections: got {outbound:?}"
    );
}
