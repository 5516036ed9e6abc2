//! Message routing and the generic "become X" transition handler shared by
//! every role transition (spec.md §4.2).

pub mod elections;
pub mod gossip;
pub mod replication;
pub mod shutdown;
pub mod startup;

use crate::bus::{ForwardingProxy, LogDatabase, MainQueue, OutputBus, WorkerHandler};
use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::fatal::{FatalReason, ProcessTerminator};
use crate::ids::Id;
use crate::message::{Message, OutboundMessage};
use crate::node_info::{MemberInfo, NodeInfo};
use crate::role::{ControllerState, Role};
use std::sync::Arc;
use std::time::Duration;

/// Everything a handler needs besides the mutable [`ControllerState`]: this
/// node's fixed identity, configuration, and the collaborator handles
/// (spec.md §2 "Components", §5 "Shared resources").
#[derive(Clone)]
pub struct Context {
    pub self_instance_id: Id,
    pub node_info: NodeInfo,
    pub config: ControllerConfig,
    pub output: OutputBus,
    pub queue: MainQueue,
    pub forwarding_proxy: Arc<dyn ForwardingProxy>,
    pub log_database: Arc<dyn LogDatabase>,
    pub worker_handler: Arc<dyn WorkerHandler>,
    pub terminator: Arc<dyn ProcessTerminator>,
}

impl Context {
    fn publish(&self, message: OutboundMessage) {
        if let Err(err) = self.output.publish(message) {
            tracing::warn!(%err, "failed to publish to output bus");
        }
    }

    /// Posts a message to our own main queue without delay — used for the
    /// chained lifecycle transitions (`ServiceInitialized` -> `SystemStart`
    /// -> ..., spec.md §4.4) that are logically "schedule for the next
    /// turn" rather than an immediate recursive call.
    fn queue_post(&self, message: Message) {
        self.queue.schedule(Duration::ZERO, message);
    }
}

/// spec.md §4.2 step 1 / §5 "Cancellation semantics": the correlation-id
/// freshness check every handler that acts on an id runs first. Callers
/// drop the message silently on a `false` result.
pub fn is_current(message_correlation_id: Id, live_id: Id) -> bool {
    message_correlation_id == live_id
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::Initializing => "Initializing",
        Role::DiscoverLeader => "DiscoverLeader",
        Role::Unknown => "Unknown",
        Role::PreReplica => "PreReplica",
        Role::CatchingUp => "CatchingUp",
        Role::Clone => "Clone",
        Role::Follower => "Follower",
        Role::PreLeader => "PreLeader",
        Role::Leader => "Leader",
        Role::ResigningLeader => "ResigningLeader",
        Role::ShuttingDown => "ShuttingDown",
        Role::Shutdown => "Shutdown",
        Role::ReadOnlyLeaderless => "ReadOnlyLeaderless",
        Role::PreReadOnlyReplica => "PreReadOnlyReplica",
        Role::ReadOnlyReplica => "ReadOnlyReplica",
    }
}

/// The shared shape of every "become X" handler (spec.md §4.2 steps 3-5).
/// Callers are responsible for step 1 (the correlation-id check) and for
/// rotating whichever ids the specific transition calls for before
/// invoking this. `leader` replaces `state.leader` wholesale: `Some` for
/// roles that require one, `None` to clear it.
pub fn transition_to(
    ctx: &Context,
    state: &mut ControllerState,
    role: Role,
    leader: Option<MemberInfo>,
) -> Result<(), FatalReason> {
    // spec.md §8: re-issuing a "become X" while already X is fatal, with
    // the single named exception of `BecomeShuttingDown` in `ShuttingDown`
    // — and that case never reaches here, the dispatcher table ignores it
    // before routing to a handler.
    if state.role == role {
        return Err(FatalReason::InvariantViolation(format!(
            "duplicate transition to already-current role {role}"
        )));
    }
    state.leader = leader;
    state.assign_role(role, ctx.self_instance_id)?;
    tracing::info!(role = role_name(role), "role transition");
    ctx.publish(OutboundMessage::BecameRole(role_name(role)));

    if role.needs_chaser_catch_up() {
        ctx.queue.schedule(
            Duration::ZERO,
            Message::WaitForChaserToCatchUp {
                correlation_id: state.state_correlation_id,
                attempt: 0,
            },
        );
    }
    Ok(())
}

/// spec.md §4.2 `IsLegitimateReplicationMessage`: a message is legitimate
/// when its `subscriptionId` is non-empty and matches ours, and our known
/// leader's instance id matches the message's `leaderId`. An empty message
/// subscription id is a programmer error; a subscription-id match with a
/// mismatched leader is fatal (it means our own invariants have already
/// drifted). A plain id mismatch (stale retry) is reported as `Ok(false)`
/// for the caller to drop silently.
pub fn is_legitimate_replication_message(
    state: &ControllerState,
    message_subscription_id: Id,
    message_leader_id: Id,
) -> Result<bool, FatalReason> {
    if message_subscription_id.is_nil() {
        return Err(FatalReason::EmptySubscriptionId);
    }
    let Some(ours) = state.subscription_id else {
        return Ok(false);
    };
    if ours != message_subscription_id {
        return Ok(false);
    }
    match &state.leader {
        Some(leader) if leader.instance_id == message_leader_id => Ok(true),
        Some(_) => Err(FatalReason::SubscriptionLeaderMismatch),
        None => Err(FatalReason::SubscriptionLeaderMismatch),
    }
}

/// Terminates the process on a fatal invariant violation. Never returns.
pub fn fail_fatal(ctx: &Context, reason: FatalReason) -> ! {
    ctx.terminator.exit_fatal(&reason)
}

/// Routes a `Message` already classified as `Action::Handle` by the
/// dispatcher to its concrete handler. Fatal results are surfaced to the
/// caller rather than exiting directly, so `controller.rs` can decide how
/// to invoke the terminator uniformly for every source of a fatal.
pub async fn handle(
    ctx: &Context,
    state: &mut ControllerState,
    message: Message,
) -> Result<(), HandleOutcome> {
    match message {
        // --- System lifecycle ---
        Message::SystemInit => startup::on_system_init(ctx, state),
        Message::ServiceInitialized { service } => {
            startup::on_service_initialized(ctx, state, service)
        }
        Message::SystemStart => startup::on_system_start(ctx, state),
        Message::AuthenticationProviderInitialized => {
            startup::on_authentication_provider_initialized(ctx, state)
        }
        Message::AuthenticationProviderInitializationFailed { reason } => {
            startup::on_authentication_provider_initialization_failed(ctx, state, &reason).await
        }
        Message::SubSystemInitialized { subsystem } => {
            startup::on_subsystem_initialized(ctx, state, subsystem)
        }
        Message::SystemCoreReady => startup::on_system_core_ready(ctx, state),
        Message::RequestShutdown {
            exit_process,
            shutdown_http,
        } => shutdown::on_request_shutdown(ctx, state, exit_process, shutdown_http),
        Message::BecomeShuttingDown { correlation_id } => {
            shutdown::on_become_shutting_down(ctx, state, correlation_id)
        }
        Message::ServiceShutdown { service } => {
            shutdown::on_service_shutdown(ctx, state, service).await
        }
        Message::ShutdownTimeout { correlation_id } => {
            shutdown::on_shutdown_timeout(ctx, state, correlation_id).await
        }
        Message::BecomeShutdown => shutdown::on_become_shutdown(ctx, state),

        // --- Role transitions reached directly (no extra precondition logic) ---
        Message::BecomeUnknown { correlation_id } => {
            simple_become(ctx, state, correlation_id, Role::Unknown, None)
        }
        Message::BecomeDiscoverLeader { correlation_id } => {
            startup::on_become_discover_leader(ctx, state, correlation_id)
        }
        Message::BecomePreLeader { correlation_id } => {
            simple_become(ctx, state, correlation_id, Role::PreLeader, state.leader.clone())
        }
        Message::BecomeLeader { correlation_id } => {
            let leader = state.leader.clone();
            simple_become(ctx, state, correlation_id, Role::Leader, leader)
        }
        Message::BecomeResigningLeader { correlation_id } => {
            let leader = state.leader.clone();
            simple_become(ctx, state, correlation_id, Role::ResigningLeader, leader)
        }
        Message::BecomePreReplica {
            correlation_id,
            leader,
        } => simple_become(ctx, state, correlation_id, Role::PreReplica, Some(leader)),
        Message::BecomeCatchingUp { correlation_id } => {
            let leader = state.leader.clone();
            simple_become(ctx, state, correlation_id, Role::CatchingUp, leader)
        }
        Message::BecomeClone { correlation_id } => {
            let leader = state.leader.clone();
            simple_become(ctx, state, correlation_id, Role::Clone, leader)
        }
        Message::BecomeFollower { correlation_id } => {
            let leader = state.leader.clone();
            simple_become(ctx, state, correlation_id, Role::Follower, leader)
        }
        Message::BecomeReadOnlyLeaderless { correlation_id } => {
            simple_become(ctx, state, correlation_id, Role::ReadOnlyLeaderless, None)
        }
        Message::BecomePreReadOnlyReplica {
            correlation_id,
            leader,
        } => simple_become(
            ctx,
            state,
            correlation_id,
            Role::PreReadOnlyReplica,
            Some(leader),
        ),
        Message::BecomeReadOnlyReplica { correlation_id } => {
            let leader = state.leader.clone();
            simple_become(ctx, state, correlation_id, Role::ReadOnlyReplica, leader)
        }

        // --- Resignation / quorum ---
        Message::InitiateLeaderResignation => elections::on_initiate_leader_resignation(ctx, state),
        Message::RequestQueueDrained => elections::on_request_queue_drained(ctx, state),
        Message::NoQuorumMessage => elections::on_no_quorum(ctx, state),

        // --- Chaser handshake ---
        Message::WaitForChaserToCatchUp {
            correlation_id,
            attempt,
        } => elections::on_wait_for_chaser_to_catch_up(ctx, state, correlation_id, attempt),
        Message::ChaserCaughtUp { correlation_id } => {
            elections::on_chaser_caught_up(ctx, state, correlation_id)
        }

        // --- Election / gossip ---
        Message::ElectionsDone {
            leader,
            proposal_number,
            elected_self,
        } => elections::on_elections_done(ctx, state, leader, proposal_number, elected_self),
        Message::GossipUpdated { members } => gossip::on_gossip_updated(ctx, state, members),
        Message::DiscoveryTimeout { correlation_id } => {
            gossip::on_discovery_timeout(ctx, state, correlation_id)
        }
        Message::VNodeConnectionLost { member_id } => {
            gossip::on_vnode_connection_lost(ctx, state, member_id)
        }

        // --- Replication handshake ---
        Message::SubscribeToLeader { correlation_id } => {
            replication::on_subscribe_to_leader(ctx, state, correlation_id)
        }
        Message::ReconnectToLeader { correlation_id } => {
            replication::on_reconnect_to_leader(ctx, state, correlation_id)
        }
        Message::LeaderConnectionFailed { correlation_id } => {
            replication::on_leader_connection_failed(ctx, state, correlation_id)
        }
        Message::ReplicaSubscriptionRetry {
            subscription_id,
            leader_id,
        } => replication::on_replica_subscription_retry(ctx, state, subscription_id, leader_id),
        Message::ReplicaSubscribed {
            subscription_id,
            leader_id,
        } => replication::on_replica_subscribed(ctx, state, subscription_id, leader_id),
        Message::FollowerAssignment {
            subscription_id,
            leader_id,
        } => replication::on_follower_assignment(ctx, state, subscription_id, leader_id),
        Message::CloneAssignment {
            subscription_id,
            leader_id,
        } => replication::on_clone_assignment(ctx, state, subscription_id, leader_id),
        Message::DropSubscription {
            subscription_id,
            leader_id,
        } => replication::on_drop_subscription(ctx, state, subscription_id, leader_id),

        // These reach `handle` only if misrouted by the dispatcher table;
        // every legitimate path for them is `Forward`/`Deny`, handled by
        // `controller.rs` before ever calling into this module.
        Message::LeaderFound { .. }
        | Message::WriteEpoch { .. }
        | Message::ReplicationDataPlane(_)
        | Message::ClientRequest(_)
        | Message::ClientRequestCompleted(_) => {
            tracing::debug!("message routed to handle() with no handler, ignoring");
            Ok(())
        }
    }
    .map_err(HandleOutcome::Fatal)
}

/// A handler either succeeds or names the reason the process must now
/// terminate; `handle` never returns a [`ControllerError`] because every
/// role handler in this controller is infallible except for invariant
/// checks.
#[derive(Debug, Clone)]
pub enum HandleOutcome {
    Fatal(FatalReason),
}

fn simple_become(
    ctx: &Context,
    state: &mut ControllerState,
    correlation_id: Id,
    role: Role,
    leader: Option<MemberInfo>,
) -> Result<(), FatalReason> {
    if !is_current(correlation_id, state.state_correlation_id) {
        tracing::debug!(role = role_name(role), "dropping stale transition message");
        return Ok(());
    }
    transition_to(ctx, state, role, leader)
}
