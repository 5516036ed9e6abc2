//! The concrete dispatcher rule table for this controller, built once at
//! construction. See spec.md §4.1 for the precedence rules this encodes.

use super::{Action, Dispatcher, DispatcherBuilder};
use crate::message::MessageKind;
use crate::role::Role;
use strum::IntoEnumIterator;

const STATE_CHANGE_KINDS: &[MessageKind] = &[
    MessageKind::BecomeUnknown,
    MessageKind::BecomeDiscoverLeader,
    MessageKind::BecomePreLeader,
    MessageKind::BecomeLeader,
    MessageKind::BecomeResigningLeader,
    MessageKind::BecomePreReplica,
    MessageKind::BecomeCatchingUp,
    MessageKind::BecomeClone,
    MessageKind::BecomeFollower,
    MessageKind::BecomeReadOnlyLeaderless,
    MessageKind::BecomePreReadOnlyReplica,
    MessageKind::BecomeReadOnlyReplica,
    MessageKind::BecomeShuttingDown,
    MessageKind::BecomeShutdown,
];

fn all_roles_except(excluded: &[Role]) -> Vec<Role> {
    Role::iter().filter(|r| !excluded.contains(r)).collect()
}

/// Builds the default dispatcher for a freshly constructed controller.
pub fn build() -> Dispatcher {
    let mut builder = Dispatcher::builder().default_when_other(Action::Forward);

    // --- State-change matrix (spec.md §4.1, §4.2) ---
    //
    // Every role gets an explicit rule for every StateChange-kind message so
    // none of them can silently fall back to the dispatcher's structural
    // fatal default (see `Dispatcher::resolve`, and the coverage test
    // below). The *real* legitimacy gate for a transition is the generic
    // "become X" handler's correlation-id and precondition checks
    // (spec.md §4.2 steps 1-2) — by routing every non-terminal role to
    // `Handle` uniformly, a stale or doubled transition message is caught
    // there and dropped or escalated to fatal, rather than by fragmenting
    // this table per combination.
    let non_terminal = all_roles_except(&[Role::Shutdown]);
    for &kind in STATE_CHANGE_KINDS {
        builder = builder.for_roles(&non_terminal, kind, Action::Handle);
        builder = builder.for_role(Role::Shutdown, kind, Action::Ignore);
    }
    // `BecomeShuttingDown` while already `ShuttingDown` is the one
    // dispatcher-level idempotence special case called out in spec.md §8
    // ("Sending BecomeShuttingDown while already in ShuttingDown ... is a
    // no-op"); everything else in `ShuttingDown` still routes to `Handle`
    // and relies on the correlation-id check.
    builder = builder.for_role(Role::ShuttingDown, MessageKind::BecomeShuttingDown, Action::Ignore);

    // --- System lifecycle ---
    let startup_roles = &[
        Role::Initializing,
        Role::Unknown,
        Role::DiscoverLeader,
        Role::ReadOnlyLeaderless,
    ];
    builder = builder
        .for_any_role(MessageKind::SystemInit, Action::Ignore)
        .for_role(Role::Initializing, MessageKind::SystemInit, Action::Handle)
        .for_any_role(MessageKind::ServiceInitialized, Action::Ignore)
        .for_role(Role::Initializing, MessageKind::ServiceInitialized, Action::Handle)
        .for_any_role(MessageKind::SystemStart, Action::Ignore)
        .for_role(Role::Initializing, MessageKind::SystemStart, Action::Handle)
        .for_any_role(MessageKind::AuthenticationProviderInitialized, Action::Ignore)
        .for_roles(startup_roles, MessageKind::AuthenticationProviderInitialized, Action::Handle)
        .for_any_role(MessageKind::AuthenticationProviderInitializationFailed, Action::Ignore)
        .for_roles(
            startup_roles,
            MessageKind::AuthenticationProviderInitializationFailed,
            Action::Handle,
        )
        .for_any_role(MessageKind::SubSystemInitialized, Action::Ignore)
        .for_roles(startup_roles, MessageKind::SubSystemInitialized, Action::Handle)
        .for_any_role(MessageKind::SystemCoreReady, Action::Ignore)
        .for_roles(startup_roles, MessageKind::SystemCoreReady, Action::Handle);

    // --- Shutdown sequence ---
    builder = builder
        .for_roles(
            &all_roles_except(&[Role::ShuttingDown, Role::Shutdown]),
            MessageKind::RequestShutdown,
            Action::Handle,
        )
        .for_roles(
            &[Role::ShuttingDown, Role::Shutdown],
            MessageKind::RequestShutdown,
            Action::Ignore,
        )
        .for_any_role(MessageKind::ServiceShutdown, Action::Ignore)
        .for_role(Role::ShuttingDown, MessageKind::ServiceShutdown, Action::Handle)
        .for_any_role(MessageKind::ShutdownTimeout, Action::Ignore)
        .for_role(Role::ShuttingDown, MessageKind::ShutdownTimeout, Action::Handle);

    // --- Resignation / quorum ---
    builder = builder
        .for_any_role(MessageKind::InitiateLeaderResignation, Action::Ignore)
        .for_role(Role::Leader, MessageKind::InitiateLeaderResignation, Action::Handle)
        .for_any_role(MessageKind::RequestQueueDrained, Action::Ignore)
        .for_role(Role::ResigningLeader, MessageKind::RequestQueueDrained, Action::Handle)
        .for_any_role(MessageKind::NoQuorumMessage, Action::Ignore)
        .for_roles(&[Role::Leader, Role::PreLeader], MessageKind::NoQuorumMessage, Action::Handle)
        .for_any_role(MessageKind::WriteEpoch, Action::Forward);

    // --- Chaser handshake ---
    let staging = &[Role::PreReplica, Role::PreReadOnlyReplica, Role::PreLeader];
    builder = builder
        .for_any_role(MessageKind::WaitForChaserToCatchUp, Action::Ignore)
        .for_roles(staging, MessageKind::WaitForChaserToCatchUp, Action::Handle)
        .for_any_role(MessageKind::ChaserCaughtUp, Action::Ignore)
        .for_roles(staging, MessageKind::ChaserCaughtUp, Action::Handle);

    // --- Election / gossip ---
    // `ElectionsDone` in `Initializing` is deliberately left unrouted: the
    // Open Question in spec.md §9 calls out that this is unresolved, and
    // the dispatcher's documented asymmetry (fatal for StateChange kinds,
    // forward for everything else) is the preserved behavior.
    builder = builder
        .for_any_role(MessageKind::ElectionsDone, Action::Forward)
        .for_roles(
            &[Role::DiscoverLeader, Role::Unknown, Role::Leader],
            MessageKind::ElectionsDone,
            Action::Handle,
        );

    // `PreLeader` is deliberately excluded: it is the leader-elect staging
    // role, not a replica, and gossip not yet reflecting self as the alive
    // `Leader` (the normal case right after election) must not re-trigger
    // elections out from under an in-progress promotion (spec.md §4.2
    // only names Leader/replica/read-only-replica/ReadOnlyLeaderless/
    // DiscoverLeader for gossip reaction). It stays unrouted -> `Ignore`,
    // like the other staging states, waiting on `ChaserCaughtUp` instead.
    let replica_family = &[
        Role::PreReplica,
        Role::CatchingUp,
        Role::Clone,
        Role::Follower,
    ];
    let read_only_family = &[Role::PreReadOnlyReplica, Role::ReadOnlyReplica];
    builder = builder
        .for_any_role(MessageKind::GossipUpdated, Action::Ignore)
        .for_role(Role::Leader, MessageKind::GossipUpdated, Action::Handle)
        .for_roles(replica_family, MessageKind::GossipUpdated, Action::Handle)
        .for_roles(read_only_family, MessageKind::GossipUpdated, Action::Handle)
        .for_role(Role::ReadOnlyLeaderless, MessageKind::GossipUpdated, Action::Handle)
        .for_role(Role::DiscoverLeader, MessageKind::GossipUpdated, Action::Handle)
        .for_any_role(MessageKind::DiscoveryTimeout, Action::Ignore)
        .for_role(Role::DiscoverLeader, MessageKind::DiscoveryTimeout, Action::Handle)
        .for_any_role(MessageKind::LeaderFound, Action::Ignore);

    // --- Replication handshake ---
    let subscribing = &[
        Role::PreReplica,
        Role::CatchingUp,
        Role::Clone,
        Role::Follower,
        Role::PreReadOnlyReplica,
        Role::ReadOnlyReplica,
    ];
    builder = builder
        .for_any_role(MessageKind::SubscribeToLeader, Action::Ignore)
        .for_roles(subscribing, MessageKind::SubscribeToLeader, Action::Handle)
        .for_any_role(MessageKind::ReconnectToLeader, Action::Ignore)
        .for_role(Role::PreReplica, MessageKind::ReconnectToLeader, Action::Handle)
        .for_any_role(MessageKind::LeaderConnectionFailed, Action::Ignore)
        .for_roles(subscribing, MessageKind::LeaderConnectionFailed, Action::Handle)
        .for_any_role(MessageKind::VNodeConnectionLost, Action::Ignore)
        .for_roles(subscribing, MessageKind::VNodeConnectionLost, Action::Handle)
        .for_any_role(MessageKind::ReplicaSubscriptionRetry, Action::Ignore)
        .for_roles(subscribing, MessageKind::ReplicaSubscriptionRetry, Action::Handle)
        .for_any_role(MessageKind::ReplicaSubscribed, Action::Ignore)
        .for_roles(
            &[Role::PreReplica, Role::PreReadOnlyReplica],
            MessageKind::ReplicaSubscribed,
            Action::Handle,
        )
        .for_any_role(MessageKind::FollowerAssignment, Action::Ignore)
        .for_roles(
            &[Role::CatchingUp, Role::Clone],
            MessageKind::FollowerAssignment,
            Action::Handle,
        )
        .for_any_role(MessageKind::CloneAssignment, Action::Ignore)
        .for_roles(
            &[Role::CatchingUp, Role::Follower],
            MessageKind::CloneAssignment,
            Action::Handle,
        )
        .for_any_role(MessageKind::DropSubscription, Action::Ignore)
        .for_role(Role::Clone, MessageKind::DropSubscription, Action::Handle)
        .for_any_role(MessageKind::ReplicationDataPlane, Action::Forward);

    // --- Client requests ---
    builder = builder
        .for_any_role(MessageKind::ClientRequest, Action::Handle)
        .for_any_role(MessageKind::ClientRequestCompleted, Action::Forward);

    builder.build()
}
