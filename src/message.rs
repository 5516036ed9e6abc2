//! The inbound message families from spec.md §6, plus the client-request and
//! reply shapes admission depends on.

use crate::ids::Id;
use crate::node_info::MemberInfo;
use std::time::Duration;
use strum_macros::{Display, EnumDiscriminants, EnumIter};

/// Identifies a core service the lifecycle orchestrator waits on during
/// startup/shutdown (spec.md §4.4).
pub type ServiceId = &'static str;
/// Identifies a subsystem plugin (spec.md §4.4 step 5/7).
pub type SubsystemId = &'static str;

/// A client request's read/write classification and the fields admission
/// needs (spec.md §4.3). The controller does not interpret the request body
/// itself — that's the storage subsystem's job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Read,
    Write,
}

/// Extra fields only meaningful for write-class requests: the timeouts used
/// to compute the forwarding-proxy registration timeout (spec.md §4.3).
#[derive(Debug, Clone)]
pub struct WriteTimeouts {
    pub prepare_timeout: Duration,
    pub commit_timeout: Duration,
}

impl WriteTimeouts {
    /// `prepareTimeout + commitTimeout + 300ms`, per spec.md §4.3.
    pub fn forward_timeout(&self) -> Duration {
        self.prepare_timeout + self.commit_timeout + Duration::from_millis(300)
    }
}

/// A one-shot reply channel back to the originating client connection. The
/// controller either consumes it directly (to send `NotHandled`) or moves it
/// along inside a forwarded message for storage to reply through.
pub struct ReplyEnvelope(pub tokio::sync::oneshot::Sender<ClientReply>);

impl std::fmt::Debug for ReplyEnvelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ReplyEnvelope(..)")
    }
}

/// A client request arriving on the main queue.
#[derive(Debug)]
pub struct ClientRequest {
    pub correlation_id: Id,
    pub reply_to: ReplyEnvelope,
    pub kind: RequestKind,
    /// Reads only: true when the caller requires a strongly-consistent,
    /// leader-served answer rather than a locally-served one.
    pub require_leader: bool,
    /// Writes only.
    pub write_timeouts: Option<WriteTimeouts>,
    /// True for requests issued by the system account (internal
    /// housekeeping), which bypasses the read-only-replica write denial
    /// (spec.md §4.3).
    pub is_system_account: bool,
}

/// The reason a request was denied (spec.md §6, reply surface).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    NotReady,
    NotLeader,
    IsReadOnly,
}

/// `{advertisedTcpEndpoint?, isTcpSecure, advertisedHttpEndpoint}` from
/// spec.md §4.3/§6.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderInfo {
    pub advertised_tcp_endpoint: Option<crate::node_info::Endpoint>,
    pub is_tcp_secure: bool,
    pub advertised_http_endpoint: crate::node_info::Endpoint,
}

/// `NotHandled{correlationId, reason, leaderInfo?}` — the deny reply surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotHandled {
    pub correlation_id: Id,
    pub reason: DenyReason,
    pub leader_info: Option<LeaderInfo>,
}

/// What the controller sends back through a [`ReplyEnvelope`] on the deny
/// path. Forwarded requests are replied to directly by storage, bypassing
/// this type entirely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientReply {
    NotHandled(NotHandled),
}

/// All inbound message kinds the controller accepts, per spec.md §6.
#[derive(Debug, EnumDiscriminants)]
#[strum_discriminants(name(MessageKind))]
#[strum_discriminants(derive(Display, EnumIter, Hash))]
pub enum Message {
    // --- System lifecycle ---
    SystemInit,
    ServiceInitialized {
        service: ServiceId,
    },
    SystemStart,
    AuthenticationProviderInitialized,
    AuthenticationProviderInitializationFailed {
        reason: String,
    },
    SubSystemInitialized {
        subsystem: SubsystemId,
    },
    SystemCoreReady,
    RequestShutdown {
        exit_process: bool,
        shutdown_http: bool,
    },
    BecomeShuttingDown {
        correlation_id: Id,
    },
    ServiceShutdown {
        service: ServiceId,
    },
    ShutdownTimeout {
        correlation_id: Id,
    },
    BecomeShutdown,

    // --- Role transitions (the "StateChange" kind family, spec.md §4.1) ---
    BecomeUnknown {
        correlation_id: Id,
    },
    BecomeDiscoverLeader {
        correlation_id: Id,
    },
    BecomePreLeader {
        correlation_id: Id,
    },
    BecomeLeader {
        correlation_id: Id,
    },
    BecomeResigningLeader {
        correlation_id: Id,
    },
    BecomePreReplica {
        correlation_id: Id,
        leader: MemberInfo,
    },
    BecomeCatchingUp {
        correlation_id: Id,
    },
    BecomeClone {
        correlation_id: Id,
    },
    BecomeFollower {
        correlation_id: Id,
    },
    BecomeReadOnlyLeaderless {
        correlation_id: Id,
    },
    BecomePreReadOnlyReplica {
        correlation_id: Id,
        leader: MemberInfo,
    },
    BecomeReadOnlyReplica {
        correlation_id: Id,
    },

    // --- Resignation / quorum ---
    InitiateLeaderResignation,
    RequestQueueDrained,
    NoQuorumMessage,
    WriteEpoch {
        proposal_number: u64,
    },

    // --- Chaser handshake ---
    WaitForChaserToCatchUp {
        correlation_id: Id,
        attempt: u32,
    },
    ChaserCaughtUp {
        correlation_id: Id,
    },

    // --- Election / gossip ---
    ElectionsDone {
        leader: MemberInfo,
        proposal_number: u64,
        elected_self: bool,
    },
    GossipUpdated {
        members: Vec<MemberInfo>,
    },
    DiscoveryTimeout {
        correlation_id: Id,
    },
    LeaderFound {
        leader: MemberInfo,
    },

    // --- Replication handshake ---
    SubscribeToLeader {
        correlation_id: Id,
    },
    ReconnectToLeader {
        correlation_id: Id,
    },
    LeaderConnectionFailed {
        correlation_id: Id,
    },
    VNodeConnectionLost {
        member_id: Id,
    },
    ReplicaSubscriptionRetry {
        subscription_id: Id,
        leader_id: Id,
    },
    ReplicaSubscribed {
        subscription_id: Id,
        leader_id: Id,
    },
    FollowerAssignment {
        subscription_id: Id,
        leader_id: Id,
    },
    CloneAssignment {
        subscription_id: Id,
        leader_id: Id,
    },
    DropSubscription {
        subscription_id: Id,
        leader_id: Id,
    },

    /// Replication data-plane traffic the controller never interprets, only
    /// forwards: `CreateChunk`, `RawChunkBulk`, `DataChunkBulk`,
    /// `AckLogPosition`, `ReplicaSubscriptionRequest`, `ReplicaLogPositionAck`.
    ReplicationDataPlane(&'static str),

    // --- Client requests and their completions ---
    ClientRequest(ClientRequest),
    /// `*Completed` counterparts of client requests — only ever forwarded.
    ClientRequestCompleted(&'static str),
}

impl MessageKind {
    /// The "StateChange kind" family from spec.md §4.1: direct role
    /// assignment commands. Receiving one with no explicit dispatcher rule
    /// for the current role is fatal; every other kind falls back to
    /// forwarding.
    pub fn is_state_change(self) -> bool {
        matches!(
            self,
            MessageKind::BecomeUnknown
                | MessageKind::BecomeDiscoverLeader
                | MessageKind::BecomePreLeader
                | MessageKind::BecomeLeader
                | MessageKind::BecomeResigningLeader
                | MessageKind::BecomePreReplica
                | MessageKind::BecomeCatchingUp
                | MessageKind::BecomeClone
                | MessageKind::BecomeFollower
                | MessageKind::BecomeReadOnlyLeaderless
                | MessageKind::BecomePreReadOnlyReplica
                | MessageKind::BecomeReadOnlyReplica
                | MessageKind::BecomeShuttingDown
                | MessageKind::BecomeShutdown
        )
    }
}

/// Messages published to the output bus, consumed by subordinate services.
#[derive(Debug, Clone)]
pub enum OutboundMessage {
    /// The generic "become X" notification published on every role
    /// transition (spec.md §4.2 step 4), carrying the new role's name.
    BecameRole(&'static str),
    /// Published on `SystemInit` (spec.md §4.4 step 1): tells every core
    /// service to begin initializing. Not to be confused with
    /// `SystemReady`, which signals the opposite end of startup — every
    /// service and subsystem already up.
    SystemInit,
    StartElections,
    /// Published once `AuthenticationProviderInitialized` has been handled,
    /// telling every subsystem plugin to start (spec.md §4.4 step 5) —
    /// distinct from `StartElections`, which is an unrelated signal to the
    /// election collaborator.
    StartSubsystems,
    SystemReady,
    SystemStart,
    LeaderFound,
    SubscribeToLeader,
    /// A write forwarded to the current leader via the transport
    /// (spec.md §4.3).
    TcpForwardMessage {
        internal_correlation_id: Id,
        external_correlation_id: Id,
    },
    /// A read or write forwarded straight to storage because this node can
    /// serve it locally.
    ForwardToStorage,
    WriteEpoch {
        proposal_number: u64,
    },
    /// A message the dispatcher's `Forward` action passes through
    /// unchanged: replication data-plane traffic, `*Completed` replies, and
    /// an `ElectionsDone` outcome received in a role that does not act on
    /// it directly (spec.md §2 "forwarded to the output bus").
    Relayed(MessageKind),
}
