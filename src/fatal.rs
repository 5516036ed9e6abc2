//! Category 1 of spec.md §7: invariant violations ("programmer errors").
//!
//! These never propagate as a `Result` an outer caller could swallow with
//! `?` or `.ok()` — the only thing to do with a [`FatalReason`] is log it at
//! `error!` and hand it to a [`ProcessTerminator`].

use std::fmt;

/// Why the process is about to exit on a fatal, unrecoverable path.
#[derive(Debug, Clone)]
pub enum FatalReason {
    /// A data-model invariant (spec.md §3) did not hold at assignment time.
    InvariantViolation(String),
    /// A `StateChange`-kind message had no explicit dispatcher rule for the
    /// current role (spec.md §4.1).
    UnhandledStateChange { role: String, kind: String },
    /// A replication message claimed a `subscriptionId` matching ours but a
    /// leader instance id that does not match `state.leader` (spec.md §4.2,
    /// `IsLegitimateReplicationMessage`).
    SubscriptionLeaderMismatch,
    /// A replication message carried an empty `subscriptionId` (programmer
    /// error per spec.md §4.2).
    EmptySubscriptionId,
}

impl fmt::Display for FatalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FatalReason::InvariantViolation(msg) => write!(f, "invariant violation: {msg}"),
            FatalReason::UnhandledStateChange { role, kind } => write!(
                f,
                "unhandled state-change message {kind} received in role {role}"
            ),
            FatalReason::SubscriptionLeaderMismatch => {
                write!(f, "subscriptionId matched but leader instance id did not")
            }
            FatalReason::EmptySubscriptionId => {
                write!(f, "replication message carried an empty subscriptionId")
            }
        }
    }
}

/// Injected so the controller stays testable: production code exits the
/// process, tests record the call instead (spec.md §9 design notes,
/// "Process exit").
pub trait ProcessTerminator: Send + Sync {
    /// Terminate the process with a non-zero exit code after a fatal
    /// invariant violation.
    fn exit_fatal(&self, reason: &FatalReason) -> !;

    /// Terminate the process successfully, used by the `BecomeShutdown`
    /// handler when `exitProcessOnShutdown` is true (spec.md §4.4 step 5).
    fn exit_success(&self) -> !;
}

/// The real, process-terminating implementation.
pub struct RealProcessTerminator;

impl ProcessTerminator for RealProcessTerminator {
    fn exit_fatal(&self, reason: &FatalReason) -> ! {
        tracing::error!(%reason, "fatal invariant violation, terminating process");
        std::process::exit(1)
    }

    fn exit_success(&self) -> ! {
        std::process::exit(0)
    }
}
