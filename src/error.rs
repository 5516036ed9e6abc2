//! Category 3 of spec.md §7: operational failures that a handler can return
//! as an ordinary `Result` because the controller has a well-defined,
//! non-fatal response to them (schedule a retry, drop, or log).

use thiserror::Error;

/// Errors a role handler may return to the dispatcher. None of these are
/// invariant violations — see [`crate::fatal::FatalReason`] for that
/// category, which never travels through a `Result`.
#[derive(Error, Debug, Clone)]
pub enum ControllerError {
    #[error("output bus has no receivers or is closed")]
    OutputBusClosed,

    #[error("main queue is closed, cannot self-post {0}")]
    MainQueueClosed(&'static str),

    #[error("forwarding proxy registration failed: {0}")]
    ForwardingProxyUnavailable(String),

    #[error("log database close failed: {0}")]
    LogDatabaseCloseFailed(String),
}
