//! Request Admission (spec.md §4.3): decides what happens to each inbound
//! client request given the current role.

use crate::error::ControllerError;
use crate::handlers::Context;
use crate::leader_info::LeaderInfoResolver;
use crate::message::{
    ClientReply, ClientRequest, DenyReason, NotHandled, OutboundMessage, RequestKind,
};
use crate::role::{ControllerState, Role};

/// What admission decided to do with a request, mirroring spec.md §4.3's
/// decision matrix. The caller (`controller.rs`) carries out the action;
/// this function only decides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    ForwardToStorage,
    ForwardToLeader,
    Deny(DenyReason),
}

/// Applies the spec.md §4.3 decision matrix for a single request.
pub fn decide(state: &ControllerState, request: &ClientRequest) -> Decision {
    match state.role {
        Role::Initializing
        | Role::ShuttingDown
        | Role::Shutdown
        | Role::DiscoverLeader
        | Role::Unknown
        | Role::PreLeader => Decision::Deny(DenyReason::NotReady),
        Role::Leader => Decision::ForwardToStorage,
        Role::ResigningLeader => match request.kind {
            RequestKind::Read => Decision::ForwardToStorage,
            RequestKind::Write => Decision::Deny(DenyReason::NotReady),
        },
        Role::PreReplica | Role::CatchingUp | Role::Clone | Role::Follower => {
            decide_replica(state, request)
        }
        Role::ReadOnlyLeaderless | Role::PreReadOnlyReplica | Role::ReadOnlyReplica => {
            decide_read_only(state, request)
        }
    }
}

fn decide_replica(state: &ControllerState, request: &ClientRequest) -> Decision {
    match request.kind {
        RequestKind::Read => {
            if request.require_leader {
                match &state.leader {
                    Some(_) => Decision::Deny(DenyReason::NotLeader),
                    None => Decision::Deny(DenyReason::NotReady),
                }
            } else {
                Decision::ForwardToStorage
            }
        }
        RequestKind::Write => {
            if request.require_leader {
                Decision::Deny(DenyReason::NotLeader)
            } else {
                Decision::ForwardToLeader
            }
        }
    }
}

fn decide_read_only(state: &ControllerState, request: &ClientRequest) -> Decision {
    match request.kind {
        RequestKind::Read => {
            if request.require_leader {
                match &state.leader {
                    Some(_) => Decision::Deny(DenyReason::NotLeader),
                    None => Decision::Deny(DenyReason::NotReady),
                }
            } else {
                Decision::ForwardToStorage
            }
        }
        RequestKind::Write => {
            if request.is_system_account {
                Decision::ForwardToLeader
            } else {
                Decision::Deny(DenyReason::IsReadOnly)
            }
        }
    }
}

/// Carries out an admission [`Decision`] against a concrete
/// [`ClientRequest`]: replies directly on deny, or registers with the
/// Forwarding Proxy and publishes the forward message (spec.md §4.3
/// "Forwarding writes").
pub async fn admit(
    ctx: &Context,
    state: &ControllerState,
    request: ClientRequest,
    decision: Decision,
) -> Result<(), ControllerError> {
    match decision {
        Decision::ForwardToStorage => {
            ctx.output_publish(OutboundMessage::ForwardToStorage)?;
            // `request.reply_to` travels with the forwarded request in a
            // real wiring; here admission's job ends at "forward".
            drop(request);
            Ok(())
        }
        Decision::ForwardToLeader => forward_to_leader(ctx, state, request).await,
        Decision::Deny(reason) => {
            // `leaderInfo` is a redirect hint for "not leader"/"read-only"
            // denials (spec.md §4.3/§6); a plain `NotReady` means this node
            // isn't ready to serve anything yet, so it must not also point
            // the client at an endpoint (possibly its own) to retry against.
            let leader_info = match reason {
                DenyReason::NotLeader | DenyReason::IsReadOnly => Some(
                    LeaderInfoResolver::resolve(state.leader.as_ref(), &ctx.node_info),
                ),
                DenyReason::NotReady => None,
            };
            let reply = ClientReply::NotHandled(NotHandled {
                correlation_id: request.correlation_id,
                reason,
                leader_info,
            });
            let _ = request.reply_to.0.send(reply);
            Ok(())
        }
    }
}

async fn forward_to_leader(
    ctx: &Context,
    _state: &ControllerState,
    request: ClientRequest,
) -> Result<(), ControllerError> {
    let internal_correlation_id = crate::ids::new_id();
    let external_correlation_id = request.correlation_id;
    let timeout = request
        .write_timeouts
        .as_ref()
        .map(|t| t.forward_timeout())
        .unwrap_or(ctx.config.timers.leader_subscription_timeout);

    ctx.forwarding_proxy
        .register_forward(internal_correlation_id, external_correlation_id, timeout)
        .await
        .map_err(|err| ControllerError::ForwardingProxyUnavailable(err.to_string()))?;

    ctx.output_publish(OutboundMessage::TcpForwardMessage {
        internal_correlation_id,
        external_correlation_id,
    })?;
    drop(request.reply_to);
    Ok(())
}

impl Context {
    /// Thin public wrapper so `admission` can publish without reaching into
    /// the handler-internal `publish` helper.
    pub fn output_publish(&self, message: OutboundMessage) -> Result<(), ControllerError> {
        self.output.publish(message)
    }
}
