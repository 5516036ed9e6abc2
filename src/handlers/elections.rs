//! Election outcome, resignation, quorum, and the chaser handshake
//! (spec.md §4.2 "Elections outcome", "Leader resignation").

use super::Context;
use crate::fatal::FatalReason;
use crate::ids::Id;
use crate::message::{Message, OutboundMessage};
use crate::node_info::MemberInfo;
use crate::role::{ControllerState, Role};

/// spec.md §4.2 "Elections outcome": same announced leader as before is a
/// no-op, except the self-leader-to-self-leader epoch write; any other
/// outcome rotates every id and transitions to `PreLeader`/`PreReplica`.
pub fn on_elections_done(
    ctx: &Context,
    state: &mut ControllerState,
    leader: MemberInfo,
    proposal_number: u64,
    elected_self: bool,
) -> Result<(), FatalReason> {
    let same_leader = state
        .leader
        .as_ref()
        .is_some_and(|current| current.instance_id == leader.instance_id);

    if same_leader {
        if elected_self && state.role == Role::Leader {
            ctx.publish(OutboundMessage::WriteEpoch { proposal_number });
        }
        return Ok(());
    }

    state.rotate_state_correlation_id();
    state.rotate_leader_connection_id();
    state.rotate_subscription_id();

    if elected_self {
        super::transition_to(ctx, state, Role::PreLeader, Some(leader))
    } else {
        super::transition_to(ctx, state, Role::PreReplica, Some(leader))
    }
}

/// spec.md §4.4 "Leader resignation": immediate transition, preserving
/// `stateCorrelationId` (no rotation — reads must keep flowing uninterrupted
/// while the queue drains).
pub fn on_initiate_leader_resignation(
    ctx: &Context,
    state: &mut ControllerState,
) -> Result<(), FatalReason> {
    let leader = state.leader.clone();
    super::transition_to(ctx, state, Role::ResigningLeader, leader)
}

pub fn on_request_queue_drained(
    ctx: &Context,
    state: &mut ControllerState,
) -> Result<(), FatalReason> {
    state.rotate_state_correlation_id();
    super::transition_to(ctx, state, Role::Unknown, None)
}

/// spec.md §4.3 error-handling category 3: `NoQuorumMessage` demotes the
/// leader candidate to `Unknown` and restarts elections.
pub fn on_no_quorum(ctx: &Context, state: &mut ControllerState) -> Result<(), FatalReason> {
    state.rotate_state_correlation_id();
    super::transition_to(ctx, state, Role::Unknown, None)?;
    ctx.publish(OutboundMessage::StartElections);
    Ok(())
}

/// The chaser handshake itself is a no-op watchdog: the controller only
/// reacts to `ChaserCaughtUp`. `WaitForChaserToCatchUp` exists to give
/// subordinate services (the actual chaser) something to watch for on the
/// output bus; the controller does not reschedule it itself.
pub fn on_wait_for_chaser_to_catch_up(
    _ctx: &Context,
    _state: &mut ControllerState,
    _correlation_id: Id,
    _attempt: u32,
) -> Result<(), FatalReason> {
    Ok(())
}

/// spec.md §8 scenario 4/testable properties: a stale `ChaserCaughtUp`
/// (correlation id mismatch) is dropped with no state change. On a current
/// id, the staging role completes: `PreLeader -> Leader`,
/// `PreReplica -> CatchingUp`, `PreReadOnlyReplica -> ReadOnlyReplica`.
pub fn on_chaser_caught_up(
    ctx: &Context,
    state: &mut ControllerState,
    correlation_id: Id,
) -> Result<(), FatalReason> {
    if !super::is_current(correlation_id, state.state_correlation_id) {
        tracing::debug!("dropping stale ChaserCaughtUp");
        return Ok(());
    }
    let leader = state.leader.clone();
    match state.role {
        // The leader path needs no replication subscription; the chaser
        // catching up is the only precondition for taking on writes.
        Role::PreLeader => super::transition_to(ctx, state, Role::Leader, leader),
        // The replica paths stay in their staging role and kick off the
        // subscription handshake (spec.md §8 scenario 2) by posting
        // `SubscribeToLeader` to the main queue, rather than publishing the
        // outbound notification directly here: routing it through
        // `replication::on_subscribe_to_leader` is what actually records
        // `subscriptionId` and arms the watchdog retry (spec.md §4.2). The
        // actual role transition happens on a legitimate `ReplicaSubscribed`
        // instead (see `replication::on_replica_subscribed`).
        Role::PreReplica | Role::PreReadOnlyReplica => {
            ctx.queue_post(Message::SubscribeToLeader {
                correlation_id: state.state_correlation_id,
            });
            Ok(())
        }
        other => {
            tracing::debug!(role = %other, "ChaserCaughtUp received outside a staging role, ignoring");
            Ok(())
        }
    }
}
