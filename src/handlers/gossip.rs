//! Gossip-driven transitions and lost-connection handling
//! (spec.md §4.2 "Gossip while ...", "VNodeConnectionLost").

use super::Context;
use crate::fatal::FatalReason;
use crate::ids::Id;
use crate::message::{Message, OutboundMessage};
use crate::node_info::MemberInfo;
use crate::role::{ControllerState, Role};

fn alive_leaders(members: &[MemberInfo]) -> Vec<&MemberInfo> {
    members.iter().filter(|m| m.is_alive_leader()).collect()
}

pub fn on_gossip_updated(
    ctx: &Context,
    state: &mut ControllerState,
    members: Vec<MemberInfo>,
) -> Result<(), FatalReason> {
    match state.role {
        Role::Leader => on_gossip_while_leader(ctx, state, &members),
        // `PreLeader` is the leader-elect staging role, not a replica, and
        // is deliberately left out here: the dispatcher table doesn't route
        // `GossipUpdated` to it at all (see `dispatch::table::build`), so a
        // PreLeader just keeps waiting for `ChaserCaughtUp`.
        Role::PreReplica | Role::CatchingUp | Role::Clone | Role::Follower => {
            on_gossip_while_replica(ctx, state, &members)
        }
        Role::ReadOnlyReplica | Role::PreReadOnlyReplica => {
            on_gossip_while_read_only_replica(ctx, state, &members)
        }
        Role::ReadOnlyLeaderless => on_gossip_while_read_only_leaderless(ctx, state, &members),
        Role::DiscoverLeader => on_gossip_while_discover_leader(ctx, state, &members),
        _ => Ok(()),
    }
}

/// Split-brain detection: ≥2 alive members reporting `Leader` means this
/// gossip view disagrees with ours, so force a new election.
fn on_gossip_while_leader(
    ctx: &Context,
    _state: &mut ControllerState,
    members: &[MemberInfo],
) -> Result<(), FatalReason> {
    if alive_leaders(members).len() >= 2 {
        tracing::warn!("split-brain detected via gossip, starting elections");
        ctx.publish(OutboundMessage::StartElections);
    }
    Ok(())
}

fn leader_is_healthy(leader: &MemberInfo, members: &[MemberInfo]) -> bool {
    members
        .iter()
        .find(|m| m.instance_id == leader.instance_id)
        .is_some_and(|m| m.is_alive_leader())
}

/// spec.md §4.2 "Gossip while non-leader replica": missing, dead, or
/// demoted leader (per the fresh gossip view) triggers a new election.
fn on_gossip_while_replica(
    ctx: &Context,
    state: &mut ControllerState,
    members: &[MemberInfo],
) -> Result<(), FatalReason> {
    let Some(leader) = state.leader.clone() else {
        ctx.publish(OutboundMessage::StartElections);
        return Ok(());
    };
    if !leader_is_healthy(&leader, members) {
        tracing::warn!("believed leader missing or demoted, starting elections");
        ctx.publish(OutboundMessage::StartElections);
    }
    Ok(())
}

/// spec.md §4.2 "Gossip while ReadOnlyReplica-ish": demote to
/// `ReadOnlyLeaderless` once our leader is no longer alive per gossip.
fn on_gossip_while_read_only_replica(
    ctx: &Context,
    state: &mut ControllerState,
    members: &[MemberInfo],
) -> Result<(), FatalReason> {
    let still_healthy = state
        .leader
        .as_ref()
        .is_some_and(|leader| leader_is_healthy(leader, members));
    if still_healthy {
        return Ok(());
    }
    state.rotate_state_correlation_id();
    state.rotate_leader_connection_id();
    super::transition_to(ctx, state, Role::ReadOnlyLeaderless, None)
}

/// spec.md §4.2 "Gossip while ReadOnlyLeaderless": adopt the sole alive
/// leader if gossip reports exactly one, else keep waiting.
fn on_gossip_while_read_only_leaderless(
    ctx: &Context,
    state: &mut ControllerState,
    members: &[MemberInfo],
) -> Result<(), FatalReason> {
    let leaders = alive_leaders(members);
    if let [leader] = leaders[..] {
        let leader = leader.clone();
        state.rotate_state_correlation_id();
        state.rotate_leader_connection_id();
        state.rotate_subscription_id();
        super::transition_to(ctx, state, Role::PreReadOnlyReplica, Some(leader))
    } else {
        Ok(())
    }
}

/// spec.md §4.2 "Gossip while DiscoverLeader": the same single-leader rule,
/// additionally publishing `LeaderFound` and moving to `PreReplica`.
fn on_gossip_while_discover_leader(
    ctx: &Context,
    state: &mut ControllerState,
    members: &[MemberInfo],
) -> Result<(), FatalReason> {
    let leaders = alive_leaders(members);
    if let [leader] = leaders[..] {
        let leader = leader.clone();
        ctx.publish(OutboundMessage::LeaderFound);
        state.rotate_state_correlation_id();
        state.rotate_leader_connection_id();
        state.rotate_subscription_id();
        super::transition_to(ctx, state, Role::PreReplica, Some(leader))
    } else {
        Ok(())
    }
}

/// spec.md §4.2 "Gossip while DiscoverLeader", `DiscoveryTimeout` branch:
/// still leaderless after the discovery window, fall back to `Unknown`.
pub fn on_discovery_timeout(
    ctx: &Context,
    state: &mut ControllerState,
    correlation_id: Id,
) -> Result<(), FatalReason> {
    if !super::is_current(correlation_id, state.state_correlation_id) {
        return Ok(());
    }
    state.rotate_state_correlation_id();
    super::transition_to(ctx, state, Role::Unknown, None)
}

/// spec.md §4.2 "VNodeConnectionLost": only acts when the lost peer is the
/// believed leader; rotates the leader-connection id and schedules either a
/// reconnect (already subscribing) or a fresh `BecomePreReplica` attempt.
pub fn on_vnode_connection_lost(
    ctx: &Context,
    state: &mut ControllerState,
    member_id: Id,
) -> Result<(), FatalReason> {
    let Some(leader) = state.leader.clone() else {
        return Ok(());
    };
    if leader.instance_id != member_id {
        return Ok(());
    }
    state.rotate_leader_connection_id();
    let delay = ctx.config.timers.leader_reconnection_delay;
    match state.role {
        Role::PreReplica => {
            ctx.queue.schedule(
                delay,
                Message::ReconnectToLeader {
                    correlation_id: state.leader_connection_correlation_id,
                },
            );
        }
        Role::CatchingUp | Role::Clone | Role::Follower => {
            ctx.queue.schedule(
                delay,
                Message::BecomePreReplica {
                    correlation_id: state.state_correlation_id,
                    leader,
                },
            );
        }
        Role::PreReadOnlyReplica | Role::ReadOnlyReplica => {
            ctx.queue.schedule(
                delay,
                Message::BecomePreReadOnlyReplica {
                    correlation_id: state.state_correlation_id,
                    leader,
                },
            );
        }
        _ => {}
    }
    Ok(())
}
