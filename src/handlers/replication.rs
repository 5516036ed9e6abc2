//! Replication subscription handshake (spec.md §4.2 "Replication handshake").

use super::Context;
use crate::fatal::FatalReason;
use crate::ids::Id;
use crate::message::{Message, OutboundMessage};
use crate::role::{ControllerState, Role};

/// Accepted only when the correlation id is current; records the
/// subscription id, forwards it to the output bus, and arms a watchdog
/// retry (spec.md §4.2).
pub fn on_subscribe_to_leader(
    ctx: &Context,
    state: &mut ControllerState,
    correlation_id: Id,
) -> Result<(), FatalReason> {
    if !super::is_current(correlation_id, state.state_correlation_id) {
        return Ok(());
    }
    let subscription_id = state.rotate_subscription_id();
    ctx.publish(OutboundMessage::SubscribeToLeader);
    let Some(leader) = state.leader.clone() else {
        return Ok(());
    };
    ctx.queue.schedule(
        ctx.config.timers.leader_subscription_timeout,
        Message::ReplicaSubscriptionRetry {
            subscription_id,
            leader_id: leader.instance_id,
        },
    );
    Ok(())
}

pub fn on_reconnect_to_leader(
    ctx: &Context,
    state: &mut ControllerState,
    correlation_id: Id,
) -> Result<(), FatalReason> {
    if !super::is_current(correlation_id, state.leader_connection_correlation_id) {
        return Ok(());
    }
    ctx.publish(OutboundMessage::SubscribeToLeader);
    Ok(())
}

pub fn on_leader_connection_failed(
    ctx: &Context,
    state: &mut ControllerState,
    correlation_id: Id,
) -> Result<(), FatalReason> {
    if !super::is_current(correlation_id, state.leader_connection_correlation_id) {
        return Ok(());
    }
    state.rotate_leader_connection_id();
    ctx.queue.schedule(
        ctx.config.timers.leader_reconnection_delay,
        Message::ReconnectToLeader {
            correlation_id: state.leader_connection_correlation_id,
        },
    );
    Ok(())
}

/// Accepted only when [`super::is_legitimate_replication_message`] holds;
/// re-arms the subscription watchdog.
pub fn on_replica_subscription_retry(
    ctx: &Context,
    state: &mut ControllerState,
    subscription_id: Id,
    leader_id: Id,
) -> Result<(), FatalReason> {
    if !super::is_legitimate_replication_message(state, subscription_id, leader_id)? {
        return Ok(());
    }
    ctx.queue.schedule(
        ctx.config.timers.leader_subscription_retry_delay,
        Message::SubscribeToLeader {
            correlation_id: state.state_correlation_id,
        },
    );
    Ok(())
}

/// spec.md §4.2: legitimate `ReplicaSubscribed` moves to `ReadOnlyReplica`
/// if this node is configured read-only, else `CatchingUp`.
pub fn on_replica_subscribed(
    ctx: &Context,
    state: &mut ControllerState,
    subscription_id: Id,
    leader_id: Id,
) -> Result<(), FatalReason> {
    if !super::is_legitimate_replication_message(state, subscription_id, leader_id)? {
        return Ok(());
    }
    let leader = state.leader.clone();
    let target = if ctx.node_info.is_read_only_replica || ctx.config.read_only {
        Role::ReadOnlyReplica
    } else {
        Role::CatchingUp
    };
    super::transition_to(ctx, state, target, leader)
}

/// spec.md §4.2: legitimate, in `CatchingUp`/`Clone` only.
pub fn on_follower_assignment(
    ctx: &Context,
    state: &mut ControllerState,
    subscription_id: Id,
    leader_id: Id,
) -> Result<(), FatalReason> {
    if !super::is_legitimate_replication_message(state, subscription_id, leader_id)? {
        return Ok(());
    }
    if !matches!(state.role, Role::CatchingUp | Role::Clone) {
        return Ok(());
    }
    let leader = state.leader.clone();
    super::transition_to(ctx, state, Role::Follower, leader)
}

/// spec.md §4.2: legitimate, in `CatchingUp`/`Follower` only.
pub fn on_clone_assignment(
    ctx: &Context,
    state: &mut ControllerState,
    subscription_id: Id,
    leader_id: Id,
) -> Result<(), FatalReason> {
    if !super::is_legitimate_replication_message(state, subscription_id, leader_id)? {
        return Ok(());
    }
    if !matches!(state.role, Role::CatchingUp | Role::Follower) {
        return Ok(());
    }
    let leader = state.leader.clone();
    super::transition_to(ctx, state, Role::Clone, leader)
}

/// spec.md §4.2: legitimate, in `Clone` only; initiates shutdown with
/// `exitProcess=true`.
pub fn on_drop_subscription(
    ctx: &Context,
    state: &mut ControllerState,
    subscription_id: Id,
    leader_id: Id,
) -> Result<(), FatalReason> {
    if !super::is_legitimate_replication_message(state, subscription_id, leader_id)? {
        return Ok(());
    }
    if state.role != Role::Clone {
        return Ok(());
    }
    state.exit_process_on_shutdown = true;
    let correlation_id = state.rotate_state_correlation_id();
    super::shutdown::on_become_shutting_down(ctx, state, correlation_id)
}
