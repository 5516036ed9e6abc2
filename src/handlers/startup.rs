//! Lifecycle Orchestrator, startup half (spec.md §4.4).

use super::Context;
use crate::fatal::FatalReason;
use crate::ids::Id;
use crate::message::{Message, OutboundMessage, ServiceId, SubsystemId};
use crate::role::{ControllerState, Role};
use std::sync::atomic::Ordering;

/// spec.md §4.4 step 1: publish the init notification and wait for core
/// services to report in via `ServiceInitialized`.
pub fn on_system_init(ctx: &Context, _state: &mut ControllerState) -> Result<(), FatalReason> {
    ctx.publish(OutboundMessage::SystemInit);
    Ok(())
}

pub fn on_service_initialized(
    ctx: &Context,
    state: &mut ControllerState,
    service: ServiceId,
) -> Result<(), FatalReason> {
    state.service_inits_to_expect -= 1;
    tracing::debug!(service, remaining = state.service_inits_to_expect, "service initialized");
    if state.service_inits_to_expect <= 0 {
        ctx.publish(OutboundMessage::SystemStart);
        ctx.queue_post(Message::SystemStart);
    }
    Ok(())
}

pub fn on_system_start(ctx: &Context, state: &mut ControllerState) -> Result<(), FatalReason> {
    if ctx.node_info.is_read_only_replica || ctx.config.read_only {
        super::transition_to(ctx, state, Role::ReadOnlyLeaderless, None)
    } else if ctx.config.cluster_size > 1 {
        let correlation_id = state.rotate_state_correlation_id();
        on_become_discover_leader(ctx, state, correlation_id)
    } else {
        super::transition_to(ctx, state, Role::Unknown, None)
    }
}

/// Entering `DiscoverLeader` schedules its discovery-timeout watchdog
/// (spec.md §4.4 step 4).
pub fn on_become_discover_leader(
    ctx: &Context,
    state: &mut ControllerState,
    correlation_id: Id,
) -> Result<(), FatalReason> {
    if !super::is_current(correlation_id, state.state_correlation_id) {
        return Ok(());
    }
    super::transition_to(ctx, state, Role::DiscoverLeader, None)?;
    ctx.queue.schedule(
        ctx.config.timers.leader_discovery_timeout,
        Message::DiscoveryTimeout {
            correlation_id: state.state_correlation_id,
        },
    );
    Ok(())
}

pub fn on_authentication_provider_initialized(
    ctx: &Context,
    _state: &mut ControllerState,
) -> Result<(), FatalReason> {
    ctx.publish(OutboundMessage::StartSubsystems);
    ctx.queue_post(Message::SystemCoreReady);
    Ok(())
}

pub async fn on_authentication_provider_initialization_failed(
    ctx: &Context,
    state: &mut ControllerState,
    reason: &str,
) -> Result<(), FatalReason> {
    tracing::warn!(reason, "authentication provider initialization failed, shutting down");
    let correlation_id = state.rotate_state_correlation_id();
    super::shutdown::on_become_shutting_down(ctx, state, correlation_id)
}

pub fn on_subsystem_initialized(
    ctx: &Context,
    state: &mut ControllerState,
    subsystem: SubsystemId,
) -> Result<(), FatalReason> {
    let remaining = state.decrement_subsystem_inits();
    tracing::debug!(subsystem, remaining, "subsystem initialized");
    if remaining <= 0 {
        ctx.publish(OutboundMessage::SystemReady);
    }
    Ok(())
}

pub fn on_system_core_ready(ctx: &Context, state: &mut ControllerState) -> Result<(), FatalReason> {
    if state.subsystem_inits_to_expect.load(Ordering::SeqCst) <= 0 {
        ctx.publish(OutboundMessage::SystemReady);
    }
    Ok(())
}

