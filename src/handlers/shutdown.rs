//! Lifecycle Orchestrator, shutdown half (spec.md §4.4 steps 1-5).

use super::Context;
use crate::fatal::FatalReason;
use crate::ids::Id;
use crate::message::{Message, ServiceId};
use crate::role::{ControllerState, Role};

pub fn on_request_shutdown(
    ctx: &Context,
    state: &mut ControllerState,
    exit_process: bool,
    _shutdown_http: bool,
) -> Result<(), FatalReason> {
    state.exit_process_on_shutdown = exit_process;
    let correlation_id = state.rotate_state_correlation_id();
    on_become_shutting_down(ctx, state, correlation_id)
}

/// spec.md §4.4 step 2: capture `exitProcessOnShutdown`, clear `leader`,
/// set a fresh `stateCorrelationId`, and schedule the shutdown watchdog.
/// `exitProcessOnShutdown` is already captured by the caller (either
/// `on_request_shutdown` or the auth-failure path, which defaults it to
/// the value already on `state`).
pub fn on_become_shutting_down(
    ctx: &Context,
    state: &mut ControllerState,
    correlation_id: Id,
) -> Result<(), FatalReason> {
    if !super::is_current(correlation_id, state.state_correlation_id) {
        return Ok(());
    }
    state.service_shutdowns_to_expect = ctx.config.expected_service_shutdowns();
    super::transition_to(ctx, state, Role::ShuttingDown, None)?;
    ctx.queue.schedule(
        ctx.config.timers.shutdown_timeout,
        Message::ShutdownTimeout {
            correlation_id: state.state_correlation_id,
        },
    );
    Ok(())
}

pub async fn on_service_shutdown(
    ctx: &Context,
    state: &mut ControllerState,
    service: ServiceId,
) -> Result<(), FatalReason> {
    state.service_shutdowns_to_expect -= 1;
    tracing::debug!(service, remaining = state.service_shutdowns_to_expect, "service shut down");
    if state.service_shutdowns_to_expect <= 0 {
        run_shutdown(ctx, state).await?;
    }
    Ok(())
}

pub async fn on_shutdown_timeout(
    ctx: &Context,
    state: &mut ControllerState,
    correlation_id: Id,
) -> Result<(), FatalReason> {
    if !super::is_current(correlation_id, state.state_correlation_id) {
        return Ok(());
    }
    tracing::error!(
        remaining = state.service_shutdowns_to_expect,
        "shutdown timed out waiting for services, forcing shutdown"
    );
    run_shutdown(ctx, state).await
}

/// spec.md §4.4 step 3/4: `Shutdown()` — close the log database, then
/// transition to `BecomeShutdown`, whether triggered by every service
/// acknowledging or by the timeout firing first.
async fn run_shutdown(ctx: &Context, state: &mut ControllerState) -> Result<(), FatalReason> {
    if let Err(err) = ctx.log_database.close().await {
        tracing::error!(%err, "log database close failed during shutdown");
    }
    on_become_shutdown(ctx, state)
}

/// spec.md §4.4 step 5: publish the final transition, stop the workers and
/// the main queue, and exit the process if requested.
pub fn on_become_shutdown(ctx: &Context, state: &mut ControllerState) -> Result<(), FatalReason> {
    super::transition_to(ctx, state, Role::Shutdown, None)?;
    ctx.worker_handler.stop();
    if state.exit_process_on_shutdown {
        ctx.terminator.exit_success();
    }
    Ok(())
}
