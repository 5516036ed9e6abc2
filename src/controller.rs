//! The controller: owns [`ControllerState`], the dispatcher, and the main
//! queue receiver, and drives the single-consumer run loop (spec.md §2,
//! §5 "Scheduling model").

use crate::admission;
use crate::bus::{ForwardingProxy, LogDatabase, MainQueue, OutputBus, WorkerHandler};
use crate::config::ControllerConfig;
use crate::dispatch::{self, Action, Dispatcher};
use crate::fatal::ProcessTerminator;
use crate::handlers::{self, Context, HandleOutcome};
use crate::message::{Message, MessageKind, OutboundMessage};
use crate::node_info::NodeInfo;
use crate::role::{ControllerState, Role};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

/// The collaborator handles the controller needs but does not own
/// (spec.md §2 "Components", row "Forwarding Proxy"; §5 "Shared resources").
pub struct Collaborators {
    pub forwarding_proxy: Arc<dyn ForwardingProxy>,
    pub log_database: Arc<dyn LogDatabase>,
    pub worker_handler: Arc<dyn WorkerHandler>,
    pub terminator: Arc<dyn ProcessTerminator>,
}

/// The number of core services the lifecycle orchestrator waits on before
/// publishing `SystemStart` (spec.md §4.4 step 2). Fixed by this
/// controller's own startup contract, not configuration.
const CORE_SERVICES: i64 = 3;

pub struct Controller {
    state: ControllerState,
    dispatcher: Dispatcher,
    ctx: Context,
    main_rx: mpsc::Receiver<Message>,
}

/// Handles external code uses to talk to a running [`Controller`]: post
/// messages onto its main queue, and subscribe to its output bus.
pub struct ControllerHandles {
    pub queue: MainQueue,
    pub output: OutputBus,
}

impl Controller {
    pub fn new(
        node_info: NodeInfo,
        config: ControllerConfig,
        collaborators: Collaborators,
    ) -> (Self, ControllerHandles) {
        let (queue, main_rx) = MainQueue::channel();
        let (output, _first_subscriber) = OutputBus::new();
        let subsystem_count = config.subsystem_count;
        let ctx = Context {
            self_instance_id: node_info.instance_id,
            node_info,
            config,
            output: output.clone(),
            queue: queue.clone(),
            forwarding_proxy: collaborators.forwarding_proxy,
            log_database: collaborators.log_database,
            worker_handler: collaborators.worker_handler,
            terminator: collaborators.terminator,
        };
        let controller = Controller {
            state: ControllerState::new(CORE_SERVICES, subsystem_count),
            dispatcher: dispatch::table::build(),
            ctx,
            main_rx,
        };
        let handles = ControllerHandles { queue, output };
        (controller, handles)
    }

    pub fn subscribe_output(&self) -> broadcast::Receiver<OutboundMessage> {
        self.ctx.output.subscribe()
    }

    /// The controller's current role. Read-only observation, not part of
    /// the role-handler surface — exposed so a host or test can report
    /// status without reaching into `ControllerState` (spec.md §9 design
    /// notes: "expose that as a small injected interface to keep the
    /// controller testable").
    pub fn role(&self) -> Role {
        self.state.role
    }

    /// The live `stateCorrelationId`, needed by a caller that wants to
    /// address a role-transition or chaser-handshake message to the
    /// controller's *current* attempt rather than guess at a stale one.
    pub fn state_correlation_id(&self) -> crate::ids::Id {
        self.state.state_correlation_id
    }

    /// The live `subscriptionId`, set once the replication handshake has
    /// begun (`None` beforehand, per spec.md §3).
    pub fn subscription_id(&self) -> Option<crate::ids::Id> {
        self.state.subscription_id
    }

    /// Runs the single-consumer main loop until `Shutdown` is reached or
    /// the main queue closes (spec.md §3 invariant 6, §5 "Scheduling
    /// model": "there are no locks inside the controller").
    pub async fn run(mut self) {
        while let Some(message) = self.main_rx.recv().await {
            self.process_one(message).await;
            if self.state.role.is_terminal() {
                tracing::info!("reached terminal role, stopping main loop");
                break;
            }
        }
    }

    /// Processes whatever is already on the main queue, including messages
    /// that arrive while draining (self-posted chained transitions,
    /// timers scheduled with a short delay), until the queue has been idle
    /// for `idle` or `Shutdown` is reached. A test/driver-only complement to
    /// `run`, which loops forever instead of returning control.
    pub async fn drain(&mut self, idle: std::time::Duration) {
        loop {
            match tokio::time::timeout(idle, self.main_rx.recv()).await {
                Ok(Some(message)) => {
                    self.process_one(message).await;
                    if self.state.role.is_terminal() {
                        break;
                    }
                }
                _ => break,
            }
        }
    }

    async fn process_one(&mut self, message: Message) {
        let kind = MessageKind::from(&message);
        let role = self.state.role;

        match self.dispatcher.resolve_or_fatal(role, kind) {
            Err(fatal) => handlers::fail_fatal(&self.ctx, fatal),
            Ok(Action::Ignore) => {
                tracing::debug!(%role, %kind, "ignored");
            }
            Ok(Action::Forward) => {
                if let Err(err) = self.forward(message) {
                    tracing::warn!(%err, "failed to forward message to output bus");
                }
            }
            Ok(Action::Deny(reason)) => {
                tracing::warn!(reason, %kind, "denied message outside admission path");
            }
            Ok(Action::Fatal) => {
                // `resolve_or_fatal` already turns `Action::Fatal` into an
                // `Err`; unreachable in practice, kept for exhaustiveness.
                tracing::error!(%kind, %role, "dispatcher resolved Fatal outside the Err path");
            }
            Ok(Action::Handle) => self.handle_claimed(message).await,
        }
    }

    /// Routes an `Action::Handle` message to admission (client requests) or
    /// the role-handler dispatch table (everything else).
    async fn handle_claimed(&mut self, message: Message) {
        if let Message::ClientRequest(request) = message {
            let decision = admission::decide(&self.state, &request);
            if let Err(err) = admission::admit(&self.ctx, &self.state, request, decision).await {
                tracing::warn!(%err, "admission failed to carry out its decision");
            }
            return;
        }
        if let Err(HandleOutcome::Fatal(reason)) =
            handlers::handle(&self.ctx, &mut self.state, message).await
        {
            handlers::fail_fatal(&self.ctx, reason);
        }
    }

    /// Forwards a message whose dispatcher action is `Forward` straight to
    /// the output bus, translated into the outbound shape subordinate
    /// services expect. `WriteEpoch` carries a payload services act on
    /// directly; everything else forwarded (an `ElectionsDone` this role
    /// doesn't act on, replication data-plane traffic, `*Completed` replies)
    /// is relayed unchanged via `Relayed` rather than dropped or remapped to
    /// an unrelated outbound kind.
    fn forward(&self, message: Message) -> Result<(), crate::error::ControllerError> {
        let kind = MessageKind::from(&message);
        let outbound = match message {
            Message::WriteEpoch { proposal_number } => OutboundMessage::WriteEpoch { proposal_number },
            _ => OutboundMessage::Relayed(kind),
        };
        self.ctx.output.publish(outbound)
    }
}
