//! The output bus and main queue handles, and the collaborator interfaces
//! the controller talks to but does not own (spec.md §2, §6).

use crate::error::ControllerError;
use crate::ids::Id;
use crate::message::{Message, OutboundMessage};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

/// Capacity of the output-bus broadcast channel. Generous: subordinate
/// services are expected to keep up, not the controller to block on them.
const OUTPUT_BUS_CAPACITY: usize = 4096;
/// Capacity of the main queue. Timer messages, gossip, and client requests
/// all land here; sized to absorb a burst without applying backpressure to
/// callers that can't usefully wait (e.g. a timer firing).
const MAIN_QUEUE_CAPACITY: usize = 4096;

/// Publish-only handle to the output bus, fanned out to subordinate
/// services (spec.md §2: "publishing outbound messages to an output bus").
#[derive(Clone)]
pub struct OutputBus {
    sender: broadcast::Sender<OutboundMessage>,
}

impl OutputBus {
    pub fn new() -> (Self, broadcast::Receiver<OutboundMessage>) {
        let (sender, receiver) = broadcast::channel(OUTPUT_BUS_CAPACITY);
        (Self { sender }, receiver)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OutboundMessage> {
        self.sender.subscribe()
    }

    pub fn publish(&self, message: OutboundMessage) -> Result<(), ControllerError> {
        // A broadcast send fails only when there are zero receivers, which
        // is not an error condition worth propagating loudly: subordinate
        // services may not have subscribed yet during early startup.
        match self.sender.send(message) {
            Ok(_) => Ok(()),
            Err(_) => {
                tracing::debug!("published to output bus with no active subscribers");
                Ok(())
            }
        }
    }
}

/// Publish-only handle back to the controller's own main queue
/// (spec.md §2: "scheduling future timer messages back to itself").
#[derive(Clone)]
pub struct MainQueue {
    sender: mpsc::Sender<Message>,
}

impl MainQueue {
    pub fn channel() -> (Self, mpsc::Receiver<Message>) {
        let (sender, receiver) = mpsc::channel(MAIN_QUEUE_CAPACITY);
        (Self { sender }, receiver)
    }

    /// Posts a message to be processed on a future turn of the main loop.
    /// Used both for self-triggered transitions and for timer scheduling.
    pub async fn post(&self, message: Message) -> Result<(), ControllerError> {
        self.sender
            .send(message)
            .await
            .map_err(|_| ControllerError::MainQueueClosed("post"))
    }

    /// Schedules `message` to be posted after `delay`. Spawns a detached
    /// timer task (`tokio::time::sleep` + a channel send). There is no
    /// cancellation handle by design — see spec.md §5 "Cancellation
    /// semantics": the handler on the other end is expected to drop the
    /// message on a stale correlation id instead.
    pub fn schedule(&self, delay: Duration, message: Message) {
        let sender = self.sender.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = sender.send(message).await;
        });
    }
}

/// Collaborator: registers a pending forwarded write and replies with a
/// timeout message if the leader does not respond in time (spec.md §2,
/// GLOSSARY "Forwarding Proxy"). Not specified here beyond this interface.
#[async_trait::async_trait]
pub trait ForwardingProxy: Send + Sync {
    async fn register_forward(
        &self,
        internal_correlation_id: Id,
        external_correlation_id: Id,
        timeout: Duration,
    ) -> Result<(), ControllerError>;
}

/// Collaborator: the on-disk log database, closed exactly once inside
/// `Shutdown()` (spec.md §5 "Shared resources").
#[async_trait::async_trait]
pub trait LogDatabase: Send + Sync {
    async fn close(&self) -> Result<(), ControllerError>;
}

/// Collaborator: the node's worker/thread-pool handler, stopped during
/// `BecomeShutdown` (spec.md §4.4 step 5).
pub trait WorkerHandler: Send + Sync {
    fn stop(&self);
}

/// A no-op forwarding proxy used where only the registration side-effect
/// matters for testing admission in isolation.
pub struct NullForwardingProxy;

#[async_trait::async_trait]
impl ForwardingProxy for NullForwardingProxy {
    async fn register_forward(
        &self,
        _internal_correlation_id: Id,
        _external_correlation_id: Id,
        _timeout: Duration,
    ) -> Result<(), ControllerError> {
        Ok(())
    }
}

pub fn null_forwarding_proxy() -> Arc<dyn ForwardingProxy> {
    Arc::new(NullForwardingProxy)
}
