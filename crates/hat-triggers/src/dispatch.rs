//! Fan-out of inbound messages to per-trigger subscriptions.

use std::sync::Arc;

use hat_core::{wait_for_shutdown, ChannelNames, IncomingMessage};
use tokio::sync::{mpsc, watch};

/// Synchronous predicate deciding whether a subscription sees a message.
pub type MessageFilter = Arc<dyn Fn(&IncomingMessage) -> bool + Send + Sync>;

/// Receiving end of a subscription, drained by exactly one task.
pub type MessageInbox = mpsc::UnboundedReceiver<Arc<IncomingMessage>>;

/// Gateway side of the forwarder queue. Messages may arrive without a channel name.
pub type GatewaySender = mpsc::UnboundedSender<IncomingMessage>;
pub type GatewayQueue = mpsc::UnboundedReceiver<IncomingMessage>;

pub fn gateway_queue() -> (GatewaySender, GatewayQueue) {
    mpsc::unbounded_channel()
}

struct Subscription {
    name: &'static str,
    filter: MessageFilter,
    sender: mpsc::UnboundedSender<Arc<IncomingMessage>>,
}

/// Routes each inbound message to every subscription whose filter accepts it.
///
/// Queues are unbounded so a slow consumer never delays delivery to the others.
#[derive(Default)]
pub struct MessageDispatcher {
    subscriptions: Vec<Subscription>,
}

impl MessageDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, name: &'static str, filter: MessageFilter) -> MessageInbox {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.subscriptions.push(Subscription {
            name,
            filter,
            sender,
        });
        receiver
    }

    pub fn subscription_names(&self) -> Vec<&'static str> {
        self.subscriptions.iter().map(|entry| entry.name).collect()
    }

    /// Delivers `message` and returns how many subscriptions accepted it.
    pub fn dispatch(&self, message: IncomingMessage) -> usize {
        let message = Arc::new(message);
        let mut delivered = 0;
        for subscription in &self.subscriptions {
            if !(subscription.filter)(message.as_ref()) {
                continue;
            }
            if subscription.sender.send(Arc::clone(&message)).is_err() {
                tracing::debug!(
                    subscription = subscription.name,
                    message_id = message.id,
                    "subscription closed; message dropped"
                );
                continue;
            }
            delivered += 1;
        }
        delivered
    }
}

/// Resolves channel names and dispatches gateway messages one at a time, so
/// subscribers see them in the order the gateway produced them. Returns the
/// number of messages forwarded.
pub async fn run_dispatch_forwarder(
    mut queue: GatewayQueue,
    names: Arc<dyn ChannelNames>,
    dispatcher: Arc<MessageDispatcher>,
    mut shutdown: watch::Receiver<bool>,
) -> usize {
    let mut forwarded = 0_usize;
    loop {
        let mut message = tokio::select! {
            biased;
            _ = wait_for_shutdown(&mut shutdown) => break,
            next = queue.recv() => match next {
                Some(message) => message,
                None => break,
            },
        };
        if message.channel_name.is_empty() {
            message.channel_name = names.channel_name(message.channel_id).await;
        }
        let message_id = message.id;
        let delivered = dispatcher.dispatch(message);
        forwarded = forwarded.saturating_add(1);
        tracing::trace!(message_id, delivered, "message dispatched");
    }
    tracing::debug!(forwarded, "dispatch forwarder stopped");
    forwarded
}
