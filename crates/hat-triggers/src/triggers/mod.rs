//! Trigger evaluators and the loop that drives each one.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use hat_core::{wait_for_shutdown, ChatOutbound, IncomingMessage};
use rand::seq::SliceRandom;
use tokio::{sync::watch, time::Instant};

use crate::{send_with_typing_delay, MessageFilter, MessageInbox, Reply, ReplyDelay};

pub mod echo;
pub mod keyword_image;
pub mod mention;

/// A fixed (predicate, action) pair with its own private state.
#[async_trait]
pub trait Trigger: Send + 'static {
    fn name(&self) -> &'static str;

    /// Predicate handed to the dispatcher. Must not depend on mutable trigger state.
    fn filter(&self) -> MessageFilter;

    /// Decides whether to reply to `message`. Cooldown checks happen here.
    async fn evaluate(&mut self, message: &IncomingMessage, now: Instant)
        -> Result<Option<Reply>>;

    /// Commits the fire once the reply was sent.
    fn record_fire(&mut self, message: &IncomingMessage, now: Instant);
}

/// Counters reported when a trigger loop exits.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TriggerRunReport {
    pub received: usize,
    pub replied: usize,
    pub skipped: usize,
    pub failed: usize,
}

enum HandleOutcome {
    Replied,
    Skipped,
    Failed,
}

/// Drains `inbox` in arrival order until shutdown or until the dispatcher goes away.
///
/// Handling of the current message races the shutdown signal, so a cancelled
/// send never records a fire.
pub async fn run_trigger<T: Trigger>(
    mut trigger: T,
    mut inbox: MessageInbox,
    outbound: Arc<dyn ChatOutbound>,
    delay: ReplyDelay,
    mut shutdown: watch::Receiver<bool>,
) -> TriggerRunReport {
    let name = trigger.name();
    let mut report = TriggerRunReport::default();
    tracing::info!(trigger = name, "trigger evaluator started");

    loop {
        let message = tokio::select! {
            biased;
            _ = wait_for_shutdown(&mut shutdown) => break,
            next = inbox.recv() => match next {
                Some(message) => message,
                None => break,
            },
        };
        report.received = report.received.saturating_add(1);

        let outcome = tokio::select! {
            biased;
            _ = wait_for_shutdown(&mut shutdown) => break,
            outcome = handle_message(&mut trigger, &message, outbound.as_ref(), delay) => outcome,
        };
        match outcome {
            HandleOutcome::Replied => report.replied = report.replied.saturating_add(1),
            HandleOutcome::Skipped => report.skipped = report.skipped.saturating_add(1),
            HandleOutcome::Failed => report.failed = report.failed.saturating_add(1),
        }
    }

    tracing::info!(
        trigger = name,
        received = report.received,
        replied = report.replied,
        skipped = report.skipped,
        failed = report.failed,
        "trigger evaluator stopped"
    );
    report
}

async fn handle_message<T: Trigger>(
    trigger: &mut T,
    message: &IncomingMessage,
    outbound: &dyn ChatOutbound,
    delay: ReplyDelay,
) -> HandleOutcome {
    let reply = match trigger.evaluate(message, Instant::now()).await {
        Ok(Some(reply)) => reply,
        Ok(None) => return HandleOutcome::Skipped,
        Err(error) => {
            tracing::warn!(
                trigger = trigger.name(),
                message_id = message.id,
                error = %error,
                "trigger evaluation failed"
            );
            return HandleOutcome::Failed;
        }
    };

    match send_with_typing_delay(outbound, message.channel_id, &reply, delay).await {
        Ok(()) => {
            trigger.record_fire(message, Instant::now());
            tracing::debug!(
                trigger = trigger.name(),
                message_id = message.id,
                channel_id = message.channel_id,
                "trigger replied"
            );
            HandleOutcome::Replied
        }
        Err(error) => {
            tracing::warn!(
                trigger = trigger.name(),
                message_id = message.id,
                channel_id = message.channel_id,
                error = %error,
                "trigger reply failed"
            );
            HandleOutcome::Failed
        }
    }
}

pub(crate) fn pick_random<T: Clone>(items: &[T]) -> Option<T> {
    items.choose(&mut rand::thread_rng()).cloned()
}
