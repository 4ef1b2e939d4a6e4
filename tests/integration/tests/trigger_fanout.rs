mod support;

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use hat_core::IncomingMessage;
use hat_triggers::{
    MentionTrigger, MentionTriggerConfig, MessageDispatcher, MessageFilter, Reply, ReplyDelay,
    Trigger, TriggerRuntime,
};
use tokio::{sync::Notify, time::Instant};

use support::{message, CapturingOutbound, Delivery};

/// Parks inside `evaluate` until released.
struct StalledTrigger {
    release: Arc<Notify>,
}

#[async_trait]
impl Trigger for StalledTrigger {
    fn name(&self) -> &'static str {
        "stalled"
    }

    fn filter(&self) -> MessageFilter {
        Arc::new(|_: &IncomingMessage| true)
    }

    async fn evaluate(&mut self, _message: &IncomingMessage, _now: Instant) -> Result<Option<Reply>> {
        self.release.notified().await;
        Ok(Some(Reply::Text("finally".to_string())))
    }

    fn record_fire(&mut self, _message: &IncomingMessage, _now: Instant) {}
}

fn mention_trigger() -> MentionTrigger {
    MentionTrigger::new(MentionTriggerConfig {
        actor_id: 42,
        replies: vec!["you called".to_string()],
        replies_file: None,
        command_prefix: "!".to_string(),
    })
}

#[tokio::test]
async fn integration_stalled_trigger_does_not_block_other_reactors() {
    let outbound = Arc::new(CapturingOutbound::default());
    let release = Arc::new(Notify::new());
    let mut dispatcher = MessageDispatcher::new();
    let mut runtime = TriggerRuntime::new();
    runtime.spawn_trigger(
        &mut dispatcher,
        StalledTrigger {
            release: Arc::clone(&release),
        },
        outbound.clone(),
        ReplyDelay::NONE,
    );
    runtime.spawn_trigger(&mut dispatcher, mention_trigger(), outbound.clone(), ReplyDelay::NONE);

    assert_eq!(dispatcher.dispatch(message(1, 7, 300, "hi <@42>")), 2);

    let deliveries = outbound.wait_for(1).await;
    assert_eq!(deliveries, vec![Delivery::Text(300, "you called".to_string())]);

    release.notify_one();
    let deliveries = outbound.wait_for(2).await;
    assert_eq!(deliveries.len(), 2);
    assert_eq!(deliveries[1], Delivery::Text(300, "finally".to_string()));

    runtime.shutdown().await;
}

#[tokio::test]
async fn integration_shutdown_interrupts_pending_evaluation() {
    let outbound = Arc::new(CapturingOutbound::default());
    let mut dispatcher = MessageDispatcher::new();
    let mut runtime = TriggerRuntime::new();
    runtime.spawn_trigger(
        &mut dispatcher,
        StalledTrigger {
            release: Arc::new(Notify::new()),
        },
        outbound.clone(),
        ReplyDelay::NONE,
    );
    dispatcher.dispatch(message(1, 7, 300, "anything"));
    tokio::time::sleep(Duration::from_millis(20)).await;

    tokio::time::timeout(Duration::from_secs(5), runtime.shutdown())
        .await
        .expect("shutdown should not wait for the stalled evaluation");
    assert!(outbound.deliveries().is_empty());
}
