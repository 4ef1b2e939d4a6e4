mod support;

use std::{sync::Arc, time::Duration};

use hat_core::{shutdown_channel, IncomingMessage};
use hat_render::{
    has_math_fragments, run_markup_listener, ExternalCommand, RenderConfig, RenderPipeline,
};
use hat_triggers::{EchoTrigger, EchoTriggerConfig, MessageDispatcher, ReplyDelay, TriggerRuntime};
use tempfile::tempdir;

use support::{message, CapturingOutbound, Delivery, ScriptedHistory};

#[tokio::test]
async fn integration_echo_repeats_previous_message_and_debounces_same_author() {
    let outbound = Arc::new(CapturingOutbound::default());
    let history = Arc::new(ScriptedHistory::default());
    let mut dispatcher = MessageDispatcher::new();
    let mut runtime = TriggerRuntime::new();
    runtime.spawn_trigger(
        &mut dispatcher,
        EchoTrigger::new(EchoTriggerConfig::default(), history.clone()),
        outbound.clone(),
        ReplyDelay::NONE,
    );

    history.post(message(1, 10, 300, "the hat is on fire"));
    let first = message(2, 11, 300, "what");
    history.post(first.clone());
    assert_eq!(dispatcher.dispatch(first), 1);
    assert_eq!(
        outbound.wait_for(1).await,
        vec![Delivery::Text(
            300,
            "They said **THE HAT IS ON FIRE**".to_string()
        )]
    );

    history.post(message(3, 10, 300, "seriously"));
    let repeat = message(4, 11, 300, "WUT");
    history.post(repeat.clone());
    dispatcher.dispatch(repeat);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        outbound.deliveries().len(),
        1,
        "the same author must be debounced inside the cooldown"
    );

    history.post(message(5, 10, 300, "second thought"));
    let other_author = message(6, 12, 300, "wat");
    history.post(other_author.clone());
    dispatcher.dispatch(other_author);
    let deliveries = outbound.wait_for(2).await;
    assert_eq!(
        deliveries.get(1),
        Some(&Delivery::Text(300, "They said **SECOND THOUGHT**".to_string()))
    );

    runtime.shutdown().await;
}

const FAKE_COMPILER: &str = "for last; do :; done\ncp \"$last\" \"${last%.tex}.pdf\"\n";

const FAKE_RASTERIZER: &str = r#"cp "$2" "$3-1.png""#;

#[cfg(unix)]
#[tokio::test]
async fn integration_markup_listener_uploads_one_image_per_fragment() {
    let temp = tempdir().expect("tempdir");
    let compiler = temp.path().join("compiler.sh");
    let rasterizer = temp.path().join("rasterizer.sh");
    std::fs::write(&compiler, FAKE_COMPILER).expect("write compiler");
    std::fs::write(&rasterizer, FAKE_RASTERIZER).expect("write rasterizer");

    let mut config = RenderConfig::new(temp.path().join("work"), "doc %equation% end");
    config.compiler = ExternalCommand::new("sh").with_args([compiler.display().to_string()]);
    config.rasterizer = ExternalCommand::new("sh").with_args([rasterizer.display().to_string()]);
    let pipeline = Arc::new(RenderPipeline::new(config).expect("pipeline"));

    let outbound = Arc::new(CapturingOutbound::default());
    let mut dispatcher = MessageDispatcher::new();
    let inbox = dispatcher.subscribe(
        "markup",
        Arc::new(|message: &IncomingMessage| has_math_fragments(&message.content)),
    );
    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    let listener = tokio::spawn(run_markup_listener(
        pipeline,
        inbox,
        outbound.clone(),
        shutdown_rx,
    ));

    assert_eq!(dispatcher.dispatch(message(9, 10, 300, "no math here")), 0);
    assert_eq!(dispatcher.dispatch(message(10, 10, 300, "see $x^2$ and $y$")), 1);

    let deliveries = outbound.wait_for(2).await;
    assert_eq!(deliveries.len(), 2);
    for (index, delivery) in deliveries.iter().enumerate() {
        match delivery {
            Delivery::File(channel, path) => {
                assert_eq!(*channel, 300);
                assert!(path.ends_with(format!("10_{index}-1.png")));
            }
            other => panic!("unexpected delivery {other:?}"),
        }
    }

    drop(dispatcher);
    let report = tokio::time::timeout(Duration::from_secs(10), listener)
        .await
        .expect("listener drains and stops")
        .expect("listener join");
    drop(shutdown_tx);
    assert_eq!(report.messages, 1);
    assert_eq!(report.rendered, 2);
    assert_eq!(report.failed, 0);
}
