use std::sync::Arc;

use anyhow::{Context, Result};
use hat_core::{ChannelHistory, ChannelNames, ChatOutbound, IncomingMessage};
use hat_render::{
    has_math_fragments, load_template, run_artifact_sweeper, run_markup_listener, RenderPipeline,
};
use hat_triggers::{
    gateway_queue, run_dispatch_forwarder, EchoTrigger, KeywordImageTrigger, MentionTrigger,
    MessageDispatcher, TriggerRuntime,
};
use serenity::{all::GatewayIntents, http::Http, Client};
use tracing_subscriber::EnvFilter;

use crate::{
    config::BotConfig,
    discord::{BotEventHandler, ChannelDirectory, SerenityHistory, SerenityOutbound},
};

/// `RUST_LOG` wins over `--log-filter` when both are present.
pub fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init();
}

/// Spawns every reactor against the given seams and returns the runtime that
/// owns them together with the dispatcher feeding them.
pub fn build_runtime(
    config: &BotConfig,
    actor_id: u64,
    outbound: Arc<dyn ChatOutbound>,
    history: Arc<dyn ChannelHistory>,
) -> Result<(TriggerRuntime, MessageDispatcher)> {
    let mut runtime = TriggerRuntime::new();
    let mut dispatcher = MessageDispatcher::new();
    let delay = config.reply_delay();

    runtime.spawn_trigger(
        &mut dispatcher,
        EchoTrigger::new(config.echo_config(), history),
        Arc::clone(&outbound),
        delay,
    );
    runtime.spawn_trigger(
        &mut dispatcher,
        KeywordImageTrigger::new(config.keyword_image_config()),
        Arc::clone(&outbound),
        delay,
    );
    runtime.spawn_trigger(
        &mut dispatcher,
        MentionTrigger::new(config.mention_config(actor_id)),
        Arc::clone(&outbound),
        delay,
    );

    if config.render.enabled {
        let template = load_template(&config.render.template_path, &config.render.placeholder)?;
        let pipeline = Arc::new(RenderPipeline::new(config.render_config(template))?);
        let inbox = dispatcher.subscribe(
            "markup",
            Arc::new(|message: &IncomingMessage| has_math_fragments(&message.content)),
        );
        let shutdown = runtime.shutdown_receiver();
        runtime.spawn_task("markup", async move {
            run_markup_listener(pipeline, inbox, outbound, shutdown).await;
        });
        let shutdown = runtime.shutdown_receiver();
        runtime.spawn_task(
            "artifact_sweeper",
            run_artifact_sweeper(config.sweeper_config(), shutdown),
        );
    } else {
        tracing::info!("markup rendering disabled");
    }

    Ok((runtime, dispatcher))
}

pub async fn run_bot(token: &str, config: BotConfig) -> Result<()> {
    let http = Arc::new(Http::new(token));
    let actor = http
        .get_current_user()
        .await
        .context("failed to resolve the bot user; check DISCORD_TOKEN")?;
    tracing::info!(user = %actor.name, id = actor.id.get(), "authenticated");

    let directory = Arc::new(ChannelDirectory::new(Arc::clone(&http)));
    let outbound: Arc<dyn ChatOutbound> = Arc::new(SerenityOutbound::new(Arc::clone(&http)));
    let history: Arc<dyn ChannelHistory> =
        Arc::new(SerenityHistory::new(Arc::clone(&http), Arc::clone(&directory)));
    let (mut runtime, dispatcher) = build_runtime(&config, actor.id.get(), outbound, history)?;
    tracing::info!(reactors = ?dispatcher.subscription_names(), "reactors started");

    let (gateway, queue) = gateway_queue();
    let names: Arc<dyn ChannelNames> = directory;
    let shutdown = runtime.shutdown_receiver();
    runtime.spawn_task("dispatch_forwarder", async move {
        run_dispatch_forwarder(queue, names, Arc::new(dispatcher), shutdown).await;
    });

    let handler = BotEventHandler::new(gateway);
    let intents = GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;
    let mut client = Client::builder(token, intents)
        .event_handler(handler)
        .await
        .context("failed to build discord client")?;
    let shard_manager = Arc::clone(&client.shard_manager);

    let outcome = tokio::select! {
        result = client.start() => result.context("discord client stopped"),
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown requested");
            shard_manager.shutdown_all().await;
            Ok(())
        }
    };
    runtime.shutdown().await;
    outcome
}
