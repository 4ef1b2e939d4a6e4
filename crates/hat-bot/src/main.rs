mod config;
mod discord;
mod startup;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use crate::config::BotConfig;

#[derive(Debug, Parser)]
#[command(name = "hatbot", version, about = "Discord reaction bot with LaTeX rendering")]
struct Cli {
    #[arg(long, env = "DISCORD_TOKEN", hide_env_values = true)]
    discord_token: String,

    #[arg(long, env = "HATBOT_CONFIG", default_value = "hatbot.toml")]
    config: PathBuf,

    #[arg(long, env = "HATBOT_LOG", default_value = "info")]
    log_filter: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    startup::init_tracing(&cli.log_filter);
    let config = BotConfig::load(&cli.config)?;
    startup::run_bot(&cli.discord_token, config).await
}
