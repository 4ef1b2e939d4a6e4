//! TOML configuration. Every key is optional and falls back to the default
//! documented on its field.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{bail, Context, Result};
use hat_render::{ArtifactSweeperConfig, ExternalCommand, RenderConfig};
use hat_triggers::{
    EchoTriggerConfig, KeywordImageConfig, KeywordSet, MentionTriggerConfig, ReplyDelay,
};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// `"!"`. Messages starting with it are commands and never trigger.
    pub command_prefix: String,
    /// `"general"`. Echo and keyword-image stay quiet there; `""` disables.
    pub no_trigger_channel: String,
    pub echo: EchoSection,
    pub keyword_image: KeywordImageSection,
    pub mention: MentionSection,
    pub reply_delay: ReplyDelaySection,
    pub render: RenderSection,
    pub cleanup: CleanupSection,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            command_prefix: "!".to_string(),
            no_trigger_channel: "general".to_string(),
            echo: EchoSection::default(),
            keyword_image: KeywordImageSection::default(),
            mention: MentionSection::default(),
            reply_delay: ReplyDelaySection::default(),
            render: RenderSection::default(),
            cleanup: CleanupSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EchoSection {
    pub keywords: Vec<String>,
    pub cooldown_seconds: u64,
}

impl Default for EchoSection {
    fn default() -> Self {
        Self {
            keywords: ["what", "whut", "whot", "wat", "wut", "wot"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            cooldown_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KeywordImageSection {
    pub phrase: String,
    pub asset_dir: PathBuf,
    pub cooldown_seconds: u64,
}

impl Default for KeywordImageSection {
    fn default() -> Self {
        Self {
            phrase: "hello there".to_string(),
            asset_dir: PathBuf::from("assets/hellothere"),
            cooldown_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MentionSection {
    pub replies: Vec<String>,
    pub replies_file: Option<PathBuf>,
}

impl Default for MentionSection {
    fn default() -> Self {
        Self {
            replies: vec!["You rang?".to_string()],
            replies_file: Some(PathBuf::from("assets/mentions.json")),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReplyDelaySection {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl Default for ReplyDelaySection {
    fn default() -> Self {
        Self {
            min_ms: 500,
            max_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CommandSection {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSection {
    fn named(program: &str) -> Self {
        Self {
            program: program.to_string(),
            args: Vec::new(),
        }
    }

    fn to_external_command(&self) -> ExternalCommand {
        ExternalCommand::new(self.program.clone()).with_args(self.args.iter().cloned())
    }
}

impl Default for CommandSection {
    fn default() -> Self {
        Self::named("pdflatex")
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RenderSection {
    pub enabled: bool,
    pub template_path: PathBuf,
    pub placeholder: String,
    pub work_dir: PathBuf,
    pub compiler: CommandSection,
    pub rasterizer: CommandSection,
    pub process_timeout_seconds: u64,
    pub retain_artifacts: bool,
}

impl Default for RenderSection {
    fn default() -> Self {
        Self {
            enabled: true,
            template_path: PathBuf::from("assets/tex/struct.tex"),
            placeholder: hat_render::DEFAULT_PLACEHOLDER.to_string(),
            work_dir: PathBuf::from("assets/tex/temp"),
            compiler: CommandSection::named("pdflatex"),
            rasterizer: CommandSection::named("pdftoppm"),
            process_timeout_seconds: 60,
            retain_artifacts: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CleanupSection {
    pub interval_seconds: u64,
    pub expiration_seconds: u64,
}

impl Default for CleanupSection {
    fn default() -> Self {
        Self {
            interval_seconds: 60 * 60,
            expiration_seconds: 24 * 60 * 60,
        }
    }
}

impl BotConfig {
    /// Loads `path`, or the defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "config file not found; using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config = Self::parse(&raw).with_context(|| format!("invalid config {}", path.display()))?;
        tracing::info!(path = %path.display(), "config loaded");
        Ok(config)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw).context("failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cleanup.interval_seconds == 0 {
            bail!("cleanup.interval_seconds must be greater than 0");
        }
        if self.render.process_timeout_seconds == 0 {
            bail!("render.process_timeout_seconds must be greater than 0");
        }
        let max_job = self.render_config(String::new()).max_job_duration();
        if Duration::from_secs(self.cleanup.expiration_seconds) <= max_job {
            bail!(
                "cleanup.expiration_seconds ({}) must exceed the longest render job ({}s)",
                self.cleanup.expiration_seconds,
                max_job.as_secs()
            );
        }
        if self.reply_delay.min_ms > self.reply_delay.max_ms {
            bail!(
                "reply_delay.min_ms ({}) must not exceed reply_delay.max_ms ({})",
                self.reply_delay.min_ms,
                self.reply_delay.max_ms
            );
        }
        Ok(())
    }

    fn no_trigger_channel(&self) -> Option<String> {
        let name = self.no_trigger_channel.trim();
        (!name.is_empty()).then(|| name.to_string())
    }

    pub fn echo_config(&self) -> EchoTriggerConfig {
        EchoTriggerConfig {
            keywords: KeywordSet::new(&self.echo.keywords),
            no_trigger_channel: self.no_trigger_channel(),
            cooldown: Duration::from_secs(self.echo.cooldown_seconds),
        }
    }

    pub fn keyword_image_config(&self) -> KeywordImageConfig {
        KeywordImageConfig {
            phrase: self.keyword_image.phrase.clone(),
            asset_dir: self.keyword_image.asset_dir.clone(),
            cooldown: Duration::from_secs(self.keyword_image.cooldown_seconds),
            no_trigger_channel: self.no_trigger_channel(),
            command_prefix: self.command_prefix.clone(),
        }
    }

    pub fn mention_config(&self, actor_id: u64) -> MentionTriggerConfig {
        MentionTriggerConfig {
            actor_id,
            replies: self.mention.replies.clone(),
            replies_file: self.mention.replies_file.clone(),
            command_prefix: self.command_prefix.clone(),
        }
    }

    pub fn reply_delay(&self) -> ReplyDelay {
        ReplyDelay::from_millis(self.reply_delay.min_ms, self.reply_delay.max_ms)
    }

    pub fn render_config(&self, template: String) -> RenderConfig {
        let mut config = RenderConfig::new(self.render.work_dir.clone(), template);
        config.placeholder = self.render.placeholder.clone();
        config.compiler = self.render.compiler.to_external_command();
        config.rasterizer = self.render.rasterizer.to_external_command();
        config.process_timeout = Duration::from_secs(self.render.process_timeout_seconds);
        config.retain_artifacts = self.render.retain_artifacts;
        config
    }

    pub fn sweeper_config(&self) -> ArtifactSweeperConfig {
        ArtifactSweeperConfig {
            dir: self.render.work_dir.clone(),
            interval: Duration::from_secs(self.cleanup.interval_seconds),
            expiration: Duration::from_secs(self.cleanup.expiration_seconds),
        }
    }
}
