//! Fragment → document → compiled page → raster image.
//!
//! Every job works on files named after its key (`{message_id}_{index}`) inside
//! the shared working directory, so concurrent jobs never touch each other's
//! files and no locking is needed. A [`RenderJob`] removes its own files when
//! dropped; the periodic artifact sweep catches anything left behind.

use std::{
    ffi::OsString,
    fmt,
    path::{Path, PathBuf},
    process::{Output, Stdio},
    time::Duration,
};

use anyhow::{bail, Context};
use thiserror::Error;
use tokio::process::Command;

pub const DEFAULT_PLACEHOLDER: &str = "%equation%";

const OUTPUT_TAIL_CHARS: usize = 512;

/// Program plus leading arguments; stage arguments are appended after them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ExternalCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub work_dir: PathBuf,
    /// Document template, read once at startup.
    pub template: String,
    pub placeholder: String,
    pub compiler: ExternalCommand,
    pub rasterizer: ExternalCommand,
    /// Per-process limit; the child is killed when it elapses.
    pub process_timeout: Duration,
    /// Leave job files on disk for the sweep instead of removing them on drop.
    pub retain_artifacts: bool,
}

impl RenderConfig {
    pub fn new(work_dir: impl Into<PathBuf>, template: impl Into<String>) -> Self {
        Self {
            work_dir: work_dir.into(),
            template: template.into(),
            placeholder: DEFAULT_PLACEHOLDER.to_string(),
            compiler: ExternalCommand::new("pdflatex"),
            rasterizer: ExternalCommand::new("pdftoppm"),
            process_timeout: Duration::from_secs(60),
            retain_artifacts: false,
        }
    }

    /// Upper bound on how long a single job can keep files in flight.
    pub fn max_job_duration(&self) -> Duration {
        self.process_timeout.saturating_mul(2)
    }
}

/// Reads the document template and checks that it has a substitution point.
pub fn load_template(path: &Path, placeholder: &str) -> anyhow::Result<String> {
    let template = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read template {}", path.display()))?;
    if placeholder.is_empty() || !template.contains(placeholder) {
        bail!(
            "template {} does not contain placeholder '{placeholder}'",
            path.display()
        );
    }
    Ok(template)
}

/// Job key for fragment `index` of message `message_id`.
pub fn job_key(message_id: u64, index: usize) -> String {
    format!("{message_id}_{index}")
}

/// External process stage of a render job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStage {
    Compile,
    Rasterize,
}

impl fmt::Display for RenderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compile => f.write_str("compiler"),
            Self::Rasterize => f.write_str("rasterizer"),
        }
    }
}

/// Lifecycle of a render job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderJobState {
    Pending,
    Compiling,
    Rasterizing,
    Ready,
    Failed,
}

impl RenderJobState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Compiling => "compiling",
            Self::Rasterizing => "rasterizing",
            Self::Ready => "ready",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ready | Self::Failed)
    }

    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Compiling)
                | (Self::Compiling, Self::Rasterizing)
                | (Self::Rasterizing, Self::Ready)
        ) || (!self.is_terminal() && next == Self::Failed)
    }
}

impl fmt::Display for RenderJobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("render job cannot move from {from} to {to}")]
pub struct RenderJobStateError {
    pub from: RenderJobState,
    pub to: RenderJobState,
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("render job {key}: failed to write {}: {source}", .path.display())]
    WriteDocument {
        key: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("render job {key}: {stage} could not be run: {source}")]
    Process {
        key: String,
        stage: RenderStage,
        #[source]
        source: std::io::Error,
    },
    #[error("render job {key}: {stage} exited with {status}")]
    NonZeroExit {
        key: String,
        stage: RenderStage,
        status: String,
        output_tail: String,
    },
    #[error("render job {key}: {stage} timed out after {timeout_ms}ms")]
    Timeout {
        key: String,
        stage: RenderStage,
        timeout_ms: u64,
    },
    #[error("render job {key}: expected output {} is missing", .path.display())]
    MissingOutput { key: String, path: PathBuf },
    #[error(transparent)]
    State(#[from] RenderJobStateError),
}

/// One fragment's trip through the pipeline, plus ownership of its files.
#[derive(Debug)]
pub struct RenderJob {
    key: String,
    fragment: String,
    work_dir: PathBuf,
    state: RenderJobState,
    retain_files: bool,
}

impl RenderJob {
    pub fn new(
        message_id: u64,
        index: usize,
        fragment: impl Into<String>,
        work_dir: impl Into<PathBuf>,
        retain_files: bool,
    ) -> Self {
        Self {
            key: job_key(message_id, index),
            fragment: fragment.into(),
            work_dir: work_dir.into(),
            state: RenderJobState::Pending,
            retain_files,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn fragment(&self) -> &str {
        &self.fragment
    }

    pub fn state(&self) -> RenderJobState {
        self.state
    }

    pub fn document_path(&self) -> PathBuf {
        self.work_dir.join(format!("{}.tex", self.key))
    }

    pub fn compiled_path(&self) -> PathBuf {
        self.work_dir.join(format!("{}.pdf", self.key))
    }

    /// Prefix the rasterizer appends `-{page}.png` to.
    pub fn raster_prefix(&self) -> PathBuf {
        self.work_dir.join(&self.key)
    }

    pub fn image_path(&self) -> PathBuf {
        self.work_dir.join(format!("{}-1.png", self.key))
    }

    pub fn transition(&mut self, next: RenderJobState) -> Result<(), RenderJobStateError> {
        if !self.state.can_transition_to(next) {
            return Err(RenderJobStateError {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    /// Marks the job failed unless it already finished.
    pub fn fail(&mut self) {
        if !self.state.is_terminal() {
            self.state = RenderJobState::Failed;
        }
    }

    /// Removes every `{key}.*` and `{key}-*` file and returns how many went away.
    pub fn remove_files(&self) -> usize {
        let Ok(entries) = std::fs::read_dir(&self.work_dir) else {
            return 0;
        };
        let dotted = format!("{}.", self.key);
        let dashed = format!("{}-", self.key);
        let mut removed = 0;
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if !(name.starts_with(&dotted) || name.starts_with(&dashed)) {
                continue;
            }
            match std::fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
                Err(error) => {
                    tracing::warn!(path = %entry.path().display(), %error, "failed to remove render file");
                }
            }
        }
        removed
    }
}

impl Drop for RenderJob {
    fn drop(&mut self) {
        if self.retain_files {
            return;
        }
        let removed = self.remove_files();
        tracing::trace!(key = %self.key, removed, "render job files released");
    }
}

/// A finished image. Dropping it releases the job's files.
#[derive(Debug)]
pub struct RenderedImage {
    job: RenderJob,
}

impl RenderedImage {
    pub fn path(&self) -> PathBuf {
        self.job.image_path()
    }

    pub fn key(&self) -> &str {
        self.job.key()
    }
}

#[derive(Debug)]
pub struct RenderPipeline {
    config: RenderConfig,
}

impl RenderPipeline {
    pub fn new(config: RenderConfig) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&config.work_dir)
            .with_context(|| format!("failed to create {}", config.work_dir.display()))?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn document_for(&self, fragment: &str) -> String {
        self.config
            .template
            .replace(self.config.placeholder.as_str(), fragment)
    }

    /// Renders fragment `index` of message `message_id` into an image.
    pub async fn render(
        &self,
        message_id: u64,
        index: usize,
        fragment: &str,
    ) -> Result<RenderedImage, RenderError> {
        let mut job = RenderJob::new(
            message_id,
            index,
            fragment,
            self.config.work_dir.clone(),
            self.config.retain_artifacts,
        );
        match self.run_job(&mut job).await {
            Ok(()) => Ok(RenderedImage { job }),
            Err(error) => {
                job.fail();
                Err(error)
            }
        }
    }

    async fn run_job(&self, job: &mut RenderJob) -> Result<(), RenderError> {
        let document_path = job.document_path();
        tokio::fs::write(&document_path, self.document_for(job.fragment()))
            .await
            .map_err(|source| RenderError::WriteDocument {
                key: job.key().to_string(),
                path: document_path.clone(),
                source,
            })?;

        job.transition(RenderJobState::Compiling)?;
        let compile_args: Vec<OsString> = vec![
            "-synctex=1".into(),
            "-interaction=nonstopmode".into(),
            "-file-line-error".into(),
            "-output-directory".into(),
            self.config.work_dir.clone().into_os_string(),
            document_path.into_os_string(),
        ];
        self.run_stage(job, RenderStage::Compile, &self.config.compiler, compile_args)
            .await?;
        expect_output(job, job.compiled_path())?;

        job.transition(RenderJobState::Rasterizing)?;
        let raster_args: Vec<OsString> = vec![
            "-png".into(),
            job.compiled_path().into_os_string(),
            job.raster_prefix().into_os_string(),
        ];
        self.run_stage(
            job,
            RenderStage::Rasterize,
            &self.config.rasterizer,
            raster_args,
        )
        .await?;
        expect_output(job, job.image_path())?;

        job.transition(RenderJobState::Ready)?;
        Ok(())
    }

    async fn run_stage(
        &self,
        job: &RenderJob,
        stage: RenderStage,
        command_spec: &ExternalCommand,
        stage_args: Vec<OsString>,
    ) -> Result<(), RenderError> {
        let mut command = Command::new(&command_spec.program);
        command
            .args(&command_spec.args)
            .args(stage_args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = command.spawn().map_err(|source| RenderError::Process {
            key: job.key().to_string(),
            stage,
            source,
        })?;
        let output =
            match tokio::time::timeout(self.config.process_timeout, child.wait_with_output()).await
            {
                Ok(result) => result.map_err(|source| RenderError::Process {
                    key: job.key().to_string(),
                    stage,
                    source,
                })?,
                Err(_) => {
                    return Err(RenderError::Timeout {
                        key: job.key().to_string(),
                        stage,
                        timeout_ms: u64::try_from(self.config.process_timeout.as_millis())
                            .unwrap_or(u64::MAX),
                    });
                }
            };

        if !output.status.success() {
            return Err(RenderError::NonZeroExit {
                key: job.key().to_string(),
                stage,
                status: output.status.to_string(),
                output_tail: output_tail(&output),
            });
        }
        Ok(())
    }
}

fn expect_output(job: &RenderJob, path: PathBuf) -> Result<(), RenderError> {
    if path.is_file() {
        return Ok(());
    }
    Err(RenderError::MissingOutput {
        key: job.key().to_string(),
        path,
    })
}

fn output_tail(output: &Output) -> String {
    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    let chars = combined.chars().count();
    combined
        .chars()
        .skip(chars.saturating_sub(OUTPUT_TAIL_CHARS))
        .collect()
}
