//! Inline math rendering: fragment extraction, the external compile and
//! rasterize pipeline, and expiry-based cleanup of what it leaves behind.

pub mod artifacts;
pub mod markup;
pub mod pipeline;

pub use artifacts::{
    list_artifacts, run_artifact_sweeper, sweep_expired_artifacts, Artifact,
    ArtifactSweeperConfig, SweepReport,
};
pub use markup::{
    extract_math_fragments, has_math_fragments, run_markup_listener, MarkupRunReport,
};
pub use pipeline::{
    job_key, load_template, ExternalCommand, RenderConfig, RenderError, RenderJob, RenderJobState,
    RenderJobStateError, RenderPipeline, RenderStage, RenderedImage, DEFAULT_PLACEHOLDER,
};
