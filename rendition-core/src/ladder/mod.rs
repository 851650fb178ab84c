//! The transcode ladder: one input expanded into a fixed matrix of
//! (format × size) artifacts.
//!
//! Stills go through ImageMagick and videos through ffmpeg, both via the
//! [`CommandExecutor`]. Each rung is staged and renamed into place, and the
//! first failing rung stops the ladder for that input. Source tags are
//! copied onto each staged rung with `exiftool`; a failed copy is logged
//! and does not fail the rung.

mod place;
mod spec;
mod stills;
mod tags;
mod video;

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::command::{render_command, stderr_tail, CommandExecutor};
use crate::config::{ImageSection, MetadataSection, PipelineConfig, ToolsSection, VideoSection};
use crate::describe::DescriptionSlug;
use crate::media::{InputFile, MediaKind};

pub use place::StagedOutput;
pub use spec::{
    kind_dir, ladder_for, ladder_version, planned_artifacts, Axis, ContainerFormat, OutputSpec,
    IMAGE_DIR, IMAGE_LADDER, IMAGE_LADDER_VERSION, VIDEO_DIR, VIDEO_LADDER, VIDEO_LADDER_VERSION,
};

#[derive(Debug, Error)]
pub enum LadderError {
    #[error("{artifact}: `{command}` exited with status {status:?}: {stderr}")]
    Transcode {
        artifact: String,
        command: String,
        status: Option<i32>,
        stderr: String,
    },
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot read source {path}: {reason}")]
    SourceUnreadable { path: PathBuf, reason: String },
    #[error("tool produced no output for {path}")]
    EmptyOutput { path: PathBuf },
    #[error("io error at {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("{0} media has no ladder")]
    Unsupported(MediaKind),
}

pub type LadderResult<T> = Result<T, LadderError>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SourceInfo {
    pub width: Option<u32>,
    pub height: Option<u32>,
}

pub struct TranscodeLadder {
    executor: Arc<dyn CommandExecutor>,
    tools: ToolsSection,
    image: ImageSection,
    video: VideoSection,
    metadata: MetadataSection,
    output_dir: PathBuf,
}

impl TranscodeLadder {
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        tools: ToolsSection,
        image: ImageSection,
        video: VideoSection,
        metadata: MetadataSection,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            executor,
            tools,
            image,
            video,
            metadata,
            output_dir: output_dir.into(),
        }
    }

    pub fn from_config(config: &PipelineConfig, executor: Arc<dyn CommandExecutor>) -> Self {
        Self::new(
            executor,
            config.tools.clone(),
            config.image.clone(),
            config.video.clone(),
            config.metadata.clone(),
            config.output_dir(),
        )
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Reads source dimensions before any quota is spent on the input. Video
    /// inputs without a readable stream fail here; images are best-effort.
    pub async fn inspect(&self, input: &InputFile) -> LadderResult<SourceInfo> {
        match input.kind {
            MediaKind::Image => {
                let dimensions = stills::read_dimensions(&input.path);
                if dimensions.is_none() {
                    debug!(target: "ladder", path = %input.path.display(), "image header unreadable, leaving to imagemagick");
                }
                Ok(SourceInfo {
                    width: dimensions.map(|(width, _)| width),
                    height: dimensions.map(|(_, height)| height),
                })
            }
            MediaKind::Video => {
                let program = PathBuf::from(&self.tools.ffprobe);
                let args = video::stream_info_args(&input.path);
                let output = self.execute(&program, &args).await?;
                if !output.status.success() {
                    return Err(LadderError::SourceUnreadable {
                        path: input.path.clone(),
                        reason: stderr_tail(&output),
                    });
                }
                let (width, height) = video::parse_stream_info(&output.stdout).map_err(|reason| {
                    LadderError::SourceUnreadable {
                        path: input.path.clone(),
                        reason,
                    }
                })?;
                Ok(SourceInfo {
                    width: Some(width),
                    height: Some(height),
                })
            }
            MediaKind::Unsupported => Err(LadderError::Unsupported(input.kind)),
        }
    }

    /// Produces every rung for `input`, returning the final artifact paths in
    /// ladder order. Stops at the first failing rung.
    pub async fn run(
        &self,
        input: &InputFile,
        slug: &DescriptionSlug,
        source: &SourceInfo,
    ) -> LadderResult<Vec<PathBuf>> {
        let (ladder, dir) = match (ladder_for(input.kind), kind_dir(input.kind)) {
            (Some(ladder), Some(dir)) => (ladder, self.output_dir.join(dir)),
            _ => return Err(LadderError::Unsupported(input.kind)),
        };
        fs::create_dir_all(&dir)
            .await
            .map_err(|source| LadderError::Io {
                source,
                path: dir.clone(),
            })?;

        let mut produced = Vec::with_capacity(ladder.len());
        for spec in ladder {
            let destination = dir.join(spec.file_name(slug));
            if let Some(clamped) = clamped_below(spec, source) {
                debug!(
                    target: "ladder",
                    artifact = %destination.display(),
                    source = clamped,
                    "source smaller than rung, keeping source size"
                );
            }
            self.produce(input, spec, &dir, &destination).await?;
            produced.push(destination);
        }
        info!(
            target: "ladder",
            path = %input.path.display(),
            kind = %input.kind,
            artifacts = produced.len(),
            "ladder complete"
        );
        Ok(produced)
    }

    async fn produce(
        &self,
        input: &InputFile,
        spec: &OutputSpec,
        dir: &Path,
        destination: &Path,
    ) -> LadderResult<()> {
        let staged = StagedOutput::new(dir, spec.format.extension())?;
        let preserve = self.metadata.preserve;
        let (program, args) = match input.kind {
            MediaKind::Image => (
                PathBuf::from(&self.tools.magick),
                stills::resize_args(&input.path, spec, &self.image, preserve, staged.path()),
            ),
            _ => (
                PathBuf::from(&self.tools.ffmpeg),
                video::transcode_args(&input.path, spec, &self.video, preserve, staged.path()),
            ),
        };
        let output = self.execute(&program, &args).await?;
        if !output.status.success() {
            return Err(LadderError::Transcode {
                artifact: artifact_label(destination),
                command: render_command(&program, &args),
                status: output.status.code(),
                stderr: stderr_tail(&output),
            });
        }
        if preserve {
            self.carry_metadata(&input.path, staged.path(), destination).await;
        }
        staged.commit(destination)
    }

    async fn carry_metadata(&self, source: &Path, staged: &Path, destination: &Path) {
        let program = PathBuf::from(&self.tools.exiftool);
        let args = tags::carry_args(source, staged);
        match self.executor.run(&program, &args).await {
            Ok(output) if output.status.success() => {
                debug!(target: "ladder", artifact = %destination.display(), "metadata copied");
            }
            Ok(output) => warn!(
                target: "ladder",
                artifact = %destination.display(),
                status = ?output.status.code(),
                "metadata copy failed: {}",
                stderr_tail(&output)
            ),
            Err(err) => warn!(
                target: "ladder",
                artifact = %destination.display(),
                program = %program.display(),
                "metadata copy skipped: {err}"
            ),
        }
    }

    async fn execute(
        &self,
        program: &Path,
        args: &[OsString],
    ) -> LadderResult<std::process::Output> {
        self.executor
            .run(program, args)
            .await
            .map_err(|source| LadderError::Spawn {
                program: program.to_path_buf(),
                source,
            })
    }
}

fn clamped_below(spec: &OutputSpec, source: &SourceInfo) -> Option<u32> {
    let available = match spec.axis {
        Axis::Width => source.width?,
        Axis::Height => source.height?,
    };
    (available < spec.dimension).then_some(available)
}

fn artifact_label(destination: &Path) -> String {
    destination
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| destination.display().to_string())
}
