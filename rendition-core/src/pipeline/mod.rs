//! Batch orchestration: discover inputs, gate each on its completion flag,
//! resolve a slug, run the ladder, publish the companion pages, then commit
//! the flag.
//!
//! Files are processed strictly one at a time and a failure in one never
//! stops the batch. The flag is the last write for a file, so a file that
//! fails anywhere before it is picked up again on the next run.

mod discovery;
mod error;
mod report;

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::command::CommandExecutor;
use crate::completion::{open_store, CompletionStore};
use crate::config::PipelineConfig;
use crate::describe::{DescriptionResolver, DescriptionService};
use crate::fingerprint::{fingerprint_file, Fingerprint};
use crate::ladder::TranscodeLadder;
use crate::media::{read_header, InputFile, MediaKind};
use crate::publish::Publisher;

pub use discovery::discover_inputs;
pub use error::{PipelineError, PipelineResult};
pub use report::{BatchReport, BatchSummary, FileOutcome, FileStatus, PipelineStep};

pub const FAILURE_LOG_NAME: &str = "pipeline_failures.log";

struct StepFailure {
    step: PipelineStep,
    error: PipelineError,
}

trait AtStep<T> {
    fn at(self, step: PipelineStep) -> Result<T, StepFailure>;
}

impl<T, E: Into<PipelineError>> AtStep<T> for Result<T, E> {
    fn at(self, step: PipelineStep) -> Result<T, StepFailure> {
        self.map_err(|error| StepFailure {
            step,
            error: error.into(),
        })
    }
}

pub struct Pipeline {
    store: Arc<dyn CompletionStore>,
    resolver: DescriptionResolver,
    ladder: TranscodeLadder,
    publisher: Publisher,
    input_dir: PathBuf,
    excluded: Vec<PathBuf>,
    failure_log: Option<PathBuf>,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn CompletionStore>,
        resolver: DescriptionResolver,
        ladder: TranscodeLadder,
        publisher: Publisher,
        input_dir: impl Into<PathBuf>,
    ) -> Self {
        let excluded = vec![ladder.output_dir().to_path_buf()];
        Self {
            store,
            resolver,
            ladder,
            publisher,
            input_dir: input_dir.into(),
            excluded,
            failure_log: None,
        }
    }

    /// Wires the store, resolver and ladder described by `config`. The state
    /// and log directories are created here.
    pub fn from_config(
        config: &PipelineConfig,
        executor: Arc<dyn CommandExecutor>,
        service: Arc<dyn DescriptionService>,
    ) -> PipelineResult<Self> {
        let logs_dir = config.logs_dir();
        std::fs::create_dir_all(&logs_dir).map_err(|source| PipelineError::Io {
            source,
            path: logs_dir.clone(),
        })?;
        let store = open_store(config)?;
        let resolver = DescriptionResolver::new(
            service,
            executor.clone(),
            &config.tools.ffmpeg,
            &config.describe,
        );
        let ladder = TranscodeLadder::from_config(config, executor);
        let publisher = Publisher::from_config(config);
        let mut pipeline = Self::new(store, resolver, ladder, publisher, config.input_dir())
            .with_failure_log(logs_dir.join(FAILURE_LOG_NAME));
        pipeline.excluded.push(config.state_dir());
        Ok(pipeline)
    }

    pub fn with_failure_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.failure_log = Some(path.into());
        self
    }

    pub fn store(&self) -> &Arc<dyn CompletionStore> {
        &self.store
    }

    pub fn input_dir(&self) -> &Path {
        &self.input_dir
    }

    pub async fn run(&self) -> PipelineResult<BatchReport> {
        self.run_in(&self.input_dir).await
    }

    /// Processes every file discovered under `input_dir`.
    pub async fn run_in(&self, input_dir: &Path) -> PipelineResult<BatchReport> {
        let inputs = discover_inputs(input_dir, &self.excluded)?;
        info!(
            target: "pipeline",
            input_dir = %input_dir.display(),
            files = inputs.len(),
            "batch started"
        );
        Ok(self.process_inputs(&inputs).await)
    }

    pub async fn process_inputs(&self, inputs: &[PathBuf]) -> BatchReport {
        let started_at = Utc::now();
        let mut outcomes = Vec::with_capacity(inputs.len());
        for path in inputs {
            outcomes.push(self.process_file(path, None).await);
        }
        let report = BatchReport::from_outcomes(started_at, outcomes);
        info!(
            target: "pipeline",
            completed = report.summary.completed,
            skipped = report.summary.skipped,
            unsupported = report.summary.unsupported,
            failed = report.summary.failed,
            "batch finished"
        );
        report
    }

    /// Runs one file through the whole sequence. Never fails: problems are
    /// reported in the returned outcome. A caller that already knows the
    /// fingerprint can pass it to skip hashing.
    pub async fn process_file(&self, path: &Path, known: Option<Fingerprint>) -> FileOutcome {
        let mut fingerprint = known;
        let status = match self.advance(path, &mut fingerprint).await {
            Ok(status) => status,
            Err(failure) => {
                warn!(
                    target: "pipeline",
                    path = %path.display(),
                    step = failure.step.as_str(),
                    "file failed: {}",
                    failure.error
                );
                self.log_failure(path, &failure);
                FileStatus::Failed {
                    step: failure.step,
                    error: failure.error.to_string(),
                }
            }
        };
        FileOutcome {
            path: path.to_path_buf(),
            fingerprint,
            status,
            finished_at: Utc::now(),
        }
    }

    async fn advance(
        &self,
        path: &Path,
        fingerprint: &mut Option<Fingerprint>,
    ) -> Result<FileStatus, StepFailure> {
        // A known fingerprint lets already-flagged files skip the read.
        if let Some(known) = fingerprint.as_ref() {
            if self.store.exists(known).at(PipelineStep::Gate)? {
                debug!(target: "pipeline", path = %path.display(), fingerprint = %known, "already complete");
                return Ok(FileStatus::Skipped);
            }
        }

        let io_error = |source| PipelineError::Io {
            source,
            path: path.to_path_buf(),
        };
        let size = fs::metadata(path)
            .await
            .map_err(io_error)
            .at(PipelineStep::Read)?
            .len();
        if size == 0 {
            return Err(PipelineError::EmptyInput(path.to_path_buf())).at(PipelineStep::Read);
        }
        let header = read_header(path).await.map_err(io_error).at(PipelineStep::Read)?;
        let kind = MediaKind::detect(path, &header);

        // Stills are small and sent whole to the describer; everything else
        // is hashed from disk in chunks.
        let bytes = match kind {
            MediaKind::Image => fs::read(path).await.map_err(io_error).at(PipelineStep::Read)?,
            _ => Vec::new(),
        };

        let current = match fingerprint.as_ref() {
            Some(known) => known.clone(),
            None => {
                let computed = match kind {
                    MediaKind::Image => Fingerprint::of(&bytes),
                    _ => fingerprint_file(path)
                        .await
                        .map_err(io_error)
                        .at(PipelineStep::Read)?,
                };
                *fingerprint = Some(computed.clone());
                if self.store.exists(&computed).at(PipelineStep::Gate)? {
                    debug!(target: "pipeline", path = %path.display(), fingerprint = %computed, "already complete");
                    return Ok(FileStatus::Skipped);
                }
                computed
            }
        };

        if kind == MediaKind::Unsupported {
            warn!(target: "pipeline", path = %path.display(), "unsupported media kind, skipping");
            return Ok(FileStatus::Unsupported);
        }
        let input = match kind {
            MediaKind::Image => InputFile {
                path: path.to_path_buf(),
                bytes,
                kind,
            },
            _ => InputFile::streamed(path, kind),
        };

        let source = self.ladder.inspect(&input).await.at(PipelineStep::Inspect)?;
        let resolution = self.resolver.resolve(&input, &current).await;
        let artifacts = self
            .ladder
            .run(&input, &resolution.slug, &source)
            .await
            .at(PipelineStep::Ladder)?;
        let pages = self
            .publisher
            .publish(&input, &current, &resolution)
            .at(PipelineStep::Publish)?;
        self.store.mark(&current).at(PipelineStep::Commit)?;

        info!(
            target: "pipeline",
            path = %path.display(),
            fingerprint = %current,
            slug = %resolution.slug,
            fallback = resolution.is_fallback(),
            "file completed"
        );
        Ok(FileStatus::Completed {
            kind: input.kind,
            resolution,
            artifacts,
            pages,
        })
    }

    fn log_failure(&self, path: &Path, failure: &StepFailure) {
        let Some(log_path) = self.failure_log.as_ref() else {
            return;
        };
        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(log_path) {
            let _ = writeln!(
                file,
                "{} [{}] {}: {}",
                Utc::now().to_rfc3339(),
                failure.step,
                path.display(),
                failure.error
            );
        }
    }
}
