use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;

use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use rendition_core::completion::{
    open_existing_store, open_store, CompletionError, CompletionStore,
};
use rendition_core::config::{load_pipeline_config, PipelineConfig};
use rendition_core::describe::{service_from_env, DescriptionSlug};
use rendition_core::fingerprint::{fingerprint_file, Fingerprint, FingerprintError};
use rendition_core::ladder::{ladder_version, planned_artifacts};
use rendition_core::media::{read_header, MediaKind};
use rendition_core::pipeline::{
    BatchReport, FileStatus, Pipeline, PipelineError, FAILURE_LOG_NAME,
};
use rendition_core::publish::planned_pages;
use rendition_core::{ConfigError, SystemCommandExecutor};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("completion store error: {0}")]
    Completion(#[from] CompletionError),
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    InvalidFingerprint(#[from] FingerprintError),
    #[error("slug {0:?} has no usable characters")]
    InvalidSlug(String),
    #[error("required resource missing: {0}")]
    MissingResource(String),
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Media rendition pipeline control", long_about = None)]
pub struct Cli {
    /// Path to rendition.toml
    #[arg(long, default_value = "configs/rendition.toml")]
    pub config: PathBuf,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Process every input file and print the batch report
    Run(RunArgs),
    /// List completion flags
    Status,
    /// Remove a completion flag so the content is processed again
    Unmark(UnmarkArgs),
    /// Print a file's fingerprint and whether it is complete
    Fingerprint(FileArgs),
    /// Show the artifacts a file would produce, without writing anything
    Plan(PlanArgs),
    /// Check configured paths and external tools
    Health,
    /// Print shell completions
    Completions(CompletionsArgs),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Process this directory instead of paths.input_dir
    #[arg(long)]
    pub input: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct UnmarkArgs {
    pub fingerprint: String,
}

#[derive(Args, Debug)]
pub struct FileArgs {
    pub file: PathBuf,
}

#[derive(Args, Debug)]
pub struct PlanArgs {
    pub file: PathBuf,
    /// Description text to name artifacts with; defaults to the fallback slug
    #[arg(long)]
    pub slug: Option<String>,
}

#[derive(Args, Debug)]
pub struct CompletionsArgs {
    #[arg(value_enum)]
    pub shell: Shell,
}

pub fn run(cli: Cli) -> Result<()> {
    if let Commands::Completions(args) = &cli.command {
        clap_complete::generate(
            args.shell,
            &mut Cli::command(),
            "renditionctl",
            &mut std::io::stdout(),
        );
        return Ok(());
    }

    let context = AppContext::new(&cli)?;
    match &cli.command {
        Commands::Run(args) => {
            let report = context.run_batch(args)?;
            render(&report, cli.format)?;
        }
        Commands::Status => {
            let status = context.status()?;
            render(&status, cli.format)?;
        }
        Commands::Unmark(args) => {
            let result = context.unmark(&args.fingerprint)?;
            render(&result, cli.format)?;
        }
        Commands::Fingerprint(args) => {
            let report = context.fingerprint(&args.file)?;
            render(&report, cli.format)?;
        }
        Commands::Plan(args) => {
            let plan = context.plan(args)?;
            render(&plan, cli.format)?;
        }
        Commands::Health => {
            let report = context.health_check();
            render(&report, cli.format)?;
            if report
                .iter()
                .any(|entry| matches!(entry.status, CheckStatus::Error))
            {
                return Err(AppError::MissingResource(
                    "one or more checks failed".to_string(),
                ));
            }
        }
        Commands::Completions(_) => {}
    }

    Ok(())
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{}", json);
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}

#[derive(Debug)]
struct AppContext {
    config: PipelineConfig,
    config_path: PathBuf,
}

impl AppContext {
    fn new(cli: &Cli) -> Result<Self> {
        let config = load_pipeline_config(&cli.config)?;
        Ok(Self {
            config,
            config_path: cli.config.clone(),
        })
    }

    fn store(&self) -> Result<Arc<dyn CompletionStore>> {
        Ok(open_store(&self.config)?)
    }

    /// The completion store if one has been written, opened without
    /// creating anything.
    fn existing_store(&self) -> Result<Option<Arc<dyn CompletionStore>>> {
        Ok(open_existing_store(&self.config)?)
    }

    fn is_complete(&self, fingerprint: &Fingerprint) -> Result<bool> {
        match self.existing_store()? {
            Some(store) => Ok(store.exists(fingerprint)?),
            None => Ok(false),
        }
    }

    fn run_batch(&self, args: &RunArgs) -> Result<BatchReport> {
        let pipeline = Pipeline::from_config(
            &self.config,
            Arc::new(SystemCommandExecutor),
            service_from_env(&self.config.describe),
        )?;
        let report = runtime()?.block_on(async {
            match &args.input {
                Some(dir) => pipeline.run_in(dir).await,
                None => pipeline.run().await,
            }
        })?;
        if report.has_failures() {
            warn!(
                target: "renditionctl",
                failed = report.summary.failed,
                log = %self.config.logs_dir().join(FAILURE_LOG_NAME).display(),
                "failed files stay unflagged and are retried on the next run"
            );
        }
        Ok(report)
    }

    fn status(&self) -> Result<StatusReport> {
        let flags = match self.existing_store()? {
            Some(store) => store.list()?,
            None => Vec::new(),
        };
        Ok(StatusReport {
            backend: self.config.completion.backend.as_str().to_string(),
            location: self.config.completion_location(),
            count: flags.len(),
            flags,
        })
    }

    fn unmark(&self, text: &str) -> Result<UnmarkResult> {
        let fingerprint = Fingerprint::parse(text)?;
        let removed = match self.existing_store()? {
            Some(store) => store.unmark(&fingerprint)?,
            None => false,
        };
        if removed {
            info!(target: "renditionctl", fingerprint = %fingerprint, "completion flag removed");
        }
        Ok(UnmarkResult {
            fingerprint,
            removed,
        })
    }

    fn fingerprint(&self, path: &Path) -> Result<FingerprintReport> {
        let (fingerprint, kind) = inspect(path)?;
        let completed = self.is_complete(&fingerprint)?;
        Ok(FingerprintReport {
            path: path.to_path_buf(),
            fingerprint,
            kind,
            completed,
        })
    }

    fn plan(&self, args: &PlanArgs) -> Result<PlanReport> {
        let (fingerprint, kind) = inspect(&args.file)?;
        let slug = match &args.slug {
            Some(text) => DescriptionSlug::from_text(text, self.config.describe.max_slug_len)
                .ok_or_else(|| AppError::InvalidSlug(text.clone()))?,
            None => DescriptionSlug::fallback(
                &fingerprint,
                self.config.describe.fallback_prefix_len,
            ),
        };
        let completed = self.is_complete(&fingerprint)?;
        let output_dir = self.config.output_dir();
        let artifacts = planned_artifacts(&output_dir, kind, &slug);
        let pages = planned_pages(&output_dir, kind, &slug);
        Ok(PlanReport {
            path: args.file.clone(),
            fingerprint,
            kind,
            ladder_version: ladder_version(kind),
            completed,
            slug,
            artifacts,
            pages,
        })
    }

    fn health_check(&self) -> Vec<HealthEntry> {
        let mut results = Vec::new();
        results.push(self.check_path("config", &self.config_path));
        results.push(self.check_directory("input_dir", &self.config.input_dir()));
        results.push(self.check_writable("output_dir", &self.config.output_dir()));
        results.push(self.check_writable("state_dir", &self.config.state_dir()));
        results.push(match self.store() {
            Ok(_) => HealthEntry::ok(
                "completion",
                format!(
                    "{} at {}",
                    self.config.completion.backend.as_str(),
                    self.config.completion_location().display()
                ),
            ),
            Err(err) => HealthEntry::error("completion", err.to_string()),
        });
        let tools = &self.config.tools;
        results.push(self.check_tool("ffmpeg", &tools.ffmpeg, "-version"));
        results.push(self.check_tool("ffprobe", &tools.ffprobe, "-version"));
        results.push(self.check_tool("imagemagick", &tools.magick, "-version"));
        if self.config.metadata.preserve {
            // Metadata copies are best-effort, so a missing exiftool only warns.
            results.push(self.check_tool("exiftool", &tools.exiftool, "-ver").downgraded());
        }
        results.push(self.check_credential());
        results
    }

    fn check_path(&self, name: &str, path: &Path) -> HealthEntry {
        if path.exists() {
            HealthEntry::ok(name, format!("{}", path.display()))
        } else {
            HealthEntry::error(name, format!("{path} missing", path = path.display()))
        }
    }

    fn check_directory(&self, name: &str, path: &Path) -> HealthEntry {
        match fs::metadata(path) {
            Ok(meta) if meta.is_dir() => HealthEntry::ok(name, format!("{}", path.display())),
            Ok(_) => HealthEntry::error(
                name,
                format!("{path} is not a directory", path = path.display()),
            ),
            Err(_) => HealthEntry::warn(
                name,
                format!("{path} not found", path = path.display()),
            ),
        }
    }

    fn check_writable(&self, name: &str, path: &Path) -> HealthEntry {
        let marker = path.join(".health-check");
        let result = fs::create_dir_all(path)
            .and_then(|_| fs::write(&marker, b"ok"))
            .and_then(|_| fs::remove_file(&marker));
        match result {
            Ok(()) => HealthEntry::ok(name, format!("{} writable", path.display())),
            Err(err) => HealthEntry::error(
                name,
                format!("{path} not writable: {err}", path = path.display()),
            ),
        }
    }

    fn check_tool(&self, name: &str, program: &str, version_flag: &str) -> HealthEntry {
        let status = Command::new(program)
            .arg(version_flag)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        match status {
            Ok(status) if status.success() => HealthEntry::ok(name, program),
            Ok(status) => HealthEntry::error(
                name,
                format!("{program} {version_flag} exited with {status}"),
            ),
            Err(err) => HealthEntry::error(name, format!("{program}: {err}")),
        }
    }

    fn check_credential(&self) -> HealthEntry {
        let settings = &self.config.describe;
        if !settings.enabled {
            return HealthEntry::warn("describe", "disabled, fallback slugs only");
        }
        match std::env::var(&settings.credential_env) {
            Ok(value) if !value.trim().is_empty() => {
                HealthEntry::ok("describe", settings.endpoint.clone())
            }
            _ => HealthEntry::warn(
                "describe",
                format!("{} not set, fallback slugs only", settings.credential_env),
            ),
        }
    }
}

/// Streams the file through the hasher and sniffs its kind from the header.
fn inspect(path: &Path) -> Result<(Fingerprint, MediaKind)> {
    runtime()?.block_on(async {
        let fingerprint = fingerprint_file(path).await?;
        let header = read_header(path).await?;
        Ok::<_, AppError>((fingerprint, MediaKind::detect(path, &header)))
    })
}

impl DisplayFallback for BatchReport {
    fn display(&self) -> String {
        let summary = &self.summary;
        let mut lines = vec![format!(
            "Processed {} file(s): {} completed, {} skipped, {} unsupported, {} failed",
            summary.discovered,
            summary.completed,
            summary.skipped,
            summary.unsupported,
            summary.failed
        )];
        for outcome in &self.outcomes {
            let detail = match &outcome.status {
                FileStatus::Skipped => "skipped (already complete)".to_string(),
                FileStatus::Unsupported => "unsupported media".to_string(),
                FileStatus::Completed {
                    resolution,
                    artifacts,
                    pages,
                    ..
                } => {
                    let source = if resolution.is_fallback() {
                        " (fallback)"
                    } else {
                        ""
                    };
                    format!(
                        "completed as {}{source}, {} artifact(s), {} page(s)",
                        resolution.slug,
                        artifacts.len(),
                        pages.len()
                    )
                }
                FileStatus::Failed { step, error } => format!("failed at {step}: {error}"),
            };
            lines.push(format!("  - {}: {detail}", outcome.path.display()));
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub backend: String,
    pub location: PathBuf,
    pub count: usize,
    pub flags: Vec<Fingerprint>,
}

impl DisplayFallback for StatusReport {
    fn display(&self) -> String {
        let mut lines = vec![format!(
            "Completion store: {} ({})",
            self.backend,
            self.location.display()
        )];
        lines.push(format!("Completed fingerprints: {}", self.count));
        for flag in &self.flags {
            lines.push(format!("  - {flag}"));
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct UnmarkResult {
    pub fingerprint: Fingerprint,
    pub removed: bool,
}

impl DisplayFallback for UnmarkResult {
    fn display(&self) -> String {
        if self.removed {
            format!("Removed flag {}; the content will be reprocessed", self.fingerprint)
        } else {
            format!("No flag for {}", self.fingerprint)
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FingerprintReport {
    pub path: PathBuf,
    pub fingerprint: Fingerprint,
    pub kind: MediaKind,
    pub completed: bool,
}

impl DisplayFallback for FingerprintReport {
    fn display(&self) -> String {
        format!(
            "{}  {} ({}, {})",
            self.fingerprint,
            self.path.display(),
            self.kind,
            if self.completed { "complete" } else { "pending" }
        )
    }
}

#[derive(Debug, Serialize)]
pub struct PlanReport {
    pub path: PathBuf,
    pub fingerprint: Fingerprint,
    pub kind: MediaKind,
    pub ladder_version: Option<u32>,
    pub completed: bool,
    pub slug: DescriptionSlug,
    pub artifacts: Vec<PathBuf>,
    pub pages: Vec<PathBuf>,
}

impl DisplayFallback for PlanReport {
    fn display(&self) -> String {
        let mut lines = vec![format!("{} ({})", self.path.display(), self.kind)];
        lines.push(format!("Fingerprint: {}", self.fingerprint));
        if self.completed {
            lines.push("Already complete; a run would skip it".to_string());
        }
        match self.ladder_version {
            Some(version) => lines.push(format!("Ladder v{version} as {}:", self.slug)),
            None => lines.push("No ladder for this media".to_string()),
        }
        for artifact in self.artifacts.iter().chain(&self.pages) {
            lines.push(format!("  - {}", artifact.display()));
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct HealthEntry {
    pub name: String,
    pub status: CheckStatus,
    pub detail: String,
}

#[derive(Debug, Serialize)]
pub enum CheckStatus {
    #[serde(rename = "ok")]
    Ok,
    #[serde(rename = "warn")]
    Warn,
    #[serde(rename = "error")]
    Error,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CheckStatus::Ok => "OK",
            CheckStatus::Warn => "WARN",
            CheckStatus::Error => "ERROR",
        };
        write!(f, "{}", label)
    }
}

impl HealthEntry {
    fn ok(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Ok,
            detail: detail.into(),
        }
    }

    fn warn(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Warn,
            detail: detail.into(),
        }
    }

    fn error(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Error,
            detail: detail.into(),
        }
    }

    /// Optional tools only warn when missing.
    fn downgraded(self) -> Self {
        match self.status {
            CheckStatus::Error => Self {
                status: CheckStatus::Warn,
                ..self
            },
            _ => self,
        }
    }
}

impl DisplayFallback for Vec<HealthEntry> {
    fn display(&self) -> String {
        let mut lines = Vec::new();
        for entry in self {
            lines.push(format!(
                "[{status}] {name}: {detail}",
                status = entry.status,
                name = entry.name,
                detail = entry.detail
            ));
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rendition_core::config::CompletionBackend;
    use tempfile::TempDir;

    fn prepare_test_context() -> Result<(TempDir, AppContext)> {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        let configs_dir = root.join("configs");
        fs::create_dir_all(&configs_dir).unwrap();
        fs::copy(
            "../configs/rendition.toml",
            configs_dir.join("rendition.toml"),
        )
        .unwrap();
        fs::create_dir_all(root.join("incoming")).unwrap();

        let cli = Cli {
            config: configs_dir.join("rendition.toml"),
            format: OutputFormat::Json,
            command: Commands::Status,
        };
        let mut context = AppContext::new(&cli)?;
        context.config.paths.base_dir = root.to_string_lossy().to_string();
        Ok((temp, context))
    }

    const PHOTO: &[u8] = b"\xff\xd8\xff\xe0 holiday photo";

    #[test]
    fn status_lists_marked_fingerprints() {
        let (_temp, context) = prepare_test_context().unwrap();
        let fingerprint = Fingerprint::of(PHOTO);
        context.store().unwrap().mark(&fingerprint).unwrap();

        let status = context.status().unwrap();
        assert_eq!(status.backend, "file");
        assert_eq!(status.count, 1);
        assert_eq!(status.flags, vec![fingerprint]);
    }

    #[test]
    fn unmark_reports_whether_a_flag_existed() {
        let (_temp, context) = prepare_test_context().unwrap();
        let fingerprint = Fingerprint::of(PHOTO);
        context.store().unwrap().mark(&fingerprint).unwrap();

        let upper = fingerprint.as_str().to_uppercase();
        assert!(context.unmark(&upper).unwrap().removed);
        assert!(!context.unmark(fingerprint.as_str()).unwrap().removed);
        assert!(context.status().unwrap().flags.is_empty());
    }

    #[test]
    fn status_and_unmark_on_a_fresh_tree_write_nothing() {
        let (_temp, context) = prepare_test_context().unwrap();
        assert_eq!(context.status().unwrap().count, 0);
        let fingerprint = Fingerprint::of(PHOTO);
        assert!(!context.unmark(fingerprint.as_str()).unwrap().removed);
        assert!(!context.config.state_dir().exists());
    }

    #[test]
    fn unmark_rejects_malformed_fingerprints() {
        let (_temp, context) = prepare_test_context().unwrap();
        let err = context.unmark("abc123").unwrap_err();
        assert!(matches!(err, AppError::InvalidFingerprint(_)));
    }

    #[test]
    fn plan_names_artifacts_without_writing() {
        let (temp, context) = prepare_test_context().unwrap();
        let file = temp.path().join("incoming/cat.jpg");
        fs::write(&file, PHOTO).unwrap();

        let plan = context
            .plan(&PlanArgs {
                file: file.clone(),
                slug: Some("A cat playing with yarn".to_string()),
            })
            .unwrap();
        assert_eq!(plan.kind, MediaKind::Image);
        assert_eq!(plan.ladder_version, Some(1));
        assert!(!plan.completed);
        assert_eq!(plan.artifacts.len(), 6);
        assert_eq!(
            plan.artifacts[0],
            context
                .config
                .output_dir()
                .join("images/a-cat-playing-with-yarn-1920w.jpg")
        );
        assert_eq!(
            plan.pages,
            vec![
                context
                    .config
                    .output_dir()
                    .join("descriptions/a-cat-playing-with-yarn.md"),
                context
                    .config
                    .output_dir()
                    .join("html/a-cat-playing-with-yarn.html"),
            ]
        );
        assert!(!context.config.output_dir().exists());
        assert!(!context.config.state_dir().exists());
    }

    #[test]
    fn plan_reads_sqlite_flags_without_creating_state() {
        let (temp, mut context) = prepare_test_context().unwrap();
        context.config.completion.backend = CompletionBackend::Sqlite;
        let file = temp.path().join("incoming/cat.jpg");
        fs::write(&file, PHOTO).unwrap();
        let args = PlanArgs {
            file,
            slug: None,
        };

        assert!(!context.plan(&args).unwrap().completed);
        assert!(!context.config.state_dir().exists());

        context.store().unwrap().mark(&Fingerprint::of(PHOTO)).unwrap();
        assert!(context.plan(&args).unwrap().completed);
    }

    #[test]
    fn plan_defaults_to_fallback_slug() {
        let (temp, context) = prepare_test_context().unwrap();
        let file = temp.path().join("incoming/clip.mp4");
        fs::write(&file, b"\x00\x00\x00\x18ftypmp42").unwrap();

        let plan = context
            .plan(&PlanArgs {
                file,
                slug: None,
            })
            .unwrap();
        assert_eq!(plan.kind, MediaKind::Video);
        assert_eq!(
            plan.slug.as_str(),
            format!("generic-media-{}", plan.fingerprint.short(8))
        );
        assert_eq!(plan.artifacts.len(), 4);
    }

    #[test]
    fn fingerprint_reports_flag_state() {
        let (temp, context) = prepare_test_context().unwrap();
        let file = temp.path().join("incoming/cat.jpg");
        fs::write(&file, PHOTO).unwrap();

        let before = context.fingerprint(&file).unwrap();
        assert_eq!(before.fingerprint, Fingerprint::of(PHOTO));
        assert_eq!(before.kind, MediaKind::Image);
        assert!(!before.completed);
        assert!(!context.config.state_dir().exists());

        context.store().unwrap().mark(&before.fingerprint).unwrap();
        assert!(context.fingerprint(&file).unwrap().completed);
    }

    #[test]
    fn health_reports_directories() {
        let (_temp, context) = prepare_test_context().unwrap();
        let report = context.health_check();
        let entry = |name: &str| {
            report
                .iter()
                .find(|entry| entry.name == name)
                .map(|entry| entry.status.to_string())
        };
        assert_eq!(entry("config").as_deref(), Some("OK"));
        assert_eq!(entry("input_dir").as_deref(), Some("OK"));
        assert_eq!(entry("output_dir").as_deref(), Some("OK"));
        assert_eq!(entry("completion").as_deref(), Some("OK"));
        assert!(matches!(entry("exiftool").as_deref(), Some("OK" | "WARN")));
    }
}
