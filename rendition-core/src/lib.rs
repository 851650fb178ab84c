pub mod command;
pub mod completion;
pub mod config;
pub mod describe;
pub mod error;
pub mod fingerprint;
pub mod ladder;
pub mod media;
pub mod pipeline;
pub mod publish;
mod sqlite;

pub use command::{CommandExecutor, SystemCommandExecutor};
pub use completion::{
    open_existing_store, open_store, CompletionError, CompletionResult, CompletionStore,
    FileCompletionStore, SqliteCompletionStore, SqliteCompletionStoreBuilder,
};
pub use config::{load_pipeline_config, CompletionBackend, PipelineConfig};
pub use describe::{
    service_from_env, service_from_settings, DescriptionRequest, DescriptionResolver,
    DescriptionService, DescriptionSlug, DescriptionUnavailable, HttpDescriptionService,
    Resolution, SlugSource, UnavailableService,
};
pub use error::{ConfigError, ConfigResult};
pub use fingerprint::{fingerprint, fingerprint_file, Fingerprint, FingerprintError};
pub use ladder::{LadderError, LadderResult, OutputSpec, SourceInfo, TranscodeLadder};
pub use media::{read_header, InputFile, MediaKind};
pub use pipeline::{
    discover_inputs, BatchReport, BatchSummary, FileOutcome, FileStatus, Pipeline, PipelineError,
    PipelineResult, PipelineStep,
};
pub use publish::{planned_pages, PublishError, PublishResult, Publisher};
