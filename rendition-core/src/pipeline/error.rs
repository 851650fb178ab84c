use std::path::PathBuf;

use thiserror::Error;

use crate::completion::CompletionError;
use crate::error::ConfigError;
use crate::ladder::LadderError;
use crate::publish::PublishError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("io error at {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("input {0} is empty")]
    EmptyInput(PathBuf),
    #[error("failed to walk {path}: {source}")]
    Discovery {
        path: PathBuf,
        source: walkdir::Error,
    },
    #[error(transparent)]
    Completion(#[from] CompletionError),
    #[error(transparent)]
    Ladder(#[from] LadderError),
    #[error(transparent)]
    Publish(#[from] PublishError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type PipelineResult<T> = Result<T, PipelineError>;
