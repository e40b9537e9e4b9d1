//! Top-level error type returned by CLI commands.

use std::path::PathBuf;
use thiserror::Error;

use crate::assets::AssetError;
use crate::core::config::ConfigError;
use crate::core::state::StateError;
use crate::core::synth::SynthError;
use crate::core::StackError;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Stack(#[from] StackError),

    #[error(transparent)]
    Asset(#[from] AssetError),

    #[error(transparent)]
    Synth(#[from] SynthError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("{0} validation error(s)")]
    Validation(usize),

    #[error("{0} resource(s) would change")]
    Changed(u32),

    #[error("{} already exists", .0.display())]
    AlreadyExists(PathBuf),

    #[error("invalid date '{0}': expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("cannot write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
