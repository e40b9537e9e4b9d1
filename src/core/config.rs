//! Stack configuration from a `.env` file and the process environment.
//!
//! The `.env` file is required: a missing or unreadable file aborts before any
//! construct is declared. Variables already set in the process environment
//! take precedence over the file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::types::{Architecture, FunctionSpec};

pub const ENV_CONSTRUCT_ID: &str = "CONSTRUCT_ID";
pub const ENV_IS_ARM64: &str = "IS_ARM64";

pub const DEFAULT_CONSTRUCT_ID: &str = "Django";
pub const DEFAULT_ENV_FILE: &str = ".env";
pub const FUNCTION_CONTEXT_DIR: &str = "src";
pub const STATIC_DIR: &str = "static";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load environment file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        #[source]
        source: dotenvy::Error,
    },

    #[error("environment file {} sets no variables", .0.display())]
    EmptyEnvFile(PathBuf),

    #[error("{0} is set but empty")]
    EmptyValue(&'static str),
}

/// Everything the builder needs, resolved once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct StackConfig {
    pub construct_id: String,
    pub architecture: Option<Architecture>,
    /// Build context of the container image.
    pub function_context: PathBuf,
    /// Directory synced into the bucket.
    pub static_dir: PathBuf,
}

impl StackConfig {
    /// Resolve configuration with `lookup` for variables and `root` as the
    /// project directory holding `src/` and `static/`.
    pub fn resolve<F>(lookup: F, root: &Path) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let construct_id = match lookup(ENV_CONSTRUCT_ID) {
            Some(v) if v.trim().is_empty() => return Err(ConfigError::EmptyValue(ENV_CONSTRUCT_ID)),
            Some(v) => v,
            None => DEFAULT_CONSTRUCT_ID.to_string(),
        };
        let is_arm64 = lookup(ENV_IS_ARM64).map_or(true, |v| parse_flag(&v));

        Ok(Self {
            construct_id,
            architecture: architecture_for(is_arm64),
            function_context: root.join(FUNCTION_CONTEXT_DIR),
            static_dir: root.join(STATIC_DIR),
        })
    }

    /// Load `env_file`, then resolve with process variables overriding file
    /// values.
    pub fn load(env_file: &Path, root: &Path) -> Result<Self, ConfigError> {
        let file_vars = load_env_file(env_file)?;
        tracing::debug!(path = %env_file.display(), vars = file_vars.len(), "loaded environment file");
        Self::resolve(
            |key| std::env::var(key).ok().or_else(|| file_vars.get(key).cloned()),
            root,
        )
    }

    pub fn overrides(&self) -> FunctionOverrides {
        FunctionOverrides {
            architecture: self.architecture,
        }
    }
}

/// Read a dotenv file into a map without touching the process environment.
///
/// A file that sets no variables counts as missing configuration.
pub fn load_env_file(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    let to_err = |source| ConfigError::EnvFile {
        path: path.to_path_buf(),
        source,
    };
    let mut vars = HashMap::new();
    for item in dotenvy::from_path_iter(path).map_err(to_err)? {
        let (key, value) = item.map_err(to_err)?;
        vars.insert(key, value);
    }
    if vars.is_empty() {
        return Err(ConfigError::EmptyEnvFile(path.to_path_buf()));
    }
    Ok(vars)
}

/// A value is true only when it lowercases to exactly `true`.
pub fn parse_flag(value: &str) -> bool {
    value.to_lowercase() == "true"
}

/// ARM when the toggle is on; otherwise no override at all.
pub fn architecture_for(is_arm64: bool) -> Option<Architecture> {
    is_arm64.then_some(Architecture::Arm64)
}

/// Optional settings layered onto a base function declaration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FunctionOverrides {
    pub architecture: Option<Architecture>,
}

impl FunctionOverrides {
    /// Apply the overrides that are set; unset ones leave `spec` as it was.
    pub fn merge(&self, mut spec: FunctionSpec) -> FunctionSpec {
        if let Some(arch) = self.architecture {
            spec.architecture = Some(arch);
        }
        spec
    }
}
