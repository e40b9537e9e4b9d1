//! Assets: local directories packaged alongside the template.
//!
//! Two constructs carry local inputs: the function's build context (packaged
//! as a container image) and the asset sync's source tree (packaged as a zip
//! of files). Each becomes an [`Asset`] whose id is a content hash, so the
//! template changes exactly when the directory contents change.

pub mod hasher;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::core::types::ResourceSpec;
use crate::core::Stack;

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("asset source {0} is not a directory")]
    NotADirectory(PathBuf),

    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// How an asset is packaged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    ContainerImage,
    Files,
}

impl std::fmt::Display for AssetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ContainerImage => write!(f, "container-image"),
            Self::Files => write!(f, "files"),
        }
    }
}

/// A staged local input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    /// Hex content hash, also used as the image tag / object key stem.
    pub id: String,
    pub kind: AssetKind,
    pub source: PathBuf,
    /// Logical id of the construct that consumes the asset.
    pub consumer: String,
}

impl Asset {
    /// Object key of a files asset inside the staging bucket.
    pub fn object_key(&self) -> String {
        format!("{}.zip", self.id)
    }

    /// Image tag of a container asset.
    pub fn image_tag(&self) -> &str {
        &self.id
    }
}

/// Hash one directory into an asset.
pub fn stage(kind: AssetKind, source: PathBuf, consumer: &str) -> Result<Asset, AssetError> {
    let dir_hash = hasher::hash_directory(&source)?;
    let kind_tag = kind.to_string();
    let id = hasher::hex_digest(&hasher::composite_hash(&[&kind_tag, &dir_hash])).to_string();
    tracing::debug!(%kind, source = %source.display(), %id, "staged asset");
    Ok(Asset {
        id,
        kind,
        source,
        consumer: consumer.to_string(),
    })
}

/// Stage every asset the stack needs, keyed by consuming logical id.
pub fn stage_assets(stack: &Stack) -> Result<IndexMap<String, Asset>, AssetError> {
    let mut assets = IndexMap::new();
    for decl in stack.declarations() {
        let staged = match &decl.spec {
            ResourceSpec::Function(f) => Some(stage(
                AssetKind::ContainerImage,
                f.build_context.clone(),
                &decl.logical_id,
            )?),
            ResourceSpec::AssetSync(a) => {
                Some(stage(AssetKind::Files, a.source.clone(), &decl.logical_id)?)
            }
            _ => None,
        };
        if let Some(asset) = staged {
            assets.insert(decl.logical_id.clone(), asset);
        }
    }
    Ok(assets)
}

/// The asset manifest written next to the template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetManifest {
    pub version: String,
    pub stack: String,
    pub assets: Vec<Asset>,
}

impl AssetManifest {
    pub fn new(stack: &str, assets: &IndexMap<String, Asset>) -> Self {
        Self {
            version: "1.0".to_string(),
            stack: stack.to_string(),
            assets: assets.values().cloned().collect(),
        }
    }
}
