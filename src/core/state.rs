//! Output directory management: template and asset manifest paths, atomic
//! saves, and loading the previous synthesis for diffing.

use std::path::{Path, PathBuf};
use thiserror::Error;

use super::synth::{self, Format, SynthError, Template};
use crate::assets::AssetManifest;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid template {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error(transparent)]
    Render(#[from] SynthError),

    #[error("cannot serialize asset manifest: {0}")]
    Manifest(#[source] serde_json::Error),
}

/// Path of the synthesized template for `stack`.
pub fn template_path(out_dir: &Path, stack: &str, format: Format) -> PathBuf {
    out_dir.join(format!("{}.template.{}", stack, format.extension()))
}

/// Path of the asset manifest for `stack`.
pub fn manifest_path(out_dir: &Path, stack: &str) -> PathBuf {
    out_dir.join(format!("{}.assets.json", stack))
}

/// Load the previously synthesized template, whichever format it was written
/// in. Returns None if there is none.
pub fn load_template(out_dir: &Path, stack: &str) -> Result<Option<Template>, StateError> {
    for format in [Format::Json, Format::Yaml] {
        let path = template_path(out_dir, stack, format);
        if !path.exists() {
            continue;
        }
        let content = std::fs::read_to_string(&path).map_err(|source| StateError::Read {
            path: path.clone(),
            source,
        })?;
        let parsed: Result<Template, String> = match format {
            Format::Json => serde_json::from_str(&content).map_err(|e| e.to_string()),
            Format::Yaml => serde_yaml_ng::from_str(&content).map_err(|e| e.to_string()),
        };
        return parsed
            .map(Some)
            .map_err(|message| StateError::Parse { path, message });
    }
    Ok(None)
}

/// Save the template atomically. A template left behind in the other format
/// is removed so the next load sees only this one.
pub fn save_template(
    out_dir: &Path,
    stack: &str,
    template: &Template,
    format: Format,
) -> Result<PathBuf, StateError> {
    let text = synth::render(template, format)?;
    let path = template_path(out_dir, stack, format);
    write_atomic(&path, &text)?;

    let other = match format {
        Format::Json => Format::Yaml,
        Format::Yaml => Format::Json,
    };
    let stale = template_path(out_dir, stack, other);
    if stale.exists() {
        std::fs::remove_file(&stale).map_err(|source| StateError::Write {
            path: stale.clone(),
            source,
        })?;
    }
    Ok(path)
}

/// Save the asset manifest atomically.
pub fn save_manifest(out_dir: &Path, manifest: &AssetManifest) -> Result<PathBuf, StateError> {
    let mut json = serde_json::to_string_pretty(manifest)
        .map_err(StateError::Manifest)?;
    json.push('\n');
    let path = manifest_path(out_dir, &manifest.stack);
    write_atomic(&path, &json)?;
    Ok(path)
}

/// Write to a temp file next to `path`, then rename over it.
fn write_atomic(path: &Path, contents: &str) -> Result<(), StateError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(write_err(parent))?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp_path = PathBuf::from(tmp);
    std::fs::write(&tmp_path, contents).map_err(write_err(&tmp_path))?;
    std::fs::rename(&tmp_path, path).map_err(write_err(path))?;
    tracing::debug!(path = %path.display(), bytes = contents.len(), "wrote");
    Ok(())
}

fn write_err(path: &Path) -> impl FnOnce(std::io::Error) -> StateError {
    let path = path.to_path_buf();
    move |source| StateError::Write { path, source }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::synth::{CfnResource, TEMPLATE_FORMAT_VERSION};
    use indexmap::IndexMap;
    use serde_json::json;

    fn make_template() -> Template {
        let mut resources = IndexMap::new();
        resources.insert(
            "DemoBucketA1B2C3D4".to_string(),
            CfnResource {
                resource_type: "AWS::S3::Bucket".to_string(),
                properties: json!({ "BucketName": "demo-bucket-20261018" }),
                depends_on: vec![],
                metadata: None,
            },
        );
        Template {
            format_version: TEMPLATE_FORMAT_VERSION.to_string(),
            description: Some("test".to_string()),
            parameters: IndexMap::new(),
            resources,
            outputs: IndexMap::new(),
        }
    }

    #[test]
    fn test_paths() {
        let out = Path::new("/out");
        assert_eq!(
            template_path(out, "Demo", Format::Json),
            PathBuf::from("/out/Demo.template.json")
        );
        assert_eq!(
            template_path(out, "Demo", Format::Yaml),
            PathBuf::from("/out/Demo.template.yaml")
        );
        assert_eq!(manifest_path(out, "Demo"), PathBuf::from("/out/Demo.assets.json"));
    }

    #[test]
    fn test_save_and_load_json() {
        let dir = tempfile::tempdir().unwrap();
        let t = make_template();
        save_template(dir.path(), "Demo", &t, Format::Json).unwrap();
        let loaded = load_template(dir.path(), "Demo").unwrap().unwrap();
        assert_eq!(loaded, t);
    }

    #[test]
    fn test_save_and_load_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let t = make_template();
        save_template(dir.path(), "Demo", &t, Format::Yaml).unwrap();
        let loaded = load_template(dir.path(), "Demo").unwrap().unwrap();
        assert_eq!(loaded.resources.len(), 1);
    }

    #[test]
    fn test_switching_format_removes_stale_template() {
        let dir = tempfile::tempdir().unwrap();
        let t = make_template();
        save_template(dir.path(), "Demo", &t, Format::Json).unwrap();
        save_template(dir.path(), "Demo", &t, Format::Yaml).unwrap();
        assert!(!template_path(dir.path(), "Demo", Format::Json).exists());
        assert!(template_path(dir.path(), "Demo", Format::Yaml).exists());
    }

    #[test]
    fn test_load_nonexistent() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_template(dir.path(), "Ghost").unwrap().is_none());
    }

    #[test]
    fn test_load_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(template_path(dir.path(), "Demo", Format::Json), "{ nope").unwrap();
        let result = load_template(dir.path(), "Demo");
        assert!(matches!(result, Err(StateError::Parse { .. })));
    }

    #[test]
    fn test_render_failure_is_typed() {
        let json_err = serde_json::from_str::<Template>("{").unwrap_err();
        let err = StateError::from(SynthError::from(json_err));
        assert!(matches!(err, StateError::Render(SynthError::Json(_))));
        assert!(err.to_string().starts_with("JSON serialize error"));
    }

    #[test]
    fn test_atomic_write_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let path = save_template(dir.path(), "Demo", &make_template(), Format::Json).unwrap();
        assert!(path.exists());
        assert!(!dir.path().join("Demo.template.json.tmp").exists());
    }

    #[test]
    fn test_save_manifest_creates_out_dir() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("cdk.out");
        let manifest = AssetManifest::new("Demo", &IndexMap::new());
        let path = save_manifest(&out, &manifest).unwrap();
        assert_eq!(path, out.join("Demo.assets.json"));
        let text = std::fs::read_to_string(path).unwrap();
        assert!(text.contains("\"stack\": \"Demo\""));
    }
}
