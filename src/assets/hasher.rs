//! BLAKE3 content hashing for asset directories and template resources.

use std::io::Read;
use std::path::Path;

use super::AssetError;

const STREAM_BUF_SIZE: usize = 65536;

/// Prefix on every digest this module returns.
pub const PREFIX: &str = "blake3:";

/// Hash a file's contents. Returns `"blake3:{hex}"`.
pub fn hash_file(path: &Path) -> Result<String, AssetError> {
    let io_err = |source| AssetError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut file = std::fs::File::open(path).map_err(io_err)?;
    let mut hasher = blake3::Hasher::new();
    let mut buf = [0u8; STREAM_BUF_SIZE];
    loop {
        let n = file.read(&mut buf).map_err(io_err)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{PREFIX}{}", hasher.finalize().to_hex()))
}

/// Hash a string. Returns `"blake3:{hex}"`.
pub fn hash_string(s: &str) -> String {
    format!("{PREFIX}{}", blake3::hash(s.as_bytes()).to_hex())
}

/// Hash a directory tree: sorted walk, relative paths included, symlinks
/// skipped. Moving or renaming a file changes the hash.
pub fn hash_directory(path: &Path) -> Result<String, AssetError> {
    if !path.is_dir() {
        return Err(AssetError::NotADirectory(path.to_path_buf()));
    }

    let mut entries: Vec<(String, String)> = Vec::new();

    fn walk(
        base: &Path,
        current: &Path,
        entries: &mut Vec<(String, String)>,
    ) -> Result<(), AssetError> {
        let io_err = |source| AssetError::Io {
            path: current.to_path_buf(),
            source,
        };
        let mut children: Vec<std::fs::DirEntry> = std::fs::read_dir(current)
            .map_err(io_err)?
            .collect::<Result<_, _>>()
            .map_err(io_err)?;
        children.sort_by_key(|e| e.file_name());

        for entry in children {
            let ft = entry.file_type().map_err(io_err)?;
            if ft.is_symlink() {
                continue;
            }
            let path = entry.path();
            let rel = path
                .strip_prefix(base)
                .unwrap_or(&path)
                .to_string_lossy()
                .replace('\\', "/");
            if ft.is_file() {
                entries.push((rel, hash_file(&path)?));
            } else if ft.is_dir() {
                walk(base, &path, entries)?;
            }
        }
        Ok(())
    }

    walk(path, path, &mut entries)?;

    let mut hasher = blake3::Hasher::new();
    for (rel, hash) in &entries {
        hasher.update(rel.as_bytes());
        hasher.update(b"\0");
        hasher.update(hash.as_bytes());
        hasher.update(b"\n");
    }
    Ok(format!("{PREFIX}{}", hasher.finalize().to_hex()))
}

/// Compute a composite hash from multiple component hashes.
pub fn composite_hash(components: &[&str]) -> String {
    let mut hasher = blake3::Hasher::new();
    for c in components {
        hasher.update(c.as_bytes());
        hasher.update(b"\0");
    }
    format!("{PREFIX}{}", hasher.finalize().to_hex())
}

/// The bare hex digest of a prefixed hash.
pub fn hex_digest(hash: &str) -> &str {
    hash.strip_prefix(PREFIX).unwrap_or(hash)
}
