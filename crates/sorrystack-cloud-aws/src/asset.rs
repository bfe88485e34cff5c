//! Content hashing for local assets
//!
//! The hash covers every regular file below the source, visited in sorted
//! relative-path order. Both the path and the bytes feed the digest, so a
//! rename changes the hash just like an edit does.

use crate::error::{AwsError, Result};
use sha2::{Digest, Sha256};
use sorrystack_cloud::Packaging;
use std::path::{Path, PathBuf};

/// A hashed asset source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetSource {
    pub path: PathBuf,
    pub hash: String,
    pub packaging: Packaging,
}

/// Hash a file or directory
pub fn hash_source(path: &Path) -> Result<AssetSource> {
    if !path.exists() {
        return Err(AwsError::Asset {
            path: path.to_path_buf(),
            message: "source does not exist".to_string(),
        });
    }

    let (hash, packaging) = if path.is_dir() {
        (hash_directory(path)?, Packaging::Zip)
    } else {
        let bytes = std::fs::read(path)?;
        (hex::encode(Sha256::digest(&bytes)), Packaging::File)
    };

    tracing::debug!(path = %path.display(), hash = %hash, "Hashed asset");
    Ok(AssetSource {
        path: path.to_path_buf(),
        hash,
        packaging,
    })
}

/// Deterministic hash of a directory tree
pub fn hash_directory(dir: &Path) -> Result<String> {
    let mut hasher = Sha256::new();
    for (relative, absolute) in list_files(dir)? {
        let bytes = std::fs::read(&absolute)?;
        hasher.update(relative.as_bytes());
        hasher.update([0u8]);
        hasher.update((bytes.len() as u64).to_be_bytes());
        hasher.update(&bytes);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Regular files below `dir`, keyed by `/`-separated relative path, sorted
pub fn list_files(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let asset_error = |message: String| AwsError::Asset {
        path: dir.to_path_buf(),
        message,
    };

    let pattern = format!("{}/**/*", glob::Pattern::escape(&dir.to_string_lossy()));
    let entries = glob::glob_with(
        &pattern,
        glob::MatchOptions {
            case_sensitive: true,
            require_literal_separator: false,
            require_literal_leading_dot: false,
        },
    )
    .map_err(|e| asset_error(e.to_string()))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| asset_error(e.to_string()))?;
        if !path.is_file() {
            continue;
        }
        let relative = path
            .strip_prefix(dir)
            .map_err(|e| asset_error(e.to_string()))?
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        files.push((relative, path));
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn sample_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("index.html"), "<h1>Sorry</h1>").unwrap();
        fs::create_dir(dir.path().join("css")).unwrap();
        fs::write(dir.path().join("css/site.css"), "body {}").unwrap();
        fs::write(dir.path().join(".hidden"), "x").unwrap();
        dir
    }

    #[test]
    fn test_hash_is_stable() {
        let dir = sample_dir();
        let first = hash_directory(dir.path()).unwrap();
        let second = hash_directory(dir.path()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
    }

    #[test]
    fn test_hash_changes_with_content_and_name() {
        let dir = sample_dir();
        let original = hash_directory(dir.path()).unwrap();

        fs::write(dir.path().join("index.html"), "<h1>Back soon</h1>").unwrap();
        let edited = hash_directory(dir.path()).unwrap();
        assert_ne!(original, edited);

        fs::rename(dir.path().join("index.html"), dir.path().join("home.html")).unwrap();
        assert_ne!(edited, hash_directory(dir.path()).unwrap());
    }

    #[test]
    fn test_list_files_sorted_and_relative() {
        let dir = sample_dir();
        let names: Vec<String> = list_files(dir.path()).unwrap().into_iter().map(|(r, _)| r).collect();
        assert_eq!(names, vec![".hidden", "css/site.css", "index.html"]);
    }

    #[test]
    fn test_missing_source_is_error() {
        let dir = TempDir::new().unwrap();
        let err = hash_source(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, AwsError::Asset { .. }));
    }

    #[test]
    fn test_single_file_packaging() {
        let dir = sample_dir();
        let source = hash_source(&dir.path().join("index.html")).unwrap();
        assert_eq!(source.packaging, Packaging::File);
        assert_eq!(hash_source(dir.path()).unwrap().packaging, Packaging::Zip);
    }
}
