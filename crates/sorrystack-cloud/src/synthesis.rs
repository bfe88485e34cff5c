//! Synthesized output
//!
//! A `Synthesis` is the rendered template together with the assets it
//! references. `write_to` stages both into an output directory that an
//! external provisioning engine can consume.

use crate::error::{CloudError, Result};
use crate::provider::ResourceSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;

const ASSET_MANIFEST_VERSION: &str = "36.0.0";

/// How an asset is packaged before upload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Packaging {
    /// Directory uploaded as a zip archive
    Zip,
    /// Single file uploaded as-is
    File,
}

/// A local file or directory referenced by the template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Logical id of the construct that owns the asset
    pub id: String,

    /// Local path of the asset source
    pub source: PathBuf,

    /// Content hash (hex)
    pub hash: String,

    pub packaging: Packaging,

    /// Destination bucket name (may contain `${AWS::...}` placeholders)
    pub destination_bucket: String,

    /// Destination object key
    pub object_key: String,
}

impl Artifact {
    /// Directory name used when staging the asset
    pub fn staged_name(&self) -> String {
        format!("asset.{}", self.hash)
    }
}

/// Result of rendering a stack
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Synthesis {
    pub stack_name: String,

    /// Resources keyed by logical id
    pub resources: ResourceSet,

    /// Full template document
    pub document: serde_json::Value,

    pub artifacts: Vec<Artifact>,
}

/// Files produced by `Synthesis::write_to`
#[derive(Debug, Clone)]
pub struct WrittenOutput {
    pub template: PathBuf,
    pub manifest: PathBuf,
    pub assets: Vec<PathBuf>,
}

impl Synthesis {
    pub fn template_file_name(&self) -> String {
        format!("{}.template.json", self.stack_name)
    }

    pub fn manifest_file_name(&self) -> String {
        format!("{}.assets.json", self.stack_name)
    }

    /// Pretty-printed template
    pub fn template_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.document)?)
    }

    /// Asset manifest describing where each artifact is uploaded
    pub fn asset_manifest(&self) -> serde_json::Value {
        let files: BTreeMap<&str, serde_json::Value> = self
            .artifacts
            .iter()
            .map(|artifact| {
                (
                    artifact.hash.as_str(),
                    serde_json::json!({
                        "source": {
                            "path": artifact.staged_name(),
                            "packaging": artifact.packaging,
                        },
                        "destinations": {
                            "current_account-current_region": {
                                "bucketName": artifact.destination_bucket,
                                "objectKey": artifact.object_key,
                            }
                        }
                    }),
                )
            })
            .collect();

        serde_json::json!({
            "version": ASSET_MANIFEST_VERSION,
            "files": files,
        })
    }

    /// Write the template, the asset manifest and staged assets
    #[tracing::instrument(skip(self), fields(stack = %self.stack_name, out_dir = %out_dir.display()))]
    pub async fn write_to(&self, out_dir: &Path) -> Result<WrittenOutput> {
        fs::create_dir_all(out_dir).await?;

        let template = out_dir.join(self.template_file_name());
        fs::write(&template, self.template_json()?).await?;

        let manifest = out_dir.join(self.manifest_file_name());
        fs::write(&manifest, serde_json::to_string_pretty(&self.asset_manifest())?).await?;

        let mut assets = Vec::with_capacity(self.artifacts.len());
        for artifact in &self.artifacts {
            let target = out_dir.join(artifact.staged_name());
            if target.exists() {
                tracing::debug!(asset = %artifact.id, "Asset already staged");
            } else {
                stage_asset(artifact, &target).await?;
                tracing::debug!(asset = %artifact.id, target = %target.display(), "Staged asset");
            }
            assets.push(target);
        }

        tracing::info!(
            resources = self.resources.len(),
            assets = assets.len(),
            "Wrote synthesis output"
        );
        Ok(WrittenOutput {
            template,
            manifest,
            assets,
        })
    }
}

/// Copy the asset next to `target` and rename it into place once complete
async fn stage_asset(artifact: &Artifact, target: &Path) -> Result<()> {
    let staging = staging_path(target);
    remove_path(&staging).await?;

    let copied = match artifact.packaging {
        Packaging::File => {
            if let Some(parent) = staging.parent() {
                fs::create_dir_all(parent).await?;
            }
            fs::copy(&artifact.source, &staging).await.map(|_| ()).map_err(CloudError::from)
        }
        Packaging::Zip => copy_dir(&artifact.source, &staging).await,
    };

    if let Err(e) = copied {
        if let Err(cleanup) = remove_path(&staging).await {
            tracing::warn!(path = %staging.display(), error = %cleanup, "Failed to remove partial asset");
        }
        return Err(e);
    }

    fs::rename(&staging, target).await?;
    Ok(())
}

fn staging_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".staging");
    target.with_file_name(name)
}

async fn remove_path(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path).await {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path).await?,
        Ok(_) => fs::remove_file(path).await?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

/// Copy a directory tree
async fn copy_dir(source: &Path, target: &Path) -> Result<()> {
    if !fs::metadata(source).await?.is_dir() {
        return Err(CloudError::InvalidConfig(format!(
            "Asset source is not a directory: {}",
            source.display()
        )));
    }

    let mut pending = vec![(source.to_path_buf(), target.to_path_buf())];
    while let Some((from, to)) = pending.pop() {
        fs::create_dir_all(&to).await?;
        let mut entries = fs::read_dir(&from).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let dest = to.join(entry.file_name());
            if entry.file_type().await?.is_dir() {
                pending.push((path, dest));
            } else {
                fs::copy(&path, &dest).await?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ResourceConfig;
    use tempfile::tempdir;

    fn synthesis_with_asset(source: PathBuf) -> Synthesis {
        let mut resources = ResourceSet::new();
        resources.add(ResourceConfig::new(
            "AWS::S3::Bucket",
            "Bucket",
            "aws",
            serde_json::json!({}),
        ));
        Synthesis {
            stack_name: "Demo".to_string(),
            resources,
            document: serde_json::json!({ "Resources": { "Bucket": { "Type": "AWS::S3::Bucket" } } }),
            artifacts: vec![Artifact {
                id: "Deploy".to_string(),
                source,
                hash: "abc123".to_string(),
                packaging: Packaging::Zip,
                destination_bucket: "cdk-hnb659fds-assets-${AWS::AccountId}-${AWS::Region}"
                    .to_string(),
                object_key: "abc123.zip".to_string(),
            }],
        }
    }

    #[tokio::test]
    async fn test_write_to_stages_template_and_assets() {
        let src = tempdir().unwrap();
        std::fs::create_dir(src.path().join("css")).unwrap();
        std::fs::write(src.path().join("index.html"), "<h1>sorry</h1>").unwrap();
        std::fs::write(src.path().join("css/site.css"), "body {}").unwrap();

        let out = tempdir().unwrap();
        let synthesis = synthesis_with_asset(src.path().to_path_buf());
        let written = synthesis.write_to(out.path()).await.unwrap();

        assert!(written.template.ends_with("Demo.template.json"));
        let template: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&written.template).unwrap()).unwrap();
        assert_eq!(template, synthesis.document);

        let staged = out.path().join("asset.abc123");
        assert!(staged.join("index.html").exists());
        assert!(staged.join("css/site.css").exists());

        let manifest: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&written.manifest).unwrap()).unwrap();
        assert_eq!(
            manifest["files"]["abc123"]["source"]["packaging"],
            serde_json::json!("zip")
        );
    }

    #[tokio::test]
    async fn test_stale_staging_dir_is_replaced() {
        let src = tempdir().unwrap();
        std::fs::write(src.path().join("index.html"), "<h1>sorry</h1>").unwrap();

        let out = tempdir().unwrap();
        let stale = out.path().join("asset.abc123.staging");
        std::fs::create_dir(&stale).unwrap();
        std::fs::write(stale.join("leftover.html"), "old").unwrap();

        synthesis_with_asset(src.path().to_path_buf())
            .write_to(out.path())
            .await
            .unwrap();

        let staged = out.path().join("asset.abc123");
        assert!(staged.join("index.html").exists());
        assert!(!staged.join("leftover.html").exists());
        assert!(!stale.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_copy_leaves_no_partial_asset() {
        let src = tempdir().unwrap();
        std::fs::write(src.path().join("index.html"), "<h1>sorry</h1>").unwrap();
        std::os::unix::fs::symlink(src.path().join("gone.css"), src.path().join("site.css")).unwrap();

        let out = tempdir().unwrap();
        let synthesis = synthesis_with_asset(src.path().to_path_buf());
        assert!(synthesis.write_to(out.path()).await.is_err());
        assert!(!out.path().join("asset.abc123").exists());
        assert!(!out.path().join("asset.abc123.staging").exists());

        // a later run stages the repaired source
        std::fs::remove_file(src.path().join("site.css")).unwrap();
        synthesis.write_to(out.path()).await.unwrap();
        assert!(out.path().join("asset.abc123/index.html").exists());
    }

    #[tokio::test]
    async fn test_missing_asset_source() {
        let out = tempdir().unwrap();
        let synthesis = synthesis_with_asset(PathBuf::from("/nonexistent/sorry-page"));
        assert!(synthesis.write_to(out.path()).await.is_err());
    }
}
