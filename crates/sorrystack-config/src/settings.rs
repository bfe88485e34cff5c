//! ツールキット設定 (sorrystack.yaml)
//!
//! ブートストラップ修飾子や出力ディレクトリなど、スタック定義とは独立した
//! 合成時の設定を保持します。すべてのキーは省略可能です。

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// プロジェクトルートに置く設定ファイル名
pub const SETTINGS_FILE: &str = "sorrystack.yaml";

/// 合成時のツールキット設定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ToolkitSettings {
    /// ブートストラップ修飾子（アセットバケット名に使われる）
    pub qualifier: String,

    /// 合成結果の出力先（プロジェクトルートからの相対パス）
    pub output_dir: PathBuf,

    /// バケットデプロイ用ハンドラーバンドルのS3キー
    pub deployment_handler_key: String,

    /// バケット自動削除用ハンドラーバンドルのS3キー
    pub auto_delete_handler_key: String,

    /// カスタムリソースハンドラーのランタイム
    pub handler_runtime: String,
}

impl Default for ToolkitSettings {
    fn default() -> Self {
        Self {
            qualifier: "hnb659fds".to_string(),
            output_dir: PathBuf::from("stack.out"),
            deployment_handler_key: "bucket-deployment-handler.zip".to_string(),
            auto_delete_handler_key: "auto-delete-objects-handler.zip".to_string(),
            handler_runtime: "python3.11".to_string(),
        }
    }
}

impl ToolkitSettings {
    /// プロジェクトルートから設定を読み込む（ファイルが無ければデフォルト）
    pub fn load(project_root: &Path) -> Result<Self> {
        let path = project_root.join(SETTINGS_FILE);
        if !path.exists() {
            tracing::debug!("Toolkit settings not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)?;
        Self::from_yaml(&content).map_err(|message| ConfigError::InvalidSettings { path, message })
    }

    /// YAML文字列から読み込む
    pub fn from_yaml(content: &str) -> std::result::Result<Self, String> {
        // 空ファイルは null としてパースされるためデフォルト扱い
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let settings: Self = serde_yaml::from_str(content).map_err(|e| e.to_string())?;
        if settings.qualifier.is_empty() {
            return Err("qualifier must not be empty".to_string());
        }
        Ok(settings)
    }

    /// ブートストラップのアセットバケット名（CloudFormation Fn::Sub 形式）
    pub fn assets_bucket_sub(&self) -> String {
        format!(
            "cdk-{}-assets-${{AWS::AccountId}}-${{AWS::Region}}",
            self.qualifier
        )
    }
}
