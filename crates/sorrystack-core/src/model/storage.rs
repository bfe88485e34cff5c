//! ストレージモデル
//!
//! S3 バケットと静的コンテンツのデプロイ定義

use crate::error::{Result, StackError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// スタック削除時の扱い
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemovalPolicy {
    Destroy,
    #[default]
    Retain,
}

impl RemovalPolicy {
    /// CloudFormation の DeletionPolicy / UpdateReplacePolicy 値
    pub fn as_cfn(&self) -> &'static str {
        match self {
            RemovalPolicy::Destroy => "Delete",
            RemovalPolicy::Retain => "Retain",
        }
    }
}

impl FromStr for RemovalPolicy {
    type Err = StackError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "destroy" | "delete" => Ok(RemovalPolicy::Destroy),
            "retain" => Ok(RemovalPolicy::Retain),
            _ => Err(StackError::UnknownValue {
                field: "removal policy",
                value: s.to_string(),
            }),
        }
    }
}

/// パブリックアクセスブロック設定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlockPublicAccess {
    #[default]
    BlockAll,
    Off,
}

impl FromStr for BlockPublicAccess {
    type Err = StackError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "all" | "block-all" => Ok(BlockPublicAccess::BlockAll),
            "off" | "none" => Ok(BlockPublicAccess::Off),
            _ => Err(StackError::UnknownValue {
                field: "block public access",
                value: s.to_string(),
            }),
        }
    }
}

/// CORS で許可する HTTP メソッド
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Head,
    Put,
    Post,
    Delete,
}

impl FromStr for HttpMethod {
    type Err = StackError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "HEAD" => Ok(HttpMethod::Head),
            "PUT" => Ok(HttpMethod::Put),
            "POST" => Ok(HttpMethod::Post),
            "DELETE" => Ok(HttpMethod::Delete),
            _ => Err(StackError::UnknownValue {
                field: "http method",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HttpMethod::Get => "GET",
            HttpMethod::Head => "HEAD",
            HttpMethod::Put => "PUT",
            HttpMethod::Post => "POST",
            HttpMethod::Delete => "DELETE",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CorsRule {
    pub allowed_methods: Vec<HttpMethod>,
    pub allowed_origins: Vec<String>,
    pub allowed_headers: Vec<String>,
    pub max_age: Option<u32>,
}

/// S3 バケット
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketSpec {
    pub id: String,
    /// 省略時は自動命名
    pub bucket_name: Option<String>,
    pub versioned: bool,
    pub removal_policy: RemovalPolicy,
    /// スタック削除時にオブジェクト（旧バージョン含む）を消去する
    pub auto_delete_objects: bool,
    pub block_public_access: BlockPublicAccess,
    pub cors: Vec<CorsRule>,
}

impl BucketSpec {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            bucket_name: None,
            versioned: false,
            removal_policy: RemovalPolicy::default(),
            auto_delete_objects: false,
            block_public_access: BlockPublicAccess::default(),
            cors: Vec::new(),
        }
    }

    /// スタック削除時にバケット削除が失敗しうる構成か
    ///
    /// バージョニング有効・削除ポリシー destroy・自動削除なしの場合、
    /// 旧バージョンが残るためバケットを空にできない。
    pub fn leaves_versions_on_destroy(&self) -> bool {
        self.versioned && self.removal_policy == RemovalPolicy::Destroy && !self.auto_delete_objects
    }
}

/// ローカルディレクトリをバケットへ配置するデプロイ
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentSpec {
    pub id: String,
    /// 配置元ディレクトリ（ロード時にスタックファイル基準で解決）
    pub sources: Vec<PathBuf>,
    /// 配置先バケットの id
    pub destination_bucket: String,
    pub destination_key_prefix: Option<String>,
    pub retain_on_delete: bool,
    /// 配置元に無いオブジェクトを削除する
    pub prune: bool,
}

impl DeploymentSpec {
    pub fn new(id: impl Into<String>, destination_bucket: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            sources: Vec::new(),
            destination_bucket: destination_bucket.into(),
            destination_key_prefix: None,
            retain_on_delete: true,
            prune: true,
        }
    }
}
