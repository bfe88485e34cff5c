use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StackError {
    #[error("KDLパースエラー: {0}")]
    KdlParse(#[from] kdl::KdlError),

    #[error("ファイル読み込みエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO エラー: {path}\n理由: {message}")]
    IoError { path: PathBuf, message: String },

    #[error("無効な設定: {0}")]
    InvalidConfig(String),

    #[error("{field} に不明な値が指定されています: {value}")]
    UnknownValue { field: &'static str, value: String },

    #[error("不正なCIDR: {0}")]
    InvalidCidr(String),

    #[error("サブネットを割り当てられません: {0}")]
    SubnetAllocation(String),

    #[error("テンプレート展開エラー: {0}")]
    TemplateRenderError(String),

    #[error("スタック定義の検証に失敗しました:\n{}", .0.iter().map(|p| format!("  - {p}")).collect::<Vec<_>>().join("\n"))]
    Validation(Vec<String>),
}

pub type Result<T> = std::result::Result<T, StackError>;
