//! AWS synthesis errors

use sorrystack_cloud::CloudError;
use sorrystack_core::StackError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AwsError {
    #[error("Stack definition error: {0}")]
    Stack(#[from] StackError),

    #[error("Duplicate logical id: {0}")]
    DuplicateLogicalId(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("{from} references unknown resource {to}")]
    DanglingReference { from: String, to: String },

    #[error("Dependency cycle between resources: {}", .0.join(", "))]
    DependencyCycle(Vec<String>),

    #[error("Invalid override on {resource} at '{path}': {message}")]
    InvalidOverride {
        resource: String,
        path: String,
        message: String,
    },

    #[error("Asset error at {path}: {message}")]
    Asset { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AwsError>;

impl From<AwsError> for CloudError {
    fn from(e: AwsError) -> Self {
        match e {
            AwsError::Io(e) => CloudError::Io(e),
            AwsError::Json(e) => CloudError::Json(e),
            AwsError::ResourceNotFound(id) => CloudError::ResourceNotFound(id),
            AwsError::Stack(e) => CloudError::InvalidConfig(e.to_string()),
            other => CloudError::SynthesisFailed(other.to_string()),
        }
    }
}
