//! 統合ローダー
//!
//! テンプレート展開、パース、パス解決、検証を統合

use crate::error::{Result, StackError};
use crate::model::StackDefinition;
use crate::parser::parse_kdl_string;
use crate::template::{TemplateProcessor, extract_variables};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// スタック定義ファイルをロード
///
/// 以下の処理を実行:
/// 1. ファイル読み込み
/// 2. 変数の収集 (variables ブロック, 環境変数, PROJECT_ROOT)
/// 3. テンプレート展開
/// 4. KDLパース
/// 5. デプロイ元パスの解決
/// 6. 検証
#[instrument(fields(path = %path.display()))]
pub fn load_stack(path: &Path) -> Result<StackDefinition> {
    let stack = load_stack_unchecked(path)?;

    debug!("Step 6: Validating stack");
    stack.validate()?;
    info!(
        stack = %stack.name,
        services = stack.services.len(),
        buckets = stack.buckets.len(),
        distributions = stack.distributions.len(),
        "Stack loaded successfully"
    );

    Ok(stack)
}

/// 検証を行わずにスタック定義をロード
///
/// `validate` コマンドのように問題を一覧表示したい場合に使います。
#[instrument(fields(path = %path.display()))]
pub fn load_stack_unchecked(path: &Path) -> Result<StackDefinition> {
    debug!("Step 1: Reading stack file");
    let content = std::fs::read_to_string(path).map_err(|e| StackError::IoError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let base_dir = stack_base_dir(path);

    debug!("Step 2: Preparing template processor");
    let mut processor = TemplateProcessor::new();
    processor.add_env_variables();
    processor.add_variable(
        "PROJECT_ROOT",
        serde_json::Value::String(base_dir.display().to_string()),
    );
    processor.add_variables(extract_variables(&content)?);

    debug!("Step 3: Expanding template");
    let expanded = processor.render_str(&content)?;

    debug!("Step 4: Parsing KDL");
    let default_name = base_dir
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unnamed")
        .to_string();
    let mut stack = parse_kdl_string(&expanded, default_name)?;

    debug!("Step 5: Resolving deployment sources");
    resolve_deployment_sources(&mut stack, &base_dir);

    Ok(stack)
}

/// スタックファイルのあるディレクトリ
fn stack_base_dir(path: &Path) -> PathBuf {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    parent.canonicalize().unwrap_or_else(|_| parent.to_path_buf())
}

/// 相対パスのデプロイ元をスタックファイル基準で解決
fn resolve_deployment_sources(stack: &mut StackDefinition, base_dir: &Path) {
    for deployment in &mut stack.deployments {
        for source in &mut deployment.sources {
            if source.is_relative() {
                *source = base_dir.join(&*source);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_stack(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("stack.kdl");
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_resolves_relative_sources() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("site")).unwrap();
        fs::write(dir.path().join("site/index.html"), "<h1>sorry</h1>").unwrap();
        let path = write_stack(
            &dir,
            r#"
bucket "site-bucket" {
    removal-policy "destroy"
}
deployment "Deploy" {
    source "./site"
    bucket "site-bucket"
}
"#,
        );

        let stack = load_stack(&path).unwrap();
        let source = &stack.deployments[0].sources[0];
        assert!(source.is_absolute());
        assert!(source.join("index.html").exists());
    }

    #[test]
    fn test_load_with_variables_block() {
        let dir = TempDir::new().unwrap();
        let path = write_stack(
            &dir,
            r#"
variables {
    stack_name "FromVariables"
}
stack "{{ stack_name }}"
"#,
        );

        let stack = load_stack(&path).unwrap();
        assert_eq!(stack.name, "FromVariables");
    }

    #[test]
    fn test_load_runs_validation() {
        let dir = TempDir::new().unwrap();
        let path = write_stack(
            &dir,
            r#"
service "Web" {
    image "nginx"
}
"#,
        );

        assert!(matches!(load_stack(&path), Err(StackError::Validation(_))));
        assert!(load_stack_unchecked(&path).is_ok());
    }

    #[test]
    fn test_load_missing_file() {
        let result = load_stack(Path::new("/nonexistent/stack.kdl"));
        assert!(matches!(result, Err(StackError::IoError { .. })));
    }
}
