//! テンプレート処理
//!
//! Tera を使用してスタック定義ファイル内の変数展開を行います。
//! `{{ CDK_DEFAULT_ACCOUNT }}` のように環境変数からアカウントやリージョンを差し込めます。

use crate::error::{Result, StackError};
use std::collections::HashMap;
use std::path::Path;
use tera::{Context, Tera};
use tracing::{debug, info};

/// テンプレート変数の型
pub type Variables = HashMap<String, serde_json::Value>;

/// テンプレートに取り込む環境変数のプレフィックス
///
/// 認証情報 (AWS_SECRET_ACCESS_KEY など) は除外する。
const ALLOWED_ENV_PREFIXES: &[&str] = &["SORRYSTACK_", "CDK_", "AWS_REGION", "AWS_DEFAULT_REGION"];

const DENIED_ENV_SUFFIXES: &[&str] = &["_SECRET", "_TOKEN", "_PASSWORD", "_KEY"];

/// テンプレートプロセッサー
pub struct TemplateProcessor {
    tera: Tera,
    context: Context,
}

impl TemplateProcessor {
    /// 新しいテンプレートプロセッサーを作成
    pub fn new() -> Self {
        Self {
            tera: Tera::default(),
            context: Context::new(),
        }
    }

    /// 変数を追加
    pub fn add_variable(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.context.insert(key.into(), &value);
    }

    /// 複数の変数を追加
    pub fn add_variables(&mut self, variables: Variables) {
        for (key, value) in variables {
            self.context.insert(key, &value);
        }
    }

    /// 許可された環境変数を追加
    #[tracing::instrument(skip(self))]
    pub fn add_env_variables(&mut self) {
        let mut count = 0;
        for (key, value) in std::env::vars() {
            if is_allowed_env_key(&key) {
                self.context.insert(key, &value);
                count += 1;
            }
        }
        debug!(variable_count = count, "Loaded environment variables");
    }

    /// 文字列をテンプレートとして展開
    pub fn render_str(&mut self, template: &str) -> Result<String> {
        self.tera
            .render_str(template, &self.context)
            .map_err(|e| StackError::TemplateRenderError(extract_tera_error_detail(&e)))
    }

    /// ファイルを読み込んでテンプレート展開
    pub fn render_file(&mut self, path: &Path) -> Result<String> {
        let content = std::fs::read_to_string(path).map_err(|e| StackError::IoError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let rendered = self.render_str(&content)?;
        info!(file = %path.display(), "Rendered stack template");
        Ok(rendered)
    }
}

impl Default for TemplateProcessor {
    fn default() -> Self {
        Self::new()
    }
}

fn is_allowed_env_key(key: &str) -> bool {
    ALLOWED_ENV_PREFIXES.iter().any(|p| key.starts_with(p))
        && !DENIED_ENV_SUFFIXES.iter().any(|s| key.ends_with(s))
}

/// KDL内の variables { ... } ブロックを抽出
///
/// テンプレート展開前の文字列から取り出すため、KDL全体ではなく
/// ブロックの中身だけをパースします。
pub fn extract_variables(kdl_content: &str) -> Result<Variables> {
    let mut vars = HashMap::new();
    let mut search_from = 0;

    while let Some(offset) = kdl_content[search_from..].find("variables") {
        let start = search_from + offset;
        let after = start + "variables".len();
        search_from = after;

        // 行頭のノード名としての出現のみ対象
        let line_start = kdl_content[..start].rfind('\n').map_or(0, |i| i + 1);
        if !kdl_content[line_start..start].trim().is_empty() {
            continue;
        }
        let rest = &kdl_content[after..];
        let Some(brace) = rest.find(|c: char| !c.is_whitespace()) else {
            break;
        };
        if !rest[brace..].starts_with('{') {
            continue;
        }
        let open = after + brace;
        let Some(close) = find_matching_brace(kdl_content, open) else {
            return Err(StackError::InvalidConfig(
                "variables ブロックが閉じられていません".to_string(),
            ));
        };

        let body = format!("extracted {{\n{}\n}}", &kdl_content[open + 1..close]);
        let doc: kdl::KdlDocument = body.parse().map_err(|e| {
            StackError::InvalidConfig(format!("KDL パースエラー (variables ブロック): {e}"))
        })?;
        if let Some(children) = doc.nodes().first().and_then(|n| n.children()) {
            for var_node in children.nodes() {
                if let Some(entry) = var_node.entries().first() {
                    vars.insert(
                        var_node.name().value().to_string(),
                        kdl_value_to_json(entry.value()),
                    );
                }
            }
        }
        search_from = close + 1;
    }

    Ok(vars)
}

/// 対応する閉じ波括弧の位置を見つける
fn find_matching_brace(content: &str, open_pos: usize) -> Option<usize> {
    let bytes = content.as_bytes();
    if bytes.get(open_pos) != Some(&b'{') {
        return None;
    }

    let mut depth = 1;
    let mut in_string = false;
    let mut escape_next = false;

    for (pos, &c) in bytes.iter().enumerate().skip(open_pos + 1) {
        if escape_next {
            escape_next = false;
            continue;
        }
        match c {
            b'\\' => escape_next = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(pos);
                }
            }
            _ => {}
        }
    }

    None
}

/// Teraエラーから詳細情報を抽出
fn extract_tera_error_detail(e: &tera::Error) -> String {
    use std::error::Error;

    let mut details = vec![e.to_string()];
    let mut source = e.source();
    while let Some(err) = source {
        details.push(err.to_string());
        source = err.source();
    }
    let full_error = details.join(" | ");

    if full_error.contains("not found in context")
        && let Some(start) = full_error.find("Variable `")
        && let Some(end) = full_error[start..].find("` not found")
    {
        let var_name = &full_error[start + 10..start + end];
        return format!(
            "未定義の変数: `{var_name}`\nヒント: variables ブロックで定義するか、環境変数 (SORRYSTACK_*, CDK_*) を設定してください"
        );
    }

    full_error
}

/// KDL値をJSON値に変換
fn kdl_value_to_json(value: &kdl::KdlValue) -> serde_json::Value {
    if let Some(s) = value.as_string() {
        serde_json::Value::String(s.to_string())
    } else if let Some(i) = value.as_integer() {
        i64::try_from(i)
            .map(|i| serde_json::Value::Number(i.into()))
            .unwrap_or(serde_json::Value::Null)
    } else if let Some(f) = value.as_float() {
        serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)
    } else if let Some(b) = value.as_bool() {
        serde_json::Value::Bool(b)
    } else {
        serde_json::Value::Null
    }
}
