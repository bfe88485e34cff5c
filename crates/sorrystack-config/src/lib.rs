pub mod error;
pub mod settings;

pub use error::*;
pub use settings::{SETTINGS_FILE, ToolkitSettings};

use std::path::PathBuf;

/// スタック定義ファイルの候補（優先順）
const STACK_FILE_CANDIDATES: [&str; 4] = [
    "stack.local.kdl",
    ".stack.local.kdl",
    "stack.kdl",
    ".stack.kdl",
];

/// sorrystackの設定ディレクトリを取得
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("sorrystack");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

/// プロジェクトのstack.kdlファイルを探す
///
/// 以下の優先順位で定義ファイルを検索:
/// 1. 環境変数 SORRYSTACK_STACK_PATH (直接パス指定)
/// 2. カレントディレクトリ: stack.local.kdl, .stack.local.kdl, stack.kdl, .stack.kdl
/// 3. ./.sorrystack/ ディレクトリ内: 同様の順序
/// 4. ~/.config/sorrystack/stack.kdl (グローバル設定)
pub fn find_stack_file() -> Result<PathBuf> {
    // 1. 環境変数で直接指定
    if let Ok(stack_path) = std::env::var("SORRYSTACK_STACK_PATH") {
        let path = PathBuf::from(stack_path);
        if path.exists() {
            tracing::debug!(path = %path.display(), "Using SORRYSTACK_STACK_PATH");
            return Ok(path);
        }
        tracing::warn!(path = %path.display(), "SORRYSTACK_STACK_PATH does not exist, searching");
    }

    let current_dir = std::env::current_dir()?;

    // 2. カレントディレクトリで検索
    for filename in &STACK_FILE_CANDIDATES {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(path);
        }
    }

    // 3. ./.sorrystack/ ディレクトリで検索
    let stack_dir = current_dir.join(".sorrystack");
    if stack_dir.is_dir() {
        for filename in &STACK_FILE_CANDIDATES {
            let path = stack_dir.join(filename);
            if path.exists() {
                return Ok(path);
            }
        }
    }

    // 4. グローバル設定 (~/.config/sorrystack/stack.kdl)
    if let Some(config_dir) = dirs::config_dir() {
        let global_stack = config_dir.join("sorrystack").join("stack.kdl");
        if global_stack.exists() {
            return Ok(global_stack);
        }
    }

    Err(ConfigError::StackFileNotFound)
}
