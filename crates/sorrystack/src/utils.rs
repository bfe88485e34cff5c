use colored::Colorize;
use sorrystack_cloud::{Action, ActionType, Plan};
use sorrystack_config::ToolkitSettings;
use sorrystack_core::StackDefinition;
use std::path::{Path, PathBuf};

/// ロード済みのスタック定義と設定
pub struct Project {
    pub root: PathBuf,
    pub definition: StackDefinition,
    pub settings: ToolkitSettings,
}

/// `--stack` 指定があればそれを、なければ定義ファイルを検索
pub fn resolve_stack_path(explicit: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    match explicit {
        Some(path) if path.exists() => Ok(path),
        Some(path) => Err(anyhow::anyhow!(
            "スタック定義ファイルが見つかりません: {}",
            path.display()
        )),
        None => Ok(sorrystack_config::find_stack_file()?),
    }
}

/// 定義ファイルのあるディレクトリをプロジェクトルートとする
pub fn project_root(stack_path: &Path) -> PathBuf {
    match stack_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// スタック定義とツールキット設定を読み込む
pub fn load_project(stack_path: &Path) -> anyhow::Result<Project> {
    let root = project_root(stack_path);
    let definition = sorrystack_core::load_stack(stack_path)?;
    let settings = ToolkitSettings::load(&root)?;
    Ok(Project {
        root,
        definition,
        settings,
    })
}

/// 読み込んだファイルを表示
pub fn print_loaded_files(stack_path: &Path, root: &Path) {
    println!("📄 読み込んだファイル:");
    println!("  • {}", stack_path.display().to_string().cyan());
    let settings = root.join(sorrystack_config::SETTINGS_FILE);
    if settings.exists() {
        println!("  • {} (ツールキット設定)", settings.display().to_string().cyan());
    }
}

fn action_marker(action_type: ActionType) -> colored::ColoredString {
    match action_type {
        ActionType::Create => "+".green().bold(),
        ActionType::Update => "~".yellow().bold(),
        ActionType::Delete => "-".red().bold(),
        ActionType::NoOp => " ".normal(),
    }
}

fn print_action(action: &Action) {
    let replacement = action
        .details
        .get("replacement")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let suffix = if replacement { " (置き換え)".red().to_string() } else { String::new() };

    println!(
        "  {} {} {}{}",
        action_marker(action.action_type),
        action.resource_id.bold(),
        action.resource_type.dimmed(),
        suffix
    );

    if let Some(properties) = action.details.get("changed_properties").and_then(|v| v.as_array()) {
        for property in properties.iter().filter_map(|p| p.as_str()) {
            println!("      ~ {}", property.yellow());
        }
    }
    if let Some(attributes) = action.details.get("changed_attributes").and_then(|v| v.as_array()) {
        for attribute in attributes.iter().filter_map(|a| a.as_str()) {
            println!("      ~ {} (属性)", attribute.yellow());
        }
    }
}

/// 計画を表示
pub fn print_plan(plan: &Plan) {
    if !plan.has_changes {
        println!("{}", "✓ 差分はありません".green());
        return;
    }

    for action in plan.changes() {
        print_action(action);
    }
    println!();
    println!("{}", plan.summary().to_string().bold());
}
