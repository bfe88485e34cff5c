use crate::utils;
use colored::Colorize;
use sorrystack_cloud::{CloudProvider, StateManager};
use sorrystack_cloud_aws::AwsProvider;
use std::collections::BTreeSet;
use std::path::Path;

pub async fn handle(stack_path: &Path, fail: bool) -> anyhow::Result<()> {
    let project = utils::load_project(stack_path)?;
    let state_manager = StateManager::new(&project.root);
    let provider = AwsProvider::new(project.definition, project.settings);

    let synthesis = provider.synthesize().await?;
    let state = state_manager.load().await?;

    let snapshot = state.snapshot(&synthesis.stack_name);
    if snapshot.is_none() {
        println!(
            "{}",
            format!("ℹ {} のベースラインは記録されていません", synthesis.stack_name).yellow()
        );
    }
    let baseline = state.baseline(&synthesis.stack_name);

    println!("{} {}", "差分:".bold(), synthesis.stack_name.cyan());
    let plan = provider.plan(&synthesis.resources, &baseline).await?;
    utils::print_plan(&plan);

    let assets_changed = match snapshot {
        Some(snapshot) => {
            let recorded: BTreeSet<&str> = snapshot.asset_hashes.iter().map(String::as_str).collect();
            let current: BTreeSet<&str> = synthesis.artifacts.iter().map(|a| a.hash.as_str()).collect();
            recorded != current
        }
        None => !synthesis.artifacts.is_empty(),
    };
    if assets_changed {
        println!("{}", "  ⚠ アセットの内容が変更されています".yellow());
    }

    if fail && (plan.has_changes || assets_changed) {
        std::process::exit(1);
    }
    Ok(())
}
