use crate::utils;
use colored::Colorize;
use sorrystack_cloud::{CloudProvider, StateManager};
use sorrystack_cloud_aws::AwsProvider;
use std::path::Path;

/// 外部で適用済みの合成結果をベースラインとして記録
pub async fn handle(stack_path: &Path) -> anyhow::Result<()> {
    let project = utils::load_project(stack_path)?;
    let state_manager = StateManager::new(&project.root);
    let provider = AwsProvider::new(project.definition, project.settings);

    let synthesis = provider.synthesize().await?;
    let snapshot = state_manager.record(&synthesis).await?;

    println!("{}", "✓ ベースラインを記録しました".green().bold());
    println!("  スタック: {}", snapshot.stack_name.cyan());
    println!("  リソース: {}個", snapshot.resources.len());
    println!("  アセット: {}個", snapshot.asset_hashes.len());
    println!(
        "  記録先: {}",
        state_manager.state_path().display().to_string().cyan()
    );
    Ok(())
}
