use crate::utils;
use colored::Colorize;
use sorrystack_cloud::CloudProvider;
use sorrystack_cloud_aws::AwsProvider;
use std::path::{Path, PathBuf};

pub async fn handle(stack_path: &Path, out: Option<PathBuf>, print: bool) -> anyhow::Result<()> {
    let project = utils::load_project(stack_path)?;
    utils::print_loaded_files(stack_path, &project.root);

    let out_dir = out.unwrap_or_else(|| project.root.join(&project.settings.output_dir));
    let provider = AwsProvider::new(project.definition, project.settings);

    println!("{}", "テンプレートを合成中...".blue());
    let synthesis = provider.synthesize().await?;
    let written = synthesis.write_to(&out_dir).await?;

    println!("{}", "✓ 合成が完了しました".green().bold());
    println!("  スタック: {}", synthesis.stack_name.cyan());
    println!("  リソース: {}個", synthesis.resources.len());
    println!("  テンプレート: {}", written.template.display().to_string().cyan());
    println!("  アセットマニフェスト: {}", written.manifest.display().to_string().cyan());
    for asset in &written.assets {
        println!("  アセット: {}", asset.display().to_string().cyan());
    }

    if print {
        println!();
        println!("{}", synthesis.template_json()?);
    }
    Ok(())
}
