use crate::utils;
use colored::Colorize;
use sorrystack_cloud_aws::build_stack;
use sorrystack_config::ToolkitSettings;
use sorrystack_core::{StackDefinition, load_stack_unchecked};
use std::path::Path;

fn fail(title: &str, error: impl std::fmt::Display) -> ! {
    eprintln!();
    eprintln!("{}", format!("✗ {title}").red().bold());
    eprintln!("  {}", error);
    std::process::exit(1);
}

pub fn handle(stack_path: &Path) -> anyhow::Result<()> {
    println!("{}", "スタック定義を検証中...".blue());
    let root = utils::project_root(stack_path);
    utils::print_loaded_files(stack_path, &root);

    let definition = match load_stack_unchecked(stack_path) {
        Ok(definition) => definition,
        Err(e) => fail("定義ファイルの読み込みエラー", e),
    };
    if let Err(e) = definition.validate() {
        fail("定義エラー", e);
    }

    let settings = match ToolkitSettings::load(&root) {
        Ok(settings) => settings,
        Err(e) => fail("設定エラー", e),
    };
    let rendered = match build_stack(&definition, &settings) {
        Ok(rendered) => rendered,
        Err(e) => fail("合成エラー", e),
    };

    println!("{}", "✓ スタック定義は正常です！".green().bold());
    println!();
    print_summary(&definition, rendered.stack.resources().count());

    for bucket in definition.buckets.iter().filter(|b| b.leaves_versions_on_destroy()) {
        println!();
        println!(
            "{}",
            format!(
                "⚠ バケット {} はバージョニング有効かつ削除ポリシーが destroy です。\
                 旧バージョンが残るとスタック削除に失敗します (auto-delete-objects を検討してください)",
                bucket.id
            )
            .yellow()
        );
    }
    Ok(())
}

fn print_summary(definition: &StackDefinition, resource_count: usize) {
    let az_count = definition.availability_zone_count();
    println!("サマリー:");
    println!("  スタック: {}", definition.name.cyan());
    println!(
        "  VPC: {} ({}, {}AZ, NAT {}個)",
        definition.vpc.id.cyan(),
        definition.vpc.cidr,
        az_count,
        definition.vpc.effective_nat_gateways(az_count)
    );
    if let Ok(subnets) = definition.vpc.plan_subnets(az_count) {
        for subnet in subnets {
            println!(
                "    - {} ({}, {})",
                subnet.construct_name().cyan(),
                subnet.subnet_type.label(),
                subnet.cidr
            );
        }
    }
    println!("  サービス: {}個", definition.services.len());
    for service in &definition.services {
        println!(
            "    - {} ({}, cpu {} / memory {}MiB × {})",
            service.id.cyan(),
            service.image,
            service.cpu,
            service.memory_mib,
            service.desired_count
        );
    }
    println!("  バケット: {}個", definition.buckets.len());
    for bucket in &definition.buckets {
        println!(
            "    - {} (削除ポリシー: {})",
            bucket.id.cyan(),
            bucket.removal_policy.as_cfn()
        );
    }
    println!("  デプロイ: {}個", definition.deployments.len());
    println!("  ディストリビューション: {}個", definition.distributions.len());
    for distribution in &definition.distributions {
        let access = distribution
            .origin_access_control
            .as_deref()
            .unwrap_or("OAI");
        println!(
            "    - {} (origin: {}, access: {})",
            distribution.id.cyan(),
            distribution.origin_bucket,
            access
        );
    }
    println!("  合成リソース: {}個", resource_count);
}
