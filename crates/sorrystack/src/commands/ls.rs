use crate::utils;
use colored::Colorize;
use sorrystack_cloud_aws::build_stack;
use std::path::Path;

pub fn handle(stack_path: &Path, show_deps: bool) -> anyhow::Result<()> {
    let project = utils::load_project(stack_path)?;
    let rendered = build_stack(&project.definition, &project.settings)?;
    let order = rendered.stack.dependency_order()?;

    println!(
        "{} ({}個のリソース)",
        rendered.stack.name.cyan().bold(),
        order.len()
    );
    for (index, id) in order.iter().enumerate() {
        let Some(resource) = rendered.stack.resource(id) else {
            continue;
        };
        println!(
            "{:>4}. {} {}",
            index + 1,
            id.bold(),
            resource.resource_type.dimmed()
        );
        if show_deps {
            for dep in resource.dependencies() {
                println!("        ← {}", dep);
            }
        }
    }
    Ok(())
}
