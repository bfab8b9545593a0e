//! Show the declared resources in application order

use anyhow::Result;
use colored::Colorize;
use declarative::{ExecutionPlan, ResourceKind};

use super::Role;
use crate::Context;
use crate::ui;

pub fn run(ctx: &Context, target: Option<&str>, edges: bool) -> Result<()> {
    let role = Role::load(ctx)?;
    let plan = role.plan(target)?;

    ui::header("Confcollect Plan");
    ui::kv("Config", &role.path.display().to_string());
    ui::kv("Platform", &role.facts.os_family.to_string());
    ui::kv("Resources", &plan.len().to_string());
    ui::kv("Edges", &plan.graph().edge_count().to_string());

    print_plan(&plan, edges, ctx.quiet);
    Ok(())
}

fn print_plan(plan: &ExecutionPlan, edges: bool, quiet: bool) {
    if plan.is_empty() {
        println!();
        ui::info("No resources match the target");
        return;
    }

    for (position, resource) in plan.resources().enumerate() {
        if resource.kind() == ResourceKind::Include {
            ui::section(resource.name());
            continue;
        }
        if quiet {
            continue;
        }
        println!(
            "  {:>3}. {} {}",
            position + 1,
            resource.identity.to_string().bold(),
            resource.summary().dimmed()
        );
        if edges {
            for before in plan.graph().predecessors(&resource.identity) {
                ui::dim(&format!("       after {before}"));
            }
        }
    }
}
