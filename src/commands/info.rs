//! Read-only views of the role inputs

use anyhow::Result;

use super::Role;
use crate::Context;
use crate::compose::Layout;
use crate::platform::{Capabilities, PlatformFacts};
use crate::ui;

/// Print the getconfs settings document exactly as it is written to disk
pub fn settings(ctx: &Context) -> Result<()> {
    let role = Role::load(ctx)?;
    let params = &role.config.parameters;
    params.validate()?;

    let document = &params.getconfs_settings;
    if document.is_empty() {
        ui::warn("No getconfs settings configured");
    }
    if !ctx.quiet {
        let sections: Vec<&str> = document.sections().collect();
        eprintln!("# {} ({})", Layout::new(params).settings_file, sections.join(", "));
    }
    print!("{}", document.render()?);
    Ok(())
}

pub fn facts(ctx: &Context) -> Result<()> {
    let role = Role::load(ctx)?;
    let source = if role.config.facts.is_some() {
        "configured"
    } else {
        "detected"
    };

    ui::header("Platform Facts");
    print_facts(&role.facts, source);

    ui::section("Capabilities");
    match Capabilities::for_family(&role.facts.os_family) {
        Ok(caps) => {
            ui::kv("Package manager", caps.package_manager.as_str());
            ui::kv("Git packages", &caps.git_packages.join(", "));
            ui::kv("Python packages", &caps.python_packages.join(", "));
            ui::kv("Tool packages", &caps.tool_packages.join(", "));
            ui::kv("Python", caps.python);
        }
        Err(e) => ui::error(&e.to_string()),
    }
    Ok(())
}

fn print_facts(facts: &PlatformFacts, source: &str) {
    ui::kv("Source", source);
    ui::kv("OS family", &facts.os_family.to_string());
    if let Some(os) = &facts.operating_system {
        ui::kv("Operating system", os);
    }
    ui::kv("Release", &facts.os_release);
    ui::kv("Kernel", &facts.kernel);
    ui::kv("Architecture", &facts.architecture);
}
