//! Diff display for the terminal

use colored::Colorize;
use declarative::{Content, ExecutionPlan, ResourceDiff, ResourceState, group_by_kind};
use similar::{ChangeTag, TextDiff};
use std::path::Path;

/// Most lines of content diff shown per file
const MAX_DIFF_LINES: usize = 40;

fn kind_title(kind: &str) -> &str {
    match kind {
        "user" => "Accounts",
        "directory" => "Directories",
        "file" => "Files",
        "package" => "Packages",
        "pip_package" => "Python packages (virtualenv)",
        "vcsrepo" => "Checkouts",
        "cron" => "Scheduled jobs",
        "include" => "Stages",
        other => other,
    }
}

/// Display a list of diffs grouped by resource kind
pub fn display_diff(diffs: &[ResourceDiff], plan: &ExecutionPlan) {
    if diffs.is_empty() {
        println!();
        println!("  {} No changes needed", "✓".green());
        return;
    }

    println!();
    println!(
        "┌─ {} ─────────────────────────────────────────┐",
        "Configuration Diff".bold()
    );
    println!("│");

    for (kind, kind_diffs) in group_by_kind(diffs) {
        println!("│ {}", kind_title(kind).bold());

        for diff in kind_diffs {
            let symbol = if diff.is_addition() {
                "+".green()
            } else if diff.is_removal() {
                "-".red()
            } else if diff.current == ResourceState::Unknown {
                "?".dimmed()
            } else {
                "~".yellow()
            };

            println!(
                "│   {} {:<40} {}",
                symbol,
                diff.identity.name,
                state_description(diff).dimmed()
            );

            if let Some(resource) = plan.graph().get(&diff.identity)
                && let Some(Content::Literal(text)) = &resource.attributes.content
                && !diff.is_removal()
            {
                let secret = resource.attributes.mode.is_some_and(|m| m & 0o077 == 0);
                display_content_diff(Path::new(&diff.identity.name), text, secret);
            }
        }
        println!("│");
    }

    let summary = declarative::DiffSummary::from_diffs(diffs);
    println!("├─────────────────────────────────────────────────────┤");
    println!(
        "│ Summary: {} changes ({} to add, {} to change, {} to remove)",
        summary.total().to_string().bold(),
        summary.additions.to_string().green(),
        summary.modifications.to_string().yellow(),
        summary.removals.to_string().red()
    );
    println!("└─────────────────────────────────────────────────────┘");
}

fn state_description(diff: &ResourceDiff) -> String {
    match (&diff.current, &diff.desired) {
        (ResourceState::Absent, ResourceState::Present { .. }) => "(missing)".to_string(),
        (ResourceState::Present { .. }, ResourceState::Absent) => "(will remove)".to_string(),
        (ResourceState::Modified { from, .. }, _) => format!("({from})"),
        (ResourceState::Unknown, _) => "(state unknown)".to_string(),
        _ => String::new(),
    }
}

/// Line diff between the file on disk and the desired content
///
/// Files only readable by their owner never have their content printed.
fn display_content_diff(path: &Path, desired: &str, secret: bool) {
    let Ok(current) = std::fs::read_to_string(path) else {
        return;
    };
    if current == desired {
        return;
    }
    if secret {
        println!("│       {}", "content differs (not shown)".dimmed());
        return;
    }

    let diff = TextDiff::from_lines(current.as_str(), desired);
    let mut shown = 0;
    for change in diff.iter_all_changes() {
        let line = change.to_string_lossy();
        let line = line.trim_end_matches('\n');
        let rendered = match change.tag() {
            ChangeTag::Delete => format!("- {line}").red(),
            ChangeTag::Insert => format!("+ {line}").green(),
            ChangeTag::Equal => continue,
        };
        if shown == MAX_DIFF_LINES {
            println!("│       {}", "...".dimmed());
            break;
        }
        println!("│       {rendered}");
        shown += 1;
    }
}
