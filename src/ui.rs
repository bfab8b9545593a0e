use colored::{ColoredString, Colorize};
use declarative::ApplyResult;

pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Warnings go to stderr so `settings` output stays clean
pub fn warn(msg: &str) {
    eprintln!("{} {}", "⚠".yellow(), msg);
}

pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

pub fn kv(key: &str, value: &str) {
    println!("  {:<18} {}", format!("{key}:").dimmed(), value);
}

/// Colored symbol for a resource outcome
pub fn outcome_symbol(result: &ApplyResult) -> ColoredString {
    let symbol = result.symbol();
    match result {
        ApplyResult::NoChange => symbol.dimmed(),
        ApplyResult::Created | ApplyResult::Modified | ApplyResult::Removed => symbol.green(),
        ApplyResult::Skipped { .. } | ApplyResult::Cancelled => symbol.yellow(),
        ApplyResult::Failed { .. } | ApplyResult::Blocked { .. } => symbol.red(),
    }
}
