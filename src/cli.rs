use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "confcollect")]
#[command(version)]
#[command(about = "Converge a host into a configuration-collection node", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Role configuration file (TOML or JSON)
    #[arg(short, long, global = true, env = "CONFCOLLECT_CONFIG")]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show the resources the role declares, in application order
    Plan(PlanArgs),

    /// Show what differs between the host and the declared state
    Diff(TargetArgs),

    /// Converge the host to the declared state
    Apply(ApplyArgs),

    /// Print the rendered getconfs settings file
    Settings,

    /// Show the platform facts the role is composed for
    Facts,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
pub struct PlanArgs {
    /// Also print the ordering edges of every resource
    #[arg(long)]
    pub edges: bool,

    /// Target filter (e.g., "vcsrepo" or "file:.ssh")
    pub target: Option<String>,
}

#[derive(Args)]
pub struct TargetArgs {
    /// Target filter (e.g., "package" or "vcsrepo:git_repo")
    pub target: Option<String>,
}

#[derive(Args)]
pub struct ApplyArgs {
    /// Target filter (e.g., "package" or "vcsrepo:git_repo")
    pub target: Option<String>,

    /// Probe only, never change anything
    #[arg(long)]
    pub dry_run: bool,

    /// Number of parallel jobs (defaults to the configured value)
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Stop dispatching new resources after the first failure
    #[arg(long)]
    pub strict: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Write a JSON report of the run to this path
    #[arg(long)]
    pub report: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_apply() {
        let cli = Cli::try_parse_from([
            "confcollect",
            "-vv",
            "apply",
            "package",
            "--dry-run",
            "--jobs",
            "2",
            "--report",
            "/tmp/report.json",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        let Command::Apply(args) = cli.command else {
            panic!("expected apply");
        };
        assert_eq!(args.target.as_deref(), Some("package"));
        assert!(args.dry_run);
        assert_eq!(args.jobs, Some(2));
        assert!(!args.strict);
        assert_eq!(args.report, Some(PathBuf::from("/tmp/report.json")));
    }

    #[test]
    fn test_global_config_flag() {
        let cli =
            Cli::try_parse_from(["confcollect", "settings", "--config", "/etc/role.json"]).unwrap();
        assert_eq!(cli.config.as_deref(), Some("/etc/role.json"));
        assert!(matches!(cli.command, Command::Settings));
    }
}
