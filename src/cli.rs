use clap::{Parser, Subcommand};
use std::path::PathBuf;
use wflint::output::OutputFormat;

#[derive(Parser)]
#[command(
    name = "wflint",
    version,
    about = "Static checker for CI workflow files"
)]
pub struct Cli {
    /// Print debug logs to stderr (same as WFLINT_LOG=debug)
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check workflow files
    Check {
        /// Workflow files or directories. "-" reads one document from stdin.
        /// Defaults to the nearest .github/workflows in the current
        /// directory or one of its parents.
        files: Vec<PathBuf>,

        /// Output format
        #[arg(long, short, default_value = "pretty", value_enum)]
        format: OutputFormat,

        /// Write output to file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Drop diagnostics whose message matches this regex (repeatable)
        #[arg(long, short, value_name = "REGEX")]
        ignore: Vec<String>,

        /// shellcheck executable; an empty value disables script checks
        #[arg(long, value_name = "PATH")]
        shellcheck: Option<String>,

        /// Name used for the document read from stdin
        #[arg(long, default_value = "<stdin>", value_name = "NAME")]
        stdin_filename: String,

        /// Treat warnings as errors
        #[arg(long)]
        strict: bool,

        /// Custom config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Check which external tools are available
    CheckTools {
        /// Custom config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// List all rules with descriptions
    ListRules,

    /// Show full explanation for a rule
    Explain {
        /// Rule ID (e.g., "job-needs")
        rule_id: String,
    },
}
