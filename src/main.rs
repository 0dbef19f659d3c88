mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use colored::Colorize;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use wflint::{config, lint::Linter, output, rules, shellcheck};

const LOG_ENV: &str = "WFLINT_LOG";
const WORKFLOWS_DIR: &str = ".github/workflows";

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    if cli.no_color {
        colored::control::set_override(false);
    }

    match cli.command {
        Commands::Check {
            files,
            format,
            output: output_path,
            ignore,
            shellcheck: shellcheck_path,
            stdin_filename,
            strict,
            config: config_path,
        } => {
            let mut config = config::Config::load(config_path.as_deref()).unwrap_or_else(|e| {
                eprintln!("Error: {e}");
                std::process::exit(2);
            });
            if strict {
                config.strict.enabled = true;
            }
            if let Some(executable) = shellcheck_path {
                config.shellcheck.executable = executable;
            }

            let options = config.validate(&ignore).unwrap_or_else(|e| {
                eprintln!("Error: {e}");
                std::process::exit(2);
            });

            let inputs = read_inputs(&files, &stdin_filename).unwrap_or_else(|e| {
                eprintln!("Error: {e}");
                std::process::exit(2);
            });
            if inputs.is_empty() {
                eprintln!(
                    "Error: no workflow files found (looked for {WORKFLOWS_DIR} in the current directory and its parents)"
                );
                std::process::exit(2);
            }

            let linter = Linter::new(options).unwrap_or_else(|e| {
                eprintln!("Error: {e}");
                std::process::exit(2);
            });

            let reports = linter.lint_inputs(&inputs);
            let formatted = output::format_reports(&reports, format);

            if let Some(out_path) = output_path {
                std::fs::write(&out_path, &formatted).unwrap_or_else(|e| {
                    eprintln!("Error writing output: {e}");
                    std::process::exit(2);
                });
                eprintln!("Output written to {}", out_path.display());
            } else {
                print!("{formatted}");
            }

            let all_passed = reports.iter().all(|r| r.passed);
            std::process::exit(if all_passed { 0 } else { 1 });
        }

        Commands::CheckTools { config: config_path } => {
            let config = config::Config::load(config_path.as_deref()).unwrap_or_else(|e| {
                eprintln!("Error: {e}");
                std::process::exit(2);
            });

            println!("{}", "External Tools".bold().underline());
            println!();

            let executable = &config.shellcheck.executable;
            let status = if executable.is_empty() {
                "DISABLED".dimmed().to_string()
            } else if shellcheck::is_available(executable) {
                "READY".green().bold().to_string()
            } else {
                "NOT AVAILABLE".red().to_string()
            };
            println!(
                "  [{status}] {name:<20} {desc}",
                name = "shellcheck",
                desc = if executable.is_empty() { "(disabled in config)" } else { executable.as_str() },
            );

            println!();
            println!("Note: every rule except shellcheck requires no external tools.");
        }

        Commands::ListRules => {
            let rules = rules::all_rule_info();
            println!("{}", "Rules".bold().underline());
            println!();

            for rule in &rules {
                let severity = match rule.severity {
                    "error" => "ERROR".red().bold().to_string(),
                    "warning" => " WARN".yellow().bold().to_string(),
                    "info" => " INFO".blue().to_string(),
                    _ => rule.severity.to_string(),
                };

                println!(
                    "  [{severity}] {id:<22} {message}",
                    id = rule.id,
                    message = rule.message,
                );
            }

            println!();
            println!("  Total: {} rules", rules.len());
        }

        Commands::Explain { rule_id } => {
            let rules = rules::all_rule_info();
            match rules.iter().find(|r| r.id == rule_id) {
                Some(rule) => {
                    println!("{}", rule.id.bold());
                    println!();
                    println!("  Severity:     {}", rule.severity);
                    println!("  Description:  {}", rule.message);
                    println!("  Remediation:  {}", rule.remediation);
                }
                None => {
                    eprintln!("Unknown rule: {rule_id}");
                    eprintln!("Use 'wflint list-rules' to see all available rules.");
                    std::process::exit(2);
                }
            }
        }
    }
}

/// Logs go to stderr so JSON and SARIF on stdout stay parseable.
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Resolves command line paths into `(label, source)` pairs.
///
/// No paths means the nearest `.github/workflows`. A directory expands to
/// the workflow files inside it; `-` reads stdin once.
fn read_inputs(paths: &[PathBuf], stdin_name: &str) -> Result<Vec<(PathBuf, String)>, String> {
    let files: Vec<PathBuf> = if paths.is_empty() {
        nearest_workflows_dir()
            .map(|dir| find_workflows(&dir))
            .unwrap_or_default()
    } else {
        let mut files = Vec::new();
        for p in paths {
            if p.is_dir() {
                let nested = p.join(WORKFLOWS_DIR);
                files.extend(find_workflows(if nested.is_dir() { &nested } else { p }));
            } else {
                files.push(p.clone());
            }
        }
        files
    };

    let mut inputs = Vec::with_capacity(files.len());
    let mut stdin_used = false;
    for file in files {
        if file.as_os_str() == "-" {
            if stdin_used {
                return Err("stdin (\"-\") can only be given once".to_string());
            }
            stdin_used = true;
            let mut source = String::new();
            std::io::stdin()
                .read_to_string(&mut source)
                .map_err(|e| format!("failed to read stdin: {e}"))?;
            inputs.push((PathBuf::from(stdin_name), source));
        } else {
            let source = std::fs::read_to_string(&file)
                .map_err(|e| format!("failed to read {}: {e}", file.display()))?;
            inputs.push((file, source));
        }
    }
    Ok(inputs)
}

/// The `.github/workflows` directory of the current directory or of its
/// closest parent that has one. Relative to the current directory when it
/// is inside it.
fn nearest_workflows_dir() -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    let found = cwd
        .ancestors()
        .map(|dir| dir.join(WORKFLOWS_DIR))
        .find(|dir| dir.is_dir())?;
    let relative = found.strip_prefix(&cwd).ok().map(Path::to_path_buf);
    Some(relative.unwrap_or(found))
}

/// Returns the `.yml`/`.yaml` files directly inside `dir`, sorted by path.
fn find_workflows(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            p.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext == "yml" || ext == "yaml")
        })
        .collect();

    files.sort();
    files
}
