//! Configuration loading and validation.
//!
//! The configuration file is TOML, by default `wflint.toml` in the current
//! working directory. Use [`Config::load`] to read it and
//! [`Config::validate`] to turn it into the [`LintOptions`] value bag the
//! linter consumes:
//!
//! ```rust,no_run
//! use wflint::config::Config;
//!
//! let config = Config::load(None).expect("failed to load config");
//! let options = config.validate(&[]).expect("invalid config");
//! assert!(options.is_rule_enabled("expression"));
//! ```
//!
//! # File format
//!
//! ```toml
//! ignore = ["SC2086"]          # message regexes to drop
//!
//! [rules]
//! shell-name = false           # every rule is enabled unless listed as false
//!
//! [shellcheck]
//! executable = "shellcheck"    # empty string disables script checks
//! concurrency = 4              # defaults to the number of CPUs
//! timeout_secs = 30
//!
//! [strict]
//! enabled = true               # warnings fail the run
//! ```

use crate::rules;
use crate::shellcheck::BridgeOptions;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "wflint.toml";

/// Setup errors. These stop the run before any workflow is linted.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid ignore pattern {pattern:?}: {source}")]
    InvalidIgnore {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("unknown rule {id:?} in [rules]. available rules are {available}")]
    UnknownRule { id: String, available: String },

    #[error("shellcheck.concurrency must be at least 1")]
    ZeroConcurrency,

    #[error("shellcheck.timeout_secs must be at least 1")]
    ZeroTimeout,
}

/// Main configuration.
///
/// All fields carry defaults so the file can be omitted entirely.
#[derive(Debug, Clone, Default, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct Config {
    /// Rule id to enabled flag. Rules not listed are enabled.
    pub rules: BTreeMap<String, bool>,
    /// Regexes matched against diagnostic messages; matching diagnostics
    /// are dropped.
    pub ignore: Vec<String>,
    pub shellcheck: ShellcheckConfig,
    /// The `[strict]` table. When `enabled`, warnings fail the run.
    pub strict: StrictConfig,
}

/// How the external script checker is invoked.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct ShellcheckConfig {
    /// Command name or path. An empty string disables script checks.
    pub executable: String,
    /// Maximum number of shellcheck processes at once. Defaults to the
    /// available parallelism.
    pub concurrency: Option<usize>,
    /// Per-invocation deadline.
    pub timeout_secs: u64,
}

impl Default for ShellcheckConfig {
    fn default() -> Self {
        ShellcheckConfig {
            executable: "shellcheck".to_string(),
            concurrency: None,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct StrictConfig {
    /// Set to `true` to treat warnings as errors.
    pub enabled: bool,
}

/// Resolved options. This is all the linter ever sees of the configuration.
#[derive(Debug, Clone)]
pub struct LintOptions {
    pub disabled_rules: BTreeSet<String>,
    pub ignore: Vec<Regex>,
    /// `None` when script checks are turned off.
    pub shellcheck: Option<BridgeOptions>,
    pub strict: bool,
}

impl LintOptions {
    pub fn is_rule_enabled(&self, id: &str) -> bool {
        !self.disabled_rules.contains(id)
    }

    /// `true` if any ignore pattern matches `message`.
    pub fn is_ignored(&self, message: &str) -> bool {
        self.ignore.iter().any(|re| re.is_match(message))
    }
}

impl Default for LintOptions {
    fn default() -> Self {
        LintOptions {
            disabled_rules: BTreeSet::new(),
            ignore: Vec::new(),
            shellcheck: Some(BridgeOptions {
                executable: "shellcheck".to_string(),
                concurrency: default_concurrency(),
                timeout: Duration::from_secs(30),
            }),
            strict: false,
        }
    }
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl Config {
    /// Loads configuration from a TOML file.
    ///
    /// Resolution order:
    /// 1. If `path` is `Some`, load from that file (error if missing).
    /// 2. If `path` is `None`, try `wflint.toml` in the current directory.
    /// 3. If that file does not exist either, return [`Config::default()`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the explicit path does not exist, the
    /// file cannot be read or the TOML fails to parse.
    pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
        let config_path = match path {
            Some(p) if p.exists() => Some(p.to_path_buf()),
            Some(p) => return Err(ConfigError::NotFound(p.to_path_buf())),
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                default_path.exists().then(|| default_path.to_path_buf())
            }
        };

        match config_path {
            Some(path) => {
                tracing::debug!(path = %path.display(), "loading config");
                let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
                    path: path.clone(),
                    source,
                })?;
                toml::from_str(&content).map_err(|source| ConfigError::Parse { path, source })
            }
            None => Ok(Config::default()),
        }
    }

    /// Returns `true` unless the rule is turned off in `[rules]`.
    pub fn is_rule_enabled(&self, id: &str) -> bool {
        self.rules.get(id).copied().unwrap_or(true)
    }

    /// Checks the configuration and resolves it into [`LintOptions`].
    ///
    /// `extra_ignore` patterns (from the command line) are added to the
    /// ones in the file.
    ///
    /// # Errors
    ///
    /// Fails on an invalid ignore regex, an unknown rule id in `[rules]`,
    /// or a zero concurrency or timeout.
    pub fn validate(&self, extra_ignore: &[String]) -> Result<LintOptions, ConfigError> {
        let known = rules::rule_ids();
        for id in self.rules.keys() {
            if !known.iter().any(|k| *k == id.as_str()) {
                return Err(ConfigError::UnknownRule {
                    id: id.clone(),
                    available: known
                        .iter()
                        .map(|k| format!("{k:?}"))
                        .collect::<Vec<_>>()
                        .join(", "),
                });
            }
        }

        let ignore = self
            .ignore
            .iter()
            .chain(extra_ignore)
            .map(|pattern| {
                Regex::new(pattern).map_err(|source| ConfigError::InvalidIgnore {
                    pattern: pattern.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let sc = &self.shellcheck;
        let concurrency = match sc.concurrency {
            Some(0) => return Err(ConfigError::ZeroConcurrency),
            Some(n) => n,
            None => default_concurrency(),
        };
        if sc.timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }

        let disabled_rules: BTreeSet<String> = self
            .rules
            .iter()
            .filter(|(_, enabled)| !**enabled)
            .map(|(id, _)| id.clone())
            .collect();

        let shellcheck = (!sc.executable.is_empty()
            && !disabled_rules.contains(crate::shellcheck::RULE))
        .then(|| BridgeOptions {
            executable: sc.executable.clone(),
            concurrency,
            timeout: Duration::from_secs(sc.timeout_secs),
        });

        Ok(LintOptions {
            disabled_rules,
            ignore,
            shellcheck,
            strict: self.strict.enabled,
        })
    }
}
