//! # wflint
//!
//! Static checker for CI workflow files.
//!
//! `wflint` parses workflow YAML into a typed model, type-checks every
//! `${{ }}` expression against the contexts available at its location,
//! validates the job dependency graph, matrices, events and action
//! references, and sends inline shell scripts to [shellcheck]. Diagnostics
//! carry the exact line and column in the original document and are
//! rendered as human-readable text, JSON, or [SARIF].
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::path::Path;
//! use wflint::{config::Config, lint::Linter, output};
//!
//! let config = Config::load(None).expect("failed to load config");
//! let options = config.validate(&[]).expect("invalid config");
//! let linter = Linter::new(options).expect("failed to start linter");
//!
//! let report = linter.lint_file(Path::new(".github/workflows/ci.yaml")).unwrap();
//! if !report.passed {
//!     let text = output::format_reports(&[report], output::OutputFormat::Pretty);
//!     print!("{text}");
//! }
//! ```
//!
//! ## Architecture
//!
//! 1. **[`yaml`]** and **[`parse`]**: positioned YAML tree, then the typed
//!    [`ast::Workflow`]. Only unreadable documents fail; everything else is
//!    a `syntax-check` diagnostic.
//! 2. **[`expr`]**: lexer, parser and type checker for `${{ }}` expressions.
//! 3. **[`context`]**: which contexts and special functions each workflow
//!    key allows, plus the types of `steps`, `needs`, `matrix` and `inputs`.
//! 4. **[`rules`]**: independent checks implementing [`rules::Rule`].
//!    Local `./` callees are read from the repository by [`project`].
//! 5. **[`shellcheck`]**: external script checks on a bounded worker pool.
//! 6. **[`lint`]**: runs all of the above and aggregates the diagnostics.
//! 7. **[`output`]**: pretty text, JSON or SARIF.
//!
//! [SARIF]: https://sarifweb.azurewebsites.net/
//! [shellcheck]: https://www.shellcheck.net/

pub mod ast;
pub mod config;
pub mod context;
pub mod diagnostic;
pub mod expr;
pub mod lint;
pub mod output;
pub mod parse;
pub mod project;
pub mod rules;
pub mod shellcheck;
pub mod yaml;
