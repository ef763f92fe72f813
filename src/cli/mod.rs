//! Command-line interface for detect-conflict.
//!
//! This module provides the `detect-conflict` CLI with subcommands for:
//! - `watch`: Act as a host and run a JSON event stream through the detector
//! - `check`: Evaluate a single event
//! - `init`: Write a default configuration file
//! - `config`: Show the effective configuration
//! - `validate`: Validate configuration
//! - `completions`: Generate shell completions

mod commands;

use crate::core::error::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Run an action when a unique-constraint conflict shows up in an error stream.
#[derive(Debug, Parser)]
#[command(
    name = "detect-conflict",
    author,
    version,
    about = "Run an action when a unique-constraint conflict shows up in an error stream",
    long_about = r#"
detect-conflict watches a stream of JSON error events for unique violations
(SQLSTATE 23505) on one constraint and runs a shell command when it sees one.
Every event is passed through unchanged to the downstream handler.

Quick start:
  detect-conflict init
  tail -F postgresql.json | detect-conflict watch --forward

Settings (highest precedence last):
  detect-conflict.toml                    [predicate] / [action] tables
  --settings postgresql.conf              detect_conflict.constraint_name,
                                          detect_conflict.action_script
  DETECT_CONFLICT_CONSTRAINT_NAME         environment overrides
  DETECT_CONFLICT_ACTION_SCRIPT
"#,
    propagate_version = true
)]
pub struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (default: search for detect-conflict.toml upward).
    #[arg(long, global = true, env = "DETECT_CONFLICT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Host settings file in `name = 'value'` format.
    #[arg(long, global = true)]
    pub settings: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-error output.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Use color output.
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,
}

/// Color output choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ColorChoice {
    /// Always use color.
    Always,
    /// Auto-detect color support.
    #[default]
    Auto,
    /// Never use color.
    Never,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Read JSON events and run them through an installed detector.
    #[command(visible_alias = "w")]
    Watch {
        /// Read events from a file instead of stdin.
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Echo every event to stdout as the downstream handler.
        #[arg(short, long)]
        forward: bool,

        /// Run the action on a background worker instead of inline.
        #[arg(long)]
        queued: bool,

        /// Stop at the first malformed line instead of skipping it.
        #[arg(long)]
        strict: bool,
    },

    /// Evaluate a single event. Exits 0 on a match, 1 otherwise.
    #[command(visible_alias = "c")]
    Check {
        /// Status code of the event.
        #[arg(short, long, default_value = "23505")]
        sqlstate: String,

        /// Constraint name of the event.
        #[arg(short = 'n', long)]
        constraint: Option<String>,

        /// Evaluate only; never run the action command.
        #[arg(long)]
        dry_run: bool,
    },

    /// Write a default configuration file.
    #[command(visible_alias = "i")]
    Init {
        /// Overwrite existing configuration.
        #[arg(short, long)]
        force: bool,
    },

    /// Show the effective configuration.
    Config {
        /// Output the configuration file as written.
        #[arg(long)]
        raw: bool,
    },

    /// Validate the configuration.
    #[command(visible_alias = "v")]
    Validate,

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Runs the CLI.
pub async fn run() -> Result<ExitCode> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);
    setup_color(cli.color);

    let sources = commands::ConfigSources {
        config: cli.config.as_deref(),
        settings: cli.settings.as_deref(),
    };

    match cli.command {
        Commands::Watch {
            input,
            forward,
            queued,
            strict,
        } => {
            let options = commands::WatchOptions {
                input: input.as_deref(),
                forward,
                queued,
                strict,
            };
            commands::watch(&sources, &options).await
        },
        Commands::Check {
            sqlstate,
            constraint,
            dry_run,
        } => commands::check(&sources, &sqlstate, constraint.as_deref(), dry_run),
        Commands::Init { force } => commands::init(force),
        Commands::Config { raw } => commands::config(&sources, raw),
        Commands::Validate => commands::validate(&sources),
        Commands::Completions { shell } => {
            commands::completions(shell);
            Ok(ExitCode::SUCCESS)
        },
    }
}

/// Sets up logging based on verbosity flags.
fn setup_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "info"
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Sets up color output.
fn setup_color(choice: ColorChoice) {
    match choice {
        ColorChoice::Always => {
            console::set_colors_enabled(true);
            console::set_colors_enabled_stderr(true);
        },
        ColorChoice::Never => {
            console::set_colors_enabled(false);
            console::set_colors_enabled_stderr(false);
        },
        ColorChoice::Auto => {
            // Let console crate auto-detect
        },
    }
}
