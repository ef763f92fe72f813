//! CLI command implementations.

use crate::config::{Config, ConfFile, DispatchMode, EnvSettings, CONFIG_FILE_NAME};
use crate::core::detector::{ConflictDetector, Decision, TARGET_SQLSTATE};
use crate::core::error::{Error, Result};
use crate::core::event::Event;
use crate::core::executor::Executor;
use crate::core::hook::{EventHandler, HookRegistry};
use crate::core::invoker::{ActionInvoker, DispatchWorker, QueuedInvoker, ShellInvoker};
use console::style;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::warn;

/// Where configuration is read from.
#[derive(Debug, Clone, Copy)]
pub struct ConfigSources<'a> {
    /// Explicit configuration file.
    pub config: Option<&'a Path>,
    /// Host settings file.
    pub settings: Option<&'a Path>,
}

impl ConfigSources<'_> {
    /// Resolves the effective configuration from every layer.
    pub fn load(&self) -> Result<Config> {
        let mut config = match self.config {
            Some(path) => Config::load_from(path)?,
            None => Config::load_or_default()?,
        };

        if let Some(path) = self.settings {
            let settings = ConfFile::load(path)?;
            config.apply_settings(&settings);
        }
        config.apply_settings(&EnvSettings);

        config.validate()?;
        Ok(config)
    }
}

/// Options for `watch`.
#[derive(Debug, Clone, Copy)]
pub struct WatchOptions<'a> {
    /// Event file, stdin if unset.
    pub input: Option<&'a Path>,
    /// Echo events to stdout downstream of the detector.
    pub forward: bool,
    /// Force queued dispatch.
    pub queued: bool,
    /// Fail on malformed input.
    pub strict: bool,
}

/// Downstream handler printing each event as a JSON line.
fn echo_handler() -> EventHandler {
    Arc::new(|event: &Event| match event.to_json() {
        Ok(json) => println!("{json}"),
        Err(e) => warn!(error = %e, "failed to encode event"),
    })
}

/// Run an event stream through an installed detector.
pub async fn watch(sources: &ConfigSources<'_>, options: &WatchOptions<'_>) -> Result<ExitCode> {
    let config = Arc::new(sources.load()?);

    let (invoker, worker): (Arc<dyn ActionInvoker>, Option<DispatchWorker>) =
        if options.queued || config.action.mode == DispatchMode::Queued {
            let (invoker, worker) = QueuedInvoker::spawn(config.execute_options());
            (Arc::new(invoker), Some(worker))
        } else {
            (
                Arc::new(ShellInvoker::with_options(config.execute_options())),
                None,
            )
        };

    // Startup: downstream handler first, then the detector on top of it
    let mut registry = if options.forward {
        HookRegistry::with_handler(echo_handler())
    } else {
        HookRegistry::new()
    };
    let installation = ConflictDetector::install(Arc::clone(&config), invoker, &mut registry)?;
    registry.begin_accepting();

    let reader: Box<dyn AsyncRead + Unpin + Send> = match options.input {
        Some(path) => Box::new(
            tokio::fs::File::open(path)
                .await
                .map_err(|e| Error::io(format!("open {}", path.display()), e))?,
        ),
        None => Box::new(tokio::io::stdin()),
    };
    let mut lines = BufReader::new(reader).lines();

    let mut line_number = 0;
    let mut malformed = 0;
    let mut failure = None;
    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| Error::io("read events", e))?
    {
        line_number += 1;
        if line.trim().is_empty() {
            continue;
        }

        match Event::from_json(&line) {
            Ok(event) => {
                tokio::task::block_in_place(|| registry.emit(&event));
            },
            Err(e) => {
                let err = Error::EventParse {
                    line: line_number,
                    message: e.to_string(),
                };
                if options.strict {
                    failure = Some(err);
                    break;
                }
                malformed += 1;
                warn!("{err}, skipping");
            },
        }
    }

    // Shutdown: restore the chain and let queued commands finish
    registry.begin_shutdown();
    let stats = installation.uninstall(&mut registry);
    drop(registry);

    let executed = match worker {
        Some(worker) => Some(worker.join().await?),
        None => None,
    };

    if let Some(err) = failure {
        return Err(err);
    }

    eprintln!(
        "{} {} events, {} conflicts, {} dispatched ({} failed), {} malformed",
        style("•").cyan(),
        stats.events,
        style(stats.matches).bold(),
        stats.dispatches,
        stats.dispatch_failures,
        malformed
    );
    if let Some(executed) = executed {
        eprintln!("  {executed} queued command(s) completed");
    }

    Ok(ExitCode::SUCCESS)
}

/// Evaluate a single event.
pub fn check(
    sources: &ConfigSources<'_>,
    sqlstate: &str,
    constraint: Option<&str>,
    dry_run: bool,
) -> Result<ExitCode> {
    let config = Arc::new(sources.load()?);

    let mut event = Event::new(sqlstate, "checked from the command line");
    if let Some(name) = constraint {
        event = event.with_constraint(name);
    }

    let invoker = Arc::new(ShellInvoker::with_options(config.execute_options()));
    let detector = ConflictDetector::new(Arc::clone(&config), invoker, None);
    let decision = if dry_run {
        detector.evaluate(&event)
    } else {
        detector.on_event(&event)
    };

    eprintln!(
        "Event:  sqlstate={} constraint={}",
        event.sqlstate(),
        display_or_unset(Some(event.constraint_name()))
    );
    eprintln!(
        "Target: sqlstate={} constraint={}",
        TARGET_SQLSTATE,
        display_or_unset(config.target_constraint_name())
    );
    eprintln!(
        "Action: {}",
        display_or_unset(config.action_command())
    );

    let marker = match decision {
        Decision::Dispatched | Decision::Queued | Decision::Matched | Decision::MatchedNoAction => {
            style("✓").green()
        },
        Decision::DispatchFailed | Decision::Faulted => style("✗").red(),
        _ => style("•").cyan(),
    };
    eprintln!("{marker} Decision: {}", style(decision).bold());

    if decision.is_match() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

fn display_or_unset(value: Option<&str>) -> &str {
    value.filter(|v| !v.is_empty()).unwrap_or("(unset)")
}

/// Initialize configuration.
pub fn init(force: bool) -> Result<ExitCode> {
    let config_path = PathBuf::from(CONFIG_FILE_NAME);

    if config_path.exists() && !force {
        eprintln!(
            "{} Configuration already exists: {}",
            style("!").yellow(),
            config_path.display()
        );
        eprintln!("  Use --force to overwrite.");
        return Ok(ExitCode::FAILURE);
    }

    std::fs::write(&config_path, Config::default_toml())
        .map_err(|e| Error::io("write config", e))?;

    eprintln!("{} Created {}", style("✓").green(), config_path.display());
    eprintln!("\nNext steps:");
    eprintln!("  1. Set [predicate] constraint_name and [action] command in {CONFIG_FILE_NAME}");
    eprintln!("  2. Run: detect-conflict validate");

    Ok(ExitCode::SUCCESS)
}

/// Show configuration.
pub fn config(sources: &ConfigSources<'_>, raw: bool) -> Result<ExitCode> {
    if raw {
        let path = match sources.config {
            Some(path) => path.to_path_buf(),
            None => match Config::find_config_file() {
                Ok(path) => path,
                Err(Error::ConfigNotFound { .. }) => {
                    eprintln!("{} No configuration file found", style("!").yellow());
                    eprintln!("  Run: detect-conflict init");
                    return Ok(ExitCode::FAILURE);
                },
                Err(e) => return Err(e),
            },
        };

        eprintln!("Configuration file: {}", path.display());
        let content = std::fs::read_to_string(&path).map_err(|e| Error::io("read config", e))?;
        std::io::stdout()
            .write_all(content.as_bytes())
            .map_err(|e| Error::io("write output", e))?;
        return Ok(ExitCode::SUCCESS);
    }

    let config = sources.load()?;
    std::io::stdout()
        .write_all(config.to_toml().as_bytes())
        .map_err(|e| Error::io("write output", e))?;

    Ok(ExitCode::SUCCESS)
}

/// Validate configuration.
pub fn validate(sources: &ConfigSources<'_>) -> Result<ExitCode> {
    let config = match sources.load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} Failed to load configuration: {e}", style("✗").red());
            return Ok(ExitCode::FAILURE);
        },
    };

    eprintln!("{} Configuration is valid", style("✓").green());

    match config.target_constraint_name() {
        Some(name) => eprintln!("  Watching constraint: {}", style(name).cyan()),
        None => eprintln!(
            "{} No constraint configured; no event will ever match",
            style("!").yellow()
        ),
    }

    match config.action_command() {
        Some(command) => {
            eprintln!("  Action: {command}");
            if let Some(program) = Executor::program_of(command) {
                if !Executor::command_exists(program) {
                    eprintln!(
                        "{} Action program not found on PATH: {program}",
                        style("!").yellow()
                    );
                }
            }
        },
        None => eprintln!("  Action: (none, detection only)"),
    }

    Ok(ExitCode::SUCCESS)
}

/// Generate shell completions.
pub fn completions(shell: clap_complete::Shell) {
    use clap::CommandFactory;
    clap_complete::generate(
        shell,
        &mut super::Cli::command(),
        "detect-conflict",
        &mut std::io::stdout(),
    );
}
