//! # detect-conflict
//!
//! Run an external action when a unique-constraint conflict shows up in a
//! host's error stream.
//!
//! A [`ConflictDetector`] installs itself on the host's event hook, checks every
//! reported event for a unique violation (`23505`) on one configured
//! constraint and, on a match, runs a configured shell command. The event is
//! always passed on to the handler that was registered before the detector,
//! so installing it never changes what the host already does with its errors.
//!
//! ## Features
//!
//! - **Chained hook**: the previous handler is kept and restored on uninstall
//! - **Startup-only installation**: late installation is refused
//! - **Contained failures**: dispatch errors and panics never escape the hook
//! - **Sync or queued dispatch**: run the command inline or on a worker task
//!
//! ## Example
//!
//! ```rust,no_run
//! use detect_conflict::{Config, ConflictDetector, Event, HookRegistry, ShellInvoker};
//! use std::sync::Arc;
//!
//! fn main() -> detect_conflict::Result<()> {
//!     let mut config = Config::load_or_default()?;
//!     config.action.command = Some("/usr/local/bin/on-conflict.sh".to_string());
//!
//!     // The host's hook slot, still in its startup phase
//!     let mut registry = HookRegistry::new();
//!     let installation = ConflictDetector::install(
//!         Arc::new(config),
//!         Arc::new(ShellInvoker::new()),
//!         &mut registry,
//!     )?;
//!     registry.begin_accepting();
//!
//!     registry.emit(&Event::new("23505", "duplicate key").with_constraint("yamanote_t_name_key"));
//!
//!     registry.begin_shutdown();
//!     installation.uninstall(&mut registry);
//!     Ok(())
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/detect-conflict/0.1.0")]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod cli;
pub mod config;
pub mod core;

// Re-export main types for convenience
pub use config::Config;
pub use core::detector::{ConflictDetector, Decision, DetectorStats, Installation};
pub use core::error::{Error, Result};
pub use core::event::{Event, Severity, SqlState};
pub use core::hook::{EventHandler, HookRegistry, HostPhase};
pub use core::invoker::{ActionInvoker, Dispatch, DispatchWorker, QueuedInvoker, ShellInvoker};
