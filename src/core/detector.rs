//! Conflict detection on the host's event hook.
//!
//! The [`ConflictDetector`] sits on the host's error-reporting path. For every
//! event it checks whether the event is a unique violation on the configured
//! constraint, runs the action command if so, and then hands the event on to
//! whatever handler was registered before it.
//!
//! Nothing that goes wrong in here may surface as a new error: the detector
//! catches panics from its own logic, ignores dispatch failures and refuses to
//! evaluate recursively when the action path feeds events back into the hook.

use crate::config::Config;
use crate::core::error::{Error, Result};
use crate::core::event::{Event, SqlState};
use crate::core::hook::{EventHandler, HookRegistry, HostPhase};
use crate::core::invoker::{ActionInvoker, Dispatch};
use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Status code an event must carry to be considered a conflict.
pub const TARGET_SQLSTATE: SqlState = SqlState::UNIQUE_VIOLATION;

/// Outcome of running one event through the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Decision {
    /// Not a unique violation.
    StatusMismatch,
    /// Unique violation, but no target constraint is configured.
    TargetUnset,
    /// Unique violation on some other constraint.
    ConstraintMismatch,
    /// Predicate matched. Only returned by [`ConflictDetector::evaluate`].
    Matched,
    /// Predicate matched and no action command is configured.
    MatchedNoAction,
    /// Action command ran.
    Dispatched,
    /// Action command was handed to a background worker.
    Queued,
    /// Action command could not be started, or exited non-zero.
    DispatchFailed,
    /// Evaluation was skipped because the detector was already running on
    /// this thread.
    Reentrant,
    /// Evaluation panicked; the panic was contained.
    Faulted,
}

impl Decision {
    /// Returns a short name for the decision.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::StatusMismatch => "status-mismatch",
            Self::TargetUnset => "target-unset",
            Self::ConstraintMismatch => "constraint-mismatch",
            Self::Matched => "matched",
            Self::MatchedNoAction => "matched-no-action",
            Self::Dispatched => "dispatched",
            Self::Queued => "queued",
            Self::DispatchFailed => "dispatch-failed",
            Self::Reentrant => "reentrant",
            Self::Faulted => "faulted",
        }
    }

    /// Returns true if the event satisfied the predicate.
    #[must_use]
    pub const fn is_match(&self) -> bool {
        matches!(
            self,
            Self::Matched | Self::MatchedNoAction | Self::Dispatched | Self::Queued | Self::DispatchFailed
        )
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Counters describing what the detector has seen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DetectorStats {
    /// Events received.
    pub events: u64,
    /// Events that matched the predicate.
    pub matches: u64,
    /// Commands run or queued.
    pub dispatches: u64,
    /// Commands that failed to start or exited non-zero.
    pub dispatch_failures: u64,
    /// Evaluations that panicked.
    pub faults: u64,
}

#[derive(Debug, Default)]
struct Counters {
    events: AtomicU64,
    matches: AtomicU64,
    dispatches: AtomicU64,
    dispatch_failures: AtomicU64,
    faults: AtomicU64,
}

impl Counters {
    fn record(&self, decision: Decision) {
        self.events.fetch_add(1, Ordering::Relaxed);
        if decision.is_match() {
            self.matches.fetch_add(1, Ordering::Relaxed);
        }
        match decision {
            Decision::Dispatched | Decision::Queued => {
                self.dispatches.fetch_add(1, Ordering::Relaxed);
            },
            Decision::DispatchFailed => {
                self.dispatches.fetch_add(1, Ordering::Relaxed);
                self.dispatch_failures.fetch_add(1, Ordering::Relaxed);
            },
            Decision::Faulted => {
                self.faults.fetch_add(1, Ordering::Relaxed);
            },
            _ => {},
        }
    }

    fn snapshot(&self) -> DetectorStats {
        DetectorStats {
            events: self.events.load(Ordering::Relaxed),
            matches: self.matches.load(Ordering::Relaxed),
            dispatches: self.dispatches.load(Ordering::Relaxed),
            dispatch_failures: self.dispatch_failures.load(Ordering::Relaxed),
            faults: self.faults.load(Ordering::Relaxed),
        }
    }
}

thread_local! {
    static EVALUATING: Cell<bool> = const { Cell::new(false) };
}

/// Marks the current thread as inside the detector until dropped.
struct ReentrancyGuard;

impl ReentrancyGuard {
    fn enter() -> Option<Self> {
        EVALUATING.with(|flag| if flag.replace(true) { None } else { Some(Self) })
    }
}

impl Drop for ReentrancyGuard {
    fn drop(&mut self) {
        EVALUATING.with(|flag| flag.set(false));
    }
}

/// Intercepts host events and dispatches the action command on a conflict.
pub struct ConflictDetector {
    config: Arc<Config>,
    invoker: Arc<dyn ActionInvoker>,
    previous: Option<EventHandler>,
    counters: Counters,
}

impl std::fmt::Debug for ConflictDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConflictDetector")
            .field("config", &self.config)
            .field("chained", &self.previous.is_some())
            .field("counters", &self.counters)
            .finish_non_exhaustive()
    }
}

impl ConflictDetector {
    /// Creates a detector that forwards to `previous` after its own logic.
    #[must_use]
    pub fn new(
        config: Arc<Config>,
        invoker: Arc<dyn ActionInvoker>,
        previous: Option<EventHandler>,
    ) -> Self {
        Self {
            config,
            invoker,
            previous,
            counters: Counters::default(),
        }
    }

    /// Installs a detector as the registry's active handler.
    ///
    /// Only allowed while the host is starting up. On any other phase the
    /// registry is left untouched and [`Error::NotInStartupPhase`] is
    /// returned.
    pub fn install(
        config: Arc<Config>,
        invoker: Arc<dyn ActionInvoker>,
        registry: &mut HookRegistry,
    ) -> Result<Installation> {
        let phase = registry.phase();
        if phase != HostPhase::Startup {
            error!(%phase, "refusing to install conflict detector outside host startup");
            return Err(Error::NotInStartupPhase { phase });
        }

        let previous = registry.current().cloned();
        let detector = Arc::new(Self::new(config, invoker, previous.clone()));

        let hook = Arc::clone(&detector);
        let own: EventHandler = Arc::new(move |event: &Event| {
            hook.on_event(event);
        });
        registry.replace(Some(Arc::clone(&own)));

        info!(
            constraint_name = detector.config.target_constraint_name().unwrap_or_default(),
            action_command = detector.config.action_command().unwrap_or_default(),
            chained = previous.is_some(),
            "conflict detector installed"
        );

        Ok(Installation {
            detector,
            own,
            previous,
        })
    }

    /// Processes one event and forwards it to the previous handler.
    ///
    /// Never panics because of its own logic and never fails; the returned
    /// decision is informational.
    pub fn on_event(&self, event: &Event) -> Decision {
        let decision = match ReentrancyGuard::enter() {
            Some(_guard) => self.evaluate_contained(event),
            None => {
                debug!(sqlstate = %event.sqlstate(), "detector re-entered, forwarding only");
                Decision::Reentrant
            },
        };
        self.counters.record(decision);

        if let Some(previous) = &self.previous {
            previous(event);
        }

        decision
    }

    /// Evaluates the predicate without running anything.
    #[must_use]
    pub fn evaluate(&self, event: &Event) -> Decision {
        if event.sqlstate() != &TARGET_SQLSTATE {
            return Decision::StatusMismatch;
        }

        let Some(target) = self.config.target_constraint_name() else {
            return Decision::TargetUnset;
        };

        if event.constraint_name() == target {
            Decision::Matched
        } else {
            Decision::ConstraintMismatch
        }
    }

    /// Snapshot of the detector's counters.
    #[must_use]
    pub fn stats(&self) -> DetectorStats {
        self.counters.snapshot()
    }

    /// Configuration the detector evaluates against.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn evaluate_contained(&self, event: &Event) -> Decision {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.process(event)));
        match outcome {
            Ok(decision) => decision,
            Err(_) => {
                error!(sqlstate = %event.sqlstate(), "conflict detection panicked; event delivered unchanged");
                Decision::Faulted
            },
        }
    }

    fn process(&self, event: &Event) -> Decision {
        debug!(
            sqlstate = %event.sqlstate(),
            constraint_name = event.constraint_name(),
            "detect_conflict start"
        );
        if !event.sqlstate().is_well_formed() {
            debug!(sqlstate = %event.sqlstate(), "status code is not a five-character SQLSTATE");
        }

        match self.evaluate(event) {
            Decision::Matched => {},
            Decision::TargetUnset => {
                warn!(
                    constraint_name = event.constraint_name(),
                    "unique violation seen but no target constraint is configured"
                );
                return Decision::TargetUnset;
            },
            Decision::ConstraintMismatch => {
                info!(
                    constraint_name = event.constraint_name(),
                    "conflict error, constraint name does not match"
                );
                return Decision::ConstraintMismatch;
            },
            other => return other,
        }

        info!(
            constraint_name = event.constraint_name(),
            table = event.table().unwrap_or_default(),
            "conflict detected"
        );

        let Some(command) = self.config.action_command() else {
            info!("no action command configured, detection only");
            return Decision::MatchedNoAction;
        };

        info!(command, "launching action command");
        match self.invoker.invoke(command) {
            Ok(Dispatch::Completed(output)) if output.success() => {
                info!(
                    command,
                    duration = %humantime::format_duration(output.duration),
                    "action command finished"
                );
                Decision::Dispatched
            },
            Ok(Dispatch::Completed(output)) => {
                warn!(
                    command,
                    exit_code = output.exit_code,
                    output = %output.combined_output().trim_end(),
                    "action command exited with failure"
                );
                Decision::DispatchFailed
            },
            Ok(Dispatch::Queued) => Decision::Queued,
            Err(e) => {
                warn!(command, error = %e, "action command could not be launched");
                Decision::DispatchFailed
            },
        }
    }
}

/// A detector registered on a [`HookRegistry`].
///
/// Dropping this without calling [`Installation::uninstall`] leaves the
/// detector in the chain for the rest of the registry's life.
pub struct Installation {
    detector: Arc<ConflictDetector>,
    own: EventHandler,
    previous: Option<EventHandler>,
}

impl std::fmt::Debug for Installation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Installation")
            .field("detector", &self.detector)
            .field("chained", &self.previous.is_some())
            .finish_non_exhaustive()
    }
}

impl Installation {
    /// The installed detector.
    #[must_use]
    pub fn detector(&self) -> &ConflictDetector {
        &self.detector
    }

    /// The handler that was active before installation.
    #[must_use]
    pub const fn previous(&self) -> Option<&EventHandler> {
        self.previous.as_ref()
    }

    /// The handler registered for the detector.
    #[must_use]
    pub const fn handler(&self) -> &EventHandler {
        &self.own
    }

    /// Restores the previously active handler and returns final counters.
    pub fn uninstall(self, registry: &mut HookRegistry) -> DetectorStats {
        let still_ours = registry
            .current()
            .is_some_and(|current| Arc::ptr_eq(current, &self.own));
        if !still_ours {
            warn!("hook chain changed after the conflict detector was installed; restoring anyway");
        }

        registry.replace(self.previous);
        let stats = self.detector.stats();
        info!(
            events = stats.events,
            matches = stats.matches,
            dispatches = stats.dispatches,
            "conflict detector uninstalled"
        );
        stats
    }
}
