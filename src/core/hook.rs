//! The host's event hook slot.
//!
//! A [`HookRegistry`] holds at most one active handler, the way a host exposes a
//! single logging hook that extensions chain onto. It also tracks the host's
//! lifecycle phase, because interceptors may only be installed before the host
//! starts accepting work.
//!
//! Emitting takes `&self` and may happen from any number of contexts at once.
//! Everything that changes the slot or the phase takes `&mut self`, so writes
//! cannot overlap event processing.

use crate::core::event::Event;
use std::sync::Arc;
use tracing::debug;

/// A function receiving every event the host emits.
pub type EventHandler = Arc<dyn Fn(&Event) + Send + Sync>;

/// Lifecycle phase of the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HostPhase {
    /// Loading extensions, not yet accepting work. Installation is allowed.
    #[default]
    Startup,
    /// Accepting and processing work.
    Running,
    /// Draining before exit.
    ShuttingDown,
}

impl HostPhase {
    /// Returns a lower-case name for the phase.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Startup => "startup",
            Self::Running => "running",
            Self::ShuttingDown => "shutting-down",
        }
    }
}

impl std::fmt::Display for HostPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// The host's single event hook plus its lifecycle phase.
#[derive(Default)]
pub struct HookRegistry {
    phase: HostPhase,
    handler: Option<EventHandler>,
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRegistry")
            .field("phase", &self.phase)
            .field("hooked", &self.handler.is_some())
            .finish()
    }
}

impl HookRegistry {
    /// Creates an empty registry in the startup phase.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry in the startup phase with a handler already set.
    #[must_use]
    pub fn with_handler(handler: EventHandler) -> Self {
        Self {
            phase: HostPhase::Startup,
            handler: Some(handler),
        }
    }

    /// Current lifecycle phase.
    #[must_use]
    pub const fn phase(&self) -> HostPhase {
        self.phase
    }

    /// Leaves the startup phase. Later installations are refused.
    pub fn begin_accepting(&mut self) {
        debug!(from = %self.phase, "host accepting work");
        self.phase = HostPhase::Running;
    }

    /// Enters the shutdown phase.
    pub fn begin_shutdown(&mut self) {
        debug!(from = %self.phase, "host shutting down");
        self.phase = HostPhase::ShuttingDown;
    }

    /// Returns the active handler, if any.
    #[must_use]
    pub const fn current(&self) -> Option<&EventHandler> {
        self.handler.as_ref()
    }

    /// Returns true if a handler is registered.
    #[must_use]
    pub const fn is_hooked(&self) -> bool {
        self.handler.is_some()
    }

    /// Swaps the active handler and returns the one it replaced.
    pub fn replace(&mut self, handler: Option<EventHandler>) -> Option<EventHandler> {
        std::mem::replace(&mut self.handler, handler)
    }

    /// Delivers an event to the active handler.
    ///
    /// Returns false when no handler is registered.
    pub fn emit(&self, event: &Event) -> bool {
        match &self.handler {
            Some(handler) => {
                handler(event);
                true
            },
            None => false,
        }
    }
}
