//! Error types for detect-conflict.
//!
//! Only installation and configuration failures ever leave the crate.
//! Everything that goes wrong while an event is being processed is
//! contained by the detector and reported through `tracing` instead.

use crate::core::hook::HostPhase;
use std::path::PathBuf;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// All possible errors in detect-conflict.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // =========================================================================
    // Configuration errors
    // =========================================================================
    /// Configuration file not found.
    #[error("Configuration file not found: {path}")]
    ConfigNotFound {
        /// Path where config was expected.
        path: PathBuf,
    },

    /// Failed to parse configuration file.
    #[error("Failed to parse configuration: {message}")]
    ConfigParse {
        /// Description of the parse error.
        message: String,
        /// Optional source error.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Invalid configuration value.
    #[error("Invalid configuration: {field} - {message}")]
    ConfigInvalid {
        /// Field name that is invalid.
        field: String,
        /// Description of why it's invalid.
        message: String,
    },

    // =========================================================================
    // Installation errors
    // =========================================================================
    /// The detector was installed after the host left its startup phase.
    #[error("detect_conflict must be installed during host startup (current phase: {phase})")]
    NotInStartupPhase {
        /// Phase the host was in when installation was attempted.
        phase: HostPhase,
    },

    // =========================================================================
    // Event errors
    // =========================================================================
    /// An input line could not be decoded as an event.
    #[error("Malformed event on line {line}: {message}")]
    EventParse {
        /// 1-based line number in the input stream.
        line: usize,
        /// Decoder message.
        message: String,
    },

    // =========================================================================
    // Dispatch errors
    // =========================================================================
    /// The action command could not be launched or awaited.
    #[error("Failed to dispatch '{command}': {message}")]
    Dispatch {
        /// The command line that was being dispatched.
        command: String,
        /// Error message.
        message: String,
    },

    // =========================================================================
    // I/O errors
    // =========================================================================
    /// File I/O error.
    #[error("I/O error: {message}")]
    Io {
        /// Description of what failed.
        message: String,
        /// Source error.
        #[source]
        source: std::io::Error,
    },

    // =========================================================================
    // Internal errors
    // =========================================================================
    /// Internal error (should never happen).
    #[error("Internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },
}

impl Error {
    /// Creates a new configuration parse error.
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new configuration parse error with source.
    pub fn config_parse_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new invalid configuration error.
    pub fn config_invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates a new I/O error with context.
    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source,
        }
    }

    /// Creates a new dispatch error.
    pub fn dispatch(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Dispatch {
            command: command.into(),
            message: message.into(),
        }
    }

    /// Returns an exit code appropriate for this error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::ConfigNotFound { .. }
            | Self::ConfigParse { .. }
            | Self::ConfigInvalid { .. }
            | Self::NotInStartupPhase { .. } => 78, // EX_CONFIG
            Self::EventParse { .. } => 65, // EX_DATAERR
            _ => 1,
        }
    }
}
