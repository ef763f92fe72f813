//! Core functionality for detect-conflict.
//!
//! This module contains the main components:
//! - [`event`]: Events reported by the host
//! - [`hook`]: The host's handler slot and lifecycle phase
//! - [`detector`]: Conflict detection and handler chaining
//! - [`invoker`]: Running the action command
//! - [`executor`]: Shell command execution
//! - [`error`]: Error types and result handling

pub mod detector;
pub mod error;
pub mod event;
pub mod executor;
pub mod hook;
pub mod invoker;
