//! Error/log events as the host reports them.
//!
//! An [`Event`] is read-only to the detector. It is borrowed for the length of
//! one hook call and never retained.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// A five-character status code classifying an event (SQLSTATE).
///
/// Any string is accepted since hosts are free to report whatever they like;
/// [`SqlState::is_well_formed`] tells whether it looks like a real code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SqlState(Cow<'static, str>);

impl SqlState {
    /// `23505`: unique constraint violation.
    pub const UNIQUE_VIOLATION: Self = Self(Cow::Borrowed("23505"));

    /// Creates a status code from any string.
    pub fn new(code: impl Into<String>) -> Self {
        Self(Cow::Owned(code.into()))
    }

    /// Returns the code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the code is exactly five characters of `[0-9A-Z]`.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        self.0.len() == 5
            && self
                .0
                .bytes()
                .all(|b| b.is_ascii_digit() || b.is_ascii_uppercase())
    }
}

impl std::fmt::Display for SqlState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SqlState {
    fn from(code: &str) -> Self {
        Self::new(code)
    }
}

/// Severity of a reported event.
///
/// Decoding goes through [`FromStr`](std::str::FromStr), so names are
/// case-insensitive and `DEBUG1`..`DEBUG5` read as [`Severity::Debug`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE", try_from = "String")]
pub enum Severity {
    /// Developer debug output.
    Debug,
    /// Server log message.
    Log,
    /// Informational message.
    Info,
    /// Notice.
    Notice,
    /// Warning.
    Warning,
    /// Error aborting the current unit of work.
    #[default]
    Error,
    /// Error terminating the session.
    Fatal,
    /// Error terminating the whole host.
    Panic,
}

impl Severity {
    /// Returns the canonical upper-case name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Log => "LOG",
            Self::Info => "INFO",
            Self::Notice => "NOTICE",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Fatal => "FATAL",
            Self::Panic => "PANIC",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "DEBUG" | "DEBUG1" | "DEBUG2" | "DEBUG3" | "DEBUG4" | "DEBUG5" => Ok(Self::Debug),
            "LOG" => Ok(Self::Log),
            "INFO" => Ok(Self::Info),
            "NOTICE" => Ok(Self::Notice),
            "WARNING" => Ok(Self::Warning),
            "ERROR" => Ok(Self::Error),
            "FATAL" => Ok(Self::Fatal),
            "PANIC" => Ok(Self::Panic),
            _ => Err(format!("Invalid severity: {s}")),
        }
    }
}

impl TryFrom<String> for Severity {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, <Self as TryFrom<String>>::Error> {
        value.parse()
    }
}

/// One error/log occurrence emitted by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    #[serde(alias = "state_code", alias = "sql_state")]
    sqlstate: SqlState,
    #[serde(
        default,
        alias = "constraint_name",
        skip_serializing_if = "Option::is_none"
    )]
    constraint: Option<String>,
    #[serde(default)]
    message: String,
    #[serde(default, alias = "error_severity")]
    severity: Severity,
    #[serde(default, alias = "schema_name", skip_serializing_if = "Option::is_none")]
    schema: Option<String>,
    #[serde(default, alias = "table_name", skip_serializing_if = "Option::is_none")]
    table: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timestamp: Option<DateTime<Utc>>,
}

impl Event {
    /// Creates an `ERROR` event with the given status code and message.
    pub fn new(sqlstate: impl Into<SqlState>, message: impl Into<String>) -> Self {
        Self {
            sqlstate: sqlstate.into(),
            constraint: None,
            message: message.into(),
            severity: Severity::Error,
            schema: None,
            table: None,
            timestamp: None,
        }
    }

    /// Sets the constraint name.
    #[must_use]
    pub fn with_constraint(mut self, name: impl Into<String>) -> Self {
        self.constraint = Some(name.into());
        self
    }

    /// Sets the severity.
    #[must_use]
    pub const fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Sets the schema and table the event refers to.
    #[must_use]
    pub fn with_relation(mut self, schema: impl Into<String>, table: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self.table = Some(table.into());
        self
    }

    /// Sets the time the host produced the event.
    #[must_use]
    pub const fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Decodes an event from one JSON object.
    pub fn from_json(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line)
    }

    /// Encodes the event as a single JSON line.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Status code of the event.
    #[must_use]
    pub const fn sqlstate(&self) -> &SqlState {
        &self.sqlstate
    }

    /// Constraint name, or `""` when the host did not report one.
    #[must_use]
    pub fn constraint_name(&self) -> &str {
        self.constraint.as_deref().unwrap_or_default()
    }

    /// Human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Severity level.
    #[must_use]
    pub const fn severity(&self) -> Severity {
        self.severity
    }

    /// Schema name, if reported.
    #[must_use]
    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    /// Table name, if reported.
    #[must_use]
    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    /// Timestamp, if reported.
    #[must_use]
    pub const fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_sqlstate_constants() {
        assert_eq!(SqlState::UNIQUE_VIOLATION.as_str(), "23505");
        assert_eq!(SqlState::UNIQUE_VIOLATION, SqlState::new("23505"));
        assert_eq!(SqlState::from("23502").as_str(), "23502");
    }

    #[test]
    fn test_sqlstate_well_formed() {
        assert!(SqlState::UNIQUE_VIOLATION.is_well_formed());
        assert!(SqlState::new("42P01").is_well_formed());
        assert!(!SqlState::new("2350").is_well_formed());
        assert!(!SqlState::new("23505 ").is_well_formed());
        assert!(!SqlState::new("unique violation").is_well_formed());
    }

    #[test]
    fn test_severity_parse() {
        assert_eq!("error".parse::<Severity>().ok(), Some(Severity::Error));
        assert_eq!("DEBUG2".parse::<Severity>().ok(), Some(Severity::Debug));
        assert!("loud".parse::<Severity>().is_err());
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Warning < Severity::Error);
        assert!(Severity::Fatal < Severity::Panic);
        assert_eq!(Severity::default(), Severity::Error);
    }

    #[test]
    fn test_event_builder() {
        let event = Event::new("23505", "duplicate key")
            .with_constraint("orders_pkey")
            .with_relation("public", "orders")
            .with_severity(Severity::Fatal);

        assert_eq!(event.sqlstate(), &SqlState::UNIQUE_VIOLATION);
        assert_eq!(event.constraint_name(), "orders_pkey");
        assert_eq!(event.schema(), Some("public"));
        assert_eq!(event.table(), Some("orders"));
        assert_eq!(event.severity(), Severity::Fatal);
        assert_eq!(event.timestamp(), None);
    }

    #[test]
    fn test_missing_constraint_reads_as_empty() {
        let event = Event::new("23505", "duplicate key");
        assert_eq!(event.constraint_name(), "");
    }

    #[test]
    fn test_from_json_minimal() {
        let event = Event::from_json(r#"{"sqlstate":"23502"}"#).expect("parse");
        assert_eq!(event.sqlstate(), &SqlState::new("23502"));
        assert_eq!(event.constraint_name(), "");
        assert_eq!(event.message(), "");
        assert_eq!(event.severity(), Severity::Error);
    }

    #[test]
    fn test_from_json_aliases() {
        let event = Event::from_json(
            r#"{"state_code":"23505","constraint_name":"yamanote_t_name_key","error_severity":"ERROR","message":"dup","timestamp":"2024-05-01T10:00:00Z"}"#,
        )
        .expect("parse");
        assert_eq!(event.sqlstate().as_str(), "23505");
        assert_eq!(event.constraint_name(), "yamanote_t_name_key");
        assert!(event.timestamp().is_some());
    }

    #[test]
    fn test_from_json_severity_any_case() {
        for (raw, expected) in [
            ("warning", Severity::Warning),
            ("DEBUG1", Severity::Debug),
            ("Fatal", Severity::Fatal),
        ] {
            let line = format!(r#"{{"sqlstate":"01000","error_severity":"{raw}"}}"#);
            let event = Event::from_json(&line).expect("parse");
            assert_eq!(event.severity(), expected, "severity {raw}");
        }
    }

    #[test]
    fn test_from_json_rejects_unknown_severity() {
        let err = Event::from_json(r#"{"sqlstate":"23505","severity":"loud"}"#)
            .expect_err("should fail");
        assert!(err.to_string().contains("Invalid severity: loud"));
    }

    #[test]
    fn test_from_json_rejects_missing_code() {
        assert!(Event::from_json(r#"{"message":"no code"}"#).is_err());
        assert!(Event::from_json("not json").is_err());
    }

    #[test]
    fn test_to_json_omits_absent_fields() {
        let json = Event::new("23505", "dup")
            .with_constraint("k")
            .to_json()
            .expect("encode");
        assert_eq!(
            json,
            r#"{"sqlstate":"23505","constraint":"k","message":"dup","severity":"ERROR"}"#
        );
    }
}
