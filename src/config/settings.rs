//! Host settings sources.
//!
//! The host owns a key/value settings subsystem; the detector only reads two
//! keys from it. [`Settings`] abstracts over where those values come from:
//! a `postgresql.conf`-style file ([`ConfFile`]), the process environment
//! ([`EnvSettings`]) or a plain map.

use crate::core::error::{Error, Result};
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

/// A read-only key/value settings source.
pub trait Settings {
    /// Returns the value for `name`, if the source defines it.
    fn get(&self, name: &str) -> Option<String>;
}

impl Settings for HashMap<String, String> {
    fn get(&self, name: &str) -> Option<String> {
        HashMap::get(self, name).cloned()
    }
}

/// Reads settings from environment variables.
///
/// `detect_conflict.constraint_name` is looked up as
/// `DETECT_CONFLICT_CONSTRAINT_NAME`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSettings;

impl EnvSettings {
    /// Returns the environment variable name for a setting.
    #[must_use]
    pub fn env_key(name: &str) -> String {
        name.replace(['.', '-'], "_").to_uppercase()
    }
}

impl Settings for EnvSettings {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(Self::env_key(name)).ok()
    }
}

/// Settings parsed from a `name = value` configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfFile {
    values: HashMap<String, String>,
}

fn assignment_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_.$]*)\s*(?:=\s*|\s+)(.*)$")
            .expect("settings assignment pattern is valid")
    })
}

impl ConfFile {
    /// Reads and parses a settings file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::io("read settings", e))?;
        Self::parse(&content)
    }

    /// Parses settings file content.
    ///
    /// Names are case-insensitive and the last assignment wins.
    pub fn parse(content: &str) -> Result<Self> {
        let mut values = HashMap::new();

        for (index, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let captures = assignment_pattern().captures(line).ok_or_else(|| {
                Error::config_parse(format!("syntax error on settings line {}", index + 1))
            })?;
            let name = captures[1].to_lowercase();
            let value = parse_value(&captures[2]).map_err(|message| {
                Error::config_parse(format!("{message} on settings line {}", index + 1))
            })?;

            values.insert(name, value);
        }

        Ok(Self { values })
    }

    /// Number of distinct settings in the file.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the file assigns nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Settings for ConfFile {
    fn get(&self, name: &str) -> Option<String> {
        self.values.get(&name.to_lowercase()).cloned()
    }
}

fn parse_value(raw: &str) -> std::result::Result<String, &'static str> {
    let raw = raw.trim_start();

    let Some(quoted) = raw.strip_prefix('\'') else {
        let value = raw.split('#').next().unwrap_or_default().trim();
        if value.is_empty() {
            return Err("missing value");
        }
        return Ok(value.to_string());
    };

    let mut value = String::new();
    let mut chars = quoted.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\'' if chars.peek() == Some(&'\'') => {
                chars.next();
                value.push('\'');
            },
            '\'' => {
                let tail: String = chars.collect();
                let tail = tail.trim();
                if tail.is_empty() || tail.starts_with('#') {
                    return Ok(value);
                }
                return Err("unexpected text after quoted value");
            },
            '\\' => match chars.next() {
                Some(escaped) => value.push(escaped),
                None => return Err("unterminated quoted value"),
            },
            _ => value.push(c),
        }
    }

    Err("unterminated quoted value")
}
