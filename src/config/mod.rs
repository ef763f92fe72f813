//! Configuration handling for detect-conflict.
//!
//! Settings come from, in increasing precedence: built-in defaults, a
//! `detect-conflict.toml` file, the host's settings file and the environment.
//! The resolved [`Config`] is built once and shared read-only with the
//! detector for the rest of the process lifetime.

mod settings;

pub use settings::{ConfFile, EnvSettings, Settings};

use crate::core::error::{Error, Result};
use crate::core::executor::ExecuteOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default configuration file name.
pub const CONFIG_FILE_NAME: &str = "detect-conflict.toml";

/// Constraint watched when nothing else is configured.
pub const DEFAULT_CONSTRAINT_NAME: &str = "yamanote_t_name_key";

/// Host setting naming the constraint to watch.
pub const CONSTRAINT_NAME_SETTING: &str = "detect_conflict.constraint_name";

/// Host setting naming the command to run on a conflict.
pub const ACTION_SCRIPT_SETTING: &str = "detect_conflict.action_script";

/// Main configuration structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// What counts as a conflict.
    pub predicate: PredicateConfig,
    /// What to do about one.
    pub action: ActionConfig,
}

impl Config {
    /// Loads configuration or returns defaults if not found.
    pub fn load_or_default() -> Result<Self> {
        match Self::find_config_file() {
            Ok(path) => Self::load_from(&path),
            Err(Error::ConfigNotFound { .. }) => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path).map_err(|e| Error::io("read config", e))?;
        debug!(path = %path.display(), "loaded configuration file");
        Self::from_toml_str(&content)
    }

    /// Parses and validates configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| Error::config_parse_with_source("Failed to parse TOML", e))?;

        config.validate()?;

        Ok(config)
    }

    /// Finds the configuration file by searching up the directory tree.
    pub fn find_config_file() -> Result<PathBuf> {
        let cwd = std::env::current_dir().map_err(|e| Error::io("get current dir", e))?;

        let mut current = cwd.as_path();
        loop {
            let config_path = current.join(CONFIG_FILE_NAME);
            if config_path.exists() {
                return Ok(config_path);
            }

            match current.parent() {
                Some(parent) => current = parent,
                None => break,
            }
        }

        Err(Error::ConfigNotFound {
            path: cwd.join(CONFIG_FILE_NAME),
        })
    }

    /// Overlays values from a host settings source.
    ///
    /// An empty `action_script` switches the action off.
    pub fn apply_settings(&mut self, settings: &dyn Settings) {
        if let Some(name) = settings.get(CONSTRAINT_NAME_SETTING) {
            debug!(setting = CONSTRAINT_NAME_SETTING, value = %name, "setting override");
            self.predicate.constraint_name = Some(name);
        }
        if let Some(script) = settings.get(ACTION_SCRIPT_SETTING) {
            debug!(setting = ACTION_SCRIPT_SETTING, value = %script, "setting override");
            self.action.command = Some(script).filter(|s| !s.trim().is_empty());
        }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if let Some(name) = &self.predicate.constraint_name {
            if name.contains('\0') {
                return Err(Error::config_invalid(
                    "predicate.constraint_name",
                    "must not contain NUL bytes",
                ));
            }
        }

        if let Some(command) = &self.action.command {
            if command.contains('\0') {
                return Err(Error::config_invalid(
                    "action.command",
                    "must not contain NUL bytes",
                ));
            }
        }

        if let Some(shell) = &self.action.shell {
            if shell.trim().is_empty() {
                return Err(Error::config_invalid("action.shell", "must not be empty"));
            }
        }

        Ok(())
    }

    /// Constraint name an event must carry to match, if one is configured.
    #[must_use]
    pub fn target_constraint_name(&self) -> Option<&str> {
        self.predicate
            .constraint_name
            .as_deref()
            .filter(|name| !name.is_empty())
    }

    /// Command to run on a match, if one is configured.
    #[must_use]
    pub fn action_command(&self) -> Option<&str> {
        self.action
            .command
            .as_deref()
            .filter(|command| !command.trim().is_empty())
    }

    /// Shell options for running the action command.
    #[must_use]
    pub fn execute_options(&self) -> ExecuteOptions {
        let options = ExecuteOptions::default().capture_output(self.action.capture_output);
        match &self.action.shell {
            Some(shell) => options.shell(shell.clone()),
            None => options,
        }
    }

    /// Generates default configuration as a string.
    #[must_use]
    pub fn default_toml() -> String {
        Self::default().to_toml()
    }

    /// Serializes this configuration as TOML.
    #[must_use]
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }
}

/// Predicate configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredicateConfig {
    /// Constraint name that must match exactly (case-sensitive).
    pub constraint_name: Option<String>,
}

impl Default for PredicateConfig {
    fn default() -> Self {
        Self {
            constraint_name: Some(DEFAULT_CONSTRAINT_NAME.to_string()),
        }
    }
}

/// How the action command is run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// Run inline and block the hook until the shell returns.
    #[default]
    Sync,
    /// Hand off to a background worker.
    Queued,
}

/// Action configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ActionConfig {
    /// Shell command line to run on a match. Unset means detect only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Dispatch mode.
    pub mode: DispatchMode,
    /// Shell used to interpret the command.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shell: Option<String>,
    /// Capture the command's output into the logs instead of inheriting
    /// the host's stdout/stderr.
    pub capture_output: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn settings(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.target_constraint_name(), Some(DEFAULT_CONSTRAINT_NAME));
        assert_eq!(config.action_command(), None);
        assert_eq!(config.action.mode, DispatchMode::Sync);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_toml() {
        let config = Config::from_toml_str(
            r#"
[predicate]
constraint_name = "orders_pkey"

[action]
command = "/usr/local/bin/on-conflict.sh"
mode = "queued"
shell = "bash"
capture_output = true
"#,
        )
        .expect("parse");

        assert_eq!(config.target_constraint_name(), Some("orders_pkey"));
        assert_eq!(config.action_command(), Some("/usr/local/bin/on-conflict.sh"));
        assert_eq!(config.action.mode, DispatchMode::Queued);
        assert_eq!(config.execute_options().shell.as_deref(), Some("bash"));
        assert!(config.execute_options().capture_output);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml_str("[action]\ncommand = \"true\"\n").expect("parse");
        assert_eq!(config.target_constraint_name(), Some(DEFAULT_CONSTRAINT_NAME));
        assert_eq!(config.action_command(), Some("true"));
    }

    #[test]
    fn test_invalid_toml() {
        let err = Config::from_toml_str("[action\ncommand = 1").expect_err("should fail");
        assert!(matches!(err, Error::ConfigParse { .. }));
    }

    #[test]
    fn test_unknown_mode_rejected() {
        assert!(Config::from_toml_str("[action]\nmode = \"later\"\n").is_err());
    }

    #[test]
    fn test_empty_shell_invalid() {
        let mut config = Config::default();
        config.action.shell = Some("  ".to_string());
        assert!(matches!(
            config.validate(),
            Err(Error::ConfigInvalid { ref field, .. }) if field == "action.shell"
        ));
    }

    #[test]
    fn test_nul_in_command_invalid() {
        let mut config = Config::default();
        config.action.command = Some("echo \0".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_values_read_as_unset() {
        let mut config = Config::default();
        config.predicate.constraint_name = Some(String::new());
        config.action.command = Some("   ".to_string());
        assert_eq!(config.target_constraint_name(), None);
        assert_eq!(config.action_command(), None);
    }

    #[test]
    fn test_apply_settings_overrides() {
        let mut config = Config::default();
        config.apply_settings(&settings(&[
            (CONSTRAINT_NAME_SETTING, "orders_pkey"),
            (ACTION_SCRIPT_SETTING, "/bin/true"),
        ]));
        assert_eq!(config.target_constraint_name(), Some("orders_pkey"));
        assert_eq!(config.action_command(), Some("/bin/true"));
    }

    #[test]
    fn test_apply_settings_empty_script_disables_action() {
        let mut config = Config::default();
        config.action.command = Some("/bin/true".to_string());
        config.apply_settings(&settings(&[(ACTION_SCRIPT_SETTING, "")]));
        assert_eq!(config.action.command, None);
    }

    #[test]
    fn test_apply_settings_absent_keys_leave_config() {
        let mut config = Config::default();
        config.apply_settings(&settings(&[("unrelated", "x")]));
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_apply_conf_file() {
        let conf = ConfFile::parse("detect_conflict.constraint_name = 'orders_pkey'\n")
            .expect("parse");
        let mut config = Config::default();
        config.apply_settings(&conf);
        assert_eq!(config.target_constraint_name(), Some("orders_pkey"));
    }

    #[test]
    fn test_load_from_missing_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let err = Config::load_from(&dir.path().join(CONFIG_FILE_NAME)).expect_err("missing");
        assert!(matches!(err, Error::ConfigNotFound { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[predicate]\nconstraint_name = \"k\"\n").expect("write");
        let config = Config::load_from(&path).expect("load");
        assert_eq!(config.target_constraint_name(), Some("k"));
    }

    #[test]
    fn test_default_toml_generation() {
        let toml = Config::default_toml();
        assert!(toml.contains("[predicate]"));
        assert!(toml.contains("[action]"));
        assert!(toml.contains(DEFAULT_CONSTRAINT_NAME));
        assert_eq!(Config::from_toml_str(&toml).expect("reparse"), Config::default());
    }
}
