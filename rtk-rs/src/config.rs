//! Runtime configuration for a session.
//!
//! Values are layered, later sources overriding earlier ones:
//!
//! | Source       | Form                                                 |
//! |--------------|------------------------------------------------------|
//! | defaults     | [`Config::default`]                                  |
//! | config file  | `key = value` lines, `#` or `;` comments             |
//! | environment  | `RTK_DUMP_COMMANDS`, `RTK_DONT_EVALUATE`, `RTK_NAMESPACE` |
//! | command line | `-d`, `-n` (see `cli.rs`)                            |
//!
//! Recognised keys: `dump_commands`, `evaluate`, `namespace`.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Result, TkError};

// ── Public API ────────────────────────────────────────────────────────────────

/// A non-fatal error encountered while loading configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigError {
    /// 1-based line number; 0 for values that did not come from a file.
    pub line: usize,
    pub message: String,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.line == 0 {
            f.write_str(&self.message)
        } else {
            write!(f, "line {}: {}", self.line, self.message)
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Copy every submitted command to the dump stream.
    pub dump_commands: bool,
    /// Actually submit commands.  Off means record-only: commands are
    /// dumped and every result is empty.
    pub evaluate: bool,
    /// Private namespace holding generated command and variable names.
    pub namespace: String,
}

impl Default for Config {
    fn default() -> Self {
        Self { dump_commands: false, evaluate: true, namespace: "rtk".to_owned() }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by the process environment.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        for e in config.apply_env() {
            tracing::warn!(target: "rtk::config", "ignoring environment: {e}");
        }
        config
    }

    /// Parse a config string on top of the defaults.
    ///
    /// Returns the config and any problems with individual lines; a bad
    /// line leaves the corresponding field unchanged.
    pub fn load_str(s: &str) -> (Self, Vec<ConfigError>) {
        let mut config = Self::default();
        let errors = config.apply_str(s);
        (config, errors)
    }

    /// Read and parse a config file from disk.
    pub fn load_file(path: &Path) -> std::io::Result<(Self, Vec<ConfigError>)> {
        let s = std::fs::read_to_string(path)?;
        Ok(Self::load_str(&s))
    }

    /// Apply `key = value` lines to `self`.
    pub fn apply_str(&mut self, s: &str) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        for (i, raw) in s.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                errors.push(ConfigError {
                    line: i + 1,
                    message: format!("expected `key = value`, got `{line}`"),
                });
                continue;
            };
            if let Err(message) = self.set(key.trim(), unquote(value.trim())) {
                errors.push(ConfigError { line: i + 1, message });
            }
        }

        errors
    }

    /// Apply `RTK_*` variables from the process environment.
    pub fn apply_env(&mut self) -> Vec<ConfigError> {
        self.apply_env_from(|name| std::env::var(name).ok())
    }

    /// Apply `RTK_*` variables looked up through `lookup`.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let mut record = |r: std::result::Result<(), String>| {
            if let Err(message) = r {
                errors.push(ConfigError { line: 0, message });
            }
        };
        // Presence alone enables these two, as with a compile-time define.
        if let Some(v) = lookup("RTK_DUMP_COMMANDS") {
            record(parse_flag_or_set(&v).map(|b| self.dump_commands = b));
        }
        if let Some(v) = lookup("RTK_DONT_EVALUATE") {
            record(parse_flag_or_set(&v).map(|b| self.evaluate = !b));
        }
        if let Some(v) = lookup("RTK_NAMESPACE") {
            record(self.set("namespace", &v));
        }
        errors
    }

    /// Check invariants a session relies on.
    pub fn validate(&self) -> Result<()> {
        if is_identifier(&self.namespace) {
            Ok(())
        } else {
            Err(TkError::Config(format!(
                "namespace must be a plain identifier, got \"{}\"",
                self.namespace
            )))
        }
    }

    /// Prefix of generated callback command names (`rtk::callback`).
    pub fn callback_prefix(&self) -> String {
        format!("{}::callback", self.namespace)
    }

    /// Prefix of generated linked variable names (`rtk::variable`).
    pub fn variable_prefix(&self) -> String {
        format!("{}::variable", self.namespace)
    }

    fn set(&mut self, key: &str, value: &str) -> std::result::Result<(), String> {
        match key {
            "dump_commands" => self.dump_commands = parse_bool(key, value)?,
            "evaluate" => self.evaluate = parse_bool(key, value)?,
            "namespace" => {
                if !is_identifier(value) {
                    return Err(format!("invalid namespace `{value}`"));
                }
                self.namespace = value.to_owned();
            }
            _ => return Err(format!("unknown key `{key}`")),
        }
        Ok(())
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn is_identifier(s: &str) -> bool {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(s))
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

fn parse_bool(key: &str, value: &str) -> std::result::Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(format!("`{key}` expects a boolean, got `{value}`")),
    }
}

/// Environment flags: empty means "set", otherwise a boolean.
fn parse_flag_or_set(value: &str) -> std::result::Result<bool, String> {
    if value.is_empty() {
        Ok(true)
    } else {
        parse_bool("environment flag", value)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn defaults() {
        let c = Config::default();
        assert!(!c.dump_commands);
        assert!(c.evaluate);
        assert_eq!(c.callback_prefix(), "rtk::callback");
        assert_eq!(c.variable_prefix(), "rtk::variable");
        assert!(c.validate().is_ok());
    }

    #[test]
    fn key_value_lines() {
        let (c, errs) = Config::load_str(
            "# comment\n; another\n\ndump_commands = yes\nevaluate=false\nnamespace = \"App\"\n",
        );
        assert!(errs.is_empty(), "{errs:?}");
        assert!(c.dump_commands);
        assert!(!c.evaluate);
        assert_eq!(c.namespace, "App");
    }

    #[test]
    fn bad_lines_are_reported_and_skipped() {
        let (c, errs) = Config::load_str("evaluate = maybe\ncolour = red\nnot a pair\nnamespace = a b\n");
        assert_eq!(errs.len(), 4);
        assert_eq!(errs[0].line, 1);
        assert_eq!(errs[1].to_string(), "line 2: unknown key `colour`");
        assert_eq!(errs[3].line, 4);
        assert_eq!(c, Config::default());
    }

    #[test]
    fn environment_overrides() {
        let env: HashMap<&str, &str> =
            HashMap::from([("RTK_DUMP_COMMANDS", ""), ("RTK_DONT_EVALUATE", "1"), ("RTK_NAMESPACE", "T")]);
        let mut c = Config::default();
        let errs = c.apply_env_from(|k| env.get(k).map(|v| v.to_string()));
        assert!(errs.is_empty());
        assert!(c.dump_commands);
        assert!(!c.evaluate);
        assert_eq!(c.namespace, "T");
    }

    #[test]
    fn bad_environment_value() {
        let mut c = Config::default();
        let errs = c.apply_env_from(|k| (k == "RTK_NAMESPACE").then(|| "9bad".to_owned()));
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].line, 0);
        assert_eq!(c.namespace, "rtk");
    }

    #[test]
    fn validate_rejects_bad_namespace() {
        let c = Config { namespace: "a::b".into(), ..Config::default() };
        assert!(matches!(c.validate(), Err(TkError::Config(_))));
    }

    #[test]
    fn load_file_reads_disk() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "dump_commands = on").unwrap();
        let (c, errs) = Config::load_file(f.path()).unwrap();
        assert!(errs.is_empty());
        assert!(c.dump_commands);
    }

    #[test]
    fn load_file_missing_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load_file(&dir.path().join("nope.conf")).is_err());
    }
}
