//! Layered configuration.
//!
//! Settings are resolved from four sources, each overriding the previous:
//!
//! 1. compiled-in defaults ([`Setting`]),
//! 2. the global file shared by all scripts ([`GLOBAL_CONFIG_FILE`]),
//! 3. the script's own file (`<script>.conf`),
//! 4. command line overrides, applied in the order given.
//!
//! Files use `KEY=VALUE` lines. Blank lines and lines starting with `#` are
//! skipped, and a single pair of matching surrounding quotes is removed from
//! the value. Everything is kept as a string; typed accessors on [`Config`]
//! parse on demand.

use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

/// Name of the configuration file shared by all scripts.
pub const GLOBAL_CONFIG_FILE: &str = "typo3scripts.conf";

/// A documented setting with its compiled-in default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Setting {
    pub key: &'static str,
    pub default: &'static str,
    pub description: &'static str,
}

impl Setting {
    pub const fn new(key: &'static str, default: &'static str, description: &'static str) -> Self {
        Self {
            key,
            default,
            description,
        }
    }
}

/// What to do with a key in a file that no default declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnknownKeys {
    /// Store it like any other setting.
    Keep,
    /// Skip it.
    Ignore,
    /// Fail with a configuration error.
    Reject,
}

/// The resolved, immutable configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Config {
    values: BTreeMap<String, String>,
}

impl Config {
    /// Raw value of a setting.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Raw value of a setting, or the empty string if unset.
    pub fn string(&self, key: &str) -> &str {
        self.get(key).unwrap_or("")
    }

    /// Value of a setting if it is set and non-empty.
    pub fn non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|value| !value.is_empty())
    }

    /// A `true`/`false` setting. Unset reads as false.
    pub fn flag(&self, key: &str) -> Result<bool> {
        match self.get(key) {
            None | Some("false") => Ok(false),
            Some("true") => Ok(true),
            Some(other) => Err(Error::config(
                key,
                format!("expected 'true' or 'false', got '{}'", other),
            )),
        }
    }

    /// A non-negative integer setting.
    pub fn usize(&self, key: &str) -> Result<usize> {
        let value = self.string(key);
        value.trim().parse::<usize>().map_err(|_| {
            Error::config(
                key,
                format!("expected a non-negative integer, got '{}'", value),
            )
        })
    }

    /// Iterate over all settings in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Accumulates configuration layers in precedence order.
#[derive(Debug, Clone)]
pub struct Resolver {
    values: BTreeMap<String, String>,
}

impl Resolver {
    /// Start from compiled-in defaults.
    pub fn new(defaults: &[Setting]) -> Self {
        let values = defaults
            .iter()
            .map(|s| (s.key.to_string(), s.default.to_string()))
            .collect();
        Self { values }
    }

    /// Layer a configuration file on top, if it exists.
    ///
    /// Returns `false` if there is no file at `path`. A file that exists but
    /// cannot be read is an error.
    pub fn source_file(&mut self, path: &Path, unknown: UnknownKeys) -> Result<bool> {
        let origin = path.display().to_string();
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::debug!("No configuration at {}", origin);
                return Ok(false);
            }
            Err(e) => {
                return Err(Error::config(
                    origin,
                    format!("unable to read file ({}); check permissions", e),
                ));
            }
        };

        log::info!("Sourcing script configuration from {}", origin);
        self.source_text(&origin, &text, unknown)?;
        Ok(true)
    }

    /// Layer configuration text on top. `origin` names the source in errors.
    pub fn source_text(&mut self, origin: &str, text: &str, unknown: UnknownKeys) -> Result<()> {
        for (index, line) in text.lines().enumerate() {
            let Some(entry) = parse_line(line) else {
                continue;
            };
            let (key, value) =
                entry.map_err(|reason| Error::config(format!("{}:{}", origin, index + 1), reason))?;

            if !self.values.contains_key(key) {
                match unknown {
                    UnknownKeys::Keep => {}
                    UnknownKeys::Ignore => {
                        log::debug!("{}:{}: ignoring unknown setting {}", origin, index + 1, key);
                        continue;
                    }
                    UnknownKeys::Reject => {
                        return Err(Error::config(
                            format!("{}:{}", origin, index + 1),
                            format!("unknown setting '{}'", key),
                        ));
                    }
                }
            }
            self.values.insert(key.to_string(), value.to_string());
        }
        Ok(())
    }

    /// Apply a single command line override.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Apply command line overrides in order; later ones win.
    pub fn apply<K, V>(&mut self, overrides: impl IntoIterator<Item = (K, V)>)
    where
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in overrides {
            self.set(key, value);
        }
    }

    /// Freeze the accumulated layers.
    pub fn finish(self) -> Config {
        Config {
            values: self.values,
        }
    }
}

/// Parse one config-file line.
///
/// Returns `None` for blank and comment lines.
fn parse_line(line: &str) -> Option<std::result::Result<(&str, &str), String>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let Some((key, value)) = line.split_once('=') else {
        return Some(Err(format!("expected KEY=VALUE, got '{}'", line)));
    };
    let key = key.trim();
    if key.is_empty() {
        return Some(Err("missing key before '='".to_string()));
    }
    Some(Ok((key, strip_quotes(value.trim()))))
}

fn strip_quotes(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Render defaults as a config file, one commented setting per entry.
pub fn export(settings: &[Setting]) -> String {
    let mut out = String::new();
    for setting in settings {
        out.push_str(&format!("# {}\n", setting.description));
        out.push_str(&format!("{}={}\n", setting.key, setting.default));
    }
    out
}
