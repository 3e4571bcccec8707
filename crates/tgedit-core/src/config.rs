use std::{
    env, fs,
    path::{Path, PathBuf},
};

use crate::{errors::Error, Result};

/// Runtime defaults for the editor. Command-line flags override these.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub db_path: PathBuf,
    /// Channel id key in the archive; `None` falls back to the archive's
    /// active or only channel.
    pub channel: Option<String>,
    pub case_sensitive: bool,
    pub allow_boundary_crossing: bool,
    pub dry_run: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("messages.json"),
            channel: None,
            case_sensitive: true,
            allow_boundary_crossing: false,
            dry_run: false,
        }
    }
}

impl Config {
    /// Read `.env` (without overriding the process env), then the process env.
    pub fn load() -> Result<Self> {
        let loaded = apply_dotenv(Path::new(".env"));
        if loaded > 0 {
            tracing::debug!(keys = loaded, "loaded .env");
        }
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let db_path = match lookup("TGEDIT_DB_PATH") {
            Some(v) if v.trim().is_empty() => {
                return Err(Error::Config("TGEDIT_DB_PATH is set but empty".to_string()))
            }
            Some(v) => PathBuf::from(v.trim()),
            None => defaults.db_path,
        };

        let channel = match lookup("TGEDIT_CHANNEL") {
            Some(v) if v.trim().is_empty() => {
                return Err(Error::Config("TGEDIT_CHANNEL is set but empty".to_string()))
            }
            Some(v) => Some(v.trim().to_string()),
            None => None,
        };

        let flag = |key: &str, default: bool| -> Result<bool> {
            match lookup(key) {
                Some(v) => parse_bool(key, &v),
                None => Ok(default),
            }
        };

        Ok(Self {
            db_path,
            channel,
            case_sensitive: flag("TGEDIT_CASE_SENSITIVE", defaults.case_sensitive)?,
            allow_boundary_crossing: flag(
                "TGEDIT_ALLOW_BOUNDARY_CROSSING",
                defaults.allow_boundary_crossing,
            )?,
            dry_run: flag("TGEDIT_DRY_RUN", defaults.dry_run)?,
        })
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(Error::Config(format!("{key}: expected a boolean, got {other:?}"))),
    }
}

/// `KEY=value` pairs from a dotenv file. Blank lines, `#` comments and lines
/// without `=` are skipped; one layer of matching quotes is stripped.
fn parse_dotenv(contents: &str) -> Vec<(&str, &str)> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim(), unquote(value.trim())))
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|v| v.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}

/// Export dotenv pairs that are not already set. Returns how many were set.
fn apply_dotenv(path: &Path) -> usize {
    let Ok(contents) = fs::read_to_string(path) else {
        return 0;
    };
    let mut loaded = 0;
    for (key, value) in parse_dotenv(&contents) {
        if env::var_os(key).is_none() {
            env::set_var(key, value);
            loaded += 1;
        }
    }
    loaded
}
