//! User configuration (`~/.reval/config.toml`).

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::eval::driver::PANIC_STATUS;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Run the import fixer after every input.
    pub auto_import: bool,
    /// Print values with `{:#?}`.
    pub pretty: bool,
    pub toolchain: ToolchainConfig,
    pub doc: DocConfig,
}

/// How programs are compiled and run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ToolchainConfig {
    /// Compiler executable.
    pub rustc: String,
    /// Language edition passed to the compiler.
    pub edition: String,
    /// Extra compiler arguments.
    pub args: Vec<String>,
    /// Exit status of the run step that counts as a runtime fault.
    pub fault_status: i32,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            rustc: "rustc".to_string(),
            edition: "2021".to_string(),
            args: Vec::new(),
            fault_status: PANIC_STATUS,
        }
    }
}

/// The documentation viewer used by `:doc`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DocConfig {
    /// Program and leading arguments; the topic path is appended.
    pub command: Vec<String>,
}

impl Default for DocConfig {
    fn default() -> Self {
        Self {
            command: vec!["rustup".to_string(), "doc".to_string()],
        }
    }
}

/// Load the configuration from `explicit`, `$REVAL_CONFIG` or
/// `~/.reval/config.toml`, in that order.
///
/// Returns the default configuration if the file does not exist or cannot
/// be parsed.
#[must_use]
pub fn load_config(explicit: Option<&Path>) -> Config {
    let path = explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os("REVAL_CONFIG").map(PathBuf::from))
        .or_else(config_path);
    let Some(path) = path else {
        return Config::default();
    };
    match std::fs::read_to_string(&path) {
        Ok(text) => parse_config(&text).unwrap_or_else(|err| {
            tracing::warn!(path = %path.display(), %err, "ignoring invalid configuration");
            Config::default()
        }),
        Err(_) => Config::default(),
    }
}

/// Parse configuration text.
///
/// # Errors
///
/// Returns the TOML error for malformed input.
pub fn parse_config(text: &str) -> Result<Config, toml::de::Error> {
    toml::from_str(text)
}

/// Return the path to `~/.reval/config.toml`, or `None` if `$HOME` is unset.
fn config_path() -> Option<PathBuf> {
    reval_home().map(|dir| dir.join("config.toml"))
}

/// `~/.reval`, or `None` if `$HOME` is unset.
#[must_use]
pub fn reval_home() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".reval"))
}

/// Where the line editor keeps its history: `$REVAL_HISTORY` or
/// `~/.reval/history`.
#[must_use]
pub fn history_path() -> Option<PathBuf> {
    std::env::var_os("REVAL_HISTORY")
        .map(PathBuf::from)
        .or_else(|| reval_home().map(|dir| dir.join("history")))
}
