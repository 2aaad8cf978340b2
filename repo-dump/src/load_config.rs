//! `load_config` module: optional YAML defaults for the `repo-dump` CLI.
//!
//! A config file is never required. When given, it supplies defaults for the
//! settings a user tends to keep across runs (ignore rules, size ceiling,
//! concurrency, cache location, API host). Flags on the command line always win.
//!
//! ```yaml
//! ignore_common_dirs: true
//! extra_ignore:
//!   - docs/generated/
//! max_file_size: 524288
//! concurrency: 4
//! cache_dir: ~/.cache/repo-dump
//! api_url: https://github.example.com/api/v3
//! persist_on_cancel: false
//! ```
//!
//! Tokens are deliberately not read from this file; use `GITHUB_TOKEN` or `--token`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// Name of the per-user cache subdirectory.
pub const CACHE_DIR_NAME: &str = "repo-dump";

#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CliConfig {
    #[serde(default)]
    pub ignore_common_dirs: Option<bool>,
    #[serde(default)]
    pub extra_ignore: Vec<String>,
    #[serde(default)]
    pub max_file_size: Option<u64>,
    #[serde(default)]
    pub concurrency: Option<usize>,
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default)]
    pub persist_on_cancel: Option<bool>,
}

/// Loads a YAML config file. An empty file yields all defaults.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(e).with_context(|| format!("Failed to read config file {path_ref:?}"));
        }
    };

    if content.trim().is_empty() {
        info!(config_path = ?path_ref, "Config file is empty, using defaults");
        return Ok(CliConfig::default());
    }

    let mut config: CliConfig = match serde_yaml::from_str(&content) {
        Ok(config) => config,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML {path_ref:?}: {e}"));
        }
    };
    config.cache_dir = config.cache_dir.map(expand_home);

    info!(config_path = ?path_ref, ?config, "Parsed config YAML successfully");
    Ok(config)
}

/// `<user cache dir>/repo-dump`, when the platform has a cache dir.
pub fn default_cache_dir() -> Option<PathBuf> {
    dirs::cache_dir().map(|dir| dir.join(CACHE_DIR_NAME))
}

/// Picks the cache directory: explicit flag, then config file, then the platform default.
pub fn resolve_cache_dir(flag: Option<&Path>, config: &CliConfig) -> Result<PathBuf> {
    flag.map(Path::to_path_buf)
        .or_else(|| config.cache_dir.clone())
        .or_else(default_cache_dir)
        .context("No cache directory available on this platform; pass --cache-dir")
}

fn expand_home(path: PathBuf) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path,
        },
        Err(_) => path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tilde_is_expanded_against_home() {
        let expanded = expand_home(PathBuf::from("~/cache/rd"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expanded, home.join("cache/rd"));
        }
        assert_eq!(expand_home(PathBuf::from("/abs/x")), PathBuf::from("/abs/x"));
    }

    #[test]
    fn test_flag_beats_config_for_cache_dir() {
        let config = CliConfig {
            cache_dir: Some(PathBuf::from("/from/config")),
            ..CliConfig::default()
        };
        let dir = resolve_cache_dir(Some(Path::new("/from/flag")), &config).unwrap();
        assert_eq!(dir, PathBuf::from("/from/flag"));
        let dir = resolve_cache_dir(None, &config).unwrap();
        assert_eq!(dir, PathBuf::from("/from/config"));
    }
}
