//! Dump configuration: repository locators, defaults and fail-fast validation.
//!
//! Everything here is checked before the first network call. [`DumpConfig::validate`]
//! compiles the path filter once per dump.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::filter::PathFilter;

/// Default per-file byte ceiling (1 MiB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 1_048_576;

/// Errors detected before any network call.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid repository {0:?}: expected owner/name or a repository URL")]
    InvalidRepository(String),

    #[error("invalid path pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Owner/name pair identifying a hosted repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryLocator {
    pub owner: String,
    pub name: String,
    /// Reference embedded in a `/tree/<ref>` web URL, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_hint: Option<String>,
}

fn is_valid_segment(s: &str) -> bool {
    !s.is_empty()
        && s != "."
        && s != ".."
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

impl RepositoryLocator {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Result<Self, ConfigError> {
        let owner = owner.into();
        let name = name.into();
        if !is_valid_segment(&owner) || !is_valid_segment(&name) {
            return Err(ConfigError::InvalidRepository(format!("{owner}/{name}")));
        }
        Ok(Self {
            owner,
            name,
            reference_hint: None,
        })
    }

    /// Accepts `owner/name`, `https://github.com/owner/name[.git][/tree/<ref>]`,
    /// `github.com/owner/name` and `git@github.com:owner/name.git`.
    pub fn parse(input: &str) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::InvalidRepository(input.to_string());
        let trimmed = input.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(invalid());
        }

        let rest = if let Some(ssh) = trimmed.strip_prefix("git@") {
            ssh.split_once(':').map(|(_, path)| path).ok_or_else(invalid)?
        } else {
            let without_scheme = trimmed
                .strip_prefix("https://")
                .or_else(|| trimmed.strip_prefix("http://"))
                .unwrap_or(trimmed);
            let without_www = without_scheme
                .strip_prefix("www.")
                .unwrap_or(without_scheme);
            match without_www.split_once('/') {
                Some((host, path)) if host.contains('.') => path,
                _ if without_www != without_scheme || trimmed != without_scheme => {
                    return Err(invalid())
                }
                _ => without_www,
            }
        };

        let mut segments = rest.split('/');
        let owner = segments.next().ok_or_else(invalid)?;
        let name = segments.next().ok_or_else(invalid)?;
        let name = name.strip_suffix(".git").unwrap_or(name);

        let reference_hint = match segments.next() {
            None => None,
            Some("tree") | Some("blob") => {
                let reference = segments.collect::<Vec<_>>().join("/");
                if reference.is_empty() {
                    return Err(invalid());
                }
                Some(reference)
            }
            Some(_) => return Err(invalid()),
        };

        let mut locator = Self::new(owner, name).map_err(|_| invalid())?;
        locator.reference_hint = reference_hint;
        Ok(locator)
    }
}

impl fmt::Display for RepositoryLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Everything a single dump needs to know, with defaults already applied.
#[derive(Debug, Clone)]
pub struct DumpConfig {
    pub repository: RepositoryLocator,
    /// Branch, tag or commit; `None` resolves to the default branch.
    pub reference: Option<String>,
    /// Regular expression searched (unanchored) in every path.
    pub pattern: Option<String>,
    pub ignore_common_dirs: bool,
    pub extra_ignore_prefixes: Vec<String>,
    pub max_file_size: u64,
    /// Upper bound on simultaneous content fetches; 1 means strictly sequential.
    pub concurrency: usize,
}

impl DumpConfig {
    pub fn new(repository: RepositoryLocator) -> Self {
        let reference = repository.reference_hint.clone();
        Self {
            repository,
            reference,
            pattern: None,
            ignore_common_dirs: true,
            extra_ignore_prefixes: Vec::new(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            concurrency: 1,
        }
    }

    /// Compile the path filter. Fails fast on a bad pattern.
    pub fn validate(&self) -> Result<PathFilter, ConfigError> {
        let filter = PathFilter::new(
            self.ignore_common_dirs,
            &self.extra_ignore_prefixes,
            self.pattern.as_deref(),
        )?;
        debug!(?self, "Dump config validated");
        Ok(filter)
    }

    pub fn trace_loaded(&self) {
        info!(
            repository = %self.repository,
            reference = self.reference.as_deref().unwrap_or("<default>"),
            pattern = self.pattern.as_deref().unwrap_or("<none>"),
            max_file_size = self.max_file_size,
            concurrency = self.concurrency,
            "Loaded dump config"
        );
    }
}
