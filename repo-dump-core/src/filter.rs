//! Path filtering: ignore prefixes plus an optional user pattern.

use regex::Regex;

use crate::config::ConfigError;

/// Directories that are almost never useful in a text dump.
/// Each entry ends with `/` so that only whole leading segments match.
pub const COMMON_IGNORE_PREFIXES: &[&str] = &[
    ".git/",
    "node_modules/",
    "target/",
    "dist/",
    "build/",
    "vendor/",
    "__pycache__/",
    ".venv/",
    "venv/",
    ".next/",
    ".idea/",
    ".vscode/",
    "coverage/",
];

/// Compiled candidate filter. Build it once per dump with [`PathFilter::new`].
#[derive(Debug, Clone)]
pub struct PathFilter {
    ignore_prefixes: Vec<String>,
    pattern: Option<Regex>,
}

impl PathFilter {
    /// Compiles `pattern` and assembles the active ignore set.
    ///
    /// An invalid pattern is a configuration error and nothing is fetched.
    pub fn new(
        ignore_common_dirs: bool,
        extra_ignore_prefixes: &[String],
        pattern: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let mut ignore_prefixes: Vec<String> = Vec::new();
        if ignore_common_dirs {
            ignore_prefixes.extend(COMMON_IGNORE_PREFIXES.iter().map(|p| (*p).to_string()));
        }
        ignore_prefixes.extend(
            extra_ignore_prefixes
                .iter()
                .filter(|p| !p.is_empty())
                .cloned(),
        );

        let pattern = match pattern {
            Some(raw) => Some(Regex::new(raw).map_err(|source| ConfigError::InvalidPattern {
                pattern: raw.to_string(),
                source,
            })?),
            None => None,
        };

        Ok(Self {
            ignore_prefixes,
            pattern,
        })
    }

    /// Raw string prefix match, not a glob or segment match.
    pub fn is_ignored(&self, path: &str) -> bool {
        self.ignore_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }

    /// Unanchored search over the full path.
    pub fn matches_pattern(&self, path: &str) -> bool {
        self.pattern.as_ref().map_or(true, |re| re.is_match(path))
    }

    pub fn is_candidate(&self, path: &str) -> bool {
        !self.is_ignored(path) && self.matches_pattern(path)
    }
}
