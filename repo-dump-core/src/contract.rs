//! # contract: the remote repository interface consumed by the dump engine
//!
//! This module defines the [`RepositoryClient`] trait and the plain data types
//! that flow across it. The engine only ever talks to a repository host through
//! this trait, so the real HTTP adapter ([`crate::github::GithubClient`]) and test
//! doubles are interchangeable.
//!
//! ## Failure model
//! - Every method may fail with a [`ClientError`].
//! - The engine decides how fatal a failure is based on *which* call failed:
//!   metadata, listing and revision failures abort a dump; per-file content
//!   failures are isolated; diff failures degrade to a full re-fetch.
//!
//! ## Mocking & Testing
//! - The trait is annotated for `mockall`; enable the default
//!   `test-export-mocks` feature to get `MockRepositoryClient` in integration tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

/// Kind of object in a tree listing. Only blobs are dump candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Blob,
    Tree,
    /// Submodule pointers and anything else the host reports.
    #[serde(other)]
    Other,
}

/// One entry of a recursive tree listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    /// Slash-separated path relative to the repository root.
    pub path: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    #[serde(default)]
    pub size: Option<u64>,
}

impl TreeEntry {
    pub fn blob(path: impl Into<String>, size: Option<u64>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::Blob,
            size,
        }
    }

    pub fn tree(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::Tree,
            size: None,
        }
    }

    pub fn is_blob(&self) -> bool {
        self.kind == EntryKind::Blob
    }
}

/// How a single path changed between two revisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
    Renamed,
    /// `copied`, `changed`, `unchanged`: treated like a modification.
    #[serde(other)]
    Other,
}

/// One file-level entry of a revision diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub path: String,
    pub kind: ChangeKind,
    /// Set for renames.
    pub previous_path: Option<String>,
}

impl FileChange {
    pub fn new(path: impl Into<String>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
            previous_path: None,
        }
    }

    pub fn renamed(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            path: to.into(),
            kind: ChangeKind::Renamed,
            previous_path: Some(from.into()),
        }
    }
}

/// Errors raised by a [`RepositoryClient`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("rate limited by the repository host at {url}; supply an access token or wait for the limit to reset")]
    RateLimited { url: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{0} is a directory, not a file")]
    IsDirectory(String),

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("unexpected response from {url}: {message}")]
    Decode { url: String, message: String },
}

impl ClientError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ClientError::RateLimited { .. })
    }
}

/// Read-only access to a hosted repository.
///
/// Implementations must be cheap to share: the engine holds a shared reference
/// and may issue several content requests concurrently.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait RepositoryClient: Send + Sync {
    /// The repository's default branch name.
    async fn get_default_reference(&self, owner: &str, repo: &str) -> Result<String, ClientError>;

    /// Full recursive listing of `reference`, in host order.
    async fn list_tree(
        &self,
        owner: &str,
        repo: &str,
        reference: &str,
    ) -> Result<Vec<TreeEntry>, ClientError>;

    /// Revision id (commit sha) that `reference` currently points at.
    async fn get_latest_revision(
        &self,
        owner: &str,
        repo: &str,
        reference: &str,
    ) -> Result<String, ClientError>;

    /// Raw bytes of a single file.
    async fn get_file_content(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        reference: &str,
    ) -> Result<Vec<u8>, ClientError>;

    /// File-level changes between two revisions.
    async fn diff_revisions(
        &self,
        owner: &str,
        repo: &str,
        base: &str,
        head: &str,
    ) -> Result<Vec<FileChange>, ClientError>;
}
