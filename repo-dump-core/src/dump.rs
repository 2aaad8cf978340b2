//! Incremental dump engine: listing → filter → cache/diff planning → fetch → document.
//!
//! This module is the orchestrator. Given a [`DumpConfig`], an optional prior
//! [`SnapshotCache`] and a [`RepositoryClient`], [`dump`]:
//!   - resolves the reference (explicit or the repository default)
//!   - lists the tree and narrows it to candidate blobs via the path filter
//!   - decides which cached texts can be trusted, using the host's revision diff
//!   - fetches and classifies everything else, one outcome per candidate
//!   - renders the concatenated document and returns the updated snapshot
//!
//! # Error Handling
//! Configuration, reference, listing and revision failures abort the dump and
//! leave the caller's cache untouched. Diff failures degrade to re-fetching every
//! candidate. Per-file failures become [`FetchOutcome::Failed`] sections and never
//! stop the batch. Cancellation returns [`DumpError::Cancelled`] holding the
//! snapshot as mutated so far; the caller decides whether to keep it.
//!
//! # Ordering
//! Sections always follow listing order. With `concurrency > 1` fetches overlap,
//! but results are consumed in order and each path's cache entry is written once.

use std::collections::HashSet;

use futures::stream::{self, StreamExt};
use tracing::{debug, error, info, warn};

use crate::cache::{CacheKey, SnapshotCache};
use crate::cancel::CancellationToken;
use crate::classify::{classify, Classification, SkipReason};
use crate::config::{ConfigError, DumpConfig, RepositoryLocator};
use crate::contract::{ChangeKind, ClientError, FileChange, RepositoryClient, TreeEntry};

/// Line framing every section header.
pub const SEPARATOR: &str =
    "--------------------------------------------------------------------------------";

/// A repository pinned to a concrete reference for the duration of one dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryRef {
    pub owner: String,
    pub name: String,
    pub reference: String,
}

impl RepositoryRef {
    pub fn cache_key(&self) -> CacheKey {
        CacheKey::new(&self.owner, &self.name, &self.reference)
    }
}

impl std::fmt::Display for RepositoryRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}@{}", self.owner, self.name, self.reference)
    }
}

/// What happened to one candidate file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Included {
        path: String,
        text: String,
        byte_size: u64,
        /// Served from the snapshot without a network call.
        from_cache: bool,
    },
    Skipped {
        path: String,
        reason: SkipReason,
    },
    Failed {
        path: String,
        message: String,
        rate_limited: bool,
    },
}

impl FetchOutcome {
    pub fn path(&self) -> &str {
        match self {
            FetchOutcome::Included { path, .. }
            | FetchOutcome::Skipped { path, .. }
            | FetchOutcome::Failed { path, .. } => path,
        }
    }

    pub fn is_included(&self) -> bool {
        matches!(self, FetchOutcome::Included { .. })
    }
}

/// One rendered unit of the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Size reported by the listing, identical for fetched and reused text.
    pub size: Option<u64>,
    pub outcome: FetchOutcome,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DumpStats {
    pub included: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Included sections served from the snapshot.
    pub reused: usize,
    /// Content requests issued.
    pub fetched: usize,
    /// Number of candidates.
    pub total: usize,
    /// Files held by the returned snapshot.
    pub cached_count: usize,
}

#[derive(Debug, Clone)]
pub struct DumpOutput {
    pub repository: RepositoryRef,
    /// Latest revision observed; `None` when there was nothing to dump.
    pub revision: Option<String>,
    pub document: String,
    pub cache: SnapshotCache,
    pub stats: DumpStats,
    pub sections: Vec<Section>,
}

#[derive(Debug, thiserror::Error)]
pub enum DumpError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to resolve the default branch of {repository}")]
    ResolveReference {
        repository: String,
        #[source]
        source: ClientError,
    },

    #[error("failed to list files of {repository}")]
    ListTree {
        repository: String,
        #[source]
        source: ClientError,
    },

    #[error("failed to look up the latest revision of {repository}")]
    LatestRevision {
        repository: String,
        #[source]
        source: ClientError,
    },

    #[error("dump cancelled")]
    Cancelled { partial: Box<SnapshotCache> },
}

impl DumpError {
    pub fn is_rate_limited(&self) -> bool {
        match self {
            DumpError::ResolveReference { source, .. }
            | DumpError::ListTree { source, .. }
            | DumpError::LatestRevision { source, .. } => source.is_rate_limited(),
            DumpError::Config(_) | DumpError::Cancelled { .. } => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, DumpError::Cancelled { .. })
    }
}

/// Which cached texts may be reused for this dump.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ChangeSet {
    /// Cached revision equals the latest one.
    Unchanged,
    /// Only these paths changed since the cached revision.
    Paths(HashSet<String>),
    /// No usable diff: every candidate is fetched.
    Untrusted,
}

impl ChangeSet {
    fn trusts(&self, path: &str) -> bool {
        match self {
            ChangeSet::Unchanged => true,
            ChangeSet::Paths(changed) => !changed.contains(path),
            ChangeSet::Untrusted => false,
        }
    }
}

/// Pins `reference` (or the repository's default branch when `None`).
pub async fn resolve_reference<C>(
    client: &C,
    repository: &RepositoryLocator,
    reference: Option<&str>,
) -> Result<RepositoryRef, DumpError>
where
    C: RepositoryClient + ?Sized,
{
    let reference = match reference.map(str::trim).filter(|r| !r.is_empty()) {
        Some(explicit) => explicit.to_string(),
        None => client
            .get_default_reference(&repository.owner, &repository.name)
            .await
            .map_err(|source| {
                error!(repository = %repository, error = %source, "Failed to resolve default reference");
                DumpError::ResolveReference {
                    repository: repository.to_string(),
                    source,
                }
            })?,
    };
    Ok(RepositoryRef {
        owner: repository.owner.clone(),
        name: repository.name.clone(),
        reference,
    })
}

/// Runs one incremental dump. See the module docs for the failure model.
pub async fn dump<C>(
    client: &C,
    config: &DumpConfig,
    prior: Option<SnapshotCache>,
    cancel: &CancellationToken,
) -> Result<DumpOutput, DumpError>
where
    C: RepositoryClient + ?Sized,
{
    let filter = config.validate()?;
    config.trace_loaded();

    let repo = resolve_reference(client, &config.repository, config.reference.as_deref()).await?;
    let key = repo.cache_key();
    info!(repository = %repo, "[DUMP] Starting dump");

    let listing = client
        .list_tree(&repo.owner, &repo.name, &repo.reference)
        .await
        .map_err(|source| {
            error!(repository = %repo, error = %source, "[DUMP] Tree listing failed");
            DumpError::ListTree {
                repository: repo.to_string(),
                source,
            }
        })?;
    let listed = listing.len();
    let candidates: Vec<TreeEntry> = listing
        .into_iter()
        .filter(|entry| entry.is_blob() && filter.is_candidate(&entry.path))
        .collect();
    info!(listed, candidates = candidates.len(), "[DUMP] Filtered listing");

    let prior = prior.filter(|cache| {
        let matches = cache.key() == key;
        if !matches {
            warn!(expected = %key, found = %cache.key(), "[DUMP] Ignoring snapshot for a different key");
        }
        matches
    });

    if candidates.is_empty() {
        let cache = prior.unwrap_or_else(|| SnapshotCache::empty(&key));
        info!(repository = %repo, "[DUMP] No candidate files, nothing to fetch");
        return Ok(DumpOutput {
            repository: repo,
            revision: None,
            document: String::new(),
            stats: DumpStats {
                cached_count: cache.len(),
                ..DumpStats::default()
            },
            cache,
            sections: Vec::new(),
        });
    }

    let latest = client
        .get_latest_revision(&repo.owner, &repo.name, &repo.reference)
        .await
        .map_err(|source| {
            error!(repository = %repo, error = %source, "[DUMP] Revision lookup failed");
            DumpError::LatestRevision {
                repository: repo.to_string(),
                source,
            }
        })?;
    debug!(revision = %latest, "[DUMP] Latest revision");

    let (mut cache, changes) = match prior {
        Some(mut cache) => {
            let changes = plan_changes(client, &repo, &mut cache, &latest).await;
            (cache, changes)
        }
        None => {
            debug!(key = %key, "[DUMP] No prior snapshot, starting empty");
            (SnapshotCache::empty(&key), ChangeSet::Untrusted)
        }
    };

    // Decide reuse up front so the fetch stream does not borrow the cache.
    let planned: Vec<(TreeEntry, Option<String>)> = candidates
        .into_iter()
        .map(|entry| {
            let reused = if changes.trusts(&entry.path) {
                cache.get(&entry.path).map(str::to_string)
            } else {
                None
            };
            (entry, reused)
        })
        .collect();

    let candidate_paths: HashSet<String> =
        planned.iter().map(|(entry, _)| entry.path.clone()).collect();

    let mut stats = DumpStats {
        total: planned.len(),
        ..DumpStats::default()
    };
    let mut sections = Vec::with_capacity(planned.len());

    {
        let steps = stream::iter(planned)
            .map(|(entry, reused)| {
                process_candidate(client, &repo, entry, reused, config.max_file_size, cancel)
            })
            .buffered(config.concurrency.max(1));
        futures::pin_mut!(steps);

        while let Some(step) = steps.next().await {
            let section = match step {
                Step::Cancelled { path } => {
                    info!(path = %path, completed = sections.len(), "[DUMP] Cancelled before fetch");
                    return Err(DumpError::Cancelled {
                        partial: Box::new(cache),
                    });
                }
                Step::Done { section, fetched } => {
                    if fetched {
                        stats.fetched += 1;
                    }
                    section
                }
            };
            record(&mut cache, &mut stats, &section.outcome);
            sections.push(section);
        }
    }

    if changes == ChangeSet::Untrusted {
        // Nothing outside this listing was verified against `latest`.
        let before = cache.len();
        cache.files.retain(|path, _| candidate_paths.contains(path));
        let pruned = before - cache.len();
        if pruned > 0 {
            debug!(pruned, "[DUMP] Dropped snapshot entries not refreshed by this dump");
        }
    }
    cache.commit = Some(latest.clone());
    stats.cached_count = cache.len();
    let document = render_document(&sections);

    info!(
        repository = %repo,
        revision = %latest,
        included = stats.included,
        skipped = stats.skipped,
        failed = stats.failed,
        reused = stats.reused,
        fetched = stats.fetched,
        total = stats.total,
        "[DUMP] Dump complete"
    );

    Ok(DumpOutput {
        repository: repo,
        revision: Some(latest),
        document,
        cache,
        stats,
        sections,
    })
}

/// Works out which cached entries survive between the snapshot's revision and `latest`.
async fn plan_changes<C>(
    client: &C,
    repo: &RepositoryRef,
    cache: &mut SnapshotCache,
    latest: &str,
) -> ChangeSet
where
    C: RepositoryClient + ?Sized,
{
    let base = match cache.commit.as_deref() {
        Some(base) if base == latest => {
            info!(revision = latest, cached = cache.len(), "[DUMP] Snapshot is current");
            return ChangeSet::Unchanged;
        }
        Some(base) => base.to_string(),
        None => {
            debug!("[DUMP] Snapshot has no recorded revision, re-fetching everything");
            return ChangeSet::Untrusted;
        }
    };

    match client
        .diff_revisions(&repo.owner, &repo.name, &base, latest)
        .await
    {
        Ok(diff) => {
            let changed = apply_diff(cache, diff);
            info!(base = %base, head = latest, changed = changed.len(), "[DUMP] Computed changed paths");
            ChangeSet::Paths(changed)
        }
        Err(e) => {
            warn!(base = %base, head = latest, error = %e, "[DUMP] Revision diff failed, re-fetching every candidate");
            ChangeSet::Untrusted
        }
    }
}

/// Drops every path the diff touched from the snapshot and returns the set
/// of paths whose cached text must not be reused.
fn apply_diff(cache: &mut SnapshotCache, diff: Vec<FileChange>) -> HashSet<String> {
    let mut changed = HashSet::new();
    for change in diff {
        match change.kind {
            ChangeKind::Removed => {
                if cache.invalidate(&change.path) {
                    debug!(path = %change.path, "[DUMP] Removed from snapshot");
                }
            }
            ChangeKind::Renamed => {
                if let Some(previous) = change.previous_path.as_deref() {
                    if cache.invalidate(previous) {
                        debug!(from = previous, to = %change.path, "[DUMP] Renamed away from snapshot");
                    }
                }
                cache.invalidate(&change.path);
                changed.insert(change.path);
            }
            ChangeKind::Added | ChangeKind::Modified | ChangeKind::Other => {
                // Non-candidates are never refetched here, so their old text must go now.
                cache.invalidate(&change.path);
                changed.insert(change.path);
            }
        }
    }
    changed
}

enum Step {
    Done { section: Section, fetched: bool },
    Cancelled { path: String },
}

async fn process_candidate<C>(
    client: &C,
    repo: &RepositoryRef,
    entry: TreeEntry,
    reused: Option<String>,
    max_file_size: u64,
    cancel: &CancellationToken,
) -> Step
where
    C: RepositoryClient + ?Sized,
{
    if let Some(text) = reused {
        debug!(path = %entry.path, "[DUMP] Reusing cached text");
        // The cached text may be a lossy decoding; only the listing knows the real size.
        let byte_size = entry.size.unwrap_or(text.len() as u64);
        return Step::Done {
            section: Section {
                size: entry.size,
                outcome: FetchOutcome::Included {
                    path: entry.path,
                    text,
                    byte_size,
                    from_cache: true,
                },
            },
            fetched: false,
        };
    }

    if cancel.is_cancelled() {
        return Step::Cancelled { path: entry.path };
    }

    let fetched = client
        .get_file_content(&repo.owner, &repo.name, &entry.path, &repo.reference)
        .await;
    let (size, outcome) = match fetched {
        Ok(bytes) => {
            let byte_size = bytes.len() as u64;
            let outcome = match classify(&bytes, max_file_size) {
                Classification::Text(text) => FetchOutcome::Included {
                    path: entry.path,
                    text,
                    byte_size,
                    from_cache: false,
                },
                Classification::Skipped(reason) => {
                    debug!(path = %entry.path, %reason, "[DUMP] Skipping file");
                    FetchOutcome::Skipped {
                        path: entry.path,
                        reason,
                    }
                }
            };
            (entry.size, outcome)
        }
        Err(ClientError::IsDirectory(_)) => {
            debug!(path = %entry.path, "[DUMP] Listed blob is a directory, skipping");
            (
                entry.size,
                FetchOutcome::Skipped {
                    path: entry.path,
                    reason: SkipReason::NotAFile,
                },
            )
        }
        Err(e) => {
            warn!(path = %entry.path, error = %e, "[DUMP] Fetch failed, continuing with next file");
            (
                entry.size,
                FetchOutcome::Failed {
                    path: entry.path,
                    message: e.to_string(),
                    rate_limited: e.is_rate_limited(),
                },
            )
        }
    };
    Step::Done {
        section: Section { size, outcome },
        fetched: true,
    }
}

/// Applies one outcome to the snapshot and counters.
///
/// A path stays cached only while its latest outcome is `Included`, so a file
/// that turned binary or failed is never served stale on the next run.
fn record(cache: &mut SnapshotCache, stats: &mut DumpStats, outcome: &FetchOutcome) {
    match outcome {
        FetchOutcome::Included {
            path,
            text,
            from_cache,
            ..
        } => {
            stats.included += 1;
            if *from_cache {
                stats.reused += 1;
            } else {
                cache.insert(path.clone(), text.clone());
            }
        }
        FetchOutcome::Skipped { path, .. } => {
            stats.skipped += 1;
            cache.invalidate(path);
        }
        FetchOutcome::Failed { path, .. } => {
            stats.failed += 1;
            cache.invalidate(path);
        }
    }
}

/// Concatenates sections in order and trims the result.
pub fn render_document(sections: &[Section]) -> String {
    let mut out = String::new();
    for section in sections {
        render_section(&mut out, section);
    }
    out.trim().to_string()
}

fn render_section(out: &mut String, section: &Section) {
    let path = section.outcome.path();
    out.push_str(SEPARATOR);
    out.push('\n');
    match section.size {
        Some(size) => out.push_str(&format!("# FILE: {path} ({size} bytes)\n")),
        None => out.push_str(&format!("# FILE: {path}\n")),
    }
    out.push_str(SEPARATOR);
    out.push('\n');
    match &section.outcome {
        FetchOutcome::Included { text, .. } => out.push_str(text),
        FetchOutcome::Skipped { path, reason } => {
            out.push_str(&format!("# Skipped: {path} ({reason})"));
        }
        FetchOutcome::Failed { message, .. } => out.push_str(&format!("# Error: {message}")),
    }
    out.push_str("\n\n");
}
