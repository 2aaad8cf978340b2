#![allow(dead_code)]
// Shared fixtures for the engine and session integration tests.

use std::sync::{Arc, Mutex};

use repo_dump_core::cache::{CacheKey, SnapshotCache};
use repo_dump_core::config::{DumpConfig, RepositoryLocator};
use repo_dump_core::contract::{ClientError, MockRepositoryClient, TreeEntry};

pub const OWNER: &str = "octo";
pub const REPO: &str = "demo";
pub const REF: &str = "main";

/// Paths passed to `get_file_content`, in call order.
pub type FetchLog = Arc<Mutex<Vec<String>>>;

pub fn config() -> DumpConfig {
    let mut config = DumpConfig::new(RepositoryLocator::new(OWNER, REPO).unwrap());
    config.reference = Some(REF.to_string());
    config
}

pub fn key() -> CacheKey {
    CacheKey::new(OWNER, REPO, REF)
}

pub fn snapshot(files: &[(&str, &str)], commit: Option<&str>) -> SnapshotCache {
    let mut cache = SnapshotCache::empty(&key());
    for (path, text) in files {
        cache.insert(*path, *text);
    }
    cache.commit = commit.map(str::to_string);
    cache
}

pub fn expect_listing(mock: &mut MockRepositoryClient, entries: Vec<TreeEntry>) {
    mock.expect_list_tree()
        .returning(move |_, _, _| Ok(entries.clone()));
}

pub fn expect_blobs(mock: &mut MockRepositoryClient, paths: &[&str]) {
    let entries = paths.iter().map(|p| TreeEntry::blob(*p, None)).collect();
    expect_listing(mock, entries);
}

pub fn expect_revision(mock: &mut MockRepositoryClient, revision: &'static str) {
    mock.expect_get_latest_revision()
        .returning(move |_, _, _| Ok(revision.to_string()));
}

/// Serves `files` as content; any other path is a 404.
pub fn expect_contents(mock: &mut MockRepositoryClient, files: &[(&str, &[u8])]) -> FetchLog {
    let files: Vec<(String, Vec<u8>)> = files
        .iter()
        .map(|(p, b)| (p.to_string(), b.to_vec()))
        .collect();
    let log: FetchLog = Arc::new(Mutex::new(Vec::new()));
    let seen = log.clone();
    mock.expect_get_file_content()
        .returning(move |_, _, path, _| {
            seen.lock().unwrap().push(path.to_string());
            files
                .iter()
                .find(|(p, _)| p == path)
                .map(|(_, bytes)| bytes.clone())
                .ok_or_else(|| ClientError::NotFound(path.to_string()))
        });
    log
}

pub fn fetched(log: &FetchLog) -> Vec<String> {
    log.lock().unwrap().clone()
}
