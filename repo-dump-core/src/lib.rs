#![doc = "repo-dump-core: core logic library for repo-dump."]

//! This crate holds the incremental fetch-and-assemble pipeline that turns a
//! hosted repository into one annotated text document, plus the snapshot cache
//! that lets a second run fetch only what changed.
//!
//! # Usage
//! Build a [`config::DumpConfig`], pick a [`contract::RepositoryClient`]
//! (normally [`github::GithubClient`]) and either call [`dump::dump`] with a
//! snapshot you manage yourself, or [`session::run_dump`] with a
//! [`cache::CacheStore`].

pub mod cache;
pub mod cancel;
pub mod classify;
pub mod config;
pub mod contract;
pub mod dump;
pub mod filter;
pub mod github;
pub mod session;

pub use cache::{CacheKey, CacheStore, FileCacheStore, MemoryCacheStore, SnapshotCache};
pub use cancel::CancellationToken;
pub use config::{ConfigError, DumpConfig, RepositoryLocator};
pub use contract::{ClientError, RepositoryClient};
pub use dump::{dump, DumpError, DumpOutput, DumpStats, FetchOutcome};
