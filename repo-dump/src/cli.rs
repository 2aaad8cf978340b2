//! # repo-dump CLI interface
//!
//! Command parsing and orchestration glue for the `repo-dump` binary. All of
//! the fetching, filtering, caching and rendering lives in [`repo_dump_core`];
//! this module maps flags and the optional YAML config onto a
//! [`DumpConfig`], wires up the GitHub client, the on-disk snapshot store and
//! Ctrl-C cancellation, and writes the document out.
//!
//! - `repo-dump dump <REPOSITORY>` prints the concatenated document to stdout
//!   (or `--output`) and a one-line summary to stderr.
//! - `repo-dump clear-cache` deletes every stored snapshot.
//!
//! Programmatic callers and integration tests use [`run`] with a constructed [`Cli`].

use crate::load_config::{load_config, resolve_cache_dir, CliConfig};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use repo_dump_core::cache::{CacheStore, FileCacheStore};
use repo_dump_core::cancel::CancellationToken;
use repo_dump_core::config::{DumpConfig, RepositoryLocator};
use repo_dump_core::dump::{dump, DumpError, DumpOutput, FetchOutcome};
use repo_dump_core::github::{GithubClient, DEFAULT_API_URL};
use repo_dump_core::session::{run_dump, SessionOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// CLI for repo-dump: flatten a hosted repository into one text document.
#[derive(Parser, Debug)]
#[clap(
    name = "repo-dump",
    version,
    about = "Concatenate the text files of a GitHub repository into one annotated document, fetching only what changed since the last run"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Dump a repository's text files into a single document
    Dump(DumpArgs),
    /// Delete every cached snapshot
    ClearCache {
        /// Cache directory (defaults to the user cache dir)
        #[clap(long, env = "REPO_DUMP_CACHE_DIR")]
        cache_dir: Option<PathBuf>,
        /// Optional YAML config file
        #[clap(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
pub struct DumpArgs {
    /// `owner/repo`, a GitHub URL, or `git@github.com:owner/repo.git`
    pub repository: String,
    /// Branch, tag or commit (defaults to the repository's default branch)
    #[clap(long = "ref")]
    pub reference: Option<String>,
    /// Only include paths matching this regular expression
    #[clap(long)]
    pub pattern: Option<String>,
    /// Do not skip the common dependency/build directories
    #[clap(long)]
    pub no_default_ignores: bool,
    /// Additional path prefix to skip (repeatable)
    #[clap(long = "ignore", value_name = "PREFIX")]
    pub ignore: Vec<String>,
    /// Skip files larger than this many bytes
    #[clap(long, value_name = "BYTES")]
    pub max_file_size: Option<u64>,
    /// Number of files fetched at once
    #[clap(long, value_name = "N")]
    pub concurrency: Option<usize>,
    /// Write the document here instead of stdout
    #[clap(long, short)]
    pub output: Option<PathBuf>,
    /// Optional YAML config file supplying defaults
    #[clap(long)]
    pub config: Option<PathBuf>,
    /// Snapshot cache directory (defaults to the user cache dir)
    #[clap(long, env = "REPO_DUMP_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,
    /// Neither read nor write the snapshot cache
    #[clap(long)]
    pub no_cache: bool,
    /// Keep the partially updated cache when interrupted
    #[clap(long)]
    pub keep_partial: bool,
    /// GitHub access token
    #[clap(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub token: Option<String>,
    /// API base URL, for GitHub Enterprise hosts
    #[clap(long, env = "GITHUB_API_URL")]
    pub api_url: Option<String>,
}

impl DumpArgs {
    /// Merge flags over the config file over built-in defaults.
    pub fn to_dump_config(&self, defaults: &CliConfig) -> Result<DumpConfig> {
        let repository = RepositoryLocator::parse(&self.repository)?;
        let mut config = DumpConfig::new(repository);

        if let Some(reference) = &self.reference {
            config.reference = Some(reference.clone());
        }
        config.pattern = self.pattern.clone();
        config.ignore_common_dirs = if self.no_default_ignores {
            false
        } else {
            defaults.ignore_common_dirs.unwrap_or(true)
        };
        config.extra_ignore_prefixes = defaults
            .extra_ignore
            .iter()
            .chain(self.ignore.iter())
            .cloned()
            .collect();
        if let Some(max) = self.max_file_size.or(defaults.max_file_size) {
            config.max_file_size = max;
        }
        if let Some(n) = self.concurrency.or(defaults.concurrency) {
            anyhow::ensure!(n > 0, "--concurrency must be at least 1");
            config.concurrency = n;
        }

        config.validate()?;
        Ok(config)
    }
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Dump(args) => run_dump_command(args).await,
        Commands::ClearCache { cache_dir, config } => {
            let defaults = load_optional_config(config.as_deref())?;
            let dir = resolve_cache_dir(cache_dir.as_deref(), &defaults)?;
            FileCacheStore::new(&dir)
                .clear_all()
                .with_context(|| format!("Failed to clear cache at {}", dir.display()))?;
            tracing::info!(command = "clear-cache", cache_dir = %dir.display(), "Cache cleared");
            eprintln!("Cleared snapshot cache at {}", dir.display());
            Ok(())
        }
    }
}

fn load_optional_config(path: Option<&Path>) -> Result<CliConfig> {
    match path {
        Some(path) => load_config(path),
        None => Ok(CliConfig::default()),
    }
}

async fn run_dump_command(args: DumpArgs) -> Result<()> {
    let defaults = load_optional_config(args.config.as_deref())?;
    let config = args.to_dump_config(&defaults)?;
    tracing::info!(command = "dump", repository = %config.repository, "Starting dump");

    let api_url = args
        .api_url
        .as_deref()
        .or(defaults.api_url.as_deref())
        .unwrap_or(DEFAULT_API_URL);
    let client = GithubClient::with_base_url(api_url, args.token.clone())
        .context("Failed to construct GitHub client")?;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping before the next fetch");
            trigger.cancel();
        }
    });

    let result = if args.no_cache {
        dump(&client, &config, None, &cancel).await
    } else {
        let dir = resolve_cache_dir(args.cache_dir.as_deref(), &defaults)?;
        let store = FileCacheStore::new(dir);
        let options = SessionOptions {
            persist_on_cancel: args.keep_partial || defaults.persist_on_cancel.unwrap_or(false),
        };
        run_dump(&client, &store, &config, &options, &cancel).await
    };
    let output = result.map_err(explain_dump_error)?;

    write_document(&output.document, args.output.as_deref())?;
    eprintln!("{}", summary_line(&output));
    let throttled = rate_limited_failures(&output);
    if throttled > 0 {
        eprintln!(
            "warning: {throttled} file(s) hit the GitHub rate limit; set GITHUB_TOKEN or pass --token and re-run to fill them in"
        );
    }
    Ok(())
}

fn write_document(document: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, document)
                .with_context(|| format!("Failed to write document to {}", path.display()))?;
            tracing::info!(path = %path.display(), bytes = document.len(), "Wrote document");
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(document.as_bytes())?;
            if !document.is_empty() {
                stdout.write_all(b"\n")?;
            }
            stdout.flush()?;
        }
    }
    Ok(())
}

fn explain_dump_error(err: DumpError) -> anyhow::Error {
    if err.is_rate_limited() {
        return anyhow::Error::new(err).context(
            "GitHub API rate limit exceeded; set GITHUB_TOKEN or pass --token, or wait for the limit to reset",
        );
    }
    match err {
        DumpError::Cancelled { partial } => anyhow::anyhow!(
            "Dump cancelled; {} file(s) were cached before stopping",
            partial.len()
        ),
        other => anyhow::Error::new(other),
    }
}

/// One-line human summary written to stderr after a dump.
pub fn summary_line(output: &DumpOutput) -> String {
    let stats = &output.stats;
    format!(
        "{} @ {}: {} included ({} from cache, {} fetched), {} skipped, {} failed, {} candidate(s)",
        output.repository,
        output.revision.as_deref().unwrap_or("-"),
        stats.included,
        stats.reused,
        stats.fetched,
        stats.skipped,
        stats.failed,
        stats.total,
    )
}

fn rate_limited_failures(output: &DumpOutput) -> usize {
    output
        .sections
        .iter()
        .filter(|s| {
            matches!(
                s.outcome,
                FetchOutcome::Failed {
                    rate_limited: true,
                    ..
                }
            )
        })
        .count()
}
