//! Caller-side orchestration: resolve → load snapshot → dump → persist.
//!
//! The engine never touches storage. [`run_dump`] is the layer that owns a
//! [`CacheStore`]: it picks the snapshot for the resolved (repository,
//! reference) pair, hands it to [`dump`], and persists whatever comes back.
//! Dumps for the same key must not run concurrently against one store.

use tracing::{info, warn};

use crate::cache::CacheStore;
use crate::cancel::CancellationToken;
use crate::config::DumpConfig;
use crate::contract::RepositoryClient;
use crate::dump::{dump, resolve_reference, DumpError, DumpOutput};

#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Keep the partially updated snapshot when a dump is cancelled.
    pub persist_on_cancel: bool,
}

/// Runs one dump against a persistent snapshot store.
///
/// The snapshot is saved after every completed dump, including dumps with
/// per-file failures. An unreadable stored snapshot is treated as absent, and
/// a failed save is logged without failing the dump.
pub async fn run_dump<C, S>(
    client: &C,
    store: &S,
    config: &DumpConfig,
    options: &SessionOptions,
    cancel: &CancellationToken,
) -> Result<DumpOutput, DumpError>
where
    C: RepositoryClient + ?Sized,
    S: CacheStore + ?Sized,
{
    // Fail on a bad pattern before the reference lookup touches the network.
    config.validate()?;

    let repo = resolve_reference(client, &config.repository, config.reference.as_deref()).await?;
    let key = repo.cache_key();

    let prior = match store.load(&key) {
        Ok(prior) => prior,
        Err(e) => {
            warn!(%key, error = %e, "Stored snapshot unreadable, starting from scratch");
            None
        }
    };
    info!(%key, cached = prior.as_ref().map_or(0, |c| c.len()), "Loaded snapshot");

    let mut pinned = config.clone();
    pinned.reference = Some(repo.reference);

    match dump(client, &pinned, prior, cancel).await {
        Ok(output) => {
            if let Err(e) = store.save(&output.cache) {
                warn!(%key, error = %e, "Failed to persist snapshot");
            }
            Ok(output)
        }
        Err(DumpError::Cancelled { partial }) => {
            if options.persist_on_cancel {
                info!(%key, files = partial.len(), "Persisting partial snapshot after cancellation");
                if let Err(e) = store.save(&partial) {
                    warn!(%key, error = %e, "Failed to persist partial snapshot");
                }
            }
            Err(DumpError::Cancelled { partial })
        }
        Err(e) => Err(e),
    }
}
