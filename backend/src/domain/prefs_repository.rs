use std::sync::Arc;

use anyhow::Result;
use log::{debug, warn};
use shared::Prefs;
use tokio::sync::broadcast;

use super::clock::Clock;
use super::events::{ChangeFeed, PrefsEvent};
use super::fallback::FallbackExecutor;
use crate::storage::local::LocalPrefsRepository;
use crate::storage::remote::RemotePrefsRepository;

/// Per-owner notification and sound preferences. Writes that miss the remote
/// store are kept locally and not queued; the next successful write wins.
#[derive(Clone)]
pub struct PrefsRepository {
    executor: FallbackExecutor,
    remote: RemotePrefsRepository,
    local: LocalPrefsRepository,
    clock: Arc<dyn Clock>,
    feed: ChangeFeed<PrefsEvent>,
}

impl PrefsRepository {
    pub fn new(
        executor: FallbackExecutor,
        remote: RemotePrefsRepository,
        local: LocalPrefsRepository,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            executor,
            remote,
            local,
            clock,
            feed: ChangeFeed::new(),
        }
    }

    pub async fn get(&self, owner_id: &str) -> Result<Prefs> {
        let remote = &self.remote;
        let local = &self.local;
        let result = self
            .executor
            .run(
                "prefs.get",
                move || async move {
                    let prefs = remote.get(owner_id).await?;
                    if let Err(e) = local.set(owner_id, &prefs) {
                        warn!("Could not cache prefs for {}: {:#}", owner_id, e);
                    }
                    Ok(prefs)
                },
                move || async move { local.get(owner_id) },
            )
            .await?;
        Ok(result.value)
    }

    pub async fn set(&self, owner_id: &str, prefs: Prefs) -> Result<()> {
        let now = self.clock.now();
        let remote = &self.remote;
        let local = &self.local;
        let wanted = &prefs;
        let result = self
            .executor
            .run(
                "prefs.set",
                move || async move {
                    remote.set(owner_id, wanted, now).await?;
                    if let Err(e) = local.set(owner_id, wanted) {
                        warn!("Could not cache prefs for {}: {:#}", owner_id, e);
                    }
                    Ok(())
                },
                move || async move { local.set(owner_id, wanted) },
            )
            .await?;

        debug!("Saved prefs for {} ({})", owner_id, result.source);
        self.feed.publish(PrefsEvent::Changed {
            owner_id: owner_id.to_string(),
            prefs,
        });
        Ok(())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PrefsEvent> {
        self.feed.subscribe()
    }
}
