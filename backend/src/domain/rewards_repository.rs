//! Reward catalog and redemptions.

use std::sync::Arc;

use anyhow::Result;
use log::{info, warn};
use shared::{Outcome, Redemption, RedemptionStatus, Reward, TxType};
use tokio::sync::broadcast;
use uuid::Uuid;

use super::clock::Clock;
use super::events::{ChangeFeed, RewardEvent};
use super::fallback::FallbackExecutor;
use super::kids_repository::KidsRepository;
use super::validation::ValidationError;
use crate::storage::local::LocalRewardRepository;
use crate::storage::remote::RemoteRewardRepository;

#[derive(Clone)]
pub struct RewardsRepository {
    executor: FallbackExecutor,
    remote: RemoteRewardRepository,
    local: LocalRewardRepository,
    kids: KidsRepository,
    clock: Arc<dyn Clock>,
    feed: ChangeFeed<RewardEvent>,
}

impl RewardsRepository {
    pub fn new(
        executor: FallbackExecutor,
        remote: RemoteRewardRepository,
        local: LocalRewardRepository,
        kids: KidsRepository,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            executor,
            remote,
            local,
            kids,
            clock,
            feed: ChangeFeed::new(),
        }
    }

    /// The family's catalog. Falls back to the cached copy, and to the default
    /// catalog when the family has none yet.
    pub async fn catalog_for_parent(&self, parent_id: &str) -> Result<Vec<Reward>> {
        let remote = &self.remote;
        let local = &self.local;
        let result = self
            .executor
            .run(
                "rewards.catalog_for_parent",
                move || async move {
                    let fresh = remote.catalog_for_parent(parent_id).await?;
                    if fresh.is_empty() {
                        return local.catalog_for_parent(parent_id);
                    }
                    if let Err(e) = local.write_catalog(parent_id, &fresh) {
                        warn!("Could not cache catalog for parent {}: {:#}", parent_id, e);
                    }
                    Ok(fresh)
                },
                move || async move { local.catalog_for_parent(parent_id) },
            )
            .await?;
        Ok(result.value)
    }

    /// Replace the family's catalog with `rewards`.
    pub async fn upsert_catalog(&self, parent_id: &str, rewards: Vec<Reward>) -> Result<()> {
        let rewards: Vec<Reward> = rewards
            .into_iter()
            .map(|r| Reward {
                parent_id: parent_id.to_string(),
                ..r
            })
            .collect();

        let remote = &self.remote;
        let local = &self.local;
        let catalog = &rewards;
        let result = self
            .executor
            .run(
                "rewards.upsert_catalog",
                move || async move {
                    remote.upsert_catalog(catalog).await?;
                    if let Err(e) = local.write_catalog(parent_id, catalog) {
                        warn!("Could not cache catalog for parent {}: {:#}", parent_id, e);
                    }
                    Ok(())
                },
                move || async move { local.write_catalog(parent_id, catalog) },
            )
            .await?;

        info!("Saved {} rewards for parent {} ({})", rewards.len(), parent_id, result.source);
        self.feed.publish(RewardEvent::catalog_updated(parent_id, &rewards));
        Ok(())
    }

    /// Exchange part of a kid's balance for a reward.
    ///
    /// The debit goes through the kids repository, so it is declined when the
    /// balance does not cover the price and it records a `redeem` entry. The
    /// redemption record is written afterwards; the two steps are not atomic.
    pub async fn redeem(&self, kid_id: &str, reward: &Reward) -> Result<Outcome<Redemption>> {
        if !reward.price.is_finite() || reward.price <= 0.0 {
            return Ok(ValidationError::InvalidAmount.into_outcome());
        }

        let debit = self
            .kids
            .credit(kid_id, -reward.price, TxType::Redeem, Some(reward.title.clone()))
            .await?;
        if !debit.ok {
            return Ok(Outcome::declined(
                debit.error.unwrap_or_else(|| "Redemption declined".to_string()),
            ));
        }

        let redemption = Redemption {
            id: Uuid::new_v4().to_string(),
            kid_id: kid_id.to_string(),
            reward_id: reward.id.clone(),
            title: reward.title.clone(),
            price: reward.price,
            status: RedemptionStatus::Approved,
            created_at: self.clock.now(),
        };

        let remote = &self.remote;
        let local = &self.local;
        let candidate = &redemption;
        let result = self
            .executor
            .run(
                "rewards.redeem",
                move || async move {
                    let stored = remote.insert_redemption(candidate).await?;
                    if let Err(e) = local.add_redemption(&stored) {
                        warn!("Could not cache redemption {}: {:#}", stored.id, e);
                    }
                    Ok(stored)
                },
                move || async move {
                    local.add_redemption(candidate)?;
                    Ok(candidate.clone())
                },
            )
            .await?;

        let redemption = result.value;
        info!(
            "Kid {} redeemed '{}' for {:.2} ({})",
            kid_id, redemption.title, redemption.price, result.source
        );
        self.feed.publish(RewardEvent::Redeemed(redemption.clone()));
        Ok(Outcome::success(redemption))
    }

    /// Redemptions of a kid, newest first.
    pub async fn list_redemptions(&self, kid_id: &str) -> Result<Vec<Redemption>> {
        let remote = &self.remote;
        let local = &self.local;
        let result = self
            .executor
            .run(
                "rewards.list_redemptions",
                move || async move {
                    let fresh = remote.list_redemptions(kid_id).await?;
                    if let Err(e) = local.replace_redemptions(kid_id, &fresh) {
                        warn!("Could not cache redemptions for kid {}: {:#}", kid_id, e);
                    }
                    Ok(fresh)
                },
                move || async move { local.list_redemptions(kid_id) },
            )
            .await?;
        Ok(result.value)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RewardEvent> {
        self.feed.subscribe()
    }
}
