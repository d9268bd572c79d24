use std::sync::Arc;

use shared::{Redemption, Reward};

use super::{map_rows, tables};
use crate::storage::mappers::{RedemptionMapper, RewardMapper};
use crate::storage::traits::{Query, RemoteError, RemoteStore};

/// The remote `rewards` and `redemptions` tables.
#[derive(Clone)]
pub struct RemoteRewardRepository {
    store: Arc<dyn RemoteStore>,
}

impl RemoteRewardRepository {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self { store }
    }

    pub async fn catalog_for_parent(&self, parent_id: &str) -> Result<Vec<Reward>, RemoteError> {
        let query = Query::new().eq("parent_id", parent_id).order("created_at", true);
        let rows = self.store.select(tables::REWARDS, &query).await?;
        Ok(map_rows(tables::REWARDS, &rows, RewardMapper::from_remote))
    }

    pub async fn upsert_catalog(&self, rewards: &[Reward]) -> Result<(), RemoteError> {
        let rows = rewards.iter().map(RewardMapper::to_remote).collect();
        self.store.upsert(tables::REWARDS, rows).await
    }

    pub async fn insert_redemption(&self, redemption: &Redemption) -> Result<Redemption, RemoteError> {
        let row = self
            .store
            .insert(tables::REDEMPTIONS, RedemptionMapper::to_remote(redemption))
            .await?;
        RedemptionMapper::from_remote(&row)
            .ok_or_else(|| RemoteError::Malformed("inserted redemption row could not be read".to_string()))
    }

    pub async fn list_redemptions(&self, kid_id: &str) -> Result<Vec<Redemption>, RemoteError> {
        let query = Query::new().eq("kid_id", kid_id).order("created_at", false);
        let rows = self.store.select(tables::REDEMPTIONS, &query).await?;
        Ok(map_rows(tables::REDEMPTIONS, &rows, RedemptionMapper::from_remote))
    }
}
