//! # Local Reward Repository
//!
//! Reward catalog and redemption history for offline use.
//!
//! The catalog lives under `finedu_rewards_catalog`. When nothing has been
//! stored yet the built-in starter catalog is served, stamped with the
//! requesting parent's id. Redemptions are kept per kid under
//! `finedu_rewards_redeemed_<kidId>`, newest first.

use anyhow::Result;
use log::debug;
use serde_json::Value;
use shared::{Redemption, Reward, RewardTag};

use super::connection::LocalConnection;
use super::keys;
use crate::storage::mappers::{RedemptionMapper, RewardMapper};

const DEFAULT_CATALOG: [(&str, &str, &str, f64, RewardTag); 6] = [
    ("rw1", "Tempo extra no videogame", "30 minutos", 5.0, RewardTag::Diversao),
    ("rw2", "Escolher o filme da noite", "Sessão em família", 8.0, RewardTag::Diversao),
    ("rw3", "Figurinha/skin no app", "Colecionável digital", 3.0, RewardTag::Diversao),
    ("rw4", "Vale passeio no parque", "Fim de semana", 12.0, RewardTag::Saude),
    ("rw5", "Livro novo", "Escolha com um adulto", 20.0, RewardTag::Educacao),
    ("rw6", "Escolher a sobremesa", "No jantar", 6.0, RewardTag::Diversao),
];

/// The starter catalog for a family.
pub fn default_catalog(parent_id: &str) -> Vec<Reward> {
    DEFAULT_CATALOG
        .iter()
        .map(|(id, title, desc, price, tag)| Reward {
            id: id.to_string(),
            parent_id: parent_id.to_string(),
            title: title.to_string(),
            desc: Some(desc.to_string()),
            price: *price,
            tag: Some(*tag),
            created_at: None,
        })
        .collect()
}

#[derive(Clone)]
pub struct LocalRewardRepository {
    connection: LocalConnection,
}

impl LocalRewardRepository {
    pub fn new(connection: LocalConnection) -> Self {
        Self { connection }
    }

    /// Cached catalog for a parent, or the starter catalog if none is stored.
    pub fn catalog_for_parent(&self, parent_id: &str) -> Result<Vec<Reward>> {
        let rewards: Vec<Reward> = self
            .connection
            .read_rows(keys::REWARDS_CATALOG, RewardMapper::from_local)?
            .into_iter()
            .map(|mut reward| {
                if reward.parent_id.is_empty() {
                    reward.parent_id = parent_id.to_string();
                }
                reward
            })
            .filter(|reward| reward.parent_id == parent_id)
            .collect();
        if rewards.is_empty() {
            return Ok(default_catalog(parent_id));
        }
        Ok(rewards)
    }

    /// Replace one parent's catalog; other families' entries stay.
    pub fn write_catalog(&self, parent_id: &str, rewards: &[Reward]) -> Result<()> {
        self.connection
            .update_json(keys::REWARDS_CATALOG, |current: Option<Vec<Value>>| {
                let mut rows: Vec<Value> = current
                    .unwrap_or_default()
                    .into_iter()
                    .filter(|row| {
                        RewardMapper::from_local(row).is_some_and(|r| r.parent_id != parent_id)
                    })
                    .collect();
                rows.extend(rewards.iter().map(RewardMapper::to_local));
                Ok((rows, ()))
            })?;
        debug!("Cached {} rewards for parent {}", rewards.len(), parent_id);
        Ok(())
    }

    pub fn list_redemptions(&self, kid_id: &str) -> Result<Vec<Redemption>> {
        let mut list = self
            .connection
            .read_rows(&keys::redemptions(kid_id), RedemptionMapper::from_local)?;
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(list)
    }

    pub fn add_redemption(&self, redemption: &Redemption) -> Result<()> {
        let key = keys::redemptions(&redemption.kid_id);
        self.connection.update_json(&key, |current: Option<Vec<Value>>| {
            let mut rows = current.unwrap_or_default();
            rows.insert(0, RedemptionMapper::to_local(redemption));
            Ok((rows, ()))
        })
    }

    pub fn replace_redemptions(&self, kid_id: &str, redemptions: &[Redemption]) -> Result<()> {
        let rows: Vec<Value> = redemptions.iter().map(RedemptionMapper::to_local).collect();
        self.connection.write_json(&keys::redemptions(kid_id), &rows)
    }
}
