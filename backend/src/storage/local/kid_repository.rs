//! # Local Kid Repository
//!
//! Kid records cached in the local namespace under `finedu_kids`. The whole
//! collection is read and rewritten on every mutation; mutations run through
//! [`LocalConnection::update_json`] so two writers in the same process never
//! interleave their read-modify-write cycles.

use anyhow::Result;
use chrono::{DateTime, Utc};
use log::{debug, info};
use serde_json::Value;
use shared::{round_cents, Kid, KidPatch, SyncState};

use super::connection::LocalConnection;
use super::keys;
use crate::storage::mappers::KidMapper;

#[derive(Clone)]
pub struct LocalKidRepository {
    connection: LocalConnection,
}

impl LocalKidRepository {
    pub fn new(connection: LocalConnection) -> Self {
        Self { connection }
    }

    /// Every cached kid, including soft-deleted ones.
    pub fn list_all(&self) -> Result<Vec<Kid>> {
        self.connection.read_rows(keys::KIDS, KidMapper::from_local)
    }

    /// Non-deleted kids of one parent, in stored order.
    pub fn list_by_parent(&self, parent_id: &str) -> Result<Vec<Kid>> {
        Ok(self
            .list_all()?
            .into_iter()
            .filter(|k| k.parent_id == parent_id && !k.is_deleted())
            .collect())
    }

    pub fn get_by_id(&self, kid_id: &str) -> Result<Option<Kid>> {
        Ok(self
            .list_all()?
            .into_iter()
            .find(|k| k.id == kid_id && !k.is_deleted()))
    }

    pub fn get_by_user(&self, user_id: &str) -> Result<Option<Kid>> {
        Ok(self
            .list_all()?
            .into_iter()
            .find(|k| k.user_id.as_deref() == Some(user_id) && !k.is_deleted()))
    }

    fn mutate<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Vec<Kid>) -> Result<R>,
    {
        self.connection
            .update_json(keys::KIDS, |current: Option<Vec<Value>>| {
                let mut kids: Vec<Kid> = current
                    .unwrap_or_default()
                    .iter()
                    .filter_map(KidMapper::from_local)
                    .collect();
                let result = f(&mut kids)?;
                let rows = kids.iter().map(KidMapper::to_local).collect();
                Ok((rows, result))
            })
    }

    /// Insert or replace a kid by id.
    ///
    /// `last_allowance_at` never moves backwards: a cached claim newer than the
    /// incoming record is kept.
    pub fn upsert(&self, kid: &Kid) -> Result<Kid> {
        let kid = kid.clone();
        self.mutate(move |kids| {
            let stored = match kids.iter_mut().find(|k| k.id == kid.id) {
                Some(existing) => {
                    let last = later(existing.last_allowance_at, kid.last_allowance_at);
                    *existing = Kid {
                        last_allowance_at: last,
                        ..kid
                    };
                    existing.clone()
                }
                None => {
                    kids.push(kid.clone());
                    kid
                }
            };
            Ok(stored)
        })
    }

    /// Replace the cached set for one parent with `fresh`, keeping other
    /// parents' kids untouched.
    pub fn replace_for_parent(&self, parent_id: &str, fresh: &[Kid]) -> Result<()> {
        self.mutate(|kids| {
            let previous: Vec<Kid> = kids.iter().filter(|k| k.parent_id == parent_id).cloned().collect();
            kids.retain(|k| k.parent_id != parent_id);
            for kid in fresh {
                let mut kid = kid.clone();
                if let Some(old) = previous.iter().find(|k| k.id == kid.id) {
                    kid.last_allowance_at = later(old.last_allowance_at, kid.last_allowance_at);
                }
                kids.push(kid);
            }
            Ok(())
        })?;
        debug!("Replaced {} cached kids for parent {}", fresh.len(), parent_id);
        Ok(())
    }

    /// Apply editable fields. Returns the updated kid, or `None` if unknown.
    pub fn apply_patch(
        &self,
        kid_id: &str,
        patch: &KidPatch,
        now: DateTime<Utc>,
        sync_state: SyncState,
    ) -> Result<Option<Kid>> {
        let patch = patch.clone();
        self.mutate(|kids| {
            let Some(kid) = kids.iter_mut().find(|k| k.id == kid_id && !k.is_deleted()) else {
                return Ok(None);
            };
            if let Some(nome) = patch.nome {
                kid.nome = nome.trim().to_string();
            }
            if let Some(avatar) = patch.avatar {
                kid.avatar = avatar;
            }
            if let Some(user_id) = patch.user_id {
                kid.user_id = user_id;
            }
            if let Some(weekly) = patch.mesada_semanal {
                kid.mesada_semanal = round_cents(weekly);
            }
            kid.updated_at = now;
            kid.sync_state = sync_state;
            Ok(Some(kid.clone()))
        })
    }

    /// Set an absolute balance, as confirmed by the remote store.
    pub fn set_balance(
        &self,
        kid_id: &str,
        saldo: f64,
        sync_state: SyncState,
        now: DateTime<Utc>,
    ) -> Result<Option<Kid>> {
        self.mutate(|kids| {
            let Some(kid) = kids.iter_mut().find(|k| k.id == kid_id) else {
                return Ok(None);
            };
            kid.saldo = round_cents(saldo);
            kid.updated_at = now;
            kid.sync_state = sync_state;
            Ok(Some(kid.clone()))
        })
    }

    /// Add `delta` to the cached balance in one locked step. The record is
    /// marked pending until the remote store confirms it.
    pub fn add_to_balance(&self, kid_id: &str, delta: f64, now: DateTime<Utc>) -> Result<Option<Kid>> {
        self.mutate(|kids| {
            let Some(kid) = kids.iter_mut().find(|k| k.id == kid_id && !k.is_deleted()) else {
                return Ok(None);
            };
            kid.saldo = round_cents(kid.saldo + delta);
            kid.updated_at = now;
            kid.sync_state = SyncState::Pending;
            Ok(Some(kid.clone()))
        })
    }

    /// Flag a kid as deleted. Returns false if it was unknown.
    pub fn soft_delete(&self, kid_id: &str, now: DateTime<Utc>) -> Result<bool> {
        let deleted = self.mutate(|kids| {
            let Some(kid) = kids.iter_mut().find(|k| k.id == kid_id && !k.is_deleted()) else {
                return Ok(false);
            };
            kid.deleted_at = Some(now);
            kid.updated_at = now;
            Ok(true)
        })?;
        if deleted {
            info!("Soft-deleted cached kid {}", kid_id);
        }
        Ok(deleted)
    }

    /// Compare-and-swap on `last_allowance_at`.
    ///
    /// Succeeds only if the stored marker still equals `expected`; then sets it
    /// to `now` and returns the kid as it was before the claim.
    pub fn claim_allowance(
        &self,
        kid_id: &str,
        expected: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Option<Kid>> {
        self.mutate(|kids| {
            let Some(kid) = kids.iter_mut().find(|k| k.id == kid_id && !k.is_deleted()) else {
                return Ok(None);
            };
            if kid.last_allowance_at != expected {
                return Ok(None);
            }
            let before = kid.clone();
            kid.last_allowance_at = Some(now);
            Ok(Some(before))
        })
    }

    /// Undo a claim taken by [`claim_allowance`](Self::claim_allowance), if it
    /// is still the current marker.
    pub fn release_allowance_claim(
        &self,
        kid_id: &str,
        claimed: DateTime<Utc>,
        previous: Option<DateTime<Utc>>,
    ) -> Result<()> {
        self.mutate(|kids| {
            if let Some(kid) = kids.iter_mut().find(|k| k.id == kid_id) {
                if kid.last_allowance_at == Some(claimed) {
                    kid.last_allowance_at = previous;
                }
            }
            Ok(())
        })
    }

    pub fn set_sync_state(&self, kid_id: &str, sync_state: SyncState) -> Result<()> {
        self.mutate(|kids| {
            if let Some(kid) = kids.iter_mut().find(|k| k.id == kid_id) {
                kid.sync_state = sync_state;
            }
            Ok(())
        })
    }
}

fn later(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}
