//! # Kids Repository
//!
//! Kid profiles and their balances. Reads prefer the remote store and refresh
//! the local cache; writes go to the remote store when it is reachable and
//! otherwise land in the cache, with balance changes queued for replay.
//!
//! Every balance change records a ledger entry through
//! [`TransactionsRepository`]. The two writes are sequential, not atomic: a
//! failed ledger write is logged and the balance change stands.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use shared::{now_millis, round_cents, Kid, KidPatch, NewKid, NewTx, Outcome, QueueItem, SyncState, TxType};
use tokio::sync::broadcast;
use uuid::Uuid;

use super::allowance_scheduler::is_due;
use super::clock::Clock;
use super::events::{ChangeFeed, KidEvent};
use super::fallback::FallbackExecutor;
use super::merge::merge_by_id;
use super::transactions_repository::TransactionsRepository;
use super::validation::{validate_allowance, validate_amount, validate_name, ValidationError};
use crate::storage::local::{LocalKidRepository, LocalQueueRepository};
use crate::storage::remote::RemoteKidRepository;

/// Ledger description of a manual allowance credit.
pub const MANUAL_ALLOWANCE_LABEL: &str = "Crédito de mesada semanal";

#[derive(Clone)]
pub struct KidsRepository {
    executor: FallbackExecutor,
    remote: RemoteKidRepository,
    local: LocalKidRepository,
    queue: LocalQueueRepository,
    transactions: TransactionsRepository,
    clock: Arc<dyn Clock>,
    feed: ChangeFeed<KidEvent>,
}

impl KidsRepository {
    pub fn new(
        executor: FallbackExecutor,
        remote: RemoteKidRepository,
        local: LocalKidRepository,
        queue: LocalQueueRepository,
        transactions: TransactionsRepository,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            executor,
            remote,
            local,
            queue,
            transactions,
            clock,
            feed: ChangeFeed::new(),
        }
    }

    /// Kids of a parent. The remote list wins by id; kids that exist only in
    /// the cache and were never confirmed by the server are appended.
    pub async fn list_by_parent(&self, parent_id: &str) -> Result<Vec<Kid>> {
        let remote = &self.remote;
        let local = &self.local;
        let result = self
            .executor
            .run(
                "kids.list_by_parent",
                move || async move {
                    let fresh = remote.list_by_parent(parent_id).await?;
                    let unsynced: Vec<Kid> = local
                        .list_by_parent(parent_id)
                        .unwrap_or_default()
                        .into_iter()
                        .filter(|k| !k.sync_state.is_synced())
                        .collect();
                    let merged = merge_by_id(&fresh, &unsynced);
                    Ok(match local.replace_for_parent(parent_id, &merged) {
                        Ok(()) => local.list_by_parent(parent_id).unwrap_or(merged),
                        Err(e) => {
                            warn!("Could not cache kids for parent {}: {:#}", parent_id, e);
                            merged
                        }
                    })
                },
                move || async move { local.list_by_parent(parent_id) },
            )
            .await?;

        if result.is_remote() {
            self.feed.publish(KidEvent::ListRefreshed {
                parent_id: parent_id.to_string(),
                count: result.value.len(),
            });
        }
        Ok(result.value)
    }

    pub async fn get_by_id(&self, kid_id: &str) -> Result<Option<Kid>> {
        let remote = &self.remote;
        let local = &self.local;
        let result = self
            .executor
            .run(
                "kids.get_by_id",
                move || async move {
                    match remote.get_by_id(kid_id).await? {
                        Some(kid) => Ok(Some(cache_kid(local, kid))),
                        None => Ok(local.get_by_id(kid_id)?.filter(|k| !k.sync_state.is_synced())),
                    }
                },
                move || async move { local.get_by_id(kid_id) },
            )
            .await?;
        Ok(result.value)
    }

    /// The kid profile linked to a child account.
    pub async fn get_by_user(&self, user_id: &str) -> Result<Option<Kid>> {
        let remote = &self.remote;
        let local = &self.local;
        let result = self
            .executor
            .run(
                "kids.get_by_user",
                move || async move {
                    match remote.get_by_user(user_id).await? {
                        Some(kid) => Ok(Some(cache_kid(local, kid))),
                        None => Ok(local.get_by_user(user_id)?.filter(|k| !k.sync_state.is_synced())),
                    }
                },
                move || async move { local.get_by_user(user_id) },
            )
            .await?;
        Ok(result.value)
    }

    pub async fn create(&self, new_kid: NewKid) -> Result<Outcome<Kid>> {
        let nome = match validate_name(&new_kid.nome) {
            Ok(nome) => nome,
            Err(e) => return Ok(e.into_outcome()),
        };
        let mesada_semanal = match validate_allowance(new_kid.mesada_semanal) {
            Ok(weekly) => weekly,
            Err(e) => return Ok(e.into_outcome()),
        };

        let now = self.clock.now();
        let kid = Kid {
            id: Uuid::new_v4().to_string(),
            parent_id: new_kid.parent_id,
            user_id: new_kid.user_id,
            nome,
            avatar: new_kid.avatar,
            saldo: 0.0,
            mesada_semanal,
            last_allowance_at: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            sync_state: SyncState::Pending,
        };

        let remote = &self.remote;
        let local = &self.local;
        let candidate = &kid;
        let result = self
            .executor
            .run(
                "kids.create",
                move || async move {
                    let created = remote.create(candidate).await?;
                    Ok(cache_kid(local, created))
                },
                move || async move { local.upsert(candidate) },
            )
            .await?;

        let kid = result.value;
        info!("Created kid {} for parent {} ({})", kid.id, kid.parent_id, result.source);
        self.feed.publish(KidEvent::Created(kid.clone()));
        Ok(Outcome::success(kid))
    }

    /// Apply editable fields. Balance and allowance markers are not editable
    /// here.
    pub async fn update(&self, kid_id: &str, mut patch: KidPatch) -> Result<Outcome<Kid>> {
        if let Some(nome) = &patch.nome {
            match validate_name(nome) {
                Ok(nome) => patch.nome = Some(nome),
                Err(e) => return Ok(e.into_outcome()),
            }
        }
        if let Some(weekly) = patch.mesada_semanal {
            match validate_allowance(weekly) {
                Ok(weekly) => patch.mesada_semanal = Some(weekly),
                Err(e) => return Ok(e.into_outcome()),
            }
        }
        if patch.is_empty() {
            return Ok(match self.get_by_id(kid_id).await? {
                Some(kid) => Outcome::success(kid),
                None => ValidationError::KidNotFound.into_outcome(),
            });
        }

        let now = self.clock.now();
        let remote = &self.remote;
        let local = &self.local;
        let changes = &patch;
        let result = self
            .executor
            .run(
                "kids.update",
                move || async move {
                    match remote.update(kid_id, changes, now).await? {
                        Some(kid) => Ok(Some(cache_kid(local, kid))),
                        None => local.apply_patch(kid_id, changes, now, SyncState::Pending),
                    }
                },
                move || async move { local.apply_patch(kid_id, changes, now, SyncState::Pending) },
            )
            .await?;

        Ok(match result.value {
            Some(kid) => {
                debug!("Updated kid {} ({})", kid.id, result.source);
                self.feed.publish(KidEvent::Updated(kid.clone()));
                Outcome::success(kid)
            }
            None => ValidationError::KidNotFound.into_outcome(),
        })
    }

    /// Soft-delete a kid. Returns false if the kid was unknown locally and the
    /// remote store could not be reached.
    pub async fn remove(&self, kid_id: &str) -> Result<bool> {
        let now = self.clock.now();
        let remote = &self.remote;
        let local = &self.local;
        let result = self
            .executor
            .run(
                "kids.remove",
                move || async move {
                    remote.soft_delete(kid_id, now).await?;
                    if let Err(e) = local.soft_delete(kid_id, now) {
                        warn!("Could not mark cached kid {} deleted: {:#}", kid_id, e);
                    }
                    Ok(true)
                },
                move || async move { local.soft_delete(kid_id, now) },
            )
            .await?;

        if result.value {
            info!("Removed kid {} ({})", kid_id, result.source);
            self.feed.publish(KidEvent::Removed {
                kid_id: kid_id.to_string(),
            });
        }
        Ok(result.value)
    }

    /// Change a kid's balance by `amount` and record the ledger entry.
    ///
    /// Debits that would take the balance below zero are declined. When the
    /// remote store is not reachable the cached balance moves and the new
    /// absolute balance is queued for replay.
    pub async fn credit(
        &self,
        kid_id: &str,
        amount: f64,
        tx_type: TxType,
        description: Option<String>,
    ) -> Result<Outcome<Kid>> {
        let amount = match validate_amount(amount) {
            Ok(amount) => amount,
            Err(e) => return Ok(e.into_outcome()),
        };
        let Some(kid) = self.get_by_id(kid_id).await? else {
            return Ok(ValidationError::KidNotFound.into_outcome());
        };
        if amount < 0.0 && round_cents(kid.saldo + amount) < 0.0 {
            return Ok(ValidationError::InsufficientBalance.into_outcome());
        }

        let now = self.clock.now();
        let remote = &self.remote;
        let local = &self.local;
        let known = &kid;
        let result = self
            .executor
            .run(
                "kids.credit",
                move || async move {
                    let current = remote
                        .get_by_id(kid_id)
                        .await?
                        .ok_or_else(|| anyhow!("kid {} is not in the remote store", kid_id))?;
                    let new_balance = round_cents(current.saldo + amount);
                    remote.update_balance(kid_id, &current.parent_id, new_balance).await?;
                    Ok(cache_kid(
                        local,
                        Kid {
                            saldo: new_balance,
                            updated_at: now,
                            ..current
                        },
                    ))
                },
                move || async move {
                    if let Some(updated) = local.add_to_balance(kid_id, amount, now)? {
                        return Ok(updated);
                    }
                    local.upsert(known)?;
                    local
                        .add_to_balance(kid_id, amount, now)?
                        .ok_or_else(|| anyhow!("kid {} disappeared from the local cache", kid_id))
                },
            )
            .await?;

        let source = result.source;
        let was_remote = result.is_remote();
        let kid = result.value;
        if !was_remote && self.executor.remote_configured() {
            self.queue.enqueue(&QueueItem::UpdateBalance {
                kid_id: kid.id.clone(),
                parent_id: kid.parent_id.clone(),
                new_balance: kid.saldo,
                ts: now_millis(),
            })?;
        }

        if let Err(e) = self
            .transactions
            .add(NewTx {
                kid_id: kid.id.clone(),
                tx_type,
                amount,
                description,
            })
            .await
        {
            warn!("Balance of kid {} changed but the ledger entry failed: {:#}", kid.id, e);
        }

        info!("Kid {} balance {:.2} after {:+.2} ({})", kid.id, kid.saldo, amount, source);
        self.feed.publish(KidEvent::BalanceChanged {
            kid_id: kid.id.clone(),
            saldo: kid.saldo,
            source,
        });
        Ok(Outcome::success(kid))
    }

    /// Credit one weekly allowance on demand.
    pub async fn credit_allowance(&self, kid_id: &str) -> Result<Outcome<Kid>> {
        let Some(kid) = self.get_by_id(kid_id).await? else {
            return Ok(ValidationError::KidNotFound.into_outcome());
        };
        self.credit(
            kid_id,
            kid.mesada_semanal,
            TxType::Mesada,
            Some(MANUAL_ALLOWANCE_LABEL.to_string()),
        )
        .await
    }

    /// Claim this week's allowance slot by moving the cached marker to `now`.
    ///
    /// Only a kid whose allowance is due can be claimed, and the marker is
    /// swapped only if nobody moved it since it was read, so concurrent runs
    /// cannot both claim the same week. Returns the kid as it was before the
    /// claim.
    pub fn claim_allowance(&self, kid_id: &str, now: DateTime<Utc>) -> Result<Option<Kid>> {
        let Some(kid) = self.local.get_by_id(kid_id)? else {
            return Ok(None);
        };
        if !is_due(kid.last_allowance_at, now) {
            return Ok(None);
        }
        self.local.claim_allowance(kid_id, kid.last_allowance_at, now)
    }

    /// Give a claim back after the credit it guarded did not happen.
    pub fn release_allowance_claim(
        &self,
        kid_id: &str,
        claimed: DateTime<Utc>,
        previous: Option<DateTime<Utc>>,
    ) -> Result<()> {
        self.local.release_allowance_claim(kid_id, claimed, previous)
    }

    /// Queue the allowance marker for the remote store. The cached marker was
    /// already moved by the claim.
    pub fn mark_allowance_pending(&self, kid_id: &str, when: DateTime<Utc>) -> Result<()> {
        if !self.executor.remote_configured() {
            debug!("No remote store configured; allowance marker for kid {} stays local", kid_id);
            return Ok(());
        }
        self.queue.enqueue(&QueueItem::MarkAllowance {
            kid_id: kid_id.to_string(),
            when_iso: when,
            ts: now_millis(),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<KidEvent> {
        self.feed.subscribe()
    }
}

/// Mirror a kid confirmed by the remote store into the cache. Returns the
/// cached record, which keeps a newer local allowance marker.
fn cache_kid(local: &LocalKidRepository, kid: Kid) -> Kid {
    let kid = Kid {
        sync_state: SyncState::Synced,
        ..kid
    };
    match local.upsert(&kid) {
        Ok(stored) => stored,
        Err(e) => {
            warn!("Could not cache kid {}: {:#}", kid.id, e);
            kid
        }
    }
}
