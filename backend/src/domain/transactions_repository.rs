//! Ledger entries per kid, remote first with the local cache as fallback.

use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::{DateTime, Duration, Utc};
use log::{info, warn};
use shared::{round_cents, NewTx, SyncState, Tx, TxTotals};
use tokio::sync::broadcast;
use uuid::Uuid;

use super::clock::Clock;
use super::events::{ChangeFeed, TxEvent};
use super::fallback::FallbackExecutor;
use crate::storage::local::LocalTransactionRepository;
use crate::storage::remote::RemoteTransactionRepository;

#[derive(Clone)]
pub struct TransactionsRepository {
    executor: FallbackExecutor,
    remote: RemoteTransactionRepository,
    local: LocalTransactionRepository,
    clock: Arc<dyn Clock>,
    feed: ChangeFeed<TxEvent>,
}

impl TransactionsRepository {
    pub fn new(
        executor: FallbackExecutor,
        remote: RemoteTransactionRepository,
        local: LocalTransactionRepository,
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

    /// Entries of one kid, newest first. A remote read refreshes the cache;
    /// entries written while offline stay visible until they reach the server.
    pub async fn list_by_kid(&self, kid_id: &str) -> Result<Vec<Tx>> {
        let remote = &self.remote;
        let local = &self.local;
        let result = self
            .executor
            .run(
                "transactions.list_by_kid",
                move || async move {
                    let fresh = remote.list_by_kid(kid_id).await?;
                    match local.replace_for_kid(kid_id, &fresh) {
                        Ok(merged) => Ok(merged),
                        Err(e) => {
                            warn!("Could not cache transactions for kid {}: {:#}", kid_id, e);
                            Ok(fresh)
                        }
                    }
                },
                move || async move { local.list_by_kid(kid_id) },
            )
            .await?;
        Ok(result.value)
    }

    /// Record a ledger entry. The id and timestamp are assigned here.
    pub async fn add(&self, new_tx: NewTx) -> Result<Tx> {
        if !new_tx.amount.is_finite() {
            bail!("Transaction amount must be finite");
        }
        let tx = Tx {
            id: Uuid::new_v4().to_string(),
            kid_id: new_tx.kid_id,
            tx_type: new_tx.tx_type,
            amount: round_cents(new_tx.amount),
            description: new_tx
                .description
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
            created_at: self.clock.now(),
            sync_state: SyncState::Pending,
        };

        let remote = &self.remote;
        let local = &self.local;
        let candidate = &tx;
        let pending = tx.clone();
        let result = self
            .executor
            .run(
                "transactions.add",
                move || async move {
                    let stored = remote.insert(candidate).await?;
                    let stored = Tx {
                        sync_state: SyncState::Synced,
                        ..stored
                    };
                    if let Err(e) = local.append(&stored) {
                        warn!("Could not cache transaction {}: {:#}", stored.id, e);
                    }
                    Ok(stored)
                },
                move || async move {
                    local.append(&pending)?;
                    Ok(pending)
                },
            )
            .await?;

        let tx = result.value;
        info!(
            "Recorded {} of {:.2} for kid {} ({})",
            tx.tx_type.as_str(),
            tx.amount,
            tx.kid_id,
            result.source
        );
        self.feed.publish(TxEvent::Added(tx.clone()));
        Ok(tx)
    }

    /// Entries created within the last `days` days before `now`.
    pub async fn list_in_range(&self, kid_id: &str, days: u32, now: DateTime<Utc>) -> Result<Vec<Tx>> {
        let since = now - Duration::days(i64::from(days));
        Ok(self
            .list_by_kid(kid_id)
            .await?
            .into_iter()
            .filter(|tx| tx.created_at >= since)
            .collect())
    }

    /// Sum of the entries in range, overall and per type.
    pub async fn totals_in_range(&self, kid_id: &str, days: u32, now: DateTime<Utc>) -> Result<TxTotals> {
        let txs = self.list_in_range(kid_id, days, now).await?;
        Ok(totals(&txs))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TxEvent> {
        self.feed.subscribe()
    }
}

fn totals(txs: &[Tx]) -> TxTotals {
    let mut totals = TxTotals::default();
    for tx in txs {
        totals.total = round_cents(totals.total + tx.amount);
        let entry = totals.by_type.entry(tx.tx_type).or_insert(0.0);
        *entry = round_cents(*entry + tx.amount);
    }
    totals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendMode;
    use crate::storage::test_utils::{sample_tx, TestApp};
    use shared::TxType;

    #[tokio::test]
    async fn test_add_offline_is_cached_as_pending() {
        let app = TestApp::new(BackendMode::Auto, true).await;
        app.connectivity.set_online(false);

        let tx = app
            .context
            .transactions
            .add(NewTx {
                kid_id: "kid-1".to_string(),
                tx_type: TxType::Gasto,
                amount: -3.0,
                description: Some("  Sorvete ".to_string()),
            })
            .await
            .unwrap();

        assert_eq!(tx.sync_state, SyncState::Pending);
        assert_eq!(tx.description.as_deref(), Some("Sorvete"));
        assert_eq!(app.remote.rows("transactions").len(), 0);
        let cached = app.context.transactions.list_by_kid("kid-1").await.unwrap();
        assert_eq!(cached.len(), 1);
    }

    #[tokio::test]
    async fn test_remote_list_keeps_unsynced_local_entries() {
        let app = TestApp::new(BackendMode::Auto, true).await;
        app.connectivity.set_online(false);
        app.context
            .transactions
            .add(NewTx {
                kid_id: "kid-1".to_string(),
                tx_type: TxType::Extra,
                amount: 5.0,
                description: None,
            })
            .await
            .unwrap();

        app.connectivity.set_online(true);
        app.context
            .transactions
            .add(NewTx {
                kid_id: "kid-1".to_string(),
                tx_type: TxType::Mesada,
                amount: 10.0,
                description: None,
            })
            .await
            .unwrap();

        let listed = app.context.transactions.list_by_kid("kid-1").await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(app.remote.rows("transactions").len(), 1);
    }

    #[test]
    fn test_totals_group_by_type() {
        let now = Utc::now();
        let txs = vec![
            sample_tx("t1", "kid-1", TxType::Mesada, 10.0, now),
            sample_tx("t2", "kid-1", TxType::Gasto, -2.5, now),
            sample_tx("t3", "kid-1", TxType::Mesada, 10.0, now),
        ];
        let totals = totals(&txs);
        assert_eq!(totals.total, 17.5);
        assert_eq!(totals.by_type.get(&TxType::Mesada), Some(&20.0));
        assert_eq!(totals.by_type.get(&TxType::Gasto), Some(&-2.5));
    }

    #[tokio::test]
    async fn test_range_excludes_older_entries() {
        let app = TestApp::new(BackendMode::Local, false).await;
        let now = app.clock.now();
        app.context
            .transactions
            .add(NewTx {
                kid_id: "kid-1".to_string(),
                tx_type: TxType::Extra,
                amount: 4.0,
                description: None,
            })
            .await
            .unwrap();

        let later = now + Duration::days(10);
        assert_eq!(app.context.transactions.list_in_range("kid-1", 7, later).await.unwrap().len(), 0);
        let totals = app.context.transactions.totals_in_range("kid-1", 30, later).await.unwrap();
        assert_eq!(totals.total, 4.0);
    }
}
