use anyhow::Result;
use log::debug;
use serde_json::Value;
use shared::{SyncState, Tx};

use super::connection::LocalConnection;
use super::keys;
use crate::storage::mappers::TransactionMapper;

/// Per-kid transaction ledger cached under `finedu_tx_<kidId>`.
#[derive(Clone)]
pub struct LocalTransactionRepository {
    connection: LocalConnection,
}

impl LocalTransactionRepository {
    pub fn new(connection: LocalConnection) -> Self {
        Self { connection }
    }

    /// All cached transactions for a kid, newest first.
    pub fn list_by_kid(&self, kid_id: &str) -> Result<Vec<Tx>> {
        let mut txs = self
            .connection
            .read_rows(&keys::transactions(kid_id), TransactionMapper::from_local)?;
        txs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(txs)
    }

    /// Add a transaction. Ids already present are left alone so a replayed
    /// write cannot duplicate a ledger entry.
    pub fn append(&self, tx: &Tx) -> Result<()> {
        let key = keys::transactions(&tx.kid_id);
        let inserted = self.connection.update_json(&key, |current: Option<Vec<Value>>| {
            let mut rows = current.unwrap_or_default();
            let exists = rows
                .iter()
                .filter_map(TransactionMapper::from_local)
                .any(|existing| existing.id == tx.id);
            if !exists {
                rows.insert(0, TransactionMapper::to_local(tx));
            }
            Ok((rows, !exists))
        })?;
        if inserted {
            debug!("Cached transaction {} for kid {}", tx.id, tx.kid_id);
        }
        Ok(())
    }

    /// Overwrite the cached ledger with a fresh remote copy, keeping entries
    /// that never reached the remote store.
    pub fn replace_for_kid(&self, kid_id: &str, fresh: &[Tx]) -> Result<Vec<Tx>> {
        let key = keys::transactions(kid_id);
        let merged = self.connection.update_json(&key, |current: Option<Vec<Value>>| {
            let cached: Vec<Tx> = current
                .unwrap_or_default()
                .iter()
                .filter_map(TransactionMapper::from_local)
                .collect();
            let mut merged: Vec<Tx> = fresh.to_vec();
            for tx in cached {
                if tx.sync_state != SyncState::Synced && !merged.iter().any(|t| t.id == tx.id) {
                    merged.push(tx);
                }
            }
            merged.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            let rows = merged.iter().map(TransactionMapper::to_local).collect();
            Ok((rows, merged))
        })?;
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_utils::{sample_tx, TestEnvironment};
    use chrono::{Duration, Utc};
    use shared::TxType;

    #[test]
    fn test_append_is_newest_first_and_deduplicated() {
        let env = TestEnvironment::new().unwrap();
        let repo = LocalTransactionRepository::new(env.connection.clone());
        let now = Utc::now();

        let older = sample_tx("t1", "k1", TxType::Mesada, 20.0, now - Duration::days(1));
        let newer = sample_tx("t2", "k1", TxType::Gasto, -5.0, now);
        repo.append(&newer).unwrap();
        repo.append(&older).unwrap();
        repo.append(&older).unwrap();

        let txs = repo.list_by_kid("k1").unwrap();
        assert_eq!(txs.iter().map(|t| t.id.as_str()).collect::<Vec<_>>(), vec!["t2", "t1"]);
        assert!(repo.list_by_kid("k2").unwrap().is_empty());
    }

    #[test]
    fn test_replace_keeps_unsynced_local_entries() {
        let env = TestEnvironment::new().unwrap();
        let repo = LocalTransactionRepository::new(env.connection.clone());
        let now = Utc::now();

        let mut offline = sample_tx("local-1", "k1", TxType::Extra, 15.5, now);
        offline.sync_state = SyncState::Pending;
        repo.append(&offline).unwrap();
        repo.append(&sample_tx("stale", "k1", TxType::Extra, 1.0, now)).unwrap();

        let remote = sample_tx("r1", "k1", TxType::Mesada, 20.0, now - Duration::hours(1));
        let merged = repo.replace_for_kid("k1", &[remote]).unwrap();

        let ids: Vec<&str> = merged.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["local-1", "r1"]);
        assert_eq!(repo.list_by_kid("k1").unwrap(), merged);
    }
}
