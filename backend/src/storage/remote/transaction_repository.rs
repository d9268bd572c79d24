use std::sync::Arc;

use shared::Tx;

use super::{map_rows, tables};
use crate::storage::mappers::TransactionMapper;
use crate::storage::traits::{Query, RemoteError, RemoteStore};

/// The remote `transactions` table.
#[derive(Clone)]
pub struct RemoteTransactionRepository {
    store: Arc<dyn RemoteStore>,
}

impl RemoteTransactionRepository {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self { store }
    }

    pub async fn list_by_kid(&self, kid_id: &str) -> Result<Vec<Tx>, RemoteError> {
        let query = Query::new().eq("kid_id", kid_id).order("created_at", false);
        let rows = self.store.select(tables::TRANSACTIONS, &query).await?;
        Ok(map_rows(tables::TRANSACTIONS, &rows, TransactionMapper::from_remote))
    }

    pub async fn insert(&self, tx: &Tx) -> Result<Tx, RemoteError> {
        let row = self
            .store
            .insert(tables::TRANSACTIONS, TransactionMapper::to_remote(tx))
            .await?;
        TransactionMapper::from_remote(&row)
            .ok_or_else(|| RemoteError::Malformed("inserted transaction row could not be read".to_string()))
    }
}
