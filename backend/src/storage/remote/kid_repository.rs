use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use shared::{Kid, KidPatch};

use super::{map_rows, tables};
use crate::storage::mappers::KidMapper;
use crate::storage::traits::{Query, RemoteError, RemoteStore};

/// The remote `kids` table.
#[derive(Clone)]
pub struct RemoteKidRepository {
    store: Arc<dyn RemoteStore>,
}

impl RemoteKidRepository {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self { store }
    }

    fn base_query() -> Query {
        Query::new().select(KidMapper::REMOTE_COLUMNS).is_null("deleted_at")
    }

    /// Non-deleted kids of a parent, newest first.
    pub async fn list_by_parent(&self, parent_id: &str) -> Result<Vec<Kid>, RemoteError> {
        let query = Self::base_query()
            .eq("parent_id", parent_id)
            .order("created_at", false);
        let rows = self.store.select(tables::KIDS, &query).await?;
        Ok(map_rows(tables::KIDS, &rows, KidMapper::from_remote)
            .into_iter()
            .filter(|k| !k.is_deleted())
            .collect())
    }

    pub async fn get_by_id(&self, kid_id: &str) -> Result<Option<Kid>, RemoteError> {
        let query = Self::base_query().eq("id", kid_id).limit(1);
        let rows = self.store.select(tables::KIDS, &query).await?;
        Ok(map_rows(tables::KIDS, &rows, KidMapper::from_remote).into_iter().next())
    }

    pub async fn get_by_user(&self, user_id: &str) -> Result<Option<Kid>, RemoteError> {
        let query = Self::base_query().eq("user_id", user_id).limit(1);
        let rows = self.store.select(tables::KIDS, &query).await?;
        Ok(map_rows(tables::KIDS, &rows, KidMapper::from_remote).into_iter().next())
    }

    /// Insert a kid built on the client (id included).
    pub async fn create(&self, kid: &Kid) -> Result<Kid, RemoteError> {
        let row = self.store.insert(tables::KIDS, KidMapper::to_remote(kid)).await?;
        KidMapper::from_remote(&row)
            .ok_or_else(|| RemoteError::Malformed("inserted kid row could not be read".to_string()))
    }

    /// Returns the updated kid, or `None` if no row matched.
    pub async fn update(&self, kid_id: &str, patch: &KidPatch, now: DateTime<Utc>) -> Result<Option<Kid>, RemoteError> {
        let query = Query::new().eq("id", kid_id);
        let rows = self
            .store
            .update(tables::KIDS, &query, KidMapper::patch_to_remote(patch, now))
            .await?;
        Ok(map_rows(tables::KIDS, &rows, KidMapper::from_remote).into_iter().next())
    }

    pub async fn soft_delete(&self, kid_id: &str, now: DateTime<Utc>) -> Result<(), RemoteError> {
        let query = Query::new().eq("id", kid_id);
        let patch = json!({ "deleted_at": now.to_rfc3339(), "updated_at": now.to_rfc3339() });
        self.store.update(tables::KIDS, &query, patch).await.map(|_| ())
    }

    /// Set the balance, scoped by kid and owning parent. Fails when no row
    /// matched, e.g. for a kid that only exists in the local cache.
    pub async fn update_balance(&self, kid_id: &str, parent_id: &str, balance: f64) -> Result<(), RemoteError> {
        let query = Query::new().eq("id", kid_id).eq("parent_id", parent_id);
        let rows = self
            .store
            .update(tables::KIDS, &query, json!({ "balance": balance }))
            .await?;
        require_match(kid_id, &rows)
    }

    pub async fn mark_allowance(&self, kid_id: &str, when: DateTime<Utc>) -> Result<(), RemoteError> {
        let query = Query::new().eq("id", kid_id);
        let rows = self
            .store
            .update(tables::KIDS, &query, json!({ "last_allowance_at": when.to_rfc3339() }))
            .await?;
        require_match(kid_id, &rows)
    }
}

fn require_match(kid_id: &str, rows: &[Value]) -> Result<(), RemoteError> {
    if rows.is_empty() {
        return Err(RemoteError::NoMatchingRow {
            table: tables::KIDS,
            id: kid_id.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_utils::{sample_kid, FakeRemote};

    #[tokio::test]
    async fn test_balance_update_without_matching_row_fails() {
        let fake = Arc::new(FakeRemote::new());
        fake.seed_kid(&sample_kid("k1", "p1", 0.0, 10.0));
        let repo = RemoteKidRepository::new(fake.clone());

        repo.update_balance("k1", "p1", 7.5).await.unwrap();
        assert_eq!(fake.kid_balance("k1"), Some(7.5));

        let missing = repo.update_balance("offline-kid", "p1", 1.0).await;
        assert!(matches!(missing, Err(RemoteError::NoMatchingRow { .. })));
        let wrong_parent = repo.update_balance("k1", "p2", 1.0).await;
        assert!(matches!(wrong_parent, Err(RemoteError::NoMatchingRow { .. })));
        assert!(repo.mark_allowance("offline-kid", Utc::now()).await.is_err());
    }
}
