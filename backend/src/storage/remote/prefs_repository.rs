use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use shared::Prefs;

use super::tables;
use crate::storage::mappers::pick_bool;
use crate::storage::traits::{Query, RemoteError, RemoteStore};

/// The remote `prefs` table, one row per owner.
#[derive(Clone)]
pub struct RemotePrefsRepository {
    store: Arc<dyn RemoteStore>,
}

impl RemotePrefsRepository {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self { store }
    }

    /// Stored preferences; a missing row reads as the defaults.
    pub async fn get(&self, owner_id: &str) -> Result<Prefs, RemoteError> {
        let query = Query::new().eq("owner_id", owner_id).limit(1);
        let rows = self.store.select(tables::PREFS, &query).await?;
        let defaults = Prefs::default();
        Ok(match rows.first() {
            Some(row) => Prefs {
                sound: pick_bool(row, &["sound"]).unwrap_or(defaults.sound),
                notifications: pick_bool(row, &["notifications"]).unwrap_or(defaults.notifications),
            },
            None => defaults,
        })
    }

    pub async fn set(&self, owner_id: &str, prefs: &Prefs, now: DateTime<Utc>) -> Result<(), RemoteError> {
        let row = json!({
            "owner_id": owner_id,
            "sound": prefs.sound,
            "notifications": prefs.notifications,
            "updated_at": now.to_rfc3339(),
        });
        self.store.upsert(tables::PREFS, vec![row]).await
    }
}
